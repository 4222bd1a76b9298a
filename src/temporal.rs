// ⏰ Temporal Windows - Causal lookback windows for velocity limits
//
// Both windows end at the evaluated transaction's own instant:
// 1. Daily: UTC midnight of the transaction's date → t
// 2. Weekly: t - 7×24h → t (rolling, not an ISO week)

use crate::transaction::Transaction;
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
pub const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

// ============================================================================
// TIME WINDOW
// ============================================================================

/// Closed interval of epoch seconds, `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        TimeWindow { start, end }
    }

    /// `[start_of_day(t), t]` in UTC
    pub fn daily(t: DateTime<Utc>) -> Self {
        let midnight = t
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc().timestamp())
            .unwrap_or_else(|| t.timestamp() - t.timestamp().rem_euclid(SECONDS_PER_DAY));

        TimeWindow::new(midnight, t.timestamp())
    }

    /// `[t - 7d, t]`
    pub fn weekly(t: DateTime<Utc>) -> Self {
        let end = t.timestamp();
        TimeWindow::new(end - SECONDS_PER_WEEK, end)
    }

    /// Both ends are inclusive
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

pub fn is_monday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Mon
}

/// Amount as it counts toward a window total: Monday loads count double
pub fn weighted_amount(tx: &Transaction) -> Decimal {
    if is_monday(tx.calendar_date()) {
        tx.amount().saturating_mul(Decimal::TWO)
    } else {
        tx.amount()
    }
}

/// Sum of weighted amounts, identical for daily and weekly windows.
/// Saturates at `Decimal::MAX`, which still exceeds every limit.
pub fn total_load_amount(records: &[Transaction]) -> Decimal {
    records
        .iter()
        .map(weighted_amount)
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::parse_timestamp;

    fn tx(id: u64, amount: &str, time: &str) -> Transaction {
        Transaction::new(id, "1", amount.parse().unwrap(), parse_timestamp(time).unwrap()).unwrap()
    }

    #[test]
    fn test_is_monday() {
        let monday = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        assert!(is_monday(monday));
        for offset in 1..7 {
            let other = monday + chrono::Days::new(offset);
            assert!(!is_monday(other), "{other} is not a Monday");
        }
        assert!(is_monday(NaiveDate::from_ymd_opt(2025, 8, 18).unwrap()));
    }

    #[test]
    fn test_daily_window_starts_at_utc_midnight() {
        let t = parse_timestamp("2000-01-01T11:00:00Z").unwrap();
        let window = TimeWindow::daily(t);

        assert_eq!(window.start, parse_timestamp("2000-01-01T00:00:00Z").unwrap().timestamp());
        assert_eq!(window.end, t.timestamp());
        assert!(window.contains(window.start));
        assert!(window.contains(window.end));
        assert!(!window.contains(window.start - 1));
        assert!(!window.contains(window.end + 1));
    }

    #[test]
    fn test_daily_window_at_midnight_is_a_single_instant() {
        let t = parse_timestamp("2000-01-02T00:00:00Z").unwrap();
        let window = TimeWindow::daily(t);
        assert_eq!(window.start, window.end);
    }

    #[test]
    fn test_weekly_window_is_rolling() {
        let t = parse_timestamp("2000-01-08T12:00:00Z").unwrap();
        let window = TimeWindow::weekly(t);

        let seven_days_before = parse_timestamp("2000-01-01T12:00:00Z").unwrap().timestamp();
        assert_eq!(window.start, seven_days_before);
        assert!(window.contains(seven_days_before));
        assert!(!window.contains(seven_days_before - 1));
    }

    #[test]
    fn test_monday_amounts_count_double() {
        // 2024-07-29 is a Monday, 2024-07-30 a Tuesday
        let monday = vec![
            tx(1, "100.00", "2024-07-29T01:00:00Z"),
            tx(2, "100.00", "2024-07-29T02:00:00Z"),
        ];
        let tuesday = vec![
            tx(3, "100.00", "2024-07-30T01:00:00Z"),
            tx(4, "100.00", "2024-07-30T02:00:00Z"),
        ];

        assert_eq!(total_load_amount(&monday), Decimal::from(400));
        assert_eq!(total_load_amount(&tuesday), Decimal::from(200));
    }

    #[test]
    fn test_mixed_week_total() {
        let records = vec![
            tx(1, "100.00", "2024-07-29T01:00:00Z"),
            tx(2, "0.50", "2024-07-31T01:00:00Z"),
        ];
        assert_eq!(total_load_amount(&records), Decimal::new(20050, 2));
        assert_eq!(total_load_amount(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_huge_totals_saturate() {
        let huge = "700000000000000000000000000.00";
        let records: Vec<Transaction> = (0..60).map(|id| tx(id, huge, "2024-07-29T01:00:00Z")).collect();

        assert_eq!(total_load_amount(&records), Decimal::MAX);
        assert_eq!(weighted_amount(&records[0]), Decimal::from_str_exact("1400000000000000000000000000.00").unwrap());
    }
}

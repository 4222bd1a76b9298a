// 🚦 Velocity Rules - Tiered load limits keyed on the transaction id
// Prime ids: strict count, high daily cap. Other ids: looser count, daily + weekly caps.

use crate::primes::{PrimeSet, DEFAULT_PRIME_LIMIT};
use crate::store::{AggregationStore, StoreError};
use crate::temporal::{total_load_amount, TimeWindow};
use crate::transaction::Transaction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

// ============================================================================
// RULE CONFIGURATION
// ============================================================================

/// Limits for one tier. Exceeding a limit rejects; reaching it does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Loads allowed in the daily window, including the one under evaluation
    pub max_daily_count: usize,

    /// Cap on the weighted daily total
    pub max_daily_total: Decimal,

    /// Cap on the weighted rolling-week total (None = unchecked)
    #[serde(default)]
    pub max_weekly_total: Option<Decimal>,
}

impl TierLimits {
    pub fn prime() -> Self {
        TierLimits {
            max_daily_count: 1,
            max_daily_total: Decimal::from(9999),
            max_weekly_total: None,
        }
    }

    pub fn normal() -> Self {
        TierLimits {
            max_daily_count: 3,
            max_daily_total: Decimal::from(5000),
            max_weekly_total: Some(Decimal::from(20000)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Upper bound of the precomputed prime set
    pub prime_limit: usize,
    pub prime: TierLimits,
    pub normal: TierLimits,
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig {
            prime_limit: DEFAULT_PRIME_LIMIT,
            prime: TierLimits::prime(),
            normal: TierLimits::normal(),
        }
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Prime,
    Normal,
}

impl Tier {
    fn label(&self) -> &'static str {
        match self {
            Tier::Prime => "prime id",
            Tier::Normal => "normal id",
        }
    }
}

/// Why a load was refused. Display renders the reason reported downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    DailyCount { tier: Tier, limit: usize },
    DailyTotal { tier: Tier, limit: Decimal },
    WeeklyTotal { tier: Tier, limit: Decimal },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::DailyCount { tier, limit } => {
                let noun = if *limit == 1 { "transaction" } else { "transactions" };
                write!(f, "{}: more than {} daily {}", tier.label(), count_word(*limit), noun)
            }
            RejectionReason::DailyTotal { tier, limit } => {
                write!(f, "{}: daily total exceeds {}", tier.label(), limit)
            }
            RejectionReason::WeeklyTotal { tier, limit } => {
                write!(f, "{}: weekly total exceeds {}", tier.label(), limit)
            }
        }
    }
}

fn count_word(n: usize) -> String {
    const WORDS: [&str; 10] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    ];
    WORDS.get(n).map(|w| w.to_string()).unwrap_or_else(|| n.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(RejectionReason),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted)
    }

    /// "valid" or the rejection reason
    pub fn details(&self) -> String {
        match self {
            ValidationOutcome::Accepted => "valid".to_string(),
            ValidationOutcome::Rejected(reason) => reason.to_string(),
        }
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Rule engine. Holds only read-only state, so it can be shared across threads.
pub struct Validator {
    primes: PrimeSet,
    config: RulesConfig,
}

impl Validator {
    pub fn new(config: RulesConfig) -> Self {
        let primes = PrimeSet::new(config.prime_limit);
        debug!(limit = config.prime_limit, primes = primes.len(), "prime set built");
        Validator { primes, config }
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    /// Primality of the transaction's own id
    pub fn is_prime(&self, n: u64) -> bool {
        self.primes.contains(n)
    }

    pub fn tier(&self, tx: &Transaction) -> Tier {
        if self.is_prime(tx.id()) {
            Tier::Prime
        } else {
            Tier::Normal
        }
    }

    /// Customer's loads from UTC midnight through this transaction's instant
    pub fn daily_loads<S>(&self, tx: &Transaction, store: &S) -> Result<Vec<Transaction>, StoreError>
    where
        S: AggregationStore + ?Sized,
    {
        let window = TimeWindow::daily(tx.occurred_at());
        store.range_query(tx.customer_id(), window.start, window.end)
    }

    /// Customer's loads in the 7×24h lookback ending at this transaction
    pub fn weekly_loads<S>(&self, tx: &Transaction, store: &S) -> Result<Vec<Transaction>, StoreError>
    where
        S: AggregationStore + ?Sized,
    {
        let window = TimeWindow::weekly(tx.occurred_at());
        store.range_query(tx.customer_id(), window.start, window.end)
    }

    /// Decide a transaction that has already been inserted into `store`
    pub fn validate<S>(&self, tx: &Transaction, store: &S) -> Result<ValidationOutcome, StoreError>
    where
        S: AggregationStore + ?Sized,
    {
        let tier = self.tier(tx);
        let limits = match tier {
            Tier::Prime => &self.config.prime,
            Tier::Normal => &self.config.normal,
        };

        let daily = self.daily_loads(tx, store)?;
        let daily_total = total_load_amount(&daily);
        debug!(
            id = tx.id(),
            customer_id = tx.customer_id(),
            ?tier,
            daily_count = daily.len(),
            %daily_total,
            "daily window"
        );

        if daily.len() > limits.max_daily_count {
            return Ok(ValidationOutcome::Rejected(RejectionReason::DailyCount {
                tier,
                limit: limits.max_daily_count,
            }));
        }

        if daily_total > limits.max_daily_total {
            return Ok(ValidationOutcome::Rejected(RejectionReason::DailyTotal {
                tier,
                limit: limits.max_daily_total,
            }));
        }

        if let Some(weekly_limit) = limits.max_weekly_total {
            let weekly = self.weekly_loads(tx, store)?;
            let weekly_total = total_load_amount(&weekly);
            debug!(id = tx.id(), weekly_count = weekly.len(), %weekly_total, "weekly window");

            if weekly_total > weekly_limit {
                return Ok(ValidationOutcome::Rejected(RejectionReason::WeeklyTotal {
                    tier,
                    limit: weekly_limit,
                }));
            }
        }

        Ok(ValidationOutcome::Accepted)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(RulesConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::transaction::parse_timestamp;

    // Ids used below: 2, 3, 7, 13 are prime; 4, 6, 8, 9, 10, 12 are not.
    // 2024-07-29 is a Monday; 2024-07-30 .. 2024-08-04 are not.

    fn validator() -> Validator {
        Validator::new(RulesConfig {
            prime_limit: 10_000,
            ..RulesConfig::default()
        })
    }

    fn tx(id: u64, amount: &str, time: &str) -> Transaction {
        Transaction::new(id, "1", amount.parse().unwrap(), parse_timestamp(time).unwrap()).unwrap()
    }

    /// Insert then validate, as the pipeline does
    fn submit(store: &mut SqliteStore, validator: &Validator, tx: Transaction) -> ValidationOutcome {
        store.insert(&tx).unwrap();
        validator.validate(&tx, &*store).unwrap()
    }

    #[test]
    fn test_is_prime_uses_transaction_id() {
        let validator = validator();
        assert!(!validator.is_prime(0));
        assert!(!validator.is_prime(1));
        assert!(validator.is_prime(2));
        assert!(validator.is_prime(3));
        assert!(validator.is_prime(97));
        assert!(validator.is_prime(4133));
        assert!(validator.is_prime(7219));
        assert!(!validator.is_prime(1530));
        assert!(!validator.is_prime(6500));
        assert!(!validator.is_prime(10_007)); // prime, but beyond the limit
    }

    #[test]
    fn test_daily_window_excludes_prior_day() {
        let validator = validator();
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert(&tx(4, "100.00", "2000-01-01T23:59:59Z")).unwrap();
        store.insert(&tx(6, "100.00", "2000-01-02T00:00:00Z")).unwrap();
        store.insert(&tx(9, "100.00", "2000-01-02T12:00:01Z")).unwrap();
        let current = tx(8, "100.00", "2000-01-02T12:00:00Z");
        store.insert(&current).unwrap();

        let daily = validator.daily_loads(&current, &store).unwrap();
        let ids: Vec<u64> = daily.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![8, 6]);
    }

    #[test]
    fn test_weekly_window_boundary() {
        let validator = validator();
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert(&tx(4, "100.00", "2000-01-01T11:59:59Z")).unwrap();
        store.insert(&tx(6, "100.00", "2000-01-01T12:00:00Z")).unwrap();
        let current = tx(8, "100.00", "2000-01-08T12:00:00Z");
        store.insert(&current).unwrap();

        let weekly = validator.weekly_loads(&current, &store).unwrap();
        let ids: Vec<u64> = weekly.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![8, 6]);
    }

    #[test]
    fn test_prime_second_daily_load_rejected() {
        let validator = validator();
        let mut store = SqliteStore::open_in_memory().unwrap();

        assert_eq!(submit(&mut store, &validator, tx(4, "10.00", "2024-07-30T08:00:00Z")), ValidationOutcome::Accepted);

        let outcome = submit(&mut store, &validator, tx(7, "10.00", "2024-07-30T09:00:00Z"));
        assert_eq!(outcome.details(), "prime id: more than one daily transaction");
    }

    #[test]
    fn test_prime_daily_total_boundary() {
        let validator = validator();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let accepted = submit(&mut store, &validator, tx(7, "9999.00", "2024-07-30T08:00:00Z"));
        assert!(accepted.is_accepted());

        let mut store = SqliteStore::open_in_memory().unwrap();
        let rejected = submit(&mut store, &validator, tx(13, "10000.00", "2024-07-30T08:00:00Z"));
        assert_eq!(rejected.details(), "prime id: daily total exceeds 9999");
    }

    #[test]
    fn test_prime_tier_has_no_weekly_cap() {
        let validator = validator();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let loads = [
            (2, "2024-07-30T08:00:00Z"),
            (3, "2024-07-31T08:00:00Z"),
            (5, "2024-08-01T08:00:00Z"),
            (7, "2024-08-02T08:00:00Z"),
        ];
        for (id, time) in loads {
            assert!(submit(&mut store, &validator, tx(id, "9000.00", time)).is_accepted());
        }
    }

    #[test]
    fn test_normal_fourth_daily_load_rejected() {
        let validator = validator();
        let mut store = SqliteStore::open_in_memory().unwrap();

        for (id, hour) in [(4, 1), (6, 2), (8, 3)] {
            let time = format!("2024-07-30T0{hour}:00:00Z");
            assert!(submit(&mut store, &validator, tx(id, "10.00", &time)).is_accepted());
        }

        let outcome = submit(&mut store, &validator, tx(9, "10.00", "2024-07-30T04:00:00Z"));
        assert_eq!(outcome.details(), "normal id: more than three daily transactions");
    }

    #[test]
    fn test_normal_daily_total_boundary() {
        let validator = validator();

        let mut store = SqliteStore::open_in_memory().unwrap();
        submit(&mut store, &validator, tx(4, "2500.00", "2024-07-30T01:00:00Z"));
        assert!(submit(&mut store, &validator, tx(6, "2500.00", "2024-07-30T02:00:00Z")).is_accepted());

        let mut store = SqliteStore::open_in_memory().unwrap();
        submit(&mut store, &validator, tx(4, "2500.00", "2024-07-30T01:00:00Z"));
        let outcome = submit(&mut store, &validator, tx(6, "2500.01", "2024-07-30T02:00:00Z"));
        assert_eq!(outcome.details(), "normal id: daily total exceeds 5000");
    }

    #[test]
    fn test_normal_weekly_total_boundary() {
        let validator = validator();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let loads = [
            (4, "2024-07-30T10:00:00Z"),
            (6, "2024-07-31T10:00:00Z"),
            (8, "2024-08-01T10:00:00Z"),
            (9, "2024-08-02T10:00:00Z"),
        ];
        for (id, time) in loads {
            let outcome = submit(&mut store, &validator, tx(id, "5000.00", time));
            assert!(outcome.is_accepted(), "weekly total up to 20000 is within the cap");
        }

        let outcome = submit(&mut store, &validator, tx(10, "0.01", "2024-08-03T10:00:00Z"));
        assert_eq!(outcome.details(), "normal id: weekly total exceeds 20000");
    }

    #[test]
    fn test_rejected_loads_still_count() {
        let validator = validator();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let outcome = submit(&mut store, &validator, tx(4, "6000.00", "2024-07-30T01:00:00Z"));
        assert!(!outcome.is_accepted());

        // The rejected 6000 stays in the window
        let outcome = submit(&mut store, &validator, tx(6, "1.00", "2024-07-30T02:00:00Z"));
        assert_eq!(outcome.details(), "normal id: daily total exceeds 5000");
    }

    #[test]
    fn test_monday_doubling_applies_to_daily_total() {
        let validator = validator();
        let mut store = SqliteStore::open_in_memory().unwrap();

        // 2600 on a Monday counts as 5200
        let outcome = submit(&mut store, &validator, tx(4, "2600.00", "2024-07-29T01:00:00Z"));
        assert_eq!(outcome.details(), "normal id: daily total exceeds 5000");

        let outcome = submit(&mut store, &validator, tx(6, "2600.00", "2024-07-30T01:00:00Z"));
        assert!(outcome.is_accepted());
    }

    #[test]
    fn test_monday_doubling_applies_to_weekly_total() {
        let validator = validator();
        let mut store = SqliteStore::open_in_memory().unwrap();

        // Monday 2500 counts as 5000, so the week reaches 20000 by Thursday
        assert!(submit(&mut store, &validator, tx(4, "2500.00", "2024-07-29T01:00:00Z")).is_accepted());
        assert!(submit(&mut store, &validator, tx(6, "5000.00", "2024-07-30T01:00:00Z")).is_accepted());
        assert!(submit(&mut store, &validator, tx(8, "5000.00", "2024-07-31T01:00:00Z")).is_accepted());
        assert!(submit(&mut store, &validator, tx(9, "5000.00", "2024-08-01T01:00:00Z")).is_accepted());

        let outcome = submit(&mut store, &validator, tx(10, "0.01", "2024-08-02T01:00:00Z"));
        assert_eq!(outcome.details(), "normal id: weekly total exceeds 20000");
    }

    #[test]
    fn test_custom_limits_render_in_reason() {
        let validator = Validator::new(RulesConfig {
            prime_limit: 100,
            prime: TierLimits::prime(),
            normal: TierLimits {
                max_daily_count: 12,
                max_daily_total: Decimal::new(5050, 2),
                max_weekly_total: None,
            },
        });
        let mut store = SqliteStore::open_in_memory().unwrap();
        let outcome = submit(&mut store, &validator, tx(4, "50.51", "2024-07-30T01:00:00Z"));
        assert_eq!(outcome.details(), "normal id: daily total exceeds 50.50");

        let reason = RejectionReason::DailyCount { tier: Tier::Normal, limit: 12 };
        assert_eq!(reason.to_string(), "normal id: more than 12 daily transactions");
    }

    #[test]
    fn test_accepted_details() {
        assert_eq!(ValidationOutcome::Accepted.details(), "valid");
    }
}

// 💵 Transaction - Immutable fund-load event
// Normalizes raw load requests into a strongly-typed value

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Wire format of the `time` field
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Largest transaction id; ids are stored as signed 64-bit integers
pub const MAX_ID: u64 = i64::MAX as u64;

/// Fractional digits of every amount
pub const AMOUNT_SCALE: u32 = 2;

const DATE_FORMAT: &str = "%Y-%m-%d";
const CLOCK_FORMAT: &str = "%H:%M:%S";

// ============================================================================
// ERRORS
// ============================================================================

/// Malformed input: fatal to the single record, never to the stream
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid transaction ID format: {0}")]
    InvalidId(String),

    #[error("Invalid customer ID format: {0}")]
    InvalidCustomerId(String),

    #[error("Invalid timestamp format: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid amount format: {0}")]
    InvalidAmount(String),

    #[error("Record fields disagree with full timestamp `{0}`")]
    InconsistentRecord(String),

    #[error("Unable to parse load request")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// LOAD REQUEST (normalizer input)
// ============================================================================

/// Identifier as it arrives on the wire: quoted or bare
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(u64),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Text(text) => f.write_str(text),
            RawId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One record of the input stream, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    pub id: Option<RawId>,
    pub customer_id: Option<RawId>,
    pub time: Option<String>,
    pub load_amount: Option<String>,
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// Validated fund-load event. Fields are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TransactionRecord", into = "TransactionRecord")]
pub struct Transaction {
    id: u64,
    customer_id: String,
    amount: Decimal,
    occurred_at: DateTime<Utc>,
    calendar_date: NaiveDate,
    timestamp: i64,
}

impl Transaction {
    /// Amounts must be non-negative, with at most two fractional digits, and
    /// representable at exactly two.
    pub fn new(id: u64, customer_id: &str, amount: Decimal, occurred_at: DateTime<Utc>) -> Result<Self, TransactionError> {
        if id > MAX_ID {
            return Err(TransactionError::InvalidId(id.to_string()));
        }
        if !is_all_digits(customer_id) {
            return Err(TransactionError::InvalidCustomerId(customer_id.to_string()));
        }
        if amount.is_sign_negative() || amount.scale() > AMOUNT_SCALE {
            return Err(TransactionError::InvalidAmount(amount.to_string()));
        }

        let mut amount = amount;
        amount.rescale(AMOUNT_SCALE);
        if amount.scale() != AMOUNT_SCALE {
            return Err(TransactionError::InvalidAmount(amount.to_string()));
        }

        Ok(Transaction {
            id,
            customer_id: customer_id.to_string(),
            amount,
            occurred_at,
            calendar_date: occurred_at.date_naive(),
            timestamp: occurred_at.timestamp(),
        })
    }

    /// Normalize one JSON line from the input stream
    pub fn parse_json(line: &str) -> Result<Self, TransactionError> {
        let request: LoadRequest = serde_json::from_str(line)?;
        Transaction::try_from(request)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// UTC calendar date of the event
    pub fn calendar_date(&self) -> NaiveDate {
        self.calendar_date
    }

    /// `HH:MM:SS` part of the event time
    pub fn clock_time(&self) -> String {
        self.occurred_at.format(CLOCK_FORMAT).to_string()
    }

    /// Epoch seconds
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl TryFrom<LoadRequest> for Transaction {
    type Error = TransactionError;

    fn try_from(request: LoadRequest) -> Result<Self, Self::Error> {
        let id = request.id.ok_or(TransactionError::MissingField("id"))?;
        let customer_id = request
            .customer_id
            .ok_or(TransactionError::MissingField("customer_id"))?;
        let time = request.time.ok_or(TransactionError::MissingField("time"))?;
        let load_amount = request
            .load_amount
            .ok_or(TransactionError::MissingField("load_amount"))?;

        let id = parse_id(&id.to_string())?;
        let customer_id = customer_id.to_string();
        if !is_all_digits(&customer_id) {
            return Err(TransactionError::InvalidCustomerId(customer_id));
        }
        let occurred_at = parse_timestamp(&time)?;
        let amount = parse_amount(&load_amount)?;

        Transaction::new(id, &customer_id, amount, occurred_at)
    }
}

fn is_all_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn parse_id(text: &str) -> Result<u64, TransactionError> {
    if !is_all_digits(text) {
        return Err(TransactionError::InvalidId(text.to_string()));
    }
    text.parse()
        .ok()
        .filter(|id| *id <= MAX_ID)
        .ok_or_else(|| TransactionError::InvalidId(text.to_string()))
}

/// Parse `YYYY-MM-DDTHH:MM:SSZ` as UTC
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, TransactionError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| TransactionError::InvalidTimestamp(text.to_string()))
}

/// Parse `[USD]$<digits>.<2 digits>`
pub fn parse_amount(text: &str) -> Result<Decimal, TransactionError> {
    let invalid = || TransactionError::InvalidAmount(text.to_string());

    let unprefixed = text.strip_prefix("USD").unwrap_or(text);
    let number = unprefixed.strip_prefix('$').ok_or_else(invalid)?;
    let (whole, cents) = number.split_once('.').ok_or_else(invalid)?;

    if !is_all_digits(whole) || cents.len() != 2 || !is_all_digits(cents) {
        return Err(invalid());
    }

    // Too many digits to hold at cents precision
    Decimal::from_str(number)
        .ok()
        .filter(|amount| amount.scale() == AMOUNT_SCALE)
        .ok_or_else(invalid)
}

// ============================================================================
// LEDGER / STORE RECORD
// ============================================================================

/// Serialized shape of a transaction in the store and in sealed blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub customer_id: String,
    pub calendar_date: String,
    pub clock_time: String,
    pub full_timestamp: String,
    pub amount: Decimal,
}

impl From<Transaction> for TransactionRecord {
    fn from(tx: Transaction) -> Self {
        TransactionRecord {
            id: tx.id,
            calendar_date: tx.calendar_date.format(DATE_FORMAT).to_string(),
            clock_time: tx.clock_time(),
            full_timestamp: tx.occurred_at.format(TIMESTAMP_FORMAT).to_string(),
            customer_id: tx.customer_id,
            amount: tx.amount,
        }
    }
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = TransactionError;

    fn try_from(record: TransactionRecord) -> Result<Self, Self::Error> {
        let occurred_at = parse_timestamp(&record.full_timestamp)?;
        let tx = Transaction::new(record.id, &record.customer_id, record.amount, occurred_at)?;

        let date_matches = tx.calendar_date.format(DATE_FORMAT).to_string() == record.calendar_date;
        if !date_matches || tx.clock_time() != record.clock_time {
            return Err(TransactionError::InconsistentRecord(record.full_timestamp));
        }

        Ok(tx)
    }
}

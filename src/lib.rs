// Fund Load Velocity Limits - Core Library
// Exposes all modules for use in CLI, API server, and tests

#![forbid(unsafe_code)]

pub mod config;
pub mod ledger;
pub mod pipeline;
pub mod primes;
pub mod rules;
pub mod store;
pub mod temporal;
pub mod transaction;

// Re-export commonly used types
pub use config::{Config, ConfigError, PathsConfig};
pub use ledger::{
    Block, ChainStore, JsonChainStore, Ledger, LedgerConfig, LedgerError, LedgerState, LinkMode,
    GENESIS_REFERENCE,
};
pub use pipeline::{Pipeline, PipelineError, ResultWriter, RunSummary, ValidationRecord};
pub use primes::{PrimeSet, DEFAULT_PRIME_LIMIT};
pub use rules::{RejectionReason, RulesConfig, Tier, TierLimits, ValidationOutcome, Validator};
pub use store::{AggregationStore, SqliteStore, StoreError};
pub use temporal::{is_monday, total_load_amount, TimeWindow};
pub use transaction::{LoadRequest, RawId, Transaction, TransactionError, TransactionRecord, MAX_ID};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pipeline wired to the on-disk backends named in `config`
pub fn open_pipeline(config: &Config) -> Result<Pipeline<SqliteStore, JsonChainStore>, PipelineError> {
    if let Some(parent) = config.paths.database.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(PipelineError::Write)?;
    }

    let store = SqliteStore::open(&config.paths.database)?;
    let validator = Validator::new(config.rules.clone());
    let ledger = Ledger::open(JsonChainStore::new(&config.paths.chain), config.ledger.clone())?;

    Ok(Pipeline::new(store, validator, ledger))
}

/// Pipeline for a fresh run: the previous chain file is deleted and the
/// aggregation store emptied, so re-running an input does not seal its loads twice.
pub fn open_fresh_pipeline(config: &Config) -> Result<Pipeline<SqliteStore, JsonChainStore>, PipelineError> {
    JsonChainStore::new(&config.paths.chain).clear()?;

    let mut pipeline = open_pipeline(config)?;
    pipeline.store_mut().reset()?;
    Ok(pipeline)
}

// 📒 Ledger - Batched append-only log of accepted loads
//
// Accepted transactions wait in a pending buffer. A batching condition seals
// the buffer into an indexed Block and the full chain is rewritten. The
// previous_reference field is an administrative link, not a security feature.

use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// previous_reference of the first block
pub const GENESIS_REFERENCE: &str = "1";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Unable to access chain file `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to (de)serialize the chain")]
    Serialize(#[from] serde_json::Error),

    #[error("Corrupt chain: {0}")]
    CorruptChain(String),

    #[error("batch_size must be at least 1")]
    InvalidBatchSize,
}

// ============================================================================
// BLOCK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// 1-based position in the chain
    pub index: u64,

    /// Opaque link carried between blocks
    pub previous_reference: String,

    /// Epoch seconds at seal time
    pub created_at: i64,

    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Hex SHA-256 of the block's JSON form
    pub fn digest(&self) -> Result<String, LedgerError> {
        let json = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&json)))
    }
}

// ============================================================================
// PERSISTENCE
// ============================================================================

/// Durable home of the sealed chain. `save` always receives the whole chain.
pub trait ChainStore {
    fn load(&self) -> Result<Vec<Block>, LedgerError>;
    fn save(&mut self, chain: &[Block]) -> Result<(), LedgerError>;
}

/// Chain persisted as one pretty-printed JSON array
pub struct JsonChainStore {
    path: PathBuf,
}

impl JsonChainStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        JsonChainStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the chain file. A missing file is already clear.
    pub fn clear(&self) -> Result<(), LedgerError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "chain file removed");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ChainStore for JsonChainStore {
    fn load(&self) -> Result<Vec<Block>, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.io_error(err)),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_str(&content)?)
    }

    fn save(&mut self, chain: &[Block]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_vec_pretty(chain)?;

        // Write aside, then rename over the old chain
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path).map_err(|e| self.io_error(e))?;
        file.write_all(&json).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))?;

        Ok(())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Copy the prior block's previous_reference
    #[default]
    CarryForward,

    /// SHA-256 of the prior block
    ContentDigest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Pending transactions that trigger a seal
    pub batch_size: usize,

    /// Seconds since the last seal that trigger a seal on the next add
    pub batch_interval_secs: Option<u64>,

    pub link_mode: LinkMode,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            batch_size: 1,
            batch_interval_secs: None,
            link_mode: LinkMode::CarryForward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    /// Nothing pending
    Empty,
    /// Pending transactions below the batch size
    Accumulating(usize),
}

// ============================================================================
// LEDGER
// ============================================================================

pub struct Ledger<P: ChainStore> {
    store: P,
    config: LedgerConfig,
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    last_seal: DateTime<Utc>,
}

impl<P: ChainStore> Ledger<P> {
    /// Load the persisted chain, sealing a genesis block if it is empty
    pub fn open(store: P, config: LedgerConfig) -> Result<Self, LedgerError> {
        Self::open_at(store, config, Utc::now())
    }

    pub fn open_at(store: P, config: LedgerConfig, now: DateTime<Utc>) -> Result<Self, LedgerError> {
        if config.batch_size == 0 {
            return Err(LedgerError::InvalidBatchSize);
        }

        let chain = store.load()?;
        verify_indices(&chain)?;

        let mut ledger = Ledger {
            store,
            config,
            chain,
            pending: Vec::new(),
            last_seal: now,
        };

        if ledger.chain.is_empty() {
            ledger.seal_at(now)?;
            info!("sealed genesis block");
        }

        info!(blocks = ledger.chain.len(), "ledger initialized");
        Ok(ledger)
    }

    /// Buffer an accepted transaction. Returns the index of a newly sealed block.
    pub fn add(&mut self, tx: Transaction) -> Result<Option<u64>, LedgerError> {
        self.add_at(tx, Utc::now())
    }

    pub fn add_at(&mut self, tx: Transaction, now: DateTime<Utc>) -> Result<Option<u64>, LedgerError> {
        self.pending.push(tx);

        if self.should_seal(now) {
            return self.seal_at(now).map(Some);
        }

        Ok(None)
    }

    /// Seal whatever is pending, if anything
    pub fn flush(&mut self) -> Result<Option<u64>, LedgerError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        self.seal_at(Utc::now()).map(Some)
    }

    fn should_seal(&self, now: DateTime<Utc>) -> bool {
        if self.pending.len() >= self.config.batch_size {
            return true;
        }

        match self.config.batch_interval_secs {
            Some(secs) => (now - self.last_seal).num_seconds() >= secs as i64,
            None => false,
        }
    }

    fn next_reference(&self) -> Result<String, LedgerError> {
        let Some(last) = self.chain.last() else {
            return Ok(GENESIS_REFERENCE.to_string());
        };

        match self.config.link_mode {
            LinkMode::CarryForward => Ok(last.previous_reference.clone()),
            LinkMode::ContentDigest => last.digest(),
        }
    }

    /// Move the whole pending buffer into a new block and persist the chain.
    /// On a failed write, the block is dropped and the buffer restored.
    fn seal_at(&mut self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let block = Block {
            index: self.chain.len() as u64 + 1,
            previous_reference: self.next_reference()?,
            created_at: now.timestamp(),
            transactions: std::mem::take(&mut self.pending),
        };
        let index = block.index;
        self.chain.push(block);

        if let Err(err) = self.store.save(&self.chain) {
            if let Some(block) = self.chain.pop() {
                self.pending = block.transactions;
            }
            return Err(err);
        }

        self.last_seal = now;
        let sealed = self.chain.last().map_or(0, |b| b.transactions.len());
        debug!(index, transactions = sealed, "sealed block");
        Ok(index)
    }

    /// Sealed blocks only
    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn state(&self) -> LedgerState {
        match self.pending.len() {
            0 => LedgerState::Empty,
            n => LedgerState::Accumulating(n),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

fn verify_indices(chain: &[Block]) -> Result<(), LedgerError> {
    for (position, block) in chain.iter().enumerate() {
        let expected = position as u64 + 1;
        if block.index != expected {
            return Err(LedgerError::CorruptChain(format!(
                "block at position {} has index {}, expected {}",
                position, block.index, expected
            )));
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

// 🔁 Pipeline - normalize → store.insert → validate → record result → ledger.add
// Single writer: each record is fully processed before the next one starts.

use crate::ledger::{ChainStore, Ledger, LedgerError};
use crate::rules::{ValidationOutcome, Validator};
use crate::store::{AggregationStore, StoreError};
use crate::transaction::{Transaction, TransactionError};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed input")]
    MalformedInput(#[from] TransactionError),

    #[error("Aggregation store failure")]
    Store(#[from] StoreError),

    #[error("Ledger persistence failure")]
    Persistence(#[from] LedgerError),

    #[error("Failed to read input")]
    Read(#[source] std::io::Error),

    #[error("Failed to write validation results")]
    Write(#[source] std::io::Error),

    #[error("Failed to encode validation result")]
    Encode(#[source] serde_json::Error),
}

// ============================================================================
// VALIDATION RESULT
// ============================================================================

/// Result emitted for every processed transaction, accepted or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub id: String,
    pub customer_id: String,
    pub accepted: bool,
    pub details: String,
}

impl ValidationRecord {
    pub fn new(tx: &Transaction, outcome: &ValidationOutcome) -> Self {
        ValidationRecord {
            id: tx.id().to_string(),
            customer_id: tx.customer_id().to_string(),
            accepted: outcome.is_accepted(),
            details: outcome.details(),
        }
    }
}

/// `{id, customer_id, accepted}`
#[derive(Serialize)]
struct CompactRecord<'a> {
    id: &'a str,
    customer_id: &'a str,
    accepted: bool,
}

impl<'a> From<&'a ValidationRecord> for CompactRecord<'a> {
    fn from(record: &'a ValidationRecord) -> Self {
        CompactRecord {
            id: &record.id,
            customer_id: &record.customer_id,
            accepted: record.accepted,
        }
    }
}

/// JSON-lines sink for validation results, in compact and detailed form
pub struct ResultWriter<W: Write> {
    compact: W,
    detailed: Option<W>,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(compact: W) -> Self {
        ResultWriter {
            compact,
            detailed: None,
        }
    }

    pub fn with_detailed(compact: W, detailed: W) -> Self {
        ResultWriter {
            compact,
            detailed: Some(detailed),
        }
    }

    pub fn write(&mut self, record: &ValidationRecord) -> Result<(), PipelineError> {
        write_line(&mut self.compact, &CompactRecord::from(record))?;
        if let Some(detailed) = self.detailed.as_mut() {
            write_line(detailed, record)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), PipelineError> {
        self.compact.flush().map_err(PipelineError::Write)?;
        if let Some(detailed) = self.detailed.as_mut() {
            detailed.flush().map_err(PipelineError::Write)?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> (W, Option<W>) {
        (self.compact, self.detailed)
    }
}

fn write_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), PipelineError> {
    serde_json::to_writer(&mut *out, value).map_err(PipelineError::Encode)?;
    out.write_all(b"\n").map_err(PipelineError::Write)
}

// ============================================================================
// RUN SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub malformed: usize,
    pub seal_failures: usize,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline<S: AggregationStore, P: ChainStore> {
    store: S,
    validator: Validator,
    ledger: Ledger<P>,
    seal_failures: usize,
}

impl<S: AggregationStore, P: ChainStore> Pipeline<S, P> {
    pub fn new(store: S, validator: Validator, ledger: Ledger<P>) -> Self {
        Pipeline {
            store,
            validator,
            ledger,
            seal_failures: 0,
        }
    }

    /// Insert, validate, and hand accepted loads to the ledger.
    ///
    /// A failed seal does not fail the transaction: it stays pending and the
    /// next seal retries it.
    pub fn process(&mut self, tx: Transaction) -> Result<ValidationRecord, PipelineError> {
        self.store.insert(&tx)?;
        let outcome = self.validator.validate(&tx, &self.store)?;
        let record = ValidationRecord::new(&tx, &outcome);

        if let ValidationOutcome::Rejected(reason) = &outcome {
            info!(id = tx.id(), customer_id = tx.customer_id(), %reason, "load rejected");
            return Ok(record);
        }

        if let Err(err) = self.ledger.add(tx) {
            self.seal_failures += 1;
            error!(error = %err, pending = self.ledger.pending().len(), "seal failed, batch kept pending");
        }

        Ok(record)
    }

    /// Normalize one JSON line, then process it
    pub fn process_line(&mut self, line: &str) -> Result<ValidationRecord, PipelineError> {
        let tx = Transaction::parse_json(line)?;
        self.process(tx)
    }

    /// Process a JSON-lines stream. Malformed lines are skipped, store failures abort.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: R,
        results: &mut ResultWriter<W>,
    ) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();
        let failures_before = self.seal_failures;

        for (number, line) in input.lines().enumerate() {
            let line = line.map_err(PipelineError::Read)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let record = match self.process_line(line) {
                Ok(record) => record,
                Err(PipelineError::MalformedInput(err)) => {
                    warn!(line = number + 1, error = %err, "skipping malformed record");
                    summary.malformed += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };

            summary.processed += 1;
            if record.accepted {
                summary.accepted += 1;
            } else {
                summary.rejected += 1;
            }
            results.write(&record)?;
        }

        results.flush()?;
        self.ledger.flush()?;
        summary.seal_failures = self.seal_failures - failures_before;

        info!(
            processed = summary.processed,
            accepted = summary.accepted,
            rejected = summary.rejected,
            malformed = summary.malformed,
            blocks = self.ledger.chain().len(),
            "run complete"
        );
        Ok(summary)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn ledger(&self) -> &Ledger<P> {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger<P> {
        &mut self.ledger
    }

    /// Seals that failed since this pipeline was created
    pub fn seal_failures(&self) -> usize {
        self.seal_failures
    }
}

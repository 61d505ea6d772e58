//! Partial-failure aggregation for batch submission

use crate::error::GatewayError;

use ethers::types::H256;
use std::collections::BTreeMap;
use std::fmt;

/// Key under which a failed batch item is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKey {
    /// The item has a transaction hash
    Hash(H256),
    /// Wire bytes at this index could not be decoded, whether submitted by
    /// the caller or returned by the node's signer
    Undecodable(usize),
    /// Argument set at this index failed before the node returned signed bytes
    Unsigned(usize),
}

impl fmt::Display for FailureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKey::Hash(hash) => write!(f, "{:?}", hash),
            FailureKey::Undecodable(index) => write!(f, "undecodable:{}", index),
            FailureKey::Unsigned(index) => write!(f, "unsigned:{}", index),
        }
    }
}

/// Outcome of a single batch item
pub type ItemOutcome = Result<H256, (FailureKey, GatewayError)>;

/// Result of a batch call: every succeeded hash plus a keyed failure report.
///
/// Failures of distinct items that share a transaction hash collapse into
/// one entry; the last one recorded wins.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub hashes: Vec<H256>,
    pub failures: BTreeMap<String, String>,
}

impl BatchOutcome {
    /// Fold per-item outcomes, keeping input order among successes
    pub fn collect<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = ItemOutcome>,
    {
        outcomes
            .into_iter()
            .fold(BatchOutcome::default(), |mut batch, outcome| {
                batch.record(outcome);
                batch
            })
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            Ok(hash) => self.hashes.push(hash),
            Err((key, err)) => {
                self.failures.insert(key.to_string(), err.to_string());
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Aggregate error for the failed items, if any.
    ///
    /// The message is a JSON object mapping failure key to error text. A
    /// failure to serialize the report is returned in its place.
    pub fn error(&self) -> Option<GatewayError> {
        if self.failures.is_empty() {
            return None;
        }

        match serde_json::to_string(&self.failures) {
            Ok(report) => Some(GatewayError::BatchFailed(report)),
            Err(e) => Some(GatewayError::Serialization(e)),
        }
    }

    /// Split into the succeeded hashes and the aggregate error
    pub fn into_parts(self) -> (Vec<H256>, Option<GatewayError>) {
        let error = self.error();
        (self.hashes, error)
    }
}

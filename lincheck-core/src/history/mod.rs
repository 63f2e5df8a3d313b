//! Recorded operation histories
//!
//! A [`History`] is the flat, log-ordered list of records read from an
//! operations log. [`partition`] splits it into independent per-key
//! sub-histories for checking.

use std::path::Path;

use tracing::info;

use crate::error::{LincheckError, LincheckResult};
use crate::types::{number_records, OperationRecord};

pub mod parser;
pub mod partition;

pub use parser::{parse_line, parse_log};
pub use partition::{check_client_sequential, partition, PerKeyHistory};

/// Complete history of recorded operations, in log order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    records: Vec<OperationRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history, renumbering record ids in the given order
    pub fn from_records(mut records: Vec<OperationRecord>) -> Self {
        number_records(&mut records);
        Self { records }
    }

    /// Append a record, assigning it the next id
    pub fn push(&mut self, mut record: OperationRecord) {
        record.id = self.records.len();
        self.records.push(record);
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Split into (confirmed, ambiguous) records, preserving log order
    pub fn split_by_outcome(&self) -> (Vec<OperationRecord>, Vec<OperationRecord>) {
        self.records
            .iter()
            .cloned()
            .partition(OperationRecord::is_confirmed)
    }
}

/// Read and parse an operations log from disk
pub async fn load_log(path: &Path) -> LincheckResult<History> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LincheckError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let history = parse_log(&contents)?;
    info!(
        path = %path.display(),
        records = history.len(),
        "Parsed operations log"
    );
    Ok(history)
}

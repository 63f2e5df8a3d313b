// Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::io::Write;

use lincheck_core::{
    History, Operation, OperationRecord, Outcome, Validator, ValidatorConfig,
    ValidatorConfigBuilder,
};
use tempfile::NamedTempFile;

/// Render a record in the nine-field log format
pub fn log_line(record: &OperationRecord) -> String {
    let (op, key, value, response) = match &record.operation {
        Operation::Get { key, response } => ("get", key, "None", response.as_str()),
        Operation::Put { key, value } => ("put", key, value.as_str(), "None"),
        Operation::Append { key, value } => ("append", key, value.as_str(), "None"),
    };
    let response = if response.is_empty() { "None" } else { response };
    let success = match record.outcome {
        Outcome::Confirmed => "True",
        Outcome::Ambiguous => "False",
    };
    let client = if record.anonymous {
        "unknown".to_string()
    } else {
        record.client_id.to_string()
    };
    format!(
        "{},{},{},{},{},{},{},{},None",
        client, op, record.call_time, record.return_time, key, value, response, success
    )
}

/// Write raw lines to a temporary operations log
pub fn write_log<S: AsRef<str>>(lines: &[S]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line.as_ref()).unwrap();
    }
    file.flush().unwrap();
    file
}

/// Write records to a temporary operations log
pub fn write_records(records: &[OperationRecord]) -> NamedTempFile {
    let lines: Vec<String> = records.iter().map(log_line).collect();
    write_log(&lines)
}

pub fn sequential_config() -> ValidatorConfig {
    ValidatorConfigBuilder::new()
        .parallel(false)
        .build()
        .unwrap()
}

pub fn parallel_config(workers: usize) -> ValidatorConfig {
    ValidatorConfigBuilder::new()
        .parallel(true)
        .workers(workers)
        .build()
        .unwrap()
}

pub fn sequential_validator() -> Validator {
    Validator::new(sequential_config())
}

pub fn history(records: Vec<OperationRecord>) -> History {
    History::from_records(records)
}

//! Operations log parsing
//!
//! Each non-blank line carries exactly nine comma-separated fields:
//!
//! ```text
//! client_id,op_name,call_time,return_time,key,value,response,success_flag,revision
//! ```
//!
//! The literal token `None` stands for an empty `value`/`response` and an
//! absent `revision`. A `success_flag` of `False` marks the operation as
//! ambiguous; any other flag counts as confirmed.

use tracing::debug;

use crate::error::{LincheckError, LincheckResult};
use crate::types::{Operation, OperationRecord, Outcome};

use super::History;

pub const FIELD_COUNT: usize = 9;
pub const NONE_TOKEN: &str = "None";
pub const FAILED_FLAG: &str = "False";

/// Parse a whole log into a history, numbering records in log order
pub fn parse_log(contents: &str) -> LincheckResult<History> {
    let mut records = Vec::new();
    for (index, raw) in contents.lines().enumerate() {
        if let Some(record) = parse_line(index + 1, raw)? {
            records.push(record);
        }
    }
    Ok(History::from_records(records))
}

/// Parse one log line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: usize, raw: &str) -> LincheckResult<Option<OperationRecord>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
    if fields.len() != FIELD_COUNT {
        return Err(LincheckError::parse(
            line,
            raw,
            format!(
                "expected {} comma-separated fields, found {}",
                FIELD_COUNT,
                fields.len()
            ),
        ));
    }

    let (client_id, anonymous) = match fields[0].parse::<u64>() {
        Ok(id) => (id, false),
        Err(_) => {
            debug!(line, client = fields[0], "Unparseable client id, using 0");
            (0, true)
        }
    };

    let call_time = parse_time(line, raw, "call_time", fields[2])?;
    let return_time = parse_time(line, raw, "return_time", fields[3])?;
    if call_time > return_time {
        return Err(LincheckError::parse(
            line,
            raw,
            format!(
                "call_time {} is later than return_time {}",
                call_time, return_time
            ),
        ));
    }

    let key = fields[4].to_string();
    let value = none_to_empty(fields[5]);
    let response = none_to_empty(fields[6]);

    let operation = match fields[1] {
        "get" => Operation::Get { key, response },
        "put" => Operation::Put { key, value },
        "append" => Operation::Append { key, value },
        other => {
            return Err(LincheckError::parse(
                line,
                raw,
                format!("unknown operation '{}'", other),
            ))
        }
    };

    let outcome = if fields[7] == FAILED_FLAG {
        Outcome::Ambiguous
    } else {
        Outcome::Confirmed
    };

    let revision = match fields[8] {
        NONE_TOKEN | "" => None,
        other => Some(other.to_string()),
    };

    Ok(Some(OperationRecord {
        id: 0,
        line,
        client_id,
        anonymous,
        operation,
        call_time,
        return_time,
        outcome,
        revision,
    }))
}

fn parse_time(line: usize, raw: &str, field: &str, value: &str) -> LincheckResult<i64> {
    value.parse::<i64>().map_err(|_| {
        LincheckError::parse(line, raw, format!("invalid {} '{}'", field, value))
    })
}

fn none_to_empty(token: &str) -> String {
    if token == NONE_TOKEN {
        String::new()
    } else {
        token.to_string()
    }
}

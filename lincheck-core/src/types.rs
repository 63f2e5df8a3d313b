//! Operation records as they appear in a recorded history

use std::fmt;

use serde::{Deserialize, Serialize};

/// Client-observed outcome of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The client saw the operation succeed
    Confirmed,
    /// The client saw a failure or timeout; the server-side effect is unknown
    Ambiguous,
}

/// A key-value operation together with the payload relevant to its kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Get { key: String, response: String },
    Put { key: String, value: String },
    Append { key: String, value: String },
}

impl Operation {
    pub fn key(&self) -> &str {
        match self {
            Operation::Get { key, .. }
            | Operation::Put { key, .. }
            | Operation::Append { key, .. } => key,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Get { .. } => "get",
            Operation::Put { .. } => "put",
            Operation::Append { .. } => "append",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Get { key, response } => write!(f, "get('{}') -> '{}'", key, response),
            Operation::Put { key, value } => write!(f, "put('{}', '{}')", key, value),
            Operation::Append { key, value } => write!(f, "append('{}', '{}')", key, value),
        }
    }
}

/// A single completed call recorded by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Position of the record in its history, unique within a run
    pub id: usize,
    /// 1-based line in the source log, 0 for records built in code
    pub line: usize,
    pub client_id: u64,
    /// The producer's client id did not parse; `client_id` is a placeholder
    /// and the record is not ordered against any other record by client
    #[serde(default)]
    pub anonymous: bool,
    pub operation: Operation,
    pub call_time: i64,
    pub return_time: i64,
    pub outcome: Outcome,
    /// Raw revision annotation from the producer, kept for diagnostics only
    pub revision: Option<String>,
}

impl OperationRecord {
    fn new(client_id: u64, operation: Operation, call_time: i64, return_time: i64) -> Self {
        Self {
            id: 0,
            line: 0,
            client_id,
            anonymous: false,
            operation,
            call_time,
            return_time,
            outcome: Outcome::Confirmed,
            revision: None,
        }
    }

    /// A confirmed get that observed `response`
    pub fn get(
        client_id: u64,
        key: impl Into<String>,
        response: impl Into<String>,
        call_time: i64,
        return_time: i64,
    ) -> Self {
        Self::new(
            client_id,
            Operation::Get {
                key: key.into(),
                response: response.into(),
            },
            call_time,
            return_time,
        )
    }

    /// A confirmed put of `value`
    pub fn put(
        client_id: u64,
        key: impl Into<String>,
        value: impl Into<String>,
        call_time: i64,
        return_time: i64,
    ) -> Self {
        Self::new(
            client_id,
            Operation::Put {
                key: key.into(),
                value: value.into(),
            },
            call_time,
            return_time,
        )
    }

    /// A confirmed append of `value`
    pub fn append(
        client_id: u64,
        key: impl Into<String>,
        value: impl Into<String>,
        call_time: i64,
        return_time: i64,
    ) -> Self {
        Self::new(
            client_id,
            Operation::Append {
                key: key.into(),
                value: value.into(),
            },
            call_time,
            return_time,
        )
    }

    /// Mark the record as ambiguous (client observed failure or timeout)
    #[must_use]
    pub fn ambiguous(mut self) -> Self {
        self.outcome = Outcome::Ambiguous;
        self
    }

    /// Detach the record from any client, as for an unparseable client id
    #[must_use]
    pub fn without_client(mut self) -> Self {
        self.client_id = 0;
        self.anonymous = true;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub fn key(&self) -> &str {
        self.operation.key()
    }

    pub fn is_confirmed(&self) -> bool {
        self.outcome == Outcome::Confirmed
    }
}

impl fmt::Display for OperationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "client {} {} [{}, {}]",
            self.client_id, self.operation, self.call_time, self.return_time
        )?;
        if self.outcome == Outcome::Ambiguous {
            write!(f, " (ambiguous)")?;
        }
        Ok(())
    }
}

/// Assign sequential ids in slice order
pub fn number_records(records: &mut [OperationRecord]) {
    for (id, record) in records.iter_mut().enumerate() {
        record.id = id;
    }
}

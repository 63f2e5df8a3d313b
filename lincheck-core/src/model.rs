//! Sequential specifications that linearizations are checked against
//!
//! The checker is generic over [`Specification`], so alternative key-value
//! semantics can be plugged in without touching the search.

use std::fmt::Debug;
use std::hash::Hash;

use crate::types::Operation;

/// Trait for sequential specifications of a single key's behaviour
pub trait Specification: Send + Sync {
    /// Abstract state of one key
    type State: Clone + Eq + Hash + Debug + Send;

    /// State at the start of every linearization
    fn init(&self) -> Self::State;

    /// Apply `operation` to `state`.
    ///
    /// Returns the successor state when the model accepts the operation's
    /// observed response, `None` when it rejects it. Must be pure.
    fn step(&self, state: &Self::State, operation: &Operation) -> Option<Self::State>;
}

/// Get/put/append over string values, starting from the empty string
#[derive(Debug, Clone, Copy, Default)]
pub struct KvSpecification;

impl KvSpecification {
    pub fn new() -> Self {
        Self
    }
}

impl Specification for KvSpecification {
    type State = String;

    fn init(&self) -> String {
        String::new()
    }

    fn step(&self, state: &String, operation: &Operation) -> Option<String> {
        match operation {
            Operation::Get { response, .. } => (response == state).then(|| state.clone()),
            Operation::Put { value, .. } => Some(value.clone()),
            Operation::Append { value, .. } => {
                let mut next = String::with_capacity(state.len() + value.len());
                next.push_str(state);
                next.push_str(value);
                Some(next)
            }
        }
    }
}

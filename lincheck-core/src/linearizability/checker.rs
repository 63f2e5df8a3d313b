//! Backtracking linearizability search with memoization
//!
//! The search extends a linearized prefix one operation at a time. An
//! operation may be appended when every operation that returned strictly
//! before it was called is already in the prefix, and when it is the
//! earliest remaining operation of its client. Each reachable
//! (linearized set, model state) pair is explored at most once.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::history::{partition, PerKeyHistory};
use crate::model::Specification;
use crate::types::OperationRecord;

use super::CancellationFlag;

/// Result of checking one per-key history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Record ids in a valid linearization order
    Linearizable { order: Vec<usize> },
    /// Record ids of the longest prefix that could be linearized
    NotLinearizable { longest_prefix: Vec<usize> },
    /// The search was stopped through its cancellation flag
    Cancelled,
}

impl CheckOutcome {
    pub fn is_linearizable(&self) -> bool {
        matches!(self, CheckOutcome::Linearizable { .. })
    }
}

/// Set of linearized operation indices, inline for partitions up to 256 ops
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LinearizedSet(SmallVec<[u64; 4]>);

impl LinearizedSet {
    fn with_capacity(bits: usize) -> Self {
        Self(SmallVec::from_elem(0, bits.div_ceil(64)))
    }

    fn insert(&mut self, index: usize) {
        self.0[index / 64] |= 1 << (index % 64);
    }

    fn remove(&mut self, index: usize) {
        self.0[index / 64] &= !(1 << (index % 64));
    }

    fn contains(&self, index: usize) -> bool {
        self.0[index / 64] & (1 << (index % 64)) != 0
    }
}

/// One level of the explicit search stack
struct Frame<T> {
    state: T,
    candidates: Vec<usize>,
    next: usize,
}

/// Per-operation data the search needs, indexed in call order
struct Entry<'h> {
    record: &'h OperationRecord,
    /// Index of the same client's previous operation in this partition
    client_prev: Option<usize>,
}

/// Linearizability checker for a sequential [`Specification`]
pub struct LinearizabilityChecker<'s, S: Specification> {
    spec: &'s S,
    cancel: Option<CancellationFlag>,
}

impl<'s, S: Specification> LinearizabilityChecker<'s, S> {
    pub fn new(spec: &'s S) -> Self {
        Self { spec, cancel: None }
    }

    /// Stop searching once `flag` is cancelled
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationFlag::is_cancelled)
    }

    /// Check every key of `records` in turn, stopping at the first failure.
    ///
    /// A cancelled search counts as a failure.
    pub fn is_linearizable(&self, records: &[OperationRecord]) -> bool {
        partition(records)
            .iter()
            .all(|history| self.check_partition(history).is_linearizable())
    }

    /// Decide whether a single-key history has a linearization
    pub fn check_partition(&self, history: &PerKeyHistory) -> CheckOutcome {
        let entries = index_entries(history.records());
        let total = entries.len();
        if total == 0 {
            return CheckOutcome::Linearizable { order: Vec::new() };
        }

        let mut linearized = LinearizedSet::with_capacity(total);
        let mut path: Vec<usize> = Vec::with_capacity(total);
        let mut longest: Vec<usize> = Vec::new();
        let mut memo: FxHashSet<(LinearizedSet, S::State)> = FxHashSet::default();

        let mut stack = vec![Frame {
            state: self.spec.init(),
            candidates: enabled(&entries, &linearized),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            if self.is_cancelled() {
                debug!(key = history.key(), "Linearizability search cancelled");
                return CheckOutcome::Cancelled;
            }

            if frame.next == frame.candidates.len() {
                stack.pop();
                if let Some(index) = path.pop() {
                    linearized.remove(index);
                }
                continue;
            }

            let index = frame.candidates[frame.next];
            frame.next += 1;

            let operation = &entries[index].record.operation;
            let Some(state) = self.spec.step(&frame.state, operation) else {
                trace!(%operation, "Rejected by model");
                continue;
            };

            linearized.insert(index);
            if !memo.insert((linearized.clone(), state.clone())) {
                linearized.remove(index);
                continue;
            }
            path.push(index);

            if path.len() == total {
                debug!(
                    key = history.key(),
                    operations = total,
                    explored = memo.len(),
                    "Partition is linearizable"
                );
                return CheckOutcome::Linearizable {
                    order: record_ids(&entries, &path),
                };
            }
            if path.len() > longest.len() {
                longest.clone_from(&path);
            }

            let candidates = enabled(&entries, &linearized);
            stack.push(Frame {
                state,
                candidates,
                next: 0,
            });
        }

        debug!(
            key = history.key(),
            operations = total,
            longest_prefix = longest.len(),
            explored = memo.len(),
            "Partition is not linearizable"
        );
        CheckOutcome::NotLinearizable {
            longest_prefix: record_ids(&entries, &longest),
        }
    }
}

fn index_entries(records: &[OperationRecord]) -> Vec<Entry<'_>> {
    let mut last_by_client = rustc_hash::FxHashMap::default();
    records
        .iter()
        .enumerate()
        .map(|(index, record)| Entry {
            record,
            client_prev: if record.anonymous {
                None
            } else {
                last_by_client.insert(record.client_id, index)
            },
        })
        .collect()
}

/// Operations that may be linearized next.
///
/// Entries are in call order, so once a call time passes the earliest
/// pending return no later entry can be enabled either.
fn enabled(entries: &[Entry<'_>], linearized: &LinearizedSet) -> Vec<usize> {
    let earliest_return = entries
        .iter()
        .enumerate()
        .filter(|(index, _)| !linearized.contains(*index))
        .map(|(_, entry)| entry.record.return_time)
        .min();
    let Some(earliest_return) = earliest_return else {
        return Vec::new();
    };

    entries
        .iter()
        .enumerate()
        .take_while(|(_, entry)| entry.record.call_time <= earliest_return)
        .filter(|(index, entry)| {
            !linearized.contains(*index)
                && entry.client_prev.map_or(true, |prev| linearized.contains(prev))
        })
        .map(|(index, _)| index)
        .collect()
}

fn record_ids(entries: &[Entry<'_>], path: &[usize]) -> Vec<usize> {
    path.iter().map(|&index| entries[index].record.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;
    use crate::model::KvSpecification;
    use crate::types::Operation;

    fn check(records: Vec<OperationRecord>) -> CheckOutcome {
        let history = History::from_records(records);
        let parts = partition(history.records());
        assert_eq!(parts.len(), 1, "helper expects a single key");
        LinearizabilityChecker::new(&KvSpecification).check_partition(&parts[0])
    }

    #[test]
    fn test_sequential_put_then_get() {
        let outcome = check(vec![
            OperationRecord::put(1, "a", "1", 0, 1),
            OperationRecord::get(1, "a", "1", 2, 3),
        ]);
        assert_eq!(outcome, CheckOutcome::Linearizable { order: vec![0, 1] });
    }

    #[test]
    fn test_stale_read_after_put_returns() {
        let outcome = check(vec![
            OperationRecord::put(1, "a", "1", 0, 1),
            OperationRecord::get(2, "a", "", 2, 3),
        ]);
        assert!(matches!(outcome, CheckOutcome::NotLinearizable { .. }));
    }

    #[test]
    fn test_concurrent_read_may_precede_put() {
        // The get overlaps the put, so it may be ordered before the write
        let outcome = check(vec![
            OperationRecord::put(1, "a", "1", 0, 10),
            OperationRecord::get(2, "a", "", 1, 2),
        ]);
        assert_eq!(outcome, CheckOutcome::Linearizable { order: vec![1, 0] });
    }

    #[test]
    fn test_read_of_unwritten_value_fails() {
        let outcome = check(vec![
            OperationRecord::put(1, "a", "1", 0, 10),
            OperationRecord::get(2, "a", "2", 1, 2),
        ]);
        assert_eq!(
            outcome,
            CheckOutcome::NotLinearizable {
                longest_prefix: vec![0]
            }
        );
    }

    #[test]
    fn test_client_order_is_respected() {
        // Same client, touching endpoints: real time alone would allow either
        // order, but the client issued the put first.
        let outcome = check(vec![
            OperationRecord::put(1, "a", "x", 0, 5),
            OperationRecord::get(1, "a", "", 5, 6),
        ]);
        assert!(!outcome.is_linearizable());

        let outcome = check(vec![
            OperationRecord::put(1, "a", "x", 0, 5),
            OperationRecord::get(2, "a", "", 5, 6),
        ]);
        assert!(outcome.is_linearizable());
    }

    #[test]
    fn test_records_without_client_are_unordered() {
        // Both gets overlap the put; only the real-time order constrains them
        let outcome = check(vec![
            OperationRecord::put(1, "a", "x", 0, 10),
            OperationRecord::get(0, "a", "x", 1, 11).without_client(),
            OperationRecord::get(0, "a", "", 2, 12).without_client(),
        ]);
        assert!(outcome.is_linearizable());

        // The same records under one real client must keep their call order
        let outcome = check(vec![
            OperationRecord::put(1, "a", "x", 0, 10),
            OperationRecord::get(0, "a", "x", 1, 2),
            OperationRecord::get(0, "a", "", 2, 3),
        ]);
        assert!(!outcome.is_linearizable());
    }

    #[test]
    fn test_appends_compose() {
        let outcome = check(vec![
            OperationRecord::append(1, "a", "x", 0, 10),
            OperationRecord::append(2, "a", "y", 0, 10),
            OperationRecord::get(3, "a", "yx", 11, 12),
        ]);
        assert_eq!(
            outcome,
            CheckOutcome::Linearizable {
                order: vec![1, 0, 2]
            }
        );
    }

    #[test]
    fn test_cancelled_search_reports_cancellation() {
        let flag = CancellationFlag::new();
        flag.cancel();

        let history = History::from_records(vec![OperationRecord::put(1, "a", "1", 0, 1)]);
        let parts = partition(history.records());
        let outcome = LinearizabilityChecker::new(&KvSpecification)
            .with_cancellation(flag)
            .check_partition(&parts[0]);
        assert_eq!(outcome, CheckOutcome::Cancelled);
    }

    #[test]
    fn test_is_linearizable_requires_every_key() {
        let history = History::from_records(vec![
            OperationRecord::put(1, "a", "1", 0, 1),
            OperationRecord::get(1, "a", "1", 2, 3),
            OperationRecord::get(2, "b", "ghost", 0, 1),
        ]);
        let checker = LinearizabilityChecker::new(&KvSpecification);
        assert!(!checker.is_linearizable(history.records()));
        assert!(checker.is_linearizable(&history.records()[..2]));
    }

    /// A register whose reads never constrain anything
    struct BlindRegister;

    impl Specification for BlindRegister {
        type State = ();

        fn init(&self) -> Self::State {}

        fn step(&self, _state: &(), _operation: &Operation) -> Option<()> {
            Some(())
        }
    }

    #[test]
    fn test_alternative_specification() {
        let history = History::from_records(vec![
            OperationRecord::put(1, "a", "1", 0, 1),
            OperationRecord::get(2, "a", "nonsense", 2, 3),
        ]);
        assert!(LinearizabilityChecker::new(&BlindRegister).is_linearizable(history.records()));
        assert!(!LinearizabilityChecker::new(&KvSpecification).is_linearizable(history.records()));
    }
}

//! Property-based tests for history validation

mod common;

use std::collections::{BTreeMap, HashMap};

use lincheck_core::{
    History, KvSpecification, LinearizabilityChecker, Operation, OperationRecord,
    PerKeyHistory, Specification, Verdict,
};
use proptest::prelude::*;

use common::{parallel_config, sequential_validator};

#[derive(Debug, Clone)]
enum Step {
    Get,
    Put(String),
    Append(String),
}

// Strategy for generating a single operation against the store
fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Get),
        "[a-z]{1,3}".prop_map(Step::Put),
        "[a-z]{1,2}".prop_map(Step::Append),
    ]
}

// Strategy for generating keyed steps on a small key space
fn keyed_steps_strategy(max_len: usize) -> impl Strategy<Value = Vec<(String, Step)>> {
    prop::collection::vec(("[abc]", step_strategy()), 1..max_len)
}

/// One client issuing operations back to back, with gets observing the
/// value a sequential store would return
fn sequential_history(steps: &[(String, Step)]) -> Vec<OperationRecord> {
    let mut state: HashMap<String, String> = HashMap::new();
    steps
        .iter()
        .enumerate()
        .map(|(i, (key, step))| {
            let start = i as i64 * 10;
            let end = start + 5;
            let current = state.entry(key.clone()).or_default();
            match step {
                Step::Get => OperationRecord::get(1, key.as_str(), current.as_str(), start, end),
                Step::Put(value) => {
                    *current = value.clone();
                    OperationRecord::put(1, key.as_str(), value.as_str(), start, end)
                }
                Step::Append(value) => {
                    current.push_str(value);
                    OperationRecord::append(1, key.as_str(), value.as_str(), start, end)
                }
            }
        })
        .collect()
}

// Strategy for generating concurrent records, one client per record so
// no client ever overlaps itself
fn concurrent_records_strategy(
    max_len: usize,
) -> impl Strategy<Value = Vec<OperationRecord>> {
    prop::collection::vec(
        (
            "[ab]",
            0u8..3,
            prop_oneof![Just(""), Just("1"), Just("2"), Just("12")],
            0i64..40,
            0i64..15,
            prop::bool::weighted(0.2),
        ),
        1..max_len,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (key, kind, value, start, duration, ambiguous))| {
                let client = i as u64 + 1;
                let end = start + duration;
                let record = match kind {
                    0 => OperationRecord::get(client, key.as_str(), value, start, end),
                    1 => OperationRecord::put(client, key.as_str(), value, start, end),
                    _ => OperationRecord::append(client, key.as_str(), value, start, end),
                };
                if ambiguous {
                    record.ambiguous()
                } else {
                    record
                }
            })
            .collect()
    })
}

/// Key-value semantics over the whole store in a single state
struct StoreSpecification;

impl Specification for StoreSpecification {
    type State = BTreeMap<String, String>;

    fn init(&self) -> Self::State {
        BTreeMap::new()
    }

    fn step(&self, state: &Self::State, operation: &Operation) -> Option<Self::State> {
        let current = state.get(operation.key()).map(String::as_str).unwrap_or("");
        let mut next = state.clone();
        match operation {
            Operation::Get { response, .. } => {
                return (response == current).then_some(next);
            }
            Operation::Put { key, value } => {
                next.insert(key.clone(), value.clone());
            }
            Operation::Append { key, value } => {
                next.insert(key.clone(), format!("{}{}", current, value));
            }
        }
        Some(next)
    }
}

fn confirmed_only(records: &[OperationRecord]) -> Vec<OperationRecord> {
    records
        .iter()
        .filter(|record| record.is_confirmed())
        .cloned()
        .collect()
}

proptest! {
    #[test]
    fn prop_sequential_histories_are_linearizable(steps in keyed_steps_strategy(24)) {
        let history = History::from_records(sequential_history(&steps));
        let report = sequential_validator().validate(&history).unwrap();
        prop_assert_eq!(report.verdict, Verdict::Linearizable { witness: None });
        prop_assert!(report.failing_keys.is_empty());
    }

    #[test]
    fn prop_wrong_read_is_detected(
        steps in keyed_steps_strategy(16),
        key in "[abc]",
    ) {
        let mut records = sequential_history(&steps);
        let start = records.len() as i64 * 10;
        let expected = records
            .iter()
            .filter(|record| record.key() == key)
            .fold(String::new(), |mut state, record| {
                match &record.operation {
                    Operation::Put { value, .. } => state = value.clone(),
                    Operation::Append { value, .. } => state.push_str(value),
                    Operation::Get { .. } => {}
                }
                state
            });
        let wrong = format!("{}!", expected);
        records.push(OperationRecord::get(1, key.as_str(), wrong, start, start + 5));

        let report = sequential_validator()
            .validate(&History::from_records(records))
            .unwrap();
        prop_assert_eq!(report.verdict, Verdict::NotLinearizable);
        prop_assert_eq!(report.failing_keys, vec![key]);
    }

    #[test]
    fn prop_validation_is_deterministic(records in concurrent_records_strategy(10)) {
        prop_assume!(records.iter().any(|record| record.is_confirmed()));
        let history = History::from_records(records);
        let validator = sequential_validator();

        let first = validator.validate(&history).unwrap();
        let second = validator.validate(&history).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_keys_are_checked_independently(records in concurrent_records_strategy(10)) {
        let confirmed = confirmed_only(&records);

        // One search over the whole store, without splitting by key
        let whole_store = PerKeyHistory::new("*", confirmed.clone());
        let whole = LinearizabilityChecker::new(&StoreSpecification)
            .check_partition(&whole_store)
            .is_linearizable();

        let per_key = LinearizabilityChecker::new(&KvSpecification).is_linearizable(&confirmed);
        prop_assert_eq!(whole, per_key);
    }

    #[test]
    fn prop_other_keys_do_not_affect_verdict(
        records in concurrent_records_strategy(8),
        offset in 0i64..1000,
    ) {
        let confirmed = confirmed_only(&records);
        let spec = KvSpecification;
        let checker = LinearizabilityChecker::new(&spec);

        // Shifting every operation on "b" in time leaves both keys' verdicts alone
        let shifted: Vec<OperationRecord> = confirmed
            .iter()
            .cloned()
            .map(|mut record| {
                if record.key() == "b" {
                    record.call_time += offset;
                    record.return_time += offset;
                }
                record
            })
            .collect();
        prop_assert_eq!(
            checker.is_linearizable(&confirmed),
            checker.is_linearizable(&shifted)
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_parallel_agrees_with_sequential(records in concurrent_records_strategy(10)) {
        prop_assume!(records.iter().any(|record| record.is_confirmed()));
        let history = History::from_records(records);

        let sequential = sequential_validator().validate(&history).unwrap();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let parallel = runtime
            .block_on(lincheck_core::Validator::new(parallel_config(3)).validate_async(&history))
            .unwrap();

        prop_assert_eq!(
            sequential.verdict.is_linearizable(),
            parallel.verdict.is_linearizable()
        );
        prop_assert_eq!(sequential.failing_keys, parallel.failing_keys);
    }
}

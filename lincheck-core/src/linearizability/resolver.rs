//! Resolution of ambiguous operations
//!
//! An operation whose client saw a failure may still have been applied by
//! the server. When the confirmed operations alone are not linearizable, the
//! resolver looks for a subset of the ambiguous operations whose inclusion
//! makes every key linearizable again.
//!
//! Subsets are enumerated as 64-bit masks in increasing order, ambiguous
//! operation `i` being included when bit `i` is set. The search is
//! exponential, so histories with more ambiguous operations than the
//! configured limit are refused up front.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::LincheckResult;
use crate::history::{partition, PerKeyHistory};
use crate::model::Specification;
use crate::types::OperationRecord;

use super::{CancellationFlag, CheckOutcome, LinearizabilityChecker};

/// Largest ambiguous set a subset mask can describe
pub const MAX_SUBSET_BITS: usize = 63;

/// Result of searching the ambiguous operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Including `witness` makes the whole history linearizable
    Resolved {
        witness: Vec<OperationRecord>,
        candidates_checked: u64,
    },
    /// No subset of the ambiguous operations helps
    Unresolved { candidates_checked: u64 },
    /// Too many ambiguous operations to enumerate; nothing was attempted
    ResourceLimitExceeded { ambiguous: usize, limit: usize },
}

/// Searches subsets of ambiguous operations for a linearizable completion
pub struct Resolver<S: Specification> {
    spec: Arc<S>,
    limit: usize,
    workers: usize,
    cancel: Option<CancellationFlag>,
}

impl<S: Specification + 'static> Resolver<S> {
    /// `limit` is the largest number of ambiguous operations the resolver
    /// will enumerate subsets of. It is capped at [`MAX_SUBSET_BITS`].
    pub fn new(spec: Arc<S>, limit: usize) -> Self {
        Self {
            spec,
            limit: limit.min(MAX_SUBSET_BITS),
            workers: 1,
            cancel: None,
        }
    }

    /// Number of workers used by [`Resolver::resolve_parallel`]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Share `flag` with the parallel workers so the caller can stop them
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn guard(&self, ambiguous: &[OperationRecord]) -> Option<Resolution> {
        if ambiguous.len() > self.limit {
            warn!(
                ambiguous = ambiguous.len(),
                limit = self.limit,
                "Too many ambiguous operations to enumerate subsets, refusing"
            );
            return Some(Resolution::ResourceLimitExceeded {
                ambiguous: ambiguous.len(),
                limit: self.limit,
            });
        }
        None
    }

    /// Find a subset of `ambiguous` that makes `confirmed` linearizable.
    ///
    /// The empty subset is tried first, so a history whose confirmed
    /// operations already linearize resolves with an empty witness.
    pub fn resolve(
        &self,
        confirmed: &[OperationRecord],
        ambiguous: &[OperationRecord],
    ) -> Resolution {
        if let Some(refused) = self.guard(ambiguous) {
            return refused;
        }
        let failing = failing_keys(self.spec.as_ref(), confirmed);
        self.search_sequential(SubsetSearch::new(confirmed, ambiguous, failing))
    }

    /// Like [`Resolver::resolve`], reusing an earlier confirmed-only check.
    ///
    /// `failing` must list every key whose confirmed operations are not
    /// linearizable on their own.
    pub fn resolve_known_failures(
        &self,
        confirmed: &[OperationRecord],
        ambiguous: &[OperationRecord],
        failing: BTreeSet<String>,
    ) -> Resolution {
        if let Some(refused) = self.guard(ambiguous) {
            return refused;
        }
        self.search_sequential(SubsetSearch::new(confirmed, ambiguous, failing))
    }

    /// Parallel variant of [`Resolver::resolve_known_failures`].
    ///
    /// Masks are dealt round-robin to blocking workers; the first worker to
    /// find a working subset cancels the others.
    pub async fn resolve_parallel(
        &self,
        confirmed: &[OperationRecord],
        ambiguous: &[OperationRecord],
        failing: BTreeSet<String>,
    ) -> LincheckResult<Resolution> {
        if let Some(refused) = self.guard(ambiguous) {
            return Ok(refused);
        }
        let search = Arc::new(SubsetSearch::new(confirmed, ambiguous, failing));
        if search.failing.is_empty() {
            return Ok(Resolution::Resolved {
                witness: Vec::new(),
                candidates_checked: 0,
            });
        }

        let total = search.subset_count();
        let workers = self.workers.min(total.max(1) as usize).max(1);
        info!(
            ambiguous = ambiguous.len(),
            candidates = total,
            workers,
            "Searching ambiguous operation subsets"
        );

        let cancel = self.cancel.clone().unwrap_or_default();
        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let spec = Arc::clone(&self.spec);
            let search = Arc::clone(&search);
            let cancel = cancel.clone();
            let stride = workers as u64;
            tasks.spawn_blocking(move || {
                let checker =
                    LinearizabilityChecker::new(spec.as_ref()).with_cancellation(cancel.clone());
                let mut cache = FxHashMap::default();
                let mut checked = 0u64;
                let mut mask = 1 + worker as u64;
                while mask <= total && !cancel.is_cancelled() {
                    checked += 1;
                    if search.evaluate(&checker, mask, &mut cache) == Some(true) {
                        cancel.cancel();
                        return (Some(mask), checked);
                    }
                    mask += stride;
                }
                (None, checked)
            });
        }

        let mut found: Option<u64> = None;
        let mut candidates_checked = 0u64;
        while let Some(joined) = tasks.join_next().await {
            let (mask, checked) = match joined {
                Ok(result) => result,
                Err(e) => {
                    cancel.cancel();
                    return Err(e.into());
                }
            };
            candidates_checked += checked;
            if let Some(mask) = mask {
                found = Some(found.map_or(mask, |current| current.min(mask)));
            }
        }

        Ok(search.finish(found, candidates_checked))
    }

    fn search_sequential(&self, search: SubsetSearch) -> Resolution {
        if search.failing.is_empty() {
            return Resolution::Resolved {
                witness: Vec::new(),
                candidates_checked: 0,
            };
        }

        let total = search.subset_count();
        info!(
            ambiguous = search.ambiguous.len(),
            candidates = total,
            "Searching ambiguous operation subsets"
        );

        let checker = LinearizabilityChecker::new(self.spec.as_ref());
        let mut cache = FxHashMap::default();
        let mut checked = 0u64;
        for mask in 1..=total {
            checked += 1;
            if search.evaluate(&checker, mask, &mut cache) == Some(true) {
                return search.finish(Some(mask), checked);
            }
        }
        search.finish(None, checked)
    }
}

/// Keys whose confirmed operations are not linearizable on their own
pub fn failing_keys<S: Specification>(spec: &S, confirmed: &[OperationRecord]) -> BTreeSet<String> {
    let checker = LinearizabilityChecker::new(spec);
    partition(confirmed)
        .into_iter()
        .filter(|history| !checker.check_partition(history).is_linearizable())
        .map(|history| history.key().to_string())
        .collect()
}

/// Cache of per-key results, keyed by key index and the ambiguous bits on it
type KeyCache = FxHashMap<(usize, u64), bool>;

/// Precomputed layout of a subset search, shared read-only by workers
struct SubsetSearch {
    ambiguous: Vec<OperationRecord>,
    /// Confirmed records of each key, indexed like `keys`
    confirmed_by_key: Vec<Vec<OperationRecord>>,
    /// Bits of the ambiguous operations on each key
    key_masks: Vec<u64>,
    keys: Vec<String>,
    failing: BTreeSet<String>,
    /// Union of the key masks of every failing key, one entry per key
    failing_masks: Vec<u64>,
}

impl SubsetSearch {
    fn new(
        confirmed: &[OperationRecord],
        ambiguous: &[OperationRecord],
        failing: BTreeSet<String>,
    ) -> Self {
        let mut by_key: BTreeMap<String, (Vec<OperationRecord>, u64)> = BTreeMap::new();
        for record in confirmed {
            by_key
                .entry(record.key().to_string())
                .or_default()
                .0
                .push(record.clone());
        }
        for (bit, record) in ambiguous.iter().enumerate() {
            by_key.entry(record.key().to_string()).or_default().1 |= 1 << bit;
        }

        let mut keys = Vec::with_capacity(by_key.len());
        let mut confirmed_by_key = Vec::with_capacity(by_key.len());
        let mut key_masks = Vec::with_capacity(by_key.len());
        for (key, (records, mask)) in by_key {
            keys.push(key);
            confirmed_by_key.push(records);
            key_masks.push(mask);
        }

        let failing_masks = keys
            .iter()
            .zip(&key_masks)
            .filter(|(key, _)| failing.contains(*key))
            .map(|(_, mask)| *mask)
            .collect();

        Self {
            ambiguous: ambiguous.to_vec(),
            confirmed_by_key,
            key_masks,
            keys,
            failing,
            failing_masks,
        }
    }

    /// Highest mask to enumerate
    fn subset_count(&self) -> u64 {
        if self.ambiguous.is_empty() {
            0
        } else {
            u64::MAX >> (64 - self.ambiguous.len())
        }
    }

    /// Whether including the ambiguous operations in `mask` makes every key
    /// linearizable. `None` when the checker was cancelled.
    fn evaluate<S: Specification>(
        &self,
        checker: &LinearizabilityChecker<'_, S>,
        mask: u64,
        cache: &mut KeyCache,
    ) -> Option<bool> {
        // A failing key can only recover if the subset adds something to it
        if self.failing_masks.iter().any(|key_mask| mask & key_mask == 0) {
            return Some(false);
        }

        for (index, key_mask) in self.key_masks.iter().enumerate() {
            let bits = mask & key_mask;
            if bits == 0 {
                continue;
            }
            let linearizable = match cache.get(&(index, bits)) {
                Some(&cached) => cached,
                None => {
                    let history = self.candidate(index, bits);
                    let outcome = checker.check_partition(&history);
                    if outcome == CheckOutcome::Cancelled {
                        return None;
                    }
                    let linearizable = outcome.is_linearizable();
                    cache.insert((index, bits), linearizable);
                    linearizable
                }
            };
            if !linearizable {
                return Some(false);
            }
        }
        Some(true)
    }

    /// Confirmed records of key `index` plus the ambiguous records in `bits`
    fn candidate(&self, index: usize, bits: u64) -> PerKeyHistory {
        let mut records = self.confirmed_by_key[index].clone();
        records.extend(
            self.ambiguous
                .iter()
                .enumerate()
                .filter(|(bit, _)| bits & (1 << bit) != 0)
                .map(|(_, record)| record.clone()),
        );
        debug!(
            key = %self.keys[index],
            added = bits.count_ones(),
            "Checking candidate partition"
        );
        PerKeyHistory::new(self.keys[index].as_str(), records)
    }

    fn finish(&self, found: Option<u64>, candidates_checked: u64) -> Resolution {
        match found {
            Some(mask) => {
                let witness: Vec<OperationRecord> = self
                    .ambiguous
                    .iter()
                    .enumerate()
                    .filter(|(bit, _)| mask & (1 << bit) != 0)
                    .map(|(_, record)| record.clone())
                    .collect();
                info!(
                    witness = witness.len(),
                    candidates_checked, "Ambiguous operations resolve the history"
                );
                Resolution::Resolved {
                    witness,
                    candidates_checked,
                }
            }
            None => {
                warn!(
                    candidates_checked,
                    failing_keys = ?self.failing,
                    "No subset of ambiguous operations makes the history linearizable"
                );
                Resolution::Unresolved { candidates_checked }
            }
        }
    }
}

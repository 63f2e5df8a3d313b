//! End-to-end validation of an operations history
//!
//! The confirmed operations are partitioned by key and checked first. When
//! some key fails, the ambiguous operations are handed to the [`Resolver`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn, Instrument, Span};

use crate::config::ValidatorConfig;
use crate::error::{LincheckError, LincheckResult};
use crate::history::{check_client_sequential, load_log, partition, History, PerKeyHistory};
use crate::linearizability::{LinearizabilityChecker, Resolution, Resolver};
use crate::model::{KvSpecification, Specification};
use crate::observability::{partition_span, validation_span};
use crate::types::OperationRecord;

/// Span source label for histories that did not come from a file
const IN_MEMORY_SOURCE: &str = "in-memory";

/// Final judgement on a history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Verdict {
    /// `witness` holds the ambiguous operations that had to be included,
    /// `None` when the confirmed operations linearize on their own
    Linearizable {
        witness: Option<Vec<OperationRecord>>,
    },
    NotLinearizable,
    /// The ambiguous set was too large to search
    ResourceLimitExceeded { ambiguous: usize, limit: usize },
}

impl Verdict {
    pub fn is_linearizable(&self) -> bool {
        matches!(self, Verdict::Linearizable { .. })
    }
}

/// Summary of a validation run, serializable for downstream reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub source: Option<PathBuf>,
    pub confirmed: usize,
    pub ambiguous: usize,
    pub keys: usize,
    /// Keys whose confirmed operations alone are not linearizable
    pub failing_keys: Vec<String>,
    pub candidates_checked: u64,
    pub verdict: Verdict,
}

/// Confirmed/ambiguous split of a history that passed the preconditions
struct Prepared {
    confirmed: Vec<OperationRecord>,
    ambiguous: Vec<OperationRecord>,
    partitions: Vec<PerKeyHistory>,
}

/// Validates histories against a sequential specification
pub struct Validator<S: Specification = KvSpecification> {
    spec: Arc<S>,
    config: ValidatorConfig,
}

impl Validator<KvSpecification> {
    /// Validator for get/put/append string semantics
    pub fn new(config: ValidatorConfig) -> Self {
        Self::with_specification(KvSpecification, config)
    }
}

impl<S: Specification + 'static> Validator<S> {
    pub fn with_specification(spec: S, config: ValidatorConfig) -> Self {
        Self {
            spec: Arc::new(spec),
            config,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    fn resolver(&self) -> Resolver<S> {
        Resolver::new(Arc::clone(&self.spec), self.config.max_ambiguous_operations)
            .with_workers(self.config.workers)
    }

    fn prepare(history: &History, span: &Span) -> LincheckResult<Prepared> {
        let (confirmed, ambiguous) = history.split_by_outcome();
        span.record("confirmed", confirmed.len());
        span.record("ambiguous", ambiguous.len());
        info!(
            confirmed = confirmed.len(),
            ambiguous = ambiguous.len(),
            "Loaded operations"
        );
        if confirmed.is_empty() {
            return Err(LincheckError::NoOperations {
                ambiguous: ambiguous.len(),
            });
        }
        check_client_sequential(history.records())?;

        let partitions = partition(&confirmed);
        Ok(Prepared {
            confirmed,
            ambiguous,
            partitions,
        })
    }

    /// Validate on the calling thread
    pub fn validate(&self, history: &History) -> LincheckResult<ValidationReport> {
        self.validate_in(history, validation_span(IN_MEMORY_SOURCE))
    }

    fn validate_in(&self, history: &History, span: Span) -> LincheckResult<ValidationReport> {
        let _guard = span.enter();

        let prepared = Self::prepare(history, &span)?;
        let checker = LinearizabilityChecker::new(self.spec.as_ref());
        let failing: BTreeSet<String> = prepared
            .partitions
            .iter()
            .filter(|history| {
                let _span = partition_span(history.key(), history.len()).entered();
                !checker.check_partition(history).is_linearizable()
            })
            .map(|history| history.key().to_string())
            .collect();

        let resolution = if failing.is_empty() {
            None
        } else {
            Some(self.resolver().resolve_known_failures(
                &prepared.confirmed,
                &prepared.ambiguous,
                failing.clone(),
            ))
        };

        Ok(report(&prepared, failing, resolution))
    }

    /// Validate, spreading work over blocking workers when configured to
    pub async fn validate_async(&self, history: &History) -> LincheckResult<ValidationReport> {
        self.validate_async_in(history, validation_span(IN_MEMORY_SOURCE))
            .await
    }

    async fn validate_async_in(
        &self,
        history: &History,
        span: Span,
    ) -> LincheckResult<ValidationReport> {
        if !self.config.parallel {
            return self.validate_in(history, span);
        }

        let instrumented = span.clone();
        async {
            let prepared = Self::prepare(history, &span)?;
            let failing = self.failing_keys_parallel(&prepared.partitions).await?;

            let resolution = if failing.is_empty() {
                None
            } else {
                Some(
                    self.resolver()
                        .resolve_parallel(&prepared.confirmed, &prepared.ambiguous, failing.clone())
                        .await?,
                )
            };

            Ok(report(&prepared, failing, resolution))
        }
        .instrument(instrumented)
        .await
    }

    /// Read, parse and validate the log at `path`
    pub async fn validate_file(&self, path: &Path) -> LincheckResult<ValidationReport> {
        let history = load_log(path).await?;
        let span = validation_span(&path.display().to_string());
        let mut report = self.validate_async_in(&history, span).await?;
        report.source = Some(path.to_path_buf());
        Ok(report)
    }

    /// Validate the log named by the configuration
    pub async fn validate_configured_log(&self) -> LincheckResult<ValidationReport> {
        let path = self.config.log_path.clone();
        self.validate_file(&path).await
    }

    /// Check every partition, dealing them round-robin to the workers
    async fn failing_keys_parallel(
        &self,
        partitions: &[PerKeyHistory],
    ) -> LincheckResult<BTreeSet<String>> {
        let workers = self.config.workers.clamp(1, partitions.len().max(1));
        let mut chunks: Vec<Vec<PerKeyHistory>> = vec![Vec::new(); workers];
        for (index, history) in partitions.iter().enumerate() {
            chunks[index % workers].push(history.clone());
        }

        let mut tasks = JoinSet::new();
        for chunk in chunks {
            let spec = Arc::clone(&self.spec);
            tasks.spawn_blocking(move || {
                let checker = LinearizabilityChecker::new(spec.as_ref());
                chunk
                    .into_iter()
                    .filter(|history| {
                        let _span = partition_span(history.key(), history.len()).entered();
                        !checker.check_partition(history).is_linearizable()
                    })
                    .map(|history| history.key().to_string())
                    .collect::<Vec<_>>()
            });
        }

        let mut failing = BTreeSet::new();
        while let Some(joined) = tasks.join_next().await {
            failing.extend(joined?);
        }
        Ok(failing)
    }
}

fn report(
    prepared: &Prepared,
    failing: BTreeSet<String>,
    resolution: Option<Resolution>,
) -> ValidationReport {
    let (verdict, candidates_checked) = match resolution {
        None => (Verdict::Linearizable { witness: None }, 0),
        Some(Resolution::Resolved {
            witness,
            candidates_checked,
        }) => {
            for record in &witness {
                info!(line = record.line, "Included ambiguous operation: {}", record);
            }
            (
                Verdict::Linearizable {
                    witness: Some(witness),
                },
                candidates_checked,
            )
        }
        Some(Resolution::Unresolved { candidates_checked }) => {
            (Verdict::NotLinearizable, candidates_checked)
        }
        Some(Resolution::ResourceLimitExceeded { ambiguous, limit }) => {
            (Verdict::ResourceLimitExceeded { ambiguous, limit }, 0)
        }
    };

    match &verdict {
        Verdict::Linearizable { .. } => info!("History is linearizable"),
        Verdict::NotLinearizable => warn!(failing_keys = ?failing, "History is not linearizable"),
        Verdict::ResourceLimitExceeded { ambiguous, limit } => warn!(
            ambiguous,
            limit, "Validation abandoned: ambiguous operations exceed the resolver limit"
        ),
    }

    ValidationReport {
        source: None,
        confirmed: prepared.confirmed.len(),
        ambiguous: prepared.ambiguous.len(),
        keys: prepared.partitions.len(),
        failing_keys: failing.into_iter().collect(),
        candidates_checked,
        verdict,
    }
}

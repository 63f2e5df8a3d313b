//! Linearizability validation for recorded key-value operation histories.
//!
//! Clients of a key-value service record every get/put/append they issue,
//! with call and return times and whether they saw the call succeed. Given
//! such a log, this crate decides whether some sequential execution of the
//! store, consistent with real time, explains every observed response.
//!
//! # Quick Start
//!
//! ```
//! use lincheck_core::{History, OperationRecord, Validator, ValidatorConfig, Verdict};
//!
//! let history = History::from_records(vec![
//!     OperationRecord::put(1, "a", "1", 0, 10),
//!     OperationRecord::get(2, "a", "", 1, 2),
//!     OperationRecord::get(2, "a", "1", 11, 12),
//! ]);
//!
//! let report = Validator::new(ValidatorConfig::default())
//!     .validate(&history)
//!     .unwrap();
//! assert_eq!(report.verdict, Verdict::Linearizable { witness: None });
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod linearizability;
pub mod model;
pub mod observability;
pub mod types;
pub mod validator;

pub use config::{ValidatorConfig, ValidatorConfigBuilder};
pub use error::{LincheckError, LincheckResult};
pub use history::{load_log, parse_log, partition, History, PerKeyHistory};
pub use linearizability::{
    CancellationFlag, CheckOutcome, LinearizabilityChecker, Resolution, Resolver,
};
pub use model::{KvSpecification, Specification};
pub use types::{Operation, OperationRecord, Outcome};
pub use validator::{ValidationReport, Validator, Verdict};

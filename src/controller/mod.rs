pub mod addon_instance_reconciler;
pub mod addon_operator_reconciler;
pub mod context;
pub mod csv_events;
pub mod error;
pub mod phase;
pub mod phase_addon_instance;
pub mod phase_monitoring;
pub mod phase_namespaces;
pub mod phase_olm;
pub mod reconciler;
pub mod runtime;
pub mod status;
pub mod upgrade_policy;

pub use context::Context;
pub use csv_events::{CsvEventTable, CsvKey};
pub use error::{BackoffConfig, Error, Result};
pub use phase::{PhaseResult, DEFAULT_RETRY_AFTER};
pub use reconciler::{error_policy, reconcile};
pub use runtime::Runtime;
pub use status::{commit_status, StatusReporter};

//! Workflow Evaluation Core
//!
//! Coordinates repeated, asynchronous evaluations of long-lived workflow
//! invocations by a reconciliation-style controller:
//!
//! - [`EvalState`] per entity: an exclusivity token so at most one
//!   evaluation runs at a time, an append-only [`EvalLog`] of past
//!   evaluations, and a tracing span that follows from the caller's context.
//! - [`EvalCache`]: the registry creating, looking up and closing states.
//! - [`EvalDriver`]: the driving-loop contract around a [`Controller`].
//!
//! Nothing here is persisted; the cache lives as long as the process.

pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod log;
pub mod metrics;
pub mod obs;
pub mod record;
pub mod state;
pub mod telemetry;
pub mod token;
pub mod trace;

pub use cache::EvalCache;
pub use config::DriverConfig;
pub use driver::{Controller, EvalAttempt, EvalDriver, Evaluation, Outcome};
pub use error::{EvalError, Result};
pub use log::EvalLog;
pub use metrics::METRICS;
pub use record::{Action, EvalRecord, RecordSummary};
pub use state::{EvalState, StateSnapshot};
pub use telemetry::init_tracing;
pub use token::{EvalGuard, EvalToken};
pub use trace::TraceContext;

/// wfeval version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

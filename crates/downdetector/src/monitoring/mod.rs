/// Health monitoring engine
///
/// This module is responsible for:
/// - Probing service URLs with a bounded timeout
/// - Detecting status transitions
/// - Recording ping history and current status
/// - Dispatching transition notifications
/// - Scheduling runs without overlap
pub mod checker;
pub mod executor;
pub mod notifier;
pub mod recorder;
pub mod scheduler;
pub mod transition;
pub mod types;

pub use checker::{Checker, HttpChecker};
pub use executor::{Engine, RunReport, ServiceOutcome};
pub use notifier::{Destination, LogTransport, NotificationTransport, Notifier, TransitionEvent};
pub use recorder::MetricsRecorder;
pub use scheduler::Scheduler;
pub use types::{ProbeFailure, ProbeResult, RunPhase};

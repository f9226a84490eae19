//! The ambient observability stack (§4.5, §6 ambient sections): the OTel
//! token/latency accountant, the CEL cost evaluator it is configured with,
//! and the logging bootstrap every binary in this workspace installs first.

pub mod cost;
pub mod logging;
pub mod metrics;

pub use metrics::{init_meter_provider, GenAiMetrics, GenAiObserver};

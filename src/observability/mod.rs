// Structured logging
pub mod logging;

// Metric names and the Prometheus recorder
pub mod metrics;

pub use self::logging::init_logging;
pub use self::metrics::{describe_metrics, install_recorder};

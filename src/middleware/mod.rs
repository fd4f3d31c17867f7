//! # Middleware
//!
//! - **logging**: request ids and start/completion logs
//! - **metrics**: per-endpoint counters in `AppState`

pub mod logging;
pub mod metrics;

pub use logging::RequestLogging;
pub use metrics::MetricsMiddleware;

//! Observability utilities.

mod subscriber;
mod timer;

pub use subscriber::{DEFAULT_LOG_FILTER, init_tracing};
pub use timer::SpanTimer;

//! Observability: structured logging setup and span helpers

pub mod logging;

pub use logging::{connection_span, init_default_logging, init_logging, LogFormat};

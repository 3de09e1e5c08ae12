//! Crate-level error type
//!
//! Connection failures never surface here; they are reported as
//! `status-changed` events. These errors are about using the crate itself.

use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection actor has stopped")]
    ActorStopped,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

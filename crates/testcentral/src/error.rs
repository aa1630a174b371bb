//! Error types for the testcentral library
//!
//! This module defines the error types returned by the GATT server.

use crate::config::ConfigError;
use crate::transport::TransportError;
use crate::uuid::Uuid;
use thiserror::Error;

/// Errors that can occur while running the GATT server
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to start GATT server: {0}")]
    ServerStart(#[source] TransportError),

    #[error("No characteristic is registered, the server is idle")]
    NotRegistered,

    #[error("Notification task already running for characteristic {0}")]
    DuplicateTask(Uuid),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to encode device information: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("GATT server worker has shut down")]
    Shutdown,
}

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

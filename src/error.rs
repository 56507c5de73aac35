use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use serde_json;

use crate::device::types::{DeviceIdentity, FailureReason};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Encryption key not configured; set encryptionKey in the config file or POWERVIEW_ENCRYPTION_KEY")]
    MissingKey,

    #[error("Encryption key must be 32 hex characters (got {length})")]
    InvalidKeyLength { length: usize },

    #[error("Encryption key is not valid hex: {source}")]
    InvalidKeyEncoding { #[from] source: hex::FromHexError },

    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

/// Failures reported by a [`crate::device::transport::Transport`].
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No shade selected")]
    NoDeviceSelected,

    #[error("Link error: {0}")]
    Link(String),

    #[error("Service {service} / characteristic {characteristic} not found")]
    ServiceNotFound { service: uuid::Uuid, characteristic: uuid::Uuid },

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No shade found or selection cancelled")]
    NoDeviceSelected,

    #[error("Failed to connect to shade: {0}")]
    Link(String),

    #[error("Shade does not expose the PowerView service/characteristic")]
    ServiceNotFound,

    #[error("Not connected to shade")]
    NotConnected,

    #[error("Failed to send command: {0}")]
    Write(String),

    #[error("Operation not allowed while {state}")]
    InvalidState { state: String },
}

impl SessionError {
    /// A benign outcome that should be reported as information, not as a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, SessionError::NoDeviceSelected)
    }

    pub fn failure_reason(&self) -> FailureReason {
        match self {
            SessionError::ServiceNotFound => FailureReason::ServiceNotFound,
            _ => FailureReason::LinkError,
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NoDeviceSelected => SessionError::NoDeviceSelected,
            TransportError::Link(msg) => SessionError::Link(msg),
            TransportError::ServiceNotFound { .. } => SessionError::ServiceNotFound,
            TransportError::Write(msg) => SessionError::Write(msg),
            TransportError::Btle { source } => SessionError::Link(source.to_string()),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{} is already added", .0.name)]
    AlreadyRegistered(DeviceIdentity),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Status notification too short ({length} bytes, need at least {minimum})")]
    TooShort { length: usize, minimum: usize },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start (bluetooth): {source}")]
    Transport { #[from] source: TransportError },

    #[error("Failed to start tokio runtime: {source}")]
    Runtime { #[from] source: io::Error },

    #[error("{failed} of {total} shades failed")]
    CommandFailed { failed: usize, total: usize },

    #[error("{source}")]
    Session { #[from] source: SessionError },
}

impl AppRunError {
    /// The config file is locked by another running instance.
    pub fn is_already_running(&self) -> bool {
        matches!(self, AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } })
    }
}

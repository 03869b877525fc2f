// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the camera manager

use std::fmt;

use crate::pipelines::state::{ActivityEvent, ActivityState};

/// Result type alias using MediaError
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors surfaced by the media activities and the streaming layer
#[derive(Debug, Clone, PartialEq)]
pub enum MediaError {
    /// Requested transition is not legal from the current state
    InvalidState {
        from: ActivityState,
        event: ActivityEvent,
    },
    /// Caller supplied an argument the activity cannot use
    InvalidArgument(String),
    /// A named element, mount, server or session does not exist
    NotFound(String),
    /// The engine or network layer could not provide a resource
    ResourceUnavailable(String),
    /// The camera device failed to deliver a frame
    DeviceReadFailure(String),
    /// A graph description could not be parsed
    ProtocolError(String),
}

/// Errors reported by camera device adapters
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// Device could not be opened or configured
    InitializationFailed(String),
    /// Reading a frame failed
    ReadFailed(String),
    /// Device does not support the request
    Unsupported(String),
    /// Device was disconnected during operation
    Disconnected,
}

/// Parameter table errors, kept separate so the failure modes stay distinguishable
#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    /// Key is unknown or has no value
    KeyNotFound(String),
    /// Output buffer is shorter than the encoded value
    BufferTooSmall { needed: usize, available: usize },
    /// Type tag is not one of the known parameter types
    UnsupportedType(u8),
    /// Value does not parse as the declared type
    InvalidValue { key: String, value: String },
    /// Device refused the value
    Device(DeviceError),
}

/// Still image capture errors
#[derive(Debug, Clone, PartialEq)]
pub enum PhotoError {
    /// Frame layout cannot be converted for encoding
    UnsupportedFormat(String),
    /// Encoding failed
    EncodingFailed(String),
    /// Save failed
    SaveFailed(String),
}

/// Configuration file errors
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::InvalidState { from, event } => {
                write!(f, "Invalid state: cannot {} from {}", event, from)
            }
            MediaError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            MediaError::NotFound(msg) => write!(f, "Not found: {}", msg),
            MediaError::ResourceUnavailable(msg) => write!(f, "Resource unavailable: {}", msg),
            MediaError::DeviceReadFailure(msg) => write!(f, "Device read failure: {}", msg),
            MediaError::ProtocolError(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            DeviceError::ReadFailed(msg) => write!(f, "Read failed: {}", msg),
            DeviceError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            DeviceError::Disconnected => write!(f, "Camera disconnected"),
        }
    }
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::KeyNotFound(key) => write!(f, "Parameter not found: {}", key),
            ParamError::BufferTooSmall { needed, available } => write!(
                f,
                "Buffer too small: needed {} bytes, {} available",
                needed, available
            ),
            ParamError::UnsupportedType(tag) => write!(f, "Unsupported parameter type: {}", tag),
            ParamError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{}' for parameter {}", value, key)
            }
            ParamError::Device(e) => write!(f, "Device rejected parameter: {}", e),
        }
    }
}

impl fmt::Display for PhotoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoError::UnsupportedFormat(msg) => write!(f, "Unsupported frame format: {}", msg),
            PhotoError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
            PhotoError::SaveFailed(msg) => write!(f, "Save failed: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Configuration parse error: {}", e),
        }
    }
}

impl std::error::Error for MediaError {}
impl std::error::Error for DeviceError {}
impl std::error::Error for ParamError {}
impl std::error::Error for PhotoError {}
impl std::error::Error for ConfigError {}

impl From<DeviceError> for MediaError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::ReadFailed(msg) => MediaError::DeviceReadFailure(msg),
            other => MediaError::ResourceUnavailable(other.to_string()),
        }
    }
}

impl From<DeviceError> for ParamError {
    fn from(err: DeviceError) -> Self {
        ParamError::Device(err)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_names_state_and_event() {
        let err = MediaError::InvalidState {
            from: ActivityState::Idle,
            event: ActivityEvent::Start,
        };
        assert_eq!(err.to_string(), "Invalid state: cannot start from Idle");
    }

    #[test]
    fn read_failures_map_to_device_read_failure() {
        let err: MediaError = DeviceError::ReadFailed("timeout".into()).into();
        assert_eq!(err, MediaError::DeviceReadFailure("timeout".into()));

        let err: MediaError = DeviceError::Disconnected.into();
        assert!(matches!(err, MediaError::ResourceUnavailable(_)));
    }
}

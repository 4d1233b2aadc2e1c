use thiserror::Error;

use crate::status::ResultCode;

/// Error type for camera operations.
#[derive(Error, Debug)]
pub enum CameraError {
    /// A native call returned a failure code.
    #[error("{operation} failed: {message} ({})", code.0)]
    Native {
        /// Native function that failed.
        operation: &'static str,
        /// Raw result code.
        code: ResultCode,
        /// Decoded message for `code`.
        message: String,
    },

    /// The session could not connect to a camera.
    #[error("could not connect to {target}: {message} ({})", code.0)]
    Connection {
        /// Human readable description of what was being connected to.
        target: String,
        /// Raw result code of the failing step.
        code: ResultCode,
        /// Decoded message for `code`.
        message: String,
    },

    /// The loaded libgphoto2 is too old for the requested operation.
    #[error("{operation} is not supported by the loaded libgphoto2 (2.5 or newer required)")]
    Unsupported {
        /// Native function that is missing.
        operation: &'static str,
    },

    /// A file payload could not be copied out of native memory.
    #[error("could not allocate {requested} bytes for file payload")]
    ResourceExhausted {
        /// Size of the payload that failed to allocate.
        requested: usize,
    },

    /// The native library or one of its symbols could not be loaded.
    #[error("failed to load libgphoto2: {0}")]
    Library(String),

    /// A configuration widget did not have the expected shape.
    #[error("widget error: {0}")]
    Widget(String),

    /// Invalid session configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed TOML configuration.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

impl CameraError {
    /// Builds a [`CameraError::Native`] from a failing call.
    pub fn native(operation: &'static str, code: ResultCode) -> Self {
        Self::Native {
            operation,
            code,
            message: code.message().to_owned(),
        }
    }

    /// Builds a [`CameraError::Native`] with a message that is more precise than the code's.
    pub fn native_with<S: Into<String>>(operation: &'static str, code: ResultCode, message: S) -> Self {
        Self::Native {
            operation,
            code,
            message: message.into(),
        }
    }

    /// Builds a [`CameraError::Connection`].
    pub fn connection<S: Into<String>>(target: S, code: ResultCode) -> Self {
        Self::Connection {
            target: target.into(),
            code,
            message: code.message().to_owned(),
        }
    }

    /// Builds a [`CameraError::Widget`].
    pub fn widget<S: Into<String>>(msg: S) -> Self {
        Self::Widget(msg.into())
    }

    /// Builds a [`CameraError::Config`].
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// The native result code behind this error, if any.
    pub const fn code(&self) -> Option<ResultCode> {
        match self {
            Self::Native { code, .. } | Self::Connection { code, .. } => Some(*code),
            _ => None,
        }
    }
}

//! Translation of libgphoto2 result codes into crate errors.
//!
//! Every native call returns a `c_int` status. Non-negative values are either
//! `GP_OK` or a payload (a count, an index) and are passed through unchanged.
//! Negative values are failures and become [`CameraError::Native`] on the
//! fallible path, or a `warn!` record on the silent path used by `Drop`.

use std::ffi::c_int;
use std::fmt;

use crate::error::{CameraError, Result};

/// A raw libgphoto2 result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub c_int);

/// Broad classification of a failing [`ResultCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Generic library failures (-1 to -9).
    General,
    /// Port layer failures (-10 to -99).
    Port,
    /// Camera driver failures (-100 and below).
    Camera,
}

impl ResultCode {
    /// `GP_OK`.
    pub const OK: Self = Self(0);
    /// `GP_ERROR`.
    pub const ERROR: Self = Self(-1);
    /// `GP_ERROR_BAD_PARAMETERS`.
    pub const BAD_PARAMETERS: Self = Self(-2);
    /// `GP_ERROR_NO_MEMORY`.
    pub const NO_MEMORY: Self = Self(-3);
    /// `GP_ERROR_LIBRARY`.
    pub const LIBRARY: Self = Self(-4);
    /// `GP_ERROR_UNKNOWN_PORT`.
    pub const UNKNOWN_PORT: Self = Self(-5);
    /// `GP_ERROR_NOT_SUPPORTED`.
    pub const NOT_SUPPORTED: Self = Self(-6);
    /// `GP_ERROR_IO`.
    pub const IO: Self = Self(-7);
    /// `GP_ERROR_FIXED_LIMIT_EXCEEDED`.
    pub const FIXED_LIMIT_EXCEEDED: Self = Self(-8);
    /// `GP_ERROR_TIMEOUT`.
    pub const TIMEOUT: Self = Self(-10);
    /// `GP_ERROR_IO_USB_FIND`.
    pub const IO_USB_FIND: Self = Self(-52);
    /// `GP_ERROR_IO_USB_CLAIM`.
    pub const IO_USB_CLAIM: Self = Self(-53);
    /// `GP_ERROR_CORRUPTED_DATA`.
    pub const CORRUPTED_DATA: Self = Self(-102);
    /// `GP_ERROR_FILE_EXISTS`.
    pub const FILE_EXISTS: Self = Self(-103);
    /// `GP_ERROR_MODEL_NOT_FOUND`.
    pub const MODEL_NOT_FOUND: Self = Self(-105);
    /// `GP_ERROR_DIRECTORY_NOT_FOUND`.
    pub const DIRECTORY_NOT_FOUND: Self = Self(-107);
    /// `GP_ERROR_FILE_NOT_FOUND`.
    pub const FILE_NOT_FOUND: Self = Self(-108);
    /// `GP_ERROR_DIRECTORY_EXISTS`.
    pub const DIRECTORY_EXISTS: Self = Self(-109);
    /// `GP_ERROR_CAMERA_BUSY`.
    pub const CAMERA_BUSY: Self = Self(-110);
    /// `GP_ERROR_PATH_NOT_ABSOLUTE`.
    pub const PATH_NOT_ABSOLUTE: Self = Self(-111);
    /// `GP_ERROR_CANCEL`.
    pub const CANCEL: Self = Self(-112);
    /// `GP_ERROR_CAMERA_ERROR`.
    pub const CAMERA_ERROR: Self = Self(-113);
    /// `GP_ERROR_OS_FAILURE`.
    pub const OS_FAILURE: Self = Self(-114);
    /// `GP_ERROR_NO_SPACE`.
    pub const NO_SPACE: Self = Self(-115);

    /// Whether the code signals success.
    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    /// Which layer of libgphoto2 produced the code.
    pub const fn category(self) -> ErrorCategory {
        match self.0 {
            -9..=c_int::MAX => ErrorCategory::General,
            -99..=-10 => ErrorCategory::Port,
            _ => ErrorCategory::Camera,
        }
    }

    /// The message libgphoto2 associates with the code.
    pub const fn message(self) -> &'static str {
        match self.0 {
            0..=c_int::MAX => "No error",
            -1 => "Unspecified error",
            -2 => "Bad parameters",
            -3 => "Out of memory",
            -4 => "Error loading a library",
            -5 => "Unknown port",
            -6 => "Unsupported operation",
            -7 => "I/O problem",
            -8 => "Fixed limit exceeded",
            -10 => "Timeout reading from or writing to the port",
            -20 => "Serial port not supported",
            -21 => "USB port not supported",
            -31 => "Error initializing the port",
            -34 => "Error reading from the port",
            -35 => "Error writing to the port",
            -37 => "Error updating the port settings",
            -41 => "Error setting the serial port speed",
            -51 => "Error clearing a halt condition on the USB port",
            -52 => "Could not find the requested device on the USB port",
            -53 => "Could not claim the USB device",
            -60 => "Could not lock the device",
            -70 => "libhal error",
            -102 => "Corrupted data",
            -103 => "File already exists",
            -105 => "Unknown model",
            -107 => "Directory not found",
            -108 => "File not found",
            -109 => "Directory already exists",
            -110 => "I/O in progress",
            -111 => "Path not absolute",
            -112 => "Cancelled",
            -113 => "Unspecified camera error",
            -114 => "OS failure",
            -115 => "Not enough space",
            _ => "Unknown error",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.0)
    }
}

/// Outcome of a single native call, before translation.
pub type NativeResult<T> = std::result::Result<T, ResultCode>;

/// Splits a raw status into its payload or its failure code.
pub const fn check(code: c_int) -> NativeResult<c_int> {
    if code >= 0 {
        Ok(code)
    } else {
        Err(ResultCode(code))
    }
}

/// Conversion of [`NativeResult`] into the crate's error model.
pub trait Translate<T> {
    /// Fails with [`CameraError::Native`] labelled by `operation`.
    fn or_fail(self, operation: &'static str) -> Result<T>;

    /// Logs a failure and discards it. For teardown paths that must not fail.
    fn or_log(self, operation: &'static str) -> Option<T>;
}

impl<T> Translate<T> for NativeResult<T> {
    fn or_fail(self, operation: &'static str) -> Result<T> {
        self.map_err(|code| CameraError::native(operation, code))
    }

    fn or_log(self, operation: &'static str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(code) => {
                tracing::warn!(operation, code = code.0, "{operation} failed: {code}");
                None
            }
        }
    }
}

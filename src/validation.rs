//! Argument checks applied before a device-side path reaches the native library.
//!
//! libgphoto2 rejects relative folders and empty names itself, but only after
//! the session has taken the I/O lock and talked to the camera driver. These
//! checks fail fast with the same result codes.

use crate::error::{CameraError, Result};
use crate::status::ResultCode;

/// Validates an absolute device folder such as `/store_00010001/DCIM`.
///
/// # Errors
///
/// Returns a [`CameraError::Native`] carrying
/// [`ResultCode::PATH_NOT_ABSOLUTE`] if `folder` does not start with `/`, or
/// [`ResultCode::BAD_PARAMETERS`] if it contains a NUL byte.
pub fn validate_folder(folder: &str, operation: &'static str) -> Result<()> {
    if !folder.starts_with('/') {
        return Err(CameraError::native_with(
            operation,
            ResultCode::PATH_NOT_ABSOLUTE,
            format!("'{folder}' is not an absolute folder"),
        ));
    }
    if folder.contains('\0') {
        return Err(CameraError::native_with(
            operation,
            ResultCode::BAD_PARAMETERS,
            "folder contains a NUL byte",
        ));
    }
    Ok(())
}

/// Validates a single path component: a file or folder name inside a folder.
///
/// # Errors
///
/// Returns a [`CameraError::Native`] carrying [`ResultCode::BAD_PARAMETERS`]
/// if `name` is empty or contains `/` or a NUL byte.
pub fn validate_name(name: &str, operation: &'static str) -> Result<()> {
    let problem = if name.is_empty() {
        Some("name is empty")
    } else if name.contains('/') {
        Some("name contains '/'")
    } else if name.contains('\0') {
        Some("name contains a NUL byte")
    } else {
        None
    };
    match problem {
        Some(problem) => Err(CameraError::native_with(operation, ResultCode::BAD_PARAMETERS, problem)),
        None => Ok(()),
    }
}

/// Validates a folder and a name inside it.
pub fn validate_entry(folder: &str, name: &str, operation: &'static str) -> Result<()> {
    validate_folder(folder, operation)?;
    validate_name(name, operation)
}

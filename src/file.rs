//! Refcounted wrapper around a native `CameraFile`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CameraError, Result};
use crate::status::{ResultCode, Translate};
use crate::traits::{Backend, Capability, FileType};

/// A file object owned jointly with the native library.
///
/// Cloning shares the same native file and bumps its refcount; dropping
/// releases one reference. A wrapper emptied by [`CameraFile::take`] holds no
/// handle: dropping it does nothing and every accessor fails with
/// `BAD_PARAMETERS`.
///
/// If the native library refuses to raise the refcount, `clone` logs the
/// failure and returns such an inert wrapper instead of sharing the handle.
pub struct CameraFile<B: Backend> {
    backend: Arc<B>,
    raw: Option<B::File>,
}

impl<B: Backend> CameraFile<B> {
    /// Allocate an empty file with a refcount of one.
    pub fn new(backend: Arc<B>) -> Result<Self> {
        let raw = backend.file_new().or_fail("gp_file_new")?;
        tracing::trace!(?raw, "created camera file");
        Ok(Self {
            backend,
            raw: Some(raw),
        })
    }

    /// Move the handle out, leaving `self` inert.
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            raw: self.raw.take(),
        }
    }

    /// Whether this wrapper holds no handle.
    pub const fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    /// The native handle, if any.
    pub const fn raw(&self) -> Option<B::File> {
        self.raw
    }

    pub(crate) fn handle(&self, operation: &'static str) -> Result<B::File> {
        self.raw
            .ok_or_else(|| CameraError::native_with(operation, ResultCode::BAD_PARAMETERS, "null file handle"))
    }

    /// Owned copy of the file's payload.
    pub fn data(&self) -> Result<Vec<u8>> {
        const OP: &str = "gp_file_get_data_and_size";
        let raw = self.handle(OP)?;
        let copied = self
            .backend
            .file_with_data(raw, |bytes| {
                let mut owned = Vec::new();
                owned
                    .try_reserve_exact(bytes.len())
                    .map_err(|_| CameraError::ResourceExhausted { requested: bytes.len() })?;
                owned.extend_from_slice(bytes);
                Ok::<_, CameraError>(owned)
            })
            .or_fail(OP)?;
        let data = copied?;
        tracing::trace!(size = data.len(), "copied file payload");
        Ok(data)
    }

    /// Replace the payload with a copy of `data`.
    pub fn set_data(&mut self, data: &[u8]) -> Result<()> {
        const OP: &str = "gp_file_set_data_and_size";
        let raw = self.handle(OP)?;
        self.backend.file_set_data(raw, data).or_fail(OP)
    }

    /// MIME type, e.g. `image/jpeg`.
    pub fn mime_type(&self) -> Result<String> {
        const OP: &str = "gp_file_get_mime_type";
        self.backend.file_mime_type(self.handle(OP)?).or_fail(OP)
    }

    /// Set the MIME type.
    pub fn set_mime_type(&mut self, mime_type: &str) -> Result<()> {
        const OP: &str = "gp_file_set_mime_type";
        self.backend.file_set_mime_type(self.handle(OP)?, mime_type).or_fail(OP)
    }

    /// File name.
    pub fn name(&self) -> Result<String> {
        const OP: &str = "gp_file_get_name";
        self.backend.file_name(self.handle(OP)?).or_fail(OP)
    }

    /// Set the file name.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        const OP: &str = "gp_file_set_name";
        self.backend.file_set_name(self.handle(OP)?, name).or_fail(OP)
    }

    /// Detect the MIME type from the payload, replacing any value set before.
    pub fn detect_mime_type(&mut self) -> Result<()> {
        const OP: &str = "gp_file_detect_mime_type";
        self.backend.file_detect_mime_type(self.handle(OP)?).or_fail(OP)
    }

    /// Rewrite the name's extension to match the MIME type.
    pub fn adjust_name_for_mime_type(&mut self) -> Result<()> {
        const OP: &str = "gp_file_adjust_name_for_mime_type";
        self.backend.file_adjust_name_for_mime_type(self.handle(OP)?).or_fail(OP)
    }

    /// Name libgphoto2 would give this file when stored as `file_type`.
    ///
    /// Requires libgphoto2 2.5 or newer.
    pub fn name_by_type(&self, base_name: &str, file_type: FileType) -> Result<String> {
        const OP: &str = "gp_file_get_name_by_type";
        if !self.backend.supports(Capability::NameByType) {
            return Err(CameraError::Unsupported { operation: OP });
        }
        self.backend
            .file_name_by_type(self.handle(OP)?, base_name, file_type)
            .or_fail(OP)
    }

    /// Write the payload to a local file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        const OP: &str = "gp_file_save";
        self.backend.file_save(self.handle(OP)?, path.as_ref()).or_fail(OP)
    }

    /// Modification time, seconds since the epoch.
    pub fn mtime(&self) -> Result<i64> {
        const OP: &str = "gp_file_get_mtime";
        self.backend.file_mtime(self.handle(OP)?).or_fail(OP)
    }

    /// Set the modification time.
    pub fn set_mtime(&mut self, mtime: i64) -> Result<()> {
        const OP: &str = "gp_file_set_mtime";
        self.backend.file_set_mtime(self.handle(OP)?, mtime).or_fail(OP)
    }

    fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            tracing::trace!(?raw, "releasing camera file");
            self.backend.file_unref(raw).or_log("gp_file_unref");
        }
    }
}

impl<B: Backend> Clone for CameraFile<B> {
    fn clone(&self) -> Self {
        let raw = self.raw.filter(|raw| {
            // A handle whose refcount could not be raised is not shared.
            self.backend.file_ref(*raw).or_log("gp_file_ref").is_some()
        });
        Self {
            backend: Arc::clone(&self.backend),
            raw,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.raw.is_some() && self.raw == source.raw {
            return;
        }
        let mut adopted = source.clone();
        self.release();
        *self = adopted.take();
    }
}

impl<B: Backend> Drop for CameraFile<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: Backend> fmt::Debug for CameraFile<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraFile").field("raw", &self.raw).finish()
    }
}

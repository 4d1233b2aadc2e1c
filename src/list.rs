//! Refcounted wrapper around a native `CameraList`.

use std::ffi::c_int;
use std::fmt;
use std::sync::Arc;

use crate::error::{CameraError, Result};
use crate::status::{ResultCode, Translate};
use crate::traits::Backend;

/// An ordered list of name/value pairs owned jointly with the native library.
///
/// Used for folder listings (names only) and autodetection results
/// (model → port). Shares the copy/drop semantics of [`crate::CameraFile`].
/// A wrapper whose handle was taken is inert. If the native library refuses
/// to raise the refcount, `clone` logs the failure and returns such an inert
/// wrapper instead of sharing the handle.
pub struct CameraList<B: Backend> {
    backend: Arc<B>,
    raw: Option<B::List>,
}

impl<B: Backend> CameraList<B> {
    /// Allocate an empty list with a refcount of one.
    pub fn new(backend: Arc<B>) -> Result<Self> {
        let raw = backend.list_new().or_fail("gp_list_new")?;
        tracing::trace!(?raw, "created camera list");
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
    pub const fn raw(&self) -> Option<B::List> {
        self.raw
    }

    pub(crate) fn handle(&self, operation: &'static str) -> Result<B::List> {
        self.raw
            .ok_or_else(|| CameraError::native_with(operation, ResultCode::BAD_PARAMETERS, "null list handle"))
    }

    /// Number of entries.
    pub fn count(&self) -> Result<usize> {
        const OP: &str = "gp_list_count";
        let count = self.backend.list_count(self.handle(OP)?).or_fail(OP)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    /// Name at `index`, which must be in `[0, count)`.
    pub fn name(&self, index: usize) -> Result<String> {
        const OP: &str = "gp_list_get_name";
        let raw = self.handle(OP)?;
        self.backend.list_name(raw, to_index(index, OP)?).or_fail(OP)
    }

    /// Value at `index`, which must be in `[0, count)`.
    pub fn value(&self, index: usize) -> Result<String> {
        const OP: &str = "gp_list_get_value";
        let raw = self.handle(OP)?;
        self.backend.list_value(raw, to_index(index, OP)?).or_fail(OP)
    }

    /// Overwrite the name at `index`.
    pub fn set_name(&mut self, index: usize, name: &str) -> Result<()> {
        const OP: &str = "gp_list_set_name";
        let raw = self.handle(OP)?;
        self.backend.list_set_name(raw, to_index(index, OP)?, name).or_fail(OP)
    }

    /// Overwrite the value at `index`.
    pub fn set_value(&mut self, index: usize, value: &str) -> Result<()> {
        const OP: &str = "gp_list_set_value";
        let raw = self.handle(OP)?;
        self.backend.list_set_value(raw, to_index(index, OP)?, value).or_fail(OP)
    }

    /// Append an entry.
    pub fn append(&mut self, name: &str, value: &str) -> Result<()> {
        const OP: &str = "gp_list_append";
        self.backend.list_append(self.handle(OP)?, name, value).or_fail(OP)
    }

    /// Remove every entry.
    pub fn reset(&mut self) -> Result<()> {
        const OP: &str = "gp_list_reset";
        self.backend.list_reset(self.handle(OP)?).or_fail(OP)
    }

    /// Sort entries by name.
    pub fn sort(&mut self) -> Result<()> {
        const OP: &str = "gp_list_sort";
        self.backend.list_sort(self.handle(OP)?).or_fail(OP)
    }

    /// Index of the first entry called `name`; fails if there is none.
    pub fn find_by_name(&self, name: &str) -> Result<usize> {
        const OP: &str = "gp_list_find_by_name";
        let index = self.backend.list_find_by_name(self.handle(OP)?, name).or_fail(OP)?;
        Ok(usize::try_from(index).unwrap_or_default())
    }

    /// Name and value at `index`.
    pub fn pair(&self, index: usize) -> Result<(String, String)> {
        Ok((self.name(index)?, self.value(index)?))
    }

    /// Name and value of the first entry called `name`.
    pub fn pair_by_name(&self, name: &str) -> Result<(String, String)> {
        self.pair(self.find_by_name(name)?)
    }

    /// Every entry, in list order.
    pub fn pairs(&self) -> Result<Vec<(String, String)>> {
        (0..self.count()?).map(|index| self.pair(index)).collect()
    }

    fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            tracing::trace!(?raw, "releasing camera list");
            self.backend.list_unref(raw).or_log("gp_list_unref");
        }
    }
}

fn to_index(index: usize, operation: &'static str) -> Result<c_int> {
    c_int::try_from(index)
        .map_err(|_| CameraError::native_with(operation, ResultCode::BAD_PARAMETERS, "index out of range"))
}

impl<B: Backend> Clone for CameraList<B> {
    fn clone(&self) -> Self {
        let raw = self
            .raw
            .filter(|raw| self.backend.list_ref(*raw).or_log("gp_list_ref").is_some());
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

impl<B: Backend> Drop for CameraList<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: Backend> fmt::Debug for CameraList<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraList").field("raw", &self.raw).finish()
    }
}

//! Core types and the native-library boundary.
//!
//! [`Backend`] mirrors the libgphoto2 C ABI: opaque handles, reference
//! counting, and status-returning calls. The production implementation lives
//! in [`crate::device`]; tests use an in-memory mock.

use std::ffi::c_int;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::status::NativeResult;
use crate::widget::Widget;

/// Location of a file on the camera's storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CameraFilePath {
    /// Absolute device-side folder, e.g. `/store_00010001/DCIM/100CANON`.
    pub folder: String,
    /// File name inside `folder`.
    pub name: String,
}

impl CameraFilePath {
    /// Create a new path descriptor.
    pub fn new<F: Into<String>, N: Into<String>>(folder: F, name: N) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
        }
    }

    /// Whether both components are empty (events without a path payload).
    pub fn is_empty(&self) -> bool {
        self.folder.is_empty() && self.name.is_empty()
    }
}

impl fmt::Display for CameraFilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.folder.ends_with('/') {
            write!(f, "{}{}", self.folder, self.name)
        } else {
            write!(f, "{}/{}", self.folder, self.name)
        }
    }
}

/// What `capture` should produce on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureType {
    /// Still image.
    Image,
    /// Movie clip.
    Movie,
    /// Sound clip.
    Sound,
}

impl CaptureType {
    /// libgphoto2 `CameraCaptureType` value.
    pub const fn as_raw(self) -> c_int {
        match self {
            Self::Image => 0,
            Self::Movie => 1,
            Self::Sound => 2,
        }
    }
}

/// Which representation of a device file to transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Thumbnail or preview.
    Preview,
    /// The file as stored.
    Normal,
    /// Raw sensor data.
    Raw,
    /// Attached audio.
    Audio,
    /// EXIF block.
    Exif,
    /// Device metadata.
    Metadata,
}

impl FileType {
    /// libgphoto2 `CameraFileType` value.
    pub const fn as_raw(self) -> c_int {
        match self {
            Self::Preview => 0,
            Self::Normal => 1,
            Self::Raw => 2,
            Self::Audio => 3,
            Self::Exif => 4,
            Self::Metadata => 5,
        }
    }
}

/// Kind of asynchronous device event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Anything the library could not classify; `info` holds its text.
    Unknown,
    /// The wait call timed out without an event.
    Timeout,
    /// A new file appeared on the device.
    FileAdded,
    /// A new folder appeared on the device.
    FolderAdded,
    /// A capture finished.
    CaptureComplete,
    /// An existing file changed.
    FileChanged,
}

impl EventKind {
    /// Maps a libgphoto2 `CameraEventType` value.
    pub const fn from_raw(raw: c_int) -> Self {
        match raw {
            1 => Self::Timeout,
            2 => Self::FileAdded,
            3 => Self::FolderAdded,
            4 => Self::CaptureComplete,
            5 => Self::FileChanged,
            _ => Self::Unknown,
        }
    }

    /// Whether events of this kind carry a [`CameraFilePath`].
    pub const fn has_path(self) -> bool {
        matches!(self, Self::FileAdded | Self::FolderAdded | Self::FileChanged)
    }
}

/// One event returned by a wait-for-event call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Path payload; empty for kinds without one.
    pub path: CameraFilePath,
    /// Free-form text payload (set for [`EventKind::Unknown`]).
    pub info: String,
}

impl CameraEvent {
    /// Event without payload.
    pub fn bare(kind: EventKind) -> Self {
        Self {
            kind,
            path: CameraFilePath::default(),
            info: String::new(),
        }
    }

    /// Event with a path payload.
    pub const fn with_path(kind: EventKind, path: CameraFilePath) -> Self {
        Self {
            kind,
            path,
            info: String::new(),
        }
    }
}

/// Optional native features that depend on the library version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// `gp_file_get_name_by_type` (libgphoto2 2.5+).
    NameByType,
}

/// Where a new session should connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectTarget<'a> {
    /// Let the library pick the first camera it finds.
    FirstDetected,
    /// A specific model on a specific port.
    Explicit {
        /// Model name as reported by autodetection.
        model: &'a str,
        /// Port path, e.g. `usb:001,007`.
        port: &'a str,
    },
}

impl fmt::Display for ConnectTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstDetected => write!(f, "first detected camera"),
            Self::Explicit { model, port } => write!(f, "{model} on {port}"),
        }
    }
}

/// Abstraction over the native camera library.
///
/// Handles are plain values; ownership and reference counting are managed by
/// the wrapper types ([`crate::CameraFile`], [`crate::CameraList`],
/// [`crate::Camera`]), which are the only callers of the `*_ref`/`*_unref`
/// and open/close methods.
pub trait Backend: Send + Sync + 'static {
    /// Shared library context.
    type Context: Send + Sync;
    /// Connected device handle. Only reachable through the session's I/O lock.
    type Device: Send;
    /// Refcounted file object.
    type File: Copy + Eq + fmt::Debug + Send + Sync;
    /// Refcounted name/value list.
    type List: Copy + Eq + fmt::Debug + Send + Sync;

    /// Whether an optional native feature is available.
    fn supports(&self, capability: Capability) -> bool;

    /// Create a context.
    fn context_new(&self) -> NativeResult<Self::Context>;
    /// Drop the caller's reference to a context.
    fn context_unref(&self, context: &Self::Context);

    /// Create a file with a refcount of one.
    fn file_new(&self) -> NativeResult<Self::File>;
    /// Increment a file's refcount.
    fn file_ref(&self, file: Self::File) -> NativeResult<()>;
    /// Decrement a file's refcount, freeing it at zero.
    fn file_unref(&self, file: Self::File) -> NativeResult<()>;
    /// Borrow the file's payload for the duration of `read`.
    fn file_with_data<R, F: FnOnce(&[u8]) -> R>(&self, file: Self::File, read: F) -> NativeResult<R>;
    /// Replace the file's payload with a copy of `data`.
    fn file_set_data(&self, file: Self::File, data: &[u8]) -> NativeResult<()>;
    /// MIME type.
    fn file_mime_type(&self, file: Self::File) -> NativeResult<String>;
    /// Set MIME type.
    fn file_set_mime_type(&self, file: Self::File, mime_type: &str) -> NativeResult<()>;
    /// File name.
    fn file_name(&self, file: Self::File) -> NativeResult<String>;
    /// Set file name.
    fn file_set_name(&self, file: Self::File, name: &str) -> NativeResult<()>;
    /// Sniff the payload and overwrite the MIME type.
    fn file_detect_mime_type(&self, file: Self::File) -> NativeResult<()>;
    /// Rewrite the name's extension to match the MIME type.
    fn file_adjust_name_for_mime_type(&self, file: Self::File) -> NativeResult<()>;
    /// Derive a file name for `file_type` from `base_name`.
    fn file_name_by_type(&self, file: Self::File, base_name: &str, file_type: FileType) -> NativeResult<String>;
    /// Write the payload to a local path.
    fn file_save(&self, file: Self::File, path: &Path) -> NativeResult<()>;
    /// Modification time in seconds since the epoch.
    fn file_mtime(&self, file: Self::File) -> NativeResult<i64>;
    /// Set modification time.
    fn file_set_mtime(&self, file: Self::File, mtime: i64) -> NativeResult<()>;

    /// Create an empty list with a refcount of one.
    fn list_new(&self) -> NativeResult<Self::List>;
    /// Increment a list's refcount.
    fn list_ref(&self, list: Self::List) -> NativeResult<()>;
    /// Decrement a list's refcount, freeing it at zero.
    fn list_unref(&self, list: Self::List) -> NativeResult<()>;
    /// Number of entries.
    fn list_count(&self, list: Self::List) -> NativeResult<c_int>;
    /// Name at `index`. A missing name reads as empty.
    fn list_name(&self, list: Self::List, index: c_int) -> NativeResult<String>;
    /// Value at `index`. A missing value reads as empty.
    fn list_value(&self, list: Self::List, index: c_int) -> NativeResult<String>;
    /// Overwrite the name at `index`.
    fn list_set_name(&self, list: Self::List, index: c_int, name: &str) -> NativeResult<()>;
    /// Overwrite the value at `index`.
    fn list_set_value(&self, list: Self::List, index: c_int, value: &str) -> NativeResult<()>;
    /// Append an entry.
    fn list_append(&self, list: Self::List, name: &str, value: &str) -> NativeResult<()>;
    /// Remove all entries.
    fn list_reset(&self, list: Self::List) -> NativeResult<()>;
    /// Sort entries by name.
    fn list_sort(&self, list: Self::List) -> NativeResult<()>;
    /// Index of the first entry called `name`.
    fn list_find_by_name(&self, list: Self::List, name: &str) -> NativeResult<c_int>;

    /// Fill `list` with model/port pairs of every connected camera.
    fn autodetect(&self, context: &Self::Context, list: Self::List) -> NativeResult<c_int>;

    /// Create, configure and initialise a device handle.
    ///
    /// On failure every partially acquired native resource is released before
    /// returning.
    fn device_open(&self, context: &Self::Context, target: ConnectTarget<'_>) -> NativeResult<Self::Device>;
    /// Close the connection and release the handle.
    fn device_close(&self, device: &mut Self::Device, context: &Self::Context) -> NativeResult<()>;
    /// Human readable summary of the device.
    fn device_summary(&self, device: &mut Self::Device, context: &Self::Context) -> NativeResult<String>;
    /// Capture a transient preview into `file`.
    fn device_capture_preview(&self, device: &mut Self::Device, context: &Self::Context, file: Self::File) -> NativeResult<()>;
    /// Capture to device storage.
    fn device_capture(&self, device: &mut Self::Device, context: &Self::Context, capture_type: CaptureType) -> NativeResult<CameraFilePath>;
    /// Release the shutter without waiting for the result.
    fn device_trigger_capture(&self, device: &mut Self::Device, context: &Self::Context) -> NativeResult<()>;
    /// Read the full configuration tree.
    fn device_config(&self, device: &mut Self::Device, context: &Self::Context) -> NativeResult<Widget>;
    /// Write every value of `root` back to the device.
    fn device_set_config(&self, device: &mut Self::Device, context: &Self::Context, root: &Widget) -> NativeResult<()>;
    /// List files of `folder` into `list`.
    fn device_list_files(&self, device: &mut Self::Device, context: &Self::Context, folder: &str, list: Self::List) -> NativeResult<()>;
    /// List sub-folders of `folder` into `list`.
    fn device_list_folders(&self, device: &mut Self::Device, context: &Self::Context, folder: &str, list: Self::List) -> NativeResult<()>;
    /// Delete every file in `folder`.
    fn device_delete_all(&self, device: &mut Self::Device, context: &Self::Context, folder: &str) -> NativeResult<()>;
    /// Upload `file` as `folder/name`.
    fn device_put_file(
        &self,
        device: &mut Self::Device,
        context: &Self::Context,
        folder: &str,
        name: &str,
        file_type: FileType,
        file: Self::File,
    ) -> NativeResult<()>;
    /// Create `folder/name`.
    fn device_make_dir(&self, device: &mut Self::Device, context: &Self::Context, folder: &str, name: &str) -> NativeResult<()>;
    /// Remove `folder/name`.
    fn device_remove_dir(&self, device: &mut Self::Device, context: &Self::Context, folder: &str, name: &str) -> NativeResult<()>;
    /// Download `folder/name` into `file`.
    fn device_get_file(
        &self,
        device: &mut Self::Device,
        context: &Self::Context,
        folder: &str,
        name: &str,
        file_type: FileType,
        file: Self::File,
    ) -> NativeResult<()>;
    /// Delete `folder/name`.
    fn device_delete_file(&self, device: &mut Self::Device, context: &Self::Context, folder: &str, name: &str) -> NativeResult<()>;
    /// Block for up to `timeout` waiting for the next device event.
    fn device_wait_for_event(&self, device: &mut Self::Device, context: &Self::Context, timeout: Duration) -> NativeResult<CameraEvent>;
}

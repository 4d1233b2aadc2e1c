//! gphoto2-session: a thread-safe camera session over libgphoto2
//!
//! This library wraps the native libgphoto2 C library behind a [`Backend`]
//! trait. A [`Camera`] serialises every device call, runs a background event
//! listener and fans events out to subscribers. [`CameraFile`] and
//! [`CameraList`] manage native reference counts, and configuration trees are
//! read into owned [`Widget`] values.
//!
//! The production backend, [`device::Gphoto2`], loads libgphoto2 at runtime;
//! tests drive the same session code through an in-memory mock.

pub mod camera;
pub mod config;
#[cfg(feature = "libgphoto2")]
pub mod device;
pub mod error;
pub mod file;
pub mod list;
pub mod observer;
pub mod status;
pub mod traits;
pub mod validation;
pub mod widget;

#[cfg(test)]
pub mod mock;

pub use camera::{autodetect, Camera, Context, LISTENER_THREAD_NAME};
pub use config::SessionConfig;
#[cfg(feature = "libgphoto2")]
pub use device::Gphoto2;
pub use error::{CameraError, Result};
pub use file::CameraFile;
pub use list::CameraList;
pub use observer::{Subject, Subscription};
pub use status::{ErrorCategory, NativeResult, ResultCode, Translate};
pub use traits::{
    Backend, CameraEvent, CameraFilePath, Capability, CaptureType, ConnectTarget, EventKind, FileType,
};
pub use widget::{Widget, WidgetBody, WidgetKind, WidgetValue, WindowWidget};

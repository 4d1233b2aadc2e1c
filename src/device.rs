//! libgphoto2 backend, loaded at runtime.
//!
//! The shared library is opened with `libloading` and every export the crate
//! uses is resolved once, up front. A library that is missing a required
//! symbol is rejected at load time; `gp_file_get_name_by_type` (2.5+) is the
//! only optional one and is reported through [`Capability::NameByType`].
#![allow(unsafe_code)]

use std::ffi::{c_char, c_float, c_int, c_ulong, c_void, CStr, CString};
use std::mem;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use libloading::Library;

use crate::config::SessionConfig;
use crate::error::{CameraError, Result};
use crate::status::{check, NativeResult, ResultCode};
use crate::traits::{Backend, CameraEvent, CameraFilePath, CaptureType, Capability, ConnectTarget, EventKind, FileType};
use crate::widget::{Widget, WidgetBody, WidgetKind, WidgetValue};

/// Library names tried, in order, by [`Gphoto2::load`].
pub const LIBRARY_CANDIDATES: &[&str] = &[
    "libgphoto2.so.6",
    "libgphoto2.so",
    "libgphoto2.6.dylib",
    "libgphoto2.dylib",
];

/// `sizeof(CameraText)`.
const CAMERA_TEXT_LEN: usize = 32 * 1024;

type Ptr = *mut c_void;
type Str = *const c_char;

/// `CameraFilePath`.
#[repr(C)]
struct RawFilePath {
    name: [c_char; 128],
    folder: [c_char; 1024],
}

/// `CameraAbilities` (libgphoto2 2.5 layout).
#[repr(C)]
struct RawAbilities {
    model: [c_char; 128],
    status: c_int,
    port: c_int,
    speed: [c_int; 64],
    operations: c_int,
    file_operations: c_int,
    folder_operations: c_int,
    usb_vendor: c_int,
    usb_product: c_int,
    usb_class: c_int,
    usb_subclass: c_int,
    usb_protocol: c_int,
    library: [c_char; 1024],
    id: [c_char; 1024],
    device_type: c_int,
    reserved: [c_int; 7],
}

type FileGetNameByType = unsafe extern "C" fn(Ptr, Str, c_int, *mut *mut c_char) -> c_int;

fn symbol<T: Copy>(library: &Library, name: &[u8]) -> std::result::Result<T, libloading::Error> {
    // SAFETY: each requested `T` is the C signature of the named libgphoto2 export.
    unsafe { library.get::<T>(name).map(|sym| *sym) }
}

macro_rules! gphoto2_api {
    ($($name:ident: fn($($arg:ty),*) -> $ret:ty;)*) => {
        /// Resolved libgphoto2 entry points. Fields are named after the
        /// export without its `gp_` prefix.
        struct Api {
            $($name: unsafe extern "C" fn($($arg),*) -> $ret,)*
            file_get_name_by_type: Option<FileGetNameByType>,
            _library: Library,
        }

        impl Api {
            fn resolve(library: Library) -> std::result::Result<Self, libloading::Error> {
                Ok(Self {
                    $($name: symbol(&library, concat!("gp_", stringify!($name), "\0").as_bytes())?,)*
                    file_get_name_by_type: symbol(&library, b"gp_file_get_name_by_type\0").ok(),
                    _library: library,
                })
            }
        }
    };
}

gphoto2_api! {
    context_new: fn() -> Ptr;
    context_unref: fn(Ptr) -> ();

    file_new: fn(*mut Ptr) -> c_int;
    file_ref: fn(Ptr) -> c_int;
    file_unref: fn(Ptr) -> c_int;
    file_get_data_and_size: fn(Ptr, *mut Str, *mut c_ulong) -> c_int;
    file_set_data_and_size: fn(Ptr, *mut c_char, c_ulong) -> c_int;
    file_get_mime_type: fn(Ptr, *mut Str) -> c_int;
    file_set_mime_type: fn(Ptr, Str) -> c_int;
    file_get_name: fn(Ptr, *mut Str) -> c_int;
    file_set_name: fn(Ptr, Str) -> c_int;
    file_detect_mime_type: fn(Ptr) -> c_int;
    file_adjust_name_for_mime_type: fn(Ptr) -> c_int;
    file_save: fn(Ptr, Str) -> c_int;
    file_get_mtime: fn(Ptr, *mut libc::time_t) -> c_int;
    file_set_mtime: fn(Ptr, libc::time_t) -> c_int;

    list_new: fn(*mut Ptr) -> c_int;
    list_ref: fn(Ptr) -> c_int;
    list_unref: fn(Ptr) -> c_int;
    list_count: fn(Ptr) -> c_int;
    list_get_name: fn(Ptr, c_int, *mut Str) -> c_int;
    list_get_value: fn(Ptr, c_int, *mut Str) -> c_int;
    list_set_name: fn(Ptr, c_int, Str) -> c_int;
    list_set_value: fn(Ptr, c_int, Str) -> c_int;
    list_append: fn(Ptr, Str, Str) -> c_int;
    list_reset: fn(Ptr) -> c_int;
    list_sort: fn(Ptr) -> c_int;
    list_find_by_name: fn(Ptr, *mut c_int, Str) -> c_int;

    abilities_list_new: fn(*mut Ptr) -> c_int;
    abilities_list_load: fn(Ptr, Ptr) -> c_int;
    abilities_list_lookup_model: fn(Ptr, Str) -> c_int;
    abilities_list_get_abilities: fn(Ptr, c_int, *mut RawAbilities) -> c_int;
    abilities_list_free: fn(Ptr) -> c_int;
    port_info_list_new: fn(*mut Ptr) -> c_int;
    port_info_list_load: fn(Ptr) -> c_int;
    port_info_list_lookup_path: fn(Ptr, Str) -> c_int;
    port_info_list_get_info: fn(Ptr, c_int, *mut Ptr) -> c_int;
    port_info_list_free: fn(Ptr) -> c_int;

    camera_autodetect: fn(Ptr, Ptr) -> c_int;
    camera_new: fn(*mut Ptr) -> c_int;
    camera_set_abilities: fn(Ptr, RawAbilities) -> c_int;
    camera_set_port_info: fn(Ptr, Ptr) -> c_int;
    camera_init: fn(Ptr, Ptr) -> c_int;
    camera_exit: fn(Ptr, Ptr) -> c_int;
    camera_unref: fn(Ptr) -> c_int;
    camera_get_summary: fn(Ptr, *mut c_char, Ptr) -> c_int;
    camera_capture_preview: fn(Ptr, Ptr, Ptr) -> c_int;
    camera_capture: fn(Ptr, c_int, *mut RawFilePath, Ptr) -> c_int;
    camera_trigger_capture: fn(Ptr, Ptr) -> c_int;
    camera_get_config: fn(Ptr, *mut Ptr, Ptr) -> c_int;
    camera_set_config: fn(Ptr, Ptr, Ptr) -> c_int;
    camera_folder_list_files: fn(Ptr, Str, Ptr, Ptr) -> c_int;
    camera_folder_list_folders: fn(Ptr, Str, Ptr, Ptr) -> c_int;
    camera_folder_delete_all: fn(Ptr, Str, Ptr) -> c_int;
    camera_folder_put_file: fn(Ptr, Str, Str, c_int, Ptr, Ptr) -> c_int;
    camera_folder_make_dir: fn(Ptr, Str, Str, Ptr) -> c_int;
    camera_folder_remove_dir: fn(Ptr, Str, Str, Ptr) -> c_int;
    camera_file_get: fn(Ptr, Str, Str, c_int, Ptr, Ptr) -> c_int;
    camera_file_delete: fn(Ptr, Str, Str, Ptr) -> c_int;
    camera_wait_for_event: fn(Ptr, c_int, *mut c_int, *mut Ptr, Ptr) -> c_int;

    widget_get_type: fn(Ptr, *mut c_int) -> c_int;
    widget_get_name: fn(Ptr, *mut Str) -> c_int;
    widget_get_label: fn(Ptr, *mut Str) -> c_int;
    widget_get_readonly: fn(Ptr, *mut c_int) -> c_int;
    widget_count_children: fn(Ptr) -> c_int;
    widget_get_child: fn(Ptr, c_int, *mut Ptr) -> c_int;
    widget_get_child_by_name: fn(Ptr, Str, *mut Ptr) -> c_int;
    widget_get_value: fn(Ptr, *mut c_void) -> c_int;
    widget_set_value: fn(Ptr, *const c_void) -> c_int;
    widget_get_range: fn(Ptr, *mut c_float, *mut c_float, *mut c_float) -> c_int;
    widget_count_choices: fn(Ptr) -> c_int;
    widget_get_choice: fn(Ptr, c_int, *mut Str) -> c_int;
    widget_free: fn(Ptr) -> c_int;
}

/// Non-null pointer to a libgphoto2 object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHandle(NonNull<c_void>);

// SAFETY: libgphoto2 objects are plain heap data without thread affinity.
// Device calls are serialised by the session's I/O lock. Files and lists are
// shared between wrapper clones and their refcounts are not atomic, so every
// call that touches one holds `Gphoto2::objects`.
unsafe impl Send for RawHandle {}
// SAFETY: see above.
unsafe impl Sync for RawHandle {}

impl RawHandle {
    fn new(ptr: Ptr) -> NativeResult<Self> {
        NonNull::new(ptr).map(Self).ok_or(ResultCode::NO_MEMORY)
    }

    const fn as_ptr(self) -> Ptr {
        self.0.as_ptr()
    }
}

/// An initialised `Camera *`. Emptied by [`Backend::device_close`].
#[derive(Debug)]
pub struct Gphoto2Device {
    camera: Option<RawHandle>,
}

impl Gphoto2Device {
    fn as_ptr(&self) -> NativeResult<Ptr> {
        self.camera.map(RawHandle::as_ptr).ok_or(ResultCode::BAD_PARAMETERS)
    }
}

/// Frees a native object when dropped, unless [`Owned::release`] hands it on.
struct Owned {
    ptr: Ptr,
    free: unsafe extern "C" fn(Ptr) -> c_int,
}

impl Owned {
    fn release(self) -> Ptr {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }
}

impl Drop for Owned {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: `ptr` came from the allocator paired with `free` and is not used afterwards.
            unsafe { (self.free)(self.ptr) };
        }
    }
}

/// A buffer allocated by libgphoto2 with `malloc`.
struct Malloced(Ptr);

impl Drop for Malloced {
    fn drop(&mut self) {
        // SAFETY: libgphoto2 hands event payloads and derived names to the caller to free.
        unsafe { libc::free(self.0) };
    }
}

fn c_string(value: &str) -> NativeResult<CString> {
    CString::new(value).map_err(|_| ResultCode::BAD_PARAMETERS)
}

/// Copies a C string owned by libgphoto2. Null reads as empty.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid for
/// the duration of the call.
unsafe fn read_str(ptr: Str) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Copies a fixed-size, NUL-padded `char` array.
fn read_array(buf: &[c_char]) -> String {
    #[allow(clippy::cast_sign_loss)]
    let bytes: Vec<u8> = buf.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// The production backend.
pub struct Gphoto2 {
    api: Api,
    /// Held across every call on a file or list, including refcount changes
    /// and the whole of a `file_with_data` borrow.
    objects: Mutex<()>,
}

impl std::fmt::Debug for Gphoto2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gphoto2")
            .field("name_by_type", &self.api.file_get_name_by_type.is_some())
            .finish_non_exhaustive()
    }
}

impl Gphoto2 {
    /// Load libgphoto2 from the first of [`LIBRARY_CANDIDATES`] that opens.
    pub fn load() -> Result<Arc<Self>> {
        let mut last_error = None;
        for candidate in LIBRARY_CANDIDATES {
            match Self::load_from(candidate) {
                Ok(backend) => return Ok(backend),
                Err(err) => {
                    tracing::debug!(candidate = %candidate, error = %err, "libgphoto2 candidate rejected");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CameraError::Library("no candidate library names".to_owned())))
    }

    /// Load libgphoto2 from an explicit file name or path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let path = path.as_ref();
        // SAFETY: libgphoto2's initialisers have no preconditions.
        let library = unsafe { Library::new(path.as_os_str()) }
            .map_err(|err| CameraError::Library(format!("{}: {err}", path.display())))?;
        let api = Api::resolve(library).map_err(|err| CameraError::Library(err.to_string()))?;
        tracing::debug!(
            path = %path.display(),
            name_by_type = api.file_get_name_by_type.is_some(),
            "loaded libgphoto2"
        );
        Ok(Arc::new(Self {
            api,
            objects: Mutex::new(()),
        }))
    }

    /// Load the library named by `config.library_path`, or search the defaults.
    pub fn from_config(config: &SessionConfig) -> Result<Arc<Self>> {
        match &config.library_path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        }
    }

    fn objects(&self) -> MutexGuard<'_, ()> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn select_model(&self, camera: Ptr, context: Ptr, model: &str, port: &str) -> NativeResult<()> {
        let model = c_string(model)?;
        let port = c_string(port)?;
        let api = &self.api;

        let mut list = ptr::null_mut();
        // SAFETY: out-pointer call; the list is freed by the guard.
        check(unsafe { (api.abilities_list_new)(&mut list) })?;
        let abilities_list = Owned {
            ptr: list,
            free: api.abilities_list_free,
        };
        // SAFETY: live list and context.
        check(unsafe { (api.abilities_list_load)(abilities_list.ptr, context) })?;
        // SAFETY: live list, NUL-terminated model.
        let index = check(unsafe { (api.abilities_list_lookup_model)(abilities_list.ptr, model.as_ptr()) })?;
        // SAFETY: every field of `CameraAbilities` is an integer or an integer array.
        let mut abilities: RawAbilities = unsafe { mem::zeroed() };
        // SAFETY: `index` was returned by the lookup on this list.
        check(unsafe { (api.abilities_list_get_abilities)(abilities_list.ptr, index, &mut abilities) })?;
        // SAFETY: `camera` is a fresh, uninitialised camera.
        check(unsafe { (api.camera_set_abilities)(camera, abilities) })?;

        let mut list = ptr::null_mut();
        // SAFETY: out-pointer call; the list is freed by the guard.
        check(unsafe { (api.port_info_list_new)(&mut list) })?;
        let port_list = Owned {
            ptr: list,
            free: api.port_info_list_free,
        };
        // SAFETY: live list.
        check(unsafe { (api.port_info_list_load)(port_list.ptr) })?;
        // SAFETY: live list, NUL-terminated path.
        let index = check(unsafe { (api.port_info_list_lookup_path)(port_list.ptr, port.as_ptr()) })?;
        let mut info = ptr::null_mut();
        // SAFETY: `info` is owned by `port_list` and copied by `camera_set_port_info`.
        check(unsafe { (api.port_info_list_get_info)(port_list.ptr, index, &mut info) })?;
        // SAFETY: live camera and port info.
        check(unsafe { (api.camera_set_port_info)(camera, info) })?;
        Ok(())
    }

    fn read_widget(&self, widget: Ptr) -> NativeResult<Widget> {
        let api = &self.api;
        let mut raw_kind = 0;
        let mut name = ptr::null();
        let mut label = ptr::null();
        let mut read_only = 0;
        // SAFETY: `widget` belongs to a tree the caller keeps alive; strings are copied
        // before the tree is freed.
        let (name, label) = unsafe {
            check((api.widget_get_type)(widget, &mut raw_kind))?;
            check((api.widget_get_name)(widget, &mut name))?;
            check((api.widget_get_label)(widget, &mut label))?;
            check((api.widget_get_readonly)(widget, &mut read_only))?;
            (read_str(name), read_str(label))
        };
        let kind = WidgetKind::from_raw(raw_kind).ok_or(ResultCode::CORRUPTED_DATA)?;

        let body = match kind {
            WidgetKind::Window | WidgetKind::Section => {
                // SAFETY: live widget.
                let count = check(unsafe { (api.widget_count_children)(widget) })?;
                let children = (0..count)
                    .map(|index| {
                        let mut child = ptr::null_mut();
                        // SAFETY: `index` is below the child count; children live as long as the root.
                        check(unsafe { (api.widget_get_child)(widget, index, &mut child) })?;
                        self.read_widget(child)
                    })
                    .collect::<NativeResult<Vec<_>>>()?;
                if kind == WidgetKind::Window {
                    WidgetBody::Window(children)
                } else {
                    WidgetBody::Section(children)
                }
            }
            WidgetKind::Text => WidgetBody::Text(self.read_text(widget)?),
            WidgetKind::Range => {
                let (mut min, mut max, mut step): (c_float, c_float, c_float) = (0.0, 0.0, 0.0);
                // SAFETY: live range widget.
                check(unsafe { (api.widget_get_range)(widget, &mut min, &mut max, &mut step) })?;
                let mut value: c_float = 0.0;
                // SAFETY: range widgets store a float.
                check(unsafe { (api.widget_get_value)(widget, ptr::addr_of_mut!(value).cast()) })?;
                WidgetBody::Range { value, min, max, step }
            }
            WidgetKind::Toggle => WidgetBody::Toggle(self.read_int(widget)? != 0),
            WidgetKind::Radio | WidgetKind::Menu => {
                let value = self.read_text(widget)?;
                // SAFETY: live choice widget.
                let count = check(unsafe { (api.widget_count_choices)(widget) })?;
                let choices = (0..count)
                    .map(|index| {
                        let mut choice = ptr::null();
                        // SAFETY: `index` is below the choice count; the string is copied at once.
                        unsafe {
                            check((api.widget_get_choice)(widget, index, &mut choice))?;
                            Ok(read_str(choice))
                        }
                    })
                    .collect::<NativeResult<Vec<_>>>()?;
                if kind == WidgetKind::Radio {
                    WidgetBody::Radio { value, choices }
                } else {
                    WidgetBody::Menu { value, choices }
                }
            }
            WidgetKind::Button => WidgetBody::Button,
            WidgetKind::Date => WidgetBody::Date(i64::from(self.read_int(widget)?)),
        };
        Ok(Widget::new(name, label, body).with_read_only(read_only != 0))
    }

    fn read_text(&self, widget: Ptr) -> NativeResult<String> {
        let mut value: Str = ptr::null();
        // SAFETY: text, radio and menu widgets store a `char *` owned by the widget.
        unsafe {
            check((self.api.widget_get_value)(widget, ptr::addr_of_mut!(value).cast()))?;
            Ok(read_str(value))
        }
    }

    fn read_int(&self, widget: Ptr) -> NativeResult<c_int> {
        let mut value: c_int = 0;
        // SAFETY: toggle and date widgets store an `int`.
        check(unsafe { (self.api.widget_get_value)(widget, ptr::addr_of_mut!(value).cast()) })?;
        Ok(value)
    }

    fn write_value(&self, widget: Ptr, value: &WidgetValue) -> NativeResult<()> {
        let set = self.api.widget_set_value;
        // SAFETY: each arm passes the representation libgphoto2 expects for the
        // widget kind that produced `value`; the pointee outlives the call.
        let code = match value {
            WidgetValue::Text(text) | WidgetValue::Choice(text) => {
                let text = c_string(text)?;
                unsafe { set(widget, text.as_ptr().cast()) }
            }
            WidgetValue::Float(number) => unsafe { set(widget, ptr::addr_of!(*number).cast()) },
            WidgetValue::Toggle(on) => {
                let on = c_int::from(*on);
                unsafe { set(widget, ptr::addr_of!(on).cast()) }
            }
            WidgetValue::Date(timestamp) => {
                let timestamp = c_int::try_from(*timestamp).map_err(|_| ResultCode::BAD_PARAMETERS)?;
                unsafe { set(widget, ptr::addr_of!(timestamp).cast()) }
            }
        };
        check(code).map(drop)
    }

    fn get_config_tree(&self, camera: Ptr, context: Ptr) -> NativeResult<Owned> {
        let mut root = ptr::null_mut();
        // SAFETY: live camera and context; the tree is freed by the returned guard.
        check(unsafe { (self.api.camera_get_config)(camera, &mut root, context) })?;
        Ok(Owned {
            ptr: root,
            free: self.api.widget_free,
        })
    }
}

impl Backend for Gphoto2 {
    type Context = RawHandle;
    type Device = Gphoto2Device;
    type File = RawHandle;
    type List = RawHandle;

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::NameByType => self.api.file_get_name_by_type.is_some(),
        }
    }

    fn context_new(&self) -> NativeResult<RawHandle> {
        // SAFETY: no preconditions.
        RawHandle::new(unsafe { (self.api.context_new)() })
    }

    fn context_unref(&self, context: &RawHandle) {
        // SAFETY: the caller owns one reference and gives it up here.
        unsafe { (self.api.context_unref)(context.as_ptr()) };
    }

    fn file_new(&self) -> NativeResult<RawHandle> {
        let _objects = self.objects();
        let mut file = ptr::null_mut();
        // SAFETY: out-pointer call.
        check(unsafe { (self.api.file_new)(&mut file) })?;
        RawHandle::new(file)
    }

    fn file_ref(&self, file: RawHandle) -> NativeResult<()> {
        let _objects = self.objects();
        // SAFETY: `file` is live.
        check(unsafe { (self.api.file_ref)(file.as_ptr()) }).map(drop)
    }

    fn file_unref(&self, file: RawHandle) -> NativeResult<()> {
        let _objects = self.objects();
        // SAFETY: the caller owns one reference and gives it up here.
        check(unsafe { (self.api.file_unref)(file.as_ptr()) }).map(drop)
    }

    fn file_with_data<R, F: FnOnce(&[u8]) -> R>(&self, file: RawHandle, read: F) -> NativeResult<R> {
        let _objects = self.objects();
        let mut data: Str = ptr::null();
        let mut size: c_ulong = 0;
        // SAFETY: `file` is live; the buffer stays owned by it.
        check(unsafe { (self.api.file_get_data_and_size)(file.as_ptr(), &mut data, &mut size) })?;
        let len = usize::try_from(size).map_err(|_| ResultCode::FIXED_LIMIT_EXCEEDED)?;
        if data.is_null() || len == 0 {
            return Ok(read(&[]));
        }
        // SAFETY: libgphoto2 reports `len` readable bytes at `data`. Nothing can
        // modify or free the file while `objects` is held, which spans `read`.
        let bytes = unsafe { slice::from_raw_parts(data.cast::<u8>(), len) };
        Ok(read(bytes))
    }

    fn file_set_data(&self, file: RawHandle, data: &[u8]) -> NativeResult<()> {
        let _objects = self.objects();
        let size = c_ulong::try_from(data.len()).map_err(|_| ResultCode::FIXED_LIMIT_EXCEEDED)?;
        // SAFETY: libgphoto2 takes ownership of a `malloc`ed buffer and frees it itself.
        unsafe {
            let buffer = libc::malloc(data.len().max(1)).cast::<c_char>();
            if buffer.is_null() {
                return Err(ResultCode::NO_MEMORY);
            }
            ptr::copy_nonoverlapping(data.as_ptr(), buffer.cast::<u8>(), data.len());
            let code = (self.api.file_set_data_and_size)(file.as_ptr(), buffer, size);
            if code < 0 {
                libc::free(buffer.cast());
            }
            check(code).map(drop)
        }
    }

    fn file_mime_type(&self, file: RawHandle) -> NativeResult<String> {
        let _objects = self.objects();
        let mut mime = ptr::null();
        // SAFETY: `file` is live; the string is copied at once.
        unsafe {
            check((self.api.file_get_mime_type)(file.as_ptr(), &mut mime))?;
            Ok(read_str(mime))
        }
    }

    fn file_set_mime_type(&self, file: RawHandle, mime_type: &str) -> NativeResult<()> {
        let _objects = self.objects();
        let mime_type = c_string(mime_type)?;
        // SAFETY: `file` is live; the string is copied by libgphoto2.
        check(unsafe { (self.api.file_set_mime_type)(file.as_ptr(), mime_type.as_ptr()) }).map(drop)
    }

    fn file_name(&self, file: RawHandle) -> NativeResult<String> {
        let _objects = self.objects();
        let mut name = ptr::null();
        // SAFETY: `file` is live; the string is copied at once.
        unsafe {
            check((self.api.file_get_name)(file.as_ptr(), &mut name))?;
            Ok(read_str(name))
        }
    }

    fn file_set_name(&self, file: RawHandle, name: &str) -> NativeResult<()> {
        let _objects = self.objects();
        let name = c_string(name)?;
        // SAFETY: `file` is live; the string is copied by libgphoto2.
        check(unsafe { (self.api.file_set_name)(file.as_ptr(), name.as_ptr()) }).map(drop)
    }

    fn file_detect_mime_type(&self, file: RawHandle) -> NativeResult<()> {
        let _objects = self.objects();
        // SAFETY: `file` is live.
        check(unsafe { (self.api.file_detect_mime_type)(file.as_ptr()) }).map(drop)
    }

    fn file_adjust_name_for_mime_type(&self, file: RawHandle) -> NativeResult<()> {
        let _objects = self.objects();
        // SAFETY: `file` is live.
        check(unsafe { (self.api.file_adjust_name_for_mime_type)(file.as_ptr()) }).map(drop)
    }

    fn file_name_by_type(&self, file: RawHandle, base_name: &str, file_type: FileType) -> NativeResult<String> {
        let _objects = self.objects();
        let name_by_type = self.api.file_get_name_by_type.ok_or(ResultCode::NOT_SUPPORTED)?;
        let base_name = c_string(base_name)?;
        let mut derived: *mut c_char = ptr::null_mut();
        // SAFETY: `file` is live; `derived` is `malloc`ed for the caller and freed by the guard.
        unsafe {
            check(name_by_type(file.as_ptr(), base_name.as_ptr(), file_type.as_raw(), &mut derived))?;
            let derived = Malloced(derived.cast());
            Ok(read_str(derived.0.cast::<c_char>().cast_const()))
        }
    }

    fn file_save(&self, file: RawHandle, path: &Path) -> NativeResult<()> {
        let _objects = self.objects();
        let path = c_string(path.to_str().ok_or(ResultCode::BAD_PARAMETERS)?)?;
        // SAFETY: `file` is live.
        check(unsafe { (self.api.file_save)(file.as_ptr(), path.as_ptr()) }).map(drop)
    }

    fn file_mtime(&self, file: RawHandle) -> NativeResult<i64> {
        let _objects = self.objects();
        let mut mtime: libc::time_t = 0;
        // SAFETY: `file` is live.
        check(unsafe { (self.api.file_get_mtime)(file.as_ptr(), &mut mtime) })?;
        Ok(i64::from(mtime))
    }

    fn file_set_mtime(&self, file: RawHandle, mtime: i64) -> NativeResult<()> {
        let _objects = self.objects();
        let mtime = libc::time_t::try_from(mtime).map_err(|_| ResultCode::BAD_PARAMETERS)?;
        // SAFETY: `file` is live.
        check(unsafe { (self.api.file_set_mtime)(file.as_ptr(), mtime) }).map(drop)
    }

    fn list_new(&self) -> NativeResult<RawHandle> {
        let _objects = self.objects();
        let mut list = ptr::null_mut();
        // SAFETY: out-pointer call.
        check(unsafe { (self.api.list_new)(&mut list) })?;
        RawHandle::new(list)
    }

    fn list_ref(&self, list: RawHandle) -> NativeResult<()> {
        let _objects = self.objects();
        // SAFETY: `list` is live.
        check(unsafe { (self.api.list_ref)(list.as_ptr()) }).map(drop)
    }

    fn list_unref(&self, list: RawHandle) -> NativeResult<()> {
        let _objects = self.objects();
        // SAFETY: the caller owns one reference and gives it up here.
        check(unsafe { (self.api.list_unref)(list.as_ptr()) }).map(drop)
    }

    fn list_count(&self, list: RawHandle) -> NativeResult<c_int> {
        let _objects = self.objects();
        // SAFETY: `list` is live.
        check(unsafe { (self.api.list_count)(list.as_ptr()) })
    }

    fn list_name(&self, list: RawHandle, index: c_int) -> NativeResult<String> {
        let _objects = self.objects();
        let mut name = ptr::null();
        // SAFETY: libgphoto2 range-checks `index`; the string is copied at once.
        unsafe {
            check((self.api.list_get_name)(list.as_ptr(), index, &mut name))?;
            Ok(read_str(name))
        }
    }

    fn list_value(&self, list: RawHandle, index: c_int) -> NativeResult<String> {
        let _objects = self.objects();
        let mut value = ptr::null();
        // SAFETY: libgphoto2 range-checks `index`; the string is copied at once.
        unsafe {
            check((self.api.list_get_value)(list.as_ptr(), index, &mut value))?;
            Ok(read_str(value))
        }
    }

    fn list_set_name(&self, list: RawHandle, index: c_int, name: &str) -> NativeResult<()> {
        let _objects = self.objects();
        let name = c_string(name)?;
        // SAFETY: libgphoto2 range-checks `index` and copies the string.
        check(unsafe { (self.api.list_set_name)(list.as_ptr(), index, name.as_ptr()) }).map(drop)
    }

    fn list_set_value(&self, list: RawHandle, index: c_int, value: &str) -> NativeResult<()> {
        let _objects = self.objects();
        let value = c_string(value)?;
        // SAFETY: libgphoto2 range-checks `index` and copies the string.
        check(unsafe { (self.api.list_set_value)(list.as_ptr(), index, value.as_ptr()) }).map(drop)
    }

    fn list_append(&self, list: RawHandle, name: &str, value: &str) -> NativeResult<()> {
        let _objects = self.objects();
        let name = c_string(name)?;
        let value = c_string(value)?;
        // SAFETY: `list` is live; both strings are copied.
        check(unsafe { (self.api.list_append)(list.as_ptr(), name.as_ptr(), value.as_ptr()) }).map(drop)
    }

    fn list_reset(&self, list: RawHandle) -> NativeResult<()> {
        let _objects = self.objects();
        // SAFETY: `list` is live.
        check(unsafe { (self.api.list_reset)(list.as_ptr()) }).map(drop)
    }

    fn list_sort(&self, list: RawHandle) -> NativeResult<()> {
        let _objects = self.objects();
        // SAFETY: `list` is live.
        check(unsafe { (self.api.list_sort)(list.as_ptr()) }).map(drop)
    }

    fn list_find_by_name(&self, list: RawHandle, name: &str) -> NativeResult<c_int> {
        let _objects = self.objects();
        let name = c_string(name)?;
        let mut index = 0;
        // SAFETY: `list` is live.
        check(unsafe { (self.api.list_find_by_name)(list.as_ptr(), &mut index, name.as_ptr()) })?;
        Ok(index)
    }

    fn autodetect(&self, context: &RawHandle, list: RawHandle) -> NativeResult<c_int> {
        let _objects = self.objects();
        // SAFETY: live list and context.
        check(unsafe { (self.api.camera_autodetect)(list.as_ptr(), context.as_ptr()) })
    }

    fn device_open(&self, context: &RawHandle, target: ConnectTarget<'_>) -> NativeResult<Gphoto2Device> {
        let mut camera = ptr::null_mut();
        // SAFETY: out-pointer call; the camera is released by the guard on failure.
        check(unsafe { (self.api.camera_new)(&mut camera) })?;
        let camera = Owned {
            ptr: camera,
            free: self.api.camera_unref,
        };
        if let ConnectTarget::Explicit { model, port } = target {
            self.select_model(camera.ptr, context.as_ptr(), model, port)?;
        }
        // SAFETY: live camera and context.
        check(unsafe { (self.api.camera_init)(camera.ptr, context.as_ptr()) })?;
        Ok(Gphoto2Device {
            camera: Some(RawHandle::new(camera.release())?),
        })
    }

    fn device_close(&self, device: &mut Gphoto2Device, context: &RawHandle) -> NativeResult<()> {
        let camera = device.camera.take().ok_or(ResultCode::BAD_PARAMETERS)?;
        // SAFETY: `camera` was initialised by `device_open` and is not used again.
        let exited = check(unsafe { (self.api.camera_exit)(camera.as_ptr(), context.as_ptr()) });
        // SAFETY: see above.
        let released = check(unsafe { (self.api.camera_unref)(camera.as_ptr()) });
        exited.and(released).map(drop)
    }

    fn device_summary(&self, device: &mut Gphoto2Device, context: &RawHandle) -> NativeResult<String> {
        let mut text: Vec<c_char> = vec![0; CAMERA_TEXT_LEN];
        // SAFETY: `CameraText` is a bare `char[CAMERA_TEXT_LEN]`.
        check(unsafe { (self.api.camera_get_summary)(device.as_ptr()?, text.as_mut_ptr(), context.as_ptr()) })?;
        Ok(read_array(&text))
    }

    fn device_capture_preview(&self, device: &mut Gphoto2Device, context: &RawHandle, file: RawHandle) -> NativeResult<()> {
        let _objects = self.objects();
        // SAFETY: live camera, file and context.
        check(unsafe { (self.api.camera_capture_preview)(device.as_ptr()?, file.as_ptr(), context.as_ptr()) }).map(drop)
    }

    fn device_capture(&self, device: &mut Gphoto2Device, context: &RawHandle, capture_type: CaptureType) -> NativeResult<CameraFilePath> {
        let mut path = RawFilePath {
            name: [0; 128],
            folder: [0; 1024],
        };
        // SAFETY: live camera and context; `path` is filled in place.
        check(unsafe {
            (self.api.camera_capture)(device.as_ptr()?, capture_type.as_raw(), &mut path, context.as_ptr())
        })?;
        Ok(CameraFilePath::new(read_array(&path.folder), read_array(&path.name)))
    }

    fn device_trigger_capture(&self, device: &mut Gphoto2Device, context: &RawHandle) -> NativeResult<()> {
        // SAFETY: live camera and context.
        check(unsafe { (self.api.camera_trigger_capture)(device.as_ptr()?, context.as_ptr()) }).map(drop)
    }

    fn device_config(&self, device: &mut Gphoto2Device, context: &RawHandle) -> NativeResult<Widget> {
        let root = self.get_config_tree(device.as_ptr()?, context.as_ptr())?;
        self.read_widget(root.ptr)
    }

    fn device_set_config(&self, device: &mut Gphoto2Device, context: &RawHandle, root: &Widget) -> NativeResult<()> {
        let camera = device.as_ptr()?;
        let native = self.get_config_tree(camera, context.as_ptr())?;
        for node in root.iter().filter(|node| !node.is_read_only()) {
            let Some(value) = node.value() else { continue };
            let name = c_string(node.name())?;
            let mut widget = ptr::null_mut();
            // SAFETY: `native` is a live tree; the child is owned by it.
            check(unsafe { (self.api.widget_get_child_by_name)(native.ptr, name.as_ptr(), &mut widget) })?;
            if self.read_widget(widget)?.value().as_ref() != Some(&value) {
                self.write_value(widget, &value)?;
            }
        }
        // SAFETY: live camera, tree and context.
        check(unsafe { (self.api.camera_set_config)(camera, native.ptr, context.as_ptr()) }).map(drop)
    }

    fn device_list_files(&self, device: &mut Gphoto2Device, context: &RawHandle, folder: &str, list: RawHandle) -> NativeResult<()> {
        let _objects = self.objects();
        let folder = c_string(folder)?;
        // SAFETY: live camera, list and context.
        check(unsafe {
            (self.api.camera_folder_list_files)(device.as_ptr()?, folder.as_ptr(), list.as_ptr(), context.as_ptr())
        })
        .map(drop)
    }

    fn device_list_folders(&self, device: &mut Gphoto2Device, context: &RawHandle, folder: &str, list: RawHandle) -> NativeResult<()> {
        let _objects = self.objects();
        let folder = c_string(folder)?;
        // SAFETY: live camera, list and context.
        check(unsafe {
            (self.api.camera_folder_list_folders)(device.as_ptr()?, folder.as_ptr(), list.as_ptr(), context.as_ptr())
        })
        .map(drop)
    }

    fn device_delete_all(&self, device: &mut Gphoto2Device, context: &RawHandle, folder: &str) -> NativeResult<()> {
        let folder = c_string(folder)?;
        // SAFETY: live camera and context.
        check(unsafe { (self.api.camera_folder_delete_all)(device.as_ptr()?, folder.as_ptr(), context.as_ptr()) }).map(drop)
    }

    fn device_put_file(
        &self,
        device: &mut Gphoto2Device,
        context: &RawHandle,
        folder: &str,
        name: &str,
        file_type: FileType,
        file: RawHandle,
    ) -> NativeResult<()> {
        let _objects = self.objects();
        let folder = c_string(folder)?;
        let name = c_string(name)?;
        // SAFETY: live camera, file and context.
        check(unsafe {
            (self.api.camera_folder_put_file)(
                device.as_ptr()?,
                folder.as_ptr(),
                name.as_ptr(),
                file_type.as_raw(),
                file.as_ptr(),
                context.as_ptr(),
            )
        })
        .map(drop)
    }

    fn device_make_dir(&self, device: &mut Gphoto2Device, context: &RawHandle, folder: &str, name: &str) -> NativeResult<()> {
        let folder = c_string(folder)?;
        let name = c_string(name)?;
        // SAFETY: live camera and context.
        check(unsafe {
            (self.api.camera_folder_make_dir)(device.as_ptr()?, folder.as_ptr(), name.as_ptr(), context.as_ptr())
        })
        .map(drop)
    }

    fn device_remove_dir(&self, device: &mut Gphoto2Device, context: &RawHandle, folder: &str, name: &str) -> NativeResult<()> {
        let folder = c_string(folder)?;
        let name = c_string(name)?;
        // SAFETY: live camera and context.
        check(unsafe {
            (self.api.camera_folder_remove_dir)(device.as_ptr()?, folder.as_ptr(), name.as_ptr(), context.as_ptr())
        })
        .map(drop)
    }

    fn device_get_file(
        &self,
        device: &mut Gphoto2Device,
        context: &RawHandle,
        folder: &str,
        name: &str,
        file_type: FileType,
        file: RawHandle,
    ) -> NativeResult<()> {
        let _objects = self.objects();
        let folder = c_string(folder)?;
        let name = c_string(name)?;
        // SAFETY: live camera, file and context.
        check(unsafe {
            (self.api.camera_file_get)(
                device.as_ptr()?,
                folder.as_ptr(),
                name.as_ptr(),
                file_type.as_raw(),
                file.as_ptr(),
                context.as_ptr(),
            )
        })
        .map(drop)
    }

    fn device_delete_file(&self, device: &mut Gphoto2Device, context: &RawHandle, folder: &str, name: &str) -> NativeResult<()> {
        let folder = c_string(folder)?;
        let name = c_string(name)?;
        // SAFETY: live camera and context.
        check(unsafe {
            (self.api.camera_file_delete)(device.as_ptr()?, folder.as_ptr(), name.as_ptr(), context.as_ptr())
        })
        .map(drop)
    }

    fn device_wait_for_event(&self, device: &mut Gphoto2Device, context: &RawHandle, timeout: Duration) -> NativeResult<CameraEvent> {
        let timeout_ms = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);
        let mut raw_kind: c_int = 0;
        let mut data: Ptr = ptr::null_mut();
        // SAFETY: live camera and context; the payload is handed to us to free.
        check(unsafe {
            (self.api.camera_wait_for_event)(device.as_ptr()?, timeout_ms, &mut raw_kind, &mut data, context.as_ptr())
        })?;
        let payload = Malloced(data);
        let kind = EventKind::from_raw(raw_kind);

        let event = if payload.0.is_null() {
            CameraEvent::bare(kind)
        } else if kind.has_path() {
            // SAFETY: path-carrying events deliver a `CameraFilePath *`.
            let path = unsafe { &*payload.0.cast::<RawFilePath>() };
            CameraEvent::with_path(kind, CameraFilePath::new(read_array(&path.folder), read_array(&path.name)))
        } else if kind == EventKind::Unknown {
            CameraEvent {
                // SAFETY: unknown events deliver a NUL-terminated description.
                info: unsafe { read_str(payload.0.cast::<c_char>().cast_const()) },
                ..CameraEvent::bare(kind)
            }
        } else {
            CameraEvent::bare(kind)
        };
        Ok(event)
    }
}

//! In-memory backend for testing without a camera or libgphoto2.
//!
//! Files and lists are tracked by id with explicit refcounts so tests can
//! observe every ref/unref the wrappers issue. Device calls are checked for
//! overlap to verify that the session serialises I/O.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ffi::c_int;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::status::{NativeResult, ResultCode};
use crate::traits::{Backend, CameraEvent, CameraFilePath, CaptureType, Capability, ConnectTarget, EventKind, FileType};
use crate::widget::{Widget, WidgetBody};

/// Smallest payload the mock's MIME sniffing recognises as JPEG.
pub const JPEG_BYTES: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0xFF, 0xD9,
];

/// Folder that holds the seeded images and receives new captures.
pub const DCIM_FOLDER: &str = "/store_00010001/DCIM/100CANON";

/// Model reported by [`Backend::autodetect`].
pub const MOCK_MODEL: &str = "Mock Camera";

/// Port reported by [`Backend::autodetect`].
pub const MOCK_PORT: &str = "usb:001,004";

/// Upper bound on how long an empty event queue blocks a wait call.
const IDLE_WAIT: Duration = Duration::from_millis(2);

/// Handle of a mock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockFileId(u64);

/// Handle of a mock list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockListId(u64);

/// Handle of a mock context.
#[derive(Debug)]
pub struct MockContext(pub u64);

/// Handle of a connected mock device.
#[derive(Debug)]
pub struct MockDevice {
    open: bool,
}

#[derive(Debug, Default)]
struct FileState {
    refs: usize,
    data: Vec<u8>,
    mime_type: String,
    name: String,
    mtime: i64,
}

#[derive(Debug, Default)]
struct ListState {
    refs: usize,
    entries: Vec<(Option<String>, Option<String>)>,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    files: HashMap<u64, FileState>,
    lists: HashMap<u64, ListState>,
    live_contexts: usize,
    folders: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    events: VecDeque<NativeResult<CameraEvent>>,
    config: Widget,
    config_writes: usize,
    captures: u32,
    opened: usize,
    closed: usize,
    fail_open: Option<ResultCode>,
    fail_preview: Option<ResultCode>,
    fail_ref: Option<ResultCode>,
}

impl State {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn file(&mut self, file: MockFileId) -> NativeResult<&mut FileState> {
        self.files.get_mut(&file.0).ok_or(ResultCode::BAD_PARAMETERS)
    }

    fn list(&mut self, list: MockListId) -> NativeResult<&mut ListState> {
        self.lists.get_mut(&list.0).ok_or(ResultCode::BAD_PARAMETERS)
    }

    fn folder(&mut self, folder: &str) -> NativeResult<&mut BTreeMap<String, Vec<u8>>> {
        self.folders.get_mut(folder).ok_or(ResultCode::DIRECTORY_NOT_FOUND)
    }
}

/// Backend that simulates a single camera in memory.
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<State>,
    name_by_type: bool,
    in_flight: AtomicUsize,
    overlap: AtomicBool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A camera with two images in [`DCIM_FOLDER`] and a small configuration tree.
    #[must_use]
    pub fn new() -> Self {
        let mut folders = BTreeMap::new();
        for folder in ["/", "/store_00010001", "/store_00010001/DCIM"] {
            folders.insert(folder.to_owned(), BTreeMap::new());
        }
        let images = ["IMG_0001.JPG", "IMG_0002.JPG"]
            .into_iter()
            .map(|name| (name.to_owned(), JPEG_BYTES.to_vec()))
            .collect();
        folders.insert(DCIM_FOLDER.to_owned(), images);

        Self {
            state: Mutex::new(State {
                next_id: 0,
                files: HashMap::new(),
                lists: HashMap::new(),
                live_contexts: 0,
                folders,
                events: VecDeque::new(),
                config: default_config(),
                config_writes: 0,
                captures: 2,
                opened: 0,
                closed: 0,
                fail_open: None,
                fail_preview: None,
                fail_ref: None,
            }),
            name_by_type: true,
            in_flight: AtomicUsize::new(0),
            overlap: AtomicBool::new(false),
        }
    }

    /// Behave like a libgphoto2 older than 2.5.
    #[must_use]
    pub fn without_name_by_type(mut self) -> Self {
        self.name_by_type = false;
        self
    }

    /// Make every subsequent open fail with `code`.
    #[must_use]
    pub fn with_open_failure(self, code: ResultCode) -> Self {
        self.state().fail_open = Some(code);
        self
    }

    /// Make every subsequent preview capture fail with `code`.
    pub fn fail_preview(&self, code: ResultCode) {
        self.state().fail_preview = Some(code);
    }

    /// Make every subsequent file or list ref fail with `code`.
    pub fn fail_refs(&self, code: ResultCode) {
        self.state().fail_ref = Some(code);
    }

    /// Queue an event for the next wait call.
    pub fn push_event(&self, event: CameraEvent) {
        self.state().events.push_back(Ok(event));
    }

    /// Queue a failing wait call.
    pub fn push_event_error(&self, code: ResultCode) {
        self.state().events.push_back(Err(code));
    }

    /// Events not yet consumed by a wait call.
    pub fn pending_events(&self) -> usize {
        self.state().events.len()
    }

    /// Refcount of a live file, `None` once freed.
    pub fn file_refcount(&self, file: MockFileId) -> Option<usize> {
        self.state().files.get(&file.0).map(|f| f.refs)
    }

    /// Refcount of a live list, `None` once freed.
    pub fn list_refcount(&self, list: MockListId) -> Option<usize> {
        self.state().lists.get(&list.0).map(|l| l.refs)
    }

    /// Number of files not yet freed.
    pub fn live_files(&self) -> usize {
        self.state().files.len()
    }

    /// Number of lists not yet freed.
    pub fn live_lists(&self) -> usize {
        self.state().lists.len()
    }

    /// Number of contexts not yet released.
    pub fn live_contexts(&self) -> usize {
        self.state().live_contexts
    }

    /// Number of successful opens.
    pub fn opened(&self) -> usize {
        self.state().opened
    }

    /// Number of closes.
    pub fn closed(&self) -> usize {
        self.state().closed
    }

    /// Number of successful configuration writes.
    pub fn config_writes(&self) -> usize {
        self.state().config_writes
    }

    /// Names of the files stored in `folder`, sorted.
    pub fn stored_files(&self, folder: &str) -> Vec<String> {
        self.state()
            .folders
            .get(folder)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Payload of a stored file.
    pub fn stored_data(&self, folder: &str, name: &str) -> Option<Vec<u8>> {
        self.state().folders.get(folder)?.get(name).cloned()
    }

    /// Whether `folder` exists on the simulated storage.
    pub fn has_folder(&self, folder: &str) -> bool {
        self.state().folders.contains_key(folder)
    }

    /// The device-side configuration tree.
    pub fn stored_config(&self) -> Widget {
        self.state().config.clone()
    }

    /// Change the device-side configuration behind the session's back.
    pub fn update_config<F: FnOnce(&mut Widget)>(&self, update: F) {
        update(&mut self.state().config);
    }

    /// Whether two device calls were ever in flight at the same time.
    pub fn overlap_detected(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter<'a>(&'a self, device: &MockDevice) -> NativeResult<Busy<'a>> {
        if !device.open {
            return Err(ResultCode::BAD_PARAMETERS);
        }
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlap.store(true, Ordering::SeqCst);
        }
        Ok(Busy(self))
    }

    fn fill_file(&self, file: MockFileId, name: &str, data: Vec<u8>) -> NativeResult<()> {
        let mut state = self.state();
        let target = state.file(file)?;
        target.mime_type = sniff_mime(&data).to_owned();
        target.name = name.to_owned();
        target.data = data;
        Ok(())
    }
}

/// Marks one device call as in flight.
struct Busy<'a>(&'a MockBackend);

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn default_config() -> Widget {
    Widget::new(
        "main",
        "Camera and Driver Configuration",
        WidgetBody::Window(vec![
            Widget::new(
                "settings",
                "Camera Settings",
                WidgetBody::Section(vec![
                    Widget::new("artist", "Artist", WidgetBody::Text(String::new())),
                    Widget::new("datetime", "Camera Date and Time", WidgetBody::Date(1_700_000_000)),
                    Widget::new(
                        "capturetarget",
                        "Capture Target",
                        WidgetBody::Menu {
                            value: "Internal RAM".to_owned(),
                            choices: vec!["Internal RAM".to_owned(), "Memory card".to_owned()],
                        },
                    ),
                ]),
            ),
            Widget::new(
                "imgsettings",
                "Image Settings",
                WidgetBody::Section(vec![
                    Widget::new(
                        "iso",
                        "ISO Speed",
                        WidgetBody::Radio {
                            value: "100".to_owned(),
                            choices: ["100", "200", "400", "800"].map(str::to_owned).to_vec(),
                        },
                    ),
                    Widget::new(
                        "exposurecompensation",
                        "Exposure Compensation",
                        WidgetBody::Range {
                            value: 0.0,
                            min: -5.0,
                            max: 5.0,
                            step: 0.5,
                        },
                    ),
                ]),
            ),
            Widget::new(
                "actions",
                "Camera Actions",
                WidgetBody::Section(vec![
                    Widget::new("autofocusdrive", "Drive Canon DSLR Autofocus", WidgetBody::Toggle(false)),
                    Widget::new("bulb", "Bulb Mode", WidgetBody::Button),
                ]),
            ),
            Widget::new(
                "status",
                "Camera Status Information",
                WidgetBody::Section(vec![Widget::new(
                    "serialnumber",
                    "Serial Number",
                    WidgetBody::Text("0123456789".to_owned()),
                )
                .with_read_only(true)]),
            ),
        ]),
    )
}

fn sniff_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        "image/tiff"
    } else {
        "application/octet-stream"
    }
}

fn extension_for(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/tiff" => Some("tif"),
        "audio/wav" => Some("wav"),
        _ => None,
    }
}

fn join(folder: &str, name: &str) -> String {
    if folder.ends_with('/') {
        format!("{folder}{name}")
    } else {
        format!("{folder}/{name}")
    }
}

fn parent(folder: &str) -> Option<&str> {
    match folder.rsplit_once('/') {
        Some(("", "")) | None => None,
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
    }
}

fn count(len: usize) -> c_int {
    c_int::try_from(len).unwrap_or(c_int::MAX)
}

fn slot<T>(entries: &mut [T], index: c_int) -> NativeResult<&mut T> {
    usize::try_from(index)
        .ok()
        .and_then(|index| entries.get_mut(index))
        .ok_or(ResultCode::BAD_PARAMETERS)
}

impl Backend for MockBackend {
    type Context = MockContext;
    type Device = MockDevice;
    type File = MockFileId;
    type List = MockListId;

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::NameByType => self.name_by_type,
        }
    }

    fn context_new(&self) -> NativeResult<MockContext> {
        let mut state = self.state();
        state.live_contexts += 1;
        Ok(MockContext(state.id()))
    }

    fn context_unref(&self, _context: &MockContext) {
        let mut state = self.state();
        state.live_contexts = state.live_contexts.saturating_sub(1);
    }

    fn file_new(&self) -> NativeResult<MockFileId> {
        let mut state = self.state();
        let id = state.id();
        state.files.insert(
            id,
            FileState {
                refs: 1,
                ..FileState::default()
            },
        );
        Ok(MockFileId(id))
    }

    fn file_ref(&self, file: MockFileId) -> NativeResult<()> {
        let mut state = self.state();
        if let Some(code) = state.fail_ref {
            return Err(code);
        }
        state.file(file)?.refs += 1;
        Ok(())
    }

    fn file_unref(&self, file: MockFileId) -> NativeResult<()> {
        let mut state = self.state();
        let entry = state.file(file)?;
        entry.refs -= 1;
        if entry.refs == 0 {
            state.files.remove(&file.0);
        }
        Ok(())
    }

    fn file_with_data<R, F: FnOnce(&[u8]) -> R>(&self, file: MockFileId, read: F) -> NativeResult<R> {
        let data = self.state().file(file)?.data.clone();
        Ok(read(&data))
    }

    fn file_set_data(&self, file: MockFileId, data: &[u8]) -> NativeResult<()> {
        self.state().file(file)?.data = data.to_vec();
        Ok(())
    }

    fn file_mime_type(&self, file: MockFileId) -> NativeResult<String> {
        Ok(self.state().file(file)?.mime_type.clone())
    }

    fn file_set_mime_type(&self, file: MockFileId, mime_type: &str) -> NativeResult<()> {
        self.state().file(file)?.mime_type = mime_type.to_owned();
        Ok(())
    }

    fn file_name(&self, file: MockFileId) -> NativeResult<String> {
        Ok(self.state().file(file)?.name.clone())
    }

    fn file_set_name(&self, file: MockFileId, name: &str) -> NativeResult<()> {
        self.state().file(file)?.name = name.to_owned();
        Ok(())
    }

    fn file_detect_mime_type(&self, file: MockFileId) -> NativeResult<()> {
        let mut state = self.state();
        let entry = state.file(file)?;
        entry.mime_type = sniff_mime(&entry.data).to_owned();
        Ok(())
    }

    fn file_adjust_name_for_mime_type(&self, file: MockFileId) -> NativeResult<()> {
        let mut state = self.state();
        let entry = state.file(file)?;
        if let Some(extension) = extension_for(&entry.mime_type) {
            let stem = entry.name.rsplit_once('.').map_or(entry.name.as_str(), |(stem, _)| stem);
            entry.name = format!("{stem}.{extension}");
        }
        Ok(())
    }

    fn file_name_by_type(&self, file: MockFileId, base_name: &str, file_type: FileType) -> NativeResult<String> {
        if !self.name_by_type {
            return Err(ResultCode::NOT_SUPPORTED);
        }
        self.state().file(file)?;
        let prefix = match file_type {
            FileType::Normal => "",
            FileType::Preview => "thumb_",
            FileType::Raw => "raw_",
            FileType::Audio => "audio_",
            FileType::Exif => "exif_",
            FileType::Metadata => "meta_",
        };
        Ok(format!("{prefix}{base_name}"))
    }

    fn file_save(&self, file: MockFileId, path: &Path) -> NativeResult<()> {
        let data = self.state().file(file)?.data.clone();
        fs::write(path, data).map_err(|_| ResultCode::OS_FAILURE)
    }

    fn file_mtime(&self, file: MockFileId) -> NativeResult<i64> {
        Ok(self.state().file(file)?.mtime)
    }

    fn file_set_mtime(&self, file: MockFileId, mtime: i64) -> NativeResult<()> {
        self.state().file(file)?.mtime = mtime;
        Ok(())
    }

    fn list_new(&self) -> NativeResult<MockListId> {
        let mut state = self.state();
        let id = state.id();
        state.lists.insert(
            id,
            ListState {
                refs: 1,
                entries: Vec::new(),
            },
        );
        Ok(MockListId(id))
    }

    fn list_ref(&self, list: MockListId) -> NativeResult<()> {
        let mut state = self.state();
        if let Some(code) = state.fail_ref {
            return Err(code);
        }
        state.list(list)?.refs += 1;
        Ok(())
    }

    fn list_unref(&self, list: MockListId) -> NativeResult<()> {
        let mut state = self.state();
        let entry = state.list(list)?;
        entry.refs -= 1;
        if entry.refs == 0 {
            state.lists.remove(&list.0);
        }
        Ok(())
    }

    fn list_count(&self, list: MockListId) -> NativeResult<c_int> {
        Ok(count(self.state().list(list)?.entries.len()))
    }

    fn list_name(&self, list: MockListId, index: c_int) -> NativeResult<String> {
        let mut state = self.state();
        let (name, _) = slot(&mut state.list(list)?.entries, index)?;
        Ok(name.clone().unwrap_or_default())
    }

    fn list_value(&self, list: MockListId, index: c_int) -> NativeResult<String> {
        let mut state = self.state();
        let (_, value) = slot(&mut state.list(list)?.entries, index)?;
        Ok(value.clone().unwrap_or_default())
    }

    fn list_set_name(&self, list: MockListId, index: c_int, name: &str) -> NativeResult<()> {
        let mut state = self.state();
        slot(&mut state.list(list)?.entries, index)?.0 = Some(name.to_owned());
        Ok(())
    }

    fn list_set_value(&self, list: MockListId, index: c_int, value: &str) -> NativeResult<()> {
        let mut state = self.state();
        slot(&mut state.list(list)?.entries, index)?.1 = Some(value.to_owned());
        Ok(())
    }

    fn list_append(&self, list: MockListId, name: &str, value: &str) -> NativeResult<()> {
        let entry = (Some(name.to_owned()), Some(value.to_owned()));
        self.state().list(list)?.entries.push(entry);
        Ok(())
    }

    fn list_reset(&self, list: MockListId) -> NativeResult<()> {
        self.state().list(list)?.entries.clear();
        Ok(())
    }

    fn list_sort(&self, list: MockListId) -> NativeResult<()> {
        self.state().list(list)?.entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(())
    }

    fn list_find_by_name(&self, list: MockListId, name: &str) -> NativeResult<c_int> {
        let mut state = self.state();
        state
            .list(list)?
            .entries
            .iter()
            .position(|(entry, _)| entry.as_deref() == Some(name))
            .map(count)
            .ok_or(ResultCode::ERROR)
    }

    fn autodetect(&self, _context: &MockContext, list: MockListId) -> NativeResult<c_int> {
        self.list_append(list, MOCK_MODEL, MOCK_PORT)?;
        Ok(1)
    }

    fn device_open(&self, _context: &MockContext, target: ConnectTarget<'_>) -> NativeResult<MockDevice> {
        let mut state = self.state();
        if let Some(code) = state.fail_open {
            return Err(code);
        }
        if let ConnectTarget::Explicit { model, port } = target {
            if model != MOCK_MODEL {
                return Err(ResultCode::MODEL_NOT_FOUND);
            }
            if port != MOCK_PORT {
                return Err(ResultCode::UNKNOWN_PORT);
            }
        }
        state.opened += 1;
        Ok(MockDevice { open: true })
    }

    fn device_close(&self, device: &mut MockDevice, _context: &MockContext) -> NativeResult<()> {
        if !device.open {
            return Err(ResultCode::BAD_PARAMETERS);
        }
        device.open = false;
        self.state().closed += 1;
        Ok(())
    }

    fn device_summary(&self, device: &mut MockDevice, _context: &MockContext) -> NativeResult<String> {
        let _busy = self.enter(device)?;
        Ok(format!("Manufacturer: Mock\nModel: {MOCK_MODEL}\n  Version: 1.0\n"))
    }

    fn device_capture_preview(&self, device: &mut MockDevice, _context: &MockContext, file: MockFileId) -> NativeResult<()> {
        let _busy = self.enter(device)?;
        if let Some(code) = self.state().fail_preview {
            return Err(code);
        }
        self.fill_file(file, "capture_preview.jpg", JPEG_BYTES.to_vec())
    }

    fn device_capture(&self, device: &mut MockDevice, _context: &MockContext, capture_type: CaptureType) -> NativeResult<CameraFilePath> {
        let _busy = self.enter(device)?;
        let mut state = self.state();
        state.captures += 1;
        let extension = match capture_type {
            CaptureType::Image => "JPG",
            CaptureType::Movie => "MOV",
            CaptureType::Sound => "WAV",
        };
        let name = format!("IMG_{:04}.{extension}", state.captures);
        state.folder(DCIM_FOLDER)?.insert(name.clone(), JPEG_BYTES.to_vec());
        Ok(CameraFilePath::new(DCIM_FOLDER, name))
    }

    fn device_trigger_capture(&self, device: &mut MockDevice, _context: &MockContext) -> NativeResult<()> {
        let _busy = self.enter(device)?;
        let mut state = self.state();
        state.captures += 1;
        let name = format!("IMG_{:04}.JPG", state.captures);
        state.folder(DCIM_FOLDER)?.insert(name.clone(), JPEG_BYTES.to_vec());
        state
            .events
            .push_back(Ok(CameraEvent::with_path(EventKind::FileAdded, CameraFilePath::new(DCIM_FOLDER, name))));
        state.events.push_back(Ok(CameraEvent::bare(EventKind::CaptureComplete)));
        Ok(())
    }

    fn device_config(&self, device: &mut MockDevice, _context: &MockContext) -> NativeResult<Widget> {
        let _busy = self.enter(device)?;
        Ok(self.state().config.clone())
    }

    fn device_set_config(&self, device: &mut MockDevice, _context: &MockContext, root: &Widget) -> NativeResult<()> {
        let _busy = self.enter(device)?;
        let mut state = self.state();
        for node in root.iter() {
            let Some(value) = node.value() else { continue };
            let Some(stored) = state.config.find_mut(node.name()) else {
                return Err(ResultCode::BAD_PARAMETERS);
            };
            if stored.value().as_ref() != Some(&value) {
                stored.set_value(value).map_err(|_| ResultCode::BAD_PARAMETERS)?;
            }
        }
        state.config_writes += 1;
        Ok(())
    }

    fn device_list_files(&self, device: &mut MockDevice, _context: &MockContext, folder: &str, list: MockListId) -> NativeResult<()> {
        let _busy = self.enter(device)?;
        let names: Vec<String> = self.state().folder(folder)?.keys().cloned().collect();
        for name in names {
            self.list_append(list, &name, "")?;
        }
        Ok(())
    }

    fn device_list_folders(&self, device: &mut MockDevice, _context: &MockContext, folder: &str, list: MockListId) -> NativeResult<()> {
        let _busy = self.enter(device)?;
        let names: Vec<String> = {
            let state = self.state();
            if !state.folders.contains_key(folder) {
                return Err(ResultCode::DIRECTORY_NOT_FOUND);
            }
            state
                .folders
                .keys()
                .filter(|path| parent(path) == Some(folder))
                .filter_map(|path| path.rsplit_once('/').map(|(_, name)| name.to_owned()))
                .collect()
        };
        for name in names {
            self.list_append(list, &name, "")?;
        }
        Ok(())
    }

    fn device_delete_all(&self, device: &mut MockDevice, _context: &MockContext, folder: &str) -> NativeResult<()> {
        let _busy = self.enter(device)?;
        self.state().folder(folder)?.clear();
        Ok(())
    }

    fn device_put_file(
        &self,
        device: &mut MockDevice,
        _context: &MockContext,
        folder: &str,
        name: &str,
        _file_type: FileType,
        file: MockFileId,
    ) -> NativeResult<()> {
        let _busy = self.enter(device)?;
        let mut state = self.state();
        let data = state.file(file)?.data.clone();
        let files = state.folder(folder)?;
        if files.contains_key(name) {
            return Err(ResultCode::FILE_EXISTS);
        }
        files.insert(name.to_owned(), data);
        Ok(())
    }

    fn device_make_dir(&self, device: &mut MockDevice, _context: &MockContext, folder: &str, name: &str) -> NativeResult<()> {
        let _busy = self.enter(device)?;
        let mut state = self.state();
        state.folder(folder)?;
        let path = join(folder, name);
        if state.folders.contains_key(&path) {
            return Err(ResultCode::DIRECTORY_EXISTS);
        }
        state.folders.insert(path, BTreeMap::new());
        Ok(())
    }

    fn device_remove_dir(&self, device: &mut MockDevice, _context: &MockContext, folder: &str, name: &str) -> NativeResult<()> {
        let _busy = self.enter(device)?;
        let mut state = self.state();
        let path = join(folder, name);
        let files = state.folder(&path)?;
        let has_children = !files.is_empty() || state.folders.keys().any(|other| parent(other) == Some(path.as_str()));
        if has_children {
            return Err(ResultCode::ERROR);
        }
        state.folders.remove(&path);
        Ok(())
    }

    fn device_get_file(
        &self,
        device: &mut MockDevice,
        _context: &MockContext,
        folder: &str,
        name: &str,
        file_type: FileType,
        file: MockFileId,
    ) -> NativeResult<()> {
        let _busy = self.enter(device)?;
        let data = self
            .state()
            .folder(folder)?
            .get(name)
            .cloned()
            .ok_or(ResultCode::FILE_NOT_FOUND)?;
        match file_type {
            FileType::Normal | FileType::Preview => self.fill_file(file, name, data),
            _ => Err(ResultCode::NOT_SUPPORTED),
        }
    }

    fn device_delete_file(&self, device: &mut MockDevice, _context: &MockContext, folder: &str, name: &str) -> NativeResult<()> {
        let _busy = self.enter(device)?;
        self.state()
            .folder(folder)?
            .remove(name)
            .map(drop)
            .ok_or(ResultCode::FILE_NOT_FOUND)
    }

    fn device_wait_for_event(&self, device: &mut MockDevice, _context: &MockContext, timeout: Duration) -> NativeResult<CameraEvent> {
        let _busy = self.enter(device)?;
        let next = self.state().events.pop_front();
        if let Some(event) = next {
            return event;
        }
        thread::sleep(timeout.min(IDLE_WAIT));
        Ok(CameraEvent::bare(EventKind::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_of_folders() {
        assert_eq!(parent("/store_00010001"), Some("/"));
        assert_eq!(parent("/store_00010001/DCIM"), Some("/store_00010001"));
        assert_eq!(parent("/"), None);
    }

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(JPEG_BYTES), "image/jpeg");
        assert_eq!(sniff_mime(b"II*\0rest"), "image/tiff");
        assert_eq!(sniff_mime(b"plain"), "application/octet-stream");
    }

    #[test]
    fn test_unref_frees_at_zero() {
        let backend = MockBackend::new();
        let file = backend.file_new().expect("file");
        backend.file_ref(file).expect("ref");
        backend.file_unref(file).expect("unref");
        assert_eq!(backend.file_refcount(file), Some(1));
        backend.file_unref(file).expect("unref");
        assert_eq!(backend.file_refcount(file), None);
        assert_eq!(backend.file_unref(file), Err(ResultCode::BAD_PARAMETERS));
    }
}

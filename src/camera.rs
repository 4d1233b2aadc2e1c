//! Camera session: one exclusive device connection plus its event listener.
//!
//! Every native call made by a session, whether from a foreground method or
//! from the background listener, goes through a single [`Mutex`] around the
//! device handle. The listener thread blocks in the backend's wait-for-event
//! call for at most the configured timeout, then republishes what it got to
//! the subscribers registered with [`Camera::subscribe_to_camera_event`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::{CameraError, Result};
use crate::file::CameraFile;
use crate::list::CameraList;
use crate::observer::{Subject, Subscription};
use crate::status::Translate;
use crate::traits::{Backend, CameraEvent, CameraFilePath, CaptureType, EventKind, FileType};
use crate::validation::{validate_entry, validate_folder};
use crate::widget::WindowWidget;

/// Name given to the background listener thread.
pub const LISTENER_THREAD_NAME: &str = "gphoto2-events";

/// A libgphoto2 context, shared by a session and any autodetection helpers.
///
/// The native context is released when the last holder drops it.
pub struct Context<B: Backend> {
    backend: Arc<B>,
    raw: B::Context,
}

impl<B: Backend> Context<B> {
    /// Create a context.
    pub fn new(backend: Arc<B>) -> Result<Arc<Self>> {
        let raw = backend.context_new().or_fail("gp_context_new")?;
        Ok(Arc::new(Self { backend, raw }))
    }

    /// The backend this context belongs to.
    pub const fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The native context.
    pub const fn raw(&self) -> &B::Context {
        &self.raw
    }
}

impl<B: Backend> Drop for Context<B> {
    fn drop(&mut self) {
        self.backend.context_unref(&self.raw);
    }
}

impl<B: Backend> fmt::Debug for Context<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}

/// List every connected camera as model → port pairs.
pub fn autodetect<B: Backend>(context: &Context<B>) -> Result<CameraList<B>> {
    const OP: &str = "gp_camera_autodetect";
    let list = CameraList::new(Arc::clone(context.backend()))?;
    let found = context
        .backend()
        .autodetect(context.raw(), list.handle(OP)?)
        .or_fail(OP)?;
    tracing::debug!(found, "autodetected cameras");
    Ok(list)
}

/// Lifecycle of the background listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No listener thread is inside its loop.
    Idle,
    /// The listener is waiting for or dispatching events.
    Listening,
    /// A stop was requested; the thread leaves after its current iteration.
    Stopping,
}

/// The listener thread and its phase. `handle` may outlive the loop: a thread
/// in `Idle` has already left it and only needs joining.
struct ListenerSlot {
    phase: Phase,
    handle: Option<JoinHandle<()>>,
}

impl ListenerSlot {
    fn is_current_thread(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }
}

/// State shared between a [`Camera`] and its listener thread.
struct Shared<B: Backend> {
    backend: Arc<B>,
    context: Arc<Context<B>>,
    device: Mutex<B::Device>,
    events: Subject<EventKind, CameraEvent>,
    listener: Mutex<ListenerSlot>,
    listener_changed: Condvar,
    event_timeout: Duration,
    error_backoff: Duration,
}

impl<B: Backend> Shared<B> {
    fn lock_device(&self) -> MutexGuard<'_, B::Device> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listener(&self) -> MutexGuard<'_, ListenerSlot> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_listener<'a>(&self, slot: MutexGuard<'a, ListenerSlot>) -> MutexGuard<'a, ListenerSlot> {
        self.listener_changed
            .wait(slot)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by the listener before each wait. Leaving the loop and entering
    /// `Idle` happen under one lock, so a concurrent restart never races it.
    fn keep_listening(&self) -> bool {
        let mut slot = self.lock_listener();
        if slot.phase == Phase::Listening {
            return true;
        }
        slot.phase = Phase::Idle;
        self.listener_changed.notify_all();
        false
    }

    fn listen(&self) {
        let _exit = ListenerExit(self);
        tracing::debug!(timeout = ?self.event_timeout, "event listener started");
        while self.keep_listening() {
            let waited = {
                let mut device = self.lock_device();
                self.backend
                    .device_wait_for_event(&mut device, self.context.raw(), self.event_timeout)
            };
            match waited {
                Ok(event) => self.dispatch(&event),
                Err(code) => {
                    if self.lock_listener().phase != Phase::Listening {
                        continue;
                    }
                    tracing::warn!(code = code.0, "waiting for camera event failed: {code}");
                    thread::sleep(self.error_backoff);
                }
            }
        }
        tracing::debug!("event listener exited");
    }

    fn dispatch(&self, event: &CameraEvent) {
        let published = panic::catch_unwind(AssertUnwindSafe(|| self.events.publish(event.kind, event)));
        match published {
            Ok(0) => {}
            Ok(delivered) => tracing::debug!(kind = ?event.kind, delivered, "published camera event"),
            Err(payload) => tracing::warn!(
                kind = ?event.kind,
                "camera event subscriber panicked: {}",
                panic_message(payload.as_ref())
            ),
        }
    }
}

impl<B: Backend> Drop for Shared<B> {
    fn drop(&mut self) {
        let device = self.device.get_mut().unwrap_or_else(PoisonError::into_inner);
        self.backend
            .device_close(device, self.context.raw())
            .or_log("gp_camera_exit");
        tracing::info!("camera session closed");
    }
}

/// Marks the listener idle if its thread unwinds out of the loop.
struct ListenerExit<'a, B: Backend>(&'a Shared<B>);

impl<B: Backend> Drop for ListenerExit<'_, B> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.lock_listener().phase = Phase::Idle;
            self.0.listener_changed.notify_all();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// An open connection to one camera.
///
/// Not `Clone`: two owners of one connection could issue conflicting
/// commands. Dropping the session stops the listener and closes the device.
pub struct Camera<B: Backend> {
    shared: Arc<Shared<B>>,
    model: Option<String>,
    port: Option<String>,
}

impl<B: Backend> Camera<B> {
    /// Connect to the first camera the library detects.
    pub fn new(backend: Arc<B>) -> Result<Self> {
        Self::from_config(backend, &SessionConfig::default())
    }

    /// Connect to `model` on `port`, as reported by [`autodetect`].
    pub fn with_model_and_port(backend: Arc<B>, model: &str, port: &str) -> Result<Self> {
        Self::from_config(backend, &SessionConfig::default().with_target(model, port))
    }

    /// Connect as described by `config`, with a fresh context.
    pub fn from_config(backend: Arc<B>, config: &SessionConfig) -> Result<Self> {
        let context = Context::new(backend)?;
        Self::with_context(context, config)
    }

    /// Connect as described by `config`, sharing an existing context.
    pub fn with_context(context: Arc<Context<B>>, config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let backend = Arc::clone(context.backend());
        let target = config.target();
        let device = backend
            .device_open(context.raw(), target)
            .map_err(|code| CameraError::connection(target.to_string(), code))?;
        tracing::info!(%target, "connected to camera");

        Ok(Self {
            shared: Arc::new(Shared {
                backend,
                context,
                device: Mutex::new(device),
                events: Subject::new(),
                listener: Mutex::new(ListenerSlot {
                    phase: Phase::Idle,
                    handle: None,
                }),
                listener_changed: Condvar::new(),
                event_timeout: config.event_timeout,
                error_backoff: config.error_backoff,
            }),
            model: config.model.clone(),
            port: config.port.clone(),
        })
    }

    /// The shared context, for use with [`autodetect`].
    pub fn context(&self) -> &Arc<Context<B>> {
        &self.shared.context
    }

    /// Model this session was opened for, if it was opened explicitly.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Port this session was opened on, if it was opened explicitly.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    fn backend(&self) -> &Arc<B> {
        &self.shared.backend
    }

    /// Text describing the camera.
    pub fn summary(&self) -> Result<String> {
        let mut device = self.shared.lock_device();
        self.backend()
            .device_summary(&mut device, self.shared.context.raw())
            .or_fail("gp_camera_get_summary")
    }

    /// Capture a preview frame into memory. Nothing is stored on the camera.
    pub fn capture_preview(&self) -> Result<CameraFile<B>> {
        const OP: &str = "gp_camera_capture_preview";
        let file = CameraFile::new(Arc::clone(self.backend()))?;
        let raw = file.handle(OP)?;
        let mut device = self.shared.lock_device();
        self.backend()
            .device_capture_preview(&mut device, self.shared.context.raw(), raw)
            .or_fail(OP)?;
        tracing::debug!("captured preview");
        Ok(file)
    }

    /// Capture to camera storage and return where the result was stored.
    pub fn capture(&self, capture_type: CaptureType) -> Result<CameraFilePath> {
        let mut device = self.shared.lock_device();
        let path = self
            .backend()
            .device_capture(&mut device, self.shared.context.raw(), capture_type)
            .or_fail("gp_camera_capture")?;
        tracing::debug!(?capture_type, %path, "captured");
        Ok(path)
    }

    /// Release the shutter and return without waiting for the image.
    ///
    /// The result shows up later as a [`EventKind::FileAdded`] event or in a
    /// folder listing.
    pub fn trigger_capture(&self) -> Result<()> {
        let mut device = self.shared.lock_device();
        self.backend()
            .device_trigger_capture(&mut device, self.shared.context.raw())
            .or_fail("gp_camera_trigger_capture")
    }

    /// Read the whole configuration tree.
    pub fn config(&self) -> Result<WindowWidget> {
        let root = {
            let mut device = self.shared.lock_device();
            self.backend()
                .device_config(&mut device, self.shared.context.raw())
                .or_fail("gp_camera_get_config")?
        };
        WindowWidget::from_root(root)
    }

    /// Write every value in `config` to the camera.
    ///
    /// Values changed on the device after `config` was read are overwritten
    /// with the values in `config`.
    pub fn set_config(&self, config: &WindowWidget) -> Result<()> {
        let mut device = self.shared.lock_device();
        self.backend()
            .device_set_config(&mut device, self.shared.context.raw(), config)
            .or_fail("gp_camera_set_config")
    }

    /// Files in a device folder.
    pub fn folder_list_files(&self, folder: &str) -> Result<CameraList<B>> {
        const OP: &str = "gp_camera_folder_list_files";
        validate_folder(folder, OP)?;
        let list = CameraList::new(Arc::clone(self.backend()))?;
        let mut device = self.shared.lock_device();
        self.backend()
            .device_list_files(&mut device, self.shared.context.raw(), folder, list.handle(OP)?)
            .or_fail(OP)?;
        Ok(list)
    }

    /// Sub-folders of a device folder.
    pub fn folder_list_folders(&self, folder: &str) -> Result<CameraList<B>> {
        const OP: &str = "gp_camera_folder_list_folders";
        validate_folder(folder, OP)?;
        let list = CameraList::new(Arc::clone(self.backend()))?;
        let mut device = self.shared.lock_device();
        self.backend()
            .device_list_folders(&mut device, self.shared.context.raw(), folder, list.handle(OP)?)
            .or_fail(OP)?;
        Ok(list)
    }

    /// Delete every file in a device folder.
    pub fn folder_delete_all(&self, folder: &str) -> Result<()> {
        const OP: &str = "gp_camera_folder_delete_all";
        validate_folder(folder, OP)?;
        let mut device = self.shared.lock_device();
        self.backend()
            .device_delete_all(&mut device, self.shared.context.raw(), folder)
            .or_fail(OP)
    }

    /// Upload `file` as `folder/name`. The file is consumed.
    pub fn folder_put_file(&self, folder: &str, name: &str, file_type: FileType, file: CameraFile<B>) -> Result<()> {
        const OP: &str = "gp_camera_folder_put_file";
        validate_entry(folder, name, OP)?;
        let raw = file.handle(OP)?;
        let mut device = self.shared.lock_device();
        self.backend()
            .device_put_file(&mut device, self.shared.context.raw(), folder, name, file_type, raw)
            .or_fail(OP)?;
        tracing::debug!(folder, name, "uploaded file");
        Ok(())
    }

    /// Create `folder/name`.
    pub fn folder_make_dir(&self, folder: &str, name: &str) -> Result<()> {
        const OP: &str = "gp_camera_folder_make_dir";
        validate_entry(folder, name, OP)?;
        let mut device = self.shared.lock_device();
        self.backend()
            .device_make_dir(&mut device, self.shared.context.raw(), folder, name)
            .or_fail(OP)
    }

    /// Remove the empty folder `folder/name`.
    pub fn folder_remove_dir(&self, folder: &str, name: &str) -> Result<()> {
        const OP: &str = "gp_camera_folder_remove_dir";
        validate_entry(folder, name, OP)?;
        let mut device = self.shared.lock_device();
        self.backend()
            .device_remove_dir(&mut device, self.shared.context.raw(), folder, name)
            .or_fail(OP)
    }

    /// Download `folder/name`.
    pub fn file_get(&self, folder: &str, name: &str, file_type: FileType) -> Result<CameraFile<B>> {
        const OP: &str = "gp_camera_file_get";
        validate_entry(folder, name, OP)?;
        let file = CameraFile::new(Arc::clone(self.backend()))?;
        let raw = file.handle(OP)?;
        let mut device = self.shared.lock_device();
        self.backend()
            .device_get_file(&mut device, self.shared.context.raw(), folder, name, file_type, raw)
            .or_fail(OP)?;
        tracing::debug!(folder, name, ?file_type, "downloaded file");
        Ok(file)
    }

    /// Delete `folder/name`.
    pub fn file_delete(&self, folder: &str, name: &str) -> Result<()> {
        const OP: &str = "gp_camera_file_delete";
        validate_entry(folder, name, OP)?;
        let mut device = self.shared.lock_device();
        self.backend()
            .device_delete_file(&mut device, self.shared.context.raw(), folder, name)
            .or_fail(OP)
    }

    /// Call `callback` for every event of `kind` until the token is dropped.
    ///
    /// Callbacks run on the listener thread after the I/O lock is released,
    /// so they may call back into the session. Register before
    /// [`Camera::start_listening_for_events`] to see the first event.
    pub fn subscribe_to_camera_event<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&CameraEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(kind, callback)
    }

    /// Start the background listener.
    ///
    /// Returns `Ok(false)` without doing anything if it is already running.
    /// If a stop is still in progress, waits for the old thread to leave
    /// first. Called from a subscriber after that subscriber stopped the
    /// listener, it cancels the stop and keeps the current thread.
    ///
    /// # Errors
    ///
    /// [`CameraError::Io`] if the thread could not be spawned.
    pub fn start_listening_for_events(&self) -> Result<bool> {
        let mut slot = self.shared.lock_listener();
        loop {
            let phase = slot.phase;
            match phase {
                Phase::Listening => return Ok(false),
                Phase::Stopping if slot.is_current_thread() => {
                    slot.phase = Phase::Listening;
                    tracing::debug!("stop cancelled from the event listener itself");
                    return Ok(true);
                }
                Phase::Stopping => slot = self.shared.wait_listener(slot),
                Phase::Idle => break,
            }
        }
        // The previous thread has left its loop and takes no more locks.
        if let Some(previous) = slot.handle.take() {
            if previous.join().is_err() {
                tracing::warn!("event listener thread panicked");
            }
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(LISTENER_THREAD_NAME.to_owned())
            .spawn(move || shared.listen());
        match spawned {
            Ok(handle) => {
                slot.handle = Some(handle);
                slot.phase = Phase::Listening;
                tracing::debug!("started listening for camera events");
                Ok(true)
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn event listener");
                Err(err.into())
            }
        }
    }

    /// Stop the background listener and wait for it to exit.
    ///
    /// The listener notices the request once its current wait call returns.
    /// Returns immediately if it is not running. Called from a subscriber
    /// callback, it only requests the stop, since a thread cannot join itself;
    /// the listener counts as running until that callback returns.
    pub fn stop_listening_for_events(&self) {
        let mut slot = self.shared.lock_listener();
        loop {
            let phase = slot.phase;
            match phase {
                Phase::Idle => break,
                Phase::Listening | Phase::Stopping if slot.is_current_thread() => {
                    slot.phase = Phase::Stopping;
                    tracing::debug!("stop requested from the event listener itself");
                    return;
                }
                Phase::Listening => slot.phase = Phase::Stopping,
                Phase::Stopping => slot = self.shared.wait_listener(slot),
            }
        }
        let handle = slot.handle.take();
        drop(slot);
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("event listener thread panicked");
            }
            tracing::debug!("stopped listening for camera events");
        }
    }

    /// Whether a listener thread is running or still finishing after a stop.
    pub fn is_listening(&self) -> bool {
        self.shared.lock_listener().phase != Phase::Idle
    }
}

impl<B: Backend> Drop for Camera<B> {
    fn drop(&mut self) {
        self.stop_listening_for_events();
    }
}

impl<B: Backend> fmt::Debug for Camera<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("model", &self.model)
            .field("port", &self.port)
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

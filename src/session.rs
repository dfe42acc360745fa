//! Capture session controller and capture pipeline.
//!
//! A [`SessionController`] owns one device handle at a time. Every open
//! session runs a dedicated background worker thread that processes commands
//! strictly in issue order: device callbacks, preview rebuilds, and still
//! captures never run concurrently with each other. Callers issue commands
//! through async methods and never block on hardware I/O; results come back
//! through oneshot replies and the session event channel.
//!
//! Transition legality is checked in exactly one place, the worker's command
//! loop, against a state value that carries exactly the resources valid for
//! that state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot};

use crate::audit::{AuditSink, AuditTrail};
use crate::collab::{CapabilityProvider, CaptureStore, LocationProvider, SessionConfig};
use crate::dial::{DialBank, DialKind};
use crate::error::{CameraError, Result};
use crate::hardware::{BackendOpener, CameraBackend, CaptureRequest, FlashMode, SurfaceId};
use crate::modes::CaptureMode;

/// Coarse session lifecycle phase, readable without a round-trip to the
/// worker. Mirrors the worker's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No device is held.
    Closed,
    /// Capability check and device open are in progress.
    Opening,
    /// Device open, streams configured, no preview target registered.
    Configuring,
    /// Repeating preview request is running.
    Previewing,
    /// A still capture is outstanding.
    Capturing,
    /// The session failed; close and reopen to recover.
    Error,
}

impl SessionPhase {
    /// Human-readable phase name, used in `InvalidState` errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::Opening => "Opening",
            Self::Configuring => "Configuring",
            Self::Previewing => "Previewing",
            Self::Capturing => "Capturing",
            Self::Error => "Error",
        }
    }
}

/// Asynchronous notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The repeating preview request is running against this surface.
    PreviewReady {
        /// The registered preview surface.
        surface: SurfaceId,
    },
    /// A still capture was persisted.
    CaptureSaved {
        /// Locator returned by the persistence collaborator.
        locator: String,
    },
    /// A failure was surfaced outside a direct command reply.
    Error {
        /// Machine-readable error kind tag.
        kind: &'static str,
        /// Human-readable description.
        message: String,
    },
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    StartPreview { surface: SurfaceId, reply: Reply<()> },
    SwitchMode { mode: CaptureMode, reply: Reply<()> },
    SetDial { kind: DialKind, angle: f64, reply: Reply<()> },
    SetFlash { flash: FlashMode, reply: Reply<()> },
    SetFocusDistance { distance: f64, reply: Reply<()> },
    Capture { reply: Reply<String> },
    Motion { sensor: [f64; 3], offset: [f64; 2] },
    Close { done: oneshot::Sender<()> },
}

struct WorkerLink {
    tx: mpsc::Sender<Command>,
    join: JoinHandle<()>,
}

/// Owner of the device handle and single entry point for capture commands.
pub struct SessionController {
    opener: Arc<dyn BackendOpener>,
    capability: Arc<dyn CapabilityProvider>,
    store: Arc<dyn CaptureStore>,
    location: Arc<dyn LocationProvider>,
    audit_sink: Arc<dyn AuditSink>,
    config: SessionConfig,
    worker: Mutex<Option<WorkerLink>>,
    phase: Arc<Mutex<SessionPhase>>,
    capture_in_flight: Arc<AtomicBool>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
}

impl SessionController {
    /// Create a controller in the `Closed` phase.
    ///
    /// All collaborators are injected here; the controller never reaches for
    /// process-wide state.
    #[must_use]
    pub fn new(
        opener: Arc<dyn BackendOpener>,
        capability: Arc<dyn CapabilityProvider>,
        store: Arc<dyn CaptureStore>,
        location: Arc<dyn LocationProvider>,
        audit_sink: Arc<dyn AuditSink>,
        config: SessionConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity());
        Self {
            opener,
            capability,
            store,
            location,
            audit_sink,
            config,
            worker: Mutex::new(None),
            phase: Arc::new(Mutex::new(SessionPhase::Closed)),
            capture_in_flight: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Take the session event receiver. Yields `Some` exactly once.
    #[must_use]
    pub fn take_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        lock(&self.events_rx).take()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *lock(&self.phase)
    }

    /// Open the device and configure its streams.
    ///
    /// On success the session is in the `Configuring` phase, waiting for a
    /// preview target. Fails fast with `PermissionDenied` when the capture
    /// capability is missing and with `DeviceAccess` on driver-level open
    /// errors; both leave the session `Closed`. A stream configuration
    /// failure leaves the session in the `Error` phase instead and requires
    /// an explicit `close()` before the next attempt.
    pub async fn open(&self, device_id: &str) -> Result<()> {
        let (open_tx, open_rx) = oneshot::channel();
        {
            let mut slot = lock(&self.worker);
            if slot.is_some() {
                return Err(CameraError::InvalidState {
                    command: "open",
                    state: self.phase().name(),
                });
            }

            let (tx, rx) = mpsc::channel(self.config.command_capacity());
            let worker = Worker {
                state: WorkerState::Closed,
                mode: CaptureMode::Photo,
                dials: DialBank::new(),
                flash: FlashMode::Off,
                focus_distance: 0.0,
                trail: AuditTrail::new(self.audit_sink.clone(), &self.config),
                store: self.store.clone(),
                location: self.location.clone(),
                events: self.events_tx.clone(),
                phase: self.phase.clone(),
                jpeg_orientation: self.config.jpeg_orientation(),
            };
            let opener = self.opener.clone();
            let capability = self.capability.clone();
            let device_id = device_id.to_owned();
            let join = thread::spawn(move || {
                worker.run(&*opener, &*capability, &device_id, rx, open_tx);
            });
            *slot = Some(WorkerLink { tx, join });
        }

        match open_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                // Permission and device-open failures return the session to
                // Closed; the worker has already exited. Configuration
                // failures park the worker in the Error state instead.
                if !matches!(err, CameraError::ConfigurationFailed(_)) {
                    self.reap_worker();
                }
                Err(err)
            }
            Err(_) => {
                self.reap_worker();
                Err(CameraError::DeviceAccess("session worker terminated".to_owned()))
            }
        }
    }

    /// Register the preview surface and start the repeating request.
    ///
    /// Also replaces the surface atomically when called again while
    /// previewing; the in-flight repeating request is swapped without a
    /// teardown visible to the caller.
    pub async fn start_preview(&self, surface: SurfaceId) -> Result<()> {
        self.request("start_preview", |reply| Command::StartPreview { surface, reply })
            .await
    }

    /// Switch the active capture mode.
    ///
    /// In the `Previewing` phase the repeating request is rebuilt under the
    /// new profile in place. Issued while a capture is outstanding, the
    /// switch waits in the command queue until the capture completes; it is
    /// never dropped.
    pub async fn switch_mode(&self, mode: CaptureMode) -> Result<()> {
        self.request("switch_mode", |reply| Command::SwitchMode { mode, reply })
            .await
    }

    /// Apply a dial movement to the live preview.
    ///
    /// Rebuilds and resubmits the repeating request with the new physical
    /// value substituted. Fails with `InvalidState` when no preview target
    /// is registered rather than silently targeting a stale surface.
    pub async fn set_dial(&self, kind: DialKind, angle: f64) -> Result<()> {
        self.request("set_dial", |reply| Command::SetDial { kind, angle, reply })
            .await
    }

    /// Set the flash policy for modes that allow tuning it.
    pub async fn set_flash(&self, flash: FlashMode) -> Result<()> {
        self.request("set_flash", |reply| Command::SetFlash { flash, reply })
            .await
    }

    /// Set the manual focus distance in diopters, for modes with manual
    /// autofocus policy.
    pub async fn set_focus_distance(&self, distance: f64) -> Result<()> {
        self.request("set_focus_distance", |reply| Command::SetFocusDistance {
            distance,
            reply,
        })
        .await
    }

    /// Capture a single still frame through the active mode profile.
    ///
    /// Resolves with the persistence locator once the hardware has confirmed
    /// completion and the bytes are stored. At most one capture may be
    /// outstanding; a concurrent call fails immediately with `CaptureBusy`
    /// instead of queuing.
    pub async fn capture(&self) -> Result<String> {
        if self.capture_in_flight.swap(true, Ordering::SeqCst) {
            return Err(CameraError::CaptureBusy);
        }
        let outcome = self.request("capture", |reply| Command::Capture { reply }).await;
        self.capture_in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    /// Feed one paired (motion sensor, effect offset) preview sample to the
    /// audit trail. Samples arriving outside the `Previewing` phase are
    /// dropped.
    pub async fn report_motion(&self, sensor: [f64; 3], offset: [f64; 2]) {
        let Some(tx) = lock(&self.worker).as_ref().map(|link| link.tx.clone()) else {
            return;
        };
        let _ = tx.send(Command::Motion { sensor, offset }).await;
    }

    /// Close the session.
    ///
    /// Stops the repeating request, waits out any in-flight capture, releases
    /// the device, and joins the worker before returning; no event fires
    /// after `close()` resolves. Idempotent: closing a closed session is a
    /// no-op.
    pub async fn close(&self) {
        let Some(link) = lock(&self.worker).take() else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if link.tx.send(Command::Close { done: done_tx }).await.is_ok() {
            let _ = done_rx.await;
        }
        // The worker has released the device and is exiting; the join is
        // immediate.
        let _ = link.join.join();
        *lock(&self.phase) = SessionPhase::Closed;
    }

    async fn request<T, F>(&self, command: &'static str, build: F) -> Result<T>
    where
        F: FnOnce(Reply<T>) -> Command,
    {
        let tx = lock(&self.worker)
            .as_ref()
            .map(|link| link.tx.clone())
            .ok_or(CameraError::InvalidState {
                command,
                state: "Closed",
            })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(build(reply_tx)).await.is_err() {
            return Err(CameraError::DeviceAccess("session worker terminated".to_owned()));
        }
        reply_rx
            .await
            .map_err(|_| CameraError::DeviceAccess("session worker terminated".to_owned()))?
    }

    fn reap_worker(&self) {
        if let Some(link) = lock(&self.worker).take() {
            drop(link.tx);
            let _ = link.join.join();
        }
        *lock(&self.phase) = SessionPhase::Closed;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // Dropping the sender ends the worker loop; the worker releases the
        // device on its way out.
        if let Some(link) = lock(&self.worker).take() {
            drop(link.tx);
            let _ = link.join.join();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session state, carrying exactly the resources valid for each phase.
enum WorkerState {
    Configuring {
        backend: Box<dyn CameraBackend>,
    },
    Previewing {
        backend: Box<dyn CameraBackend>,
        surface: SurfaceId,
        repeating: CaptureRequest,
    },
    Error {
        reason: String,
    },
    Closed,
}

impl WorkerState {
    const fn name(&self) -> &'static str {
        match self {
            Self::Configuring { .. } => "Configuring",
            Self::Previewing { .. } => "Previewing",
            Self::Error { .. } => "Error",
            Self::Closed => "Closed",
        }
    }
}

struct Worker {
    state: WorkerState,
    mode: CaptureMode,
    dials: DialBank,
    flash: FlashMode,
    focus_distance: f64,
    trail: AuditTrail,
    store: Arc<dyn CaptureStore>,
    location: Arc<dyn LocationProvider>,
    events: mpsc::Sender<SessionEvent>,
    phase: Arc<Mutex<SessionPhase>>,
    jpeg_orientation: u16,
}

impl Worker {
    fn run(
        mut self,
        opener: &dyn BackendOpener,
        capability: &dyn CapabilityProvider,
        device_id: &str,
        mut rx: mpsc::Receiver<Command>,
        open_reply: oneshot::Sender<Result<()>>,
    ) {
        self.set_phase(SessionPhase::Opening);

        if !capability.has_capture_capability() {
            self.set_phase(SessionPhase::Closed);
            let _ = open_reply.send(Err(CameraError::PermissionDenied));
            return;
        }

        let mut backend = match opener.open(device_id) {
            Ok(backend) => backend,
            Err(err) => {
                self.set_phase(SessionPhase::Closed);
                let _ = open_reply.send(Err(err));
                return;
            }
        };

        self.set_phase(SessionPhase::Configuring);
        match backend.configure() {
            Ok(()) => {
                self.state = WorkerState::Configuring { backend };
                let _ = open_reply.send(Ok(()));
            }
            Err(err) => {
                backend.release();
                let reason = err.to_string();
                self.state = WorkerState::Error { reason: reason.clone() };
                self.set_phase(SessionPhase::Error);
                let _ = open_reply.send(Err(CameraError::ConfigurationFailed(reason)));
            }
        }

        // FIFO command loop: commands are processed strictly in issue order,
        // so a capture never races a preview-parameter update.
        while let Some(command) = rx.blocking_recv() {
            if self.handle(command) {
                return;
            }
        }

        // Controller dropped without close(); release on the way out.
        self.shutdown();
    }

    /// Handle one command. Returns true when the worker should exit.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::StartPreview { surface, reply } => {
                let _ = reply.send(self.start_preview(surface));
            }
            Command::SwitchMode { mode, reply } => {
                let _ = reply.send(self.switch_mode(mode));
            }
            Command::SetDial { kind, angle, reply } => {
                let outcome = self.update_preview("set_dial", |worker| {
                    worker.dials.set(kind, angle);
                });
                let _ = reply.send(outcome);
            }
            Command::SetFlash { flash, reply } => {
                let outcome = self.update_preview("set_flash", |worker| {
                    worker.flash = flash;
                });
                let _ = reply.send(outcome);
            }
            Command::SetFocusDistance { distance, reply } => {
                let outcome = self.update_preview("set_focus_distance", |worker| {
                    worker.focus_distance = distance;
                });
                let _ = reply.send(outcome);
            }
            Command::Capture { reply } => {
                let _ = reply.send(self.capture());
            }
            Command::Motion { sensor, offset } => {
                if matches!(self.state, WorkerState::Previewing { .. }) {
                    self.trail.observe_motion(sensor, offset);
                } else {
                    log::debug!("dropping motion sample outside preview");
                }
            }
            Command::Close { done } => {
                self.shutdown();
                let _ = done.send(());
                return true;
            }
        }
        false
    }

    fn start_preview(&mut self, surface: SurfaceId) -> Result<()> {
        match std::mem::replace(&mut self.state, WorkerState::Closed) {
            WorkerState::Configuring { backend }
            | WorkerState::Previewing { backend, .. } => {
                let outcome = self.enter_preview(backend, surface);
                if outcome.is_ok() {
                    self.emit(SessionEvent::PreviewReady { surface });
                }
                outcome
            }
            other => {
                let state = other.name();
                self.state = other;
                Err(CameraError::InvalidState {
                    command: "start_preview",
                    state,
                })
            }
        }
    }

    fn switch_mode(&mut self, mode: CaptureMode) -> Result<()> {
        match std::mem::replace(&mut self.state, WorkerState::Closed) {
            // Before preview starts the switch only selects the profile the
            // upcoming repeating request will be built from.
            WorkerState::Configuring { backend } => {
                self.mode = mode;
                self.state = WorkerState::Configuring { backend };
                Ok(())
            }
            WorkerState::Previewing { backend, surface, .. } => {
                self.mode = mode;
                self.enter_preview(backend, surface)
            }
            other => {
                let state = other.name();
                self.state = other;
                Err(CameraError::InvalidState {
                    command: "switch_mode",
                    state,
                })
            }
        }
    }

    /// Apply a live control change and resubmit the repeating request.
    ///
    /// Legal only while a preview target is registered; anywhere else the
    /// update fails explicitly instead of touching a stale surface.
    fn update_preview<F>(&mut self, command: &'static str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Self),
    {
        match std::mem::replace(&mut self.state, WorkerState::Closed) {
            WorkerState::Previewing { backend, surface, .. } => {
                apply(self);
                self.enter_preview(backend, surface)
            }
            other => {
                let state = other.name();
                self.state = other;
                Err(CameraError::InvalidState { command, state })
            }
        }
    }

    /// Build the repeating request for the active profile and (re)start it.
    ///
    /// The in-flight request is replaced atomically; on failure the device
    /// is released and the session degrades to the error state.
    fn enter_preview(&mut self, mut backend: Box<dyn CameraBackend>, surface: SurfaceId) -> Result<()> {
        let repeating = self.build_request(surface);
        match backend.start_repeating(&repeating) {
            Ok(()) => {
                self.state = WorkerState::Previewing {
                    backend,
                    surface,
                    repeating,
                };
                self.set_phase(SessionPhase::Previewing);
                Ok(())
            }
            Err(err) => {
                backend.release();
                let failure = CameraError::ConfigurationFailed(err.to_string());
                self.state = WorkerState::Error {
                    reason: failure.to_string(),
                };
                self.set_phase(SessionPhase::Error);
                self.emit(SessionEvent::Error {
                    kind: failure.kind(),
                    message: failure.to_string(),
                });
                Err(failure)
            }
        }
    }

    /// The capture pipeline: submit one still request, persist the bytes,
    /// and forward the hardware result to the audit trail.
    fn capture(&mut self) -> Result<String> {
        let (mut backend, surface, repeating) =
            match std::mem::replace(&mut self.state, WorkerState::Closed) {
                WorkerState::Previewing { backend, surface, repeating } => {
                    (backend, surface, repeating)
                }
                other => {
                    let state = other.name();
                    self.state = other;
                    return Err(CameraError::InvalidState {
                        command: "capture",
                        state,
                    });
                }
            };

        // The still request is built from the active profile, not from the
        // repeating preview request.
        let request = self.build_request(surface);
        self.set_phase(SessionPhase::Capturing);
        let outcome = backend.capture_still(&request);

        // Never left hanging in Capturing: the session returns to Previewing
        // whether the capture completed or aborted.
        self.state = WorkerState::Previewing { backend, surface, repeating };
        self.set_phase(SessionPhase::Previewing);

        let still = match outcome {
            Ok(still) => still,
            Err(err) => {
                let failure = CameraError::CaptureAborted(err.to_string());
                self.emit(SessionEvent::Error {
                    kind: failure.kind(),
                    message: failure.to_string(),
                });
                return Err(failure);
            }
        };

        let tag = self.mode.tag();
        let name = format!("{tag}_{}", epoch_millis());
        let stored = self.store.store(&still.bytes, &name, tag);

        // The hardware result is audited regardless of storage outcome;
        // mismatches are advisories and never fail the capture.
        self.trail.verify_capture(&request, &still.result);

        match stored {
            Ok(locator) => {
                self.trail
                    .annotate_location(&locator, self.location.current_coordinates());
                self.emit(SessionEvent::CaptureSaved {
                    locator: locator.clone(),
                });
                Ok(locator)
            }
            Err(err) => {
                self.emit(SessionEvent::Error {
                    kind: err.kind(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn build_request(&self, surface: SurfaceId) -> CaptureRequest {
        self.mode.profile().build_request(
            &self.dials,
            self.flash,
            self.focus_distance,
            vec![surface],
            self.jpeg_orientation,
        )
    }

    fn shutdown(&mut self) {
        match std::mem::replace(&mut self.state, WorkerState::Closed) {
            WorkerState::Previewing { mut backend, .. } => {
                if let Err(err) = backend.stop_repeating() {
                    log::warn!("failed to stop repeating request on close: {err}");
                }
                backend.release();
            }
            WorkerState::Configuring { mut backend } => backend.release(),
            WorkerState::Error { .. } | WorkerState::Closed => {}
        }
        self.set_phase(SessionPhase::Closed);
    }

    fn set_phase(&self, phase: SessionPhase) {
        *lock(&self.phase) = phase;
    }

    fn emit(&self, event: SessionEvent) {
        match self.events.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                // Consumer too slow; advisory events are droppable.
                log::debug!("event channel full, dropping {event:?}");
            }
        }
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

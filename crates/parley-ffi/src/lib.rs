//! UniFFI bindings for parley-core.
//!
//! Provides a ParleyClient object that wraps the SessionManager, its
//! settings store and a host-pumped UI executor into a single FFI-safe
//! interface. The host supplies the media engine, capture stack, video
//! views and main-thread scheduling through callback interfaces.

use std::collections::HashMap;
use std::sync::Arc;

use parley_core::{
    self, CameraDevice, ConnectRequest, DeviceError, DeviceId, EngineEvents, ManualExecutor,
    ParticipantSnapshot, Publication, SessionManager, SettingsStore, SourceSwitch, TrackHandle,
    TrackOrigin, ViewId,
    devices::CameraFacing as CoreCameraFacing,
    engine::SessionEvent as CoreSessionEvent,
    events::ParleyEvent as CoreParleyEvent,
    media::TrackKind as CoreTrackKind,
    participants::RemoteParticipant,
    session::SessionState as CoreSessionState,
    settings::SessionSettings,
};

uniffi::include_scaffolding!("parley");

// ── Namespace functions ──────────────────────────────────────────────

/// Initialize tracing/logging. Call once from the host before creating a
/// ParleyClient. ANSI colours are off so logcat and syslog stay readable.
fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "parley_core=debug,parley_ffi=debug".parse().unwrap()),
            )
            .with_ansi(false)
            .init();
    });
}

// ── FFI-safe type conversions ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
}

impl From<CoreSessionState> for SessionState {
    fn from(s: CoreSessionState) -> Self {
        match s {
            CoreSessionState::Idle => Self::Idle,
            CoreSessionState::Connecting => Self::Connecting,
            CoreSessionState::Connected => Self::Connected,
            CoreSessionState::Reconnecting => Self::Reconnecting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
    Data,
}

impl From<CoreTrackKind> for TrackKind {
    fn from(k: CoreTrackKind) -> Self {
        match k {
            CoreTrackKind::Audio => Self::Audio,
            CoreTrackKind::Video => Self::Video,
            CoreTrackKind::Data => Self::Data,
        }
    }
}

impl From<TrackKind> for CoreTrackKind {
    fn from(k: TrackKind) -> Self {
        match k {
            TrackKind::Audio => Self::Audio,
            TrackKind::Video => Self::Video,
            TrackKind::Data => Self::Data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    Front,
    Back,
    External,
}

impl From<CameraFacing> for CoreCameraFacing {
    fn from(f: CameraFacing) -> Self {
        match f {
            CameraFacing::Front => Self::Front,
            CameraFacing::Back => Self::Back,
            CameraFacing::External => Self::External,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub sid: String,
    pub kind: TrackKind,
    pub local: bool,
}

impl From<&TrackHandle> for TrackInfo {
    fn from(t: &TrackHandle) -> Self {
        Self {
            sid: t.sid().to_string(),
            kind: t.kind().into(),
            local: t.origin() == TrackOrigin::Local,
        }
    }
}

impl From<TrackInfo> for TrackHandle {
    fn from(t: TrackInfo) -> Self {
        if t.local {
            TrackHandle::local(t.sid, t.kind.into())
        } else {
            TrackHandle::remote(t.sid, t.kind.into())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationInfo {
    pub sid: String,
    pub kind: TrackKind,
    pub enabled: bool,
    pub track: Option<TrackInfo>,
}

impl From<&Publication> for PublicationInfo {
    fn from(p: &Publication) -> Self {
        Self {
            sid: p.sid.clone(),
            kind: p.kind.into(),
            enabled: p.enabled,
            track: p.track.as_ref().map(TrackInfo::from),
        }
    }
}

impl From<PublicationInfo> for Publication {
    fn from(p: PublicationInfo) -> Self {
        let mut publication = Publication::new(p.sid, p.kind.into(), p.enabled);
        publication.track = p.track.map(TrackHandle::from);
        publication
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub identity: String,
    pub publications: Vec<PublicationInfo>,
}

impl From<RemoteParticipant> for ParticipantInfo {
    fn from(p: RemoteParticipant) -> Self {
        let mut publications: Vec<PublicationInfo> =
            p.publications().map(PublicationInfo::from).collect();
        publications.sort_by(|a, b| a.sid.cmp(&b.sid));
        Self {
            identity: p.identity,
            publications,
        }
    }
}

impl From<ParticipantInfo> for ParticipantSnapshot {
    fn from(p: ParticipantInfo) -> Self {
        Self {
            identity: p.identity,
            publications: p.publications.into_iter().map(Publication::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    pub id: String,
    pub facing: CameraFacing,
}

impl From<CameraInfo> for CameraDevice {
    fn from(c: CameraInfo) -> Self {
        CameraDevice::new(&c.id, c.facing.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub publish_audio_on_join: bool,
    pub publish_video_on_join: bool,
    pub prefer_front_camera: bool,
    pub speakerphone_on_join: bool,
}

impl From<SessionSettings> for Settings {
    fn from(s: SessionSettings) -> Self {
        Self {
            publish_audio_on_join: s.publish_audio_on_join,
            publish_video_on_join: s.publish_video_on_join,
            prefer_front_camera: s.prefer_front_camera,
            speakerphone_on_join: s.speakerphone_on_join,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParleyEvent {
    RoomConnected { room: String },
    ConnectionFailed { error: String },
    RoomDisconnected { room: String },
    Reconnecting { error: String },
    Reconnected { room: String },
    ParticipantConnected { identity: String },
    ParticipantDisconnected { identity: String },
    AudioPublished { identity: String },
    AudioUnpublished { identity: String },
    VideoUnpublished { identity: String },
    AudioEnabled { identity: String },
    AudioDisabled { identity: String },
    VideoEnabled { identity: String },
    VideoDisabled { identity: String },
    LocalAudioPublished,
    LocalVideoPublished,
    LocalAudioFailed { error: String },
    LocalVideoFailed { error: String },
    RecordingStarted { room: String },
    RecordingStopped { room: String },
}

impl From<CoreParleyEvent> for ParleyEvent {
    fn from(e: CoreParleyEvent) -> Self {
        match e {
            CoreParleyEvent::RoomConnected { room } => Self::RoomConnected { room },
            CoreParleyEvent::ConnectionFailed { error } => Self::ConnectionFailed { error },
            CoreParleyEvent::RoomDisconnected { room } => Self::RoomDisconnected { room },
            CoreParleyEvent::Reconnecting { error } => Self::Reconnecting { error },
            CoreParleyEvent::Reconnected { room } => Self::Reconnected { room },
            CoreParleyEvent::ParticipantConnected { identity } => {
                Self::ParticipantConnected { identity }
            }
            CoreParleyEvent::ParticipantDisconnected { identity } => {
                Self::ParticipantDisconnected { identity }
            }
            CoreParleyEvent::AudioPublished { identity } => Self::AudioPublished { identity },
            CoreParleyEvent::AudioUnpublished { identity } => Self::AudioUnpublished { identity },
            CoreParleyEvent::VideoUnpublished { identity } => Self::VideoUnpublished { identity },
            CoreParleyEvent::AudioEnabled { identity } => Self::AudioEnabled { identity },
            CoreParleyEvent::AudioDisabled { identity } => Self::AudioDisabled { identity },
            CoreParleyEvent::VideoEnabled { identity } => Self::VideoEnabled { identity },
            CoreParleyEvent::VideoDisabled { identity } => Self::VideoDisabled { identity },
            CoreParleyEvent::LocalAudioPublished => Self::LocalAudioPublished,
            CoreParleyEvent::LocalVideoPublished => Self::LocalVideoPublished,
            CoreParleyEvent::LocalAudioFailed { error } => Self::LocalAudioFailed { error },
            CoreParleyEvent::LocalVideoFailed { error } => Self::LocalVideoFailed { error },
            CoreParleyEvent::RecordingStarted { room } => Self::RecordingStarted { room },
            CoreParleyEvent::RecordingStopped { room } => Self::RecordingStopped { room },
        }
    }
}

/// Engine callbacks reported by the host's media engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Connected {
        room: String,
        local_identity: String,
        participants: Vec<ParticipantInfo>,
    },
    ConnectFailed {
        error: String,
    },
    Disconnected {
        error: Option<String>,
    },
    Reconnecting {
        error: String,
    },
    Reconnected,
    ParticipantConnected {
        participant: ParticipantInfo,
    },
    ParticipantDisconnected {
        identity: String,
    },
    TrackPublished {
        identity: String,
        publication: PublicationInfo,
    },
    TrackUnpublished {
        identity: String,
        publication_sid: String,
    },
    TrackSubscribed {
        identity: String,
        publication_sid: String,
        track: TrackInfo,
    },
    TrackUnsubscribed {
        identity: String,
        publication_sid: String,
        track: TrackInfo,
    },
    TrackSubscriptionFailed {
        identity: String,
        publication_sid: String,
        error: String,
    },
    TrackEnabled {
        identity: String,
        publication_sid: String,
    },
    TrackDisabled {
        identity: String,
        publication_sid: String,
    },
    LocalTrackPublished {
        track: TrackInfo,
    },
    LocalTrackPublicationFailed {
        track: TrackInfo,
        error: String,
    },
    RecordingStarted,
    RecordingStopped,
}

impl From<EngineEvent> for CoreSessionEvent {
    fn from(e: EngineEvent) -> Self {
        match e {
            EngineEvent::Connected {
                room,
                local_identity,
                participants,
            } => Self::Connected {
                room,
                local_identity,
                participants: participants.into_iter().map(ParticipantSnapshot::from).collect(),
            },
            EngineEvent::ConnectFailed { error } => Self::ConnectFailed { error },
            EngineEvent::Disconnected { error } => Self::Disconnected { error },
            EngineEvent::Reconnecting { error } => Self::Reconnecting { error },
            EngineEvent::Reconnected => Self::Reconnected,
            EngineEvent::ParticipantConnected { participant } => {
                Self::ParticipantConnected(participant.into())
            }
            EngineEvent::ParticipantDisconnected { identity } => {
                Self::ParticipantDisconnected { identity }
            }
            EngineEvent::TrackPublished {
                identity,
                publication,
            } => Self::TrackPublished {
                identity,
                publication: publication.into(),
            },
            EngineEvent::TrackUnpublished {
                identity,
                publication_sid,
            } => Self::TrackUnpublished {
                identity,
                publication_sid,
            },
            EngineEvent::TrackSubscribed {
                identity,
                publication_sid,
                track,
            } => Self::TrackSubscribed {
                identity,
                publication_sid,
                track: track.into(),
            },
            EngineEvent::TrackUnsubscribed {
                identity,
                publication_sid,
                track,
            } => Self::TrackUnsubscribed {
                identity,
                publication_sid,
                track: track.into(),
            },
            EngineEvent::TrackSubscriptionFailed {
                identity,
                publication_sid,
                error,
            } => Self::TrackSubscriptionFailed {
                identity,
                publication_sid,
                error,
            },
            EngineEvent::TrackEnabled {
                identity,
                publication_sid,
            } => Self::TrackEnabled {
                identity,
                publication_sid,
            },
            EngineEvent::TrackDisabled {
                identity,
                publication_sid,
            } => Self::TrackDisabled {
                identity,
                publication_sid,
            },
            EngineEvent::LocalTrackPublished { track } => Self::LocalTrackPublished {
                track: track.into(),
            },
            EngineEvent::LocalTrackPublicationFailed { track, error } => {
                Self::LocalTrackPublicationFailed {
                    track: track.into(),
                    error,
                }
            }
            EngineEvent::RecordingStarted => Self::RecordingStarted,
            EngineEvent::RecordingStopped => Self::RecordingStopped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    InPlace,
    Unsupported,
    Failed { reason: String },
}

// ── Error conversion ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    #[error("Invalid argument: {msg}")]
    ArgumentInvalid { msg: String },
    #[error("Missing identity: {msg}")]
    MissingIdentity { msg: String },
    #[error("Already connected: {msg}")]
    AlreadyConnected { msg: String },
    #[error("No device: {msg}")]
    NoDeviceFound { msg: String },
    #[error("No alternate device: {msg}")]
    NoAlternateDevice { msg: String },
    #[error("Capture unavailable: {msg}")]
    CaptureUnavailable { msg: String },
    /// The client's own runtime could not start.
    #[error("Engine failure: {msg}")]
    EngineFailure { msg: String },
}

impl From<parley_core::ParleyError> for ParleyError {
    fn from(e: parley_core::ParleyError) -> Self {
        tracing::error!("ParleyError: {e}");
        let msg = e.to_string();
        match e {
            parley_core::ParleyError::ArgumentInvalid(_) => Self::ArgumentInvalid { msg },
            parley_core::ParleyError::MissingIdentity => Self::MissingIdentity { msg },
            parley_core::ParleyError::AlreadyConnected => Self::AlreadyConnected { msg },
            parley_core::ParleyError::Device(DeviceError::NoDeviceFound) => {
                Self::NoDeviceFound { msg }
            }
            parley_core::ParleyError::Device(DeviceError::NoAlternateDevice) => {
                Self::NoAlternateDevice { msg }
            }
            parley_core::ParleyError::Device(DeviceError::CaptureUnavailable(_)) => {
                Self::CaptureUnavailable { msg }
            }
        }
    }
}

// ── Callback interfaces ───────────────────────────────────────────────

pub trait ParleyEventListener: Send + Sync {
    fn on_event(&self, event: ParleyEvent);
}

/// The host's media engine. Calls must return promptly; outcomes come
/// back through `ParleyClient::deliver_engine_event` tagged with the
/// generation passed to `connect`.
pub trait HostEngine: Send + Sync {
    fn connect(
        &self,
        generation: u64,
        token: String,
        room_name: String,
        audio: Option<TrackInfo>,
        video: Option<TrackInfo>,
    );
    fn disconnect(&self);
    fn publish(&self, track: TrackInfo);
    fn unpublish(&self, track: TrackInfo);
    fn set_speakerphone(&self, enabled: bool);
}

/// The host's capture stack. `start_*` return a failure reason, or `None`
/// once capture is running.
pub trait HostCapture: Send + Sync {
    fn cameras(&self) -> Vec<CameraInfo>;
    fn start_audio(&self, track: TrackInfo) -> Option<String>;
    fn start_video(&self, track: TrackInfo, camera_id: String) -> Option<String>;
    fn set_enabled(&self, track: TrackInfo, enabled: bool);
    fn switch_source(&self, track: TrackInfo, camera_id: String) -> SwitchOutcome;
    fn release(&self, track: TrackInfo);
    fn stop_capture(&self);
}

pub trait HostVideoView: Send + Sync {
    fn attach(&self, track: TrackInfo);
    fn detach(&self, track: TrackInfo);
}

/// Asks the host to call `ParleyClient::run_ui_tasks` on its main thread.
pub trait UiScheduler: Send + Sync {
    fn schedule(&self);
}

// ── Bridges: FFI callbacks → core traits ──────────────────────────────

struct BridgeListener {
    ffi_listener: Arc<dyn ParleyEventListener>,
}

impl parley_core::ParleyEventListener for BridgeListener {
    fn on_event(&self, event: CoreParleyEvent) {
        self.ffi_listener.on_event(event.into());
    }
}

struct BridgeEngine {
    host: Box<dyn HostEngine>,
}

impl parley_core::MediaEngine for BridgeEngine {
    fn connect(&self, request: ConnectRequest, events: EngineEvents) {
        self.host.connect(
            events.generation(),
            request.token,
            request.room_name,
            request.audio.as_ref().map(TrackInfo::from),
            request.video.as_ref().map(TrackInfo::from),
        );
    }

    fn disconnect(&self) {
        self.host.disconnect();
    }

    fn publish(&self, track: &TrackHandle) {
        self.host.publish(track.into());
    }

    fn unpublish(&self, track: &TrackHandle) {
        self.host.unpublish(track.into());
    }

    fn set_speakerphone(&self, enabled: bool) {
        self.host.set_speakerphone(enabled);
    }
}

struct BridgeCapture {
    host: Box<dyn HostCapture>,
}

fn capture_result(failure: Option<String>) -> Result<(), DeviceError> {
    match failure {
        Some(reason) => Err(DeviceError::CaptureUnavailable(reason)),
        None => Ok(()),
    }
}

impl parley_core::CaptureBackend for BridgeCapture {
    fn cameras(&self) -> Vec<CameraDevice> {
        self.host.cameras().into_iter().map(CameraDevice::from).collect()
    }

    fn start_audio(&self, track: &TrackHandle) -> Result<(), DeviceError> {
        capture_result(self.host.start_audio(track.into()))
    }

    fn start_video(&self, track: &TrackHandle, camera: &DeviceId) -> Result<(), DeviceError> {
        capture_result(self.host.start_video(track.into(), camera.to_string()))
    }

    fn set_enabled(&self, track: &TrackHandle, enabled: bool) {
        self.host.set_enabled(track.into(), enabled);
    }

    fn switch_source(
        &self,
        track: &TrackHandle,
        camera: &DeviceId,
    ) -> Result<SourceSwitch, DeviceError> {
        match self.host.switch_source(track.into(), camera.to_string()) {
            SwitchOutcome::InPlace => Ok(SourceSwitch::InPlace),
            SwitchOutcome::Unsupported => Ok(SourceSwitch::Unsupported),
            SwitchOutcome::Failed { reason } => Err(DeviceError::CaptureUnavailable(reason)),
        }
    }

    fn release(&self, track: &TrackHandle) {
        self.host.release(track.into());
    }

    fn stop_capture(&self) {
        self.host.stop_capture();
    }
}

struct BridgeView {
    host: Box<dyn HostVideoView>,
}

impl parley_core::VideoView for BridgeView {
    fn attach(&self, track: &TrackHandle) {
        self.host.attach(track.into());
    }

    fn detach(&self, track: &TrackHandle) {
        self.host.detach(track.into());
    }
}

// ── ParleyClient: main FFI object ─────────────────────────────────────

pub struct ParleyClient {
    session: SessionManager,
    settings: SettingsStore,
    ui: Arc<ManualExecutor>,
    rt: tokio::runtime::Runtime,
}

impl ParleyClient {
    pub fn new(
        data_dir: String,
        engine: Box<dyn HostEngine>,
        capture: Box<dyn HostCapture>,
        scheduler: Box<dyn UiScheduler>,
    ) -> Result<Self, ParleyError> {
        let rt = tokio::runtime::Runtime::new().map_err(|e| ParleyError::EngineFailure {
            msg: format!("failed to create tokio runtime: {e}"),
        })?;
        let settings = SettingsStore::open(&data_dir);
        let ui = Arc::new(ManualExecutor::with_waker(move || scheduler.schedule()));
        let session = SessionManager::new(
            Arc::new(BridgeEngine { host: engine }),
            Arc::new(BridgeCapture { host: capture }),
            ui.clone(),
            settings.snapshot(),
        );
        tracing::info!("ParleyClient created, data_dir={data_dir}");
        Ok(Self {
            session,
            settings,
            ui,
            rt,
        })
    }

    pub fn connect(&self, token: String, room_name: String) -> Result<(), ParleyError> {
        Ok(self.session.connect(&token, &room_name)?)
    }

    pub fn disconnect(&self) -> Result<(), ParleyError> {
        Ok(self.session.disconnect()?)
    }

    pub fn mute_audio(&self) -> Result<(), ParleyError> {
        Ok(self.session.mute_audio()?)
    }

    pub fn unmute_audio(&self) -> Result<(), ParleyError> {
        Ok(self.session.unmute_audio()?)
    }

    pub fn enable_video(&self) -> Result<(), ParleyError> {
        Ok(self.session.enable_video()?)
    }

    pub fn disable_video(&self) -> Result<(), ParleyError> {
        Ok(self.session.disable_video()?)
    }

    pub fn switch_camera(&self) -> Result<(), ParleyError> {
        Ok(self.session.switch_camera()?)
    }

    pub fn toggle_speaker(&self, enable: bool) -> Result<(), ParleyError> {
        Ok(self.session.toggle_speaker(enable)?)
    }

    pub fn reattach_local_video_track(&self) -> Result<(), ParleyError> {
        Ok(self.session.reattach_local_video_track()?)
    }

    pub fn pause_local_video_track(&self) -> Result<(), ParleyError> {
        Ok(self.session.pause_local_video_track()?)
    }

    /// Register a view by name: `"local"` for the preview, otherwise a
    /// participant identity.
    pub fn register_view(&self, name: String, view: Box<dyn HostVideoView>) -> Result<(), ParleyError> {
        let id = ViewId::parse(&name)?;
        self.session.register_view(id, Arc::new(BridgeView { host: view }));
        Ok(())
    }

    /// Register a remote view from its creation arguments. Returns the
    /// participant identity the view renders.
    pub fn register_remote_view(
        &self,
        args: HashMap<String, String>,
        view: Box<dyn HostVideoView>,
    ) -> Result<String, ParleyError> {
        let args = serde_json::to_value(&args).map_err(|e| ParleyError::ArgumentInvalid {
            msg: e.to_string(),
        })?;
        let id = self
            .session
            .register_remote_view(&args, Arc::new(BridgeView { host: view }))?;
        Ok(id.to_string())
    }

    pub fn unregister_view(&self, name: String) -> Result<(), ParleyError> {
        let id = ViewId::parse(&name)?;
        self.session.unregister_view(&id);
        Ok(())
    }

    /// Run queued view work. Must be called on the host's UI thread.
    pub fn run_ui_tasks(&self) -> u32 {
        u32::try_from(self.ui.run_pending()).unwrap_or(u32::MAX)
    }

    pub fn deliver_engine_event(&self, generation: u64, event: EngineEvent) {
        self.session.deliver_engine_event(generation, event.into());
    }

    pub fn generation(&self) -> u64 {
        self.session.generation()
    }

    /// Listeners run on a runtime worker, outside the session lock, so they
    /// may call back into the client.
    pub fn add_listener(&self, listener: Box<dyn ParleyEventListener>) {
        let bridge = Arc::new(BridgeListener {
            ffi_listener: Arc::from(listener),
        });
        let stream = self.session.subscribe();
        self.rt.spawn(stream.forward(bridge));
    }

    pub fn state(&self) -> SessionState {
        self.session.state().into()
    }

    pub fn room_name(&self) -> Option<String> {
        self.session.room_name()
    }

    pub fn local_identity(&self) -> Option<String> {
        self.session.local_identity()
    }

    pub fn participants(&self) -> Vec<String> {
        self.session.participants()
    }

    pub fn participant(&self, identity: String) -> Option<ParticipantInfo> {
        self.session.participant(&identity).map(ParticipantInfo::from)
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.session.is_audio_enabled()
    }

    pub fn is_video_enabled(&self) -> bool {
        self.session.is_video_enabled()
    }

    pub fn speakerphone(&self) -> bool {
        self.session.speakerphone()
    }

    pub fn active_camera(&self) -> Option<String> {
        self.session.active_camera().map(|id| id.0)
    }

    pub fn list_devices(&self) -> Vec<String> {
        self.session
            .list_devices()
            .into_iter()
            .map(|id| id.0)
            .collect()
    }

    pub fn get_settings(&self) -> Settings {
        self.settings.snapshot().into()
    }

    pub fn set_publish_audio_on_join(&self, enabled: bool) {
        let updated = self.settings.update(|s| s.publish_audio_on_join = enabled);
        self.session.update_settings(updated);
    }

    pub fn set_publish_video_on_join(&self, enabled: bool) {
        let updated = self.settings.update(|s| s.publish_video_on_join = enabled);
        self.session.update_settings(updated);
    }

    pub fn set_prefer_front_camera(&self, enabled: bool) {
        let updated = self.settings.update(|s| s.prefer_front_camera = enabled);
        self.session.update_settings(updated);
    }

    pub fn set_speakerphone_on_join(&self, enabled: bool) {
        let updated = self.settings.update(|s| s.speakerphone_on_join = enabled);
        self.session.update_settings(updated);
    }
}

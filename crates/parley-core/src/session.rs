use std::collections::VecDeque;
use std::sync::{Arc, Mutex, TryLockError, Weak};

use serde::Serialize;

use crate::bindings::{VideoView, ViewId, ViewPort};
use crate::devices::{DeviceId, DeviceRegistry};
use crate::dispatch::UiExecutor;
use crate::engine::{
    CaptureBackend, ConnectRequest, EngineEventSink, EngineEvents, MediaEngine,
    ParticipantSnapshot, SessionEvent,
};
use crate::errors::ParleyError;
use crate::events::{EventEmitter, EventStream, ParleyEvent, ParleyEventListener};
use crate::media::{Publication, TrackHandle, TrackKind};
use crate::participants::{ParticipantManager, RemoteParticipant};
use crate::settings::SessionSettings;
use crate::tracks::TrackManager;

/// Lifecycle of the session. `Idle` is the only rest state: a failed or
/// finished session returns here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug)]
struct ActiveSession {
    generation: u64,
    room: String,
}

/// Drives one media session at a time.
///
/// Commands, engine callbacks and getters are serialised through a single
/// state lock. Engine callbacks that arrive while the lock is held (from
/// another thread, or re-entrantly from inside an engine call) are queued
/// and handled by the current holder before it lets go, so they are never
/// lost and never interleave with another mutation.
///
/// Listeners added with [`add_listener`](Self::add_listener) run under that
/// lock. Hosts that want to call back into the session from an event should
/// use [`subscribe`](Self::subscribe) and consume the stream elsewhere.
pub struct SessionManager {
    shared: Arc<Shared>,
}

struct Shared {
    core: Mutex<SessionCore>,
    inbox: Mutex<VecDeque<(u64, SessionEvent)>>,
}

struct SessionCore {
    state: SessionState,
    generation: u64,
    session: Option<ActiveSession>,
    settings: SessionSettings,
    speakerphone: bool,
    engine: Arc<dyn MediaEngine>,
    capture: Arc<dyn CaptureBackend>,
    devices: DeviceRegistry,
    tracks: TrackManager,
    participants: ParticipantManager,
    views: ViewPort,
    emitter: EventEmitter,
}

impl SessionManager {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        capture: Arc<dyn CaptureBackend>,
        executor: Arc<dyn UiExecutor>,
        settings: SessionSettings,
    ) -> Self {
        let core = SessionCore {
            state: SessionState::Idle,
            generation: 0,
            session: None,
            speakerphone: settings.speakerphone_on_join,
            settings,
            tracks: TrackManager::new(capture.clone(), engine.clone()),
            engine,
            capture,
            devices: DeviceRegistry::new(),
            participants: ParticipantManager::new(),
            views: ViewPort::new(executor),
            emitter: EventEmitter::new(),
        };
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                inbox: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Register a listener for session events.
    pub fn add_listener(&self, listener: Arc<dyn ParleyEventListener>) {
        self.shared.with_core(|core| core.emitter.add_listener(listener));
    }

    pub fn subscribe(&self) -> EventStream {
        self.shared.with_core(|core| core.emitter.subscribe())
    }

    /// Handle to the view registry, for rendering-surface callbacks.
    pub fn views(&self) -> ViewPort {
        self.shared.with_core(|core| core.views.clone())
    }

    pub fn register_view(&self, id: ViewId, view: Arc<dyn VideoView>) {
        self.views().register_view(id, view);
    }

    pub fn register_remote_view(
        &self,
        args: &serde_json::Value,
        view: Arc<dyn VideoView>,
    ) -> Result<ViewId, ParleyError> {
        self.views().register_remote_view(args, view)
    }

    pub fn unregister_view(&self, id: &ViewId) {
        self.views().unregister_view(id);
    }

    pub fn state(&self) -> SessionState {
        self.shared.with_core(|core| core.state)
    }

    pub fn room_name(&self) -> Option<String> {
        self.shared
            .with_core(|core| core.session.as_ref().map(|s| s.room.clone()))
    }

    /// Identities of the remote participants, sorted.
    pub fn participants(&self) -> Vec<String> {
        let mut identities = self.shared.with_core(|core| core.participants.identities());
        identities.sort();
        identities
    }

    pub fn participant(&self, identity: &str) -> Option<RemoteParticipant> {
        self.shared
            .with_core(|core| core.participants.participant(identity).cloned())
    }

    pub fn local_identity(&self) -> Option<String> {
        self.shared
            .with_core(|core| core.participants.local_identity().map(str::to_string))
    }

    pub fn local_publications(&self) -> Vec<Publication> {
        self.shared
            .with_core(|core| core.participants.local_publications().cloned().collect())
    }

    pub fn local_audio_track(&self) -> Option<TrackHandle> {
        self.shared.with_core(|core| core.tracks.audio_track().cloned())
    }

    pub fn local_video_track(&self) -> Option<TrackHandle> {
        self.shared.with_core(|core| core.tracks.video_track().cloned())
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.shared.with_core(|core| {
            core.tracks
                .audio_track()
                .is_some_and(|t| core.tracks.is_enabled(t))
        })
    }

    pub fn is_video_enabled(&self) -> bool {
        self.shared.with_core(|core| {
            core.tracks
                .video_track()
                .is_some_and(|t| core.tracks.is_enabled(t))
        })
    }

    pub fn active_camera(&self) -> Option<DeviceId> {
        self.shared.with_core(|core| core.devices.active().cloned())
    }

    /// Cameras known to the registry, refreshed from the capture backend.
    pub fn list_devices(&self) -> Vec<DeviceId> {
        self.shared.with_core(|core| {
            core.devices.refresh(core.capture.cameras());
            core.devices.list_devices()
        })
    }

    pub fn speakerphone(&self) -> bool {
        self.shared.with_core(|core| core.speakerphone)
    }

    pub fn settings(&self) -> SessionSettings {
        self.shared.with_core(|core| core.settings.clone())
    }

    /// Replace the settings used by the next `connect`.
    pub fn update_settings(&self, settings: SessionSettings) {
        self.shared.with_core(|core| core.settings = settings);
    }

    /// Generation of the latest connection attempt. Engine events must be
    /// tagged with it to be accepted.
    pub fn generation(&self) -> u64 {
        self.shared.with_core(|core| core.generation)
    }

    /// Feed an engine event from outside an [`EngineEvents`] handle.
    pub fn deliver_engine_event(&self, generation: u64, event: SessionEvent) {
        self.shared.deliver(generation, event);
    }

    /// Start local media and ask the engine to join `room_name`.
    ///
    /// Returns once the request is handed to the engine; the outcome is
    /// reported as `room_connected` or `connection_failed`.
    pub fn connect(&self, token: &str, room_name: &str) -> Result<(), ParleyError> {
        if token.trim().is_empty() {
            return Err(ParleyError::ArgumentInvalid("token must not be empty".into()));
        }
        if room_name.trim().is_empty() {
            return Err(ParleyError::ArgumentInvalid("room name must not be empty".into()));
        }
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let sink: Weak<dyn EngineEventSink> = weak;
        self.shared
            .with_core(|core| core.connect(token, room_name, sink))
    }

    /// Leave the room and release everything. Safe in any state.
    pub fn disconnect(&self) -> Result<(), ParleyError> {
        self.shared.with_core(|core| {
            if core.session.is_none() {
                tracing::debug!("disconnect while idle");
                return Ok(());
            }
            core.engine.disconnect();
            let room = core.teardown();
            tracing::info!(room = %room, "disconnected by host");
            core.emitter.emit(ParleyEvent::RoomDisconnected { room });
            Ok(())
        })
    }

    pub fn mute_audio(&self) -> Result<(), ParleyError> {
        self.shared.with_core(|core| core.set_audio_enabled(false));
        Ok(())
    }

    pub fn unmute_audio(&self) -> Result<(), ParleyError> {
        self.shared.with_core(|core| core.set_audio_enabled(true));
        Ok(())
    }

    pub fn enable_video(&self) -> Result<(), ParleyError> {
        self.shared.with_core(|core| core.enable_video())
    }

    pub fn disable_video(&self) -> Result<(), ParleyError> {
        self.shared.with_core(|core| core.disable_video());
        Ok(())
    }

    /// Move local video to the next camera.
    pub fn switch_camera(&self) -> Result<(), ParleyError> {
        self.shared.with_core(|core| core.switch_camera())
    }

    pub fn toggle_speaker(&self, enable: bool) -> Result<(), ParleyError> {
        self.shared.with_core(|core| {
            core.speakerphone = enable;
            if core.session.is_some() {
                core.engine.set_speakerphone(enable);
            }
            tracing::info!(enable, "speakerphone toggled");
        });
        Ok(())
    }

    /// Show the local preview again after `pause_local_video_track`.
    pub fn reattach_local_video_track(&self) -> Result<(), ParleyError> {
        self.shared.with_core(|core| {
            if core.session.is_some() {
                core.tracks.show_preview(&core.views);
            }
        });
        Ok(())
    }

    /// Take the local video off the local view without touching capture or
    /// the publication.
    pub fn pause_local_video_track(&self) -> Result<(), ParleyError> {
        self.shared.with_core(|core| {
            if core.session.is_some() {
                core.tracks.hide_preview(&core.views);
            }
        });
        Ok(())
    }
}

impl Shared {
    fn with_core<R>(&self, f: impl FnOnce(&mut SessionCore) -> R) -> R {
        let result = {
            let mut core = self.core.lock().unwrap();
            let result = f(&mut core);
            self.drain_inbox(&mut core);
            result
        };
        self.drain_after_unlock();
        result
    }

    fn drain_inbox(&self, core: &mut SessionCore) {
        loop {
            // Pop under the inbox lock only; handling may queue more.
            let next = self.inbox.lock().unwrap().pop_front();
            match next {
                Some((generation, event)) => core.handle(generation, event),
                None => return,
            }
        }
    }

    /// Handle queued events unless another holder of the state lock will.
    fn drain_after_unlock(&self) {
        while !self.inbox.lock().unwrap().is_empty() {
            let mut core = match self.core.try_lock() {
                Ok(core) => core,
                Err(TryLockError::WouldBlock) => return,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            };
            self.drain_inbox(&mut core);
        }
    }
}

impl EngineEventSink for Shared {
    fn deliver(&self, generation: u64, event: SessionEvent) {
        self.inbox.lock().unwrap().push_back((generation, event));
        self.drain_after_unlock();
    }
}

impl SessionCore {
    fn connect(
        &mut self,
        token: &str,
        room_name: &str,
        sink: Weak<dyn EngineEventSink>,
    ) -> Result<(), ParleyError> {
        if self.state != SessionState::Idle {
            tracing::warn!(state = ?self.state, "connect rejected, session active");
            return Err(ParleyError::AlreadyConnected);
        }

        self.devices.refresh(self.capture.cameras());
        let camera = self.devices.select_default(self.settings.prefer_front_camera);
        let media = self.tracks.start_local_media(
            self.settings.publish_audio_on_join,
            self.settings.publish_video_on_join,
            camera,
        );
        self.devices.set_active(self.tracks.camera().cloned());

        if let Some(e) = &media.audio_error {
            self.emitter.emit(ParleyEvent::LocalAudioFailed {
                error: e.to_string(),
            });
        }
        if let Some(e) = &media.video_error {
            self.emitter.emit(ParleyEvent::LocalVideoFailed {
                error: e.to_string(),
            });
        }
        self.tracks.show_preview(&self.views);

        self.generation += 1;
        let generation = self.generation;
        self.session = Some(ActiveSession {
            generation,
            room: room_name.to_string(),
        });
        self.state = SessionState::Connecting;
        for track in [&media.audio, &media.video].into_iter().flatten() {
            self.tracks.note_published(track);
        }

        tracing::info!(room = room_name, generation, "connecting");
        self.engine.set_speakerphone(self.speakerphone);
        self.engine.connect(
            ConnectRequest {
                token: token.to_string(),
                room_name: room_name.to_string(),
                audio: media.audio,
                video: media.video,
            },
            EngineEvents::new(generation, sink),
        );
        Ok(())
    }

    /// Release local media, then clear views and participants. Returns the
    /// room name of the session that ended.
    fn teardown(&mut self) -> String {
        self.tracks.shutdown(&self.views);
        self.views.clear_all();
        self.participants.clear();
        self.devices.set_active(None);
        self.state = SessionState::Idle;
        let room = self.session.take().map(|s| s.room).unwrap_or_default();
        tracing::info!(room = %room, "session torn down");
        room
    }

    fn room(&self) -> String {
        self.session
            .as_ref()
            .map(|s| s.room.clone())
            .unwrap_or_default()
    }

    fn is_live(&self) -> bool {
        matches!(
            self.state,
            SessionState::Connected | SessionState::Reconnecting
        )
    }

    fn set_audio_enabled(&mut self, enabled: bool) {
        if self.session.is_none() {
            tracing::debug!(enabled, "audio toggle while idle");
            return;
        }
        let Some(track) = self.tracks.audio_track().cloned() else {
            tracing::debug!(enabled, "audio toggle without local audio");
            return;
        };
        self.tracks.set_enabled(&track, enabled);
        self.refresh_local_publication(&track);
    }

    fn enable_video(&mut self) -> Result<(), ParleyError> {
        if self.session.is_none() {
            tracing::debug!("enable_video while idle");
            return Ok(());
        }

        let track = match self.tracks.video_track().cloned() {
            Some(track) => {
                self.tracks.set_enabled(&track, true);
                track
            }
            None => {
                if self.devices.devices().is_empty() {
                    self.devices.refresh(self.capture.cameras());
                }
                let camera = match self.devices.active() {
                    Some(active) => Ok(active.clone()),
                    None => self.devices.select_default(self.settings.prefer_front_camera),
                };
                match camera.and_then(|camera| self.tracks.start_video(camera)) {
                    Ok(track) => {
                        self.devices.set_active(self.tracks.camera().cloned());
                        track
                    }
                    Err(e) => {
                        tracing::warn!("enable_video failed: {e}");
                        self.emitter.emit(ParleyEvent::LocalVideoFailed {
                            error: e.to_string(),
                        });
                        return Err(e.into());
                    }
                }
            }
        };

        self.tracks.show_preview(&self.views);
        if self.is_live() {
            self.tracks.publish(&track);
        }
        self.refresh_local_publication(&track);
        Ok(())
    }

    fn disable_video(&mut self) {
        if self.session.is_none() {
            tracing::debug!("disable_video while idle");
            return;
        }
        let Some(track) = self.tracks.video_track().cloned() else {
            tracing::debug!("disable_video without local video");
            return;
        };
        self.tracks.set_enabled(&track, false);
        self.tracks.hide_preview(&self.views);
        self.refresh_local_publication(&track);
    }

    fn switch_camera(&mut self) -> Result<(), ParleyError> {
        if self.session.is_none() {
            tracing::debug!("switch_camera while idle");
            return Ok(());
        }
        let Some(old) = self.tracks.video_track().cloned() else {
            tracing::debug!("switch_camera without local video");
            return Ok(());
        };
        let Some(current) = self
            .devices
            .active()
            .or(self.tracks.camera())
            .cloned()
        else {
            return Ok(());
        };

        let next = self.devices.next(&current)?;
        self.tracks.switch_camera(next.clone(), &self.views)?;
        self.devices.set_active(Some(next));

        if let Some(new) = self.tracks.video_track().cloned() {
            if new != old && self.participants.remove_local_publication(&old).is_some() {
                tracing::debug!(old_sid = %old.sid(), "local publication replaced");
            }
        }
        Ok(())
    }

    fn refresh_local_publication(&mut self, track: &TrackHandle) {
        let known = self
            .participants
            .local_publications()
            .any(|p| p.sid == track.sid());
        if known {
            let enabled = self.tracks.is_enabled(track);
            self.participants.add_local_publication(track, enabled);
        }
    }

    fn handle(&mut self, generation: u64, event: SessionEvent) {
        let current = self.session.as_ref().map(|s| s.generation);
        if current != Some(generation) {
            tracing::debug!(generation, ?current, "dropping stale engine event");
            return;
        }

        match event {
            SessionEvent::Connected {
                room,
                local_identity,
                participants,
            } => self.on_connected(room, local_identity, participants),
            SessionEvent::ConnectFailed { error } => {
                if self.state != SessionState::Connecting {
                    tracing::debug!(state = ?self.state, "connect failure outside connecting");
                    return;
                }
                tracing::warn!("connection failed: {error}");
                self.teardown();
                self.emitter.emit(ParleyEvent::ConnectionFailed { error });
            }
            SessionEvent::Disconnected { error } => {
                tracing::info!(?error, "room disconnected by engine");
                let room = self.teardown();
                self.emitter.emit(ParleyEvent::RoomDisconnected { room });
            }
            SessionEvent::Reconnecting { error } => {
                if !self.is_live() {
                    tracing::debug!(state = ?self.state, "reconnecting outside a live session");
                    return;
                }
                tracing::warn!("reconnecting: {error}");
                self.state = SessionState::Reconnecting;
                self.emitter.emit(ParleyEvent::Reconnecting { error });
            }
            SessionEvent::Reconnected => {
                if self.state != SessionState::Reconnecting {
                    tracing::debug!(state = ?self.state, "reconnected without reconnecting");
                    return;
                }
                tracing::info!("reconnected");
                self.state = SessionState::Connected;
                self.emitter.emit(ParleyEvent::Reconnected { room: self.room() });
            }
            SessionEvent::ParticipantConnected(snapshot) => self.on_participant(snapshot),
            SessionEvent::ParticipantDisconnected { identity } => {
                if self.participants.remove_participant(&identity).is_none() {
                    tracing::debug!(identity = %identity, "unknown participant left");
                    return;
                }
                tracing::info!(identity = %identity, "participant disconnected");
                self.views.clear_pending(ViewId::remote(identity.clone()));
                self.emitter
                    .emit(ParleyEvent::ParticipantDisconnected { identity });
            }
            SessionEvent::TrackPublished {
                identity,
                publication,
            } => self.on_track_published(identity, publication),
            SessionEvent::TrackUnpublished {
                identity,
                publication_sid,
            } => self.on_track_unpublished(identity, &publication_sid),
            SessionEvent::TrackSubscribed {
                identity,
                publication_sid,
                track,
            } => self.on_track_subscribed(identity, publication_sid, track),
            SessionEvent::TrackUnsubscribed {
                identity,
                publication_sid,
                track,
            } => self.on_track_unsubscribed(identity, &publication_sid, track),
            SessionEvent::TrackSubscriptionFailed {
                identity,
                publication_sid,
                error,
            } => {
                tracing::warn!(
                    identity = %identity,
                    publication_sid = %publication_sid,
                    "subscription failed: {error}"
                );
            }
            SessionEvent::TrackEnabled {
                identity,
                publication_sid,
            } => self.on_track_flag(identity, &publication_sid, true),
            SessionEvent::TrackDisabled {
                identity,
                publication_sid,
            } => self.on_track_flag(identity, &publication_sid, false),
            SessionEvent::LocalTrackPublished { track } => {
                if !self.tracks.is_published(&track) {
                    tracing::debug!(track_sid = %track.sid(), "publication of a retired track");
                    return;
                }
                let enabled = self.tracks.is_enabled(&track);
                self.participants.add_local_publication(&track, enabled);
                tracing::info!(track_sid = %track.sid(), "local track published");
                match track.kind() {
                    TrackKind::Audio => self.emitter.emit(ParleyEvent::LocalAudioPublished),
                    TrackKind::Video => self.emitter.emit(ParleyEvent::LocalVideoPublished),
                    TrackKind::Data => {}
                }
            }
            SessionEvent::LocalTrackPublicationFailed { track, error } => {
                tracing::warn!(track_sid = %track.sid(), "local publication failed: {error}");
                self.tracks.note_publication_failed(&track);
                match track.kind() {
                    TrackKind::Audio => {
                        self.emitter.emit(ParleyEvent::LocalAudioFailed { error })
                    }
                    TrackKind::Video => {
                        self.emitter.emit(ParleyEvent::LocalVideoFailed { error })
                    }
                    TrackKind::Data => {}
                }
            }
            SessionEvent::RecordingStarted => {
                tracing::info!("recording started");
                self.emitter
                    .emit(ParleyEvent::RecordingStarted { room: self.room() });
            }
            SessionEvent::RecordingStopped => {
                tracing::info!("recording stopped");
                self.emitter
                    .emit(ParleyEvent::RecordingStopped { room: self.room() });
            }
        }
    }

    fn on_connected(
        &mut self,
        room: String,
        local_identity: String,
        participants: Vec<ParticipantSnapshot>,
    ) {
        if self.state != SessionState::Connecting {
            tracing::debug!(state = ?self.state, "connected callback outside connecting");
            return;
        }
        tracing::info!(
            room = %room,
            local_identity = %local_identity,
            participants = participants.len(),
            "room connected"
        );
        self.state = SessionState::Connected;
        self.participants.set_local_identity(local_identity);
        self.emitter.emit(ParleyEvent::RoomConnected { room: self.room() });

        // Participants that joined during the handshake only show up here.
        for snapshot in participants {
            self.on_participant(snapshot);
        }

        for track in self.tracks.unpublished() {
            self.tracks.publish(&track);
        }
    }

    fn on_participant(&mut self, snapshot: ParticipantSnapshot) {
        let identity = snapshot.identity.clone();
        if self.participants.add_participant(snapshot) {
            tracing::info!(identity = %identity, "participant connected");
            self.emitter
                .emit(ParleyEvent::ParticipantConnected { identity: identity.clone() });
        }
        let renderable: Vec<TrackHandle> = self
            .participants
            .participant(&identity)
            .into_iter()
            .flat_map(|p| p.publications())
            .filter_map(renderable_track)
            .collect();
        for track in renderable {
            self.views.attach(ViewId::remote(identity.clone()), track);
        }
    }

    fn on_track_published(&mut self, identity: String, publication: Publication) {
        let kind = publication.kind;
        let sid = publication.sid.clone();
        let participant = self.participants.participant_entry(&identity);
        let before = participant.publication(&sid).and_then(renderable_track);
        let after = renderable_track(participant.upsert_publication(publication));
        tracing::info!(identity = %identity, publication_sid = %sid, ?kind, "track published");

        if kind == TrackKind::Audio {
            self.emitter.emit(ParleyEvent::AudioPublished {
                identity: identity.clone(),
            });
        }
        self.sync_video(&identity, before, after);
    }

    fn on_track_unpublished(&mut self, identity: String, publication_sid: &str) {
        let Some(removed) = self
            .participants
            .participant_mut(&identity)
            .and_then(|p| p.remove_publication(publication_sid))
        else {
            tracing::debug!(identity = %identity, publication_sid, "unknown publication unpublished");
            return;
        };
        tracing::info!(identity = %identity, publication_sid, "track unpublished");

        let before = renderable_track(&removed);
        if let Some(track) = removed.track.clone().filter(|t| t.is_video()) {
            if before.as_ref() != Some(&track) {
                self.views.detach(ViewId::remote(identity.clone()), track);
            }
        }
        self.sync_video(&identity, before, None);

        match removed.kind {
            TrackKind::Audio => self.emitter.emit(ParleyEvent::AudioUnpublished { identity }),
            TrackKind::Video => self.emitter.emit(ParleyEvent::VideoUnpublished { identity }),
            TrackKind::Data => {}
        }
    }

    fn on_track_subscribed(&mut self, identity: String, publication_sid: String, track: TrackHandle) {
        let participant = self.participants.participant_entry(&identity);
        if participant.publication(&publication_sid).is_none() {
            participant.upsert_publication(Publication::new(
                publication_sid.clone(),
                track.kind(),
                true,
            ));
        }
        let Some(publication) = participant.publication_mut(&publication_sid) else {
            return;
        };
        let before = renderable_track(publication);
        let previous = publication.track.replace(track.clone());
        let after = renderable_track(publication);
        tracing::info!(
            identity = %identity,
            publication_sid = %publication_sid,
            track_sid = %track.sid(),
            "track subscribed"
        );

        // A different track on the same slot must leave the view first.
        if let Some(previous) = previous.filter(|p| p != &track && p.is_video()) {
            if before.as_ref() != Some(&previous) {
                self.views.detach(ViewId::remote(identity.clone()), previous);
            }
        }
        self.sync_video(&identity, before, after);
    }

    fn on_track_unsubscribed(&mut self, identity: String, publication_sid: &str, track: TrackHandle) {
        let Some(publication) = self
            .participants
            .participant_mut(&identity)
            .and_then(|p| p.publication_mut(publication_sid))
        else {
            tracing::debug!(identity = %identity, publication_sid, "unknown publication unsubscribed");
            if track.is_video() {
                self.views.detach(ViewId::remote(identity), track);
            }
            return;
        };
        let before = renderable_track(publication);
        if publication.track.as_ref() == Some(&track) {
            publication.track = None;
        }
        let after = renderable_track(publication);
        tracing::info!(identity = %identity, publication_sid, "track unsubscribed");

        if track.is_video() && before.as_ref() != Some(&track) {
            self.views.detach(ViewId::remote(identity.clone()), track);
        }
        self.sync_video(&identity, before, after);
    }

    fn on_track_flag(&mut self, identity: String, publication_sid: &str, enabled: bool) {
        let Some(publication) = self
            .participants
            .participant_mut(&identity)
            .and_then(|p| p.publication_mut(publication_sid))
        else {
            tracing::debug!(identity = %identity, publication_sid, enabled, "flag on unknown publication");
            return;
        };
        let changed = publication.enabled != enabled;
        let before = renderable_track(publication);
        publication.enabled = enabled;
        let after = renderable_track(publication);
        let kind = publication.kind;
        tracing::info!(identity = %identity, publication_sid, enabled, "remote track flag");

        match kind {
            TrackKind::Audio if changed => {
                let event = if enabled {
                    ParleyEvent::AudioEnabled { identity }
                } else {
                    ParleyEvent::AudioDisabled { identity }
                };
                self.emitter.emit(event);
            }
            TrackKind::Video => self.sync_video(&identity, before, after),
            _ => {}
        }
    }

    /// Move the remote view from the renderable track `before` to `after`
    /// and report visibility changes.
    fn sync_video(&mut self, identity: &str, before: Option<TrackHandle>, after: Option<TrackHandle>) {
        if before == after {
            return;
        }
        let view = ViewId::remote(identity);
        if let Some(old) = &before {
            self.views.detach(view.clone(), old.clone());
        }
        if let Some(new) = &after {
            self.views.attach(view, new.clone());
        }

        let identity = identity.to_string();
        match (before.is_some(), after.is_some()) {
            (false, true) => self.emitter.emit(ParleyEvent::VideoEnabled { identity }),
            (true, false) => self.emitter.emit(ParleyEvent::VideoDisabled { identity }),
            _ => {}
        }
    }
}

fn renderable_track(publication: &Publication) -> Option<TrackHandle> {
    publication
        .is_renderable()
        .then(|| publication.track.clone())
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use crate::devices::{CameraDevice, CameraFacing};
    use crate::dispatch::InlineExecutor;
    use crate::engine::SourceSwitch;
    use crate::errors::DeviceError;

    #[derive(Default)]
    struct StubEngine {
        events: StdMutex<Option<EngineEvents>>,
        speaker: StdMutex<Vec<bool>>,
    }

    impl MediaEngine for StubEngine {
        fn connect(&self, _request: ConnectRequest, events: EngineEvents) {
            *self.events.lock().unwrap() = Some(events);
        }
        fn disconnect(&self) {}
        fn publish(&self, _track: &TrackHandle) {}
        fn unpublish(&self, _track: &TrackHandle) {}
        fn set_speakerphone(&self, enabled: bool) {
            self.speaker.lock().unwrap().push(enabled);
        }
    }

    struct StubCapture;

    impl CaptureBackend for StubCapture {
        fn cameras(&self) -> Vec<CameraDevice> {
            vec![CameraDevice::new("front", CameraFacing::Front)]
        }
        fn start_audio(&self, _track: &TrackHandle) -> Result<(), DeviceError> {
            Ok(())
        }
        fn start_video(&self, _track: &TrackHandle, _camera: &DeviceId) -> Result<(), DeviceError> {
            Ok(())
        }
        fn set_enabled(&self, _track: &TrackHandle, _enabled: bool) {}
        fn switch_source(
            &self,
            _track: &TrackHandle,
            _camera: &DeviceId,
        ) -> Result<SourceSwitch, DeviceError> {
            Ok(SourceSwitch::InPlace)
        }
        fn release(&self, _track: &TrackHandle) {}
        fn stop_capture(&self) {}
    }

    fn manager() -> (SessionManager, Arc<StubEngine>) {
        let engine = Arc::new(StubEngine::default());
        let session = SessionManager::new(
            engine.clone(),
            Arc::new(StubCapture),
            Arc::new(InlineExecutor),
            SessionSettings::default(),
        );
        (session, engine)
    }

    fn events(engine: &StubEngine) -> EngineEvents {
        engine.events.lock().unwrap().clone().unwrap()
    }

    #[test]
    fn starts_idle() {
        let (session, _) = manager();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.room_name().is_none());
    }

    #[test]
    fn connect_rejects_empty_arguments() {
        let (session, _) = manager();
        assert!(matches!(
            session.connect("", "room"),
            Err(ParleyError::ArgumentInvalid(_))
        ));
        assert!(matches!(
            session.connect("tok", "  "),
            Err(ParleyError::ArgumentInvalid(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn connect_moves_to_connecting_with_local_media() {
        let (session, engine) = manager();
        session.connect("tok", "standup").unwrap();
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.room_name().as_deref(), Some("standup"));
        assert!(session.local_audio_track().is_some());
        assert!(session.local_video_track().is_some());
        assert_eq!(session.active_camera(), Some(DeviceId::from("front")));
        assert_eq!(*engine.speaker.lock().unwrap(), vec![true]);
    }

    #[test]
    fn second_connect_is_rejected() {
        let (session, _) = manager();
        session.connect("tok", "a").unwrap();
        assert!(matches!(
            session.connect("tok", "b"),
            Err(ParleyError::AlreadyConnected)
        ));
        assert_eq!(session.room_name().as_deref(), Some("a"));
    }

    #[test]
    fn connected_callback_sets_state_and_identity() {
        let (session, engine) = manager();
        let mut stream = session.subscribe();
        session.connect("tok", "standup").unwrap();
        events(&engine).send(SessionEvent::Connected {
            room: "standup".into(),
            local_identity: "me".into(),
            participants: vec![],
        });
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.local_identity().as_deref(), Some("me"));
        assert_eq!(
            stream.drain(),
            vec![ParleyEvent::RoomConnected { room: "standup".into() }]
        );
    }

    #[test]
    fn reconnect_cycle_keeps_state() {
        let (session, engine) = manager();
        session.connect("tok", "standup").unwrap();
        let events = events(&engine);
        events.send(SessionEvent::Connected {
            room: "standup".into(),
            local_identity: "me".into(),
            participants: vec![ParticipantSnapshot::new("alice")],
        });
        events.send(SessionEvent::Reconnecting { error: "net".into() });
        assert_eq!(session.state(), SessionState::Reconnecting);
        assert_eq!(session.participants(), vec!["alice".to_string()]);
        events.send(SessionEvent::Reconnected);
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.local_video_track().is_some());
    }

    #[test]
    fn toggle_speaker_while_idle_only_records() {
        let (session, engine) = manager();
        session.toggle_speaker(false).unwrap();
        assert!(!session.speakerphone());
        assert!(engine.speaker.lock().unwrap().is_empty());
    }

    #[test]
    fn session_state_serialises_snake_case() {
        assert_eq!(
            serde_json::to_value(SessionState::Reconnecting).unwrap(),
            serde_json::json!("reconnecting")
        );
    }

    #[test]
    fn renderable_track_requires_enabled_video_with_track() {
        let mut publication = Publication::new("PV", TrackKind::Video, true);
        assert!(renderable_track(&publication).is_none());
        publication.track = Some(TrackHandle::remote("TV", TrackKind::Video));
        assert!(renderable_track(&publication).is_some());
        publication.enabled = false;
        assert!(renderable_track(&publication).is_none());
    }
}

//! Media engine and capture backend on top of the LiveKit SDK.
//!
//! Local capture is frame-push: the host feeds camera and microphone
//! frames into the native sources returned by [`LiveKitEngine::audio_source`]
//! and [`LiveKitEngine::video_source`]. Which physical camera produces those
//! frames is the host's business, so camera switches happen in place.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use livekit::id::TrackSid;
use livekit::options::TrackPublishOptions;
use livekit::participant::Participant;
use livekit::prelude::{Room, RoomEvent, RoomOptions, RemoteParticipant};
use livekit::publication::RemoteTrackPublication;
use livekit::track::{
    LocalAudioTrack, LocalTrack, LocalVideoTrack, RemoteTrack, RemoteVideoTrack,
    TrackKind as LkTrackKind, TrackSource as LkTrackSource,
};
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::prelude::{AudioSourceOptions, RtcAudioSource, RtcVideoSource, VideoResolution};
use livekit::webrtc::video_source::native::NativeVideoSource;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::devices::{CameraDevice, DeviceId};
use crate::engine::{
    CaptureBackend, ConnectRequest, EngineEvents, MediaEngine, ParticipantSnapshot,
    SessionEvent, SourceSwitch,
};
use crate::errors::DeviceError;
use crate::media::{Publication, TrackHandle, TrackKind};

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHANNELS: u32 = 1;
const AUDIO_QUEUE_SIZE_MS: u32 = 100;

const VIDEO_WIDTH: u32 = 1280;
const VIDEO_HEIGHT: u32 = 720;

struct LocalSlot {
    track: LocalTrack,
    audio_source: Option<NativeAudioSource>,
    video_source: Option<NativeVideoSource>,
}

#[derive(Default)]
struct Inner {
    room: Option<Arc<Room>>,
    events: Option<EngineEvents>,
    event_task: Option<JoinHandle<()>>,
    local: HashMap<String, LocalSlot>,
    /// Our local track sid to the sid LiveKit assigned on publish.
    published: HashMap<String, TrackSid>,
    remote_video: HashMap<String, RemoteVideoTrack>,
}

pub struct LiveKitEngine {
    url: String,
    runtime: Handle,
    cameras: Vec<CameraDevice>,
    inner: Arc<Mutex<Inner>>,
}

impl LiveKitEngine {
    /// `cameras` is what the host can capture from; LiveKit itself does
    /// not enumerate devices.
    pub fn new(url: impl Into<String>, runtime: Handle, cameras: Vec<CameraDevice>) -> Self {
        Self {
            url: url.into(),
            runtime,
            cameras,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Source to push microphone PCM into.
    pub fn audio_source(&self, track: &TrackHandle) -> Option<NativeAudioSource> {
        let inner = self.inner.lock().unwrap();
        inner.local.get(track.sid())?.audio_source.clone()
    }

    /// Source to push camera frames into.
    pub fn video_source(&self, track: &TrackHandle) -> Option<NativeVideoSource> {
        let inner = self.inner.lock().unwrap();
        inner.local.get(track.sid())?.video_source.clone()
    }

    /// The subscribed remote video track behind a handle, for renderers.
    pub fn remote_video_track(&self, track: &TrackHandle) -> Option<RemoteVideoTrack> {
        self.inner
            .lock()
            .unwrap()
            .remote_video
            .get(track.sid())
            .cloned()
    }

    async fn publish_local(
        inner: &Arc<Mutex<Inner>>,
        room: &Room,
        handle: TrackHandle,
        events: &EngineEvents,
    ) {
        let track = {
            let inner = inner.lock().unwrap();
            match inner.local.get(handle.sid()) {
                Some(slot) => slot.track.clone(),
                None => {
                    tracing::debug!(track_sid = %handle.sid(), "publish of released track skipped");
                    return;
                }
            }
        };
        let source = match handle.kind() {
            TrackKind::Audio => LkTrackSource::Microphone,
            _ => LkTrackSource::Camera,
        };

        let result = room
            .local_participant()
            .publish_track(
                track,
                TrackPublishOptions {
                    source,
                    ..Default::default()
                },
            )
            .await;

        match result {
            Ok(publication) => {
                inner
                    .lock()
                    .unwrap()
                    .published
                    .insert(handle.sid().to_string(), publication.sid());
                tracing::info!(track_sid = %handle.sid(), "livekit track published");
                events.send(SessionEvent::LocalTrackPublished { track: handle });
            }
            Err(e) => {
                tracing::warn!(track_sid = %handle.sid(), "livekit publish failed: {e}");
                events.send(SessionEvent::LocalTrackPublicationFailed {
                    track: handle,
                    error: e.to_string(),
                });
            }
        }
    }

    async fn event_loop(
        mut rx: UnboundedReceiver<RoomEvent>,
        events: EngineEvents,
        inner: Arc<Mutex<Inner>>,
    ) {
        while let Some(event) = rx.recv().await {
            match event {
                RoomEvent::ParticipantConnected(participant) => {
                    let snapshot = snapshot_of(&participant, &inner);
                    events.send(SessionEvent::ParticipantConnected(snapshot));
                }

                RoomEvent::ParticipantDisconnected(participant) => {
                    events.send(SessionEvent::ParticipantDisconnected {
                        identity: participant.identity().to_string(),
                    });
                }

                RoomEvent::TrackPublished {
                    publication,
                    participant,
                } => {
                    events.send(SessionEvent::TrackPublished {
                        identity: participant.identity().to_string(),
                        publication: publication_of(&publication),
                    });
                }

                RoomEvent::TrackUnpublished {
                    publication,
                    participant,
                } => {
                    events.send(SessionEvent::TrackUnpublished {
                        identity: participant.identity().to_string(),
                        publication_sid: publication.sid().to_string(),
                    });
                }

                RoomEvent::TrackSubscribed {
                    track,
                    publication,
                    participant,
                } => {
                    let kind = kind_of(publication.kind());
                    let track_sid = track.sid().to_string();
                    if let RemoteTrack::Video(video) = &track {
                        inner
                            .lock()
                            .unwrap()
                            .remote_video
                            .insert(track_sid.clone(), video.clone());
                    }
                    events.send(SessionEvent::TrackSubscribed {
                        identity: participant.identity().to_string(),
                        publication_sid: publication.sid().to_string(),
                        track: TrackHandle::remote(track_sid, kind),
                    });
                }

                RoomEvent::TrackUnsubscribed {
                    track,
                    publication,
                    participant,
                } => {
                    let kind = kind_of(publication.kind());
                    let track_sid = track.sid().to_string();
                    inner.lock().unwrap().remote_video.remove(&track_sid);
                    events.send(SessionEvent::TrackUnsubscribed {
                        identity: participant.identity().to_string(),
                        publication_sid: publication.sid().to_string(),
                        track: TrackHandle::remote(track_sid, kind),
                    });
                }

                RoomEvent::TrackSubscriptionFailed {
                    participant,
                    error,
                    track_sid,
                } => {
                    events.send(SessionEvent::TrackSubscriptionFailed {
                        identity: participant.identity().to_string(),
                        publication_sid: track_sid.to_string(),
                        error: error.to_string(),
                    });
                }

                RoomEvent::TrackMuted {
                    participant,
                    publication,
                } => {
                    if let Participant::Remote(remote) = participant {
                        events.send(SessionEvent::TrackDisabled {
                            identity: remote.identity().to_string(),
                            publication_sid: publication.sid().to_string(),
                        });
                    }
                }

                RoomEvent::TrackUnmuted {
                    participant,
                    publication,
                } => {
                    if let Participant::Remote(remote) = participant {
                        events.send(SessionEvent::TrackEnabled {
                            identity: remote.identity().to_string(),
                            publication_sid: publication.sid().to_string(),
                        });
                    }
                }

                RoomEvent::Reconnecting => {
                    events.send(SessionEvent::Reconnecting {
                        error: "signal connection lost".into(),
                    });
                }

                RoomEvent::Reconnected => {
                    events.send(SessionEvent::Reconnected);
                }

                RoomEvent::Disconnected { reason } => {
                    tracing::info!("livekit room disconnected: {reason:?}");
                    {
                        let mut inner = inner.lock().unwrap();
                        let current = inner.events.as_ref().map(EngineEvents::generation);
                        if current == Some(events.generation()) {
                            inner.room = None;
                            inner.events = None;
                            inner.remote_video.clear();
                            inner.published.clear();
                        }
                    }
                    events.send(SessionEvent::Disconnected {
                        error: Some(format!("{reason:?}")),
                    });
                    break;
                }

                other => {
                    tracing::debug!("unhandled room event: {other:?}");
                }
            }
        }
        tracing::info!("livekit event loop ended");
    }
}

impl MediaEngine for LiveKitEngine {
    fn connect(&self, request: ConnectRequest, events: EngineEvents) {
        let inner = self.inner.clone();
        let url = self.url.clone();
        inner.lock().unwrap().events = Some(events.clone());

        let task = self.runtime.spawn(async move {
            let mut options = RoomOptions::default();
            options.auto_subscribe = true;

            let (room, rx) = match Room::connect(&url, &request.token, options).await {
                Ok(connected) => connected,
                Err(e) => {
                    tracing::warn!("livekit connect failed: {e}");
                    events.send(SessionEvent::ConnectFailed {
                        error: e.to_string(),
                    });
                    return;
                }
            };
            let room = Arc::new(room);

            let participants = room
                .remote_participants()
                .values()
                .map(|p| snapshot_of(p, &inner))
                .collect();
            let superseded = {
                let mut guard = inner.lock().unwrap();
                let current = guard.events.as_ref().map(EngineEvents::generation);
                if current == Some(events.generation()) {
                    guard.room = Some(room.clone());
                    false
                } else {
                    true
                }
            };
            if superseded {
                tracing::info!("connect superseded, closing room");
                if let Err(e) = room.close().await {
                    tracing::warn!("error closing room: {e}");
                }
                return;
            }

            events.send(SessionEvent::Connected {
                room: room.name(),
                local_identity: room.local_participant().identity().to_string(),
                participants,
            });

            for track in [request.audio, request.video].into_iter().flatten() {
                Self::publish_local(&inner, &room, track, &events).await;
            }

            Self::event_loop(rx, events, inner).await;
        });

        if let Some(previous) = self.inner.lock().unwrap().event_task.replace(task) {
            previous.abort();
        }
    }

    fn disconnect(&self) {
        let (room, task) = {
            let mut inner = self.inner.lock().unwrap();
            inner.events = None;
            inner.published.clear();
            inner.remote_video.clear();
            (inner.room.take(), inner.event_task.take())
        };
        if let Some(task) = task {
            task.abort();
        }
        if let Some(room) = room {
            self.runtime.spawn(async move {
                if let Err(e) = room.close().await {
                    tracing::warn!("error closing room: {e}");
                }
            });
        }
        tracing::info!("livekit disconnect requested");
    }

    fn publish(&self, track: &TrackHandle) {
        let (room, events) = {
            let inner = self.inner.lock().unwrap();
            (inner.room.clone(), inner.events.clone())
        };
        let (Some(room), Some(events)) = (room, events) else {
            tracing::debug!(track_sid = %track.sid(), "publish without a room");
            return;
        };
        let inner = self.inner.clone();
        let track = track.clone();
        self.runtime.spawn(async move {
            Self::publish_local(&inner, &room, track, &events).await;
        });
    }

    fn unpublish(&self, track: &TrackHandle) {
        let (room, lk_sid) = {
            let mut inner = self.inner.lock().unwrap();
            (inner.room.clone(), inner.published.remove(track.sid()))
        };
        let (Some(room), Some(lk_sid)) = (room, lk_sid) else {
            return;
        };
        self.runtime.spawn(async move {
            if let Err(e) = room.local_participant().unpublish_track(&lk_sid).await {
                tracing::warn!("unpublish {lk_sid:?} failed: {e}");
            }
        });
    }

    fn set_speakerphone(&self, enabled: bool) {
        // Audio routing belongs to the host's audio session.
        tracing::debug!(enabled, "speakerphone preference");
    }
}

impl CaptureBackend for LiveKitEngine {
    fn cameras(&self) -> Vec<CameraDevice> {
        self.cameras.clone()
    }

    fn start_audio(&self, track: &TrackHandle) -> Result<(), DeviceError> {
        let source = NativeAudioSource::new(
            AudioSourceOptions {
                echo_cancellation: true,
                noise_suppression: true,
                auto_gain_control: true,
            },
            AUDIO_SAMPLE_RATE,
            AUDIO_CHANNELS,
            AUDIO_QUEUE_SIZE_MS,
        );
        let lk_track =
            LocalAudioTrack::create_audio_track("microphone", RtcAudioSource::Native(source.clone()));
        self.inner.lock().unwrap().local.insert(
            track.sid().to_string(),
            LocalSlot {
                track: LocalTrack::Audio(lk_track),
                audio_source: Some(source),
                video_source: None,
            },
        );
        Ok(())
    }

    fn start_video(&self, track: &TrackHandle, camera: &DeviceId) -> Result<(), DeviceError> {
        if !self.cameras.iter().any(|c| &c.id == camera) {
            return Err(DeviceError::CaptureUnavailable(format!("unknown camera {camera}")));
        }
        let source = NativeVideoSource::new(
            VideoResolution {
                width: VIDEO_WIDTH,
                height: VIDEO_HEIGHT,
            },
            false,
        );
        let lk_track =
            LocalVideoTrack::create_video_track("camera", RtcVideoSource::Native(source.clone()));
        self.inner.lock().unwrap().local.insert(
            track.sid().to_string(),
            LocalSlot {
                track: LocalTrack::Video(lk_track),
                audio_source: None,
                video_source: Some(source),
            },
        );
        tracing::debug!(camera = %camera, "livekit video source created");
        Ok(())
    }

    fn set_enabled(&self, track: &TrackHandle, enabled: bool) {
        let inner = self.inner.lock().unwrap();
        let Some(slot) = inner.local.get(track.sid()) else {
            return;
        };
        if enabled {
            slot.track.unmute();
        } else {
            slot.track.mute();
        }
    }

    fn switch_source(
        &self,
        _track: &TrackHandle,
        camera: &DeviceId,
    ) -> Result<SourceSwitch, DeviceError> {
        if !self.cameras.iter().any(|c| &c.id == camera) {
            return Err(DeviceError::CaptureUnavailable(format!("unknown camera {camera}")));
        }
        Ok(SourceSwitch::InPlace)
    }

    fn release(&self, track: &TrackHandle) {
        self.inner.lock().unwrap().local.remove(track.sid());
    }

    fn stop_capture(&self) {
        self.inner.lock().unwrap().local.clear();
    }
}

fn kind_of(kind: LkTrackKind) -> TrackKind {
    match kind {
        LkTrackKind::Audio => TrackKind::Audio,
        LkTrackKind::Video => TrackKind::Video,
    }
}

fn publication_of(publication: &RemoteTrackPublication) -> Publication {
    let kind = kind_of(publication.kind());
    let mut out = Publication::new(publication.sid().to_string(), kind, !publication.is_muted());
    out.track = publication
        .track()
        .map(|track| TrackHandle::remote(track.sid().to_string(), kind));
    out
}

fn snapshot_of(participant: &RemoteParticipant, inner: &Mutex<Inner>) -> ParticipantSnapshot {
    let mut snapshot = ParticipantSnapshot::new(participant.identity().to_string());
    for publication in participant.track_publications().values() {
        if let Some(RemoteTrack::Video(video)) = publication.track() {
            inner
                .lock()
                .unwrap()
                .remote_video
                .insert(video.sid().to_string(), video);
        }
        snapshot.publications.push(publication_of(publication));
    }
    snapshot
}

//! Fakes shared by the scenario tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use parley_core::{
    CameraDevice, CameraFacing, CaptureBackend, ConnectRequest, DeviceError, DeviceId,
    EngineEvents, InlineExecutor, MediaEngine, ParleyEvent, ParticipantSnapshot, Publication,
    SessionEvent, SessionManager, SessionSettings, SourceSwitch, TrackHandle, TrackKind,
    UiExecutor, VideoView,
};

/// Engine that records every call and hands the test the event handle.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<String>>,
    events: Mutex<Option<EngineEvents>>,
    requests: Mutex<Vec<ConnectRequest>>,
    /// Sent synchronously from inside `connect`.
    pub connect_reply: Mutex<Option<SessionEvent>>,
    /// Report `LocalTrackPublished` synchronously from inside `publish`.
    pub ack_publish: Mutex<bool>,
}

impl RecordingEngine {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn events(&self) -> EngineEvents {
        self.events
            .lock()
            .unwrap()
            .clone()
            .expect("engine was never asked to connect")
    }

    pub fn last_request(&self) -> Option<ConnectRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn send(&self, event: SessionEvent) {
        self.events().send(event);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MediaEngine for RecordingEngine {
    fn connect(&self, request: ConnectRequest, events: EngineEvents) {
        self.record(format!("connect:{}", request.room_name));
        self.requests.lock().unwrap().push(request);
        *self.events.lock().unwrap() = Some(events.clone());
        if let Some(reply) = self.connect_reply.lock().unwrap().take() {
            events.send(reply);
        }
    }

    fn disconnect(&self) {
        self.record("disconnect".into());
    }

    fn publish(&self, track: &TrackHandle) {
        self.record(format!("publish:{}", track.sid()));
        if *self.ack_publish.lock().unwrap() {
            let events = self.events.lock().unwrap().clone();
            if let Some(events) = events {
                events.send(SessionEvent::LocalTrackPublished {
                    track: track.clone(),
                });
            }
        }
    }

    fn unpublish(&self, track: &TrackHandle) {
        self.record(format!("unpublish:{}", track.sid()));
    }

    fn set_speakerphone(&self, enabled: bool) {
        self.record(format!("speaker:{enabled}"));
    }
}

/// Capture backend with scripted cameras and failures.
pub struct FakeCapture {
    pub cameras: Mutex<Vec<CameraDevice>>,
    pub fail_audio: Mutex<bool>,
    pub fail_video: Mutex<bool>,
    pub in_place: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl FakeCapture {
    pub fn new(cameras: Vec<CameraDevice>) -> Self {
        Self {
            cameras: Mutex::new(cameras),
            fail_audio: Mutex::new(false),
            fail_video: Mutex::new(false),
            in_place: Mutex::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_two_cameras() -> Self {
        Self::new(vec![
            CameraDevice::new("back", CameraFacing::Back),
            CameraDevice::new("front", CameraFacing::Front),
        ])
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("release:").map(str::to_string))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl CaptureBackend for FakeCapture {
    fn cameras(&self) -> Vec<CameraDevice> {
        self.cameras.lock().unwrap().clone()
    }

    fn start_audio(&self, track: &TrackHandle) -> Result<(), DeviceError> {
        if *self.fail_audio.lock().unwrap() {
            return Err(DeviceError::CaptureUnavailable("microphone busy".into()));
        }
        self.record(format!("start_audio:{}", track.sid()));
        Ok(())
    }

    fn start_video(&self, track: &TrackHandle, camera: &DeviceId) -> Result<(), DeviceError> {
        if *self.fail_video.lock().unwrap() {
            return Err(DeviceError::CaptureUnavailable("camera busy".into()));
        }
        self.record(format!("start_video:{}:{camera}", track.sid()));
        Ok(())
    }

    fn set_enabled(&self, track: &TrackHandle, enabled: bool) {
        self.record(format!("enabled:{}:{enabled}", track.sid()));
    }

    fn switch_source(
        &self,
        track: &TrackHandle,
        camera: &DeviceId,
    ) -> Result<SourceSwitch, DeviceError> {
        self.record(format!("switch:{}:{camera}", track.sid()));
        Ok(if *self.in_place.lock().unwrap() {
            SourceSwitch::InPlace
        } else {
            SourceSwitch::Unsupported
        })
    }

    fn release(&self, track: &TrackHandle) {
        self.record(format!("release:{}", track.sid()));
    }

    fn stop_capture(&self) {
        self.record("stop_capture".into());
    }
}

/// View that logs attach/detach calls by track sid.
#[derive(Default)]
pub struct RecordingView {
    calls: Mutex<Vec<String>>,
}

impl RecordingView {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl VideoView for RecordingView {
    fn attach(&self, track: &TrackHandle) {
        self.calls.lock().unwrap().push(format!("attach:{}", track.sid()));
    }

    fn detach(&self, track: &TrackHandle) {
        self.calls.lock().unwrap().push(format!("detach:{}", track.sid()));
    }
}

pub struct Harness {
    pub session: SessionManager,
    pub engine: Arc<RecordingEngine>,
    pub capture: Arc<FakeCapture>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeCapture::with_two_cameras(), Arc::new(InlineExecutor))
    }

    pub fn with(capture: FakeCapture, executor: Arc<dyn UiExecutor>) -> Self {
        Self::with_settings(capture, executor, SessionSettings::default())
    }

    pub fn with_settings(
        capture: FakeCapture,
        executor: Arc<dyn UiExecutor>,
        settings: SessionSettings,
    ) -> Self {
        let engine = Arc::new(RecordingEngine::default());
        let capture = Arc::new(capture);
        let session = SessionManager::new(engine.clone(), capture.clone(), executor, settings);
        Self {
            session,
            engine,
            capture,
        }
    }

    /// Connect and complete the handshake with the given room snapshot.
    pub fn join(&self, participants: Vec<ParticipantSnapshot>) {
        self.session.connect("token", "standup").unwrap();
        self.engine.send(SessionEvent::Connected {
            room: "standup".into(),
            local_identity: "me".into(),
            participants,
        });
    }

    /// Publish and subscribe a remote video track for `identity`.
    pub fn subscribe_video(&self, identity: &str, publication_sid: &str, track_sid: &str) -> TrackHandle {
        let track = TrackHandle::remote(track_sid, TrackKind::Video);
        self.engine.send(SessionEvent::TrackPublished {
            identity: identity.into(),
            publication: Publication::new(publication_sid, TrackKind::Video, true),
        });
        self.engine.send(SessionEvent::TrackSubscribed {
            identity: identity.into(),
            publication_sid: publication_sid.into(),
            track: track.clone(),
        });
        track
    }
}

pub fn tags(events: &[ParleyEvent]) -> Vec<&'static str> {
    events.iter().map(ParleyEvent::tag).collect()
}

pub fn count(events: &[ParleyEvent], tag: &str) -> usize {
    events.iter().filter(|e| e.tag() == tag).count()
}

//! Seams to the external media engine and capture stack.
//!
//! The engine owns transport, signalling and remote tracks; the capture
//! backend owns cameras and microphones. Both are driven fire-and-forget:
//! results come back later as [`SessionEvent`]s through [`EngineEvents`].

use std::fmt;
use std::sync::Weak;

use crate::devices::{CameraDevice, DeviceId};
use crate::errors::DeviceError;
use crate::media::{Publication, TrackHandle};

/// Everything the engine can report about a session, as one tagged variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Handshake complete. `participants` is the engine's snapshot of who
    /// was already in the room, in the engine's order.
    Connected {
        room: String,
        local_identity: String,
        participants: Vec<ParticipantSnapshot>,
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
    ParticipantConnected(ParticipantSnapshot),
    ParticipantDisconnected {
        identity: String,
    },
    TrackPublished {
        identity: String,
        publication: Publication,
    },
    TrackUnpublished {
        identity: String,
        publication_sid: String,
    },
    TrackSubscribed {
        identity: String,
        publication_sid: String,
        track: TrackHandle,
    },
    TrackUnsubscribed {
        identity: String,
        publication_sid: String,
        track: TrackHandle,
    },
    TrackSubscriptionFailed {
        identity: String,
        publication_sid: String,
        error: String,
    },
    /// Remote publication flag flipped, independent of subscription.
    TrackEnabled {
        identity: String,
        publication_sid: String,
    },
    TrackDisabled {
        identity: String,
        publication_sid: String,
    },
    LocalTrackPublished {
        track: TrackHandle,
    },
    LocalTrackPublicationFailed {
        track: TrackHandle,
        error: String,
    },
    RecordingStarted,
    RecordingStopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSnapshot {
    pub identity: String,
    pub publications: Vec<Publication>,
}

impl ParticipantSnapshot {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            publications: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub token: String,
    pub room_name: String,
    pub audio: Option<TrackHandle>,
    pub video: Option<TrackHandle>,
}

/// Outcome of asking the capture backend for a camera swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSwitch {
    /// The same track now carries the new camera.
    InPlace,
    /// The backend cannot swap sources; the track must be replaced.
    Unsupported,
}

pub trait MediaEngine: Send + Sync {
    /// Start joining a room. Must not block; report through `events`.
    fn connect(&self, request: ConnectRequest, events: EngineEvents);
    fn disconnect(&self);
    fn publish(&self, track: &TrackHandle);
    fn unpublish(&self, track: &TrackHandle);
    fn set_speakerphone(&self, enabled: bool);
}

pub trait CaptureBackend: Send + Sync {
    fn cameras(&self) -> Vec<CameraDevice>;
    fn start_audio(&self, track: &TrackHandle) -> Result<(), DeviceError>;
    fn start_video(&self, track: &TrackHandle, camera: &DeviceId) -> Result<(), DeviceError>;
    fn set_enabled(&self, track: &TrackHandle, enabled: bool);
    fn switch_source(
        &self,
        track: &TrackHandle,
        camera: &DeviceId,
    ) -> Result<SourceSwitch, DeviceError>;
    fn release(&self, track: &TrackHandle);
    fn stop_capture(&self);
}

pub(crate) trait EngineEventSink: Send + Sync {
    fn deliver(&self, generation: u64, event: SessionEvent);
}

/// Callback handle given to the engine for one connection attempt.
///
/// Events sent after the attempt was torn down, or after the session
/// manager was dropped, are discarded.
#[derive(Clone)]
pub struct EngineEvents {
    generation: u64,
    sink: Weak<dyn EngineEventSink>,
}

impl EngineEvents {
    pub(crate) fn new(generation: u64, sink: Weak<dyn EngineEventSink>) -> Self {
        Self { generation, sink }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn send(&self, event: SessionEvent) {
        match self.sink.upgrade() {
            Some(sink) => sink.deliver(self.generation, event),
            None => tracing::debug!("session gone, dropping engine event"),
        }
    }
}

impl fmt::Debug for EngineEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEvents")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

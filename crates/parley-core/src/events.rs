use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::mpsc;

/// Events emitted by the core to the host.
///
/// Serialises to a flat record tagged by `event`, e.g.
/// `{"event": "participant_connected", "identity": "alice"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
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

impl ParleyEvent {
    /// The `event` tag of the serialised record.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::RoomConnected { .. } => "room_connected",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::RoomDisconnected { .. } => "room_disconnected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Reconnected { .. } => "reconnected",
            Self::ParticipantConnected { .. } => "participant_connected",
            Self::ParticipantDisconnected { .. } => "participant_disconnected",
            Self::AudioPublished { .. } => "audio_published",
            Self::AudioUnpublished { .. } => "audio_unpublished",
            Self::VideoUnpublished { .. } => "video_unpublished",
            Self::AudioEnabled { .. } => "audio_enabled",
            Self::AudioDisabled { .. } => "audio_disabled",
            Self::VideoEnabled { .. } => "video_enabled",
            Self::VideoDisabled { .. } => "video_disabled",
            Self::LocalAudioPublished => "local_audio_published",
            Self::LocalVideoPublished => "local_video_published",
            Self::LocalAudioFailed { .. } => "local_audio_failed",
            Self::LocalVideoFailed { .. } => "local_video_failed",
            Self::RecordingStarted { .. } => "recording_started",
            Self::RecordingStopped { .. } => "recording_stopped",
        }
    }

    pub fn to_record(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Trait for receiving events from the core.
///
/// Called synchronously, in emission order, while the session holds its
/// state lock: implementations must not call back into the session. Hosts
/// that need to should [`subscribe`](EventEmitter::subscribe) instead.
pub trait ParleyEventListener: Send + Sync {
    fn on_event(&self, event: ParleyEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn ParleyEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ParleyEventListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    /// Open an ordered stream of every event emitted from now on.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_listener(Arc::new(ChannelListener { tx }));
        EventStream { rx }
    }

    pub fn emit(&self, event: ParleyEvent) {
        tracing::debug!(event = event.tag(), "emit");
        let listeners = self.listeners.read().unwrap();
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}

struct ChannelListener {
    tx: mpsc::UnboundedSender<ParleyEvent>,
}

impl ParleyEventListener for ChannelListener {
    fn on_event(&self, event: ParleyEvent) {
        // A dropped stream just stops receiving.
        let _ = self.tx.send(event);
    }
}

/// Receiving end of [`EventEmitter::subscribe`].
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ParleyEvent>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<ParleyEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ParleyEvent> {
        self.rx.try_recv().ok()
    }

    /// Everything emitted so far and not yet received.
    pub fn drain(&mut self) -> Vec<ParleyEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Deliver the stream to `listener` outside the session lock, until
    /// the emitter is dropped.
    pub async fn forward(mut self, listener: Arc<dyn ParleyEventListener>) {
        while let Some(event) = self.rx.recv().await {
            listener.on_event(event);
        }
        tracing::debug!("event stream closed");
    }
}

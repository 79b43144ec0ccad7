use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackOrigin {
    Local,
    Remote,
}

/// Reference to a live media track.
///
/// Local handles are minted by the [`TrackManager`](crate::tracks::TrackManager)
/// and own a capture resource until released. Remote handles are issued by
/// the media engine and stay meaningful only between its subscribe and
/// unsubscribe callbacks. Two handles name the same track iff their SIDs match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    sid: String,
    kind: TrackKind,
    origin: TrackOrigin,
}

impl TrackHandle {
    pub fn remote(sid: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            sid: sid.into(),
            kind,
            origin: TrackOrigin::Remote,
        }
    }

    /// Rebuild a handle for a local track minted earlier, e.g. when it comes
    /// back across the FFI.
    pub fn local(sid: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            sid: sid.into(),
            kind,
            origin: TrackOrigin::Local,
        }
    }

    /// Mint a fresh local track handle with a unique SID.
    pub fn new_local(kind: TrackKind) -> Self {
        let prefix = match kind {
            TrackKind::Audio => "local-audio",
            TrackKind::Video => "local-video",
            TrackKind::Data => "local-data",
        };
        Self {
            sid: format!("{prefix}-{}", uuid::Uuid::new_v4()),
            kind,
            origin: TrackOrigin::Local,
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn origin(&self) -> TrackOrigin {
        self.origin
    }

    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }
}

/// A named media slot advertised by a participant.
///
/// Holding no track is normal: the slot may be published but not yet
/// subscribed, or unsubscribed while the publication lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub sid: String,
    pub kind: TrackKind,
    pub enabled: bool,
    pub track: Option<TrackHandle>,
}

impl Publication {
    pub fn new(sid: impl Into<String>, kind: TrackKind, enabled: bool) -> Self {
        Self {
            sid: sid.into(),
            kind,
            enabled,
            track: None,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.track.is_some()
    }

    /// Video that should currently be on screen.
    pub fn is_renderable(&self) -> bool {
        self.kind == TrackKind::Video && self.enabled && self.track.is_some()
    }
}

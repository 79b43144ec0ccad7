use std::collections::HashMap;

use crate::engine::ParticipantSnapshot;
use crate::media::{Publication, TrackHandle};

/// A remote participant and the media slots it has advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub identity: String,
    publications: HashMap<String, Publication>,
    /// Whether `participant_connected` has been emitted for this identity.
    announced: bool,
}

impl RemoteParticipant {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            publications: HashMap::new(),
            announced: false,
        }
    }

    pub fn publication(&self, sid: &str) -> Option<&Publication> {
        self.publications.get(sid)
    }

    pub fn publication_mut(&mut self, sid: &str) -> Option<&mut Publication> {
        self.publications.get_mut(sid)
    }

    /// Insert or refresh a publication, keeping any track already stored.
    pub fn upsert_publication(&mut self, publication: Publication) -> &mut Publication {
        let entry = self
            .publications
            .entry(publication.sid.clone())
            .or_insert_with(|| publication.clone());
        entry.kind = publication.kind;
        entry.enabled = publication.enabled;
        if publication.track.is_some() {
            entry.track = publication.track;
        }
        entry
    }

    pub fn remove_publication(&mut self, sid: &str) -> Option<Publication> {
        self.publications.remove(sid)
    }

    pub fn publications(&self) -> impl Iterator<Item = &Publication> {
        self.publications.values()
    }
}

/// Manages the participant set of the active session.
///
/// Updated by the session state machine only.
#[derive(Debug, Clone, Default)]
pub struct ParticipantManager {
    participants: HashMap<String, RemoteParticipant>,
    local_identity: Option<String>,
    local_publications: HashMap<String, Publication>,
}

impl ParticipantManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_local_identity(&mut self, identity: String) {
        self.local_identity = Some(identity);
    }

    pub fn local_identity(&self) -> Option<&str> {
        self.local_identity.as_deref()
    }

    /// Add a participant from an engine snapshot. Returns `true` the first
    /// time an identity is announced, including one already created by an
    /// early track callback. Publications are merged either way.
    pub fn add_participant(&mut self, snapshot: ParticipantSnapshot) -> bool {
        let participant = self
            .participants
            .entry(snapshot.identity.clone())
            .or_insert_with(|| RemoteParticipant::new(snapshot.identity));
        for publication in snapshot.publications {
            participant.upsert_publication(publication);
        }
        !std::mem::replace(&mut participant.announced, true)
    }

    /// Look up a participant, creating it unannounced if a track callback
    /// outran the participant-connected callback.
    pub fn participant_entry(&mut self, identity: &str) -> &mut RemoteParticipant {
        self.participants
            .entry(identity.to_string())
            .or_insert_with(|| RemoteParticipant::new(identity))
    }

    pub fn remove_participant(&mut self, identity: &str) -> Option<RemoteParticipant> {
        self.participants.remove(identity)
    }

    pub fn participant(&self, identity: &str) -> Option<&RemoteParticipant> {
        self.participants.get(identity)
    }

    pub fn participant_mut(&mut self, identity: &str) -> Option<&mut RemoteParticipant> {
        self.participants.get_mut(identity)
    }

    pub fn identities(&self) -> Vec<String> {
        self.participants.keys().cloned().collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn add_local_publication(&mut self, track: &TrackHandle, enabled: bool) {
        let mut publication = Publication::new(track.sid(), track.kind(), enabled);
        publication.track = Some(track.clone());
        self.local_publications.insert(track.sid().to_string(), publication);
    }

    pub fn remove_local_publication(&mut self, track: &TrackHandle) -> Option<Publication> {
        self.local_publications.remove(track.sid())
    }

    pub fn local_publications(&self) -> impl Iterator<Item = &Publication> {
        self.local_publications.values()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
        self.local_publications.clear();
        self.local_identity = None;
    }
}

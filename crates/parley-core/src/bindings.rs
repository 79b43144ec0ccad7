//! Track-to-view bindings.
//!
//! Views are created and destroyed by the host's rendering surface on its
//! own schedule; tracks come and go with engine callbacks. Whichever side
//! shows up first is parked here until the other arrives.
//!
//! Invariants:
//! - at most one track bound per view;
//! - a track is bound to (or pending for) at most one view;
//! - attach/detach are idempotent, detach compares track identity.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::dispatch::UiExecutor;
use crate::errors::ParleyError;
use crate::media::TrackHandle;

/// Identity of a renderable surface. The local preview is a singleton;
/// remote views are keyed by participant identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewId {
    Local,
    Remote(String),
}

impl ViewId {
    pub const LOCAL: &'static str = "local";

    pub fn remote(identity: impl Into<String>) -> Self {
        Self::Remote(identity.into())
    }

    /// Parse a host-supplied view name: `"local"` or a participant identity.
    pub fn parse(name: &str) -> Result<Self, ParleyError> {
        match name {
            "" => Err(ParleyError::MissingIdentity),
            Self::LOCAL => Ok(Self::Local),
            identity => Ok(Self::remote(identity)),
        }
    }

    /// Resolve the view id of a remote view from its creation arguments,
    /// e.g. `{"identity": "alice"}`.
    pub fn from_creation_args(args: &serde_json::Value) -> Result<Self, ParleyError> {
        match args.get("identity").and_then(|v| v.as_str()) {
            Some(identity) if !identity.is_empty() => Ok(Self::remote(identity)),
            _ => Err(ParleyError::MissingIdentity),
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str(Self::LOCAL),
            Self::Remote(identity) => f.write_str(identity),
        }
    }
}

/// A host surface that can render one video track at a time.
///
/// Only ever invoked from the UI context the [`ViewPort`] dispatches to.
pub trait VideoView: Send + Sync {
    fn attach(&self, track: &TrackHandle);
    fn detach(&self, track: &TrackHandle);
}

struct ViewSlot {
    view: Arc<dyn VideoView>,
    bound: Option<TrackHandle>,
}

#[derive(Default)]
pub struct ViewBindingRegistry {
    views: HashMap<ViewId, ViewSlot>,
    pending: HashMap<ViewId, TrackHandle>,
}

impl ViewBindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly created view, binding any track that was waiting
    /// for it. Re-registering the same surface is a no-op; registering a
    /// new surface under a known id moves the current binding onto it.
    pub fn register_view(&mut self, id: ViewId, view: Arc<dyn VideoView>) {
        match self.views.get_mut(&id) {
            Some(slot) if Arc::ptr_eq(&slot.view, &view) => {
                tracing::debug!(view = %id, "view already registered");
            }
            Some(slot) => {
                tracing::debug!(view = %id, "view surface replaced");
                if let Some(track) = &slot.bound {
                    slot.view.detach(track);
                    view.attach(track);
                }
                slot.view = view;
            }
            None => {
                tracing::debug!(view = %id, "view registered");
                self.views.insert(id.clone(), ViewSlot { view, bound: None });
            }
        }

        if let Some(track) = self.pending.remove(&id) {
            tracing::info!(view = %id, track_sid = %track.sid(), "binding pending track");
            self.bind(&id, track);
        }
    }

    /// Forget a destroyed view. The track it held is detached, never released.
    pub fn unregister_view(&mut self, id: &ViewId) {
        if let Some(slot) = self.views.remove(id) {
            if let Some(track) = &slot.bound {
                slot.view.detach(track);
            }
            tracing::debug!(view = %id, "view unregistered");
        }
    }

    /// Bind `track` to `id`, replacing whatever the view held. Parked as
    /// pending when the view does not exist yet.
    pub fn attach(&mut self, id: &ViewId, track: TrackHandle) {
        if !track.is_video() {
            tracing::debug!(view = %id, track_sid = %track.sid(), "ignoring non-video attach");
            return;
        }

        self.unbind_elsewhere(id, &track);

        if self.views.contains_key(id) {
            self.bind(id, track);
        } else {
            tracing::debug!(view = %id, track_sid = %track.sid(), "view absent, attach pending");
            self.pending.insert(id.clone(), track);
        }
    }

    /// Unbind `track` from `id` if, and only if, it is the track the view
    /// currently holds. A matching pending attach is cancelled as well.
    pub fn detach(&mut self, id: &ViewId, track: &TrackHandle) {
        if self.pending.get(id) == Some(track) {
            self.pending.remove(id);
            tracing::debug!(view = %id, track_sid = %track.sid(), "pending attach cancelled");
        }

        let Some(slot) = self.views.get_mut(id) else {
            return;
        };
        if slot.bound.as_ref() == Some(track) {
            slot.view.detach(track);
            slot.bound = None;
            tracing::debug!(view = %id, track_sid = %track.sid(), "track detached");
        } else {
            tracing::debug!(view = %id, track_sid = %track.sid(), "stale detach ignored");
        }
    }

    pub fn clear_pending(&mut self, id: &ViewId) {
        self.pending.remove(id);
    }

    /// Drop every view, binding and pending entry. Tracks are not released.
    pub fn clear_all(&mut self) {
        for (_, slot) in self.views.drain() {
            if let Some(track) = &slot.bound {
                slot.view.detach(track);
            }
        }
        self.pending.clear();
        tracing::debug!("view bindings cleared");
    }

    pub fn bound_track(&self, id: &ViewId) -> Option<&TrackHandle> {
        self.views.get(id).and_then(|slot| slot.bound.as_ref())
    }

    pub fn pending_track(&self, id: &ViewId) -> Option<&TrackHandle> {
        self.pending.get(id)
    }

    pub fn is_registered(&self, id: &ViewId) -> bool {
        self.views.contains_key(id)
    }

    /// The view `track` is currently bound to, if any.
    pub fn view_of(&self, track: &TrackHandle) -> Option<&ViewId> {
        self.views
            .iter()
            .find(|(_, slot)| slot.bound.as_ref() == Some(track))
            .map(|(id, _)| id)
    }

    pub fn binding_count(&self) -> usize {
        self.views.values().filter(|slot| slot.bound.is_some()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty() && self.pending.is_empty()
    }

    fn bind(&mut self, id: &ViewId, track: TrackHandle) {
        let Some(slot) = self.views.get_mut(id) else {
            return;
        };
        if slot.bound.as_ref() == Some(&track) {
            tracing::debug!(view = %id, track_sid = %track.sid(), "already bound");
            return;
        }
        if let Some(previous) = slot.bound.take() {
            slot.view.detach(&previous);
        }
        slot.view.attach(&track);
        tracing::info!(view = %id, track_sid = %track.sid(), "track attached");
        slot.bound = Some(track);
    }

    fn unbind_elsewhere(&mut self, id: &ViewId, track: &TrackHandle) {
        for (other, slot) in self.views.iter_mut() {
            if other != id && slot.bound.as_ref() == Some(track) {
                slot.view.detach(track);
                slot.bound = None;
                tracing::debug!(view = %other, track_sid = %track.sid(), "track moved off view");
            }
        }
        self.pending.retain(|other, pending| other == id || pending != track);
    }
}

/// Shared handle to the binding registry plus the UI context that owns it.
///
/// Every mutation, view registration included, is dispatched to the
/// executor and applied in submission order, so a registration never
/// overtakes teardown work queued before it.
#[derive(Clone)]
pub struct ViewPort {
    registry: Arc<Mutex<ViewBindingRegistry>>,
    executor: Arc<dyn UiExecutor>,
}

impl ViewPort {
    pub fn new(executor: Arc<dyn UiExecutor>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(ViewBindingRegistry::new())),
            executor,
        }
    }

    pub fn register_view(&self, id: ViewId, view: Arc<dyn VideoView>) {
        self.run(move |registry| registry.register_view(id, view));
    }

    /// Register a remote view from its creation arguments.
    pub fn register_remote_view(
        &self,
        args: &serde_json::Value,
        view: Arc<dyn VideoView>,
    ) -> Result<ViewId, ParleyError> {
        let id = ViewId::from_creation_args(args)?;
        self.register_view(id.clone(), view);
        Ok(id)
    }

    pub fn unregister_view(&self, id: &ViewId) {
        let id = id.clone();
        self.run(move |registry| registry.unregister_view(&id));
    }

    pub fn attach(&self, id: ViewId, track: TrackHandle) {
        self.run(move |registry| registry.attach(&id, track));
    }

    pub fn detach(&self, id: ViewId, track: TrackHandle) {
        self.run(move |registry| registry.detach(&id, &track));
    }

    pub fn clear_pending(&self, id: ViewId) {
        self.run(move |registry| registry.clear_pending(&id));
    }

    pub fn clear_all(&self) {
        self.run(|registry| registry.clear_all());
    }

    /// Run `f` against the registry on the UI context.
    pub fn run(&self, f: impl FnOnce(&mut ViewBindingRegistry) + Send + 'static) {
        let registry = self.registry.clone();
        self.executor.dispatch(Box::new(move || {
            f(&mut registry.lock().unwrap());
        }));
    }

    /// Inspect the registry from the calling thread.
    pub fn inspect<R>(&self, f: impl FnOnce(&ViewBindingRegistry) -> R) -> R {
        f(&self.registry.lock().unwrap())
    }
}

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::bindings::{ViewId, ViewPort};
use crate::devices::DeviceId;
use crate::engine::{CaptureBackend, MediaEngine, SourceSwitch};
use crate::errors::DeviceError;
use crate::media::{Publication, TrackHandle, TrackKind};

/// Result of starting local capture. Each track succeeds or fails on its own.
#[derive(Debug, Default)]
pub struct LocalMedia {
    pub audio: Option<TrackHandle>,
    pub video: Option<TrackHandle>,
    pub audio_error: Option<DeviceError>,
    pub video_error: Option<DeviceError>,
}

#[derive(Debug)]
struct LocalTrack {
    handle: TrackHandle,
    enabled: bool,
}

impl LocalTrack {
    fn new(handle: TrackHandle) -> Self {
        Self {
            handle,
            enabled: true,
        }
    }
}

/// Owner of the local microphone and camera tracks.
///
/// Every local track it mints is released exactly once, after it has been
/// detached from the local view and unpublished. Enabling or disabling a
/// track never destroys it.
pub struct TrackManager {
    capture: Arc<dyn CaptureBackend>,
    engine: Arc<dyn MediaEngine>,
    audio: Option<LocalTrack>,
    video: Option<LocalTrack>,
    camera: Option<DeviceId>,
    preview: bool,
    published: HashSet<String>,
    /// Bumped whenever capture starts; a queued stop only fires if nothing
    /// started since it was queued.
    capture_epoch: Arc<AtomicU64>,
}

impl TrackManager {
    pub fn new(capture: Arc<dyn CaptureBackend>, engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            capture,
            engine,
            audio: None,
            video: None,
            camera: None,
            preview: true,
            published: HashSet::new(),
            capture_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create the requested local tracks, enabled. Tracks that already
    /// exist are kept.
    pub fn start_local_media(
        &mut self,
        want_audio: bool,
        want_video: bool,
        camera: Result<DeviceId, DeviceError>,
    ) -> LocalMedia {
        let mut media = LocalMedia::default();

        if want_audio {
            match self.start_audio() {
                Ok(track) => media.audio = Some(track),
                Err(e) => {
                    tracing::warn!("local audio unavailable: {e}");
                    media.audio_error = Some(e);
                }
            }
        }

        if want_video {
            match camera.and_then(|camera| self.start_video(camera)) {
                Ok(track) => media.video = Some(track),
                Err(e) => {
                    tracing::warn!("local video unavailable: {e}");
                    media.video_error = Some(e);
                }
            }
        }

        media
    }

    pub fn start_audio(&mut self) -> Result<TrackHandle, DeviceError> {
        if let Some(track) = &self.audio {
            return Ok(track.handle.clone());
        }
        let handle = TrackHandle::new_local(TrackKind::Audio);
        self.capture.start_audio(&handle)?;
        self.capture_epoch.fetch_add(1, Ordering::SeqCst);
        tracing::info!(track_sid = %handle.sid(), "local audio track created");
        self.audio = Some(LocalTrack::new(handle.clone()));
        Ok(handle)
    }

    pub fn start_video(&mut self, camera: DeviceId) -> Result<TrackHandle, DeviceError> {
        if let Some(track) = &self.video {
            return Ok(track.handle.clone());
        }
        let handle = TrackHandle::new_local(TrackKind::Video);
        self.capture.start_video(&handle, &camera)?;
        self.capture_epoch.fetch_add(1, Ordering::SeqCst);
        tracing::info!(track_sid = %handle.sid(), camera = %camera, "local video track created");
        self.video = Some(LocalTrack::new(handle.clone()));
        self.camera = Some(camera);
        Ok(handle)
    }

    pub fn audio_track(&self) -> Option<&TrackHandle> {
        self.audio.as_ref().map(|t| &t.handle)
    }

    pub fn video_track(&self) -> Option<&TrackHandle> {
        self.video.as_ref().map(|t| &t.handle)
    }

    pub fn camera(&self) -> Option<&DeviceId> {
        self.camera.as_ref()
    }

    pub fn is_enabled(&self, track: &TrackHandle) -> bool {
        self.local(track).is_some_and(|t| t.enabled)
    }

    pub fn has_tracks(&self) -> bool {
        self.audio.is_some() || self.video.is_some()
    }

    /// Toggle a local track. Unknown or released tracks are ignored.
    pub fn set_enabled(&mut self, track: &TrackHandle, enabled: bool) {
        let capture = self.capture.clone();
        let Some(local) = self.local_mut(track) else {
            tracing::debug!(track_sid = %track.sid(), "set_enabled on stale track");
            return;
        };
        if local.enabled != enabled {
            capture.set_enabled(&local.handle, enabled);
            local.enabled = enabled;
            tracing::info!(track_sid = %track.sid(), enabled, "local track toggled");
        }
    }

    /// Publish a local track to the active session.
    pub fn publish(&mut self, track: &TrackHandle) -> Option<Publication> {
        let enabled = self.local(track)?.enabled;
        if self.published.insert(track.sid().to_string()) {
            self.engine.publish(track);
            tracing::info!(track_sid = %track.sid(), "local track publish requested");
        }
        let mut publication = Publication::new(track.sid(), track.kind(), enabled);
        publication.track = Some(track.clone());
        Some(publication)
    }

    /// Record a track handed to the engine as part of the connect request.
    pub fn note_published(&mut self, track: &TrackHandle) {
        self.published.insert(track.sid().to_string());
    }

    /// Forget a publication the engine rejected.
    pub fn note_publication_failed(&mut self, track: &TrackHandle) {
        self.published.remove(track.sid());
    }

    pub fn is_published(&self, track: &TrackHandle) -> bool {
        self.published.contains(track.sid())
    }

    pub fn unpublish(&mut self, track: &TrackHandle) {
        if self.published.remove(track.sid()) {
            self.engine.unpublish(track);
            tracing::info!(track_sid = %track.sid(), "local track unpublished");
        }
    }

    /// Local tracks not yet handed to the engine.
    pub fn unpublished(&self) -> Vec<TrackHandle> {
        [self.audio.as_ref(), self.video.as_ref()]
            .into_iter()
            .flatten()
            .filter(|t| !self.published.contains(t.handle.sid()))
            .map(|t| t.handle.clone())
            .collect()
    }

    pub fn preview_visible(&self) -> bool {
        self.preview
    }

    /// Render the local video track in the local view, now or once the
    /// view exists.
    pub fn show_preview(&mut self, views: &ViewPort) {
        self.preview = true;
        if let Some(video) = self.video_track() {
            views.attach(ViewId::Local, video.clone());
        }
    }

    pub fn hide_preview(&mut self, views: &ViewPort) {
        self.preview = false;
        if let Some(video) = self.video_track() {
            views.detach(ViewId::Local, video.clone());
        }
    }

    /// Detach, unpublish, then release the local video track.
    pub fn stop_local_video(&mut self, views: &ViewPort) -> Option<TrackHandle> {
        let track = self.video.take()?.handle;
        views.detach(ViewId::Local, track.clone());
        self.unpublish(&track);
        let capture = self.capture.clone();
        let released = track.clone();
        // Queued behind the detach on the UI context.
        views.run(move |_| capture.release(&released));
        self.camera = None;
        tracing::info!(track_sid = %track.sid(), "local video track stopped");
        Some(track)
    }

    pub fn stop_local_audio(&mut self) -> Option<TrackHandle> {
        let track = self.audio.take()?.handle;
        self.unpublish(&track);
        self.capture.release(&track);
        tracing::info!(track_sid = %track.sid(), "local audio track stopped");
        Some(track)
    }

    /// Release all local media and stop capture.
    ///
    /// The stop is queued behind the video release. If a later session has
    /// started capture by the time it runs, it is skipped so the new
    /// session's tracks keep their source.
    pub fn shutdown(&mut self, views: &ViewPort) {
        let had_tracks = self.has_tracks();
        self.stop_local_video(views);
        self.stop_local_audio();
        self.published.clear();
        self.preview = true;
        if had_tracks {
            let capture = self.capture.clone();
            let epoch = self.capture_epoch.clone();
            let queued_at = epoch.load(Ordering::SeqCst);
            views.run(move |_| {
                if epoch.load(Ordering::SeqCst) == queued_at {
                    capture.stop_capture();
                } else {
                    tracing::debug!("capture restarted since teardown, stop skipped");
                }
            });
        }
    }

    /// Move the local video track onto `camera`.
    ///
    /// Swaps the capture source under the same track when the backend can;
    /// otherwise replaces the track, re-binding the local view in a single
    /// UI task and republishing if the old track was published. Returns
    /// `false` when there is no local video track.
    pub fn switch_camera(
        &mut self,
        camera: DeviceId,
        views: &ViewPort,
    ) -> Result<bool, DeviceError> {
        let Some(current) = self.video.as_ref() else {
            tracing::debug!("switch_camera without local video");
            return Ok(false);
        };
        let old = current.handle.clone();
        let enabled = current.enabled;

        match self.capture.switch_source(&old, &camera)? {
            SourceSwitch::InPlace => {
                tracing::info!(camera = %camera, "camera switched in place");
            }
            SourceSwitch::Unsupported => {
                let new = TrackHandle::new_local(TrackKind::Video);
                self.capture.start_video(&new, &camera)?;
                self.capture_epoch.fetch_add(1, Ordering::SeqCst);
                if !enabled {
                    self.capture.set_enabled(&new, false);
                }

                let was_published = self.is_published(&old);
                self.unpublish(&old);

                let capture = self.capture.clone();
                let preview = self.preview;
                let (detached, attached) = (old.clone(), new.clone());
                views.run(move |registry| {
                    registry.detach(&ViewId::Local, &detached);
                    capture.release(&detached);
                    if preview {
                        registry.attach(&ViewId::Local, attached);
                    }
                });

                self.video = Some(LocalTrack {
                    handle: new.clone(),
                    enabled,
                });
                if was_published {
                    self.publish(&new);
                }
                tracing::info!(
                    camera = %camera,
                    old_sid = %old.sid(),
                    new_sid = %new.sid(),
                    "camera switched by track replacement"
                );
            }
        }

        self.camera = Some(camera);
        Ok(true)
    }

    fn local(&self, track: &TrackHandle) -> Option<&LocalTrack> {
        [self.audio.as_ref(), self.video.as_ref()]
            .into_iter()
            .flatten()
            .find(|t| &t.handle == track)
    }

    fn local_mut(&mut self, track: &TrackHandle) -> Option<&mut LocalTrack> {
        [self.audio.as_mut(), self.video.as_mut()]
            .into_iter()
            .flatten()
            .find(|t| &t.handle == track)
    }
}

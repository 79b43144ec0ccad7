//! Parley session core.
//!
//! Pure Rust crate with no platform dependencies. Coordinates a media
//! session, local capture, remote participants and the binding of live
//! video tracks to host views. Consumed by native UI shells via UniFFI
//! bindings in `parley-ffi`.

pub mod bindings;
pub mod devices;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod events;
pub mod media;
pub mod participants;
pub mod session;
pub mod settings;
pub mod tracks;

#[cfg(feature = "livekit")]
pub mod livekit_engine;

pub use bindings::{VideoView, ViewBindingRegistry, ViewId, ViewPort};
pub use devices::{CameraDevice, CameraFacing, DeviceId, DeviceRegistry};
pub use dispatch::{InlineExecutor, ManualExecutor, UiExecutor, UiThread};
pub use engine::{
    CaptureBackend, ConnectRequest, EngineEvents, MediaEngine, ParticipantSnapshot,
    SessionEvent, SourceSwitch,
};
pub use errors::{DeviceError, ParleyError};
pub use events::{EventEmitter, EventStream, ParleyEvent, ParleyEventListener};
pub use media::{Publication, TrackHandle, TrackKind, TrackOrigin};
pub use session::{SessionManager, SessionState};
pub use settings::{SessionSettings, SettingsStore};
pub use tracks::{LocalMedia, TrackManager};

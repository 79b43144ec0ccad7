//! Join-time preferences, persisted as JSON in the host's data directory.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

const FILE_NAME: &str = "settings.json";

/// Preferences read by `connect`. Fields missing from the file keep
/// their defaults.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SessionSettings {
    pub publish_audio_on_join: bool,
    pub publish_video_on_join: bool,
    pub prefer_front_camera: bool,
    pub speakerphone_on_join: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            publish_audio_on_join: true,
            publish_video_on_join: true,
            prefer_front_camera: true,
            speakerphone_on_join: true,
        }
    }
}

pub struct SettingsStore {
    current: Mutex<SessionSettings>,
    path: PathBuf,
}

impl SettingsStore {
    /// Load `settings.json` from `data_dir`. An absent or unreadable file
    /// yields defaults.
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        let path = data_dir.as_ref().join(FILE_NAME);
        let current = read_settings(&path);
        Self {
            current: Mutex::new(current),
            path,
        }
    }

    pub fn snapshot(&self) -> SessionSettings {
        self.current.lock().unwrap().clone()
    }

    /// Apply `change`, write the result through, and return it.
    ///
    /// A failed write keeps the in-memory value.
    pub fn update(&self, change: impl FnOnce(&mut SessionSettings)) -> SessionSettings {
        let updated = {
            let mut current = self.current.lock().unwrap();
            change(&mut current);
            current.clone()
        };
        if let Err(e) = write_settings(&self.path, &updated) {
            tracing::warn!(path = %self.path.display(), "settings not saved: {e}");
        }
        updated
    }
}

fn read_settings(path: &Path) -> SessionSettings {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return SessionSettings::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "settings unreadable, using defaults: {e}");
            return SessionSettings::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), "settings corrupt, using defaults: {e}");
        SessionSettings::default()
    })
}

fn write_settings(path: &Path, settings: &SessionSettings) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_vec_pretty(settings)?;
    // Write-then-rename so a crash never leaves a truncated file behind.
    let staged = path.with_extension("json.tmp");
    std::fs::write(&staged, json)?;
    std::fs::rename(&staged, path)
}

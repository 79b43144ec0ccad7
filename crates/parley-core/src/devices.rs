use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DeviceError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFacing {
    Front,
    Back,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub id: DeviceId,
    pub facing: CameraFacing,
}

impl CameraDevice {
    pub fn new(id: &str, facing: CameraFacing) -> Self {
        Self {
            id: DeviceId::from(id),
            facing,
        }
    }
}

/// Enumerated cameras plus the one currently feeding the local video track.
///
/// Refreshed from the capture backend at the start of each session. Does
/// not start capture itself; switching is carried out by the track manager.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<CameraDevice>,
    active: Option<DeviceId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the enumeration. The active device is kept only if it is
    /// still present.
    pub fn refresh(&mut self, devices: Vec<CameraDevice>) {
        tracing::debug!(count = devices.len(), "camera list refreshed");
        if let Some(active) = &self.active {
            if !devices.iter().any(|d| &d.id == active) {
                self.active = None;
            }
        }
        self.devices = devices;
    }

    pub fn list_devices(&self) -> Vec<DeviceId> {
        self.devices.iter().map(|d| d.id.clone()).collect()
    }

    pub fn devices(&self) -> &[CameraDevice] {
        &self.devices
    }

    /// Pick the camera to start with: the first front-facing one when
    /// `prefer_front` is set, else the first enumerated.
    pub fn select_default(&self, prefer_front: bool) -> Result<DeviceId, DeviceError> {
        let front = prefer_front
            .then(|| self.devices.iter().find(|d| d.facing == CameraFacing::Front))
            .flatten();
        front
            .or_else(|| self.devices.first())
            .map(|d| d.id.clone())
            .ok_or(DeviceError::NoDeviceFound)
    }

    /// The camera after `current` in enumeration order, wrapping around.
    /// An unknown `current` yields the first device that differs from it.
    pub fn next(&self, current: &DeviceId) -> Result<DeviceId, DeviceError> {
        if self.devices.is_empty() {
            return Err(DeviceError::NoDeviceFound);
        }
        if self.devices.len() == 1 {
            return Err(DeviceError::NoAlternateDevice);
        }
        let next = match self.devices.iter().position(|d| &d.id == current) {
            Some(idx) => &self.devices[(idx + 1) % self.devices.len()],
            None => self
                .devices
                .iter()
                .find(|d| &d.id != current)
                .ok_or(DeviceError::NoAlternateDevice)?,
        };
        Ok(next.id.clone())
    }

    pub fn active(&self) -> Option<&DeviceId> {
        self.active.as_ref()
    }

    pub fn set_active(&mut self, id: Option<DeviceId>) {
        self.active = id;
    }
}

// src/monitor/capability.rs

use std::fmt;

use async_trait::async_trait;

/// Device capability failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// Fatal to session start; the gate may be retried.
    CameraDenied(String),
    /// Logged only; fullscreen is best-effort.
    FullscreenDenied(String),
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityError::CameraDenied(msg) => write!(f, "camera access denied: {}", msg),
            CapabilityError::FullscreenDenied(msg) => write!(f, "fullscreen denied: {}", msg),
        }
    }
}

impl std::error::Error for CapabilityError {}

/// Exclusive ownership of an open camera stream.
///
/// The release hook runs exactly once: on [`CameraLease::release`] or on
/// drop, whichever comes first.
pub struct CameraLease {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl CameraLease {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Returns `true` if this call released the stream.
    pub fn release(&mut self) -> bool {
        match self.release.take() {
            Some(hook) => {
                hook();
                tracing::debug!("camera stream released");
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl fmt::Debug for CameraLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraLease")
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Access to the respondent's camera and display.
#[async_trait]
pub trait DeviceCapabilities: Send + Sync {
    async fn acquire_camera(&self) -> Result<CameraLease, CapabilityError>;
    async fn enter_fullscreen(&self) -> Result<(), CapabilityError>;
}

/// What the gate obtained.
#[derive(Debug)]
pub struct GateGrant {
    pub camera: Option<CameraLease>,
    pub fullscreen: bool,
}

/// Camera first, then fullscreen. Only a camera failure blocks the start.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityGate {
    pub camera_required: bool,
    pub fullscreen_required: bool,
}

impl CapabilityGate {
    pub async fn open(&self, devices: &dyn DeviceCapabilities) -> Result<GateGrant, CapabilityError> {
        let camera = if self.camera_required {
            let lease = devices.acquire_camera().await.map_err(|e| {
                tracing::warn!("Capability gate refused session start: {}", e);
                e
            })?;
            Some(lease)
        } else {
            None
        };

        let fullscreen = if self.fullscreen_required {
            match devices.enter_fullscreen().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Continuing without fullscreen: {}", e);
                    false
                }
            }
        } else {
            false
        };

        Ok(GateGrant { camera, fullscreen })
    }
}

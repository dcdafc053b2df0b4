//! Device-agnostic camera ownership: opening with an index fallback, reading
//! frames, and releasing the handle.

use tracing::{debug, info, warn};

use crate::types::{CameraState, CaptureError, Frame, SharedCameraState};

/// Low-level capture backend. Implementations own at most one device handle.
pub trait VideoDevice: Send {
    /// Open the device at `index`, applying `size` as a resolution hint.
    fn open(&mut self, index: i32, size: (i32, i32)) -> Result<(), CaptureError>;
    /// Read the next frame from an opened device.
    fn read(&mut self) -> Result<Frame, CaptureError>;
    /// Drop the device handle. Must tolerate being called when nothing is open.
    fn release(&mut self);
}

#[derive(Clone, Copy, Debug)]
pub struct CameraSettings {
    pub preferred_index: i32,
    pub fallback_index: i32,
    pub size: (i32, i32),
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            preferred_index: 1,
            fallback_index: 0,
            size: (640, 480),
        }
    }
}

/// Owns the capture device and publishes its [`CameraState`].
pub struct CameraSource {
    device: Box<dyn VideoDevice>,
    settings: CameraSettings,
    state: SharedCameraState,
    active_index: Option<i32>,
}

impl CameraSource {
    pub fn new(
        device: Box<dyn VideoDevice>,
        settings: CameraSettings,
        state: SharedCameraState,
    ) -> Self {
        Self {
            device,
            settings,
            state,
            active_index: None,
        }
    }

    /// Index of the currently opened device, if any.
    pub fn active_index(&self) -> Option<i32> {
        self.active_index
    }

    /// Try the preferred device, then the fallback one.
    pub fn open(&mut self) -> Result<i32, CaptureError> {
        let CameraSettings {
            preferred_index,
            fallback_index,
            size,
        } = self.settings;

        let mut candidates = vec![preferred_index];
        if fallback_index != preferred_index {
            candidates.push(fallback_index);
        }

        for index in candidates {
            match self.device.open(index, size) {
                Ok(()) => {
                    self.active_index = Some(index);
                    let previous = self.state.set(CameraState::Open);
                    info!(
                        index,
                        width = size.0,
                        height = size.1,
                        previous = previous.label(),
                        "camera opened"
                    );
                    return Ok(index);
                }
                Err(err) => {
                    debug!(index, "camera open attempt failed: {err}");
                    self.device.release();
                }
            }
        }

        self.active_index = None;
        self.state.set(CameraState::Failed);
        let fallback = (fallback_index != preferred_index).then_some(fallback_index);
        warn!(
            preferred = preferred_index,
            ?fallback,
            "camera unavailable"
        );
        Err(CaptureError::Unavailable {
            index: preferred_index,
            fallback,
        })
    }

    /// Read one frame. Any failure marks the camera as failed.
    pub fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.state.get() != CameraState::Open {
            return Err(CaptureError::NotOpen);
        }
        match self.device.read() {
            Ok(frame) => Ok(frame),
            Err(err) => {
                self.state.set(CameraState::Failed);
                Err(err)
            }
        }
    }

    /// Free the device handle. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.active_index.take().is_some() {
            debug!("releasing camera");
        }
        self.device.release();
        if self.state.get() == CameraState::Open {
            self.state.set(CameraState::Uninitialized);
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

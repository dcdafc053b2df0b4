//! Camera acquisition for the scanner: device backends, the [`CameraSource`]
//! state machine, and reconnect-with-backoff recovery.

#[cfg(feature = "opencv")]
mod camera;
mod reconnect;
mod source;
mod types;

#[cfg(feature = "opencv")]
pub use camera::OpenCvDevice;
pub use reconnect::{ReconnectPolicy, Reconnector, RecoveryOutcome};
pub use source::{CameraSettings, CameraSource, VideoDevice};
pub use types::{CameraState, CaptureError, Frame, FrameFormat, SharedCameraState};

/// Placeholder device used when no capture backend is compiled in.
///
/// Every open attempt fails, so the service runs permanently degraded and
/// only accepts manual scans.
#[derive(Debug, Default)]
pub struct UnavailableDevice;

impl VideoDevice for UnavailableDevice {
    fn open(&mut self, index: i32, _size: (i32, i32)) -> Result<(), CaptureError> {
        Err(CaptureError::Unavailable {
            index,
            fallback: None,
        })
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        Err(CaptureError::NotOpen)
    }

    fn release(&mut self) {}
}

/// Best capture backend available in this build.
pub fn default_device() -> Box<dyn VideoDevice> {
    #[cfg(feature = "opencv")]
    {
        Box::new(OpenCvDevice::new())
    }
    #[cfg(not(feature = "opencv"))]
    {
        tracing::warn!("built without the `opencv` feature; camera capture is unavailable");
        Box::new(UnavailableDevice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_device_never_opens() {
        let state = SharedCameraState::new();
        let mut camera = CameraSource::new(
            Box::new(UnavailableDevice),
            CameraSettings::default(),
            state.clone(),
        );

        assert!(camera.open().is_err());
        assert_eq!(state.get(), CameraState::Failed);
        assert!(camera.read_frame().is_err());
        camera.release();
        camera.release();
    }
}

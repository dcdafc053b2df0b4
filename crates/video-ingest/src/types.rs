use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use anyhow::Error;
use thiserror::Error;

/// Raw frame captured from a video source.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

impl Frame {
    /// Expected byte length of a tightly packed frame with the given layout.
    pub fn expected_len(width: i32, height: i32, format: FrameFormat) -> usize {
        (width.max(0) as usize) * (height.max(0) as usize) * format.channels()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
    Rgb8,
}

impl FrameFormat {
    pub fn channels(self) -> usize {
        match self {
            FrameFormat::Bgr8 | FrameFormat::Rgb8 => 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no camera available at index {index} (fallback {fallback:?})")]
    Unavailable { index: i32, fallback: Option<i32> },
    #[error("camera is not open")]
    NotOpen,
    #[error("failed to read frame: {0}")]
    ReadFailure(String),
    #[error(transparent)]
    Other(#[from] Error),
}

/// Lifecycle of the capture device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraState {
    Uninitialized,
    Open,
    Failed,
}

impl CameraState {
    pub fn label(self) -> &'static str {
        match self {
            CameraState::Uninitialized => "uninitialized",
            CameraState::Open => "open",
            CameraState::Failed => "failed",
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            CameraState::Uninitialized => 0,
            CameraState::Open => 1,
            CameraState::Failed => 2,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => CameraState::Open,
            2 => CameraState::Failed,
            _ => CameraState::Uninitialized,
        }
    }
}

/// Camera state readable from any thread. Only the owning [`CameraSource`]
/// writes to it.
///
/// [`CameraSource`]: crate::CameraSource
#[derive(Clone, Debug)]
pub struct SharedCameraState {
    inner: Arc<AtomicU8>,
}

impl Default for SharedCameraState {
    fn default() -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(CameraState::Uninitialized.to_raw())),
        }
    }
}

impl SharedCameraState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> CameraState {
        CameraState::from_raw(self.inner.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: CameraState) -> CameraState {
        CameraState::from_raw(self.inner.swap(state.to_raw(), Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_state_starts_uninitialized_and_tracks_updates() {
        let state = SharedCameraState::new();
        let reader = state.clone();
        assert_eq!(reader.get(), CameraState::Uninitialized);

        let previous = state.set(CameraState::Open);
        assert_eq!(previous, CameraState::Uninitialized);
        assert_eq!(reader.get(), CameraState::Open);

        state.set(CameraState::Failed);
        assert_eq!(reader.get(), CameraState::Failed);
    }

    #[test]
    fn expected_len_ignores_negative_dimensions() {
        assert_eq!(Frame::expected_len(4, 2, FrameFormat::Bgr8), 24);
        assert_eq!(Frame::expected_len(-1, 2, FrameFormat::Rgb8), 0);
    }
}

//! OpenCV-backed camera device.

use chrono::Utc;
use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::debug;

use crate::{
    source::VideoDevice,
    types::{CaptureError, Frame, FrameFormat},
};

/// Local V4L/UVC camera opened by index.
pub struct OpenCvDevice {
    cap: Option<VideoCapture>,
    target_size: (i32, i32),
    frame: Mat,
    scratch: Mat,
}

impl OpenCvDevice {
    pub fn new() -> Self {
        Self {
            cap: None,
            target_size: (0, 0),
            frame: Mat::default(),
            scratch: Mat::default(),
        }
    }
}

impl Default for OpenCvDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDevice for OpenCvDevice {
    fn open(&mut self, index: i32, size: (i32, i32)) -> Result<(), CaptureError> {
        self.release();
        let mut cap = open_video_capture(index)?;
        configure_camera(&mut cap, size);
        self.cap = Some(cap);
        self.target_size = size;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let cap = self.cap.as_mut().ok_or(CaptureError::NotOpen)?;

        let grabbed = cap
            .read(&mut self.frame)
            .map_err(|e| CaptureError::ReadFailure(e.to_string()))?;
        if !grabbed {
            return Err(CaptureError::ReadFailure("device returned no frame".into()));
        }

        let size = self
            .frame
            .size()
            .map_err(|e| CaptureError::ReadFailure(e.to_string()))?;
        if size.width <= 0 || size.height <= 0 {
            return Err(CaptureError::ReadFailure("empty frame".into()));
        }

        let (target_w, target_h) = self.target_size;
        let working = if size.width != target_w || size.height != target_h {
            opencv::imgproc::resize(
                &self.frame,
                &mut self.scratch,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &self.scratch
        } else {
            &self.frame
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        Ok(Frame {
            data,
            width: target_w,
            height: target_h,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        })
    }

    fn release(&mut self) {
        if let Some(mut cap) = self.cap.take() {
            if let Err(err) = cap.release() {
                debug!("camera release reported an error: {err}");
            }
        }
    }
}

impl Drop for OpenCvDevice {
    fn drop(&mut self) {
        self.release();
    }
}

/// Open a camera by index, preferring the V4L backend.
fn open_video_capture(index: i32) -> Result<VideoCapture, CaptureError> {
    for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
        match VideoCapture::new(index, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                debug!(index, backend, "failed to open device: {err}");
            }
        }
    }

    Err(CaptureError::Unavailable {
        index,
        fallback: None,
    })
}

/// Apply resolution hints and a preferred pixel format.
fn configure_camera(cap: &mut VideoCapture, size: (i32, i32)) {
    let mut fourcc_set = false;
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        if matches!(cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64), Ok(true)) {
            fourcc_set = true;
        }
    }
    if !fourcc_set {
        if let Ok(yuyv) = videoio::VideoWriter::fourcc('Y', 'U', 'Y', 'V') {
            let _ = cap.set(videoio::CAP_PROP_FOURCC, yuyv as f64);
        }
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, size.1 as f64);
}

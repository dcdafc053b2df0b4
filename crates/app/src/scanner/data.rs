//! Shared state between the capture thread and the HTTP handlers.
//!
//! Each holder owns its own lock and only ever holds it for a clone or swap;
//! encoding and network I/O always happen on values taken out of the lock.

use std::sync::{Arc, Mutex};

use image::RgbImage;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

/// Rectangle of the frame where decoding is attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct GuidingRegion {
    pub(crate) left: u32,
    pub(crate) top: u32,
    pub(crate) right: u32,
    pub(crate) bottom: u32,
}

impl Default for GuidingRegion {
    fn default() -> Self {
        Self {
            left: 100,
            top: 100,
            right: 540,
            bottom: 380,
        }
    }
}

impl GuidingRegion {
    /// Region restricted to a `width`x`height` frame, or `None` if nothing of
    /// it remains visible.
    pub(crate) fn clamped(self, width: u32, height: u32) -> Option<Self> {
        let right = self.right.min(width);
        let bottom = self.bottom.min(height);
        if self.left >= right || self.top >= bottom {
            return None;
        }
        Some(Self {
            left: self.left,
            top: self.top,
            right,
            bottom,
        })
    }

    pub(crate) fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub(crate) fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Annotated frame as handed to stream viewers. Immutable once published.
pub(crate) struct PublishedFrame {
    pub(crate) image: RgbImage,
    pub(crate) frame_number: u64,
    pub(crate) timestamp_ms: i64,
}

/// Single-slot holder of the latest annotated frame.
#[derive(Default)]
pub(crate) struct FrameBuffer {
    latest: Mutex<Option<Arc<PublishedFrame>>>,
}

impl FrameBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame; an unread previous frame is dropped.
    pub(crate) fn publish(&self, frame: PublishedFrame) {
        let frame = Arc::new(frame);
        match self.latest.lock() {
            Ok(mut guard) => *guard = Some(frame),
            Err(poisoned) => {
                error!("frame buffer lock poisoned; recovering");
                *poisoned.into_inner() = Some(frame);
            }
        }
    }

    /// Latest frame, or `None` before the first publish.
    pub(crate) fn snapshot(&self) -> Option<Arc<PublishedFrame>> {
        match self.latest.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }
}

/// Where the current code came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CodeSource {
    Camera,
    Manual,
}

pub(crate) const MANUAL_SYMBOLOGY: &str = "MANUAL";

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DetectedCode {
    pub(crate) value: String,
    pub(crate) symbology: String,
    pub(crate) source: CodeSource,
}

/// Body of `GET /latest_barcode`.
#[derive(Serialize)]
pub(crate) struct CodeResponse<'a> {
    pub(crate) data: &'a str,
    #[serde(rename = "type")]
    pub(crate) symbology: &'a str,
}

impl<'a> From<&'a DetectedCode> for CodeResponse<'a> {
    fn from(code: &'a DetectedCode) -> Self {
        Self {
            data: &code.value,
            symbology: &code.symbology,
        }
    }
}

/// Product data returned by the lookup service, kept verbatim.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub(crate) struct ProductRecord(pub(crate) Value);

/// Latest decoded code and latest resolved product, under independent locks.
#[derive(Default)]
pub(crate) struct DetectionState {
    code: Mutex<Option<DetectedCode>>,
    product: Mutex<Option<ProductRecord>>,
}

impl DetectionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a camera detection unless it repeats the current value.
    ///
    /// Returns `true` when the code became current and a lookup is due.
    pub(crate) fn observe_camera_code(&self, value: &str, symbology: &str) -> bool {
        let Ok(mut guard) = self.code.lock() else {
            error!("detection lock poisoned; dropping camera detection");
            return false;
        };
        if let Some(current) = guard.as_ref() {
            if current.value == value {
                return false;
            }
            if current.source == CodeSource::Manual {
                debug!(previous = %current.value, "camera detection replaces manual code");
            }
        }
        *guard = Some(DetectedCode {
            value: value.to_string(),
            symbology: symbology.to_string(),
            source: CodeSource::Camera,
        });
        true
    }

    /// Make a manually entered code current, regardless of the previous one.
    pub(crate) fn set_manual_code(&self, value: &str) {
        let code = DetectedCode {
            value: value.to_string(),
            symbology: MANUAL_SYMBOLOGY.to_string(),
            source: CodeSource::Manual,
        };
        match self.code.lock() {
            Ok(mut guard) => *guard = Some(code),
            Err(_) => error!("detection lock poisoned; dropping manual code"),
        }
    }

    pub(crate) fn current_code(&self) -> Option<DetectedCode> {
        match self.code.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }

    /// Store the outcome of a lookup; `None` records an absent product.
    pub(crate) fn store_product(&self, product: Option<ProductRecord>) {
        match self.product.lock() {
            Ok(mut guard) => *guard = product,
            Err(_) => error!("product lock poisoned; dropping lookup result"),
        }
    }

    pub(crate) fn current_product(&self) -> Option<ProductRecord> {
        match self.product.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }
}

//! Capture loop: read, annotate, decode at a throttled interval, publish.
//!
//! The loop owns the camera exclusively. Detections feed [`DetectionState`]
//! and hand lookups to the resolver; every readable frame is published,
//! whether or not a code was found in it.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use image::{GrayImage, RgbImage};
use tracing::{debug, info, warn};
use video_ingest::{CameraSource, Reconnector, RecoveryOutcome};

use crate::scanner::{
    annotation::{crop_region, draw_detection, draw_guide, frame_to_rgb},
    data::{DetectionState, FrameBuffer, GuidingRegion, PublishedFrame},
    decode::CodeDecoder,
    resolver::ProductResolver,
};

#[derive(Clone, Copy, Debug)]
pub(crate) struct PipelineSettings {
    /// Minimum gap between a new detection and the next decode attempt.
    pub(crate) scan_interval: Duration,
    /// Cooperative sleep between iterations.
    pub(crate) idle_interval: Duration,
}

/// Result of a single capture iteration.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Published {
        frame_number: u64,
        new_code: Option<String>,
    },
    /// A frame arrived but could not be turned into an image.
    Dropped,
    /// Reading failed; the camera needs recovering.
    CameraFailed,
}

pub(crate) struct ScanPipeline {
    camera: CameraSource,
    reconnector: Reconnector,
    decoder: Box<dyn CodeDecoder>,
    guide: GuidingRegion,
    frames: Arc<FrameBuffer>,
    detection: Arc<DetectionState>,
    resolver: ProductResolver,
    settings: PipelineSettings,
    last_scan: Option<Instant>,
    frame_number: u64,
}

impl ScanPipeline {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        camera: CameraSource,
        reconnector: Reconnector,
        decoder: Box<dyn CodeDecoder>,
        guide: GuidingRegion,
        frames: Arc<FrameBuffer>,
        detection: Arc<DetectionState>,
        resolver: ProductResolver,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            camera,
            reconnector,
            decoder,
            guide,
            frames,
            detection,
            resolver,
            settings,
            last_scan: None,
            frame_number: 0,
        }
    }

    /// Initial open. Failure is not fatal: the loop's recovery path keeps
    /// retrying while health reports degraded.
    pub(crate) fn start(&mut self) {
        match self.camera.open() {
            Ok(index) => debug!(index, "capture starting"),
            Err(err) => warn!("camera unavailable at startup ({err}); will keep retrying"),
        }
    }

    /// Run one iteration at time `now`.
    pub(crate) fn step(&mut self, now: Instant) -> StepOutcome {
        let started = Instant::now();
        let frame = match self.camera.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                metrics::counter!("scanner_camera_read_failures_total").increment(1);
                warn!("frame read failed: {err}");
                return StepOutcome::CameraFailed;
            }
        };
        self.reconnector.mark_healthy();
        metrics::counter!("scanner_frames_captured_total").increment(1);

        let mut image = match frame_to_rgb(&frame) {
            Ok(image) => image,
            Err(err) => {
                metrics::counter!("scanner_frames_dropped_total").increment(1);
                warn!("dropping unusable frame: {err}");
                return StepOutcome::Dropped;
            }
        };

        let region = self.guide.clamped(image.width(), image.height());
        // Crop before the outline lands on the region border.
        let crop = region
            .filter(|_| self.scan_due(now))
            .map(|region| (region, crop_region(&image, region)));
        if let Some(region) = region {
            draw_guide(&mut image, region);
        }

        let new_code = crop.and_then(|(region, crop)| self.scan(&mut image, region, &crop, now));

        self.frame_number += 1;
        self.frames.publish(PublishedFrame {
            image,
            frame_number: self.frame_number,
            timestamp_ms: frame.timestamp_ms,
        });
        metrics::counter!("scanner_frames_published_total").increment(1);
        metrics::histogram!("scanner_capture_stage_seconds").record(started.elapsed().as_secs_f64());

        StepOutcome::Published {
            frame_number: self.frame_number,
            new_code,
        }
    }

    fn scan_due(&self, now: Instant) -> bool {
        self.last_scan
            .is_none_or(|last| now.saturating_duration_since(last) > self.settings.scan_interval)
    }

    fn scan(
        &mut self,
        image: &mut RgbImage,
        region: GuidingRegion,
        crop: &GrayImage,
        now: Instant,
    ) -> Option<String> {
        metrics::counter!("scanner_decode_attempts_total").increment(1);
        let symbols = match self.decoder.decode(crop) {
            Ok(symbols) => symbols,
            Err(err) => {
                metrics::counter!("scanner_decode_errors_total").increment(1);
                debug!("decode attempt failed: {err}");
                return None;
            }
        };

        let symbol = symbols.into_iter().find(|symbol| !symbol.value.is_empty())?;
        // Any readable code restarts the pause, repeats included.
        self.last_scan = Some(now);
        if !self
            .detection
            .observe_camera_code(&symbol.value, &symbol.symbology)
        {
            return None;
        }

        metrics::counter!("scanner_codes_detected_total").increment(1);
        info!(
            barcode = %symbol.value,
            symbology = %symbol.symbology,
            "new code detected"
        );
        draw_detection(image, &symbol, (region.left, region.top));
        self.resolver.dispatch(&symbol.value);
        Some(symbol.value)
    }

    /// Loop until `shutdown` fires (or its sender goes away), then release
    /// the camera.
    pub(crate) fn run(mut self, shutdown: Receiver<()>) {
        let span = tracing::info_span!("scanner.capture", guide = ?self.guide);
        let _guard = span.enter();

        self.start();
        loop {
            if self.step(Instant::now()) == StepOutcome::CameraFailed {
                metrics::counter!("scanner_camera_reconnects_total").increment(1);
                let outcome = self
                    .reconnector
                    .recover(&mut self.camera, |delay| pause(&shutdown, delay));
                match outcome {
                    RecoveryOutcome::Interrupted => break,
                    RecoveryOutcome::Reopened | RecoveryOutcome::StillFailed => continue,
                }
            }
            if !pause(&shutdown, self.settings.idle_interval) {
                break;
            }
        }

        self.camera.release();
        info!(frames = self.frame_number, "capture loop stopped");
    }
}

/// Sleep for `delay` unless shutdown is signalled first; `false` means stop.
fn pause(shutdown: &Receiver<()>, delay: Duration) -> bool {
    match shutdown.recv_timeout(delay) {
        Err(RecvTimeoutError::Timeout) => true,
        Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
    }
}

//! Camera barcode scanner: captures frames, decodes codes inside a guiding
//! region, resolves them against a product service and serves a live preview.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `pipeline`: The capture → annotate → decode → publish loop.
//! - `decode`: Barcode decoder seam and the QR implementation.
//! - `annotation`: Guide, highlight and label drawing.
//! - `resolver`: Product lookups and their fire-and-forget dispatch.
//! - `data`: Frame buffer and detection state shared between threads.
//! - `encoding`: JPEG and multipart framing for stream viewers.
//! - `service`: Read-side accessors and manual scans for the HTTP layer.
//! - `health`: Camera-derived health report.
//! - `server`: Actix Web endpoints.
//! - `telemetry`: Tracing, Chrome traces and Prometheus metrics.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use video_ingest::{CameraSource, Reconnector, SharedCameraState};

pub(crate) use config::{ScannerArgs, ScannerConfig};

use crate::scanner::{
    data::{DetectionState, FrameBuffer},
    decode::QrDecoder,
    pipeline::{PipelineSettings, ScanPipeline},
    resolver::{HttpProductLookup, ProductLookup, ProductResolver},
    server::{announce, spawn_scan_server},
    service::ScanService,
};

mod annotation;
mod config;
mod data;
mod decode;
mod encoding;
mod health;
mod pipeline;
mod resolver;
mod server;
mod service;
mod telemetry;

/// Run the scanner until Ctrl+C.
pub(crate) fn run(config: ScannerConfig) -> Result<()> {
    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry);
    if let Err(err) = telemetry::init_metrics_recorder() {
        warn!("metrics disabled: {err}");
    }

    let scanner_span = tracing::info_span!(
        "scanner",
        camera = config.camera.preferred_index,
        fallback = config.camera.fallback_index,
        width = config.camera.size.0,
        height = config.camera.size.1,
        lookup = %config.lookup_url,
        port = config.port
    );
    let _scanner_guard = scanner_span.enter();

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    let camera_state = SharedCameraState::new();
    let camera = CameraSource::new(
        video_ingest::default_device(),
        config.camera,
        camera_state.clone(),
    );

    let detection = Arc::new(DetectionState::new());
    let frames = Arc::new(FrameBuffer::new());
    // The blocking client must be dropped outside the HTTP runtime, so this
    // thread keeps the last reference.
    let lookup: Arc<dyn ProductLookup> = Arc::new(HttpProductLookup::new(
        config.lookup_url.clone(),
        config.lookup_timeout,
    )?);
    let resolver = ProductResolver::new(lookup.clone(), detection.clone());

    let service = ScanService::new(
        detection.clone(),
        frames.clone(),
        camera_state,
        resolver.clone(),
    );
    let server = spawn_scan_server(service, config.host.clone(), config.port, config.jpeg_quality)?;
    announce(&config.host, config.port);

    let pipeline = ScanPipeline::new(
        camera,
        Reconnector::new(config.reconnect),
        Box::new(QrDecoder),
        config.guide,
        frames,
        detection,
        resolver,
        PipelineSettings {
            scan_interval: config.scan_interval,
            idle_interval: config.idle_interval,
        },
    );
    let capture = telemetry::spawn_thread("scanner-capture", move || pipeline.run(shutdown_rx))
        .context("Failed to spawn capture thread")?;

    if capture.join().is_err() {
        error!("capture thread panicked");
    }
    info!("shutting down HTTP server");
    server.stop();
    drop(lookup);
    Ok(())
}

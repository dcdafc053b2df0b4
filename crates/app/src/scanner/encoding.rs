//! JPEG encoding and multipart framing for the preview stream.

use std::time::Instant;

use actix_web::web::Bytes;
use anyhow::{Result, anyhow};
use image::{RgbImage, codecs::jpeg::JpegEncoder};

pub(crate) const STREAM_BOUNDARY: &str = "frame";

pub(crate) fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let started = Instant::now();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    metrics::histogram!("scanner_jpeg_encode_seconds").record(started.elapsed().as_secs_f64());
    Ok(buffer)
}

/// Wrap one JPEG as a part of a `multipart/x-mixed-replace` body.
pub(crate) fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 64);
    payload.extend_from_slice(b"--");
    payload.extend_from_slice(STREAM_BOUNDARY.as_bytes());
    payload.extend_from_slice(b"\r\n");
    payload.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

/// Last chunk encoded for one viewer, so an unchanged frame is not re-encoded.
#[derive(Default)]
pub(crate) struct ViewerCache {
    last: Option<(u64, Bytes)>,
}

impl ViewerCache {
    pub(crate) fn get(&self, frame_number: u64) -> Option<Bytes> {
        match &self.last {
            Some((cached, chunk)) if *cached == frame_number => Some(chunk.clone()),
            _ => None,
        }
    }

    pub(crate) fn store(&mut self, frame_number: u64, chunk: Bytes) {
        self.last = Some((frame_number, chunk));
    }
}

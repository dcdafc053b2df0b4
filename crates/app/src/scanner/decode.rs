//! Barcode decoding over the guiding-region crop.
//!
//! Candidate order is whatever the decoder reports; callers take the first
//! one and make no further ordering promise when several codes are visible.

use image::GrayImage;
use thiserror::Error;
use tracing::{debug, trace};

/// One decoded symbol, with corners relative to the decoded image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DecodedSymbol {
    pub(crate) value: String,
    pub(crate) symbology: String,
    pub(crate) corners: Vec<(i32, i32)>,
}

#[derive(Debug, Error)]
pub(crate) enum DecodeError {
    #[error("decode region is empty")]
    EmptyRegion,
    #[error("found {found} symbol(s) but none decoded: {last_error}")]
    Unreadable { found: usize, last_error: String },
}

pub(crate) trait CodeDecoder: Send {
    fn decode(&self, region: &GrayImage) -> Result<Vec<DecodedSymbol>, DecodeError>;
}

pub(crate) const QR_SYMBOLOGY: &str = "QRCODE";

/// QR code decoder backed by `rqrr`.
#[derive(Default)]
pub(crate) struct QrDecoder;

impl CodeDecoder for QrDecoder {
    fn decode(&self, region: &GrayImage) -> Result<Vec<DecodedSymbol>, DecodeError> {
        let (width, height) = region.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::EmptyRegion);
        }

        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                region.get_pixel(x as u32, y as u32).0[0]
            });
        let grids = prepared.detect_grids();
        trace!(candidates = grids.len(), "QR grid detection complete");

        let found = grids.len();
        let mut symbols = Vec::with_capacity(found);
        let mut last_error = None;
        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => {
                    let corners = grid.bounds.iter().map(|p| (p.x, p.y)).collect();
                    symbols.push(DecodedSymbol {
                        value: content,
                        symbology: QR_SYMBOLOGY.to_string(),
                        corners,
                    });
                }
                Err(err) => {
                    debug!("failed to decode QR grid: {err}");
                    last_error = Some(err.to_string());
                }
            }
        }

        match last_error {
            Some(last_error) if symbols.is_empty() => {
                Err(DecodeError::Unreadable { found, last_error })
            }
            _ => Ok(symbols),
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    #[test]
    fn blank_region_yields_no_candidates() {
        let region = GrayImage::from_pixel(120, 80, Luma([255]));
        let symbols = QrDecoder.decode(&region).unwrap();
        assert!(symbols.is_empty());
    }

    #[test]
    fn empty_region_is_an_error() {
        let region = GrayImage::new(0, 0);
        assert!(matches!(
            QrDecoder.decode(&region),
            Err(DecodeError::EmptyRegion)
        ));
    }
}

use anyhow::{Result, anyhow};
use image::{GrayImage, Rgb, RgbImage, imageops};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_line_segment_mut},
    rect::Rect,
};
use video_ingest::{Frame, FrameFormat};

use crate::scanner::{data::GuidingRegion, decode::DecodedSymbol};

const GUIDE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const HIGHLIGHT_COLOR: Rgb<u8> = Rgb([255, 64, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_BACKING: Rgb<u8> = Rgb([0, 0, 0]);
const GLYPH_ADVANCE: i32 = 6;
const GLYPH_HEIGHT: i32 = 7;

/// Convert a captured frame into an RGB image we can draw on.
pub(crate) fn frame_to_rgb(frame: &Frame) -> Result<RgbImage> {
    let expected = Frame::expected_len(frame.width, frame.height, frame.format);
    if frame.data.len() < expected || expected == 0 {
        return Err(anyhow!(
            "frame buffer holds {} bytes, expected {expected} for {}x{}",
            frame.data.len(),
            frame.width,
            frame.height
        ));
    }

    let data = match frame.format {
        FrameFormat::Bgr8 => bgr_to_rgb(&frame.data[..expected]),
        FrameFormat::Rgb8 => frame.data[..expected].to_vec(),
    };
    RgbImage::from_raw(frame.width as u32, frame.height as u32, data)
        .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))
}

/// Grayscale copy of the guiding region, as fed to the decoder.
pub(crate) fn crop_region(image: &RgbImage, region: GuidingRegion) -> GrayImage {
    let view = imageops::crop_imm(
        image,
        region.left,
        region.top,
        region.width(),
        region.height(),
    )
    .to_image();
    imageops::grayscale(&view)
}

/// Outline the guiding region with a 2px border.
pub(crate) fn draw_guide(image: &mut RgbImage, region: GuidingRegion) {
    for inset in 0..2u32 {
        let width = region.width().saturating_sub(inset * 2);
        let height = region.height().saturating_sub(inset * 2);
        if width == 0 || height == 0 {
            break;
        }
        let rect = Rect::at((region.left + inset) as i32, (region.top + inset) as i32)
            .of_size(width, height);
        draw_hollow_rect_mut(image, rect, GUIDE_COLOR);
    }
}

/// Highlight a decoded symbol and label it with its value and symbology.
///
/// Symbol corners are relative to the guiding region and get shifted by its
/// origin before drawing.
pub(crate) fn draw_detection(image: &mut RgbImage, symbol: &DecodedSymbol, origin: (u32, u32)) {
    let (ox, oy) = (origin.0 as i32, origin.1 as i32);
    let points: Vec<(f32, f32)> = symbol
        .corners
        .iter()
        .map(|&(x, y)| ((x + ox) as f32, (y + oy) as f32))
        .collect();

    for (idx, start) in points.iter().enumerate() {
        let end = points[(idx + 1) % points.len()];
        draw_line_segment_mut(image, *start, end, HIGHLIGHT_COLOR);
    }

    let anchor_x = symbol.corners.iter().map(|&(x, _)| x).min().unwrap_or(0) + ox;
    let anchor_y = symbol.corners.iter().map(|&(_, y)| y).min().unwrap_or(0) + oy;

    let width = image.width() as i32;
    let max_chars = ((width - 4) / GLYPH_ADVANCE).max(1) as usize;
    let text: String = format!("{} ({})", symbol.value, symbol.symbology)
        .chars()
        .take(max_chars)
        .collect();
    let text_width = text.chars().count() as i32 * GLYPH_ADVANCE;

    let label_x = anchor_x.clamp(0, (width - text_width - 2).max(0));
    let label_y = (anchor_y - GLYPH_HEIGHT - 5).max(0);
    fill_rect(
        image,
        label_x - 2,
        label_y - 2,
        label_x + text_width,
        label_y + GLYPH_HEIGHT + 1,
        LABEL_BACKING,
    );
    draw_label(image, label_x, label_y, &text, LABEL_COLOR);
}

fn bgr_to_rgb(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for y in top..=bottom {
        for x in left..=right {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

fn draw_label(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col;
                        if px >= 0 && px < width {
                            *image.get_pixel_mut(px as u32, py as u32) = color;
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ' ' => [0, 0, 0, 0, 0, 0, 0],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([10, 10, 10]))
    }

    #[test]
    fn bgr_frames_are_swizzled_to_rgb() {
        let frame = Frame {
            data: vec![1, 2, 3, 4, 5, 6],
            width: 2,
            height: 1,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        };
        let image = frame_to_rgb(&frame).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgb([3, 2, 1]));
        assert_eq!(image.get_pixel(1, 0), &Rgb([6, 5, 4]));
    }

    #[test]
    fn short_frame_buffers_are_rejected() {
        let frame = Frame {
            data: vec![0; 5],
            width: 2,
            height: 1,
            timestamp_ms: 0,
            format: FrameFormat::Rgb8,
        };
        assert!(frame_to_rgb(&frame).is_err());
    }

    #[test]
    fn guide_outline_is_drawn_on_region_border_only() {
        let mut image = blank(64, 48);
        let region = GuidingRegion {
            left: 10,
            top: 8,
            right: 50,
            bottom: 40,
        };
        draw_guide(&mut image, region);

        assert_eq!(image.get_pixel(10, 8), &GUIDE_COLOR);
        assert_eq!(image.get_pixel(11, 20), &GUIDE_COLOR);
        assert_eq!(image.get_pixel(49, 39), &GUIDE_COLOR);
        assert_eq!(image.get_pixel(30, 20), &Rgb([10, 10, 10]));
    }

    #[test]
    fn crop_region_matches_region_size() {
        let image = blank(64, 48);
        let region = GuidingRegion {
            left: 4,
            top: 6,
            right: 20,
            bottom: 30,
        };
        let crop = crop_region(&image, region);
        assert_eq!(crop.dimensions(), (16, 24));
    }

    #[test]
    fn detection_highlight_is_offset_by_region_origin() {
        let mut image = blank(200, 120);
        let symbol = DecodedSymbol {
            value: "ABC-123".into(),
            symbology: "QRCODE".into(),
            corners: vec![(10, 20), (40, 20), (40, 50), (10, 50)],
        };
        draw_detection(&mut image, &symbol, (30, 30));

        assert_eq!(image.get_pixel(40, 50), &HIGHLIGHT_COLOR);
        assert_eq!(image.get_pixel(70, 65), &HIGHLIGHT_COLOR);
        assert_eq!(image.get_pixel(55, 65), &Rgb([10, 10, 10]));

        let label_row = (50 - GLYPH_HEIGHT - 5) as u32;
        let label_pixels = (40..120)
            .filter(|&x| *image.get_pixel(x, label_row) != Rgb([10, 10, 10]))
            .count();
        assert!(label_pixels > 0, "label backing should be drawn above the symbol");
    }

    #[test]
    fn label_near_the_edge_stays_inside_the_frame() {
        let mut image = blank(40, 20);
        let symbol = DecodedSymbol {
            value: "A-VERY-LONG-CODE-VALUE".into(),
            symbology: "QRCODE".into(),
            corners: vec![(0, 0), (5, 0), (5, 5), (0, 5)],
        };
        draw_detection(&mut image, &symbol, (30, 10));
        assert_eq!(image.dimensions(), (40, 20));
    }

    #[test]
    fn every_digit_and_letter_has_a_glyph() {
        for ch in ('A'..='Z').chain('0'..='9') {
            assert!(glyph_bits(ch).is_some(), "missing glyph for {ch}");
        }
        assert!(glyph_bits('~').is_none());
    }
}

use image::{RgbImage, imageops};
use mupdf::{Colorspace, Matrix};

use crate::error::{Error, Result};
use super::structure::BoundingBox;

/// Rasterize a whole page at `scale` pixels per point.
pub(crate) fn render_page(page: &mupdf::Page, page_num: usize, scale: f32) -> Result<RgbImage> {
    let matrix = Matrix::new_scale(scale, scale);

    // No alpha channel: the page is rendered over white like a viewer would show it
    let pixmap = page
        .to_pixmap(&matrix, &Colorspace::device_rgb(), 0.0, true)
        .map_err(|e| Error::PdfRender {
            page: page_num,
            reason: format!("Failed to render: {e}"),
        })?;

    let n = pixmap.n() as usize;
    let rgb = samples_to_rgb(pixmap.samples(), n).ok_or_else(|| Error::PdfRender {
        page: page_num,
        reason: format!("Unexpected pixel format with {n} components"),
    })?;

    RgbImage::from_raw(pixmap.width(), pixmap.height(), rgb).ok_or_else(|| Error::PdfRender {
        page: page_num,
        reason: "Failed to create image buffer".to_string(),
    })
}

/// Convert packed mupdf samples to RGB8, compositing any alpha over white.
fn samples_to_rgb(samples: &[u8], n: usize) -> Option<Vec<u8>> {
    if n == 0 {
        return None;
    }
    let mut rgb = Vec::with_capacity(samples.len() / n * 3);

    for chunk in samples.chunks_exact(n) {
        match n {
            1 => rgb.extend_from_slice(&[chunk[0]; 3]),
            2 => rgb.extend_from_slice(&[over_white(chunk[0], chunk[1]); 3]),
            3 => rgb.extend_from_slice(chunk),
            4 => rgb.extend(chunk[..3].iter().map(|&c| over_white(c, chunk[3]))),
            _ => return None,
        }
    }

    Some(rgb)
}

/// Composite a premultiplied channel value over a white background.
#[allow(clippy::cast_possible_truncation)] // result is <= 255
const fn over_white(value: u8, alpha: u8) -> u8 {
    let v = value as u16 + (255 - alpha as u16);
    if v > 255 { 255 } else { v as u8 }
}

/// Cut the pixels covering `bbox` out of a page raster rendered at `scale`.
///
/// The region is clamped to the raster; a box entirely outside the page
/// yields a zero-area image.
pub(crate) fn crop_region(raster: &RgbImage, bbox: &BoundingBox, scale: f32) -> RgbImage {
    let (x0, x1) = pixel_span(bbox.x0, bbox.x1, scale, raster.width());
    let (y0, y1) = pixel_span(bbox.y0, bbox.y1, scale, raster.height());
    imageops::crop_imm(raster, x0, y0, x1 - x0, y1 - y0).to_image()
}

/// Map a point interval to a clamped pixel interval `[start, end)`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn pixel_span(from: f32, to: f32, scale: f32, limit: u32) -> (u32, u32) {
    let clamp = |v: f32| v.max(0.0).min(limit as f32) as u32;
    let start = clamp((from * scale).floor());
    let end = clamp((to * scale).ceil());
    (start, end.max(start))
}

use std::path::Path;

use image::RgbImage;

use crate::error::Result;
use super::structure::{BoundingBox, FontHandle, PageOverlay, PageSize, Rgb, StructuredPage};

/// Narrow interface to a document backend.
///
/// Reads (`structured_text`, `render_crop`) always reflect the source
/// document as opened. Writes (`fill_rect`, `merge_overlay`) accumulate in
/// memory and only reach the filesystem through `save`.
pub trait DocumentAccess: Send {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Page dimensions in points
    fn page_size(&self, page: usize) -> Result<PageSize>;

    /// Block → line → span tree of a page, in reading order
    fn structured_text(&self, page: usize) -> Result<StructuredPage>;

    /// Rasterize `bbox` of a page at `scale` pixels per point
    fn render_crop(&self, page: usize, bbox: &BoundingBox, scale: f32) -> Result<RgbImage>;

    /// Load a TrueType font file and make it available to overlays
    fn register_font(&mut self, name: &str, path: &Path) -> Result<FontHandle>;

    /// Paint an opaque, borderless rectangle
    fn fill_rect(&mut self, page: usize, bbox: &BoundingBox, color: Rgb) -> Result<()>;

    /// Draw overlay text above everything painted so far on the page
    fn merge_overlay(&mut self, page: usize, overlay: &PageOverlay) -> Result<()>;

    /// Persist the modified document
    fn save(&mut self, path: &Path) -> Result<()>;
}

use std::collections::{BTreeMap, HashSet};
use std::io::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};

use image::RgbImage;
use lopdf::ObjectId;
use mupdf::Document as MuDocument;
use tracing::debug;

use crate::error::{Error, Result};
use super::access::DocumentAccess;
use super::font::{EmbeddedFont, add_font_to_page};
use super::overlay::{
    PageFrame, append_content_to_page, fill_rects_content, isolate_page_content, page_box,
    page_rotation, text_runs_content,
};
use super::render::{crop_region, render_page};
use super::structure::{BoundingBox, FontHandle, PageOverlay, PageSize, Rgb, StructuredPage};
use super::text::structured_page;

/// A font embedded into the output document
struct RegisteredFont {
    handle: FontHandle,
    font: EmbeddedFont,
    object_id: ObjectId,
}

/// Last page raster, reused while consecutive crops hit the same page
struct PageRaster {
    page: usize,
    scale: f32,
    image: Arc<RgbImage>,
}

/// PDF backend: mupdf reads the untouched source, lopdf carries the edits.
pub struct PdfDocument {
    /// Source bytes; every read goes through these
    source: Arc<Vec<u8>>,
    /// Output document that fills and overlays are written into
    output: lopdf::Document,
    /// Page object ids in page order
    page_ids: Vec<ObjectId>,
    fonts: Vec<RegisteredFont>,
    /// (page, font resource) pairs already added to page resources
    page_fonts: HashSet<(usize, String)>,
    /// Fill rectangles not yet written, per page
    pending_fills: BTreeMap<usize, Vec<(BoundingBox, Rgb)>>,
    /// Pages whose source content is already enclosed in `q`/`Q`
    isolated_pages: HashSet<usize>,
    raster: Mutex<Option<PageRaster>>,
}

impl PdfDocument {
    /// Open a PDF from a file path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            Error::DocumentOpen(format!("Failed to read file {}: {}", path.display(), e))
        })?;
        Self::from_bytes(bytes)
    }

    /// Open a PDF from bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();

        let mu_doc = MuDocument::from_bytes(&bytes, "")
            .map_err(|e| Error::DocumentOpen(format!("Failed to parse PDF: {e}")))?;
        let mu_pages = mu_doc
            .page_count()
            .map_err(|e| Error::DocumentOpen(format!("Failed to get page count: {e}")))?;

        let output = lopdf::Document::load_mem(&bytes)
            .map_err(|e| Error::DocumentOpen(format!("Failed to load PDF structure: {e}")))?;
        let page_ids: Vec<ObjectId> = output.get_pages().into_values().collect();

        if usize::try_from(mu_pages).ok() != Some(page_ids.len()) {
            return Err(Error::DocumentOpen(format!(
                "page tree mismatch: renderer sees {mu_pages} pages, writer sees {}",
                page_ids.len()
            )));
        }

        Ok(Self {
            source: Arc::new(bytes),
            output,
            page_ids,
            fonts: Vec::new(),
            page_fonts: HashSet::new(),
            pending_fills: BTreeMap::new(),
            isolated_pages: HashSet::new(),
            raster: Mutex::new(None),
        })
    }

    /// Serialize the current state of the output document.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.flush_all_fills()?;
        let mut output = Vec::new();
        self.output
            .save_to(&mut output)
            .map_err(|e| Error::PdfSave(format!("Failed to serialize PDF: {e}")))?;
        Ok(output)
    }

    fn check_page(&self, page: usize) -> Result<ObjectId> {
        self.page_ids.get(page).copied().ok_or(Error::PdfInvalidPage {
            page,
            total: self.page_ids.len(),
        })
    }

    fn frame(&self, page: usize) -> Result<PageFrame> {
        let page_id = self.check_page(page)?;
        Ok(PageFrame::new(page_box(&self.output, page_id))
            .with_rotation(page_rotation(&self.output, page_id)))
    }

    /// Load a source page with a fresh mupdf handle.
    fn with_source_page<T>(
        &self,
        page: usize,
        f: impl FnOnce(&mupdf::Page) -> Result<T>,
    ) -> Result<T> {
        self.check_page(page)?;
        let index = i32::try_from(page).map_err(|_| Error::PdfInvalidPage {
            page,
            total: self.page_ids.len(),
        })?;

        let doc = MuDocument::from_bytes(&self.source, "")
            .map_err(|e| Error::DocumentOpen(format!("Failed to open document: {e}")))?;
        let mu_page = doc.load_page(index).map_err(|e| Error::PdfRender {
            page,
            reason: format!("Failed to load page: {e}"),
        })?;
        f(&mu_page)
    }

    fn page_raster(&self, page: usize, scale: f32) -> Result<Arc<RgbImage>> {
        let mut memo = self.raster.lock().map_err(|_| Error::PdfRender {
            page,
            reason: "raster cache lock poisoned".to_string(),
        })?;

        if let Some(raster) = memo.as_ref()
            && raster.page == page
            && raster.scale.to_bits() == scale.to_bits()
        {
            return Ok(Arc::clone(&raster.image));
        }

        debug!("Rasterizing page {} at scale {}", page, scale);
        let image = Arc::new(self.with_source_page(page, |p| render_page(p, page, scale))?);
        *memo = Some(PageRaster {
            page,
            scale,
            image: Arc::clone(&image),
        });
        Ok(image)
    }

    fn flush_fills(&mut self, page: usize) -> Result<()> {
        let Some(rects) = self.pending_fills.remove(&page) else {
            return Ok(());
        };
        if rects.is_empty() {
            return Ok(());
        }
        let frame = self.frame(page)?;
        self.append_content(page, &fill_rects_content(&frame, &rects))
    }

    /// Append to a page, first shielding new content from the state the
    /// source content leaves behind.
    fn append_content(&mut self, page: usize, content: &str) -> Result<()> {
        let page_id = self.check_page(page)?;
        if self.isolated_pages.insert(page) {
            isolate_page_content(&mut self.output, page_id)?;
        }
        append_content_to_page(&mut self.output, page_id, content)
    }

    fn flush_all_fills(&mut self) -> Result<()> {
        let pages: Vec<usize> = self.pending_fills.keys().copied().collect();
        for page in pages {
            self.flush_fills(page)?;
        }
        Ok(())
    }
}

impl DocumentAccess for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize> {
        Ok(self.frame(page)?.size())
    }

    fn structured_text(&self, page: usize) -> Result<StructuredPage> {
        self.with_source_page(page, |p| structured_page(p, page))
    }

    fn render_crop(&self, page: usize, bbox: &BoundingBox, scale: f32) -> Result<RgbImage> {
        let raster = self.page_raster(page, scale)?;
        Ok(crop_region(&raster, bbox, scale))
    }

    fn register_font(&mut self, name: &str, path: &Path) -> Result<FontHandle> {
        if let Some(existing) = self.fonts.iter().find(|f| f.handle.name == name) {
            return Ok(existing.handle.clone());
        }

        let font = EmbeddedFont::load(name, path)?;
        let object_id = font.embed(&mut self.output)?;
        let handle = FontHandle {
            name: font.name().to_string(),
            resource: format!("FRelay{}", self.fonts.len()),
        };
        debug!("Registered font {} as /{}", handle.name, handle.resource);

        self.fonts.push(RegisteredFont {
            handle: handle.clone(),
            font,
            object_id,
        });
        Ok(handle)
    }

    fn fill_rect(&mut self, page: usize, bbox: &BoundingBox, color: Rgb) -> Result<()> {
        self.check_page(page)?;
        self.pending_fills.entry(page).or_default().push((*bbox, color));
        Ok(())
    }

    fn merge_overlay(&mut self, page: usize, overlay: &PageOverlay) -> Result<()> {
        // Fills go first so the text lands above them
        self.flush_fills(page)?;
        if overlay.is_empty() {
            return Ok(());
        }

        let page_id = self.check_page(page)?;
        let frame = self.frame(page)?;
        let registered = self
            .fonts
            .iter()
            .find(|f| f.handle == overlay.font)
            .ok_or_else(|| Error::FontResource {
                name: overlay.font.name.clone(),
                reason: "font was not registered with this document".to_string(),
            })?;

        let content = text_runs_content(&frame, &registered.font, &registered.handle.resource, &overlay.runs)?;
        let key = (page, registered.handle.resource.clone());
        let object_id = registered.object_id;

        if !self.page_fonts.contains(&key) {
            add_font_to_page(&mut self.output, page_id, &key.1, object_id)?;
            self.page_fonts.insert(key);
        }
        self.append_content(page, &content)
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;

        // Write next to the target and rename, so a failure never leaves a partial file
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::PdfSave(format!("Failed to create temp file in {}: {e}", dir.display())))?;
        tmp.write_all(&bytes)
            .map_err(|e| Error::PdfSave(format!("Failed to write output: {e}")))?;
        tmp.persist(path)
            .map_err(|e| Error::PdfSave(format!("Failed to persist {}: {}", path.display(), e.error)))?;

        debug!("Saved {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("page_count", &self.page_ids.len())
            .field("source_len", &self.source.len())
            .field("fonts", &self.fonts.len())
            .finish_non_exhaustive()
    }
}

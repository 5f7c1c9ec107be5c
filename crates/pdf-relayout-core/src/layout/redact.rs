use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::Result;
use crate::pdf::{DocumentAccess, Rgb};
use super::background::resolve_background;
use super::extract::{Block, BlockId};

/// Paints each block's inferred background over its bounding box.
#[derive(Debug, Clone, Copy, Default)]
pub struct Redactor;

impl Redactor {
    pub const fn new() -> Self {
        Self
    }

    /// Redact every page, returning the blocks left untouched.
    pub fn redact<D: DocumentAccess + ?Sized>(
        &self,
        doc: &mut D,
        pages: &BTreeMap<usize, Vec<Block>>,
    ) -> Result<Vec<BlockId>> {
        let mut unredacted = Vec::new();
        for (&page, blocks) in pages {
            unredacted.extend(self.redact_page(&mut *doc, page, blocks)?);
        }
        Ok(unredacted)
    }

    /// Redact the blocks of one page.
    ///
    /// All backgrounds are resolved before the first fill is issued. A block
    /// whose background cannot be resolved is skipped and returned; the
    /// other blocks are still painted.
    pub fn redact_page<D: DocumentAccess + ?Sized>(
        &self,
        doc: &mut D,
        page: usize,
        blocks: &[Block],
    ) -> Result<Vec<BlockId>> {
        let mut fills: Vec<(&Block, Rgb)> = Vec::with_capacity(blocks.len());
        let mut unredacted = Vec::new();

        for block in blocks {
            let Some(crop) = &block.raster_crop else {
                warn!("{}: no raster crop, leaving original text in place", block.id);
                unredacted.push(block.id);
                continue;
            };
            match resolve_background(crop) {
                Ok(color) => fills.push((block, color)),
                Err(e) => {
                    warn!("{}: skipping redaction: {}", block.id, e);
                    unredacted.push(block.id);
                }
            }
        }

        for (block, color) in fills {
            debug!("{}: fill {} over {:?}", block.id, color, block.bbox.as_array());
            doc.fill_rect(page, &block.bbox, color)?;
        }

        Ok(unredacted)
    }
}

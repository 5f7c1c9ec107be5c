use std::collections::BTreeMap;

use image::RgbImage;
use serde::Serialize;
use tracing::debug;

use crate::config::LayoutConfig;
use crate::error::Result;
use crate::pdf::{BlockKind, BoundingBox, DocumentAccess, StructBlock};
use super::consensus::{consensus, consensus_size};

/// Position of a block: page index plus its index among the page's blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockId {
    pub page: usize,
    pub index: usize,
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page {} block {}", self.page, self.index)
    }
}

/// A text region with one representative style.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub bbox: BoundingBox,
    /// Source text, one span per line
    pub text: String,
    pub font_size: f32,
    /// Packed `0xRRGGBB`
    pub font_color: u32,
    pub font_family: String,
    /// Pixels under `bbox`; only needed until the block is redacted
    pub raster_crop: Option<RgbImage>,
    pub translated_text: Option<String>,
}

impl Block {
    /// Text to draw: the translation, if there is a non-empty one.
    pub fn overlay_text(&self) -> Option<&str> {
        self.translated_text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Turns a page's structural text tree into styled blocks.
#[derive(Debug, Clone, Copy)]
pub struct BlockExtractor {
    scale: f32,
}

impl BlockExtractor {
    /// `scale` is raster pixels per point for the block crops
    pub const fn new(scale: f32) -> Self {
        Self { scale }
    }

    pub fn from_config(config: &LayoutConfig) -> Self {
        Self::new(config.render_scale())
    }

    /// Blocks of every page, keyed by page index.
    pub fn extract<D: DocumentAccess + ?Sized>(&self, doc: &D) -> Result<BTreeMap<usize, Vec<Block>>> {
        (0..doc.page_count())
            .map(|page| Ok((page, self.extract_page(doc, page)?)))
            .collect()
    }

    /// Blocks of one page, in the structural tree's order.
    pub fn extract_page<D: DocumentAccess + ?Sized>(&self, doc: &D, page: usize) -> Result<Vec<Block>> {
        let structure = doc.structured_text(page)?;
        let mut blocks = Vec::new();

        for struct_block in &structure.blocks {
            if struct_block.kind != BlockKind::Text {
                continue;
            }
            let id = BlockId {
                page,
                index: blocks.len(),
            };
            let Some(mut block) = consolidate(id, struct_block)? else {
                continue;
            };
            block.raster_crop = Some(doc.render_crop(page, &block.bbox, self.scale)?);
            blocks.push(block);
        }

        debug!(
            "Page {}: {} text blocks out of {} structural blocks",
            page,
            blocks.len(),
            structure.blocks.len()
        );
        Ok(blocks)
    }
}

/// Merge a structural text block into one block record, or `None` when it
/// holds no visible text.
fn consolidate(id: BlockId, struct_block: &StructBlock) -> Result<Option<Block>> {
    let spans: Vec<_> = struct_block
        .lines
        .iter()
        .flat_map(|line| &line.spans)
        .filter(|span| !span.text.trim().is_empty())
        .collect();

    if spans.is_empty() {
        return Ok(None);
    }

    let text = spans
        .iter()
        .map(|span| span.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Some(Block {
        id,
        bbox: struct_block.bbox.normalized(),
        text,
        font_size: consensus_size(spans.iter().map(|s| s.font_size))?,
        font_color: consensus(spans.iter().map(|s| s.font_color))?,
        font_family: consensus(spans.iter().map(|s| s.font_family.clone()))?,
        raster_crop: None,
        translated_text: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{Line, Span};

    fn span(text: &str, size: f32, color: u32, family: &str) -> Span {
        Span {
            text: text.to_string(),
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            font_size: size,
            font_color: color,
            font_family: family.to_string(),
        }
    }

    fn text_block(bbox: BoundingBox, lines: Vec<Vec<Span>>) -> StructBlock {
        StructBlock {
            kind: BlockKind::Text,
            bbox,
            lines: lines.into_iter().map(|spans| Line { spans }).collect(),
        }
    }

    const ID: BlockId = BlockId { page: 0, index: 0 };

    #[test]
    fn test_spans_joined_by_newline() {
        let block = text_block(
            BoundingBox::new(0.0, 0.0, 100.0, 40.0),
            vec![
                vec![span("Hello", 12.0, 0, "Helvetica"), span(" world", 12.0, 0, "Helvetica")],
                vec![span("again", 12.0, 0, "Helvetica")],
            ],
        );
        let consolidated = consolidate(ID, &block).ok().flatten();
        assert_eq!(consolidated.map(|b| b.text).as_deref(), Some("Hello\n world\nagain"));
    }

    #[test]
    fn test_blank_spans_contribute_nothing() {
        let block = text_block(
            BoundingBox::new(0.0, 0.0, 100.0, 40.0),
            vec![vec![
                span("   ", 30.0, 0xFF0000, "Blank"),
                span("Body", 10.0, 0x333333, "Serif"),
                span("", 30.0, 0xFF0000, "Blank"),
            ]],
        );
        let Some(b) = consolidate(ID, &block).ok().flatten() else {
            panic!("block with visible text must be kept");
        };
        assert_eq!(b.text, "Body");
        assert!((b.font_size - 10.0).abs() < f32::EPSILON);
        assert_eq!(b.font_color, 0x333333);
        assert_eq!(b.font_family, "Serif");
    }

    #[test]
    fn test_block_without_text_dropped() {
        let block = text_block(
            BoundingBox::new(0.0, 0.0, 100.0, 40.0),
            vec![vec![span(" ", 12.0, 0, "")], vec![]],
        );
        assert!(matches!(consolidate(ID, &block), Ok(None)));
    }

    #[test]
    fn test_style_attributes_resolved_independently() {
        let block = text_block(
            BoundingBox::new(0.0, 0.0, 100.0, 40.0),
            vec![vec![
                span("a", 12.0, 0x111111, "Sans"),
                span("b", 14.0, 0x222222, "Serif"),
                span("c", 14.0, 0x111111, "Serif"),
            ]],
        );
        let Some(b) = consolidate(ID, &block).ok().flatten() else {
            panic!("expected a block");
        };
        assert!((b.font_size - 14.0).abs() < f32::EPSILON);
        assert_eq!(b.font_color, 0x111111);
        assert_eq!(b.font_family, "Serif");
    }

    #[test]
    fn test_bbox_comes_from_block_and_is_normalized() {
        // Spans sit elsewhere; the block rectangle wins
        let block = text_block(
            BoundingBox::new(-5.0, 80.0, 120.0, 20.0),
            vec![vec![span("x", 12.0, 0, "")]],
        );
        let Some(b) = consolidate(ID, &block).ok().flatten() else {
            panic!("expected a block");
        };
        assert_eq!(b.bbox, BoundingBox::new(0.0, 20.0, 120.0, 80.0));
        assert!(b.bbox.y0 <= b.bbox.y1);
    }

    #[test]
    fn test_overlay_text_ignores_blank_translation() {
        let mut b = consolidate(
            ID,
            &text_block(BoundingBox::new(0.0, 0.0, 1.0, 1.0), vec![vec![span("x", 1.0, 0, "")]]),
        )
        .ok()
        .flatten()
        .unwrap_or_else(|| panic!("expected a block"));

        assert_eq!(b.overlay_text(), None);
        b.translated_text = Some("  \n".to_string());
        assert_eq!(b.overlay_text(), None);
        b.translated_text = Some("y".to_string());
        assert_eq!(b.overlay_text(), Some("y"));
    }

    #[test]
    fn test_block_id_display() {
        assert_eq!(BlockId { page: 2, index: 7 }.to_string(), "page 2 block 7");
    }
}

//! Re-layout of translated text inside the original block rectangles.
//!
//! Lines come from the translation's own line breaks; nothing is re-wrapped.
//! Each line occupies `font_size` below the cursor (its baseline sits at
//! `cursor + font_size`) and the cursor then advances by
//! `line_height_factor * font_size`. A line fits when its baseline lies no
//! further below the block's bottom edge than a descender: extraction boxes
//! span ascent to descent, which for many fonts is less than one em.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{LayoutConfig, OverflowPolicy};
use crate::error::Result;
use crate::pdf::{DocumentAccess, FontHandle, PageOverlay, Rgb, TextRun};
use super::extract::{Block, BlockId};

/// Slack for float accumulation when testing the bottom edge
const FIT_EPSILON: f32 = 1e-3;

/// Part of the em allowed below the baseline when testing the bottom edge
const DESCENT_ALLOWANCE: f32 = 0.25;

/// Font size decrement used by [`OverflowPolicy::Shrink`]
const SHRINK_STEP: f32 = 0.5;

/// Translated text that did not fit its block at the size it was drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverflowReport {
    pub block: BlockId,
    /// Lines whose glyphs would cross the block's bottom edge
    pub overflowing_lines: usize,
    /// Whether those lines were drawn anyway
    pub drawn: bool,
    /// Size the block was drawn at (smaller than the source when shrunk)
    pub font_size: f32,
}

/// Placement of one block's lines.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLayout {
    pub runs: Vec<TextRun>,
    pub font_size: f32,
    /// Line advance used
    pub line_height: f32,
    /// Cursor after the last drawn line
    pub cursor: f32,
    pub total_lines: usize,
    /// Lines that fit inside the block
    pub fitting_lines: usize,
}

impl BlockLayout {
    pub const fn overflowing_lines(&self) -> usize {
        self.total_lines - self.fitting_lines
    }
}

fn fits(block: &Block, baseline: f32, font_size: f32) -> bool {
    baseline <= DESCENT_ALLOWANCE.mul_add(font_size, block.bbox.y1) + FIT_EPSILON
}

/// Draws translated text into redacted blocks with one registered font.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    font: FontHandle,
    line_height_factor: f32,
    overflow: OverflowPolicy,
    min_font_size: f32,
}

impl OverlayRenderer {
    pub fn new(font: FontHandle, config: &LayoutConfig) -> Self {
        Self {
            font,
            line_height_factor: config.line_height_factor,
            overflow: config.overflow,
            min_font_size: config.min_font_size,
        }
    }

    /// Register the overlay font with `doc` and build a renderer for it.
    ///
    /// A font failure is fatal for the whole run.
    pub fn register<D: DocumentAccess + ?Sized>(
        doc: &mut D,
        font_name: &str,
        font_path: &Path,
        config: &LayoutConfig,
    ) -> Result<Self> {
        let font = doc.register_font(font_name, font_path)?;
        Ok(Self::new(font, config))
    }

    pub const fn font(&self) -> &FontHandle {
        &self.font
    }

    /// Lay out a block's translation, applying the overflow policy.
    ///
    /// `None` when the block has nothing to draw.
    pub fn layout(&self, block: &Block) -> Option<BlockLayout> {
        let text = block.overlay_text()?;
        let lines: Vec<&str> = text.trim_end_matches(['\n', '\r']).lines().collect();

        let mut layout = self.place(block, &lines, block.font_size);

        if self.overflow == OverflowPolicy::Shrink {
            let mut size = block.font_size;
            while layout.fitting_lines < layout.total_lines && size - SHRINK_STEP >= self.min_font_size {
                size -= SHRINK_STEP;
                layout = self.place(block, &lines, size);
            }
        }

        if self.overflow != OverflowPolicy::Overdraw {
            layout.runs.retain(|run| fits(block, run.baseline, run.font_size));
            #[allow(clippy::cast_precision_loss)]
            let drawn = layout.fitting_lines as f32;
            layout.cursor = layout.line_height.mul_add(drawn, block.bbox.y0);
        }

        Some(layout)
    }

    /// Place every line at `font_size`, counting how many fit.
    #[allow(clippy::cast_precision_loss)]
    fn place(&self, block: &Block, lines: &[&str], font_size: f32) -> BlockLayout {
        let line_height = self.line_height_factor * font_size;
        let color = Rgb::from_packed(block.font_color);
        let top = block.bbox.y0;

        let mut runs = Vec::with_capacity(lines.len());
        let mut fitting_lines = 0;

        for (i, line) in lines.iter().enumerate() {
            let cursor = line_height.mul_add(i as f32, top);
            let baseline = cursor + font_size;
            if fits(block, baseline, font_size) {
                fitting_lines += 1;
            }
            if !line.trim().is_empty() {
                runs.push(TextRun {
                    text: (*line).to_string(),
                    x: block.bbox.x0,
                    baseline,
                    font_size,
                    color,
                });
            }
        }

        BlockLayout {
            runs,
            font_size,
            line_height,
            cursor: line_height.mul_add(lines.len() as f32, top),
            total_lines: lines.len(),
            fitting_lines,
        }
    }

    /// Draw the translations of one page's blocks and merge them into it.
    ///
    /// Blocks listed in `skip` are left alone. Block records are not modified.
    pub fn render_page<D: DocumentAccess + ?Sized>(
        &self,
        doc: &mut D,
        page: usize,
        blocks: &[Block],
        skip: &HashSet<BlockId>,
    ) -> Result<Vec<OverflowReport>> {
        let mut overlay = PageOverlay::new(self.font.clone());
        let mut reports = Vec::new();

        for block in blocks {
            if skip.contains(&block.id) {
                debug!("{}: not redacted, no overlay", block.id);
                continue;
            }
            if !(block.font_size > 0.0) {
                warn!("{}: font size {} cannot be drawn", block.id, block.font_size);
                continue;
            }
            let Some(layout) = self.layout(block) else {
                continue;
            };

            if layout.overflowing_lines() > 0 {
                warn!(
                    "{}: {} of {} lines overflow at {}pt",
                    block.id,
                    layout.overflowing_lines(),
                    layout.total_lines,
                    layout.font_size
                );
                reports.push(OverflowReport {
                    block: block.id,
                    overflowing_lines: layout.overflowing_lines(),
                    drawn: self.overflow == OverflowPolicy::Overdraw,
                    font_size: layout.font_size,
                });
            }
            overlay.runs.extend(layout.runs);
        }

        doc.merge_overlay(page, &overlay)?;
        Ok(reports)
    }

    /// Render every page, collecting overflow reports.
    pub fn render<D: DocumentAccess + ?Sized>(
        &self,
        doc: &mut D,
        pages: &BTreeMap<usize, Vec<Block>>,
        skip: &HashSet<BlockId>,
    ) -> Result<Vec<OverflowReport>> {
        let mut reports = Vec::new();
        for (&page, blocks) in pages {
            reports.extend(self.render_page(&mut *doc, page, blocks, skip)?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::BoundingBox;

    fn renderer(overflow: OverflowPolicy) -> OverlayRenderer {
        let config = LayoutConfig {
            overflow,
            ..LayoutConfig::default()
        };
        OverlayRenderer::new(
            FontHandle {
                name: "Test".to_string(),
                resource: "F0".to_string(),
            },
            &config,
        )
    }

    fn block(bbox: BoundingBox, font_size: f32, translated: &str) -> Block {
        Block {
            id: BlockId { page: 0, index: 0 },
            bbox,
            text: "source".to_string(),
            font_size,
            font_color: 0x00_0000,
            font_family: String::new(),
            raster_crop: None,
            translated_text: Some(translated.to_string()),
        }
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_line_height_scales_with_font_size() {
        let b = block(BoundingBox::new(0.0, 0.0, 200.0, 60.0), 12.0, "one\ntwo\nthree");
        let Some(layout) = renderer(OverflowPolicy::Clip).layout(&b) else {
            panic!("expected a layout");
        };

        assert!(approx(layout.line_height, 14.4));
        assert_eq!(layout.runs.len(), 3);
        assert_eq!(layout.overflowing_lines(), 0);
        assert!(approx(layout.cursor, 43.2));
        assert!(layout.cursor <= b.bbox.y1);

        let steps: Vec<f32> = layout.runs.windows(2).map(|w| w[1].baseline - w[0].baseline).collect();
        assert!(steps.iter().all(|s| approx(*s, 14.4)));

        // Twice the size, twice the step
        let big = block(BoundingBox::new(0.0, 0.0, 200.0, 200.0), 24.0, "a\nb");
        let big_layout = renderer(OverflowPolicy::Clip).layout(&big);
        assert!(big_layout.is_some_and(|l| approx(l.line_height, 28.8)));
    }

    #[test]
    fn test_first_line_starts_at_block_origin() {
        let b = block(BoundingBox::new(10.0, 10.0, 110.0, 30.0), 12.0, "Xin chào");
        let Some(layout) = renderer(OverflowPolicy::Clip).layout(&b) else {
            panic!("expected a layout");
        };
        assert_eq!(layout.runs.len(), 1);
        let run = &layout.runs[0];
        assert!(approx(run.x, 10.0));
        assert!(approx(run.baseline, 22.0));
        assert_eq!(run.color, Rgb::BLACK);
        assert_eq!(layout.overflowing_lines(), 0);
    }

    #[test]
    fn test_clip_reports_undrawn_lines() {
        let b = block(BoundingBox::new(0.0, 0.0, 100.0, 20.0), 14.0, "1\n2\n3\n4\n5");
        let Some(layout) = renderer(OverflowPolicy::Clip).layout(&b) else {
            panic!("expected a layout");
        };
        assert_eq!(layout.total_lines, 5);
        assert_eq!(layout.overflowing_lines(), 4);
        assert_eq!(layout.runs.len(), 1);
        assert!(layout.runs.iter().all(|r| r.baseline <= b.bbox.y1));
    }

    #[test]
    fn test_line_box_shorter_than_em_still_fits() {
        // Ascent + descent of 0.9em: an 11pt line box for 12pt text
        let b = block(BoundingBox::new(10.0, 10.0, 110.0, 21.0), 12.0, "Xin chào");
        let Some(layout) = renderer(OverflowPolicy::Clip).layout(&b) else {
            panic!("expected a layout");
        };
        assert_eq!(layout.runs.len(), 1);
        assert_eq!(layout.overflowing_lines(), 0);
        assert!(approx(layout.runs[0].baseline, 22.0));
    }

    #[test]
    fn test_overdraw_draws_everything_but_still_reports() {
        let b = block(BoundingBox::new(0.0, 0.0, 100.0, 20.0), 14.0, "1\n2\n3\n4\n5");
        let Some(layout) = renderer(OverflowPolicy::Overdraw).layout(&b) else {
            panic!("expected a layout");
        };
        assert_eq!(layout.runs.len(), 5);
        assert_eq!(layout.overflowing_lines(), 4);
        assert!(layout.cursor > b.bbox.y1);
    }

    #[test]
    fn test_shrink_reduces_size_until_fit() {
        // The second baseline sits at 1.2 * size + size, allowed 0.25 * size below 24
        let b = block(BoundingBox::new(0.0, 0.0, 100.0, 24.0), 14.0, "first\nsecond");
        let Some(layout) = renderer(OverflowPolicy::Shrink).layout(&b) else {
            panic!("expected a layout");
        };
        assert_eq!(layout.overflowing_lines(), 0);
        assert_eq!(layout.runs.len(), 2);
        assert!(layout.font_size < 14.0);
        // 1.95 * size <= 24 holds first at 12
        assert!(approx(layout.font_size, 12.0));
    }

    #[test]
    fn test_shrink_stops_at_minimum_then_clips() {
        let b = block(BoundingBox::new(0.0, 0.0, 100.0, 10.0), 12.0, "a\nb\nc\nd");
        let Some(layout) = renderer(OverflowPolicy::Shrink).layout(&b) else {
            panic!("expected a layout");
        };
        assert!(approx(layout.font_size, 6.0));
        assert!(layout.overflowing_lines() > 0);
        assert!(layout.runs.iter().all(|r| r.baseline <= b.bbox.y1));
    }

    #[test]
    fn test_blank_lines_advance_without_runs() {
        let b = block(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 10.0, "top\n\nbottom\n");
        let Some(layout) = renderer(OverflowPolicy::Clip).layout(&b) else {
            panic!("expected a layout");
        };
        assert_eq!(layout.total_lines, 3);
        assert_eq!(layout.runs.len(), 2);
        assert!(approx(layout.runs[1].baseline - layout.runs[0].baseline, 24.0));
    }

    #[test]
    fn test_text_colour_from_packed_value() {
        let mut b = block(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 10.0, "red");
        b.font_color = 0xCC_0000;
        let runs = renderer(OverflowPolicy::Clip).layout(&b).map(|l| l.runs).unwrap_or_default();
        assert_eq!(runs[0].color, Rgb(0xCC, 0, 0));
    }

    #[test]
    fn test_missing_translation_has_no_layout() {
        let mut b = block(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 10.0, "");
        assert!(renderer(OverflowPolicy::Clip).layout(&b).is_none());
        b.translated_text = None;
        assert!(renderer(OverflowPolicy::Clip).layout(&b).is_none());
    }

    #[test]
    fn test_layout_leaves_block_untouched() {
        let b = block(BoundingBox::new(0.0, 0.0, 50.0, 10.0), 12.0, "x\ny\nz");
        let before = (b.bbox, b.font_size, b.translated_text.clone());
        let _ = renderer(OverflowPolicy::Shrink).layout(&b);
        assert_eq!((b.bbox, b.font_size, b.translated_text.clone()), before);
    }
}

use mupdf::TextPageOptions;

use crate::error::{Error, Result};
use super::structure::{BlockKind, BoundingBox, Line, Span, StructBlock, StructuredPage};

/// Colour reported for spans; mupdf's safe text API carries no fill colour.
pub const DEFAULT_SPAN_COLOR: u32 = 0x00_0000;

/// Two characters belong to the same span when their sizes differ less than this.
const SIZE_TOLERANCE: f32 = 0.01;

/// Walk a mupdf text page into a block → line → span tree.
///
/// Images are not preserved in the text page, so every emitted block is
/// textual. Spans are maximal runs of characters with the same size.
pub(crate) fn structured_page(page: &mupdf::Page, page_num: usize) -> Result<StructuredPage> {
    let text_page = page
        .to_text_page(TextPageOptions::empty())
        .map_err(|e| Error::PdfTextExtraction {
            page: page_num,
            reason: format!("Failed to get text page: {e}"),
        })?;

    let mut blocks = Vec::new();

    for block in text_page.blocks() {
        let mut lines = Vec::new();

        for line in block.lines() {
            let mut builder = SpanBuilder::default();
            for text_char in line.chars() {
                if let Some(c) = text_char.char() {
                    builder.push(c, BoundingBox::from_quad(&text_char.quad()), text_char.size());
                }
            }
            let spans = builder.finish();
            if !spans.is_empty() {
                lines.push(Line { spans });
            }
        }

        blocks.push(StructBlock {
            kind: BlockKind::Text,
            bbox: BoundingBox::from_rect(block.bounds()),
            lines,
        });
    }

    Ok(StructuredPage { blocks })
}

/// Accumulates characters of one line into same-size spans.
#[derive(Default)]
struct SpanBuilder {
    spans: Vec<Span>,
    current: Option<Span>,
}

impl SpanBuilder {
    fn push(&mut self, c: char, bbox: BoundingBox, size: f32) {
        if let Some(span) = self.current.as_mut()
            && (span.font_size - size).abs() < SIZE_TOLERANCE
        {
            span.text.push(c);
            span.bbox = span.bbox.union(bbox);
            return;
        }

        if let Some(done) = self.current.take() {
            self.spans.push(done);
        }
        self.current = Some(Span {
            text: c.to_string(),
            bbox,
            font_size: size,
            font_color: DEFAULT_SPAN_COLOR,
            font_family: String::new(),
        });
    }

    fn finish(mut self) -> Vec<Span> {
        if let Some(done) = self.current.take() {
            self.spans.push(done);
        }
        self.spans
    }
}

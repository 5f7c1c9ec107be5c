//! Content-stream generation for redaction fills and overlay text.
//!
//! # Coordinate System
//!
//! PDF content streams use a **bottom-left origin** (y grows upward), while
//! extraction reports geometry with a **top-left origin** (y grows downward).
//! [`PageFrame`] converts between the two using the page's visible box
//! (CropBox, else MediaBox), which is also the box the rasterizer measures
//! from:
//! ```text
//! pdf_x = box_x0 + x
//! pdf_y = box_y1 - y
//! ```
//! Extraction and rasterization also happen in the *displayed* page, after
//! the page's `/Rotate` is applied, so the frame undoes that rotation too
//! and text is drawn with a rotated text matrix to read upright on screen.

use std::fmt::Write as _;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use super::font::EmbeddedFont;
use super::structure::{BoundingBox, PageSize, Rgb, TextRun};

/// US Letter, used when a page has no resolvable page box
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Page placement in PDF user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFrame {
    /// Visible page box as [x0, y0, x1, y1]
    pub page_box: [f32; 4],
    /// Clockwise display rotation: 0, 90, 180 or 270
    pub rotation: u16,
}

impl PageFrame {
    pub const fn new(page_box: [f32; 4]) -> Self {
        Self { page_box, rotation: 0 }
    }

    /// Same box displayed with `/Rotate degrees`, snapped to a quarter turn.
    #[must_use]
    pub fn with_rotation(mut self, degrees: i64) -> Self {
        self.rotation = match degrees.rem_euclid(360) {
            45..135 => 90,
            135..225 => 180,
            225..315 => 270,
            _ => 0,
        };
        self
    }

    /// Displayed page size.
    pub fn size(&self) -> PageSize {
        let width = self.page_box[2] - self.page_box[0];
        let height = self.page_box[3] - self.page_box[1];
        if self.rotation % 180 == 0 {
            PageSize { width, height }
        } else {
            PageSize {
                width: height,
                height: width,
            }
        }
    }

    /// Convert a top-left displayed point into PDF user space.
    pub fn to_pdf(&self, x: f32, y: f32) -> (f32, f32) {
        let [x0, y0, x1, y1] = self.page_box;
        match self.rotation {
            90 => (x0 + y, y0 + x),
            180 => (x1 - x, y0 + y),
            270 => (x1 - y, y1 - x),
            _ => (x0 + x, y1 - y),
        }
    }

    /// Rectangle operands `x y w h` for `re`, anchored at the lower-left corner.
    pub fn rect_operands(&self, bbox: &BoundingBox) -> [f32; 4] {
        let (ax, ay) = self.to_pdf(bbox.x0, bbox.y0);
        let (bx, by) = self.to_pdf(bbox.x1, bbox.y1);
        [ax.min(bx), ay.min(by), (ax - bx).abs(), (ay - by).abs()]
    }

    /// Text matrix `a b c d e f` placing an upright baseline origin at (x, y).
    pub fn text_matrix(&self, x: f32, y: f32) -> [f32; 6] {
        let (e, f) = self.to_pdf(x, y);
        // Displayed rightward and upward directions in user space
        let [a, b, c, d] = match self.rotation {
            90 => [0.0, 1.0, -1.0, 0.0],
            180 => [-1.0, 0.0, 0.0, -1.0],
            270 => [0.0, -1.0, 1.0, 0.0],
            _ => [1.0, 0.0, 0.0, 1.0],
        };
        [a, b, c, d, e, f]
    }
}

/// Content for a set of opaque, borderless filled rectangles.
pub fn fill_rects_content(frame: &PageFrame, rects: &[(BoundingBox, Rgb)]) -> String {
    let mut content = String::from("q\n");
    for (bbox, color) in rects {
        let [r, g, b] = color.to_unit();
        let [x, y, w, h] = frame.rect_operands(bbox);
        let _ = writeln!(content, "{r} {g} {b} rg");
        let _ = writeln!(content, "{x} {y} {w} {h} re f");
    }
    content.push_str("Q\n");
    content
}

/// Content drawing each run with the given font resource.
pub fn text_runs_content(
    frame: &PageFrame,
    font: &EmbeddedFont,
    resource: &str,
    runs: &[TextRun],
) -> Result<String> {
    let mut content = String::from("q\n");
    // Fill mode; scanned documents often leave invisible mode (3) active
    content.push_str("0 Tr\n");

    for run in runs {
        let [r, g, b] = run.color.to_unit();
        let [ma, mb, mc, md, me, mf] = frame.text_matrix(run.x, run.baseline);
        let glyphs = font.text_to_hex_glyphs(&run.text)?;

        content.push_str("BT\n");
        let _ = writeln!(content, "{r} {g} {b} rg");
        let _ = writeln!(content, "/{resource} {} Tf", run.font_size);
        let _ = writeln!(content, "{ma} {mb} {mc} {md} {me} {mf} Tm");
        let _ = writeln!(content, "<{glyphs}> Tj");
        content.push_str("ET\n");
    }

    content.push_str("Q\n");
    Ok(content)
}

/// Content stream references of a page, with an indirect array expanded.
fn content_parts(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let dict = doc
        .get_dictionary(page_id)
        .map_err(|e| Error::Lopdf(format!("Failed to get page: {e}")))?;

    Ok(match dict.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(arr)) => arr.clone(),
        _ => Vec::new(),
    })
}

fn set_content_parts(doc: &mut Document, page_id: ObjectId, parts: Vec<Object>) -> Result<()> {
    let dict = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| Error::PdfOverlay(format!("page object {page_id:?} is not a dictionary: {e}")))?;
    dict.set("Contents", Object::Array(parts));
    Ok(())
}

fn add_content_stream(doc: &mut Document, content: &[u8]) -> ObjectId {
    doc.add_object(Object::Stream(Stream::new(Dictionary::new(), content.to_vec())))
}

/// `q` operators the page's content leaves on the graphics state stack.
fn unbalanced_saves(doc: &Document, page_id: ObjectId) -> usize {
    let Ok(bytes) = doc.get_page_content(page_id) else {
        return 0;
    };
    let Ok(content) = Content::decode(&bytes) else {
        return 0;
    };
    content.operations.iter().fold(0, |depth, op| match op.operator.as_str() {
        "q" => depth + 1,
        "Q" => depth.saturating_sub(1),
        _ => depth,
    })
}

/// Enclose the page's existing content in `q`/`Q` so later streams start
/// from the default graphics state.
///
/// Saves the source leaves open are closed before the final restore.
pub fn isolate_page_content(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let mut parts = content_parts(doc, page_id)?;
    if parts.is_empty() {
        return Ok(());
    }

    let restore = "Q\n".repeat(unbalanced_saves(doc, page_id) + 1);
    let save_id = add_content_stream(doc, b"q\n");
    let restore_id = add_content_stream(doc, restore.as_bytes());

    parts.insert(0, Object::Reference(save_id));
    parts.push(Object::Reference(restore_id));
    set_content_parts(doc, page_id, parts)
}

/// Append a content stream after the page's existing content.
pub fn append_content_to_page(doc: &mut Document, page_id: ObjectId, content: &str) -> Result<()> {
    let mut parts = content_parts(doc, page_id)?;
    let content_id = add_content_stream(doc, content.as_bytes());
    parts.push(Object::Reference(content_id));
    set_content_parts(doc, page_id, parts)
}

/// Visible box of a page: CropBox if present, else MediaBox, both inheritable.
pub fn page_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let Ok(page) = doc.get_object(page_id) else {
        return DEFAULT_MEDIA_BOX;
    };
    inherited_box(doc, page, b"CropBox", 16)
        .or_else(|| inherited_box(doc, page, b"MediaBox", 16))
        .unwrap_or(DEFAULT_MEDIA_BOX)
}

/// Display rotation of a page in degrees, inherited like the page boxes.
pub fn page_rotation(doc: &Document, page_id: ObjectId) -> i64 {
    doc.get_object(page_id)
        .ok()
        .and_then(|page| inherited_value(doc, page, b"Rotate", 16))
        .and_then(|rotate| match rotate {
            Object::Integer(i) => Some(i),
            #[allow(clippy::cast_possible_truncation)]
            Object::Real(r) => Some(r.round() as i64),
            _ => None,
        })
        .unwrap_or(0)
}

fn inherited_box(doc: &Document, node: &Object, key: &[u8], depth: usize) -> Option<[f32; 4]> {
    let Object::Array(arr) = inherited_value(doc, node, key, depth)? else {
        return None;
    };
    let values: Vec<f32> = arr
        .iter()
        .filter_map(|o| match o {
            #[allow(clippy::cast_precision_loss)]
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r),
            _ => None,
        })
        .collect();
    match values[..] {
        [x0, y0, x1, y1] => Some([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]),
        _ => None,
    }
}

/// Value of `key` on `node` or the nearest ancestor, references resolved.
fn inherited_value(doc: &Document, node: &Object, key: &[u8], depth: usize) -> Option<Object> {
    if depth == 0 {
        return None;
    }
    let Object::Dictionary(dict) = node else {
        return None;
    };

    match dict.get(key) {
        Ok(Object::Reference(id)) => return doc.get_object(*id).ok().cloned(),
        Ok(value) => return Some(value.clone()),
        Err(_) => {}
    }

    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => doc
            .get_object(*parent_id)
            .ok()
            .and_then(|parent| inherited_value(doc, parent, key, depth - 1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER: PageFrame = PageFrame::new([0.0, 0.0, 612.0, 792.0]);

    #[test]
    fn test_to_pdf_flips_y() {
        assert_eq!(LETTER.to_pdf(10.0, 10.0), (10.0, 782.0));
        assert_eq!(LETTER.to_pdf(0.0, 792.0), (0.0, 0.0));
    }

    #[test]
    fn test_to_pdf_respects_page_box_offset() {
        let frame = PageFrame::new([20.0, 30.0, 620.0, 830.0]);
        assert_eq!(frame.to_pdf(0.0, 0.0), (20.0, 830.0));
        assert_eq!(frame.size(), PageSize { width: 600.0, height: 800.0 });
    }

    #[test]
    fn test_rect_operands_anchor_bottom_left() {
        // Top-left box (10,10)-(110,30) on a 792pt page
        let ops = LETTER.rect_operands(&BoundingBox::new(10.0, 10.0, 110.0, 30.0));
        assert_eq!(ops, [10.0, 762.0, 100.0, 20.0]);
    }

    #[test]
    fn test_fill_rects_content() {
        let content = fill_rects_content(
            &LETTER,
            &[(BoundingBox::new(10.0, 10.0, 110.0, 30.0), Rgb::WHITE)],
        );
        assert!(content.starts_with("q\n"));
        assert!(content.contains("1 1 1 rg\n"));
        assert!(content.contains("10 762 100 20 re f\n"));
        assert!(content.ends_with("Q\n"));
    }

    #[test]
    fn test_page_box_inherited_and_normalized() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(lopdf::Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            (
                "MediaBox",
                Object::Array(vec![595.into(), 842.into(), 0.into(), 0.into()]),
            ),
        ]));
        let page_id = doc.add_object(lopdf::Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
        ]));
        assert_eq!(page_box(&doc, page_id), [0.0, 0.0, 595.0, 842.0]);
    }

    #[test]
    fn test_crop_box_preferred_over_media_box() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(lopdf::Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            ),
            (
                "CropBox",
                Object::Array(vec![36.into(), 36.into(), 576.into(), 756.into()]),
            ),
        ]));
        assert_eq!(page_box(&doc, page_id), [36.0, 36.0, 576.0, 756.0]);
    }

    #[test]
    fn test_page_box_default() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(lopdf::Dictionary::new());
        assert_eq!(page_box(&doc, page_id), DEFAULT_MEDIA_BOX);
    }

    #[test]
    fn test_append_content_wraps_existing_reference() {
        let mut doc = Document::with_version("1.5");
        let existing = doc.add_object(Stream::new(lopdf::Dictionary::new(), b"BT ET".to_vec()));
        let page_id = doc.add_object(lopdf::Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Contents", Object::Reference(existing)),
        ]));

        assert!(append_content_to_page(&mut doc, page_id, "q Q").is_ok());

        let page = doc.get_dictionary(page_id).ok().cloned().unwrap_or_default();
        match page.get(b"Contents") {
            Ok(Object::Array(arr)) => assert_eq!(arr.len(), 2),
            other => panic!("expected contents array, got {other:?}"),
        }
    }

    #[test]
    fn test_rotation_snaps_to_quarter_turns() {
        assert_eq!(LETTER.with_rotation(90).rotation, 90);
        assert_eq!(LETTER.with_rotation(-90).rotation, 270);
        assert_eq!(LETTER.with_rotation(450).rotation, 90);
        assert_eq!(LETTER.with_rotation(0).rotation, 0);
    }

    #[test]
    fn test_rotate_90_frame() {
        let frame = LETTER.with_rotation(90);
        assert_eq!(frame.size(), PageSize { width: 792.0, height: 612.0 });
        // Displayed top-left is the unrotated bottom-left
        assert_eq!(frame.to_pdf(0.0, 0.0), (0.0, 0.0));
        assert_eq!(frame.to_pdf(792.0, 0.0), (0.0, 792.0));

        let ops = frame.rect_operands(&BoundingBox::new(10.0, 10.0, 110.0, 30.0));
        assert_eq!(ops, [10.0, 10.0, 20.0, 100.0]);
        assert_eq!(frame.text_matrix(10.0, 22.0), [0.0, 1.0, -1.0, 0.0, 22.0, 10.0]);
    }

    #[test]
    fn test_rotate_180_and_270_frames() {
        let bbox = BoundingBox::new(10.0, 10.0, 110.0, 30.0);

        let upside_down = LETTER.with_rotation(180);
        assert_eq!(upside_down.size(), PageSize { width: 612.0, height: 792.0 });
        assert_eq!(upside_down.rect_operands(&bbox), [502.0, 10.0, 100.0, 20.0]);

        let left = LETTER.with_rotation(270);
        assert_eq!(left.to_pdf(0.0, 0.0), (612.0, 792.0));
        assert_eq!(left.rect_operands(&bbox), [582.0, 682.0, 20.0, 100.0]);
        assert_eq!(left.text_matrix(0.0, 0.0), [0.0, -1.0, 1.0, 0.0, 612.0, 792.0]);
    }

    #[test]
    fn test_unrotated_text_matrix_is_translation() {
        assert_eq!(LETTER.text_matrix(10.0, 22.0), [1.0, 0.0, 0.0, 1.0, 10.0, 770.0]);
    }

    #[test]
    fn test_page_rotation_inherited() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(lopdf::Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Rotate", Object::Integer(270)),
        ]));
        let page_id = doc.add_object(lopdf::Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
        ]));
        let plain_id = doc.add_object(lopdf::Dictionary::from_iter([(
            "Type",
            Object::Name(b"Page".to_vec()),
        )]));

        assert_eq!(page_rotation(&doc, page_id), 270);
        assert_eq!(page_rotation(&doc, plain_id), 0);
    }

    fn stream_text(doc: &Document, part: &Object) -> String {
        let Object::Reference(id) = part else {
            panic!("expected a reference, got {part:?}");
        };
        match doc.get_object(*id) {
            Ok(Object::Stream(stream)) => String::from_utf8_lossy(&stream.content).into_owned(),
            other => panic!("expected a stream, got {other:?}"),
        }
    }

    #[test]
    fn test_isolate_encloses_source_content() {
        let mut doc = Document::with_version("1.5");
        // Leaves one save open and a scaled CTM behind
        let existing = doc.add_object(Stream::new(
            lopdf::Dictionary::new(),
            b"q 2 0 0 2 0 0 cm BT ET".to_vec(),
        ));
        let page_id = doc.add_object(lopdf::Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Contents", Object::Reference(existing)),
        ]));

        assert!(isolate_page_content(&mut doc, page_id).is_ok());
        assert!(append_content_to_page(&mut doc, page_id, "q Q").is_ok());

        let parts = content_parts(&doc, page_id).unwrap_or_default();
        assert_eq!(parts.len(), 4);
        assert_eq!(stream_text(&doc, &parts[0]), "q\n");
        assert!(matches!(parts[1], Object::Reference(id) if id == existing));
        assert_eq!(stream_text(&doc, &parts[2]), "Q\nQ\n");
        assert_eq!(stream_text(&doc, &parts[3]), "q Q");
    }

    #[test]
    fn test_isolate_without_content_is_noop() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(lopdf::Dictionary::from_iter([(
            "Type",
            Object::Name(b"Page".to_vec()),
        )]));
        assert!(isolate_page_content(&mut doc, page_id).is_ok());
        assert!(content_parts(&doc, page_id).is_ok_and(|parts| parts.is_empty()));
    }
}

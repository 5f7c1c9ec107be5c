//! TrueType font registration and embedding for overlay text.
//!
//! A registered font is embedded as a composite font so any character the
//! font covers can be drawn:
//! - **Type0 font** with Identity-H encoding (2-byte glyph IDs in content streams)
//!   - **CIDFontType2** with the per-glyph `W` widths array
//!     - **FontDescriptor** pointing at the **FontFile2** program
//!   - **ToUnicode CMap** built from the font's own cmap, so drawn text
//!     stays extractable

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use ttf_parser::{Face, GlyphId};

use crate::error::{Error, Result};

/// bfchar entries per CMap section (the format caps sections at 100)
const CMAP_CHUNK: usize = 100;

/// A parsed TrueType font ready to be embedded into documents.
pub struct EmbeddedFont {
    name: String,
    data: Vec<u8>,
}

impl EmbeddedFont {
    /// Read and validate a font file.
    pub fn load(name: &str, path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| Error::FontResource {
            name: name.to_string(),
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_bytes(name, data)
    }

    /// Validate in-memory font data.
    pub fn from_bytes(name: &str, data: Vec<u8>) -> Result<Self> {
        let font = Self {
            name: name.to_string(),
            data,
        };
        font.face()?;
        Ok(font)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn face(&self) -> Result<Face<'_>> {
        Face::parse(&self.data, 0).map_err(|e| Error::FontResource {
            name: self.name.clone(),
            reason: format!("failed to parse font: {e}"),
        })
    }

    /// PostScript-safe name for `BaseFont`/`FontName`.
    fn base_font(&self) -> Vec<u8> {
        let cleaned: String = self
            .name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        if cleaned.is_empty() {
            b"RelayoutFont".to_vec()
        } else {
            cleaned.into_bytes()
        }
    }

    /// Encode text as a hex string of 2-byte glyph IDs (no angle brackets).
    ///
    /// Characters the font lacks map to `.notdef` (0).
    pub fn text_to_hex_glyphs(&self, text: &str) -> Result<String> {
        let face = self.face()?;
        Ok(text.chars().fold(String::new(), |mut acc, c| {
            let gid = face.glyph_index(c).map_or(0, |g| g.0);
            let _ = write!(acc, "{gid:04X}");
            acc
        }))
    }

    /// Add the font object graph to a document and return the Type0 font id.
    pub fn embed(&self, doc: &mut Document) -> Result<ObjectId> {
        let face = self.face()?;
        let base_font = self.base_font();

        let mut file_dict = Dictionary::new();
        #[allow(clippy::cast_possible_wrap)] // font files are far below i64::MAX
        file_dict.set("Length1", Object::Integer(self.data.len() as i64));
        let font_file_id = doc.add_object(Object::Stream(
            Stream::new(file_dict, self.data.clone()).with_compression(true),
        ));

        let bbox = face.global_bounding_box();
        let descriptor_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"FontDescriptor".to_vec())),
            ("FontName", Object::Name(base_font.clone())),
            ("Flags", Object::Integer(32)), // Nonsymbolic
            (
                "FontBBox",
                Object::Array(vec![
                    Object::Integer(i64::from(bbox.x_min)),
                    Object::Integer(i64::from(bbox.y_min)),
                    Object::Integer(i64::from(bbox.x_max)),
                    Object::Integer(i64::from(bbox.y_max)),
                ]),
            ),
            ("ItalicAngle", Object::Integer(0)),
            ("Ascent", Object::Integer(i64::from(face.ascender()))),
            ("Descent", Object::Integer(i64::from(face.descender()))),
            (
                "CapHeight",
                Object::Integer(i64::from(face.capital_height().unwrap_or_else(|| face.ascender()))),
            ),
            ("StemV", Object::Integer(80)),
            ("FontFile2", Object::Reference(font_file_id)),
        ]));

        let space_width = face
            .glyph_index(' ')
            .and_then(|g| face.glyph_hor_advance(g))
            .unwrap_or(0);
        let cid_font_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"CIDFontType2".to_vec())),
            ("BaseFont", Object::Name(base_font.clone())),
            (
                "CIDSystemInfo",
                Object::Dictionary(Dictionary::from_iter([
                    ("Registry", Object::String(b"Adobe".to_vec(), StringFormat::Literal)),
                    ("Ordering", Object::String(b"Identity".to_vec(), StringFormat::Literal)),
                    ("Supplement", Object::Integer(0)),
                ])),
            ),
            ("FontDescriptor", Object::Reference(descriptor_id)),
            ("DW", Object::Integer(scale_width(&face, space_width))),
            ("W", Object::Array(widths_array(&face))),
            ("CIDToGIDMap", Object::Name(b"Identity".to_vec())),
        ]));

        let to_unicode_id = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            to_unicode_cmap(&face).into_bytes(),
        )));

        Ok(doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type0".to_vec())),
            ("BaseFont", Object::Name(base_font)),
            ("Encoding", Object::Name(b"Identity-H".to_vec())),
            ("DescendantFonts", Object::Array(vec![Object::Reference(cid_font_id)])),
            ("ToUnicode", Object::Reference(to_unicode_id)),
        ])))
    }
}

/// Scale a font-unit width to the 1000-unit text space.
fn scale_width(face: &Face<'_>, width: u16) -> i64 {
    let units_per_em = i64::from(face.units_per_em()).max(1);
    (i64::from(width) * 1000) / units_per_em
}

/// `W` array covering every glyph: `[first [w1 w2 ...]]` per consecutive run.
fn widths_array(face: &Face<'_>) -> Vec<Object> {
    let mut result = Vec::new();
    let mut run: Vec<Object> = Vec::new();
    let mut run_start = 0u16;

    for gid in 0..face.number_of_glyphs() {
        match face.glyph_hor_advance(GlyphId(gid)) {
            Some(width) => {
                if run.is_empty() {
                    run_start = gid;
                }
                run.push(Object::Integer(scale_width(face, width)));
            }
            None if !run.is_empty() => {
                result.push(Object::Integer(i64::from(run_start)));
                result.push(Object::Array(std::mem::take(&mut run)));
            }
            None => {}
        }
    }
    if !run.is_empty() {
        result.push(Object::Integer(i64::from(run_start)));
        result.push(Object::Array(run));
    }

    result
}

/// glyph id -> first Unicode code point mapped to it by the font's cmap
fn glyph_to_unicode(face: &Face<'_>) -> BTreeMap<u16, char> {
    let mut map = BTreeMap::new();
    let Some(cmap) = face.tables().cmap else {
        return map;
    };
    for subtable in cmap.subtables {
        if !subtable.is_unicode() {
            continue;
        }
        subtable.codepoints(|cp| {
            if let (Some(c), Some(gid)) = (char::from_u32(cp), subtable.glyph_index(cp)) {
                map.entry(gid.0).or_insert(c);
            }
        });
    }
    map
}

fn to_unicode_cmap(face: &Face<'_>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );

    let entries: Vec<(u16, char)> = glyph_to_unicode(face).into_iter().collect();
    for chunk in entries.chunks(CMAP_CHUNK) {
        let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
        for (gid, c) in chunk {
            let mut units = [0u16; 2];
            let utf16: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{u:04X}"))
                .collect();
            let _ = writeln!(cmap, "<{gid:04X}> <{utf16}>");
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

/// Register `font_id` under `resource` in a page's `/Font` resources.
///
/// Resources may be inline, indirect, or inherited from a parent `Pages`
/// node; the resolved dictionary is written back inline on the page.
pub fn add_font_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    resource: &str,
    font_id: ObjectId,
) -> Result<()> {
    let mut resources = resolve_resources(doc, page_id)?;

    let mut fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .unwrap_or_default();
    fonts.set(resource, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));

    let page = doc
        .get_object_mut(page_id)
        .map_err(|e| Error::Lopdf(format!("Failed to get page: {e}")))?;
    if let Object::Dictionary(page_dict) = page {
        page_dict.set("Resources", Object::Dictionary(resources));
    }

    Ok(())
}

/// Walk the page and its `Parent` chain for the effective Resources dictionary.
fn resolve_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    // Guards against circular Parent references in malformed files
    const MAX_DEPTH: usize = 16;

    let mut node = doc
        .get_object(page_id)
        .map_err(|e| Error::Lopdf(format!("Failed to get page: {e}")))?;

    for _ in 0..MAX_DEPTH {
        let Object::Dictionary(dict) = node else { break };
        if let Some(resources) = dict.get(b"Resources").ok().and_then(|r| resolve_dict(doc, r)) {
            return Ok(resources);
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => match doc.get_object(*parent_id) {
                Ok(parent) => node = parent,
                Err(_) => break,
            },
            _ => break,
        }
    }

    Ok(Dictionary::new())
}

fn resolve_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d.clone()),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Dictionary(d)) => Some(d.clone()),
            _ => None,
        },
        _ => None,
    }
}

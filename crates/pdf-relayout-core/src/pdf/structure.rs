//! Value types exchanged with a document backend.
//!
//! All geometry here uses the extraction coordinate space: origin at the
//! top-left of the page, y growing downward, units in PDF points.

use std::fmt;

/// Bounding box in top-left page coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Convert to array format [x0, y0, x1, y1]
    pub const fn as_array(self) -> [f32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(self, other: Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Swap inverted edges and clamp the origin corner to the page.
    ///
    /// After normalization `x0 <= x1`, `y0 <= y1` and `x0, y0 >= 0`.
    #[must_use]
    pub fn normalized(self) -> Self {
        let (mut x0, mut x1) = if self.x1 < self.x0 {
            (self.x1, self.x0)
        } else {
            (self.x0, self.x1)
        };
        let (mut y0, mut y1) = if self.y1 < self.y0 {
            (self.y1, self.y0)
        } else {
            (self.y0, self.y1)
        };
        x0 = x0.max(0.0);
        y0 = y0.max(0.0);
        x1 = x1.max(x0);
        y1 = y1.max(y0);
        Self { x0, y0, x1, y1 }
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Create from mupdf Rect
    pub const fn from_rect(rect: mupdf::Rect) -> Self {
        Self {
            x0: rect.x0,
            y0: rect.y0,
            x1: rect.x1,
            y1: rect.y1,
        }
    }

    /// Create from mupdf Quad (4 points defining a quadrilateral)
    pub const fn from_quad(quad: &mupdf::Quad) -> Self {
        let x0 = quad.ul.x.min(quad.ur.x).min(quad.ll.x).min(quad.lr.x);
        let y0 = quad.ul.y.min(quad.ur.y).min(quad.ll.y).min(quad.lr.y);
        let x1 = quad.ul.x.max(quad.ur.x).max(quad.ll.x).max(quad.lr.x);
        let y1 = quad.ul.y.max(quad.ur.y).max(quad.ll.y).max(quad.lr.y);
        Self { x0, y0, x1, y1 }
    }
}

/// An 8-bit-per-channel RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Self = Self(0, 0, 0);
    pub const WHITE: Self = Self(255, 255, 255);

    /// Decode a packed `0xRRGGBB` integer.
    #[allow(clippy::cast_possible_truncation)] // masked to 8 bits
    pub const fn from_packed(packed: u32) -> Self {
        Self(
            ((packed >> 16) & 0xFF) as u8,
            ((packed >> 8) & 0xFF) as u8,
            (packed & 0xFF) as u8,
        )
    }

    pub const fn to_packed(self) -> u32 {
        ((self.0 as u32) << 16) | ((self.1 as u32) << 8) | self.2 as u32
    }

    /// `#RRGGBB`, upper-case
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    /// Parse `#RRGGBB` or `RRGGBB`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Channels scaled to 0.0..=1.0 for PDF colour operators
    pub fn to_unit(self) -> [f32; 3] {
        [
            f32::from(self.0) / 255.0,
            f32::from(self.1) / 255.0,
            f32::from(self.2) / 255.0,
        ]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Page dimensions in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Kind of a structural block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Image,
}

/// A run of characters sharing one style
#[derive(Debug, Clone)]
pub struct Span {
    pub text: String,
    pub bbox: BoundingBox,
    pub font_size: f32,
    /// Packed `0xRRGGBB`
    pub font_color: u32,
    pub font_family: String,
}

#[derive(Debug, Clone, Default)]
pub struct Line {
    pub spans: Vec<Span>,
}

/// A structural block as reported by the backend
#[derive(Debug, Clone)]
pub struct StructBlock {
    pub kind: BlockKind,
    /// Union rectangle reported for the whole block
    pub bbox: BoundingBox,
    pub lines: Vec<Line>,
}

/// Structural text tree of a page, in reading order
#[derive(Debug, Clone, Default)]
pub struct StructuredPage {
    pub blocks: Vec<StructBlock>,
}

/// Handle to a font registered with a document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontHandle {
    /// Caller-facing font name
    pub name: String,
    /// Resource name used inside page content streams
    pub resource: String,
}

/// One line of text to draw
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    /// Left edge of the line
    pub x: f32,
    /// Baseline, top-left coordinates
    pub baseline: f32,
    pub font_size: f32,
    pub color: Rgb,
}

/// Text content to be merged onto a page in one go
#[derive(Debug, Clone)]
pub struct PageOverlay {
    pub font: FontHandle,
    pub runs: Vec<TextRun>,
}

impl PageOverlay {
    pub const fn new(font: FontHandle) -> Self {
        Self {
            font,
            runs: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

//! Document access: the page structure, raster and write operations the
//! layout pipeline needs, with a mupdf + lopdf implementation.

mod access;
mod document;
pub mod font;
pub mod overlay;
mod render;
mod structure;
mod text;

pub use access::DocumentAccess;
pub use document::PdfDocument;
pub use overlay::PageFrame;
pub use structure::{
    BlockKind, BoundingBox, FontHandle, Line, PageOverlay, PageSize, Rgb, Span, StructBlock,
    StructuredPage, TextRun,
};
pub use text::DEFAULT_SPAN_COLOR;

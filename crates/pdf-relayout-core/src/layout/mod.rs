//! Block extraction, background redaction and overlay re-layout.

mod background;
mod consensus;
mod extract;
mod redact;
mod render;

pub use background::resolve_background;
pub use consensus::{consensus, consensus_size};
pub use extract::{Block, BlockExtractor, BlockId};
pub use redact::Redactor;
pub use render::{BlockLayout, OverflowReport, OverlayRenderer};

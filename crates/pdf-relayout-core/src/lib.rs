//! Layout-preserving PDF translation.
//!
//! Text blocks are extracted with their geometry and dominant style, painted
//! over with the background colour inferred from their corners, translated,
//! and drawn back into the same rectangles:
//! - [`layout`]: consensus, block extraction, redaction and overlay re-layout
//! - [`pdf`]: the document access interface and its mupdf + lopdf backend
//! - [`translator`]: OpenAI-compatible translation backend
//! - [`cache`]: memory and disk translation cache
//! - [`pipeline`]: the end-to-end run

pub mod cache;
pub mod config;
pub mod error;
pub mod layout;
pub mod pdf;
pub mod pipeline;
pub mod translator;

pub use cache::{CacheKey, TranslationCache};
pub use config::{AppConfig, CacheConfig, Lang, LayoutConfig, OverflowPolicy, TranslatorConfig, UnredactedPolicy};
pub use error::{Error, Result};
pub use layout::{Block, BlockExtractor, BlockId, OverflowReport, OverlayRenderer, Redactor, consensus, resolve_background};
pub use pdf::{BoundingBox, DocumentAccess, PdfDocument, Rgb};
pub use pipeline::{LayoutTranslator, PageProgress, RunSummary, Stage};
pub use translator::{OpenAiTranslator, Translator, TranslatorInfo, create_translator};

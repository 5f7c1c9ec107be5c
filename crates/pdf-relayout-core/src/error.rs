use thiserror::Error;

/// Unified error type for pdf-relayout-core
///
/// Variants fall into two groups:
/// - fatal: the run aborts and no output file is written (document, font,
///   save and configuration failures)
/// - local: one block degrades and the run continues (empty consensus input,
///   translation failures)
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Document Errors
    // ==========================================================================
    /// Failed to open or parse the source document
    #[error("failed to open document: {0}")]
    DocumentOpen(String),

    /// Invalid page number requested
    #[error("invalid page number {page} (document has {total} pages)")]
    PdfInvalidPage { page: usize, total: usize },

    /// Failed to extract structured text from a page
    #[error("failed to extract text from page {page}: {reason}")]
    PdfTextExtraction { page: usize, reason: String },

    /// Failed to rasterize a page or a region of it
    #[error("failed to render page {page}: {reason}")]
    PdfRender { page: usize, reason: String },

    /// Failed to write redaction or overlay content into a page
    #[error("failed to modify page: {0}")]
    PdfOverlay(String),

    /// Failed to save the output document
    #[error("failed to save PDF: {0}")]
    PdfSave(String),

    /// Error from the lopdf library
    #[error("lopdf error: {0}")]
    Lopdf(String),

    // ==========================================================================
    // Layout Errors
    // ==========================================================================
    /// Consensus or background inference was given nothing to vote on
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// The overlay font could not be loaded or registered
    #[error("failed to register font '{name}': {reason}")]
    FontResource { name: String, reason: String },

    // ==========================================================================
    // Translation Errors
    // ==========================================================================
    /// Translation API request failed
    #[error("translation API request failed: {0}")]
    TranslationRequest(String),

    /// Invalid response from translation API
    #[error("invalid translation API response: {0}")]
    TranslationInvalidResponse(String),

    /// Rate limited by translation API
    #[error("translation rate limited{}", retry_after.map(|s| format!(", retry after {s} seconds")).unwrap_or_default())]
    TranslationRateLimited { retry_after: Option<u64> },

    /// API key not configured for translation service
    #[error("translation API key not configured")]
    TranslationMissingApiKey,

    /// Translation request timed out
    #[error("translation request timed out")]
    TranslationTimeout,

    /// Maximum retry attempts exceeded for translation
    #[error("translation failed after maximum retries")]
    TranslationMaxRetriesExceeded,

    // ==========================================================================
    // Cache Errors
    // ==========================================================================
    /// Failed to initialize the cache
    #[error("failed to initialize cache: {0}")]
    CacheInit(String),

    /// Failed to read from cache
    #[error("failed to read from cache: {0}")]
    CacheRead(String),

    /// Failed to write to cache
    #[error("failed to write to cache: {0}")]
    CacheWrite(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error belongs to the per-block translation family.
    ///
    /// These are recovered by keeping the source text for the block.
    pub const fn is_translation(&self) -> bool {
        matches!(
            self,
            Self::TranslationRequest(_)
                | Self::TranslationInvalidResponse(_)
                | Self::TranslationRateLimited { .. }
                | Self::TranslationMissingApiKey
                | Self::TranslationTimeout
                | Self::TranslationMaxRetriesExceeded
        )
    }

    /// Whether this error must abort the whole run.
    pub const fn is_fatal(&self) -> bool {
        !self.is_translation() && !matches!(self, Self::EmptyInput(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_errors_are_recoverable() {
        assert!(Error::TranslationTimeout.is_translation());
        assert!(!Error::TranslationTimeout.is_fatal());
        assert!(Error::TranslationRateLimited { retry_after: Some(3) }.is_translation());
    }

    #[test]
    fn test_empty_input_is_local() {
        let err = Error::EmptyInput("no corner samples");
        assert!(!err.is_fatal());
        assert!(!err.is_translation());
    }

    #[test]
    fn test_font_and_document_errors_are_fatal() {
        let font = Error::FontResource {
            name: "Roboto".to_string(),
            reason: "missing".to_string(),
        };
        assert!(font.is_fatal());
        assert!(Error::DocumentOpen("corrupt".to_string()).is_fatal());
    }

    #[test]
    fn test_rate_limit_message() {
        let err = Error::TranslationRateLimited { retry_after: Some(5) };
        assert_eq!(err.to_string(), "translation rate limited, retry after 5 seconds");
    }
}

use async_trait::async_trait;
use crate::config::Lang;
use crate::error::Result;

/// Information about a translator backend
#[derive(Debug, Clone)]
pub struct TranslatorInfo {
    /// Human-readable name, also part of the cache key
    pub name: &'static str,
    /// Whether this translator requires an API key
    pub requires_api_key: bool,
}

/// A per-block text translation service.
///
/// Implementations must be safe to call concurrently: the pipeline keeps
/// several blocks of a page in flight at once.
#[async_trait]
pub trait Translator: Send + Sync {
    fn info(&self) -> TranslatorInfo;

    fn name(&self) -> &'static str {
        self.info().name
    }

    /// Translate one block's text.
    ///
    /// Line breaks in the result are kept as line breaks when the text is
    /// drawn back into the block.
    async fn translate(&self, text: &str, source: &Lang, target: &Lang) -> Result<String>;

    /// Whether the backend is configured well enough to be called
    fn is_available(&self) -> bool {
        true
    }
}

mod traits;
mod openai;

pub use traits::{Translator, TranslatorInfo};
pub use openai::{OpenAiTranslator, language_name};

use crate::config::TranslatorConfig;
use crate::error::Result;
use std::sync::Arc;

/// Create a translator from configuration
pub fn create_translator(config: &TranslatorConfig) -> Result<Arc<dyn Translator>> {
    Ok(Arc::new(OpenAiTranslator::from_config(config)?))
}

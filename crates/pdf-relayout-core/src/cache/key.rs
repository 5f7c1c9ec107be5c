use crate::config::Lang;

/// Cache key for one block translation.
///
/// An MD5 hash of the block text and everything that changes its
/// translation, so identical text anywhere in any document shares an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: String,
}

impl CacheKey {
    pub fn new(text: &str, translator: &str, source_lang: &Lang, target_lang: &Lang) -> Self {
        // NUL separators keep ("a", "bc") and ("ab", "c") apart
        let combined = format!(
            "{}\0{}\0{}\0{}",
            text,
            translator.to_lowercase(),
            source_lang.as_str(),
            target_lang.as_str(),
        );

        Self {
            hash: format!("{:x}", md5::compute(combined.as_bytes())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str, translator: &str, src: &str, tgt: &str) -> CacheKey {
        CacheKey::new(text, translator, &Lang::new(src), &Lang::new(tgt))
    }

    #[test]
    fn test_cache_key_is_fixed_length_hash() {
        let k = key("Hello world", "OpenAI Compatible", "en", "vi");
        assert_eq!(k.as_str().len(), 32);
        assert!(k.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_cache_key_differs_by_input() {
        let base = key("Hello", "OpenAI", "en", "vi");
        assert_ne!(base, key("World", "OpenAI", "en", "vi"));
        assert_ne!(base, key("Hello", "Other", "en", "vi"));
        assert_ne!(base, key("Hello", "OpenAI", "fr", "vi"));
        assert_ne!(base, key("Hello", "OpenAI", "en", "ja"));
    }

    #[test]
    fn test_cache_key_separates_fields() {
        assert_ne!(key("a", "bc", "en", "vi"), key("ab", "c", "en", "vi"));
    }

    #[test]
    fn test_cache_key_case_insensitive_translator() {
        assert_eq!(key("Hello", "OpenAI", "en", "vi"), key("Hello", "OPENAI", "en", "vi"));
    }
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Language codes following ISO 639-1 with regional variants
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lang(pub String);

impl Lang {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn default_source_lang() -> Lang {
    Lang::new("en")
}

fn default_target_lang() -> Lang {
    Lang::new("vi")
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Lang {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Lang {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Wait applied on HTTP 429 when the server sends no `Retry-After`
pub const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 5;

/// Translator backend configuration for OpenAI-compatible APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Timeout for a single HTTP request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound for one block, retries and backoff included.
    /// Derived from the request timeout and retry settings when unset.
    #[serde(default)]
    pub block_timeout_secs: Option<u64>,
}

impl TranslatorConfig {
    /// Create a new translator config
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            model: model.into(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
            block_timeout_secs: None,
        }
    }

    /// Wall-clock budget for translating one block.
    ///
    /// Unless set explicitly, every attempt may run to the request timeout
    /// and every retry may wait out a default rate-limit backoff.
    pub fn block_budget(&self) -> Duration {
        if let Some(secs) = self.block_timeout_secs {
            return Duration::from_secs(secs);
        }
        let attempts = self.retry_count.max(1);
        let backoff = Duration::from_millis(self.retry_delay_ms)
            .max(Duration::from_secs(DEFAULT_RATE_LIMIT_WAIT_SECS));
        Duration::from_secs(self.timeout_secs) * attempts + backoff * (attempts - 1)
    }
}

const fn default_retry_count() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

const fn default_timeout_secs() -> u64 {
    120
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
            block_timeout_secs: None,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable memory cache
    #[serde(default = "default_true")]
    pub memory_enabled: bool,

    /// Maximum memory cache size in MB
    #[serde(default = "default_memory_max_mb")]
    pub memory_max_mb: u64,

    /// Memory cache TTL in seconds (0 = no expiry)
    #[serde(default)]
    pub memory_ttl_seconds: u64,

    /// Enable disk cache
    #[serde(default = "default_true")]
    pub disk_enabled: bool,

    /// Disk cache directory (defaults to $XDG_CACHE_HOME/pdf-relayout)
    pub disk_path: Option<PathBuf>,
}

const fn default_true() -> bool {
    true
}

const fn default_memory_max_mb() -> u64 {
    64
}

impl CacheConfig {
    /// Configuration with both layers switched off.
    pub const fn disabled() -> Self {
        Self {
            memory_enabled: false,
            memory_max_mb: 0,
            memory_ttl_seconds: 0,
            disk_enabled: false,
            disk_path: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_enabled: true,
            memory_max_mb: default_memory_max_mb(),
            memory_ttl_seconds: 0,
            disk_enabled: true,
            disk_path: None,
        }
    }
}

/// What to do when translated text does not fit its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Draw the lines that fit, report the rest as undrawn
    #[default]
    Clip,
    /// Draw every line, report how many crossed the bottom edge
    Overdraw,
    /// Reduce the font size until the text fits, then clip
    Shrink,
}

/// Whether blocks that could not be redacted still receive translated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnredactedPolicy {
    /// Leave the original text alone
    #[default]
    Skip,
    /// Draw the translation over the untouched original
    Overlay,
}

/// Extraction, redaction and re-layout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Rasterization DPI for block crops (scale = dpi / 72)
    #[serde(default = "default_dpi")]
    pub dpi: f32,

    /// Line advance as a multiple of the block font size
    #[serde(default = "default_line_height_factor")]
    pub line_height_factor: f32,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Smallest font size `OverflowPolicy::Shrink` may reach
    #[serde(default = "default_min_font_size")]
    pub min_font_size: f32,

    #[serde(default)]
    pub unredacted: UnredactedPolicy,

    /// Maximum in-flight translation requests per page
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

const fn default_dpi() -> f32 {
    300.0
}

const fn default_line_height_factor() -> f32 {
    1.2
}

const fn default_min_font_size() -> f32 {
    6.0
}

const fn default_concurrency() -> usize {
    4
}

impl LayoutConfig {
    /// Raster scale relative to the 72-DPI native PDF space.
    pub fn render_scale(&self) -> f32 {
        self.dpi / 72.0
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            line_height_factor: default_line_height_factor(),
            overflow: OverflowPolicy::default(),
            min_font_size: default_min_font_size(),
            unredacted: UnredactedPolicy::default(),
            concurrency: default_concurrency(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source language
    #[serde(default = "default_source_lang")]
    pub source_lang: Lang,

    /// Target language
    #[serde(default = "default_target_lang")]
    pub target_lang: Lang,

    /// Translator backend configuration
    #[serde(default)]
    pub translator: TranslatorConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Layout configuration
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            translator: TranslatorConfig::default(),
            cache: CacheConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations (~/.config/pdf-relayout/config.toml, ./config.toml)
    pub fn load() -> Self {
        if let Some(config_dir) = xdg_dir("XDG_CONFIG_HOME", ".config") {
            let user_config = config_dir.join("pdf-relayout").join("config.toml");
            if user_config.exists() {
                match Self::from_file(&user_config) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {}", user_config.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            match Self::from_file(&local_config) {
                Ok(config) => {
                    tracing::debug!("Loaded config from ./config.toml");
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load ./config.toml: {}", e);
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Self::default()
    }

    /// Reject values the layout code cannot work with.
    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;
        if !(layout.dpi.is_finite() && layout.dpi > 0.0) {
            return Err(invalid("layout.dpi", "must be a positive number"));
        }
        if !(layout.line_height_factor.is_finite() && layout.line_height_factor > 0.0) {
            return Err(invalid("layout.line_height_factor", "must be a positive number"));
        }
        if !(layout.min_font_size.is_finite() && layout.min_font_size > 0.0) {
            return Err(invalid("layout.min_font_size", "must be a positive number"));
        }
        if layout.concurrency == 0 {
            return Err(invalid("layout.concurrency", "must be at least 1"));
        }
        if self.translator.timeout_secs == 0 {
            return Err(invalid("translator.timeout_secs", "must be at least 1"));
        }
        if self.translator.block_timeout_secs == Some(0) {
            return Err(invalid("translator.block_timeout_secs", "must be at least 1"));
        }
        Ok(())
    }
}

/// Resolve an XDG base directory, falling back to `$HOME/<fallback>`.
pub(crate) fn xdg_dir(var: &str, fallback: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(fallback)))
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::ConfigInvalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.source_lang.as_str(), "en");
        assert_eq!(config.target_lang.as_str(), "vi");
        assert!((config.layout.line_height_factor - 1.2).abs() < f32::EPSILON);
        assert_eq!(config.layout.overflow, OverflowPolicy::Clip);
        assert_eq!(config.layout.unredacted, UnredactedPolicy::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_render_scale_from_dpi() {
        let layout = LayoutConfig::default();
        assert!((layout.render_scale() - 300.0 / 72.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            target_lang = "zh-CN"

            [layout]
            overflow = "shrink"
            line_height_factor = 1.5

            [translator]
            api_base = "http://localhost:8080/v1"
            model = "local"
            "#,
        )
        .unwrap();

        assert_eq!(config.source_lang.as_str(), "en");
        assert_eq!(config.target_lang.as_str(), "zh-CN");
        assert_eq!(config.layout.overflow, OverflowPolicy::Shrink);
        assert!((config.layout.dpi - 300.0).abs() < f32::EPSILON);
        assert_eq!(config.translator.retry_count, 3);
        assert_eq!(config.translator.timeout_secs, 120);
    }

    #[test]
    fn test_validate_rejects_zero_line_height() {
        let mut config = AppConfig::default();
        config.layout.line_height_factor = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("line_height_factor"));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = AppConfig::default();
        config.layout.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_block_budget_covers_every_retry() {
        let mut translator = TranslatorConfig::new("http://localhost:8080/v1", None, "local");
        translator.timeout_secs = 10;
        translator.retry_count = 3;
        translator.retry_delay_ms = 1000;
        // Three full attempts plus two rate-limit waits
        assert_eq!(translator.block_budget(), Duration::from_secs(40));

        translator.retry_delay_ms = 8000;
        assert_eq!(translator.block_budget(), Duration::from_secs(46));

        translator.block_timeout_secs = Some(15);
        assert_eq!(translator.block_budget(), Duration::from_secs(15));
    }

    #[test]
    fn test_validate_rejects_zero_block_timeout() {
        let mut config = AppConfig::default();
        config.translator.block_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let result = AppConfig::from_file("/nonexistent/pdf-relayout.toml");
        assert!(matches!(result, Err(Error::ConfigLoad(_))));
    }
}

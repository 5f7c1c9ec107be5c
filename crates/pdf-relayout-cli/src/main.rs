//! pdf-relayout CLI - translate a PDF while keeping its layout.

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_relayout_core::{
    AppConfig, LayoutTranslator, Lang, OverflowPolicy, RunSummary, TranslationCache,
    UnredactedPolicy,
};
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OverflowOption {
    Clip,
    Overdraw,
    Shrink,
}

impl From<OverflowOption> for OverflowPolicy {
    fn from(opt: OverflowOption) -> Self {
        match opt {
            OverflowOption::Clip => Self::Clip,
            OverflowOption::Overdraw => Self::Overdraw,
            OverflowOption::Shrink => Self::Shrink,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pdf-relayout")]
#[command(author, version, about = "Translate PDF documents in place, keeping their layout", long_about = None)]
struct Args {
    /// Input PDF file
    #[arg(required_unless_present = "clear_cache")]
    input: Option<PathBuf>,

    /// Output PDF file (default: input-<target>.pdf)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TrueType font used for the translated text
    #[arg(short, long, required_unless_present = "clear_cache")]
    font: Option<PathBuf>,

    /// Name to register the font under (default: font file name)
    #[arg(long)]
    font_name: Option<String>,

    /// Source language code (default from config: en)
    #[arg(short = 's', long)]
    source: Option<String>,

    /// Target language code (default from config: vi)
    #[arg(short = 't', long)]
    target: Option<String>,

    /// OpenAI API base URL
    #[arg(long, env = "OPENAI_API_BASE")]
    api_base: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model name for OpenAI-compatible API
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// What to do with text that does not fit its block
    #[arg(long, value_enum)]
    overflow: Option<OverflowOption>,

    /// Line advance as a multiple of the font size
    #[arg(long)]
    line_height: Option<f32>,

    /// Draw translations even where the original text could not be redacted
    #[arg(long)]
    overlay_unredacted: bool,

    /// Concurrent translation requests per page
    #[arg(long)]
    concurrency: Option<usize>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Translate only specific pages (e.g., "1-5" or "1,3,5"); others are copied unchanged
    #[arg(long)]
    pages: Option<String>,

    /// Disable the translation cache
    #[arg(long)]
    no_cache: bool,

    /// Empty the translation cache, then exit unless an input is given
    #[arg(long)]
    clear_cache: bool,
}

/// Parse a 1-based page list like "1-3,5" into sorted 0-based indices.
fn parse_page_range(pages: &str) -> Result<Vec<usize>> {
    let mut result = Vec::new();

    for part in pages.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (
                start.trim().parse::<usize>().context("Invalid page range start")?,
                end.trim().parse::<usize>().context("Invalid page range end")?,
            ),
            None => {
                let page = part.parse::<usize>().context("Invalid page number")?;
                (page, page)
            }
        };
        if start == 0 || end < start {
            bail!("Invalid page range '{part}': pages start at 1");
        }
        result.extend((start..=end).map(|p| p - 1));
    }

    result.sort_unstable();
    result.dedup();
    Ok(result)
}

fn default_output(input: &Path, target: &Lang) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{stem}-{target}.pdf"))
}

/// Apply command-line overrides on top of the loaded config.
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(source) = &args.source {
        config.source_lang = Lang::new(source);
    }
    if let Some(target) = &args.target {
        config.target_lang = Lang::new(target);
    }
    if let Some(api_base) = &args.api_base {
        config.translator.api_base.clone_from(api_base);
    }
    if args.api_key.is_some() {
        config.translator.api_key.clone_from(&args.api_key);
    }
    if let Some(model) = &args.model {
        config.translator.model.clone_from(model);
    }
    if let Some(overflow) = args.overflow {
        config.layout.overflow = overflow.into();
    }
    if let Some(line_height) = args.line_height {
        config.layout.line_height_factor = line_height;
    }
    if args.overlay_unredacted {
        config.layout.unredacted = UnredactedPolicy::Overlay;
    }
    if let Some(concurrency) = args.concurrency {
        config.layout.concurrency = concurrency;
    }
    if args.no_cache {
        config.cache.memory_enabled = false;
        config.cache.disk_enabled = false;
    }
}

// CLI output is intentional
#[allow(clippy::print_stdout)]
fn print_summary(summary: &RunSummary) {
    println!("Translated PDF saved to: {}", summary.output_path.display());
    println!(
        "  {} pages, {} blocks, {} translated",
        summary.pages, summary.blocks, summary.translated
    );
    if !summary.untranslated.is_empty() {
        println!("  {} blocks kept their source text (translation failed):", summary.untranslated.len());
        for id in &summary.untranslated {
            println!("    - {id}");
        }
    }
    if !summary.unredacted.is_empty() {
        println!("  {} blocks could not be redacted:", summary.unredacted.len());
        for id in &summary.unredacted {
            println!("    - {id}");
        }
    }
    if !summary.overflows.is_empty() {
        println!("  {} blocks overflow their box:", summary.overflows.len());
        for report in &summary.overflows {
            println!(
                "    - {}: {} lines {} at {}pt",
                report.block,
                report.overflowing_lines,
                if report.drawn { "drawn past the edge" } else { "not drawn" },
                report.font_size
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    if args.clear_cache {
        let mut cache_config = config.cache.clone();
        cache_config.memory_enabled = false;
        cache_config.disk_enabled = true;
        TranslationCache::new(&cache_config)
            .and_then(|cache| cache.clear())
            .context("Failed to clear translation cache")?;
        info!("Translation cache cleared");
    }

    let (Some(input), Some(font_path)) = (args.input.clone(), args.font.clone()) else {
        return Ok(());
    };

    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    let font_name = args.font_name.clone().unwrap_or_else(|| {
        font_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Overlay")
            .to_string()
    });
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&input, &config.target_lang));
    let (source, target) = (config.source_lang.clone(), config.target_lang.clone());

    let mut translator =
        LayoutTranslator::new(config).context("Failed to initialize translator")?;

    if let Some(range) = &args.pages {
        let pages = parse_page_range(range)?;
        if pages.is_empty() {
            bail!("No valid pages to translate");
        }
        translator = translator.with_pages(pages);
    }

    let pb = ProgressBar::new(0);
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    let progress_bar = pb.clone();
    let translator = translator.with_progress(move |progress| {
        progress_bar.set_length(progress.total as u64);
        progress_bar.set_position(progress.done as u64);
        progress_bar.set_message(format!("page {}", progress.page + 1));
    });

    info!("Translating {} -> {}", input.display(), output.display());
    let summary = translator
        .run(&input, &output, &font_path, &font_name, &source, &target)
        .await
        .with_context(|| format!("Failed to translate {}", input.display()))?;

    pb.finish_and_clear();
    print_summary(&summary);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_range() {
        assert_eq!(parse_page_range("1-3,5").ok(), Some(vec![0, 1, 2, 4]));
        assert_eq!(parse_page_range(" 2 , 2, 1 ").ok(), Some(vec![0, 1]));
        assert!(parse_page_range("0").is_err());
        assert!(parse_page_range("4-2").is_err());
        assert!(parse_page_range("a-b").is_err());
    }

    #[test]
    fn test_default_output_uses_target() {
        let out = default_output(Path::new("/tmp/report.pdf"), &Lang::new("vi"));
        assert_eq!(out, PathBuf::from("/tmp/report-vi.pdf"));
    }

    #[test]
    fn test_overrides_only_touch_given_flags() {
        let args = Args::parse_from([
            "pdf-relayout",
            "in.pdf",
            "--font",
            "font.ttf",
            "-t",
            "ja",
            "--overflow",
            "shrink",
            "--no-cache",
        ]);
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.source_lang.as_str(), "en");
        assert_eq!(config.target_lang.as_str(), "ja");
        assert_eq!(config.layout.overflow, OverflowPolicy::Shrink);
        assert!(!config.cache.disk_enabled);
    }
}

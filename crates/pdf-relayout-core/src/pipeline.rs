//! End-to-end run: open, then per page extract → redact → translate →
//! render, then save.
//!
//! Pages are finalized one at a time on the single document handle. Within a
//! page, block translations run concurrently and are written back by block
//! index; blocks that will not be drawn are not sent for translation. Any
//! error other than a per-block translation failure aborts the run before
//! `save`, so no output file is produced.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, TranslationCache};
use crate::config::{AppConfig, Lang, UnredactedPolicy};
use crate::error::{Error, Result};
use crate::layout::{Block, BlockExtractor, BlockId, OverflowReport, OverlayRenderer, Redactor};
use crate::pdf::{DocumentAccess, PdfDocument};
use crate::translator::{Translator, create_translator};

/// Steps of a run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Opened,
    Extracted,
    Redacted,
    Translated,
    Rendered,
    Saved,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Opened => "opened",
            Self::Extracted => "extracted",
            Self::Redacted => "redacted",
            Self::Translated => "translated",
            Self::Rendered => "rendered",
            Self::Saved => "saved",
        };
        f.write_str(name)
    }
}

/// Reported after each finished page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProgress {
    pub page: usize,
    /// Pages finished so far, this one included
    pub done: usize,
    pub total: usize,
}

type ProgressFn = Arc<dyn Fn(PageProgress) + Send + Sync>;

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub output_path: PathBuf,
    /// Pages processed
    pub pages: usize,
    /// Text blocks extracted
    pub blocks: usize,
    /// Blocks drawn with a translation
    pub translated: usize,
    /// Blocks whose translation failed and kept their source text
    pub untranslated: Vec<BlockId>,
    /// Blocks whose background could not be resolved
    pub unredacted: Vec<BlockId>,
    pub overflows: Vec<OverflowReport>,
}

impl RunSummary {
    /// Whether every block was redacted, translated and fit its box
    pub fn is_clean(&self) -> bool {
        self.untranslated.is_empty() && self.unredacted.is_empty() && self.overflows.is_empty()
    }
}

/// Layout-preserving document translator.
pub struct LayoutTranslator {
    translator: Arc<dyn Translator>,
    cache: TranslationCache,
    config: AppConfig,
    pages: Option<Vec<usize>>,
    progress: Option<ProgressFn>,
}

impl LayoutTranslator {
    /// Translator and cache built from `config`
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let translator = create_translator(&config.translator)?;
        let cache = TranslationCache::new(&config.cache)?;
        Ok(Self::with_parts(translator, cache, config))
    }

    /// Custom translator, no cache
    pub fn with_translator(translator: Arc<dyn Translator>, config: AppConfig) -> Self {
        Self::with_parts(translator, TranslationCache::disabled(), config)
    }

    fn with_parts(translator: Arc<dyn Translator>, cache: TranslationCache, config: AppConfig) -> Self {
        Self {
            translator,
            cache,
            config,
            pages: None,
            progress: None,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: TranslationCache) -> Self {
        self.cache = cache;
        self
    }

    /// Only process these zero-based pages; the rest are copied unchanged.
    #[must_use]
    pub fn with_pages(mut self, pages: Vec<usize>) -> Self {
        self.pages = Some(pages);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: impl Fn(PageProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub const fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    /// Translate the PDF at `input` into `output`.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        font_path: &Path,
        font_name: &str,
        source: &Lang,
        target: &Lang,
    ) -> Result<RunSummary> {
        let mut doc = PdfDocument::open(input)?;
        info!("Opened {}", input.display());
        self.translate_document(&mut doc, output, font_path, font_name, source, target)
            .await
    }

    /// Run every stage over an already opened document and save it to `output`.
    pub async fn translate_document<D: DocumentAccess + ?Sized>(
        &self,
        doc: &mut D,
        output: &Path,
        font_path: &Path,
        font_name: &str,
        source: &Lang,
        target: &Lang,
    ) -> Result<RunSummary> {
        let layout = &self.config.layout;
        let pages = self.selected_pages(doc.page_count())?;
        info!(
            "{} of {} pages selected, {} -> {} ({})",
            pages.len(),
            doc.page_count(),
            source,
            target,
            Stage::Opened
        );

        let renderer = OverlayRenderer::register(&mut *doc, font_name, font_path, layout)?;
        let extractor = BlockExtractor::from_config(layout);
        let redactor = Redactor::new();

        let mut summary = RunSummary {
            output_path: output.to_path_buf(),
            pages: pages.len(),
            blocks: 0,
            translated: 0,
            untranslated: Vec::new(),
            unredacted: Vec::new(),
            overflows: Vec::new(),
        };

        for (done, &page) in pages.iter().enumerate() {
            let mut blocks = extractor.extract_page(&*doc, page)?;
            debug!("Page {}: {} ({} blocks)", page, Stage::Extracted, blocks.len());

            let unredacted = redactor.redact_page(&mut *doc, page, &blocks)?;
            for block in &mut blocks {
                block.raster_crop = None;
            }
            debug!("Page {}: {} ({} skipped)", page, Stage::Redacted, unredacted.len());

            let skip: HashSet<BlockId> = match layout.unredacted {
                UnredactedPolicy::Skip => unredacted.iter().copied().collect(),
                UnredactedPolicy::Overlay => HashSet::new(),
            };
            let untranslated = self.translate_blocks(&mut blocks, &skip, source, target).await?;
            debug!("Page {}: {} ({} failed)", page, Stage::Translated, untranslated.len());

            let overflows = renderer.render_page(&mut *doc, page, &blocks, &skip)?;
            debug!("Page {}: {} ({} overflowing)", page, Stage::Rendered, overflows.len());

            summary.blocks += blocks.len();
            summary.translated += blocks
                .iter()
                .filter(|b| !skip.contains(&b.id) && !untranslated.contains(&b.id))
                .count();
            summary.untranslated.extend(untranslated);
            summary.unredacted.extend(unredacted);
            summary.overflows.extend(overflows);

            if let Some(progress) = &self.progress {
                progress(PageProgress {
                    page,
                    done: done + 1,
                    total: pages.len(),
                });
            }
        }

        doc.save(output)?;
        if let Err(e) = self.cache.flush() {
            warn!("Failed to flush translation cache: {}", e);
        }
        info!(
            "{} {}: {} blocks, {} translated, {} untranslated, {} unredacted, {} overflowing",
            Stage::Saved,
            output.display(),
            summary.blocks,
            summary.translated,
            summary.untranslated.len(),
            summary.unredacted.len(),
            summary.overflows.len()
        );
        Ok(summary)
    }

    /// Sorted, deduplicated page selection; every page when none was given.
    fn selected_pages(&self, total: usize) -> Result<Vec<usize>> {
        let Some(requested) = &self.pages else {
            return Ok((0..total).collect());
        };
        if let Some(&page) = requested.iter().find(|&&p| p >= total) {
            return Err(Error::PdfInvalidPage { page, total });
        }
        let mut pages = requested.clone();
        pages.sort_unstable();
        pages.dedup();
        Ok(pages)
    }

    /// Fill in `translated_text` for every block not in `skip`, returning the
    /// blocks that fell back to their source text.
    ///
    /// Per-block translation failures are recovered; any other error aborts.
    async fn translate_blocks(
        &self,
        blocks: &mut [Block],
        skip: &HashSet<BlockId>,
        source: &Lang,
        target: &Lang,
    ) -> Result<Vec<BlockId>> {
        let budget = self.config.translator.block_budget();

        let results: Vec<(usize, Result<String>)> = stream::iter(blocks.iter().enumerate())
            .filter(|(_, block)| futures::future::ready(!skip.contains(&block.id)))
            .map(|(index, block)| async move {
                let call = self.translate_cached(&block.text, source, target);
                let result = tokio::time::timeout(budget, call)
                    .await
                    .unwrap_or(Err(Error::TranslationTimeout));
                (index, result)
            })
            .buffer_unordered(self.config.layout.concurrency.max(1))
            .collect()
            .await;

        let mut failed = Vec::new();
        for (index, result) in results {
            let block = &mut blocks[index];
            match result {
                Ok(translated) => block.translated_text = Some(translated),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("{}: translation failed, keeping source text: {}", block.id, e);
                    block.translated_text = Some(block.text.clone());
                    failed.push(block.id);
                }
            }
        }
        failed.sort_unstable();
        Ok(failed)
    }

    async fn translate_cached(&self, text: &str, source: &Lang, target: &Lang) -> Result<String> {
        let key = CacheKey::new(text, self.translator.name(), source, target);
        if let Some(hit) = self.cache.get(&key).await {
            debug!("Cache hit for {}", key);
            return Ok(hit);
        }

        let translated = self.translator.translate(text, source, target).await?;
        self.cache.insert(&key, &translated).await;
        Ok(translated)
    }
}

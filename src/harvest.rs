//! Harvest entry points: render a page, fetch its images, build the PDF.
//!
//! [`harvest`] is the one-call API. [`Harvester`] exposes the same pipeline
//! over pluggable renderer and fetcher implementations; the HTTP server
//! holds one and shares it between requests.
//!
//! Fetches run concurrently, but the output document always follows DOM
//! discovery order: results are re-sorted by candidate index before any
//! image is handed to the assembler.

use crate::config::HarvestConfig;
use crate::error::{FetchError, HarvestError, ImageError};
use crate::output::{
    FetchedImage, HarvestOutput, HarvestStats, ImageCandidate, ImageResult, ScrollReport,
};
use crate::pipeline::assemble::PdfAssembler;
use crate::pipeline::fetch::{HttpFetcher, ImageFetcher};
use crate::pipeline::render::{ChromeRenderer, PageRenderer};
use crate::pipeline::request::RenderRequest;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Render, fetch and assemble `target_url` into a PDF.
///
/// # Errors
/// Returns `Err(HarvestError)` only for fatal errors:
/// - the URL is empty or not an absolute http(s) URL
/// - navigation failed or timed out
/// - the page shows no usable image
/// - every candidate failed to fetch or decode
/// - pdfium could not be bound or rejected the document
///
/// Individual image failures are reported in `output.images` instead.
pub async fn harvest(
    target_url: impl AsRef<str>,
    config: &HarvestConfig,
) -> Result<HarvestOutput, HarvestError> {
    let request = RenderRequest::new(target_url.as_ref())?;
    Harvester::from_config(config)?.run(&request).await
}

/// Harvest `target_url` and write the PDF to `output_path`.
///
/// Uses atomic write (temp file + rename) so a failed run never leaves a
/// truncated PDF behind.
pub async fn harvest_to_file(
    target_url: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &HarvestConfig,
) -> Result<HarvestOutput, HarvestError> {
    let output = harvest(target_url, config).await?;
    let path = output_path.as_ref();
    let write_failed = |source| HarvestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &output.pdf)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_failed)?;

    info!("Wrote {} bytes to {}", output.pdf.len(), path.display());
    Ok(output)
}

/// Synchronous wrapper around [`harvest`].
///
/// Creates a temporary tokio runtime internally.
pub fn harvest_sync(
    target_url: impl AsRef<str>,
    config: &HarvestConfig,
) -> Result<HarvestOutput, HarvestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| HarvestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(harvest(target_url, config))
}

/// Everything a harvest produced short of the serialised document.
pub struct Collected {
    pub assembler: PdfAssembler,
    pub url: String,
    pub images: Vec<ImageResult>,
    pub scroll: ScrollReport,
    pub stats: HarvestStats,
}

/// The pipeline over a renderer and a fetcher.
pub struct Harvester<R, F> {
    renderer: R,
    fetcher: F,
    config: HarvestConfig,
}

impl Harvester<ChromeRenderer, HttpFetcher> {
    /// Headless Chrome plus `reqwest`, both configured from `config`.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, HarvestError> {
        Ok(Self::new(
            ChromeRenderer::new(config),
            HttpFetcher::new(config)?,
            config.clone(),
        ))
    }
}

impl<R: PageRenderer, F: ImageFetcher> Harvester<R, F> {
    pub fn new(renderer: R, fetcher: F, config: HarvestConfig) -> Self {
        Self {
            renderer,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Run the whole pipeline and serialise the document.
    pub async fn run(&self, request: &RenderRequest) -> Result<HarvestOutput, HarvestError> {
        let start = Instant::now();
        let Collected {
            assembler,
            url,
            images,
            scroll,
            mut stats,
        } = self.collect(request).await?;

        let pdfium_path = self.config.pdfium_lib_path.clone();
        let pdf = tokio::task::spawn_blocking(move || assembler.finalize(pdfium_path.as_deref()))
            .await
            .map_err(|e| HarvestError::Internal(format!("PDF task panicked: {}", e)))??;

        stats.total_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Harvest complete: {}/{} images in {} bytes, {}ms total",
            stats.added_pages,
            stats.candidates,
            pdf.len(),
            stats.total_duration_ms
        );

        Ok(HarvestOutput {
            pdf,
            url,
            images,
            scroll,
            stats,
        })
    }

    /// Render, fetch and assemble, stopping before the document is serialised.
    ///
    /// Fails with `NoImagesFound` before any fetch when the page yields no
    /// candidate, and with `AllFetchesFailed` when no candidate became a page.
    pub async fn collect(&self, request: &RenderRequest) -> Result<Collected, HarvestError> {
        let start = Instant::now();
        let url = request.as_str().to_string();
        let callback = self.config.progress_callback.clone();
        info!("Starting harvest: {}", url);

        // ── Step 1: Render ───────────────────────────────────────────────────
        if let Some(ref cb) = callback {
            cb.on_render_start(&url);
        }
        let render_start = Instant::now();
        let page = self.renderer.render(request.url()).await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;

        if page.candidates.is_empty() {
            return Err(HarvestError::NoImagesFound { url });
        }
        let total = page.candidates.len();
        if let Some(ref cb) = callback {
            cb.on_render_complete(total, page.scroll.reached_bottom);
        }

        // ── Step 2: Fetch concurrently, then restore discovery order ─────────
        let fetch_start = Instant::now();
        let mut fetched = self.fetch_all(&page.candidates).await;
        fetched.sort_by_key(|f| f.index);
        let fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;
        debug!("Fetched {} candidates in {}ms", total, fetch_duration_ms);

        // ── Step 3: Decode and lay out, one page per image ───────────────────
        let (assembler, images) =
            tokio::task::spawn_blocking(move || assemble_in_order(fetched, total, callback))
                .await
                .map_err(|e| HarvestError::Internal(format!("Assembly task panicked: {}", e)))?;

        let added_pages = assembler.page_count();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_harvest_complete(total, added_pages);
        }

        if added_pages == 0 {
            let first_error = images
                .iter()
                .find_map(|r| r.error.as_ref())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(HarvestError::AllFetchesFailed { total, first_error });
        }

        let stats = HarvestStats {
            candidates: total,
            added_pages,
            skipped_images: total - added_pages,
            render_duration_ms,
            fetch_duration_ms,
            total_duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Assembled {} pages ({} skipped) from {}",
            stats.added_pages, stats.skipped_images, url
        );

        Ok(Collected {
            assembler,
            url,
            images,
            scroll: page.scroll,
            stats,
        })
    }

    async fn fetch_all(&self, candidates: &[ImageCandidate]) -> Vec<FetchOutcome> {
        let total = candidates.len();
        let fetcher = &self.fetcher;
        let callback = &self.config.progress_callback;

        stream::iter(candidates.iter().cloned().enumerate().map(|(index, candidate)| async move {
            if let Some(cb) = callback {
                cb.on_image_start(index, total);
            }
            let start = Instant::now();
            let result = fetcher.fetch(&candidate).await;
            FetchOutcome {
                index,
                candidate,
                result,
                duration_ms: start.elapsed().as_millis() as u64,
            }
        }))
        .buffer_unordered(self.config.fetch_concurrency)
        .collect()
        .await
    }
}

struct FetchOutcome {
    index: usize,
    candidate: ImageCandidate,
    result: Result<FetchedImage, FetchError>,
    duration_ms: u64,
}

/// Feed sorted fetch outcomes to a fresh assembler, recording one
/// [`ImageResult`] per candidate.
fn assemble_in_order(
    fetched: Vec<FetchOutcome>,
    total: usize,
    callback: Option<ProgressCallback>,
) -> (PdfAssembler, Vec<ImageResult>) {
    let mut assembler = PdfAssembler::new();
    let mut images = Vec::with_capacity(fetched.len());

    for outcome in fetched {
        let FetchOutcome {
            index,
            candidate,
            result,
            duration_ms,
        } = outcome;

        let added = result
            .map_err(ImageError::from)
            .and_then(|img| assembler.add_image(img).map_err(ImageError::from));

        let image = match added {
            Ok((width, height)) => {
                if let Some(ref cb) = callback {
                    cb.on_image_complete(index, total, width, height);
                }
                ImageResult {
                    index,
                    url: candidate.url,
                    page_num: Some(assembler.page_count()),
                    width,
                    height,
                    duration_ms,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Skipping image {}/{}: {}", index + 1, total, e);
                if let Some(ref cb) = callback {
                    cb.on_image_skipped(index, total, &e.to_string());
                }
                ImageResult {
                    index,
                    url: candidate.url,
                    page_num: None,
                    width: 0,
                    height: 0,
                    duration_ms,
                    error: Some(e),
                }
            }
        };
        images.push(image);
    }

    (assembler, images)
}

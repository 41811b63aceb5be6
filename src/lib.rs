//! # scrape2pdf
//!
//! Collect every image of a web page into a PDF, one image per page.
//!
//! ## Why a browser?
//!
//! Galleries and feeds rarely put their images in the initial HTML: they are
//! inserted by scripts, or only swapped in from a `data-src` placeholder when
//! they scroll into view. This crate loads the page in headless Chrome,
//! scrolls it to the bottom so lazy loaders fire, and only then reads the
//! DOM. The images are downloaded directly and laid out at their native
//! pixel size; JPEG data goes into the PDF exactly as fetched.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL
//!  │
//!  ├─ 1. Request   validate the absolute http(s) URL
//!  ├─ 2. Render    headless Chrome: navigate, wait for quiet network,
//!  │               auto-scroll, settle, collect <img> (spawn_blocking)
//!  ├─ 3. Fetch     concurrent GETs, PNG/JPEG only, failures skipped
//!  ├─ 4. Assemble  validate, then place one image per page (pdfium)
//!  └─ 5. Output    PDF bytes + per-image report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scrape2pdf::{harvest, HarvestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HarvestConfig::default();
//!     let output = harvest("https://example.com/gallery", &config).await?;
//!     std::fs::write("generated.pdf", &output.pdf)?;
//!     eprintln!("{} of {} images added",
//!         output.stats.added_pages,
//!         output.stats.candidates);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | via cli | `POST /create-pdf` endpoint (axum + tower-http) |
//! | `cli`    | on      | The `scrape2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable defaults when using only the library:
//! ```toml
//! scrape2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! A Chrome or Chromium executable (found on `PATH`, or set
//! [`HarvestConfig::chrome_path`]) and a pdfium shared library (system-wide,
//! or set `PDFIUM_LIB_PATH`).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod harvest;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{HarvestConfig, HarvestConfigBuilder, DEFAULT_USER_AGENT};
pub use error::{DecodeError, FetchError, HarvestError, ImageError, RenderError};
pub use harvest::{harvest, harvest_sync, harvest_to_file, Harvester};
pub use output::{
    EmbedFormat, FetchedImage, HarvestOutput, HarvestStats, ImageCandidate, ImageResult,
    RenderedPage, ScrollReport,
};
pub use pipeline::assemble::PdfAssembler;
pub use pipeline::fetch::{HttpFetcher, ImageFetcher};
pub use pipeline::render::{ChromeRenderer, PageRenderer};
pub use pipeline::request::RenderRequest;
pub use progress::{HarvestProgressCallback, NoopProgressCallback, ProgressCallback};

//! CLI binary for scrape2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `HarvestConfig` and either runs one harvest or serves HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scrape2pdf::{
    harvest_to_file, server, HarvestConfig, HarvestProgressCallback, ProgressCallback,
};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while the page renders, then a bar over the image fetches.
/// Images complete out of order, so lines are printed as they arrive.
struct CliProgressCallback {
    bar: ProgressBar,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Rendering");
        bar.set_message("Launching browser…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            skipped: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Fetching");
    }
}

impl HarvestProgressCallback for CliProgressCallback {
    fn on_render_start(&self, url: &str) {
        self.bar.set_message(format!("{url} (scrolling to trigger lazy images)"));
    }

    fn on_render_complete(&self, candidates: usize, reached_bottom: bool) {
        self.activate_bar(candidates);
        let note = if reached_bottom {
            String::new()
        } else {
            dim("  (scroll cap hit before the bottom)")
        };
        self.bar.println(format!(
            "{} {}{}",
            cyan("◆"),
            bold(&format!("Found {candidates} images")),
            note
        ));
    }

    fn on_image_complete(&self, index: usize, total: usize, width: u32, height: u32) {
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{width}×{height}")),
        ));
        self.bar.inc(1);
    }

    fn on_image_skipped(&self, index: usize, total: usize, reason: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        let msg: String = if reason.chars().count() > 80 {
            let head: String = reason.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            reason.to_string()
        };
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_harvest_complete(&self, total: usize, added_pages: usize) {
        self.bar.finish_and_clear();
        let skipped = total.saturating_sub(added_pages);
        if skipped == 0 {
            eprintln!("{} {} images added", green("✔"), bold(&added_pages.to_string()));
        } else {
            eprintln!(
                "{} {}/{} images added  ({} skipped)",
                if added_pages == 0 { red("✘") } else { cyan("⚠") },
                bold(&added_pages.to_string()),
                total,
                red(&skipped.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Save every image of a gallery page as generated.pdf
  scrape2pdf https://example.com/gallery

  # Choose the output file
  scrape2pdf https://example.com/gallery -o gallery.pdf

  # Only keep large images, fetch 4 at a time
  scrape2pdf --min-size 200 --concurrency 4 https://example.com/gallery

  # Per-image JSON report on stdout
  scrape2pdf --json https://example.com/gallery > report.json

  # Run the HTTP endpoint (POST /create-pdf {"targetUrl": "..."})
  scrape2pdf --serve --port 3000

ENVIRONMENT VARIABLES:
  PORT                    Port for --serve (default 3000)
  CHROME_PATH             Chrome/Chromium executable (auto-detected otherwise)
  PDFIUM_LIB_PATH         Path to libpdfium or the directory holding it
  RUST_LOG                Overrides the log filter (e.g. scrape2pdf=debug)

  Every flag also reads a SCRAPE2PDF_* variable; see --help for names.
"#;

/// Render a web page, scroll through its lazy images, and save them as a PDF.
#[derive(Parser, Debug)]
#[command(
    name = "scrape2pdf",
    version,
    about = "Collect every image of a web page into a PDF, one image per page",
    long_about = "Loads a web page in headless Chrome, scrolls it to the bottom so lazy-loaded \
images appear, downloads every image larger than a size threshold and writes them into a PDF, \
one image per page at its native size.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// HTTP/HTTPS URL of the page to harvest.
    #[arg(required_unless_present = "serve")]
    url: Option<String>,

    /// Write the PDF to this file.
    #[arg(short, long, env = "SCRAPE2PDF_OUTPUT", default_value = "generated.pdf")]
    output: PathBuf,

    /// Print the harvest report (HarvestOutput) as JSON on stdout.
    #[arg(long, env = "SCRAPE2PDF_JSON")]
    json: bool,

    /// Serve POST /create-pdf instead of running a single harvest.
    #[arg(long, conflicts_with = "url")]
    serve: bool,

    /// Address to bind with --serve.
    #[arg(long, env = "SCRAPE2PDF_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to bind with --serve.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Simultaneous rendering sessions allowed with --serve.
    #[arg(long, env = "SCRAPE2PDF_MAX_SESSIONS", default_value_t = server::DEFAULT_MAX_SESSIONS)]
    max_sessions: usize,

    /// Browser viewport width in CSS pixels.
    #[arg(long, env = "SCRAPE2PDF_VIEWPORT_WIDTH", default_value_t = 1280)]
    viewport_width: u32,

    /// Browser viewport height in CSS pixels.
    #[arg(long, env = "SCRAPE2PDF_VIEWPORT_HEIGHT", default_value_t = 1024)]
    viewport_height: u32,

    /// Ceiling for navigation plus network quiescence, in seconds.
    #[arg(long, env = "SCRAPE2PDF_NAV_TIMEOUT", default_value_t = 180)]
    nav_timeout: u64,

    /// Pixels advanced per auto-scroll tick.
    #[arg(long, env = "SCRAPE2PDF_SCROLL_STEP", default_value_t = 300)]
    scroll_step: u32,

    /// Milliseconds between auto-scroll ticks.
    #[arg(long, env = "SCRAPE2PDF_SCROLL_INTERVAL", default_value_t = 150)]
    scroll_interval: u64,

    /// Maximum auto-scroll ticks.
    #[arg(long, env = "SCRAPE2PDF_MAX_SCROLLS", default_value_t = 500)]
    max_scrolls: u32,

    /// Milliseconds to wait after scrolling before collecting images.
    #[arg(long, env = "SCRAPE2PDF_SETTLE", default_value_t = 3000)]
    settle: u64,

    /// Skip images whose rendered width or height is at most this many pixels.
    #[arg(long, env = "SCRAPE2PDF_MIN_SIZE", default_value_t = 50)]
    min_size: u32,

    /// Per-image download timeout in seconds.
    #[arg(long, env = "SCRAPE2PDF_FETCH_TIMEOUT", default_value_t = 5)]
    fetch_timeout: u64,

    /// Number of concurrent image downloads.
    #[arg(short, long, env = "SCRAPE2PDF_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// User agent for image downloads.
    #[arg(long, env = "SCRAPE2PDF_USER_AGENT")]
    user_agent: Option<String>,

    /// Chrome/Chromium executable.
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// libpdfium file or the directory containing it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "SCRAPE2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCRAPE2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCRAPE2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for one-shot runs; the server
    // always logs at INFO so requests are visible.
    let show_progress = !cli.serve && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn HarvestProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Server mode ──────────────────────────────────────────────────────
    if cli.serve {
        let addr = SocketAddr::new(cli.host, cli.port);
        server::serve(&config, addr, cli.max_sessions)
            .await
            .context("Server failed")?;
        return Ok(());
    }

    // ── One-shot harvest ─────────────────────────────────────────────────
    let url = cli.url.as_deref().unwrap_or_default();
    let output = harvest_to_file(url, &cli.output, &config)
        .await
        .context("Harvest failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} images  {}ms  →  {}",
            if stats.skipped_images == 0 { green("✔") } else { cyan("⚠") },
            stats.added_pages,
            stats.candidates,
            stats.total_duration_ms,
            bold(&cli.output.display().to_string()),
        );
        if !output.scroll.reached_bottom {
            eprintln!(
                "   {}",
                dim(&format!(
                    "scrolling stopped after {} ticks; the page may hold more images",
                    output.scroll.iterations
                ))
            );
        }
    }

    Ok(())
}

/// Map CLI args to `HarvestConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<HarvestConfig> {
    let mut builder = HarvestConfig::builder()
        .viewport(cli.viewport_width, cli.viewport_height)
        .navigation_timeout_secs(cli.nav_timeout)
        .scroll_step_px(cli.scroll_step)
        .scroll_interval_ms(cli.scroll_interval)
        .max_scroll_iterations(cli.max_scrolls)
        .settle_ms(cli.settle)
        .min_image_dimension(cli.min_size)
        .fetch_timeout_secs(cli.fetch_timeout)
        .fetch_concurrency(cli.concurrency);

    if let Some(ref ua) = cli.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    if let Some(ref path) = cli.chrome_path {
        builder = builder.chrome_path(path.clone());
    }
    if let Some(ref path) = cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

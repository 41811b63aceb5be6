//! Configuration types for a render-harvest-assemble run.
//!
//! All pipeline behaviour is controlled through [`HarvestConfig`], built via
//! its [`HarvestConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config between concurrent requests and to log exactly
//! what a run was asked to do.

use crate::error::HarvestError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// User agent sent with image fetches. Many CDNs reject requests without one.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Configuration for one harvest.
///
/// Built via [`HarvestConfig::builder()`] or using
/// [`HarvestConfig::default()`].
///
/// # Example
/// ```rust
/// use scrape2pdf::HarvestConfig;
///
/// let config = HarvestConfig::builder()
///     .fetch_concurrency(4)
///     .min_image_dimension(100)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct HarvestConfig {
    /// Browser viewport width in CSS pixels. Default: 1280.
    pub viewport_width: u32,

    /// Browser viewport height in CSS pixels. Default: 1024.
    pub viewport_height: u32,

    /// Hard ceiling for navigation plus network quiescence, in seconds. Default: 180.
    ///
    /// Heavy galleries routinely take over a minute to settle. Exceeding the
    /// ceiling fails the whole request with `NavigationTimeout`.
    pub navigation_timeout_secs: u64,

    /// Window over which the network must stay quiet, in milliseconds. Default: 500.
    pub quiescence_window_ms: u64,

    /// Open requests tolerated for the page to count as quiet. Default: 2.
    pub max_inflight_requests: u32,

    /// Pixels advanced per auto-scroll tick. Default: 300.
    pub scroll_step_px: u32,

    /// Delay between auto-scroll ticks, in milliseconds. Default: 150.
    ///
    /// Slow enough for lazy loaders hooked on `IntersectionObserver` or
    /// scroll events to fire before the next tick.
    pub scroll_interval_ms: u64,

    /// Iteration cap for auto-scroll. Default: 500.
    ///
    /// Together with the step and interval this bounds scrolling at
    /// 150 000 px and 75 s, which stops infinite feeds.
    pub max_scroll_iterations: u32,

    /// Pause after scrolling so the last images can start loading, in milliseconds. Default: 3000.
    pub settle_ms: u64,

    /// Elements with width or height at or below this are ignored. Default: 50.
    pub min_image_dimension: u32,

    /// Per-image fetch timeout in seconds. Default: 5.
    pub fetch_timeout_secs: u64,

    /// User agent for image fetches.
    pub user_agent: String,

    /// Image fetches in flight at once. Default: 8.
    pub fetch_concurrency: usize,

    /// Chrome/Chromium executable. If None, headless_chrome auto-detects one.
    pub chrome_path: Option<PathBuf>,

    /// Path to libpdfium. If None, `PDFIUM_LIB_PATH` and then the system library are tried.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Optional event sink for progress reporting.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 1024,
            navigation_timeout_secs: 180,
            quiescence_window_ms: 500,
            max_inflight_requests: 2,
            scroll_step_px: 300,
            scroll_interval_ms: 150,
            max_scroll_iterations: 500,
            settle_ms: 3000,
            min_image_dimension: 50,
            fetch_timeout_secs: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_concurrency: 8,
            chrome_path: None,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for HarvestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestConfig")
            .field("viewport", &(self.viewport_width, self.viewport_height))
            .field("navigation_timeout_secs", &self.navigation_timeout_secs)
            .field("quiescence_window_ms", &self.quiescence_window_ms)
            .field("max_inflight_requests", &self.max_inflight_requests)
            .field("scroll_step_px", &self.scroll_step_px)
            .field("scroll_interval_ms", &self.scroll_interval_ms)
            .field("max_scroll_iterations", &self.max_scroll_iterations)
            .field("settle_ms", &self.settle_ms)
            .field("min_image_dimension", &self.min_image_dimension)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("chrome_path", &self.chrome_path)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn HarvestProgressCallback>"),
            )
            .finish()
    }
}

impl HarvestConfig {
    /// Create a new builder for `HarvestConfig`.
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn quiescence_window(&self) -> Duration {
        Duration::from_millis(self.quiescence_window_ms)
    }

    pub fn scroll_interval(&self) -> Duration {
        Duration::from_millis(self.scroll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Builder for [`HarvestConfig`].
#[derive(Debug)]
pub struct HarvestConfigBuilder {
    config: HarvestConfig,
}

impl HarvestConfigBuilder {
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport_width = width.max(1);
        self.config.viewport_height = height.max(1);
        self
    }

    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.navigation_timeout_secs = secs;
        self
    }

    pub fn quiescence_window_ms(mut self, ms: u64) -> Self {
        self.config.quiescence_window_ms = ms;
        self
    }

    pub fn max_inflight_requests(mut self, n: u32) -> Self {
        self.config.max_inflight_requests = n;
        self
    }

    pub fn scroll_step_px(mut self, px: u32) -> Self {
        self.config.scroll_step_px = px.max(1);
        self
    }

    pub fn scroll_interval_ms(mut self, ms: u64) -> Self {
        self.config.scroll_interval_ms = ms;
        self
    }

    pub fn max_scroll_iterations(mut self, n: u32) -> Self {
        self.config.max_scroll_iterations = n;
        self
    }

    pub fn settle_ms(mut self, ms: u64) -> Self {
        self.config.settle_ms = ms;
        self
    }

    pub fn min_image_dimension(mut self, px: u32) -> Self {
        self.config.min_image_dimension = px;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn fetch_concurrency(mut self, n: usize) -> Self {
        self.config.fetch_concurrency = n.max(1);
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<HarvestConfig, HarvestError> {
        let c = &self.config;
        if c.navigation_timeout_secs == 0 {
            return Err(HarvestError::InvalidConfig(
                "Navigation timeout must be ≥ 1s".into(),
            ));
        }
        if c.fetch_timeout_secs == 0 {
            return Err(HarvestError::InvalidConfig("Fetch timeout must be ≥ 1s".into()));
        }
        if c.max_scroll_iterations == 0 {
            return Err(HarvestError::InvalidConfig(
                "Scroll iteration cap must be ≥ 1".into(),
            ));
        }
        if c.user_agent.trim().is_empty() {
            return Err(HarvestError::InvalidConfig("User agent must not be empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let c = HarvestConfig::default();
        assert_eq!((c.viewport_width, c.viewport_height), (1280, 1024));
        assert_eq!(c.navigation_timeout(), Duration::from_secs(180));
        assert_eq!(c.scroll_step_px, 300);
        assert_eq!(c.scroll_interval(), Duration::from_millis(150));
        assert_eq!(c.max_scroll_iterations, 500);
        assert_eq!(c.settle(), Duration::from_secs(3));
        assert_eq!(c.min_image_dimension, 50);
        assert_eq!(c.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(c.max_inflight_requests, 2);
    }

    #[test]
    fn builder_clamps_concurrency_and_step() {
        let c = HarvestConfig::builder()
            .fetch_concurrency(0)
            .scroll_step_px(0)
            .build()
            .expect("valid");
        assert_eq!(c.fetch_concurrency, 1);
        assert_eq!(c.scroll_step_px, 1);
    }

    #[test]
    fn builder_rejects_zero_timeouts() {
        assert!(HarvestConfig::builder().fetch_timeout_secs(0).build().is_err());
        assert!(HarvestConfig::builder()
            .navigation_timeout_secs(0)
            .build()
            .is_err());
        assert!(HarvestConfig::builder().max_scroll_iterations(0).build().is_err());
        assert!(HarvestConfig::builder().user_agent("  ").build().is_err());
    }

    #[test]
    fn debug_hides_callback() {
        let c = HarvestConfig::builder()
            .progress_callback(std::sync::Arc::new(crate::progress::NoopProgressCallback))
            .build()
            .expect("valid");
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn HarvestProgressCallback>"));
    }
}

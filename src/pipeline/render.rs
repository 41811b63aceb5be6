//! Page rendering: materialise a lazy-loading page in headless Chrome and
//! collect the images it ends up showing.
//!
//! ## Session lifecycle
//!
//! One [`ChromeSession`] is launched per request and owned by that request
//! alone. It is a RAII guard: dropping it closes the tab and kills the
//! browser process, so it is released on success, on every error path, and
//! on panic. `headless_chrome` is a blocking client, so the whole session runs
//! inside `spawn_blocking`; a [`CancelFlag`] lets the awaiting future abort
//! the session at its next tick when the caller goes away.
//!
//! ## Algorithm
//!
//! ```text
//! launch ─▶ navigate ─▶ quiescence ─▶ auto-scroll ─▶ settle ─▶ extract ─▶ release
//!           └──────── shared 180 s ceiling ───────┘
//! ```
//!
//! Everything after `launch` talks to the browser through the
//! [`RenderSession`] trait, which keeps the scroll and extraction logic
//! testable without Chrome.

use crate::config::HarvestConfig;
use crate::error::RenderError;
use crate::output::{ImageCandidate, RenderedPage, ScrollReport};
use headless_chrome::browser::tab::Tab;
use headless_chrome::{Browser, LaunchOptions};
use reqwest::Url;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Network;
use serde::Deserialize;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Granularity of cancellable waits.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// How often the network state is sampled while waiting for quiescence.
const QUIESCENCE_POLL: Duration = Duration::from_millis(100);

/// Produces the candidate list for one URL.
pub trait PageRenderer: Send + Sync {
    fn render(&self, url: &Url) -> impl Future<Output = Result<RenderedPage, RenderError>> + Send;
}

/// The browser operations the render algorithm needs.
///
/// Implementations release their resources in `Drop`.
pub trait RenderSession {
    /// Navigate and wait for the load event, within `budget`.
    ///
    /// Must return once the budget is spent or `cancel` is set, even if the
    /// browser has not answered yet.
    fn navigate(
        &mut self,
        url: &str,
        budget: &NavigationBudget,
        cancel: &CancelFlag,
    ) -> Result<(), RenderError>;

    /// Report document readiness and the number of requests still open.
    fn network_snapshot(&mut self) -> Result<NetworkSnapshot, RenderError>;

    /// Read the content height, then scroll down by `step_px`. Returns the height read.
    fn scroll_step(&mut self, step_px: u32) -> Result<u64, RenderError>;

    /// Enumerate every `<img>` in the current DOM.
    fn image_elements(&mut self) -> Result<Vec<ImageElement>, RenderError>;
}

/// One `<img>` as reported by the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageElement {
    /// Resolved `src` property (empty/absent when the attribute is missing).
    #[serde(default)]
    pub src: Option<String>,
    /// Raw `data-src` attribute, possibly relative.
    #[serde(default)]
    pub data_src: Option<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Readiness and open request count at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkSnapshot {
    /// `document.readyState === "complete"`.
    pub ready: bool,
    /// Requests sent but not yet finished or failed.
    pub in_flight: u64,
}

/// Hard ceiling shared by navigation and the quiescence wait.
#[derive(Debug, Clone, Copy)]
pub struct NavigationBudget {
    started: Instant,
    ceiling: Duration,
}

impl NavigationBudget {
    pub fn start(ceiling: Duration) -> Self {
        Self {
            started: Instant::now(),
            ceiling,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.ceiling.saturating_sub(self.started.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.ceiling
    }

    pub fn timeout_error(&self, url: &str) -> RenderError {
        RenderError::NavigationTimeout {
            url: url.to_string(),
            secs: self.ceiling.as_secs(),
        }
    }
}

/// Shared cancellation flag between the awaiting future and the blocking session.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Err if the caller has gone away.
    pub fn check(&self) -> Result<(), RenderError> {
        if self.is_cancelled() {
            Err(RenderError::SessionError("rendering cancelled by caller".into()))
        } else {
            Ok(())
        }
    }

    /// Guard that cancels the flag when dropped.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

/// Cancels its [`CancelFlag`] on drop (including when a future is abandoned).
pub struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Run blocking browser work on a helper thread and wait for it, giving up
/// with `NavigationTimeout` when the budget runs out or `SessionError` when
/// cancelled.
///
/// The helper thread is left behind on timeout; it unblocks once the session
/// that owns the browser is dropped.
pub fn within_budget<T, W>(
    url: &str,
    budget: &NavigationBudget,
    cancel: &CancelFlag,
    work: W,
) -> Result<T, RenderError>
where
    T: Send + 'static,
    W: FnOnce() -> Result<T, RenderError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("scrape2pdf-navigate".into())
        .spawn(move || {
            let _ = tx.send(work());
        })
        .map_err(|e| RenderError::SessionError(format!("Failed to start navigation thread: {e}")))?;

    loop {
        cancel.check()?;
        let left = budget.remaining();
        if left.is_zero() {
            warn!("Navigation to {} exceeded {} s", url, budget.ceiling.as_secs());
            return Err(budget.timeout_error(url));
        }
        match rx.recv_timeout(left.min(CANCEL_POLL)) {
            Ok(result) => return result,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(RenderError::SessionError(
                    "Navigation thread exited without a result".into(),
                ))
            }
        }
    }
}

/// Sleep for `duration`, waking early with an error if cancelled.
fn pause(cancel: &CancelFlag, duration: Duration) -> Result<(), RenderError> {
    let until = Instant::now() + duration;
    loop {
        cancel.check()?;
        let left = until.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Ok(());
        }
        std::thread::sleep(left.min(CANCEL_POLL));
    }
}

// ── Algorithm (browser-agnostic) ─────────────────────────────────────────

/// Launch a session, run the full render algorithm, and release the session.
///
/// The session is dropped before this function returns on every path.
pub fn render_with<S, L>(
    launch: L,
    url: &Url,
    config: &HarvestConfig,
    cancel: &CancelFlag,
) -> Result<RenderedPage, RenderError>
where
    S: RenderSession,
    L: FnOnce(&HarvestConfig) -> Result<S, RenderError>,
{
    cancel.check()?;
    let mut session = launch(config)?;
    let result = render_in_session(&mut session, url, config, cancel);
    drop(session);
    debug!("Rendering session released for {}", url);
    result
}

/// Navigate, settle, scroll, settle again and extract, inside an open session.
pub fn render_in_session<S: RenderSession>(
    session: &mut S,
    url: &Url,
    config: &HarvestConfig,
    cancel: &CancelFlag,
) -> Result<RenderedPage, RenderError> {
    let budget = NavigationBudget::start(config.navigation_timeout());

    info!("Navigating to {}", url);
    session.navigate(url.as_str(), &budget, cancel)?;
    wait_for_quiescence(session, url.as_str(), config, &budget, cancel)?;

    debug!("Starting auto-scroll");
    let scroll = auto_scroll(session, config, cancel)?;
    info!(
        "Scroll finished after {} ticks ({} px of {} px, reached bottom: {})",
        scroll.iterations, scroll.distance_px, scroll.reported_height_px, scroll.reached_bottom
    );

    pause(cancel, config.settle())?;

    let elements = session.image_elements()?;
    let candidates = extract_candidates(&elements, config.min_image_dimension, url);
    info!(
        "Found {} candidate images ({} <img> elements)",
        candidates.len(),
        elements.len()
    );

    Ok(RenderedPage { candidates, scroll })
}

/// Poll until the document is complete and no more than
/// `max_inflight_requests` stay open for a whole quiescence window, or the
/// budget runs out.
pub fn wait_for_quiescence<S: RenderSession>(
    session: &mut S,
    url: &str,
    config: &HarvestConfig,
    budget: &NavigationBudget,
    cancel: &CancelFlag,
) -> Result<(), RenderError> {
    let window = config.quiescence_window();
    let limit = u64::from(config.max_inflight_requests);
    let mut quiet_since: Option<Instant> = None;

    loop {
        let snapshot = session.network_snapshot()?;
        if snapshot.ready && snapshot.in_flight <= limit {
            let since = *quiet_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= window {
                debug!(
                    "Network quiescent ({} requests open for {:?})",
                    snapshot.in_flight, window
                );
                return Ok(());
            }
        } else {
            quiet_since = None;
        }

        if budget.expired() {
            return Err(budget.timeout_error(url));
        }
        pause(cancel, window.min(QUIESCENCE_POLL).min(budget.remaining()))?;
    }
}

/// Scroll in fixed steps until the distance covers the reported height or
/// the iteration cap is hit.
pub fn auto_scroll<S: RenderSession>(
    session: &mut S,
    config: &HarvestConfig,
    cancel: &CancelFlag,
) -> Result<ScrollReport, RenderError> {
    let step = config.scroll_step_px;
    let mut report = ScrollReport::default();

    loop {
        pause(cancel, config.scroll_interval())?;
        let height = session.scroll_step(step)?;
        report.iterations += 1;
        report.distance_px += u64::from(step);
        report.reported_height_px = height;

        if report.distance_px >= height {
            report.reached_bottom = true;
            break;
        }
        if report.iterations >= config.max_scroll_iterations {
            warn!(
                "Auto-scroll hit the {}-tick cap before the bottom ({} px reported)",
                config.max_scroll_iterations, height
            );
            break;
        }
    }

    Ok(report)
}

/// Resolve, size-filter and deduplicate `<img>` elements.
///
/// The effective source is `src`, falling back to `data-src` when `src` is
/// absent; relative placeholders are resolved against `base`. Both rendered
/// dimensions must exceed `min_dimension`. The first occurrence of a URL wins.
pub fn extract_candidates(
    elements: &[ImageElement],
    min_dimension: u32,
    base: &Url,
) -> Vec<ImageCandidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for el in elements {
        let Some(raw) = effective_source(el) else {
            continue;
        };
        if el.width <= min_dimension || el.height <= min_dimension {
            continue;
        }
        let url = match base.join(raw) {
            Ok(u) => u.to_string(),
            Err(e) => {
                debug!("Ignoring unresolvable image source '{}': {}", raw, e);
                continue;
            }
        };
        if seen.insert(url.clone()) {
            candidates.push(ImageCandidate {
                url,
                width: el.width,
                height: el.height,
            });
        }
    }

    candidates
}

fn effective_source(el: &ImageElement) -> Option<&str> {
    non_empty(el.src.as_deref()).or_else(|| non_empty(el.data_src.as_deref()))
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

// ── Chrome binding ───────────────────────────────────────────────────────

const READY_STATE_JS: &str = "document.readyState === 'complete'";

const IMAGE_ELEMENTS_JS: &str = r#"
(function() {
    return JSON.stringify(Array.from(document.querySelectorAll('img')).map(function(img) {
        return {
            src: img.src || null,
            dataSrc: img.getAttribute('data-src'),
            width: img.width,
            height: img.height
        };
    }));
})()
"#;

fn scroll_step_js(step_px: u32) -> String {
    format!(
        "(function() {{ var h = document.body ? document.body.scrollHeight : 0; \
         window.scrollBy(0, {step_px}); return h; }})()"
    )
}

/// Default renderer: one fresh headless Chrome per call.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    config: HarvestConfig,
}

impl ChromeRenderer {
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl PageRenderer for ChromeRenderer {
    fn render(&self, url: &Url) -> impl Future<Output = Result<RenderedPage, RenderError>> + Send {
        let config = self.config.clone();
        let url = url.clone();
        async move {
            let cancel = CancelFlag::new();
            // Abandoning this future (client disconnect, shutdown) cancels the session.
            let _guard = cancel.drop_guard();
            let flag = cancel.clone();

            tokio::task::spawn_blocking(move || {
                render_with(ChromeSession::launch, &url, &config, &flag)
            })
            .await
            .map_err(|e| RenderError::SessionError(format!("Render task panicked: {e}")))?
        }
    }
}

/// Request ids seen in `Network.requestWillBeSent` and not yet finished or failed.
type InFlight = Arc<Mutex<HashSet<String>>>;

/// A live headless Chrome process with one tab. Dropping it releases both.
pub struct ChromeSession {
    tab: Arc<Tab>,
    in_flight: InFlight,
    // Declared after `tab` so the tab is closed before the process is killed.
    _browser: Browser,
}

impl ChromeSession {
    /// Launch Chrome with the configured viewport and open a tab.
    pub fn launch(config: &HarvestConfig) -> Result<Self, RenderError> {
        let args: Vec<&OsStr> = vec![
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-gpu"),
        ];

        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some((config.viewport_width, config.viewport_height)))
            .path(config.chrome_path.clone())
            .args(args)
            // The transport must outlive the longest legitimate silence.
            .idle_browser_timeout(config.navigation_timeout() + Duration::from_secs(60))
            .build()
            .map_err(|e| RenderError::SessionError(format!("Failed to build launch options: {e}")))?;

        let browser = Browser::new(options)
            .map_err(|e| RenderError::SessionError(format!("Failed to launch browser: {e}")))?;

        let tab = browser
            .new_tab()
            .map_err(|e| RenderError::SessionError(format!("Failed to create tab: {e}")))?;

        let in_flight = track_requests(&tab)?;

        debug!(
            "Launched headless Chrome ({}x{} viewport)",
            config.viewport_width, config.viewport_height
        );

        Ok(Self {
            tab,
            in_flight,
            _browser: browser,
        })
    }

    fn evaluate(&self, script: &str) -> Result<serde_json::Value, RenderError> {
        self.tab
            .evaluate(script, false)
            .map_err(|e| RenderError::SessionError(format!("Script evaluation failed: {e}")))?
            .value
            .ok_or_else(|| RenderError::SessionError("Script returned no value".into()))
    }

    fn evaluate_json<T: for<'de> Deserialize<'de>>(&self, script: &str) -> Result<T, RenderError> {
        let value = self.evaluate(script)?;
        let text = value
            .as_str()
            .ok_or_else(|| RenderError::SessionError(format!("Expected JSON string, got {value}")))?;
        serde_json::from_str(text)
            .map_err(|e| RenderError::SessionError(format!("Malformed script result: {e}")))
    }
}

/// Enable the Network domain and keep a live set of open request ids.
fn track_requests(tab: &Tab) -> Result<InFlight, RenderError> {
    tab.call_method(Network::Enable {
        max_total_buffer_size: None,
        max_resource_buffer_size: None,
        max_post_data_size: None,
        report_direct_socket_traffic: None,
        enable_durable_messages: None,
    })
    .map_err(|e| RenderError::SessionError(format!("Failed to enable network events: {e}")))?;

    let in_flight: InFlight = Arc::default();
    let tracked = Arc::clone(&in_flight);
    tab.add_event_listener(Arc::new(move |event: &Event| {
        let Ok(mut open) = tracked.lock() else {
            return;
        };
        match event {
            Event::NetworkRequestWillBeSent(ev) => {
                open.insert(ev.params.request_id.clone());
            }
            Event::NetworkLoadingFinished(ev) => {
                open.remove(&ev.params.request_id);
            }
            Event::NetworkLoadingFailed(ev) => {
                open.remove(&ev.params.request_id);
            }
            _ => {}
        }
    }))
    .map_err(|e| RenderError::SessionError(format!("Failed to watch network events: {e}")))?;

    Ok(in_flight)
}

impl RenderSession for ChromeSession {
    fn navigate(
        &mut self,
        url: &str,
        budget: &NavigationBudget,
        cancel: &CancelFlag,
    ) -> Result<(), RenderError> {
        self.tab.set_default_timeout(budget.remaining());

        let tab = Arc::clone(&self.tab);
        let target = url.to_string();
        let deadline = *budget;
        // `Page.navigate` only answers once the navigation commits, so the
        // call itself has to be raced against the budget.
        within_budget(url, budget, cancel, move || {
            tab.navigate_to(&target)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| {
                    if e.downcast_ref::<headless_chrome::util::Timeout>().is_some()
                        || deadline.expired()
                    {
                        deadline.timeout_error(&target)
                    } else {
                        RenderError::NavigationFailed {
                            url: target.clone(),
                            detail: e.to_string(),
                        }
                    }
                })
        })
    }

    fn network_snapshot(&mut self) -> Result<NetworkSnapshot, RenderError> {
        let ready = self.evaluate(READY_STATE_JS)?.as_bool().unwrap_or(false);
        let in_flight = self
            .in_flight
            .lock()
            .map(|open| open.len() as u64)
            .map_err(|_| RenderError::SessionError("Network tracker poisoned".into()))?;
        Ok(NetworkSnapshot { ready, in_flight })
    }

    fn scroll_step(&mut self, step_px: u32) -> Result<u64, RenderError> {
        let value = self.evaluate(&scroll_step_js(step_px))?;
        value
            .as_u64()
            .or_else(|| value.as_f64().map(|h| h.max(0.0) as u64))
            .ok_or_else(|| RenderError::SessionError(format!("Scroll height was not a number: {value}")))
    }

    fn image_elements(&mut self) -> Result<Vec<ImageElement>, RenderError> {
        self.evaluate_json(IMAGE_ELEMENTS_JS)
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(false) {
            debug!("Tab close failed during release: {}", e);
        }
    }
}

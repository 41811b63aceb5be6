//! Progress-callback trait for harvest events.
//!
//! Inject an [`Arc<dyn HarvestProgressCallback>`] via
//! [`crate::config::HarvestConfigBuilder::progress_callback`] to receive
//! events as the pipeline renders the page and works through its images.
//!
//! # Example
//!
//! ```rust
//! use scrape2pdf::{HarvestConfig, HarvestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SkipCounter {
//!     skipped: AtomicUsize,
//! }
//!
//! impl HarvestProgressCallback for SkipCounter {
//!     fn on_image_skipped(&self, index: usize, total: usize, reason: &str) {
//!         self.skipped.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("image {}/{} skipped: {}", index + 1, total, reason);
//!     }
//! }
//!
//! let config = HarvestConfig::builder()
//!     .progress_callback(Arc::new(SkipCounter { skipped: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it renders and harvests a page.
///
/// Image fetches run concurrently, so `on_image_*` methods may be called from
/// several tasks at once and in any order. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait HarvestProgressCallback: Send + Sync {
    /// Called once before the rendering session is launched.
    fn on_render_start(&self, url: &str) {
        let _ = url;
    }

    /// Called once the candidate list is known.
    ///
    /// # Arguments
    /// * `candidates`: number of images that will be fetched
    /// * `reached_bottom`: whether auto-scroll hit the end of the page
    fn on_render_complete(&self, candidates: usize, reached_bottom: bool) {
        let _ = (candidates, reached_bottom);
    }

    /// Called just before an image fetch is issued (`index` is 0-based).
    fn on_image_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when an image was fetched and decoded into a page.
    fn on_image_complete(&self, index: usize, total: usize, width: u32, height: u32) {
        let _ = (index, total, width, height);
    }

    /// Called when an image was skipped because its fetch or decode failed.
    fn on_image_skipped(&self, index: usize, total: usize, reason: &str) {
        let _ = (index, total, reason);
    }

    /// Called once after every candidate has been attempted.
    ///
    /// # Arguments
    /// * `total`: candidates attempted
    /// * `added_pages`: pages in the output document
    fn on_harvest_complete(&self, total: usize, added_pages: usize) {
        let _ = (total, added_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl HarvestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::HarvestConfig`].
pub type ProgressCallback = Arc<dyn HarvestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        skips: AtomicUsize,
        added: AtomicUsize,
    }

    impl HarvestProgressCallback for TrackingCallback {
        fn on_image_start(&self, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_complete(&self, _index: usize, _total: usize, _w: u32, _h: u32) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_skipped(&self, _index: usize, _total: usize, _reason: &str) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }

        fn on_harvest_complete(&self, _total: usize, added_pages: usize) {
            self.added.store(added_pages, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_render_start("https://example.com");
        cb.on_render_complete(3, true);
        cb.on_image_start(0, 3);
        cb.on_image_complete(0, 3, 800, 600);
        cb.on_image_skipped(1, 3, "unsupported format");
        cb.on_harvest_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_image_start(0, 2);
        tracker.on_image_complete(0, 2, 10, 10);
        tracker.on_image_start(1, 2);
        tracker.on_image_skipped(1, 2, "timeout");
        tracker.on_harvest_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.skips.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.added.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn HarvestProgressCallback>();
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_render_start("https://example.com");
    }
}

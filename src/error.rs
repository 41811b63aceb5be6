//! Error types for the scrape2pdf library.
//!
//! Two families of error reflect two distinct failure modes:
//!
//! * [`HarvestError`]: **fatal**, the request cannot produce a document at
//!   all (bad URL, navigation failed, nothing on the page, every image
//!   failed). Returned as `Err(HarvestError)` from the top-level `harvest*`
//!   functions.
//!
//! * [`ImageError`]: **non-fatal**, a single image could not be fetched or
//!   decoded. Stored inside [`crate::output::ImageResult`] and counted as a
//!   skip; the rest of the batch carries on.
//!
//! [`RenderError`] sits in between: it is produced by the page renderer and
//! always surfaces as [`HarvestError::Render`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scrape2pdf library.
///
/// Per-image failures use [`ImageError`] and are stored in
/// [`crate::output::ImageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum HarvestError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The target URL is missing, empty, or not an absolute HTTP/HTTPS URL.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The rendering session failed; see [`RenderError`].
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The page rendered but no image passed the size filter.
    #[error("No images found on page '{url}'")]
    NoImagesFound { url: String },

    /// Candidates were found but every fetch or decode failed.
    #[error(
        "Could not fetch valid images (blocked or unsupported format): \
         all {total} candidates failed.\nFirst error: {first_error}"
    )]
    AllFetchesFailed { total: usize, first_error: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// `finalize` was called on an assembler holding zero pages.
    #[error("Cannot serialise an empty document: no image was ever added")]
    EmptyDocument,

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// pdfium rejected a page, an image object, or the final save.
    #[error("PDF construction failed: {detail}")]
    DocumentBuildFailed { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HarvestError {
    /// Short machine-readable kind, used in HTTP error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            HarvestError::InvalidRequest { .. } => "invalid_request",
            HarvestError::Render(RenderError::NavigationTimeout { .. }) => "navigation_timeout",
            HarvestError::Render(RenderError::NavigationFailed { .. }) => "navigation_failed",
            HarvestError::Render(RenderError::SessionError(_)) => "session_error",
            HarvestError::NoImagesFound { .. } => "no_images_found",
            HarvestError::AllFetchesFailed { .. } => "all_fetches_failed",
            HarvestError::EmptyDocument => "empty_document",
            HarvestError::PdfiumBindingFailed(_) => "pdfium_unavailable",
            HarvestError::DocumentBuildFailed { .. } => "document_build_failed",
            HarvestError::OutputWriteFailed { .. } => "output_write_failed",
            HarvestError::InvalidConfig(_) => "invalid_config",
            HarvestError::Internal(_) => "internal",
        }
    }
}

/// Unrecoverable problems with the rendering session.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RenderError {
    /// Navigation plus network quiescence exceeded the hard ceiling.
    #[error("Navigation to '{url}' timed out after {secs}s")]
    NavigationTimeout { url: String, secs: u64 },

    /// The browser reported a navigation failure (DNS, TLS, refused, …).
    #[error("Navigation to '{url}' failed: {detail}")]
    NavigationFailed { url: String, detail: String },

    /// Launching, scripting, or talking to the browser failed, or the
    /// session was cancelled by its caller.
    #[error("Rendering session error: {0}")]
    SessionError(String),
}

/// A non-fatal fetch failure for a single image.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum FetchError {
    /// No complete response within the fetch timeout.
    #[error("'{url}': timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// Connection failure, non-2xx status, or a broken body.
    #[error("'{url}': network error: {detail}")]
    NetworkError { url: String, detail: String },

    /// Declared content type cannot be embedded (webp, svg, gif, missing…).
    #[error("'{url}': unsupported format '{content_type}'")]
    UnsupportedFormat { url: String, content_type: String },
}

/// A non-fatal decode failure: the bytes do not match the declared format.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("'{url}': could not decode as {format}: {detail}")]
pub struct DecodeError {
    pub url: String,
    pub format: String,
    pub detail: String,
}

/// Why a single candidate did not become a page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_fetches_failed_display() {
        let e = HarvestError::AllFetchesFailed {
            total: 4,
            first_error: "timed out".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("all 4 candidates"), "got: {msg}");
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn render_error_is_transparent() {
        let e: HarvestError = RenderError::NavigationTimeout {
            url: "https://example.com".into(),
            secs: 180,
        }
        .into();
        assert_eq!(e.to_string(), "Navigation to 'https://example.com' timed out after 180s");
        assert_eq!(e.kind(), "navigation_timeout");
    }

    #[test]
    fn no_images_and_all_failed_have_distinct_kinds() {
        let none = HarvestError::NoImagesFound { url: "u".into() };
        let failed = HarvestError::AllFetchesFailed {
            total: 1,
            first_error: String::new(),
        };
        assert_ne!(none.kind(), failed.kind());
    }

    #[test]
    fn image_error_wraps_both_families() {
        let fetch: ImageError = FetchError::UnsupportedFormat {
            url: "https://x/a.webp".into(),
            content_type: "image/webp".into(),
        }
        .into();
        assert!(fetch.to_string().contains("image/webp"));

        let decode: ImageError = DecodeError {
            url: "https://x/a.png".into(),
            format: "PNG".into(),
            detail: "bad signature".into(),
        }
        .into();
        assert!(decode.to_string().starts_with("decode failed"));
    }

    #[test]
    fn image_error_serialises() {
        let e = ImageError::Fetch(FetchError::Timeout {
            url: "https://x/a.jpg".into(),
            secs: 5,
        });
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("Timeout"));
    }
}

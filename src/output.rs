//! Data carried between pipeline stages and returned to callers.

use crate::error::ImageError;
use serde::{Deserialize, Serialize};

/// An image reference extracted from the rendered DOM, before fetching.
///
/// `width`/`height` are the *rendered* CSS pixel dimensions used for the
/// icon filter; the page size later comes from the decoded image instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Declared content type mapped onto the embed paths the assembler knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbedFormat {
    Png,
    Jpeg,
}

impl EmbedFormat {
    /// Total mapping from a `Content-Type` header value to an embed path.
    ///
    /// Only the MIME essence counts (parameters such as `; charset=` are
    /// dropped, comparison is case-insensitive). Anything unmapped, including
    /// `image/webp` and `image/svg+xml`, yields `None`.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Some(EmbedFormat::Png),
            "image/jpeg" | "image/jpg" => Some(EmbedFormat::Jpeg),
            _ => None,
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            EmbedFormat::Png => image::ImageFormat::Png,
            EmbedFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EmbedFormat::Png => "PNG",
            EmbedFormat::Jpeg => "JPEG",
        }
    }
}

/// Raw bytes of one fetched image. Lives only between fetcher and assembler.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub format: EmbedFormat,
    pub source: ImageCandidate,
}

/// How the auto-scroll loop ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollReport {
    /// Scroll ticks performed.
    pub iterations: u32,
    /// Cumulative requested scroll distance in CSS pixels.
    pub distance_px: u64,
    /// Content height reported on the last tick.
    pub reported_height_px: u64,
    /// `true` when the distance caught up with the reported height;
    /// `false` when the iteration cap stopped the loop first.
    pub reached_bottom: bool,
}

/// Everything the renderer hands back to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPage {
    /// Deduplicated candidates in DOM discovery order.
    pub candidates: Vec<ImageCandidate>,
    pub scroll: ScrollReport,
}

/// Outcome for one candidate, in discovery order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResult {
    /// 0-based discovery index.
    pub index: usize,
    pub url: String,
    /// 1-based page number in the output document, `None` when skipped.
    pub page_num: Option<usize>,
    /// Native pixel size of the embedded image (0 when skipped).
    pub width: u32,
    pub height: u32,
    /// Fetch wall-clock time in milliseconds.
    pub duration_ms: u64,
    /// Why the image was skipped, `None` on success.
    pub error: Option<ImageError>,
}

/// Aggregate numbers for one harvest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestStats {
    pub candidates: usize,
    pub added_pages: usize,
    pub skipped_images: usize,
    pub render_duration_ms: u64,
    pub fetch_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The result of a successful harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestOutput {
    /// Serialised PDF document.
    #[serde(skip)]
    pub pdf: Vec<u8>,
    pub url: String,
    pub images: Vec<ImageResult>,
    pub scroll: ScrollReport,
    pub stats: HarvestStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_mapping() {
        assert_eq!(EmbedFormat::from_content_type("image/png"), Some(EmbedFormat::Png));
        assert_eq!(EmbedFormat::from_content_type("image/jpeg"), Some(EmbedFormat::Jpeg));
        assert_eq!(EmbedFormat::from_content_type("image/jpg"), Some(EmbedFormat::Jpeg));
        assert_eq!(
            EmbedFormat::from_content_type("IMAGE/JPEG; charset=binary"),
            Some(EmbedFormat::Jpeg)
        );
        assert_eq!(EmbedFormat::from_content_type(" image/png "), Some(EmbedFormat::Png));
    }

    #[test]
    fn unmapped_content_types_are_unsupported() {
        for ct in ["image/webp", "image/svg+xml", "image/gif", "text/html", "", "png"] {
            assert_eq!(EmbedFormat::from_content_type(ct), None, "{ct}");
        }
    }

    #[test]
    fn output_json_omits_pdf_bytes() {
        let out = HarvestOutput {
            pdf: vec![1, 2, 3],
            url: "https://example.com".into(),
            images: vec![],
            scroll: ScrollReport::default(),
            stats: HarvestStats::default(),
        };
        let json = serde_json::to_string(&out).expect("serialise");
        assert!(!json.contains("\"pdf\""));
        assert!(json.contains("reached_bottom"));
    }
}

//! Request validation: turn a user-supplied string into an absolute URL.
//!
//! Validation happens before any browser is launched, so a typo costs a
//! string parse rather than a Chrome start-up.

use crate::error::HarvestError;
use reqwest::Url;
use tracing::debug;

/// A validated, immutable harvest request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    target_url: Url,
}

impl RenderRequest {
    /// Validate `target_url`: non-empty, absolute, `http` or `https`, with a host.
    pub fn new(target_url: &str) -> Result<Self, HarvestError> {
        let trimmed = target_url.trim();
        if trimmed.is_empty() {
            return Err(HarvestError::InvalidRequest {
                reason: "URL is required".into(),
            });
        }

        let url = Url::parse(trimmed).map_err(|e| HarvestError::InvalidRequest {
            reason: format!("'{trimmed}' is not a well-formed absolute URL: {e}"),
        })?;

        if !is_web_scheme(url.scheme()) {
            return Err(HarvestError::InvalidRequest {
                reason: format!("unsupported scheme '{}': expected http or https", url.scheme()),
            });
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(HarvestError::InvalidRequest {
                reason: format!("'{trimmed}' has no host"),
            });
        }

        debug!("Validated request URL: {}", url);
        Ok(Self { target_url: url })
    }

    pub fn url(&self) -> &Url {
        &self.target_url
    }

    pub fn as_str(&self) -> &str {
        self.target_url.as_str()
    }
}

fn is_web_scheme(scheme: &str) -> bool {
    scheme == "http" || scheme == "https"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_absolute_web_urls() {
        let req = RenderRequest::new("https://example.com/gallery").expect("valid");
        assert_eq!(req.as_str(), "https://example.com/gallery");
        assert!(RenderRequest::new("http://localhost:8080/a?b=c").is_ok());
        assert!(RenderRequest::new("  https://example.com  ").is_ok());
    }

    #[test]
    fn rejects_empty_and_relative() {
        for bad in ["", "   ", "/gallery", "example.com/gallery", "gallery.html"] {
            let err = RenderRequest::new(bad).expect_err(bad);
            assert!(matches!(err, HarvestError::InvalidRequest { .. }), "{bad}: {err}");
        }
    }

    #[test]
    fn rejects_non_web_schemes() {
        for bad in ["file:///etc/passwd", "ftp://example.com/", "data:text/html,hi"] {
            assert!(RenderRequest::new(bad).is_err(), "{bad}");
        }
    }
}

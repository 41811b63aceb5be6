//! Image fetching: one bounded GET per candidate.
//!
//! Every failure mode becomes a typed [`FetchError`] value. Nothing here
//! panics or returns a fatal error for a bad image, so one blocked CDN host
//! never takes the rest of the batch down with it.

use crate::config::HarvestConfig;
use crate::error::{FetchError, HarvestError};
use crate::output::{EmbedFormat, FetchedImage, ImageCandidate};
use reqwest::header::CONTENT_TYPE;
use std::future::Future;
use tracing::debug;

/// Retrieves the bytes behind one candidate.
pub trait ImageFetcher: Send + Sync {
    fn fetch(
        &self,
        candidate: &ImageCandidate,
    ) -> impl Future<Output = Result<FetchedImage, FetchError>> + Send;
}

/// Default fetcher over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    /// Build a client with the configured timeout and user agent.
    pub fn new(config: &HarvestConfig) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| HarvestError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: config.fetch_timeout_secs,
        })
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            FetchError::NetworkError {
                url: url.to_string(),
                detail: e.to_string(),
            }
        }
    }

    async fn get(&self, candidate: &ImageCandidate) -> Result<FetchedImage, FetchError> {
        let url = candidate.url.as_str();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::NetworkError {
                url: url.to_string(),
                detail: format!("HTTP {}", response.status()),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        // Checked before the body is read so unsupported images cost no download.
        let format = EmbedFormat::from_content_type(&content_type).ok_or_else(|| {
            FetchError::UnsupportedFormat {
                url: url.to_string(),
                content_type: if content_type.is_empty() {
                    "<missing>".to_string()
                } else {
                    content_type.clone()
                },
            }
        })?;

        let bytes = response.bytes().await.map_err(|e| self.classify(url, e))?;
        debug!("Fetched {} ({} bytes, {})", url, bytes.len(), content_type);

        Ok(FetchedImage {
            bytes: bytes.to_vec(),
            content_type,
            format,
            source: candidate.clone(),
        })
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(
        &self,
        candidate: &ImageCandidate,
    ) -> impl Future<Output = Result<FetchedImage, FetchError>> + Send {
        self.get(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::time::Duration;
    use tiny_http::{Header, Response, Server, StatusCode};

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([0, 128, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode png");
        buf
    }

    /// Serve a fixed set of routes on an ephemeral port and return the base URL.
    fn start_test_server() -> String {
        let server = Server::http("127.0.0.1:0").expect("bind test server");
        let port = server
            .server_addr()
            .to_ip()
            .expect("tcp listener")
            .port();
        let png = png_bytes();

        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                let ua = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("User-Agent"))
                    .map(|h| h.value.as_str().to_string())
                    .unwrap_or_default();

                let with_type = |body: Vec<u8>, ct: &str| {
                    Response::from_data(body).with_header(
                        format!("Content-Type: {ct}")
                            .parse::<Header>()
                            .expect("header"),
                    )
                };

                let response = match request.url() {
                    "/a.png" => with_type(png.clone(), "image/png"),
                    "/a.jpg" => with_type(vec![0xFF, 0xD8, 0xFF], "image/jpeg; charset=binary"),
                    "/a.webp" => with_type(b"RIFF....WEBP".to_vec(), "image/webp"),
                    "/untyped" => Response::from_data(png.clone()),
                    "/ua" if ua.starts_with("Mozilla/5.0") => with_type(png.clone(), "image/png"),
                    "/slow.png" => {
                        std::thread::sleep(Duration::from_secs(3));
                        with_type(png.clone(), "image/png")
                    }
                    _ => Response::from_data(b"not found".to_vec())
                        .with_status_code(StatusCode(404)),
                };
                let _ = request.respond(response);
            }
        });

        format!("http://127.0.0.1:{port}")
    }

    fn candidate(url: String) -> ImageCandidate {
        ImageCandidate {
            url,
            width: 100,
            height: 100,
        }
    }

    fn fetcher() -> HttpFetcher {
        let config = HarvestConfig::builder()
            .fetch_timeout_secs(1)
            .build()
            .expect("valid");
        HttpFetcher::new(&config).expect("client")
    }

    #[tokio::test]
    async fn fetches_png_with_declared_type() {
        let base = start_test_server();
        let img = fetcher()
            .fetch(&candidate(format!("{base}/a.png")))
            .await
            .expect("fetch");
        assert_eq!(img.format, EmbedFormat::Png);
        assert_eq!(img.content_type, "image/png");
        assert_eq!(img.bytes, png_bytes());
        assert_eq!(img.source.url, format!("{base}/a.png"));
    }

    #[tokio::test]
    async fn jpeg_type_with_parameters_is_accepted() {
        let base = start_test_server();
        let img = fetcher()
            .fetch(&candidate(format!("{base}/a.jpg")))
            .await
            .expect("fetch");
        assert_eq!(img.format, EmbedFormat::Jpeg);
    }

    #[tokio::test]
    async fn sends_browser_like_user_agent() {
        let base = start_test_server();
        let result = fetcher().fetch(&candidate(format!("{base}/ua"))).await;
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn webp_is_unsupported() {
        let base = start_test_server();
        let err = fetcher()
            .fetch(&candidate(format!("{base}/a.webp")))
            .await
            .expect_err("webp");
        assert_eq!(
            err,
            FetchError::UnsupportedFormat {
                url: format!("{base}/a.webp"),
                content_type: "image/webp".into(),
            }
        );
    }

    #[tokio::test]
    async fn missing_content_type_is_unsupported() {
        let base = start_test_server();
        let err = fetcher()
            .fetch(&candidate(format!("{base}/untyped")))
            .await
            .expect_err("untyped");
        assert!(matches!(err, FetchError::UnsupportedFormat { .. }), "{err}");
    }

    #[tokio::test]
    async fn http_error_status_is_network_error() {
        let base = start_test_server();
        let err = fetcher()
            .fetch(&candidate(format!("{base}/missing.png")))
            .await
            .expect_err("404");
        match err {
            FetchError::NetworkError { detail, .. } => assert!(detail.contains("404"), "{detail}"),
            other => panic!("expected NetworkError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let err = fetcher()
            .fetch(&candidate("http://127.0.0.1:9/nothing.png".into()))
            .await
            .expect_err("refused");
        assert!(matches!(err, FetchError::NetworkError { .. }), "{err}");
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let base = start_test_server();
        let err = fetcher()
            .fetch(&candidate(format!("{base}/slow.png")))
            .await
            .expect_err("slow");
        assert!(matches!(err, FetchError::Timeout { secs: 1, .. }), "{err}");
    }
}

//! Pipeline stages for web-page-to-PDF harvesting.
//!
//! Each submodule implements exactly one step. The browser and the HTTP
//! client sit behind traits ([`render::PageRenderer`],
//! [`fetch::ImageFetcher`]) so the orchestration in [`crate::harvest`] can be
//! exercised without Chrome or the network.
//!
//! ## Data Flow
//!
//! ```text
//! request ──▶ render ──▶ fetch ──▶ assemble
//!  (URL)     (Chrome)   (HTTP)    (pdfium)
//! ```
//!
//! 1. [`request`]  validate the target URL before any browser starts
//! 2. [`render`]   navigate, wait for the network, auto-scroll, extract
//!    `<img>` candidates; runs in `spawn_blocking` because the CDP client
//!    is blocking
//! 3. [`fetch`]    one bounded GET per candidate, concurrently
//! 4. [`assemble`] validate each image and lay it out one per page

pub mod assemble;
pub mod fetch;
pub mod render;
pub mod request;

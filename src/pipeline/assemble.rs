//! PDF assembly: one image per page, sized to the image.
//!
//! [`PdfAssembler::add_image`] decodes each image once with the `image`
//! crate to validate it against its declared content type, so a mismatched
//! byte stream is rejected there as a [`DecodeError`] and never reaches
//! pdfium. Only the encoded bytes and the pixel size are kept.
//!
//! [`PdfAssembler::finalize`] writes the pages in order: JPEG data is
//! embedded as-is (DCT stream, no re-encode), PNGs are decoded one page at a
//! time and handed to pdfium as bitmaps. It consumes the assembler.
//!
//! pdfium is not async-safe, so callers run `finalize` inside
//! `spawn_blocking` (see [`crate::harvest`]).

use crate::error::{DecodeError, HarvestError};
use crate::output::{EmbedFormat, FetchedImage, ImageCandidate};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// A validated page waiting to be written.
pub struct AssembledPage {
    pub width: u32,
    pub height: u32,
    pub format: EmbedFormat,
    pub source: ImageCandidate,
    bytes: Vec<u8>,
}

impl AssembledPage {
    /// Encoded image data exactly as fetched.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Append-only, single-use page accumulator.
#[derive(Default)]
pub struct PdfAssembler {
    pages: Vec<AssembledPage>,
}

impl PdfAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `image` against its declared format and append it as the next page.
    ///
    /// Returns the native pixel size of the new page.
    pub fn add_image(&mut self, image: FetchedImage) -> Result<(u32, u32), DecodeError> {
        let FetchedImage {
            bytes,
            format,
            source,
            ..
        } = image;

        let (width, height) = {
            let decoded = image::load_from_memory_with_format(&bytes, format.image_format())
                .map_err(|e| DecodeError {
                    url: source.url.clone(),
                    format: format.name().to_string(),
                    detail: e.to_string(),
                })?;
            (decoded.width(), decoded.height())
        };

        debug!(
            "Page {}: {}x{} px {} from {}",
            self.pages.len() + 1,
            width,
            height,
            format.name(),
            source.url
        );

        self.pages.push(AssembledPage {
            width,
            height,
            format,
            source,
            bytes,
        });
        Ok((width, height))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[AssembledPage] {
        &self.pages
    }

    /// Write every page into a new PDF and return its bytes.
    ///
    /// Each page measures exactly `width × height` points and the image is
    /// drawn at the origin filling it: no scaling, margins, or cropping.
    pub fn finalize(self, pdfium_lib_path: Option<&Path>) -> Result<Vec<u8>, HarvestError> {
        if self.pages.is_empty() {
            return Err(HarvestError::EmptyDocument);
        }

        let pdfium = bind_pdfium(pdfium_lib_path)?;
        let mut document = pdfium.create_new_pdf().map_err(build_failed)?;

        for page in &self.pages {
            let width = PdfPoints::new(page.width as f32);
            let height = PdfPoints::new(page.height as f32);

            let object = image_object(&document, page, width, height)?;
            document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::Custom(width, height))
                .map_err(build_failed)?
                .objects_mut()
                .add_image_object(object)
                .map_err(build_failed)?;
        }

        let bytes = document.save_to_bytes().map_err(build_failed)?;
        info!("Serialised {} pages into {} bytes", self.pages.len(), bytes.len());
        Ok(bytes)
    }
}

/// Build the image object for one page, scaled from pdfium's 1×1 pt default
/// to the page size.
fn image_object<'a>(
    document: &PdfDocument<'a>,
    page: &AssembledPage,
    width: PdfPoints,
    height: PdfPoints,
) -> Result<PdfPageImageObject<'a>, HarvestError> {
    match page.format {
        EmbedFormat::Jpeg => {
            let mut object =
                PdfPageImageObject::new_from_jpeg_reader(document, Cursor::new(page.bytes()))
                    .map_err(build_failed)?;
            object
                .scale(width.value, height.value)
                .map_err(build_failed)?;
            Ok(object)
        }
        EmbedFormat::Png => {
            let decoded = image::load_from_memory_with_format(page.bytes(), page.format.image_format())
                .map_err(|e| HarvestError::DocumentBuildFailed {
                    detail: format!("{}: {e}", page.source.url),
                })?;
            PdfPageImageObject::new_with_size(document, &decoded, width, height).map_err(build_failed)
        }
    }
}

fn build_failed(e: PdfiumError) -> HarvestError {
    HarvestError::DocumentBuildFailed {
        detail: format!("{e:?}"),
    }
}

/// Bind to pdfium: explicit path, then `PDFIUM_LIB_PATH`, then the system library.
///
/// A path may name the library file itself or the directory holding it.
pub fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, HarvestError> {
    let env_path = std::env::var_os("PDFIUM_LIB_PATH");
    let configured = explicit.or(env_path.as_deref().map(Path::new));

    let bindings = match configured {
        Some(path) => {
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(path)
            } else {
                path.to_path_buf()
            };
            Pdfium::bind_to_library(&lib)
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| {
                    HarvestError::PdfiumBindingFailed(format!("{}: {e:?}", lib.display()))
                })?
        }
        None => Pdfium::bind_to_system_library()
            .map_err(|e| HarvestError::PdfiumBindingFailed(format!("{e:?}")))?,
    };

    Ok(Pdfium::new(bindings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 10, 10])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format)
            .expect("encode");
        buf
    }

    fn fetched(url: &str, bytes: Vec<u8>, format: EmbedFormat) -> FetchedImage {
        FetchedImage {
            bytes,
            content_type: match format {
                EmbedFormat::Png => "image/png".into(),
                EmbedFormat::Jpeg => "image/jpeg".into(),
            },
            format,
            source: ImageCandidate {
                url: url.into(),
                width: 60,
                height: 60,
            },
        }
    }

    #[test]
    fn pages_take_native_pixel_size_in_call_order() {
        let mut asm = PdfAssembler::new();
        let first = asm
            .add_image(fetched("a", encoded(80, 60, ImageFormat::Png), EmbedFormat::Png))
            .expect("png");
        let second = asm
            .add_image(fetched("b", encoded(120, 90, ImageFormat::Jpeg), EmbedFormat::Jpeg))
            .expect("jpeg");

        assert_eq!(first, (80, 60));
        assert_eq!(second, (120, 90));
        let urls: Vec<_> = asm.pages().iter().map(|p| p.source.url.as_str()).collect();
        assert_eq!(urls, ["a", "b"]);
    }

    #[test]
    fn pages_keep_encoded_bytes_not_pixels() {
        let mut asm = PdfAssembler::new();
        for i in 0..5 {
            let jpeg = encoded(1600, 1200, ImageFormat::Jpeg);
            asm.add_image(fetched(&format!("big-{i}.jpg"), jpeg.clone(), EmbedFormat::Jpeg))
                .expect("jpeg");
            let page = &asm.pages()[i];
            assert_eq!(page.bytes(), jpeg.as_slice(), "stored verbatim");
            assert_eq!((page.width, page.height), (1600, 1200));
        }
        let held: usize = asm.pages().iter().map(|p| p.bytes().len()).sum();
        assert!(held < 1600 * 1200 * 3, "held {held} bytes for five pages");
    }

    #[test]
    fn mismatched_bytes_are_decode_errors() {
        let mut asm = PdfAssembler::new();
        let err = asm
            .add_image(fetched("x.png", encoded(10, 10, ImageFormat::Jpeg), EmbedFormat::Png))
            .expect_err("jpeg bytes declared as png");
        assert_eq!(err.url, "x.png");
        assert_eq!(err.format, "PNG");

        let err = asm
            .add_image(fetched("y.jpg", b"<html>blocked</html>".to_vec(), EmbedFormat::Jpeg))
            .expect_err("html declared as jpeg");
        assert_eq!(err.format, "JPEG");
        assert!(asm.is_empty());
    }

    #[test]
    fn finalize_refuses_empty_document() {
        let err = PdfAssembler::new()
            .finalize(None)
            .expect_err("no pages");
        assert!(matches!(err, HarvestError::EmptyDocument));
    }
}

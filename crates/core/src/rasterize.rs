use crate::error::ConversionError;
use crate::traits::PageRenderer;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::PathBuf;

pub const DEFAULT_MAX_PAGES: usize = 3;
pub const DEFAULT_RENDER_DPI: f32 = 200.0;

const JPEG_MEDIA_TYPE: &str = "image/jpeg";

/// One rendered page, encoded and ready to attach to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub page: u32,
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ImageBlob {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Renders with a pdfium shared library, looked up next to the binary (or in
/// `library_dir`) and then on the system search path.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    pub library_dir: Option<PathBuf>,
    pub dpi: f32,
}

impl Default for PdfiumRenderer {
    fn default() -> Self {
        Self {
            library_dir: None,
            dpi: DEFAULT_RENDER_DPI,
        }
    }
}

impl PdfiumRenderer {
    fn bind(&self) -> Result<Pdfium, ConversionError> {
        let local = self
            .library_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./"));
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&local))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|error| ConversionError::Render(format!("failed to bind pdfium: {error}")))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_pages(&self, pdf: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>, ConversionError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|error| ConversionError::InvalidPdf(error.to_string()))?;

        let scale = self.dpi / 72.0;
        let wanted = max_pages.min(document.pages().len() as usize);
        let mut images = Vec::with_capacity(wanted);
        for page in document.pages().iter().take(wanted) {
            let config = PdfRenderConfig::new()
                .set_target_width((page.width().value * scale) as i32)
                .set_target_height((page.height().value * scale) as i32)
                .render_form_data(true)
                .render_annotations(true);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|error| ConversionError::Render(error.to_string()))?;
            images.push(bitmap.as_image());
        }

        Ok(images)
    }
}

/// Renders the first `max_pages` pages with pdfium and encodes them as JPEG.
pub fn rasterize(pdf: &[u8], max_pages: usize) -> Result<Vec<ImageBlob>, ConversionError> {
    rasterize_with(&PdfiumRenderer::default(), pdf, max_pages)
}

/// Renders `min(max_pages, page count)` pages in page order. A document with
/// fewer pages than requested is not an error.
pub fn rasterize_with<R>(renderer: &R, pdf: &[u8], max_pages: usize) -> Result<Vec<ImageBlob>, ConversionError>
where
    R: PageRenderer + ?Sized,
{
    if max_pages == 0 {
        return Ok(Vec::new());
    }

    let images = renderer.render_pages(pdf, max_pages)?;
    if images.is_empty() {
        return Err(ConversionError::EmptyDocument("pdf has no pages".to_string()));
    }
    if images.len() > max_pages {
        return Err(ConversionError::Render(format!(
            "renderer produced {} page(s), at most {max_pages} requested",
            images.len()
        )));
    }

    images
        .into_iter()
        .enumerate()
        .map(|(index, image)| {
            Ok(ImageBlob {
                page: index as u32 + 1,
                media_type: JPEG_MEDIA_TYPE,
                bytes: encode_jpeg(&image)?,
            })
        })
        .collect()
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, ConversionError> {
    // JPEG has no alpha channel; rendered bitmaps are RGBA.
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut bytes = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
    Ok(bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use lopdf::dictionary;
    use lopdf::{Document, Object, Stream};

    /// Builds an in-memory PDF whose pages are numbered by a tiny content stream.
    pub(crate) fn pdf_with_pages(count: usize) -> Vec<u8> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let mut kids = Vec::new();

        for index in 0..count {
            let content = format!("BT /F1 12 Tf 72 720 Td (page {}) Tj ET", index + 1);
            let content_id = document.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(Object::Reference(page_id));
        }

        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count as i64,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        document
            .save_to(&mut bytes)
            .expect("in-memory pdf should serialize");
        bytes
    }

    /// Reads the page tree with lopdf and paints page `n` with a gray level of
    /// `n * 40` so order is observable.
    #[derive(Default)]
    pub(crate) struct ShadeRenderer;

    impl PageRenderer for ShadeRenderer {
        fn render_pages(&self, pdf: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>, ConversionError> {
            let document =
                Document::load_mem(pdf).map_err(|error| ConversionError::InvalidPdf(error.to_string()))?;
            let wanted = document.get_pages().len().min(max_pages);
            Ok((0..wanted)
                .map(|index| {
                    let shade = (index as u8 + 1) * 40;
                    DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([shade, shade, shade])))
                })
                .collect())
        }
    }

    /// Ignores the page cap.
    struct GreedyRenderer;

    impl PageRenderer for GreedyRenderer {
        fn render_pages(&self, _pdf: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>, ConversionError> {
            Ok(vec![DynamicImage::new_rgba8(4, 4); max_pages + 1])
        }
    }

    #[test]
    fn page_limit_caps_the_image_count() -> Result<(), Box<dyn std::error::Error>> {
        let pdf = pdf_with_pages(5);
        let images = rasterize_with(&ShadeRenderer, &pdf, 3)?;
        assert_eq!(images.len(), 3);
        assert_eq!(images.iter().map(|image| image.page).collect::<Vec<_>>(), vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn short_documents_stop_at_their_last_page() -> Result<(), Box<dyn std::error::Error>> {
        let pdf = pdf_with_pages(2);
        let images = rasterize_with(&ShadeRenderer, &pdf, 3)?;
        assert_eq!(images.len(), 2);
        Ok(())
    }

    #[test]
    fn images_are_jpeg_encoded_in_page_order() -> Result<(), Box<dyn std::error::Error>> {
        let pdf = pdf_with_pages(2);
        let images = rasterize_with(&ShadeRenderer, &pdf, 2)?;

        for (index, blob) in images.iter().enumerate() {
            assert_eq!(blob.media_type, "image/jpeg");
            assert_eq!(&blob.bytes[..2], &[0xFF, 0xD8]);
            let decoded = image::load_from_memory(&blob.bytes)?.to_rgb8();
            let expected = (index as i32 + 1) * 40;
            let actual = decoded.get_pixel(4, 4)[0] as i32;
            assert!((actual - expected).abs() <= 4, "page {} shade {actual}", blob.page);
        }
        assert!(!images[0].to_base64().is_empty());
        Ok(())
    }

    #[test]
    fn non_pdf_input_is_a_conversion_error() {
        let result = rasterize_with(&ShadeRenderer, b"not a pdf at all", 2);
        assert!(matches!(result, Err(ConversionError::InvalidPdf(_))));
    }

    #[test]
    fn renderer_exceeding_the_page_cap_is_rejected() {
        let pdf = pdf_with_pages(3);
        let result = rasterize_with(&GreedyRenderer, &pdf, 2);
        assert!(matches!(result, Err(ConversionError::Render(_))));
    }

    #[test]
    fn pdf_without_pages_is_an_empty_document() {
        let result = rasterize_with(&ShadeRenderer, &pdf_with_pages(0), 3);
        assert!(matches!(result, Err(ConversionError::EmptyDocument(_))));
    }

    #[test]
    fn zero_page_cap_renders_nothing() -> Result<(), Box<dyn std::error::Error>> {
        assert!(rasterize_with(&ShadeRenderer, &pdf_with_pages(2), 0)?.is_empty());
        Ok(())
    }
}

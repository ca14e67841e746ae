use crate::extractor::StructuredRequest;
use crate::{ConversionError, ExtractionError};
use async_trait::async_trait;
use image::DynamicImage;
use serde_json::Value;

/// Renders the first pages of a PDF to bitmaps.
pub trait PageRenderer {
    /// Renders the first `min(max_pages, page count)` pages in order. Fails
    /// with `InvalidPdf` when the bytes cannot be opened as a PDF.
    fn render_pages(&self, pdf: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>, ConversionError>;
}

/// A structured-output capable model endpoint.
#[async_trait]
pub trait ModelTransport {
    /// Provider label used in metrics and logs.
    fn provider(&self) -> &'static str;

    /// Sends the request and returns the raw JSON object the model produced
    /// for the requested schema.
    async fn complete(&self, request: &StructuredRequest) -> Result<Value, ExtractionError>;
}

/// Receives extraction observations. Injected so callers can isolate counters.
pub trait MetricsSink: Send + Sync {
    fn observe_extraction_duration(&self, seconds: f64);
    fn increment_documents_processed(&self, status: &str);
    fn increment_llm_error(&self, provider: &str, error_type: &str);
    fn add_upload_bytes(&self, bytes: u64);
}

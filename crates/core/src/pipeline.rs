use crate::error::{ConversionError, ShipmentError};
use crate::extractor::ExtractionClient;
use crate::models::ShipmentResponse;
use crate::rasterize::{rasterize_with, ImageBlob};
use crate::spreadsheet::tabular_to_text;
use crate::traits::{MetricsSink, ModelTransport, PageRenderer};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// One uploaded file, byte-identical to what the caller sent.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn read(path: &Path) -> Result<Self, ShipmentError> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Self { file_name, bytes })
    }

    pub fn kind(&self) -> Option<DocumentKind> {
        let lowered = self.file_name.to_lowercase();
        if lowered.ends_with(".pdf") {
            Some(DocumentKind::Pdf)
        } else if lowered.ends_with(".xlsx") || lowered.ends_with(".xls") {
            Some(DocumentKind::Spreadsheet)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Spreadsheet,
}

/// Normalize, extract, derive. Each call is self-contained and safe to repeat.
pub struct ShipmentPipeline<R, T> {
    renderer: Arc<R>,
    client: ExtractionClient<T>,
    metrics: Arc<dyn MetricsSink>,
}

impl<R, T> ShipmentPipeline<R, T>
where
    R: PageRenderer + Send + Sync + 'static,
    T: ModelTransport + Send + Sync,
{
    pub fn new(renderer: R, client: ExtractionClient<T>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            renderer: Arc::new(renderer),
            client,
            metrics,
        }
    }

    /// Single BOL/packing-list pair.
    pub async fn process(&self, pdf: Vec<u8>, spreadsheet: Vec<u8>) -> Result<ShipmentResponse, ShipmentError> {
        self.process_uploads(vec![
            UploadedDocument::new("bill_of_lading.pdf", pdf),
            UploadedDocument::new("packing_list.xlsx", spreadsheet),
        ])
        .await
    }

    /// Every PDF contributes its first pages in upload order, every workbook a
    /// `File: <name>` markdown section. Unknown extensions are skipped. At least
    /// one of each kind must convert before the model is called.
    pub async fn process_uploads(
        &self,
        uploads: Vec<UploadedDocument>,
    ) -> Result<ShipmentResponse, ShipmentError> {
        let max_pages = self.client.config().max_pages;
        let total_bytes: usize = uploads.iter().map(|upload| upload.bytes.len()).sum();
        self.metrics.add_upload_bytes(total_bytes as u64);

        let mut images: Vec<ImageBlob> = Vec::new();
        let mut markdown_parts = Vec::new();

        for upload in uploads {
            match upload.kind() {
                Some(DocumentKind::Pdf) => {
                    let name = upload.file_name.clone();
                    let renderer = Arc::clone(&self.renderer);
                    let pages = run_blocking(move || rasterize_with(&*renderer, &upload.bytes, max_pages))
                        .await
                        .map_err(|source| conversion_failure(&name, source))?;
                    images.extend(pages);
                }
                Some(DocumentKind::Spreadsheet) => {
                    let name = upload.file_name.clone();
                    let markdown = run_blocking(move || tabular_to_text(&upload.bytes))
                        .await
                        .map_err(|source| conversion_failure(&name, source))?;
                    markdown_parts.push(format!("File: {name}\n{markdown}"));
                }
                None => {
                    warn!(file = %upload.file_name, "skipping upload with unsupported extension");
                }
            }
        }

        if images.is_empty() {
            return Err(ShipmentError::MissingPdf);
        }
        if markdown_parts.is_empty() {
            return Err(ShipmentError::MissingSpreadsheet);
        }

        let markdown = markdown_parts.join("\n\n");
        let extraction = self.client.extract(&images, &markdown).await?;
        let response = ShipmentResponse::from(extraction);

        info!(
            bill_of_lading = response.extraction.bill_of_lading_number.as_deref().unwrap_or("unknown"),
            pages = images.len(),
            "shipment processed"
        );
        Ok(response)
    }
}

fn conversion_failure(document: &str, source: ConversionError) -> ShipmentError {
    warn!(document, error = %source, "document conversion failed");
    ShipmentError::Conversion {
        document: document.to_string(),
        source,
    }
}

/// Conversions are CPU-bound and may take seconds; keep them off the async workers.
async fn run_blocking<F, V>(work: F) -> Result<V, ConversionError>
where
    F: FnOnce() -> Result<V, ConversionError> + Send + 'static,
    V: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| ConversionError::Render(format!("conversion task aborted: {error}")))?
}

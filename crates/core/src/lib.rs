pub mod derived;
pub mod error;
pub mod evaluation;
pub mod extractor;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod rasterize;
pub mod similarity;
pub mod spreadsheet;
pub mod storage;
pub mod traits;

pub use derived::{average, derive_averages, DerivedAverages};
pub use error::{ConversionError, ExtractionError, FailureKind, ShipmentError};
pub use evaluation::{
    evaluate, is_match, normalize_text, Comparator, ComparatorTable, EvaluationReport,
    FieldResult, FieldStatus, GroundTruth, MatchOutcome, Scores, Tally,
};
pub use extractor::{
    build_request, ExtractionClient, ExtractionConfig, RejectedAttempt, StructuredRequest,
};
pub use metrics::{DurationHistogram, InMemoryMetrics, MetricsSnapshot, NoopMetrics};
pub use models::{FieldValue, ShipmentExtraction, ShipmentField, ShipmentResponse};
pub use pipeline::{DocumentKind, ShipmentPipeline, UploadedDocument};
pub use providers::AnthropicTransport;
pub use rasterize::{rasterize, rasterize_with, ImageBlob, PdfiumRenderer, DEFAULT_MAX_PAGES};
pub use spreadsheet::tabular_to_text;
pub use storage::save_shipment;
pub use traits::{MetricsSink, ModelTransport, PageRenderer};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("invalid pdf: {0}")]
    InvalidPdf(String),

    #[error("pdf render error: {0}")]
    Render(String),

    #[error("image encode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("document has no content: {0}")]
    EmptyDocument(String),
}

/// Closed set of model-call failure kinds. `Unknown` is the catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    RateLimited,
    Timeout,
    Upstream,
    Unknown,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{provider} rate limited the request: {message}")]
    RateLimited { provider: String, message: String },

    #[error("{provider} did not respond in time")]
    Timeout { provider: String },

    #[error("{provider} api error{}: {message}", status_suffix(.status))]
    Upstream {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("model output failed schema validation: {0}")]
    Validation(String),

    #[error("extraction failed: {0}")]
    Unknown(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" ({code})")).unwrap_or_default()
}

impl ExtractionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Upstream { .. } => FailureKind::Upstream,
            Self::Validation(_) | Self::Unknown(_) => FailureKind::Unknown,
        }
    }

    /// Label used for the `error_type` dimension of the LLM error counter.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limit",
            Self::Timeout { .. } => "timeout",
            Self::Upstream { .. } => "api_error",
            Self::Validation(_) => "validation_error",
            Self::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Error)]
pub enum ShipmentError {
    #[error("conversion failed for {document}: {source}")]
    Conversion {
        document: String,
        #[source]
        source: ConversionError,
    },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("no PDF (Bill of Lading) file uploaded")]
    MissingPdf,

    #[error("no spreadsheet (Packing List/Invoice) file uploaded")]
    MissingSpreadsheet,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ShipmentError {
    /// True when the failure is caused by the caller's input rather than the service.
    pub fn is_client_fault(&self) -> bool {
        match self {
            Self::Conversion { .. } | Self::MissingPdf | Self::MissingSpreadsheet => true,
            Self::Extraction(ExtractionError::Validation(_)) => true,
            Self::Extraction(_) | Self::Io(_) | Self::Serialization(_) | Self::Config(_) => false,
        }
    }
}

pub type Result<T, E = ShipmentError> = std::result::Result<T, E>;

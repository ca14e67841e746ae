use crate::error::{ExtractionError, ShipmentError};
use crate::metrics::{STATUS_ERROR, STATUS_SUCCESS};
use crate::models::ShipmentExtraction;
use crate::prompts::{
    user_prompt, validation_feedback, EXTRACTION_TOOL_DESCRIPTION, EXTRACTION_TOOL_NAME,
    SYSTEM_PROMPT,
};
use crate::rasterize::{ImageBlob, DEFAULT_MAX_PAGES};
use crate::traits::{MetricsSink, ModelTransport};
use schemars::schema_for;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Process-wide extraction settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub max_pages: usize,
    pub base_url: String,
    pub timeout: Duration,
    /// Model calls allowed per extraction when the output fails validation.
    pub validation_attempts: u32,
}

impl ExtractionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_pages: DEFAULT_MAX_PAGES,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            validation_attempts: 1,
        }
    }

    /// Reads `ANTHROPIC_API_KEY` (required), `ANTHROPIC_BASE_URL`,
    /// `EXTRACTION_MODEL` and `EXTRACTION_MAX_PAGES`.
    pub fn from_env() -> Result<Self, ShipmentError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ExtractionConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ShipmentError> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = var("ANTHROPIC_API_KEY")
            .ok_or_else(|| ShipmentError::Config("ANTHROPIC_API_KEY is not set".to_string()))?;
        let mut config = Self::new(api_key);

        if let Some(base_url) = var("ANTHROPIC_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(model) = var("EXTRACTION_MODEL") {
            config.model = model;
        }
        if let Some(max_pages) = var("EXTRACTION_MAX_PAGES") {
            config.max_pages = max_pages.parse().map_err(|_| {
                ShipmentError::Config(format!("EXTRACTION_MAX_PAGES is not a number: {max_pages}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ShipmentError> {
        if self.api_key.trim().is_empty() {
            return Err(ShipmentError::Config("api key is empty".to_string()));
        }
        if self.max_pages == 0 {
            return Err(ShipmentError::Config("max_pages must be at least 1".to_string()));
        }
        if self.validation_attempts == 0 {
            return Err(ShipmentError::Config(
                "validation_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Image { media_type: String, data: String },
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool call whose input failed validation, replayed to the model together
/// with the reason so the next attempt can correct it.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedAttempt {
    pub output: Value,
    pub feedback: String,
}

/// A schema-constrained request: the model must answer by calling `tool` with
/// an object matching its input schema. `rejected` holds earlier attempts of
/// the same extraction, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub content: Vec<ContentBlock>,
    pub tool: ToolSchema,
    pub rejected: Vec<RejectedAttempt>,
}

/// JSON schema of [`ShipmentExtraction`] as sent to the model.
pub fn extraction_schema() -> Value {
    let mut schema = serde_json::to_value(schema_for!(ShipmentExtraction)).unwrap_or_default();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}

/// Images first, in page order, then the text block.
pub fn build_request(config: &ExtractionConfig, images: &[ImageBlob], markdown: &str) -> StructuredRequest {
    let mut content = images
        .iter()
        .map(|image| ContentBlock::Image {
            media_type: image.media_type.to_string(),
            data: image.to_base64(),
        })
        .collect::<Vec<_>>();
    content.push(ContentBlock::Text {
        text: user_prompt(markdown),
    });

    StructuredRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        system: SYSTEM_PROMPT.to_string(),
        content,
        tool: ToolSchema {
            name: EXTRACTION_TOOL_NAME.to_string(),
            description: EXTRACTION_TOOL_DESCRIPTION.to_string(),
            input_schema: extraction_schema(),
        },
        rejected: Vec::new(),
    }
}

pub fn parse_extraction(value: Value) -> Result<ShipmentExtraction, ExtractionError> {
    if !value.is_object() {
        return Err(ExtractionError::Validation(format!(
            "expected a JSON object, got {value}"
        )));
    }
    serde_json::from_value::<ShipmentExtraction>(value)
        .map(ShipmentExtraction::sanitized)
        .map_err(|error| ExtractionError::Validation(error.to_string()))
}

pub struct ExtractionClient<T> {
    transport: T,
    metrics: Arc<dyn MetricsSink>,
    config: ExtractionConfig,
}

impl<T> ExtractionClient<T>
where
    T: ModelTransport + Send + Sync,
{
    pub fn new(transport: T, metrics: Arc<dyn MetricsSink>, config: ExtractionConfig) -> Self {
        Self {
            transport,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Runs one extraction. Duration and outcome are recorded on every path,
    /// before the result is returned.
    pub async fn extract(
        &self,
        images: &[ImageBlob],
        markdown: &str,
    ) -> Result<ShipmentExtraction, ExtractionError> {
        if images.is_empty() {
            warn!("extraction requested without page images; prompt will carry text only");
        }

        let request = build_request(&self.config, images, markdown);
        debug!(
            model = %request.model,
            images = images.len(),
            markdown_chars = markdown.len(),
            "sending extraction request"
        );

        let started = Instant::now();
        let outcome = self.invoke(request).await;
        let elapsed = started.elapsed().as_secs_f64();

        self.metrics.observe_extraction_duration(elapsed);
        match &outcome {
            Ok(_) => {
                self.metrics.increment_documents_processed(STATUS_SUCCESS);
                info!(
                    provider = self.transport.provider(),
                    duration_secs = elapsed,
                    "extraction completed"
                );
            }
            Err(error) => {
                self.metrics.increment_documents_processed(STATUS_ERROR);
                self.metrics
                    .increment_llm_error(self.transport.provider(), error.error_type());
                warn!(
                    provider = self.transport.provider(),
                    error_type = error.error_type(),
                    duration_secs = elapsed,
                    %error,
                    "extraction failed"
                );
            }
        }

        outcome
    }

    async fn invoke(&self, mut request: StructuredRequest) -> Result<ShipmentExtraction, ExtractionError> {
        let mut attempt = 1;
        loop {
            let value = self.transport.complete(&request).await?;
            match parse_extraction(value.clone()) {
                Ok(extraction) => return Ok(extraction),
                Err(ExtractionError::Validation(reason)) if attempt < self.config.validation_attempts => {
                    debug!(attempt, %reason, "model output failed validation, asking again");
                    request.rejected.push(RejectedAttempt {
                        output: value,
                        feedback: validation_feedback(&reason),
                    });
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

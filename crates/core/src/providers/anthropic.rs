use crate::extractor::{ContentBlock, ExtractionConfig, StructuredRequest};
use crate::traits::ModelTransport;
use crate::ExtractionError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicTransport {
    endpoint: String,
    api_key: String,
    client: Client,
}

impl AnthropicTransport {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| ExtractionError::Unknown(format!("http client: {error}")))?;

        Ok(Self {
            endpoint: format!("{}/messages", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl ModelTransport for AnthropicTransport {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, request: &StructuredRequest) -> Result<Value, ExtractionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request_body(request))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|error| ExtractionError::Unknown(format!("unreadable response body: {error}")))?;
        debug!(stop_reason = ?parsed.stop_reason, blocks = parsed.content.len(), "anthropic response");

        tool_input(parsed, &request.tool.name)
    }
}

/// Messages API body that forces the model to answer through the schema tool.
/// Rejected attempts are replayed as `tool_use`/`tool_result` pairs after the
/// first user turn.
pub fn request_body(request: &StructuredRequest) -> Value {
    let content = request
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Image { media_type, data } => json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": data,
                },
            }),
            ContentBlock::Text { text } => json!({
                "type": "text",
                "text": text,
            }),
        })
        .collect::<Vec<_>>();

    let mut messages = vec![json!({ "role": "user", "content": content })];
    for (index, attempt) in request.rejected.iter().enumerate() {
        let id = format!("rejected_{}", index + 1);
        let input = if attempt.output.is_object() {
            attempt.output.clone()
        } else {
            json!({ "output": attempt.output })
        };
        messages.push(json!({
            "role": "assistant",
            "content": [{ "type": "tool_use", "id": id, "name": request.tool.name, "input": input }],
        }));
        messages.push(json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": id,
                "is_error": true,
                "content": attempt.feedback,
            }],
        }));
    }

    json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "system": request.system,
        "messages": messages,
        "tools": [{
            "name": request.tool.name,
            "description": request.tool.description,
            "input_schema": request.tool.input_schema,
        }],
        "tool_choice": { "type": "tool", "name": request.tool.name },
    })
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    ToolUse { name: String, input: Value },
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

fn tool_input(response: MessagesResponse, tool_name: &str) -> Result<Value, ExtractionError> {
    let mut text = Vec::new();
    for block in response.content {
        match block {
            ResponseBlock::ToolUse { name, input } if name == tool_name => return Ok(input),
            ResponseBlock::Text { text: part } => text.push(part),
            _ => {}
        }
    }

    let truncated = if response.stop_reason.as_deref() == Some("max_tokens") {
        " (response hit max_tokens)"
    } else {
        ""
    };
    Err(ExtractionError::Validation(format!(
        "model did not call {tool_name}{truncated}; text: {}",
        text.join(" ")
    )))
}

fn classify_transport_error(error: reqwest::Error) -> ExtractionError {
    if error.is_timeout() {
        ExtractionError::Timeout {
            provider: PROVIDER.to_string(),
        }
    } else {
        ExtractionError::Upstream {
            provider: PROVIDER.to_string(),
            status: error.status().map(|status| status.as_u16()),
            message: error.to_string(),
        }
    }
}

pub fn classify_status(status: StatusCode, body: &str) -> ExtractionError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|envelope| envelope.error);
    let message = detail
        .as_ref()
        .map(|detail| detail.message.clone())
        .unwrap_or_else(|| body.trim().to_string());
    let kind = detail.as_ref().map(|detail| detail.kind.as_str());

    if status == StatusCode::TOO_MANY_REQUESTS || kind == Some("rate_limit_error") {
        ExtractionError::RateLimited {
            provider: PROVIDER.to_string(),
            message,
        }
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        ExtractionError::Timeout {
            provider: PROVIDER.to_string(),
        }
    } else {
        ExtractionError::Upstream {
            provider: PROVIDER.to_string(),
            status: Some(status.as_u16()),
            message,
        }
    }
}

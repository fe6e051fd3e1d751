//! Vision-model boundary: prompt + page image → reply text.
//!
//! The annotator only depends on the narrow [`VisionModel`] trait, so tests
//! (and alternative backends) can stand in for the network. The production
//! implementation, [`AnthropicClient`], talks to the Anthropic Messages API
//! over reqwest.

use crate::config::PipelineConfig;
use crate::error::Pdf2HtmlError;
use crate::pipeline::encode::EncodedImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

const MESSAGES_PATH: &str = "/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Failure of a single vision-model call.
#[derive(Debug, Error)]
pub enum VisionError {
    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// 401/403: the credential was rejected.
    #[error("authentication failed (HTTP {status}): {body}")]
    Auth { status: u16, body: String },

    /// 429: too many requests.
    #[error("rate limited{}", .retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success status.
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// The body could not be decoded.
    #[error("malformed API response: {0}")]
    Malformed(String),

    /// The reply held no text segment.
    #[error("reply contained no text segment")]
    EmptyReply,
}

impl VisionError {
    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            VisionError::Transport(_) | VisionError::RateLimited { .. } => true,
            VisionError::Api { status, .. } => *status >= 500,
            VisionError::Auth { .. } | VisionError::Malformed(_) | VisionError::EmptyReply => false,
        }
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            VisionError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for VisionError {
    fn from(e: reqwest::Error) -> Self {
        VisionError::Transport(e.to_string())
    }
}

/// A multimodal completion capability.
pub trait VisionModel: Send + Sync {
    /// Send `prompt` and one image; return the first text segment of the reply.
    fn describe(
        &self,
        prompt: &str,
        image: &EncodedImage,
    ) -> impl Future<Output = Result<String, VisionError>> + Send;

    /// Model identifier recorded alongside each reply.
    fn model_name(&self) -> &str;
}

/// Anthropic Messages API client.
#[derive(Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    endpoint: String,
}

impl fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl AnthropicClient {
    /// Build a client from the pipeline configuration.
    ///
    /// # Errors
    /// [`Pdf2HtmlError::MissingCredential`] when no non-blank API key is
    /// configured. No network activity happens here.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, Pdf2HtmlError> {
        let api_key = config.require_api_key()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| Pdf2HtmlError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            endpoint: format!(
                "{}{}",
                config.api_base_url.trim_end_matches('/'),
                MESSAGES_PATH
            ),
        })
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body<'a>(&'a self, prompt: &'a str, image: &'a EncodedImage) -> RequestBody<'a> {
        RequestBody {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![ApiMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: image.media_type,
                            data: &image.data,
                        },
                    },
                ],
            }],
        }
    }
}

impl VisionModel for AnthropicClient {
    async fn describe(&self, prompt: &str, image: &EncodedImage) -> Result<String, VisionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&self.request_body(prompt, image))
            .send()
            .await?;

        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let text = response.text().await?;

        if !status.is_success() {
            error!("Anthropic API error {status}: {text}");
        }
        check_status(status.as_u16(), retry_after_secs, text).and_then(|body| parse_reply(&body))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Map an HTTP status onto [`VisionError`], passing successful bodies through.
fn check_status(
    status: u16,
    retry_after_secs: Option<u64>,
    body: String,
) -> Result<String, VisionError> {
    match status {
        200..=299 => Ok(body),
        401 | 403 => Err(VisionError::Auth { status, body }),
        429 => Err(VisionError::RateLimited { retry_after_secs }),
        _ => Err(VisionError::Api { status, body }),
    }
}

/// First text content block of a Messages API reply.
fn parse_reply(body: &str) -> Result<String, VisionError> {
    let reply: ApiResponse =
        serde_json::from_str(body).map_err(|e| VisionError::Malformed(e.to_string()))?;

    if let Some(usage) = &reply.usage {
        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Anthropic API usage"
        );
    }

    reply
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .ok_or(VisionError::EmptyReply)
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentPart<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

//! GeminiApiClient - Direct REST API implementation for Gemini.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::HeaderValue};
use serde::{Deserialize, Serialize};

use gemchat_core::config::ApiSettings;
use gemchat_core::conversation::GenerationConfig;
use gemchat_core::credentials::Credentials;
use gemchat_core::generation::{ChatTurn, GenerationBackend, PromptPart, RemoteCallError, TurnRole};
use gemchat_core::{GemchatError, Result};

/// Backend that talks to the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiApiClient {
    pub fn new(credentials: &Credentials, settings: &ApiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| GemchatError::internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
            model: credentials.model_name.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{model}:generateContent?key={api_key}",
            self.base_url,
            model = self.model,
            api_key = self.api_key
        )
    }

    async fn send_request(
        &self,
        body: &GenerateContentRequest,
    ) -> std::result::Result<String, RemoteCallError> {
        tracing::debug!(
            "[GeminiApiClient] POST {}:generateContent ({} content block(s))",
            self.model,
            body.contents.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .json(body)
            .send()
            .await
            .map_err(|err| {
                // reqwest errors can echo the URL, which carries the key.
                RemoteCallError::Transport(err.without_url().to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            let err = map_http_error(status, body_text, retry_after);
            tracing::warn!("[GeminiApiClient] Request failed: {}", err);
            return Err(err);
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|err| {
            RemoteCallError::Transport(format!(
                "Failed to parse Gemini response: {}",
                err.without_url()
            ))
        })?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl GenerationBackend for GeminiApiClient {
    async fn chat(
        &self,
        turns: &[ChatTurn],
        config: &GenerationConfig,
    ) -> std::result::Result<String, RemoteCallError> {
        let request = GenerateContentRequest::chat(turns, config)?;
        self.send_request(&request).await
    }

    async fn generate(
        &self,
        parts: &[PromptPart],
        config: &GenerationConfig,
    ) -> std::result::Result<String, RemoteCallError> {
        let request = GenerateContentRequest::single_turn(parts, config)?;
        self.send_request(&request).await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfigPayload,
}

impl GenerateContentRequest {
    fn chat(
        turns: &[ChatTurn],
        config: &GenerationConfig,
    ) -> std::result::Result<Self, RemoteCallError> {
        let contents: Vec<Content> = turns
            .iter()
            .filter(|turn| !turn.text.is_empty())
            .map(|turn| Content {
                role: Some(role_name(turn.role).to_string()),
                parts: vec![Part::Text {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        if contents.is_empty() {
            return Err(RemoteCallError::InvalidRequest(
                "chat request has no non-empty turns".into(),
            ));
        }

        Ok(Self {
            contents,
            generation_config: config.into(),
        })
    }

    fn single_turn(
        parts: &[PromptPart],
        config: &GenerationConfig,
    ) -> std::result::Result<Self, RemoteCallError> {
        let parts: Vec<Part> = parts
            .iter()
            .filter_map(|part| match part {
                PromptPart::Text(text) if text.is_empty() => None,
                PromptPart::Text(text) => Some(Part::Text { text: text.clone() }),
                PromptPart::Image(image) => Some(Part::InlineData {
                    inline_data: InlineDataPayload {
                        mime_type: image.mime_type.clone(),
                        data: image.data.clone(),
                    },
                }),
            })
            .collect();

        if parts.is_empty() {
            return Err(RemoteCallError::InvalidRequest(
                "prompt must include text or an image".into(),
            ));
        }

        Ok(Self {
            contents: vec![Content { role: None, parts }],
            generation_config: config.into(),
        })
    }
}

fn role_name(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Model => "model",
    }
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataPayload,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPayload {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfigPayload {
    candidate_count: u32,
    stop_sequences: Vec<String>,
    max_output_tokens: u32,
    temperature: f32,
}

impl From<&GenerationConfig> for GenerationConfigPayload {
    fn from(config: &GenerationConfig) -> Self {
        let wire = config.for_request();
        Self {
            candidate_count: wire.candidate_count,
            stop_sequences: wire.stop_sequences,
            max_output_tokens: wire.max_output_tokens,
            temperature: wire.temperature,
        }
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Concatenates the text parts of the first candidate.
fn extract_text_response(
    response: GenerateContentResponse,
) -> std::result::Result<String, RemoteCallError> {
    let text: String = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(RemoteCallError::EmptyResponse);
    }
    Ok(text)
}

fn map_http_error(
    status: StatusCode,
    body: String,
    retry_after: Option<Duration>,
) -> RemoteCallError {
    let message = serde_json::from_str::<ErrorWrapper>(&body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.clone());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.clone());

    RemoteCallError::Http {
        status: status.as_u16(),
        message,
        retry_after_secs: retry_after.map(|d| d.as_secs()),
    }
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    // HTTP-date values are ignored.
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

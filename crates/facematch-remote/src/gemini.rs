use crate::wire::{
    strip_code_fence, Blob, Content, GenerateRequest, GenerateResponse, GenerationConfig, Part,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use facematch_core::provider::{FaceJudge, JudgeError};
use facematch_core::{ImageInput, Judgment};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const PROMPT: &str = "Analyze the two images provided. Determine if they show the same person. \
Provide a detailed analysis including a similarity score from 0 to 100 and a brief reasoning \
for your conclusion. Respond only with the JSON object.";

/// Longest error body kept in a [`JudgeError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    /// Scheme and host, without a trailing slash.
    pub endpoint: String,
    pub connect_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

/// Remote provider backed by the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiJudge {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiJudge {
    pub fn new(config: GeminiConfig) -> Result<Self, JudgeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| JudgeError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn request(first: &ImageInput, second: &ImageInput) -> GenerateRequest {
        let inline = |image: &ImageInput| Part::InlineData {
            inline_data: Blob {
                mime_type: image.mime_type.to_string(),
                data: STANDARD.encode(&image.bytes),
            },
        };
        GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: PROMPT.to_string(),
                    },
                    inline(first),
                    inline(second),
                ],
            }],
            generation_config: GenerationConfig::comparison(),
        }
    }
}

/// Turn a decoded `generateContent` response into a judgment.
pub fn parse_judgment(response: &GenerateResponse) -> Result<Judgment, JudgeError> {
    let Some(text) = response.text() else {
        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(JudgeError::Parse(format!("prompt blocked: {reason}")));
        }
        return Err(JudgeError::EmptyResponse);
    };
    serde_json::from_str(strip_code_fence(&text)).map_err(|e| JudgeError::Parse(e.to_string()))
}

#[async_trait]
impl FaceJudge for GeminiJudge {
    async fn judge(&self, first: &ImageInput, second: &ImageInput) -> Result<Judgment, JudgeError> {
        let body = Self::request(first, second);
        tracing::debug!(model = %self.config.model, "sending comparison request");

        let response = self
            .client
            .post(self.config.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| JudgeError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(
                body.char_indices()
                    .nth(MAX_ERROR_BODY)
                    .map_or(body.len(), |(i, _)| i),
            );
            return Err(JudgeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: GenerateResponse = response
            .json()
            .await
            .map_err(|e| JudgeError::Parse(e.to_string()))?;
        let judgment = parse_judgment(&decoded)?;
        tracing::debug!(
            matched = judgment.is_match,
            similarity = judgment.similarity_percentage,
            "comparison judged"
        );
        Ok(judgment)
    }
}

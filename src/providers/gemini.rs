use serde::{Deserialize, Serialize};
use log::{debug, trace, error};

use crate::providers::{endpoint, spawn_relay, upstream_error};

// ===== Message Types =====

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>
  , #[serde(default)]
    pub parts: Vec<Part>
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest
{   pub contents: Vec<Content>
}

impl GenerateContentRequest
{   /// Single user turn carrying the whole prompt
    pub fn from_prompt(prompt: String) -> Self
    {   GenerateContentRequest
        {   contents: vec![
              Content
              {   role: Some("user".to_string())
                , parts: vec![Part { text: Some(prompt) }]
              }
            ]
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse
{   #[serde(default)]
    pub candidates: Vec<Candidate>
  , #[serde(default)]
    pub error: Option<ApiErrorBody>
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate
{   #[serde(default)]
    pub content: Option<Content>
  , #[serde(default, rename = "finishReason")]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody
{   #[serde(default)]
    pub code: Option<u16>
  , #[serde(default)]
    pub message: String
  , #[serde(default)]
    pub status: Option<String>
}

impl GenerateContentResponse
{   /// Text of the first candidate, empty when the chunk carries none
    pub fn text(&self) -> String
    {   self.candidates
          .first()
          .and_then(|c| c.content.as_ref())
          .map(|content| {
            content.parts
              .iter()
              .filter_map(|p| p.text.as_deref())
              .collect::<String>()
          })
          .unwrap_or_default()
    }
}

/// Decode one SSE payload into the text it carries
pub fn decode_chunk(payload: &str)
  -> Result<String, crate::error::Error>
{   let chunk: GenerateContentResponse
      = serde_json::from_str(payload).map_err(|e| {
        error!("Parse error: {}", e);
        crate::error::Error::ParseError(e.to_string())
      })?;

    if let Some(err) = &chunk.error
    {   error!("Gemini stream error: {}", err.message);
        return Err(crate::error::Error::ApiError(err.message.clone()));
    }

    if let Some(reason) = chunk.candidates
      .first()
      .and_then(|c| c.finish_reason.as_deref())
    {   trace!("Candidate finished: {}", reason);
    }
    Ok(chunk.text())
}

// ===== Gemini Client =====

/// Streaming client for the Generative Language API.
/// Built once at startup and shared read-only between requests.
#[derive(Debug, Clone)]
pub struct GeminiClient
{   api_key: String
  , api_base: String
  , http_client: reqwest::Client
}

impl GeminiClient
{   pub fn new(api_key: String, api_base: String) -> Self
    {   debug!("Creating GeminiClient for {}", api_base);
        GeminiClient
        {   api_key
          , api_base: api_base.trim_end_matches('/').to_string()
          , http_client: reqwest::Client::new()
        }
    }

    pub fn from_config(config: &crate::config::ProxyConfig) -> Self
    {   Self::new(config.api_key.clone(), config.api_base.clone())
    }

    /// Streaming endpoint for a model; accepts `gemini-pro` or `models/gemini-pro`.
    /// The model lands in a single percent-encoded path segment.
    pub fn stream_url(&self, model: &str)
      -> Result<reqwest::Url, crate::error::Error>
    {   let model = model.strip_prefix("models/").unwrap_or(model);
        let method = format!("{}:streamGenerateContent", model);
        let mut url = endpoint(
          &self.api_base,
          &["models", method.as_str()]
        )?;
        url.query_pairs_mut().append_pair("alt", "sse");
        Ok(url)
    }

    async fn open_stream(
      &self
    , prompt: String
    , model: &str
    ) -> Result<reqwest::Response, crate::error::Error>
    {   let request = GenerateContentRequest::from_prompt(prompt);
        trace!("Gemini request: {:?}", request);

        let response = self.http_client
          .post(self.stream_url(model)?)
          .header("x-goog-api-key", self.api_key.as_str())
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            crate::error::Error::HttpError(e.to_string())
          })?;

        let status = response.status();
        trace!("Gemini response status: {}", status);

        if !status.is_success()
        {   return Err(upstream_error("Gemini", response).await);
        }

        Ok(response)
    }

    /// Start streaming a completion; chunks arrive on the returned receiver
    /// in upstream order.
    pub fn stream_prompt(
      &self
    , prompt: String
    , model: String
    ) -> crate::ChunkReceiver
    {   let client = self.clone();
        let target = model.clone();
        spawn_relay(
          "Gemini",
          model,
          async move { client.open_stream(prompt, &target).await },
          decode_event
        )
    }
}

/// Every Gemini event carries a chunk, possibly empty
fn decode_event(payload: &str)
  -> Result<Option<String>, crate::error::Error>
{   decode_chunk(payload).map(Some)
}

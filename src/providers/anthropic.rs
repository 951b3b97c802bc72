use serde::{Deserialize, Serialize};
use log::{debug, trace, error};

use crate::providers::{endpoint, spawn_relay, upstream_error};

/// API version header sent with every request
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Completion cap sent with every request
pub const MAX_TOKENS: u32 = 500;
/// Model used when the caller asks for plain `claude`
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-opus-20240229";

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message
{   pub role: String
  , pub content: String
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest
{   pub model: String
  , pub max_tokens: u32
  , pub stream: bool
  , pub messages: Vec<Message>
}

impl MessagesRequest
{   /// Single user turn carrying the whole prompt
    pub fn from_prompt(prompt: String, model: String) -> Self
    {   MessagesRequest
        {   model
          , max_tokens: MAX_TOKENS
          , stream: true
          , messages: vec![
              Message { role: "user".to_string(), content: prompt }
            ]
        }
    }
}

/// One streamed event; only the fields read here are kept
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEvent
{   #[serde(rename = "type")]
    pub kind: String
  , #[serde(default)]
    pub delta: Option<Delta>
  , #[serde(default)]
    pub error: Option<EventError>
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta
{   #[serde(default, rename = "type")]
    pub kind: Option<String>
  , #[serde(default)]
    pub text: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventError
{   #[serde(default, rename = "type")]
    pub kind: Option<String>
  , #[serde(default)]
    pub message: String
}

/// Decode one SSE payload. Only `content_block_delta` events carry text;
/// bookkeeping events such as `message_start` or `ping` yield nothing.
pub fn decode_event(payload: &str)
  -> Result<Option<String>, crate::error::Error>
{   let event: StreamEvent
      = serde_json::from_str(payload).map_err(|e| {
        error!("Parse error: {}", e);
        crate::error::Error::ParseError(e.to_string())
      })?;

    match event.kind.as_str()
    {   "content_block_delta" => Ok(Some(
          event.delta.and_then(|d| d.text).unwrap_or_default()
        ))
      , "error" => {
          let message = event.error
            .map(|e| e.message)
            .unwrap_or_else(|| "Unknown error".to_string());
          error!("Anthropic stream error: {}", message);
          Err(crate::error::Error::ApiError(message))
        }
      , other => {
          trace!("Skipping {} event", other);
          Ok(None)
        }
    }
}

// ===== Anthropic Client =====

/// Streaming client for the Messages API.
/// Only built when a key is configured.
#[derive(Debug, Clone)]
pub struct AnthropicClient
{   api_key: String
  , api_base: String
  , http_client: reqwest::Client
}

impl AnthropicClient
{   pub fn new(api_key: String, api_base: String) -> Self
    {   debug!("Creating AnthropicClient for {}", api_base);
        AnthropicClient
        {   api_key
          , api_base: api_base.trim_end_matches('/').to_string()
          , http_client: reqwest::Client::new()
        }
    }

    /// `None` unless an Anthropic key is configured
    pub fn from_config(config: &crate::config::ProxyConfig) -> Option<Self>
    {   config.anthropic_api_key
          .clone()
          .map(|key| Self::new(key, config.anthropic_api_base.clone()))
    }

    pub fn messages_url(&self)
      -> Result<reqwest::Url, crate::error::Error>
    {   endpoint(&self.api_base, &["messages"])
    }

    /// `claude` alone means the default Claude model
    pub fn resolve_model(model: &str) -> &str
    {   if model == "claude" { DEFAULT_CLAUDE_MODEL } else { model }
    }

    async fn open_stream(
      &self
    , prompt: String
    , model: String
    ) -> Result<reqwest::Response, crate::error::Error>
    {   let request = MessagesRequest::from_prompt(prompt, model);
        trace!("Anthropic request: {:?}", request);

        let response = self.http_client
          .post(self.messages_url()?)
          .header("x-api-key", self.api_key.as_str())
          .header("anthropic-version", ANTHROPIC_VERSION)
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            crate::error::Error::HttpError(e.to_string())
          })?;

        let status = response.status();
        trace!("Anthropic response status: {}", status);

        if !status.is_success()
        {   return Err(upstream_error("Anthropic", response).await);
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
        let target = Self::resolve_model(&model).to_string();
        spawn_relay(
          "Anthropic",
          model,
          async move { client.open_stream(prompt, target).await },
          decode_event
        )
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn text_deltas_become_chunks()
    {   let text = decode_event(r#"{
          "type": "content_block_delta",
          "index": 0,
          "delta": {"type": "text_delta", "text": "Hello"}
        }"#).unwrap();
        assert_eq!(text.as_deref(), Some("Hello"));
    }

    #[test]
    fn bookkeeping_events_are_skipped()
    {   for payload in [
          r#"{"type":"message_start","message":{"id":"msg_1"}}"#
        , r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#
        , r#"{"type":"ping"}"#
        , r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#
        , r#"{"type":"message_stop"}"#
        ]
        {   assert_eq!(decode_event(payload).unwrap(), None, "{}", payload);
        }
    }

    #[test]
    fn error_event_becomes_api_error()
    {   let err = decode_event(
          r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#
        ).unwrap_err();
        assert_eq!(
          err,
          crate::error::Error::ApiError("Overloaded".to_string())
        );
    }

    #[test]
    fn request_body_shape()
    {   let body = serde_json::to_value(MessagesRequest::from_prompt(
          "P\nX".to_string(),
          DEFAULT_CLAUDE_MODEL.to_string()
        )).unwrap();
        assert_eq!(
          body,
          serde_json::json!({
            "model": "claude-3-opus-20240229",
            "max_tokens": 500,
            "stream": true,
            "messages": [{"role": "user", "content": "P\nX"}]
          })
        );
    }

    #[test]
    fn plain_claude_resolves_to_default_model()
    {   assert_eq!(
          AnthropicClient::resolve_model("claude"),
          DEFAULT_CLAUDE_MODEL
        );
        assert_eq!(
          AnthropicClient::resolve_model("claude-3-haiku-20240307"),
          "claude-3-haiku-20240307"
        );
    }

    #[test]
    fn messages_url_appends_segment()
    {   let client = AnthropicClient::new(
          "key".to_string(),
          "http://localhost:1/v1/".to_string()
        );
        assert_eq!(
          client.messages_url().unwrap().as_str(),
          "http://localhost:1/v1/messages"
        );
    }
}

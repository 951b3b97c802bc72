//! Upstream generative-language providers

pub mod anthropic;
pub mod gemini;
pub mod sse;

use std::future::Future;

use futures::StreamExt;
use log::{debug, error, info};
use tokio::sync::mpsc;

use self::sse::SseParser;

// Re-export for convenience
pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;

/// Chunks buffered between the upstream reader and the response body.
/// When full, the reader stops polling upstream until the caller catches up.
pub const CHUNK_CHANNEL_CAPACITY: usize = 16;

/// Turns one SSE payload into chunk text; `Ok(None)` for events carrying none
pub type DecodeFn
  = fn(&str) -> Result<Option<String>, crate::error::Error>;

/// Upstream family that serves a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider
{   Google
  , Anthropic
}

impl Provider
{   /// `claude*` models go to Anthropic, everything else to Gemini
    pub fn for_model(model: &str) -> Self
    {   if model.starts_with("claude")
        {   Provider::Anthropic
        } else
        {   Provider::Google
        }
    }
}

/// Append path segments to a base URL, percent-encoding each one
pub(crate) fn endpoint(base: &str, segments: &[&str])
  -> Result<reqwest::Url, crate::error::Error>
{   let mut url = reqwest::Url::parse(base).map_err(|e| {
      crate::error::Error::InvalidConfiguration(
        format!("{}: {}", base, e)
      )
    })?;
    url.path_segments_mut()
      .map_err(|_| {
        crate::error::Error::InvalidConfiguration(
          format!("{}: not a base URL", base)
        )
      })?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
}

/// Error for a non-2xx upstream reply, preferring the body's `error.message`
pub(crate) async fn upstream_error(
  name: &str
, response: reqwest::Response
) -> crate::error::Error
{   let status = response.status();
    let error_text = response.text().await
      .unwrap_or_else(|_|
        "Unknown error".to_string()
      );
    let message = serde_json::from_str::<serde_json::Value>(&error_text)
      .ok()
      .and_then(|body| {
        body["error"]["message"].as_str().map(str::to_string)
      })
      .unwrap_or(error_text);
    error!("{} API error ({}): {}", name, status, message);
    crate::error::Error::ApiError(format!("{}: {}", status, message))
}

/// Spawn a reader that opens an upstream stream and relays its chunks in
/// order. The receiver closes when upstream finishes, after delivering at
/// most one error.
pub(crate) fn spawn_relay<F>(
  name: &'static str
, model: String
, open: F
, decode: DecodeFn
) -> crate::ChunkReceiver
where F: Future<Output = Result<reqwest::Response, crate::error::Error>>
    + Send + 'static
{   debug!("{} reader spawning for model: {}", name, model);
    let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

    tokio::spawn(async move {
      let opened = tokio::select!
      { opened = open => opened
      , _ = tx.closed() => {
          debug!("Receiver dropped while connecting to {}", name);
          return;
        }
      };
      match opened
      {   Ok(response) => relay(name, &model, response, decode, tx).await
        , Err(e) => {
            let _ = tx.send(Err(e)).await;
          }
      }
    });

    rx
}

/// Reads one upstream stream to completion, or until the receiver goes away
async fn relay(
  name: &str
, model: &str
, response: reqwest::Response
, decode: DecodeFn
, tx: mpsc::Sender<crate::ChunkReply>
)
{   let mut parser = SseParser::new();
    let mut body = Box::pin(response.bytes_stream());
    let mut events = 0usize;

    loop
    {   // Stop waiting on upstream as soon as the caller disconnects.
        let piece = tokio::select!
        { piece = body.next() => piece
        , _ = tx.closed() => {
            debug!("Receiver dropped while awaiting {}", name);
            return;
          }
        };
        let Some(piece) = piece else { break };

        let bytes = match piece
        {   Ok(bytes) => bytes
          , Err(e) => {
              error!("{} stream read failed: {}", name, e);
              let _ = tx.send(Err(e.into())).await;
              return;
            }
        };

        for payload in parser.feed_bytes(&bytes)
        {   if !forward(&tx, &payload, decode).await
            {   return;
            }
            events += 1;
        }
    }

    if let Some(payload) = parser.finish()
    {   if !forward(&tx, &payload, decode).await
        {   return;
        }
        events += 1;
    }

    info!("{} stream for {} finished after {} events", name, model, events);
}

/// Returns false once nothing more should be sent
async fn forward(
  tx: &mpsc::Sender<crate::ChunkReply>
, payload: &str
, decode: DecodeFn
) -> bool
{   let reply = match decode(payload)
    {   Ok(Some(text)) => Ok(text)
      , Ok(None) => return true
      , Err(e) => Err(e)
    };
    let keep_going = reply.is_ok();
    if tx.send(reply).await.is_err()
    {   debug!("Receiver dropped, abandoning upstream stream");
        return false;
    }
    keep_going
}

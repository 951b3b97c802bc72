//! HTTP surface: `POST /summarize` and a JSON 404 for everything else

use std::convert::Infallible;
use std::sync::Arc;

use async_stream::stream;
use axum::{
  body::Body,
  extract::{DefaultBodyLimit, State},
  http::{header, HeaderMap, StatusCode, Uri},
  response::{IntoResponse, Response},
  routing::post,
  Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use log::{debug, trace, error, info};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::config::{Framing, ProxyConfig, ANTHROPIC_KEY_VAR};
use crate::error::Error;
use crate::providers::{AnthropicClient, GeminiClient, Provider};
use crate::request::{ErrorBody, SummarizeRequest, TextChunk};

/// Process-wide state, built once and only ever read
#[derive(Debug, Clone)]
pub struct AppState
{   pub gemini: GeminiClient
  , pub anthropic: Option<AnthropicClient>
  , pub framing: Framing
}

impl AppState
{   pub fn new(config: &ProxyConfig) -> Self
    {   AppState
        {   gemini: GeminiClient::from_config(config)
          , anthropic: AnthropicClient::from_config(config)
          , framing: config.framing
        }
    }

    /// Hand the prompt to whichever provider serves `model`
    pub fn stream_prompt(&self, prompt: String, model: String)
      -> Result<crate::ChunkReceiver, Error>
    {   match Provider::for_model(&model)
        {   Provider::Google => Ok(self.gemini.stream_prompt(prompt, model))
          , Provider::Anthropic => match &self.anthropic
            {   Some(client) => Ok(client.stream_prompt(prompt, model))
              , None => {
                  error!("No Anthropic key configured for {}", model);
                  Err(Error::MissingApiKey(ANTHROPIC_KEY_VAR.to_string()))
                }
            }
        }
    }
}

impl IntoResponse for Error
{   fn into_response(self) -> Response
    {   (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(ErrorBody::from(&self)),
        ).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router
{   Router::new()
      .route("/summarize", post(summarize).fallback(not_found))
      .fallback(not_found)
      // Bodies of any size are accepted; only JSON parsing can fail.
      .layer(DefaultBodyLimit::disable())
      .with_state(state)
}

/// Bind to the configured address and serve until ctrl-c
pub async fn serve(config: &ProxyConfig) -> Result<(), Error>
{   let listener = TcpListener::bind(config.bind_addr)
      .await
      .map_err(|e| {
        error!("Failed to bind {}: {}", config.bind_addr, e);
        Error::Other(format!("bind {}: {}", config.bind_addr, e))
      })?;
    info!("Server running on {}", config.bind_addr);

    let app = router(Arc::new(AppState::new(config)));
    axum::serve(listener, app)
      .with_graceful_shutdown(shutdown_signal())
      .await
      .map_err(|e| {
        error!("Server error: {}", e);
        Error::Other(e.to_string())
      })
}

async fn shutdown_signal()
{   if let Err(e) = tokio::signal::ctrl_c().await
    {   error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn not_found() -> (StatusCode, Json<ErrorBody>)
{   (StatusCode::NOT_FOUND, Json(ErrorBody::not_found()))
}

async fn summarize(
  State(state): State<Arc<AppState>>
, uri: Uri
, headers: HeaderMap
, body: Bytes
) -> Result<Response, Error>
{   // Only the bare path matches, so `/summarize?x=1` is not found.
    if uri.query().is_some()
    {   debug!("Query string on {}, answering 404", uri);
        return Ok(not_found().await.into_response());
    }

    let request = SummarizeRequest::from_slice(&body).map_err(|e| {
      error!("Rejecting request: {}", e);
      e
    })?;
    let prompt = request.effective_prompt();
    let model = request.effective_model();
    let framing = negotiate_framing(&headers, state.framing);
    info!(
      "Summarize request: model={} prompt_chars={} framing={:?}",
      model, prompt.chars().count(), framing
    );

    let mut rx = state.stream_prompt(prompt, model)?;

    // Status is committed only once the first upstream item is known.
    let first = match rx.recv().await
    {   Some(Ok(text)) => Some(text)
      , Some(Err(e)) => {
          error!("Upstream failed before first chunk: {}", e);
          return Err(e);
        }
      , None => {
          debug!("Upstream finished without chunks");
          None
        }
    };

    let body = stream! {
      if let Some(text) = first
      {   yield frame(&TextChunk { text }, framing);
          while let Some(reply) = rx.recv().await
          {   match reply
              {   Ok(text) => {
                    trace!("Relaying chunk of {} bytes", text.len());
                    yield frame(&TextChunk { text }, framing);
                  }
                , Err(e) => {
                    error!("Upstream failed mid-stream: {}", e);
                    yield frame(&ErrorBody::from(&e), framing);
                    break;
                  }
              }
          }
      }
    };

    Ok((
      [(header::CONTENT_TYPE, framing.content_type())],
      Body::from_stream(body.map(Ok::<_, Infallible>)),
    ).into_response())
}

/// Callers asking for NDJSON get it regardless of the server default
fn negotiate_framing(headers: &HeaderMap, default: Framing) -> Framing
{   let wants_ndjson = headers
      .get_all(header::ACCEPT)
      .iter()
      .filter_map(|v| v.to_str().ok())
      .any(|v| v.contains(Framing::NdJson.content_type()));
    if wants_ndjson { Framing::NdJson } else { default }
}

fn frame<T: Serialize>(value: &T, framing: Framing) -> Bytes
{   let mut out = serde_json::to_vec(value).unwrap_or_else(|e| {
      error!("Failed to encode frame: {}", e);
      Vec::new()
    });
    out.extend_from_slice(framing.delimiter().as_bytes());
    Bytes::from(out)
}

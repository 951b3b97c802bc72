//! Wire types for the summarize endpoint

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Instruction used when the caller does not supply one
pub const DEFAULT_PROMPT: &str = "Summarize the following text concisely:";
/// Model used when the caller does not supply one
pub const DEFAULT_MODEL: &str = "gemini-pro";

/// Incoming summarize request; unknown fields are ignored.
/// Fields stay loosely typed: any JSON value is accepted and rendered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummarizeRequest
{   /// Text to summarize; `Some(Null)` is kept apart from a missing field
    #[serde(default, deserialize_with = "present")]
    pub user_prompt: Option<Value>
  , /// Instruction prefix
    #[serde(default)]
    pub prompt: Option<Value>
  , /// Upstream model identifier
    #[serde(default)]
    pub model: Option<Value>
}

// Only runs when the field is present, so an explicit null stays Some.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where D: Deserializer<'de>
{   Value::deserialize(deserializer).map(Some)
}

/// Drops falsy values: missing, null, false, 0 and ""
fn truthy(value: Option<&Value>) -> Option<&Value>
{   value.filter(|v| match v
    {   Value::Null => false
      , Value::Bool(b) => *b
      , Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0)
      , Value::String(s) => !s.is_empty()
      , Value::Array(_) | Value::Object(_) => true
    })
}

/// Renders a value the way string interpolation of a parsed JSON value does
pub fn render(value: &Value) -> String
{   match value
    {   Value::Null => "null".to_string()
      , Value::Bool(b) => b.to_string()
      // `1.0` reads back as `1`, as an interpolated number would
      , Value::Number(n) => match n.as_f64()
        {   Some(f) if n.is_f64() => f.to_string()
          , _ => n.to_string()
        }
      , Value::String(s) => s.clone()
      , Value::Array(items) => items
          .iter()
          .map(|item| match item
          {   Value::Null => String::new()
            , other => render(other)
          })
          .collect::<Vec<_>>()
          .join(",")
      , Value::Object(_) => "[object Object]".to_string()
    }
}

impl SummarizeRequest
{   /// Decode a raw request body
    pub fn from_slice(body: &[u8])
      -> Result<Self, crate::error::Error>
    {   serde_json::from_slice(body).map_err(|e| {
          crate::error::Error::InvalidRequest(e.to_string())
        })
    }

    /// Instruction, newline, then the user text
    pub fn effective_prompt(&self) -> String
    {   let instruction = truthy(self.prompt.as_ref())
          .map(render)
          .unwrap_or_else(|| DEFAULT_PROMPT.to_string());
        format!("{}\n{}", instruction, self.user_text())
    }

    pub fn effective_model(&self) -> String
    {   truthy(self.model.as_ref())
          .map(render)
          .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    fn user_text(&self) -> String
    {   match &self.user_prompt
        {   None => "undefined".to_string()
          , Some(value) => render(value)
        }
    }
}

/// One streamed fragment of generated text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk
{   pub text: String
}

/// Error body returned for failed or unmatched requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody
{   pub error: String
}

impl ErrorBody
{   pub fn not_found() -> Self
    {   ErrorBody
        {   error: "Not Found".to_string()
        }
    }
}

impl From<&crate::error::Error> for ErrorBody
{   fn from(e: &crate::error::Error) -> Self
    {   ErrorBody
        {   error: e.to_string()
        }
    }
}

//! Configuration for the proxy and its upstream provider

use std::net::SocketAddr;
use serde::{Deserialize, Serialize};
use log::debug;

/// Environment variable holding the upstream API key
pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";
/// Environment variable overriding the bind address
pub const BIND_ADDR_VAR: &str = "SUMMARIZE_PROXY_ADDR";
/// Environment variable overriding the upstream base URL
pub const API_BASE_VAR: &str = "GEMINI_API_BASE";
/// Environment variable selecting the default response framing
pub const FRAMING_VAR: &str = "SUMMARIZE_PROXY_FRAMING";
/// Optional key enabling `claude*` models
pub const ANTHROPIC_KEY_VAR: &str = "CLAUDE_API_KEY";
pub const ANTHROPIC_API_BASE_VAR: &str = "ANTHROPIC_API_BASE";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_API_BASE: &str
  = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";

/// How consecutive chunk objects are delimited in a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing
{   /// `{"text":"a"}{"text":"b"}` with no separator
    Concatenated
  , /// One object per line
    NdJson
}

impl Framing
{   pub fn content_type(&self) -> &'static str
    {   match self
        {   Framing::Concatenated => "application/json"
          , Framing::NdJson => "application/x-ndjson"
        }
    }

    /// Bytes written after each object
    pub fn delimiter(&self) -> &'static str
    {   match self
        {   Framing::Concatenated => ""
          , Framing::NdJson => "\n"
        }
    }
}

impl Default for Framing
{   fn default() -> Self
    {   Framing::Concatenated
    }
}

impl std::str::FromStr for Framing
{   type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {   match s.trim().to_ascii_lowercase().as_str()
        {   "concatenated" | "json" => Ok(Framing::Concatenated)
          , "ndjson" | "jsonl" => Ok(Framing::NdJson)
          , other => Err(crate::error::Error::InvalidConfiguration(
              format!("unknown framing: {}", other)
            ))
        }
    }
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig
{   /// Upstream API key
    pub api_key: String
  , /// Upstream API base URL
    pub api_base: String
  , /// Address the HTTP server binds to
    pub bind_addr: SocketAddr
  , /// Framing used unless the caller asks for NDJSON
    pub framing: Framing
  , /// Anthropic key; `claude*` models are refused without it
    #[serde(default)]
    pub anthropic_api_key: Option<String>
  , pub anthropic_api_base: String
}

impl ProxyConfig
{   /// Create a configuration with defaults for everything but the key
    pub fn new(api_key: String) -> Self
    {   ProxyConfig
        {   api_key
          , api_base: DEFAULT_API_BASE.to_string()
          , bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000))
          , framing: Framing::default()
          , anthropic_api_key: None
          , anthropic_api_base: DEFAULT_ANTHROPIC_API_BASE.to_string()
        }
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, crate::error::Error>
    {   Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F)
      -> Result<Self, crate::error::Error>
    where F: Fn(&str) -> Option<String>
    {   let api_key = lookup(API_KEY_VAR)
          .filter(|k| !k.trim().is_empty())
          .ok_or_else(|| {
            crate::error::Error::MissingApiKey(API_KEY_VAR.to_string())
          })?;

        let mut config = ProxyConfig::new(api_key);

        if let Some(addr) = lookup(BIND_ADDR_VAR)
        {   config.bind_addr = addr.parse().map_err(|e| {
              crate::error::Error::InvalidConfiguration(
                format!("{}={}: {}", BIND_ADDR_VAR, addr, e)
              )
            })?;
        }

        if let Some(base) = lookup(API_BASE_VAR)
        {   config.api_base = base.trim_end_matches('/').to_string();
        }

        if let Some(framing) = lookup(FRAMING_VAR)
        {   config.framing = framing.parse()?;
        }

        config.anthropic_api_key = lookup(ANTHROPIC_KEY_VAR)
          .filter(|k| !k.trim().is_empty());
        if let Some(base) = lookup(ANTHROPIC_API_BASE_VAR)
        {   config.anthropic_api_base = base.trim_end_matches('/').to_string();
        }

        debug!(
          "Loaded config: bind={} api_base={} framing={:?} anthropic={}",
          config.bind_addr, config.api_base, config.framing,
          config.anthropic_api_key.is_some()
        );
        Ok(config)
    }
}

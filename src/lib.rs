pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod server;

/*

summarize-proxy: one POST route that turns a summarize request into a
streaming Gemini (or, for `claude*` models, Anthropic) completion and
relays every chunk back as it arrives.

summarize-proxy/
├── Cargo.toml
├── src/
│   ├── lib.rs          # Re-exports and shared reply types
│   ├── main.rs         # Binary: env, logging, serve
│   ├── error.rs        # Error type
│   ├── config.rs       # ProxyConfig and response framing
│   ├── request.rs      # Request / chunk / error wire types
│   ├── server.rs       # Router and the /summarize handler
│   └── providers/
│       ├── mod.rs      # Provider choice, shared SSE relay
│       ├── gemini.rs   # streamGenerateContent client
│       ├── anthropic.rs # Messages API client
│       └── sse.rs      # Incremental SSE parser
└── tests/              # End-to-end tests against a mock upstream

*/

pub use config::{Framing, ProxyConfig};
pub use error::Error;
pub use providers::{AnthropicClient, GeminiClient, Provider};
pub use request::{ErrorBody, SummarizeRequest, TextChunk};
pub use server::{router, serve, AppState};

// ===== StreamPrompt =====

/// One upstream chunk, or the error that ended the stream
pub type ChunkReply = Result<String, crate::error::Error>;
pub type ChunkReceiver
  = tokio::sync::mpsc::Receiver<ChunkReply>;

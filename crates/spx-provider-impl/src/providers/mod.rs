//! Built-in upstream providers, one module per channel.

pub mod http_client;
pub mod oauth_common;

pub mod aistudio;
pub mod antigravity;
pub mod claude;
pub mod claudecode;
pub mod codex;
pub mod custom;
pub mod deepseek;
pub mod geminicli;
pub mod local_process;
pub mod local_server;
pub mod nvidia;
pub mod openai;
pub mod vertex;
pub mod vertexexpress;
pub mod ws_relay;

pub use aistudio::AIStudioProvider;
pub use antigravity::AntigravityProvider;
pub use claude::ClaudeProvider;
pub use claudecode::ClaudeCodeProvider;
pub use codex::CodexProvider;
pub use custom::CustomProvider;
pub use deepseek::DeepSeekProvider;
pub use geminicli::GeminiCliProvider;
pub use local_process::LocalProcessProvider;
pub use local_server::LocalServerProvider;
pub use nvidia::NvidiaProvider;
pub use openai::OpenAIProvider;
pub use vertex::VertexProvider;
pub use vertexexpress::VertexExpressProvider;
pub use ws_relay::{WsGatewayRegistry, WsJob, WsRelayProvider, gateway as ws_gateway};

//! Wire schema types for every inbound/outbound protocol switchproxy speaks:
//! Anthropic Messages (`claude`), OpenAI Chat Completions and Responses
//! (`openai`), and Google Gemini / Gemini-CLI (`gemini`). Codex traffic is
//! carried on the `openai::create_response` shapes — see the transform
//! crate for the proto tag.

pub mod claude;
pub mod gemini;
pub mod openai;
pub mod sse;

use std::sync::Arc;

use spx_provider_core::registry::ProviderRegistry;

use crate::providers::{
    AIStudioProvider, AntigravityProvider, ClaudeCodeProvider, ClaudeProvider, CodexProvider,
    CustomProvider, DeepSeekProvider, GeminiCliProvider, LocalProcessProvider, LocalServerProvider,
    NvidiaProvider, OpenAIProvider, VertexExpressProvider, VertexProvider, WsRelayProvider,
};

/// Registers every built-in provider implementation under its channel name.
pub fn register_builtin_providers(registry: &mut ProviderRegistry) {
    registry.register(Arc::new(OpenAIProvider::new()));
    registry.register(Arc::new(ClaudeProvider::new()));
    registry.register(Arc::new(AIStudioProvider::new()));
    registry.register(Arc::new(VertexExpressProvider::new()));
    registry.register(Arc::new(VertexProvider::new()));
    registry.register(Arc::new(GeminiCliProvider::new()));
    registry.register(Arc::new(ClaudeCodeProvider::new()));
    registry.register(Arc::new(CodexProvider::new()));
    registry.register(Arc::new(AntigravityProvider::new()));
    registry.register(Arc::new(NvidiaProvider::new()));
    registry.register(Arc::new(DeepSeekProvider::new()));
    registry.register(Arc::new(CustomProvider::new()));
    registry.register(Arc::new(LocalServerProvider::new()));
    registry.register(Arc::new(LocalProcessProvider::new()));
    registry.register(Arc::new(WsRelayProvider::new()));
}

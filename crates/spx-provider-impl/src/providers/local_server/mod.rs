//! OpenAI-compatible HTTP server bound to a local port (Ollama, opencode).
//! Forwards the same way as the `openai` provider, just against a
//! `localhost` base URL instead of a cloud endpoint, and tolerates servers
//! that don't require an API key.

use bytes::Bytes;

use spx_provider_core::credential::ApiKeyCredential;
use spx_provider_core::{
    Credential, DispatchRule, DispatchTable, HttpMethod, Proto, ProviderConfig, ProviderError,
    ProviderResult, UpstreamCtx, UpstreamHttpRequest, UpstreamProvider,
};

use crate::auth_extractor;

const PROVIDER_NAME: &str = "local_server";

const DISPATCH_TABLE: DispatchTable = DispatchTable::new([
    // Claude
    DispatchRule::Transform {
        target: Proto::OpenAIChat,
    },
    DispatchRule::Transform {
        target: Proto::OpenAIChat,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    // Gemini
    DispatchRule::Transform {
        target: Proto::OpenAIChat,
    },
    DispatchRule::Transform {
        target: Proto::OpenAIChat,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    // OpenAI chat completions
    DispatchRule::Native,
    DispatchRule::Native,
    // OpenAI Responses
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    // OpenAI basic ops
    DispatchRule::Native,
    DispatchRule::Native,
    DispatchRule::Native,
    // OAuth / usage
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
]);

#[derive(Debug, Default)]
pub struct LocalServerProvider;

impl LocalServerProvider {
    pub fn new() -> Self {
        Self
    }
}

fn base_url(config: &ProviderConfig) -> ProviderResult<String> {
    match config {
        ProviderConfig::LocalServer(cfg) => Ok(cfg
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", cfg.default_port))),
        _ => Err(ProviderError::InvalidConfig(
            "expected ProviderConfig::LocalServer".to_string(),
        )),
    }
}

fn optional_api_key(credential: &Credential) -> &str {
    match credential {
        Credential::Custom(ApiKeyCredential { api_key }) => api_key.as_str(),
        _ => "",
    }
}

#[async_trait::async_trait]
impl UpstreamProvider for LocalServerProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn dispatch_table(&self, _config: &ProviderConfig) -> DispatchTable {
        DISPATCH_TABLE
    }

    async fn build_openai_models_list(
        &self,
        _ctx: &UpstreamCtx,
        config: &ProviderConfig,
        credential: &Credential,
        _req: &spx_protocol::openai::list_models::request::ListModelsRequest,
    ) -> ProviderResult<UpstreamHttpRequest> {
        let base = base_url(config)?;
        let mut headers = Vec::new();
        let api_key = optional_api_key(credential);
        if !api_key.is_empty() {
            auth_extractor::set_bearer(&mut headers, api_key);
        }
        auth_extractor::set_accept_json(&mut headers);
        Ok(UpstreamHttpRequest {
            method: HttpMethod::Get,
            url: format!("{}/v1/models", base.trim_end_matches('/')),
            headers,
            body: None,
            is_stream: false,
        })
    }

    async fn build_openai_models_get(
        &self,
        _ctx: &UpstreamCtx,
        config: &ProviderConfig,
        credential: &Credential,
        req: &spx_protocol::openai::get_model::request::GetModelRequest,
    ) -> ProviderResult<UpstreamHttpRequest> {
        let base = base_url(config)?;
        let mut headers = Vec::new();
        let api_key = optional_api_key(credential);
        if !api_key.is_empty() {
            auth_extractor::set_bearer(&mut headers, api_key);
        }
        auth_extractor::set_accept_json(&mut headers);
        Ok(UpstreamHttpRequest {
            method: HttpMethod::Get,
            url: format!(
                "{}/v1/models/{}",
                base.trim_end_matches('/'),
                req.path.model
            ),
            headers,
            body: None,
            is_stream: false,
        })
    }

    async fn build_openai_input_tokens(
        &self,
        _ctx: &UpstreamCtx,
        config: &ProviderConfig,
        credential: &Credential,
        req: &spx_protocol::openai::count_tokens::request::InputTokenCountRequest,
    ) -> ProviderResult<UpstreamHttpRequest> {
        let base = base_url(config)?;
        let mut headers = Vec::new();
        let api_key = optional_api_key(credential);
        if !api_key.is_empty() {
            auth_extractor::set_bearer(&mut headers, api_key);
        }
        auth_extractor::set_accept_json(&mut headers);
        auth_extractor::set_content_type_json(&mut headers);
        let body =
            serde_json::to_vec(&req.body).map_err(|err| ProviderError::Other(err.to_string()))?;
        Ok(UpstreamHttpRequest {
            method: HttpMethod::Post,
            url: format!("{}/v1/responses/input_tokens", base.trim_end_matches('/')),
            headers,
            body: Some(Bytes::from(body)),
            is_stream: false,
        })
    }

    async fn build_openai_chat(
        &self,
        _ctx: &UpstreamCtx,
        config: &ProviderConfig,
        credential: &Credential,
        req: &spx_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest,
    ) -> ProviderResult<UpstreamHttpRequest> {
        let base = base_url(config)?;
        let mut headers = Vec::new();
        let api_key = optional_api_key(credential);
        if !api_key.is_empty() {
            auth_extractor::set_bearer(&mut headers, api_key);
        }
        auth_extractor::set_accept_json(&mut headers);
        auth_extractor::set_content_type_json(&mut headers);
        let is_stream = req.body.stream.unwrap_or(false);
        let body =
            serde_json::to_vec(&req.body).map_err(|err| ProviderError::Other(err.to_string()))?;
        Ok(UpstreamHttpRequest {
            method: HttpMethod::Post,
            url: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            headers,
            body: Some(Bytes::from(body)),
            is_stream,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spx_provider_core::config::LocalServerConfig;

    #[test]
    fn default_base_url_uses_configured_port() {
        let config = ProviderConfig::LocalServer(LocalServerConfig {
            base_url: None,
            default_port: 11434,
        });
        assert_eq!(base_url(&config).unwrap(), "http://127.0.0.1:11434");
    }

    #[test]
    fn explicit_base_url_overrides_default_port() {
        let config = ProviderConfig::LocalServer(LocalServerConfig {
            base_url: Some("http://localhost:9999".to_string()),
            default_port: 11434,
        });
        assert_eq!(base_url(&config).unwrap(), "http://localhost:9999");
    }
}

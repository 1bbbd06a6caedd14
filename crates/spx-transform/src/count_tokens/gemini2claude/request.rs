use spx_protocol::claude::count_tokens::request::{
    CountTokensHeaders, CountTokensRequest as ClaudeCountTokensRequest,
    CountTokensRequestBody as ClaudeCountTokensRequestBody,
};
use spx_protocol::claude::count_tokens::types::{
    BetaMessageContent, BetaMessageParam, BetaMessageRole, Model,
};
use spx_protocol::gemini::count_tokens::request::CountTokensRequest as GeminiCountTokensRequest;
use spx_protocol::gemini::count_tokens::types::{Content as GeminiContent, ContentRole};

/// Convert a Gemini count-tokens request into Claude's count-tokens request shape.
pub fn transform_request(request: GeminiCountTokensRequest) -> ClaudeCountTokensRequest {
    let messages = request
        .body
        .contents
        .unwrap_or_default()
        .into_iter()
        .map(content_to_message)
        .collect();

    ClaudeCountTokensRequest {
        headers: CountTokensHeaders::default(),
        body: ClaudeCountTokensRequestBody {
            messages,
            model: Model::Custom(request.path.model),
            system: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            output_config: None,
            output_format: None,
            context_management: None,
            mcp_servers: None,
        },
    }
}

fn content_to_message(content: GeminiContent) -> BetaMessageParam {
    let role = match content.role {
        Some(ContentRole::Model) => BetaMessageRole::Assistant,
        _ => BetaMessageRole::User,
    };
    let text = content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("\n");

    BetaMessageParam {
        role,
        content: BetaMessageContent::Text(text),
    }
}

use spx_protocol::claude::count_tokens::request::CountTokensRequest as ClaudeCountTokensRequest;
use spx_protocol::claude::count_tokens::types::{
    BetaContentBlockParam as ClaudeContentBlockParam, BetaMessageContent as ClaudeMessageContent,
    BetaMessageParam as ClaudeMessageParam, BetaSystemParam as ClaudeSystemParam,
};
use spx_protocol::gemini::count_tokens::request::{
    CountTokensPath as GeminiCountTokensPath, CountTokensRequest as GeminiCountTokensRequest,
    CountTokensRequestBody as GeminiCountTokensRequestBody,
};
use spx_protocol::gemini::count_tokens::types::{Content as GeminiContent, ContentRole, Part};

/// Convert a Claude count-tokens request into Gemini's count-tokens request shape.
pub fn transform_request(request: ClaudeCountTokensRequest) -> GeminiCountTokensRequest {
    let model = model_name(&request.body.model);
    let mut contents = Vec::new();

    if let Some(system) = request.body.system {
        if let Some(content) = system_to_content(system) {
            contents.push(content);
        }
    }

    for message in &request.body.messages {
        contents.push(message_to_content(message));
    }

    GeminiCountTokensRequest {
        path: GeminiCountTokensPath { model },
        body: GeminiCountTokensRequestBody {
            contents: Some(contents),
            generate_content_request: None,
        },
    }
}

fn model_name(model: &spx_protocol::claude::count_tokens::types::Model) -> String {
    use spx_protocol::claude::count_tokens::types::Model;
    match model {
        Model::Custom(value) => value.clone(),
        Model::Known(known) => serde_json::to_value(known)
            .ok()
            .and_then(|value| value.as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

fn system_to_content(system: ClaudeSystemParam) -> Option<GeminiContent> {
    let text = match system {
        ClaudeSystemParam::Text(text) => text,
        ClaudeSystemParam::Blocks(blocks) => blocks
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n"),
    };
    if text.is_empty() {
        return None;
    }
    Some(GeminiContent {
        parts: vec![text_part(text)],
        role: Some(ContentRole::User),
    })
}

fn message_to_content(message: &ClaudeMessageParam) -> GeminiContent {
    let role = match message.role {
        spx_protocol::claude::count_tokens::types::BetaMessageRole::User => ContentRole::User,
        spx_protocol::claude::count_tokens::types::BetaMessageRole::Assistant => {
            ContentRole::Model
        }
    };
    let parts = match &message.content {
        ClaudeMessageContent::Text(text) => vec![text_part(text.clone())],
        ClaudeMessageContent::Blocks(blocks) => blocks.iter().filter_map(block_to_part).collect(),
    };
    GeminiContent {
        parts,
        role: Some(role),
    }
}

fn block_to_part(block: &ClaudeContentBlockParam) -> Option<Part> {
    match block {
        ClaudeContentBlockParam::Text(text) => Some(text_part(text.text.clone())),
        _ => None,
    }
}

fn text_part(text: String) -> Part {
    Part {
        text: Some(text),
        inline_data: None,
        function_call: None,
        function_response: None,
        file_data: None,
        executable_code: None,
        code_execution_result: None,
        thought: None,
        thought_signature: None,
        part_metadata: None,
        video_metadata: None,
    }
}

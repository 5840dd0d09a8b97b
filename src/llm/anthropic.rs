//! Anthropic agent loop
//!
//! Calls the Messages API (non-streaming) and runs the tool-use cycle:
//! each response's text goes out as a `token` event, each `tool_use` block
//! is executed through the guarded registry and bracketed by
//! `tool_start`/`tool_end`, and the results are sent back until the model
//! stops asking for tools or the iteration cap is hit.

use std::env;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

use super::types::{
    ContentBlock, Message, MessageRequest, MessageResponse, StopReason, ToolDefinition,
};
use crate::agent::{AgentLoop, EventStream, TurnRequest};
use crate::config::Profile;
use crate::core::AgentEvent;
use crate::session::TurnRecord;
use crate::tools::ToolResult;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 25;

/// Settings shared by every request of one loop
#[derive(Debug, Clone)]
struct ApiSettings {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

/// Agent loop backed by the Anthropic Messages API
#[derive(Debug, Clone)]
pub struct AnthropicLoop {
    client: Client,
    settings: ApiSettings,
    max_tool_iterations: usize,
}

impl AnthropicLoop {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            settings: ApiSettings {
                api_key: api_key.into(),
                base_url: DEFAULT_BASE_URL.to_string(),
                model: model.into(),
                max_tokens: 4096,
                temperature: None,
            },
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
        }
    }

    /// Build from a profile, reading `ANTHROPIC_API_KEY` (and optionally
    /// `ANTHROPIC_BASE_URL`) from the environment
    pub fn from_profile(profile: &Profile) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;

        let mut agent_loop = Self::new(api_key, profile.model.clone())
            .with_max_tokens(profile.max_tokens);
        agent_loop.settings.temperature = profile.temperature;
        if let Ok(base_url) = env::var("ANTHROPIC_BASE_URL") {
            agent_loop.settings.base_url = base_url;
        }

        tracing::info!(model = %agent_loop.settings.model, "[Anthropic] Loop configured");
        Ok(agent_loop)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.settings.max_tokens = max_tokens;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.settings.base_url = base_url.into();
        self
    }

    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max;
        self
    }
}

/// Send one request
async fn send_request(
    client: &Client,
    settings: &ApiSettings,
    system: &str,
    messages: &[Message],
    tools: Vec<ToolDefinition>,
) -> Result<MessageResponse> {
    let request = MessageRequest {
        model: settings.model.clone(),
        max_tokens: settings.max_tokens,
        messages: messages.to_vec(),
        system: (!system.is_empty()).then(|| system.to_string()),
        tools,
        temperature: settings.temperature,
    };

    let request_json =
        serde_json::to_string(&request).context("Failed to serialize Anthropic request")?;
    tracing::debug!("[Anthropic] Request JSON: {}", request_json);

    let response = client
        .post(&settings.base_url)
        .header("Content-Type", "application/json")
        .header("x-api-key", &settings.api_key)
        .header("anthropic-version", API_VERSION)
        .body(request_json)
        .send()
        .await
        .context("Failed to send request to Anthropic API")?;

    let status = response.status();
    let response_text = response
        .text()
        .await
        .context("Failed to read Anthropic response body")?;

    tracing::debug!("[Anthropic] Response status: {}", status);

    if !status.is_success() {
        tracing::error!("[Anthropic] API error: {} - {}", status, response_text);
        anyhow::bail!("Anthropic API error ({}): {}", status, response_text);
    }

    serde_json::from_str(&response_text).context("Failed to parse Anthropic API response")
}

/// Convert stored history into API messages
///
/// Tool records become a synthetic `tool_use`/`tool_result` exchange since
/// the original block ids are not kept.
pub fn history_to_messages(history: &[TurnRecord]) -> Vec<Message> {
    let mut messages = Vec::new();

    for (index, record) in history.iter().enumerate() {
        match record {
            TurnRecord::System { .. } => {}
            TurnRecord::User { content, .. } => messages.push(Message::user(content.clone())),
            TurnRecord::Assistant { content } => {
                messages.push(Message::assistant(content.clone()))
            }
            TurnRecord::Tool {
                name,
                input,
                output,
            } => {
                let id = format!("toolu_history_{}", index);
                let input = if input.is_object() {
                    input.clone()
                } else {
                    json!({})
                };
                messages.push(Message::assistant_with_blocks(vec![ContentBlock::tool_use(
                    id.clone(),
                    name.clone(),
                    input,
                )]));
                messages.push(Message::user_with_blocks(vec![ContentBlock::tool_result(
                    id,
                    output.clone(),
                    false,
                )]));
            }
        }
    }

    messages
}

impl AgentLoop for AnthropicLoop {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn run_turn(&self, request: TurnRequest) -> EventStream {
        let client = self.client.clone();
        let settings = self.settings.clone();
        let max_iterations = self.max_tool_iterations;

        Box::pin(async_stream::try_stream! {
            let mut messages = history_to_messages(&request.history);
            messages.push(Message::user(request.input.clone()));
            let definitions = request.tools.definitions();

            for iteration in 0..max_iterations {
                tracing::debug!(iteration, "[Anthropic] Calling model");
                let response = send_request(
                    &client,
                    &settings,
                    &request.system_prompt,
                    &messages,
                    definitions.clone(),
                )
                .await?;

                let text = response.text();
                if !text.is_empty() {
                    yield AgentEvent::token(text);
                }

                let uses: Vec<(String, String, Value)> = response
                    .tool_uses()
                    .into_iter()
                    .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                    .collect();

                if uses.is_empty() || response.stop_reason != Some(StopReason::ToolUse) {
                    return;
                }

                messages.push(Message::assistant_with_blocks(response.content.clone()));

                let mut results = Vec::with_capacity(uses.len());
                for (id, name, input) in uses {
                    yield AgentEvent::tool_start(&name, input.clone());
                    let result = match request.tools.execute(&name, &input).await {
                        Ok(result) => result,
                        Err(e) => ToolResult::error(format!("Error: {}", e)),
                    };
                    yield AgentEvent::tool_end(&name, result.output.clone());
                    results.push(ContentBlock::tool_result(id, result.output, result.is_error));
                }
                messages.push(Message::user_with_blocks(results));
            }

            tracing::warn!(max_iterations, "[Anthropic] Tool iteration limit reached");
            Err::<(), anyhow::Error>(anyhow::anyhow!(
                "Stopped after {} tool iterations",
                max_iterations
            ))?;
        })
    }
}

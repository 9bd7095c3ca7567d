//! OpenAI chat-completions gateway.
//!
//! Enabled with the `openai-gateway` feature. The API key is read from
//! `OPENAI_API_KEY`; it is never stored in configuration.

use std::time::Duration;

use serde_json::{json, Value};

use super::prompt::{category_prompt, key_mapping_prompt, mapping_proposal_prompt, SYSTEM_PROMPT};
use super::reply::{parse_category_reply, parse_key_suggestion, parse_mapping_proposal};
use super::traits::{
    CategorySuggestionRequest, KeySuggestionRequest, MappingProposal, MappingProposalRequest,
    SuggestionGateway,
};
use crate::config::GatewayConfig;
use crate::core::Suggestion;
use crate::error::{ProdmapError, Result};

/// Environment variable holding the API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const GATEWAY_NAME: &str = "openai";

/// Gateway backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiGateway {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiGateway {
    /// Build a gateway from configuration and the environment.
    ///
    /// # Errors
    ///
    /// Returns a config error if the API key is missing or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let api_key = std::env::var(OPENAI_API_KEY_ENV).unwrap_or_default();
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(ProdmapError::config(format!(
                "openai gateway requires {OPENAI_API_KEY_ENV}"
            )));
        }

        let mut builder = reqwest::blocking::Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| ProdmapError::config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            model: config.model.clone(),
            api_key,
        })
    }

    fn chat(&self, prompt: String) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
        });

        let unavailable =
            |message: String| ProdmapError::gateway_unavailable(GATEWAY_NAME, message);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| unavailable(format!("request to {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(unavailable(format!("http error {status}: {text}")));
        }

        let reply: Value = response
            .json()
            .map_err(|e| unavailable(format!("invalid JSON response: {e}")))?;

        extract_message_content(&reply)
            .ok_or_else(|| unavailable("response has no message content".to_string()))
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response.
fn extract_message_content(reply: &Value) -> Option<String> {
    reply
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

impl SuggestionGateway for OpenAiGateway {
    fn name(&self) -> &'static str {
        GATEWAY_NAME
    }

    fn suggest_key_mapping(&self, request: &KeySuggestionRequest) -> Result<Suggestion> {
        let reply = self.chat(key_mapping_prompt(request))?;
        parse_key_suggestion(GATEWAY_NAME, &reply)
    }

    fn suggest_category(&self, request: &CategorySuggestionRequest) -> Result<Option<String>> {
        let reply = self.chat(category_prompt(request))?;
        parse_category_reply(GATEWAY_NAME, &reply)
    }

    fn propose_mapping(&self, request: &MappingProposalRequest) -> Result<MappingProposal> {
        let reply = self.chat(mapping_proposal_prompt(request))?;
        parse_mapping_proposal(GATEWAY_NAME, &reply)
    }
}

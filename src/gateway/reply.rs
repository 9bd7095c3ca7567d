//! Parsing of gateway replies.
//!
//! Replies are JSON objects, possibly wrapped in a markdown code fence by a
//! language model. Parsing is lenient about field names and enum spelling;
//! anything that cannot be applied collapses into a `manual` suggestion.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::traits::MappingProposal;
use crate::core::{Suggestion, SuggestionConfidence, TransformKind, MANUAL_SOURCE};
use crate::error::{ProdmapError, Result};

/// Strip a single surrounding markdown code fence.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(end) = rest.rfind("```") else {
        return trimmed;
    };
    let inner = &rest[..end];
    // Drop a language tag such as ```json
    let inner = match inner.find('\n') {
        Some(newline) if !inner[..newline].trim_start().starts_with('{') => &inner[newline + 1..],
        _ => inner,
    };
    inner.trim()
}

#[derive(Debug, Deserialize)]
struct KeySuggestionReply {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    transform: Option<String>,
    #[serde(default)]
    value_map: Option<BTreeMap<String, Value>>,
    #[serde(default, alias = "description_pl")]
    description: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default, alias = "reason")]
    rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryReply {
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MappingProposalReply {
    key_map: Map<String, Value>,
    #[serde(default)]
    value_map: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    constants: Map<String, Value>,
}

fn parse_transform(value: Option<&str>) -> TransformKind {
    let Some(value) = value else {
        return TransformKind::Manual;
    };
    let normalized = value.trim().to_ascii_lowercase();
    serde_json::from_value(Value::String(normalized)).unwrap_or(TransformKind::Manual)
}

fn parse_confidence(value: Option<&str>) -> SuggestionConfidence {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("high") => SuggestionConfidence::High,
        Some("medium") => SuggestionConfidence::Medium,
        // Gateways cannot claim operator verification.
        _ => SuggestionConfidence::Low,
    }
}

/// Parse a key-mapping reply into a normalized suggestion.
///
/// # Errors
///
/// Returns `GatewayReply` if the reply is not a JSON object.
pub fn parse_key_suggestion(gateway: &str, text: &str) -> Result<Suggestion> {
    let reply: KeySuggestionReply = serde_json::from_str(strip_code_fences(text)).map_err(|e| {
        ProdmapError::gateway_reply(gateway, format!("malformed suggestion: {e}"))
    })?;

    Ok(reply.into_suggestion())
}

impl KeySuggestionReply {
    fn into_suggestion(self) -> Suggestion {
        Suggestion {
            source: self
                .source
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| MANUAL_SOURCE.to_string()),
            transform: parse_transform(self.transform.as_deref()),
            value_map: self.value_map,
            description: self.description.unwrap_or_default(),
            confidence: parse_confidence(self.confidence.as_deref()),
            rationale: self.rationale.unwrap_or_default(),
        }
        .normalized()
    }
}

/// Parse a mapping proposal.
///
/// Output keys keep the reply's order, rules first and constants after.
/// A lookup takes its table from `value_map`. A proposed constant becomes a
/// `manual` suggestion that records the value for the reviewer.
///
/// # Errors
///
/// Returns `GatewayReply` if the reply has no `key_map` object or a rule is
/// not an object.
pub fn parse_mapping_proposal(gateway: &str, text: &str) -> Result<MappingProposal> {
    let mut reply: MappingProposalReply = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| ProdmapError::gateway_reply(gateway, format!("malformed mapping: {e}")))?;

    let mut proposal = MappingProposal::default();
    for (key, rule) in reply.key_map {
        let mut rule: KeySuggestionReply = serde_json::from_value(rule).map_err(|e| {
            ProdmapError::gateway_reply(gateway, format!("malformed rule for '{key}': {e}"))
        })?;
        if rule.value_map.is_none() {
            rule.value_map = reply.value_map.remove(&key);
        }
        if proposal.suggestions.contains_key(&key) {
            continue;
        }
        proposal.output_keys.push(key.clone());
        proposal.suggestions.insert(key, rule.into_suggestion());
    }
    for (key, value) in reply.constants {
        if proposal.suggestions.contains_key(&key) {
            continue;
        }
        let suggestion = Suggestion::manual(format!("proposed constant {value}"));
        proposal.output_keys.push(key.clone());
        proposal.suggestions.insert(key, suggestion);
    }

    Ok(proposal)
}

/// Parse a category reply. An empty or null category means no candidate.
///
/// # Errors
///
/// Returns `GatewayReply` if the reply is not a JSON object.
pub fn parse_category_reply(gateway: &str, text: &str) -> Result<Option<String>> {
    let reply: CategoryReply = serde_json::from_str(strip_code_fences(text)).map_err(|e| {
        ProdmapError::gateway_reply(gateway, format!("malformed category reply: {e}"))
    })?;

    Ok(reply
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty()))
}

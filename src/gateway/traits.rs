//! Suggestion gateway trait for prodmap.
//!
//! A gateway is an external helper (a local program, a language model API)
//! asked to fill gaps learning could not close: a rule for an unresolved
//! output key, the category of a record no local strategy recognized, or a
//! whole mapping for a category that has no training data yet.
//! Gateways are optional and unreliable by nature; every caller must cope
//! with an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::core::{KeyRule, MappingDefinition, Record, Suggestion, UnresolvedKey};
use crate::error::Result;

/// Request for a rule for one unresolved output key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeySuggestionRequest {
    pub category: String,
    pub output_key: String,
    /// Rules learning already accepted for the category.
    pub known_rules: BTreeMap<String, KeyRule>,
    pub constants: BTreeMap<String, Value>,
    /// Example values of the output key.
    pub sample_values: Vec<Value>,
    /// Input keys available alongside those examples.
    pub sample_input_keys: Vec<String>,
}

impl KeySuggestionRequest {
    /// Build a request from a learned definition and the key's context.
    pub fn new(definition: &MappingDefinition, unresolved: &UnresolvedKey) -> Self {
        Self {
            category: definition.category.clone(),
            output_key: unresolved.output_key.clone(),
            known_rules: definition.key_map.clone(),
            constants: definition.constants.clone(),
            sample_values: unresolved.sample_values.clone(),
            sample_input_keys: unresolved.sample_input_keys.clone(),
        }
    }

    /// Build a request for a key of a stored definition.
    ///
    /// Stored documents keep no samples, so the input keys come from the
    /// record being translated.
    pub fn for_key(definition: &MappingDefinition, key: &str, input_keys: Vec<String>) -> Self {
        Self {
            category: definition.category.clone(),
            output_key: key.to_string(),
            known_rules: definition.key_map.clone(),
            constants: definition.constants.clone(),
            sample_values: Vec::new(),
            sample_input_keys: input_keys,
        }
    }
}

/// Request for the category of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySuggestionRequest {
    pub label: String,
    pub secondary: Option<String>,
    pub known_categories: Vec<String>,
}

/// Input parameters shown to the gateway in a mapping proposal.
pub const PROPOSAL_PARAMETER_LIMIT: usize = 30;
/// Rules of the example mapping shown alongside.
pub const PROPOSAL_EXAMPLE_RULES: usize = 8;
/// An example mapping must have more rules than this.
const PROPOSAL_EXAMPLE_MIN_RULES: usize = 5;

/// Request for a whole mapping for a category without training data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingProposalRequest {
    pub category: String,
    /// Flattened parameters of the record being translated.
    pub parameters: Record,
    /// A stored mapping shown as an example of the expected shape.
    pub example_category: Option<String>,
    pub example_rules: BTreeMap<String, KeyRule>,
}

impl MappingProposalRequest {
    /// Build a request from the record and the stored mappings.
    ///
    /// The first stored mapping with enough rules becomes the example.
    pub fn new(category: &str, parameters: &Record, stored: &[MappingDefinition]) -> Self {
        let example = stored
            .iter()
            .find(|d| d.key_map.len() > PROPOSAL_EXAMPLE_MIN_RULES);
        Self {
            category: category.to_string(),
            parameters: parameters
                .iter()
                .take(PROPOSAL_PARAMETER_LIMIT)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            example_category: example.map(|d| d.category.clone()),
            example_rules: example
                .map(|d| {
                    d.key_map
                        .iter()
                        .take(PROPOSAL_EXAMPLE_RULES)
                        .map(|(k, r)| (k.clone(), r.clone()))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// A gateway's proposed mapping: one suggestion per output key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingProposal {
    /// Output keys in the order the gateway gave them.
    pub output_keys: Vec<String>,
    pub suggestions: BTreeMap<String, Suggestion>,
}

impl MappingProposal {
    pub fn is_empty(&self) -> bool {
        self.output_keys.is_empty()
    }

    /// Turn the proposal into a pending-review definition.
    ///
    /// Nothing is learned: every key carries a suggestion.
    pub fn into_definition(self, category: &str) -> MappingDefinition {
        let mut definition = MappingDefinition::new(category);
        definition.output_keys = self.output_keys;
        definition.gpt_suggestions = self.suggestions;
        definition.proposed = true;
        definition
    }
}

/// Trait for external suggestion gateways.
///
/// All gateways must be thread-safe; learning asks for suggestions from
/// several categories at once.
pub trait SuggestionGateway: Send + Sync {
    /// Get the gateway name for logging and reports.
    fn name(&self) -> &'static str;

    /// Whether calls can succeed at all.
    ///
    /// Unavailable gateways are not retried.
    fn is_available(&self) -> bool {
        true
    }

    /// Suggest a rule for an unresolved output key.
    fn suggest_key_mapping(&self, request: &KeySuggestionRequest) -> Result<Suggestion>;

    /// Suggest the category of a record.
    ///
    /// Returns `Ok(None)` when the gateway has no candidate.
    fn suggest_category(&self, request: &CategorySuggestionRequest) -> Result<Option<String>>;

    /// Propose a whole mapping for a category without training data.
    ///
    /// An empty proposal means the gateway has no answer.
    fn propose_mapping(&self, request: &MappingProposalRequest) -> Result<MappingProposal>;
}

impl<T: SuggestionGateway + ?Sized> SuggestionGateway for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn suggest_key_mapping(&self, request: &KeySuggestionRequest) -> Result<Suggestion> {
        (**self).suggest_key_mapping(request)
    }

    fn suggest_category(&self, request: &CategorySuggestionRequest) -> Result<Option<String>> {
        (**self).suggest_category(request)
    }

    fn propose_mapping(&self, request: &MappingProposalRequest) -> Result<MappingProposal> {
        (**self).propose_mapping(request)
    }
}

impl<T: SuggestionGateway + ?Sized> SuggestionGateway for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn suggest_key_mapping(&self, request: &KeySuggestionRequest) -> Result<Suggestion> {
        (**self).suggest_key_mapping(request)
    }

    fn suggest_category(&self, request: &CategorySuggestionRequest) -> Result<Option<String>> {
        (**self).suggest_category(request)
    }

    fn propose_mapping(&self, request: &MappingProposalRequest) -> Result<MappingProposal> {
        (**self).propose_mapping(request)
    }
}

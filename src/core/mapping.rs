//! Mapping definition types.
//!
//! A `MappingDefinition` is the persisted, versioned result of learning one
//! category. Learned rules (`key_map`, `value_map`, `constants`) and
//! externally suggested rules (`gpt_suggestions`) live in separate
//! namespaces so a reader can always tell them apart.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProdmapError, Result};

/// Schema version of persisted mapping documents.
///
/// Increment when the document layout changes in a breaking way.
pub const MAPPING_SCHEMA_VERSION: u32 = 1;

/// Source name used by suggestions that require manual input.
pub const MANUAL_SOURCE: &str = "manual";

/// How an output value is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Fixed value, independent of the input.
    Constant,
    /// Source value verbatim.
    Copy,
    /// Numeric source value divided by 10.
    #[serde(alias = "divide10")]
    Scale10,
    /// Source value mapped through a learned table.
    Lookup,
    /// Requires operator input.
    Manual,
}

impl TransformKind {
    /// Kinds the key resolver evaluates, in tie-break order.
    pub const LEARNABLE: [TransformKind; 3] =
        [TransformKind::Copy, TransformKind::Scale10, TransformKind::Lookup];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Copy => "copy",
            Self::Scale10 => "scale10",
            Self::Lookup => "lookup",
            Self::Manual => "manual",
        }
    }

    /// Tie-break rank; lower wins.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Constant => 0,
            Self::Copy => 1,
            Self::Scale10 => 2,
            Self::Lookup => 3,
            Self::Manual => 4,
        }
    }
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A learned rule for one output key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRule {
    /// Input key the value is read from.
    pub source: String,
    /// Transform applied to the source value.
    pub transform: TransformKind,
}

impl KeyRule {
    pub fn new(source: impl Into<String>, transform: TransformKind) -> Self {
        Self {
            source: source.into(),
            transform,
        }
    }
}

/// Confidence attached to an external suggestion.
///
/// `Verified` is reserved for entries confirmed by an operator and is never
/// replaced by a gateway answer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionConfidence {
    #[default]
    Low,
    Medium,
    High,
    Verified,
}

impl SuggestionConfidence {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Verified => "verified",
        }
    }
}

impl std::fmt::Display for SuggestionConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An externally suggested rule for a key learning could not resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Input key, or `manual`.
    pub source: String,
    /// Suggested transform.
    pub transform: TransformKind,
    /// Lookup table for `lookup` suggestions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_map: Option<BTreeMap<String, Value>>,
    /// Human-readable description of the output field.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub confidence: SuggestionConfidence,
    /// Why the gateway suggested this rule.
    #[serde(default)]
    pub rationale: String,
}

impl Suggestion {
    /// A suggestion that the key needs manual input.
    pub fn manual(rationale: impl Into<String>) -> Self {
        Self {
            source: MANUAL_SOURCE.to_string(),
            transform: TransformKind::Manual,
            value_map: None,
            description: String::new(),
            confidence: SuggestionConfidence::Low,
            rationale: rationale.into(),
        }
    }

    /// Whether applying this suggestion yields the manual placeholder.
    pub fn is_manual(&self) -> bool {
        self.source.trim().is_empty()
            || self.source == MANUAL_SOURCE
            || matches!(self.transform, TransformKind::Manual | TransformKind::Constant)
    }

    /// Collapse unusable suggestions into `manual`.
    ///
    /// A suggestion without a source, a constant without a value, or a
    /// lookup without a table cannot be applied.
    pub fn normalized(self) -> Self {
        let unusable = self.is_manual()
            || (self.transform == TransformKind::Lookup
                && self.value_map.as_ref().is_none_or(BTreeMap::is_empty));
        if unusable {
            Self {
                source: MANUAL_SOURCE.to_string(),
                transform: TransformKind::Manual,
                value_map: None,
                ..self
            }
        } else {
            self
        }
    }
}

/// Learning statistics recorded for one output key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyAudit {
    /// Score of the accepted (or best rejected) rule.
    pub score: f64,
    /// Fraction of pairs in which the output key was present.
    pub coverage: f64,
    /// Coverage fell below the configured minimum.
    #[serde(default)]
    pub low_trust: bool,
}

/// How one output key is resolved in a definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyResolution<'a> {
    Constant(&'a Value),
    Learned(&'a KeyRule),
    Suggested(&'a Suggestion),
    Unresolved,
}

/// The persisted mapping for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDefinition {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Category name; the document's identity.
    pub category: String,
    /// Output keys in definition order.
    pub output_keys: Vec<String>,
    /// Learned rules.
    #[serde(default)]
    pub key_map: BTreeMap<String, KeyRule>,
    /// Lookup tables for `lookup` rules, keyed by canonical source text.
    #[serde(default)]
    pub value_map: BTreeMap<String, BTreeMap<String, Value>>,
    /// Output keys with a fixed value.
    #[serde(default)]
    pub constants: BTreeMap<String, Value>,
    /// Externally suggested rules for unresolved keys.
    #[serde(default)]
    pub gpt_suggestions: BTreeMap<String, Suggestion>,
    /// Per-key learning statistics.
    #[serde(default)]
    pub audit: BTreeMap<String, KeyAudit>,
    /// Operator-verified suggestions for keys that learning has since
    /// resolved. Kept for review, never applied while the key is learned.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub superseded_verified: BTreeMap<String, Suggestion>,
    /// Proposed by the gateway for a category without training data.
    /// Holds suggestions only until learning or review replaces it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub proposed: bool,
}

impl MappingDefinition {
    /// Create an empty definition for a category.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            schema_version: MAPPING_SCHEMA_VERSION,
            category: category.into(),
            output_keys: Vec::new(),
            key_map: BTreeMap::new(),
            value_map: BTreeMap::new(),
            constants: BTreeMap::new(),
            gpt_suggestions: BTreeMap::new(),
            audit: BTreeMap::new(),
            superseded_verified: BTreeMap::new(),
            proposed: false,
        }
    }

    /// Resolve one output key.
    pub fn resolution(&self, key: &str) -> KeyResolution<'_> {
        if let Some(value) = self.constants.get(key) {
            KeyResolution::Constant(value)
        } else if let Some(rule) = self.key_map.get(key) {
            KeyResolution::Learned(rule)
        } else if let Some(suggestion) = self.gpt_suggestions.get(key) {
            KeyResolution::Suggested(suggestion)
        } else {
            KeyResolution::Unresolved
        }
    }

    /// Whether learning resolved the key (rule or constant).
    pub fn is_learned(&self, key: &str) -> bool {
        self.constants.contains_key(key) || self.key_map.contains_key(key)
    }

    /// Output keys learning left unresolved, in definition order.
    pub fn unresolved_keys(&self) -> Vec<&str> {
        self.output_keys
            .iter()
            .filter(|k| !self.is_learned(k))
            .map(String::as_str)
            .collect()
    }

    /// Unresolved keys that have no suggestion yet.
    pub fn pending_keys(&self) -> Vec<&str> {
        self.unresolved_keys()
            .into_iter()
            .filter(|k| !self.gpt_suggestions.contains_key(*k))
            .collect()
    }

    /// Check structural validity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMapping` describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(ProdmapError::invalid_mapping(&self.category, message));

        if self.schema_version == 0 || self.schema_version > MAPPING_SCHEMA_VERSION {
            return invalid(format!(
                "unsupported schema version {}",
                self.schema_version
            ));
        }
        if self.category.trim().is_empty() {
            return invalid("empty category name".to_string());
        }

        let mut seen = BTreeSet::new();
        for key in &self.output_keys {
            if !seen.insert(key.as_str()) {
                return invalid(format!("duplicate output key '{key}'"));
            }
        }

        for key in self
            .key_map
            .keys()
            .chain(self.constants.keys())
            .chain(self.gpt_suggestions.keys())
        {
            if !seen.contains(key.as_str()) {
                return invalid(format!("rule for unknown output key '{key}'"));
            }
        }

        for (key, rule) in &self.key_map {
            if self.constants.contains_key(key) {
                return invalid(format!("key '{key}' is both a rule and a constant"));
            }
            if !TransformKind::LEARNABLE.contains(&rule.transform) {
                return invalid(format!(
                    "key '{key}' has non-learnable transform '{}'",
                    rule.transform
                ));
            }
            if rule.transform == TransformKind::Lookup && !self.value_map.contains_key(key) {
                return invalid(format!("lookup key '{key}' has no value table"));
            }
        }

        for key in self.value_map.keys() {
            let is_lookup = self
                .key_map
                .get(key)
                .is_some_and(|r| r.transform == TransformKind::Lookup);
            if !is_lookup {
                return invalid(format!("value table for non-lookup key '{key}'"));
            }
        }

        for key in self.gpt_suggestions.keys() {
            if self.is_learned(key) {
                return invalid(format!("suggestion shadows learned key '{key}'"));
            }
        }

        Ok(())
    }

    /// Summarize the definition for listings.
    pub fn summary(&self) -> MappingSummary {
        let mut rules_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for rule in self.key_map.values() {
            *rules_by_kind.entry(rule.transform.to_string()).or_default() += 1;
        }

        MappingSummary {
            category: self.category.clone(),
            output_keys: self.output_keys.len(),
            rules_by_kind,
            constants: self.constants.len(),
            lookup_entries: self.value_map.values().map(BTreeMap::len).sum(),
            suggestions: self
                .gpt_suggestions
                .iter()
                .map(|(key, s)| SuggestionSummary {
                    key: key.clone(),
                    source: s.source.clone(),
                    transform: s.transform,
                    confidence: s.confidence,
                })
                .collect(),
            pending: self.pending_keys().into_iter().map(String::from).collect(),
            proposed: self.proposed,
        }
    }
}

/// Listing entry for one stored mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingSummary {
    pub category: String,
    pub output_keys: usize,
    pub rules_by_kind: BTreeMap<String, usize>,
    pub constants: usize,
    pub lookup_entries: usize,
    pub suggestions: Vec<SuggestionSummary>,
    /// Unresolved keys without any suggestion.
    pub pending: Vec<String>,
    /// Gateway proposal awaiting review.
    pub proposed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionSummary {
    pub key: String,
    pub source: String,
    pub transform: TransformKind,
    pub confidence: SuggestionConfidence,
}

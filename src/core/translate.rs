//! Record translation.
//!
//! Applies a [`MappingDefinition`] to one flattened input record. Every
//! output key of the definition is produced, in definition order; keys that
//! cannot be derived get a placeholder and are flagged through their
//! provenance rather than dropped.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::flatten::flatten_parameters;
use super::mapping::{KeyResolution, MappingDefinition, TransformKind};
use super::value::{get_key, is_absent_input, number_value, numeric, scalar_text, Record};
use crate::config::TranslationConfig;

/// Where an output value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Learned,
    Suggested,
    Manual,
}

/// Per-field problem found while translating.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldIssue {
    /// The source value is not in the lookup table.
    LookupMiss { source: String, value: String },
    /// The source key is absent from the input.
    MissingSource { source: String },
    /// A `scale10` source is not a number.
    NonNumeric { source: String, value: String },
}

impl std::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LookupMiss { source, value } => {
                write!(f, "{source}={value} is not in the lookup table")
            }
            Self::MissingSource { source } => write!(f, "{source} is missing"),
            Self::NonNumeric { source, value } => write!(f, "{source}={value} is not a number"),
        }
    }
}

/// One output field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedField {
    pub key: String,
    pub value: Value,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<FieldIssue>,
}

/// Translation of one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    pub category: String,
    pub fields: Vec<TranslatedField>,
}

impl TranslationResult {
    /// The output record, in definition order.
    pub fn output_record(&self) -> Record {
        self.fields
            .iter()
            .map(|f| (f.key.clone(), f.value.clone()))
            .collect()
    }

    /// Provenance per output key.
    pub fn provenance(&self) -> BTreeMap<&str, Provenance> {
        self.fields
            .iter()
            .map(|f| (f.key.as_str(), f.provenance))
            .collect()
    }

    /// Keys whose value was not learned and should be reviewed.
    pub fn review_keys(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.provenance != Provenance::Learned)
            .map(|f| f.key.as_str())
            .collect()
    }

    /// Fields with a per-field issue.
    pub fn issues(&self) -> impl Iterator<Item = (&str, &FieldIssue)> {
        self.fields
            .iter()
            .filter_map(|f| f.issue.as_ref().map(|i| (f.key.as_str(), i)))
    }

    pub fn get(&self, key: &str) -> Option<&TranslatedField> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// Outcome of applying one transform.
enum Applied {
    Value(Value),
    Null(Option<FieldIssue>),
    Manual(FieldIssue),
}

/// Applies one mapping definition to input records.
pub struct Translator<'a> {
    definition: &'a MappingDefinition,
    settings: &'a TranslationConfig,
}

impl<'a> Translator<'a> {
    pub fn new(definition: &'a MappingDefinition, settings: &'a TranslationConfig) -> Self {
        Self {
            definition,
            settings,
        }
    }

    /// Translate one input record. Never fails; problems are per field.
    pub fn translate(&self, parameters: &Record) -> TranslationResult {
        let input = flatten_parameters(parameters);
        let fields = self
            .definition
            .output_keys
            .iter()
            .map(|key| self.translate_key(key, &input))
            .collect();

        TranslationResult {
            category: self.definition.category.clone(),
            fields,
        }
    }

    fn translate_key(&self, key: &str, input: &Record) -> TranslatedField {
        let (applied, provenance) = match self.definition.resolution(key) {
            KeyResolution::Constant(value) => (Applied::Value(value.clone()), Provenance::Learned),
            KeyResolution::Learned(rule) => (
                self.apply(
                    input,
                    &rule.source,
                    rule.transform,
                    self.definition.value_map.get(key),
                ),
                Provenance::Learned,
            ),
            KeyResolution::Suggested(suggestion) if !suggestion.is_manual() => (
                self.apply(
                    input,
                    &suggestion.source,
                    suggestion.transform,
                    suggestion.value_map.as_ref(),
                ),
                Provenance::Suggested,
            ),
            KeyResolution::Suggested(_) | KeyResolution::Unresolved => {
                return self.manual_field(key, None);
            }
        };

        match applied {
            Applied::Value(value) => TranslatedField {
                key: key.to_string(),
                value,
                provenance,
                issue: None,
            },
            Applied::Null(issue) => TranslatedField {
                key: key.to_string(),
                value: Value::String(self.settings.null_placeholder.clone()),
                provenance,
                issue,
            },
            Applied::Manual(issue) => self.manual_field(key, Some(issue)),
        }
    }

    fn manual_field(&self, key: &str, issue: Option<FieldIssue>) -> TranslatedField {
        TranslatedField {
            key: key.to_string(),
            value: Value::String(self.settings.manual_placeholder.clone()),
            provenance: Provenance::Manual,
            issue,
        }
    }

    fn apply(
        &self,
        input: &Record,
        source: &str,
        transform: TransformKind,
        table: Option<&BTreeMap<String, Value>>,
    ) -> Applied {
        let value =
            get_key(input, source).filter(|v| !is_absent_input(v, &self.settings.null_tokens));
        let Some(value) = value else {
            return Applied::Null(Some(FieldIssue::MissingSource {
                source: source.to_string(),
            }));
        };

        match transform {
            TransformKind::Copy => match value {
                Value::String(s) => Applied::Value(Value::String(s.trim().to_string())),
                other => Applied::Value(other.clone()),
            },
            TransformKind::Scale10 => match numeric(value) {
                Some(n) => Applied::Value(number_value(n / 10.0)),
                None => Applied::Null(Some(FieldIssue::NonNumeric {
                    source: source.to_string(),
                    value: scalar_text(value).unwrap_or_default(),
                })),
            },
            TransformKind::Lookup => {
                let text = scalar_text(value).unwrap_or_default();
                match table.and_then(|t| t.get(&text)) {
                    Some(mapped) => Applied::Value(mapped.clone()),
                    None => Applied::Manual(FieldIssue::LookupMiss {
                        source: source.to_string(),
                        value: text,
                    }),
                }
            }
            TransformKind::Constant | TransformKind::Manual => {
                Applied::Manual(FieldIssue::MissingSource {
                    source: source.to_string(),
                })
            }
        }
    }
}

//! Core types and logic for prodmap.
//!
//! This module contains the learning engine (corpus, transform evaluation,
//! key resolution, lookup tables) and the translator that applies learned
//! mapping definitions to new records.

pub mod corpus;
pub mod evaluate;
pub mod flatten;
pub mod learner;
pub mod lookup;
pub mod mapping;
pub mod resolve;
pub mod translate;
pub mod value;

pub use corpus::{parse_param_string, CorpusLoadStats, PairCorpus, TrainingPair};
pub use evaluate::{evaluate, Evaluation, EvaluationSettings};
pub use flatten::{flatten_parameters, is_metadata_key, METADATA_SUFFIXES};
pub use learner::{LearnedCategory, Learner, LearningWarning, UnresolvedKey};
pub use lookup::{build_value_table, LookupConflict};
pub use mapping::{
    KeyAudit, KeyResolution, KeyRule, MappingDefinition, MappingSummary, Suggestion,
    SuggestionConfidence, SuggestionSummary, TransformKind, MANUAL_SOURCE,
    MAPPING_SCHEMA_VERSION,
};
pub use resolve::{CandidateRule, KeyOutcome, KeyResolver, Resolution, ResolverSettings};
pub use translate::{FieldIssue, Provenance, TranslatedField, TranslationResult, Translator};
pub use value::Record;

//! prodmap - learned EFOR to PROD order parameter translation
//!
//! prodmap learns, per product category, how order-capture (EFOR) parameters
//! map onto production (PROD) parameters from paired examples, stores the
//! learned mapping definitions, and applies them to new orders. Keys that
//! cannot be learned are filled by an optional external suggestion gateway
//! or left as manual placeholders with provenance for review.

pub mod category;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod storage;
pub mod util;

pub use category::{CategoryMatch, CategoryQuery, CategoryResolver, MatchStep};
pub use config::Config;
pub use core::{
    flatten_parameters, KeyRule, LearnedCategory, Learner, MappingDefinition, PairCorpus,
    Provenance, Record, Suggestion, TrainingPair, TransformKind, TranslationResult, Translator,
};
pub use error::{FailOpen, ProdmapError, Result};
pub use gateway::{build_gateway, build_gateway_or_disabled, SuggestionGateway};
pub use pipeline::{Engine, ItemOutcome, LearnReport, Order, OrderItem, OrderReport};
pub use storage::{FileMappingStore, MappingStore, MemoryMappingStore};

// CLI commands
pub use cli::{LearnCommand, MappingsCommand, TranslateCommand};

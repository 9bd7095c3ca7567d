//! Learning and translation pipelines.
//!
//! The [`Engine`] ties the pieces together:
//!
//! - learning: corpus → learner → gateway suggestions for unresolved keys →
//!   merge into the stored mapping under the category lock;
//! - translation: order item → category resolver → stored mapping →
//!   translator. An item no category matches can get a gateway-proposed
//!   mapping, stored as suggestions pending review.
//!
//! Failures are isolated per category when learning and per item when
//! translating; the reports carry them next to the successful results.

use std::collections::BTreeSet;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::category::{
    CategoryConfidence, CategoryMatch, CategoryQuery, CategoryResolver, MatchStep,
};
use crate::config::Config;
use crate::core::{
    flatten_parameters, CorpusLoadStats, LearnedCategory, Learner, LearningWarning,
    MappingDefinition, MappingSummary, PairCorpus, Record, Suggestion, TrainingPair,
    TranslationResult, Translator,
};
use crate::error::{ProdmapError, Result};
use crate::gateway::{KeySuggestionRequest, MappingProposalRequest, SuggestionGateway};
use crate::storage::{merge_learned, merge_suggestion, MappingStore};
use crate::util::read_to_string_limited;

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Product line label, matched against trained categories.
    #[serde(default)]
    pub department: String,
    /// Free-text description, the secondary field for category matching.
    #[serde(default)]
    pub product_description: Option<String>,
    /// Order-capture parameters, possibly nested.
    #[serde(default)]
    pub parameters: Record,
}

/// An order document: `{"items": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Load an order from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = read_to_string_limited(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ProdmapError::serde(format!("{}: {}", path.display(), e)))
    }
}

/// Learning outcome of one category.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryReport {
    pub category: String,
    pub pairs: usize,
    pub rules: usize,
    pub constants: usize,
    pub lookups: usize,
    /// Keys with a usable gateway suggestion.
    pub suggested: usize,
    /// Unresolved keys that will get the manual placeholder.
    pub manual: Vec<String>,
    pub warnings: Vec<LearningWarning>,
    /// Set when the category failed; nothing was stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CategoryReport {
    fn failed(category: &str, error: &ProdmapError) -> Self {
        Self {
            category: category.to_string(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    fn from_stored(learned: &LearnedCategory, stored: &MappingDefinition) -> Self {
        let unresolved = stored.unresolved_keys();
        Self {
            category: stored.category.clone(),
            pairs: learned.pair_count,
            rules: stored.key_map.len(),
            constants: stored.constants.len(),
            lookups: stored.value_map.len(),
            suggested: unresolved
                .iter()
                .filter(|k| stored.gpt_suggestions.get(**k).is_some_and(|s| !s.is_manual()))
                .count(),
            manual: unresolved
                .iter()
                .filter(|k| stored.gpt_suggestions.get(**k).is_none_or(Suggestion::is_manual))
                .map(|k| k.to_string())
                .collect(),
            warnings: learned.warnings.clone(),
            error: None,
        }
    }
}

/// Outcome of a learning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearnReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus: Option<CorpusLoadStats>,
    pub categories: Vec<CategoryReport>,
}

impl LearnReport {
    pub fn succeeded(&self) -> usize {
        self.categories.iter().filter(|c| c.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.categories.len() - self.succeeded()
    }
}

/// Translation outcome of one order item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Translated {
        index: usize,
        #[serde(rename = "match")]
        category: CategoryMatch,
        result: TranslationResult,
    },
    Skipped {
        index: usize,
        label: String,
        reason: String,
    },
}

/// Outcome of translating an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderReport {
    pub items: Vec<ItemOutcome>,
}

impl OrderReport {
    /// Successfully translated items.
    pub fn translated(&self) -> impl Iterator<Item = (&CategoryMatch, &TranslationResult)> {
        self.items.iter().filter_map(|item| match item {
            ItemOutcome::Translated {
                category, result, ..
            } => Some((category, result)),
            ItemOutcome::Skipped { .. } => None,
        })
    }

    pub fn skipped_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i, ItemOutcome::Skipped { .. }))
            .count()
    }

    /// Output keys flagged `suggested` or `manual` in any item.
    pub fn review_keys(&self) -> BTreeSet<String> {
        self.translated()
            .flat_map(|(_, result)| result.review_keys())
            .map(str::to_string)
            .collect()
    }

    /// Output columns: every output key in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut columns = Vec::new();
        for (_, result) in self.translated() {
            for field in &result.fields {
                if seen.insert(field.key.as_str()) {
                    columns.push(field.key.clone());
                }
            }
        }
        columns
    }

    /// One output record per translated item.
    pub fn rows(&self) -> Vec<Record> {
        self.translated()
            .map(|(_, result)| result.output_record())
            .collect()
    }
}

/// Learning and translation over a mapping store and a gateway.
pub struct Engine<S: MappingStore> {
    config: Config,
    store: S,
    gateway: Box<dyn SuggestionGateway>,
}

impl<S: MappingStore> Engine<S> {
    pub fn new(config: Config, store: S, gateway: Box<dyn SuggestionGateway>) -> Self {
        Self {
            config,
            store,
            gateway,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Learn every category of a corpus and store the results.
    ///
    /// A failing category is reported and never affects the others.
    pub fn learn(&self, corpus: &PairCorpus) -> LearnReport {
        let learner = Learner::new(&self.config);
        let categories: Vec<(&str, &[TrainingPair])> = corpus.iter().collect();

        let learn_one = |(category, pairs): &(&str, &[TrainingPair])| {
            learner
                .learn_category(category, pairs)
                .and_then(|learned| self.store_learned(&learned))
                .unwrap_or_else(|e| {
                    tracing::warn!("Learning '{}' failed: {}", category, e);
                    CategoryReport::failed(category, &e)
                })
        };

        let reports = if self.config.learning.parallel {
            categories.par_iter().map(learn_one).collect()
        } else {
            categories.iter().map(learn_one).collect()
        };

        LearnReport {
            corpus: None,
            categories: reports,
        }
    }

    /// Ask the gateway about unresolved keys, then merge under the lock.
    fn store_learned(&self, learned: &LearnedCategory) -> Result<CategoryReport> {
        let category = learned.definition.category.as_str();
        let existing = self.store.get(category)?;

        let mut suggestions: Vec<(String, Suggestion)> = Vec::new();
        if self.gateway.is_available() {
            for unresolved in &learned.unresolved {
                let key = &unresolved.output_key;
                let already_suggested = existing
                    .as_ref()
                    .and_then(|d| d.gpt_suggestions.get(key))
                    .is_some_and(|s| !s.is_manual());
                if already_suggested {
                    continue;
                }

                let request = KeySuggestionRequest::new(&learned.definition, unresolved);
                match self.gateway.suggest_key_mapping(&request) {
                    Ok(suggestion) => suggestions.push((key.clone(), suggestion.normalized())),
                    Err(e) => tracing::warn!(
                        "No suggestion for {}/{} ({}); key stays manual",
                        category,
                        key,
                        e
                    ),
                }
            }
        }

        let stored = self.store.update(category, &mut |current| {
            let mut merged = merge_learned(current.as_ref(), learned.definition.clone());
            for (key, suggestion) in &suggestions {
                let outcome = merge_suggestion(&mut merged, key, suggestion.clone());
                tracing::debug!("{}/{}: suggestion {:?}", category, key, outcome);
            }
            Ok(merged)
        })?;

        Ok(CategoryReport::from_stored(learned, &stored))
    }

    /// Translate every item of an order.
    ///
    /// # Errors
    ///
    /// Returns an error only if the stored categories cannot be listed.
    /// Per-item problems are reported as skipped items.
    pub fn translate_order(&self, order: &Order) -> Result<OrderReport> {
        let known = self.store.categories()?;
        let resolver = CategoryResolver::new(known, Some(self.gateway.as_ref()));

        let translate =
            |(index, item): (usize, &OrderItem)| self.translate_item(index, item, &resolver);
        let items = if self.config.learning.parallel {
            order.items.par_iter().enumerate().map(translate).collect()
        } else {
            order.items.iter().enumerate().map(translate).collect()
        };

        Ok(OrderReport { items })
    }

    /// Translate one item, turning every failure into a skipped outcome.
    pub fn translate_item(
        &self,
        index: usize,
        item: &OrderItem,
        resolver: &CategoryResolver<'_>,
    ) -> ItemOutcome {
        let attempt = self
            .resolve_mapping(item, resolver)
            .map(|(category, definition)| {
                let result = Translator::new(&definition, &self.config.translation)
                    .translate(&item.parameters);
                (category, result)
            });

        match attempt {
            Ok((category, result)) => ItemOutcome::Translated {
                index,
                category,
                result,
            },
            Err(e) => {
                tracing::warn!("Skipping item {} ('{}'): {}", index, item.department, e);
                ItemOutcome::Skipped {
                    index,
                    label: item.department.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Resolve an item's category and load its mapping.
    fn resolve_mapping(
        &self,
        item: &OrderItem,
        resolver: &CategoryResolver<'_>,
    ) -> Result<(CategoryMatch, MappingDefinition)> {
        let query = CategoryQuery::new(&item.department, item.product_description.as_deref());
        match resolver.resolve(&query) {
            Ok(category) => {
                let definition = self.mapping_for(&category.category, &item.parameters)?;
                Ok((category, definition))
            }
            Err(e @ ProdmapError::CategoryUnresolved { .. }) => {
                if !self.config.translation.propose_unknown_categories
                    || !self.gateway.is_available()
                {
                    return Err(e);
                }
                let Some(definition) = self.proposed_mapping(item)? else {
                    return Err(e);
                };
                let category = CategoryMatch {
                    category: definition.category.clone(),
                    step: MatchStep::Proposed,
                    confidence: CategoryConfidence::Low,
                };
                Ok((category, definition))
            }
            Err(e) => Err(e),
        }
    }

    /// Ask the gateway for a whole mapping for an unrecognized item.
    ///
    /// The proposal is stored under the item's label with suggestions only,
    /// so it is applied with `suggested` provenance until learning or an
    /// operator replaces it. Returns `None` when the gateway has no answer.
    fn proposed_mapping(&self, item: &OrderItem) -> Result<Option<MappingDefinition>> {
        let label = item.department.trim();
        if label.is_empty() {
            return Ok(None);
        }
        if let Some(existing) = self.store.get(label)? {
            return Ok(Some(existing));
        }

        let parameters = flatten_parameters(&item.parameters);
        let request = MappingProposalRequest::new(label, &parameters, &self.store.list()?);
        let proposal = match self.gateway.propose_mapping(&request) {
            Ok(proposal) if !proposal.is_empty() => proposal,
            Ok(_) => {
                tracing::info!("Gateway proposed no mapping for '{}'", label);
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!("No mapping proposal for '{}': {}", label, e);
                return Ok(None);
            }
        };

        let stored = self.store.update(label, &mut |current| match current {
            Some(mut current) => {
                for (key, suggestion) in &proposal.suggestions {
                    merge_suggestion(&mut current, key, suggestion.clone());
                }
                Ok(current)
            }
            None => Ok(proposal.clone().into_definition(label)),
        })?;
        tracing::warn!(
            "Stored proposed mapping for '{}' with {} keys, pending review",
            label,
            stored.output_keys.len()
        );
        Ok(Some(stored))
    }

    /// Load a category's mapping, optionally filling pending keys first.
    fn mapping_for(&self, category: &str, parameters: &Record) -> Result<MappingDefinition> {
        let definition = self
            .store
            .get(category)?
            .ok_or_else(|| ProdmapError::invalid_mapping(category, "mapping disappeared"))?;

        if !self.config.translation.suggest_on_translate
            || !self.gateway.is_available()
            || definition.pending_keys().is_empty()
        {
            return Ok(definition);
        }

        let input_keys: Vec<String> = flatten_parameters(parameters).keys().cloned().collect();
        let mut suggestions = Vec::new();
        for key in definition.pending_keys() {
            let request = KeySuggestionRequest::for_key(&definition, key, input_keys.clone());
            match self.gateway.suggest_key_mapping(&request) {
                Ok(suggestion) => suggestions.push((key.to_string(), suggestion.normalized())),
                Err(e) => tracing::warn!("No suggestion for {}/{}: {}", category, key, e),
            }
        }
        if suggestions.is_empty() {
            return Ok(definition);
        }

        self.store.update(category, &mut |current| {
            let mut current = current.ok_or_else(|| {
                ProdmapError::invalid_mapping(category, "mapping disappeared")
            })?;
            for (key, suggestion) in &suggestions {
                merge_suggestion(&mut current, key, suggestion.clone());
            }
            Ok(current)
        })
    }

    /// Summaries of all stored mappings.
    pub fn summaries(&self) -> Result<Vec<MappingSummary>> {
        Ok(self
            .store
            .list()?
            .iter()
            .map(MappingDefinition::summary)
            .collect())
    }
}

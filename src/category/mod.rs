//! Category resolution for prodmap.
//!
//! Incoming records name their product line loosely ("VERTIKAL",
//! "Rolety dzień-noc premium"). The resolver maps them onto a trained
//! category through an ordered fallback chain; the first strategy with a
//! match wins.

pub mod strategies;

use serde::Serialize;

pub use strategies::{
    CategoryQuery, CategoryStrategy, ExactMatch, GatewayMatch, MatchStep, SecondaryFieldMatch,
    SubstringMatch,
};

use crate::error::{ProdmapError, Result};
use crate::gateway::SuggestionGateway;

/// How much to trust a category match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryConfidence {
    High,
    Low,
}

/// A resolved category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryMatch {
    pub category: String,
    pub step: MatchStep,
    /// Gateway matches are low-confidence.
    pub confidence: CategoryConfidence,
}

/// Ordered fallback chain over the known categories.
pub struct CategoryResolver<'g> {
    known: Vec<String>,
    strategies: Vec<Box<dyn CategoryStrategy + 'g>>,
}

impl<'g> CategoryResolver<'g> {
    /// Create the default chain: exact, substring, secondary field, then the
    /// gateway if one is given.
    pub fn new(known: Vec<String>, gateway: Option<&'g dyn SuggestionGateway>) -> Self {
        let mut strategies: Vec<Box<dyn CategoryStrategy + 'g>> = vec![
            Box::new(ExactMatch),
            Box::new(SubstringMatch),
            Box::new(SecondaryFieldMatch),
        ];
        if let Some(gateway) = gateway {
            strategies.push(Box::new(GatewayMatch::new(gateway)));
        }
        Self::with_strategies(known, strategies)
    }

    /// Create a resolver with a custom chain.
    pub fn with_strategies(
        mut known: Vec<String>,
        strategies: Vec<Box<dyn CategoryStrategy + 'g>>,
    ) -> Self {
        known.sort();
        known.dedup();
        Self { known, strategies }
    }

    /// The categories the resolver matches against, sorted.
    pub fn known(&self) -> &[String] {
        &self.known
    }

    /// Resolve a query.
    ///
    /// # Errors
    ///
    /// Returns `CategoryUnresolved` when no strategy matches.
    pub fn resolve(&self, query: &CategoryQuery<'_>) -> Result<CategoryMatch> {
        for strategy in &self.strategies {
            if let Some(category) = strategy.resolve(query, &self.known) {
                let step = strategy.step();
                tracing::debug!("Category '{}' -> '{}' ({})", query.label, category, step);
                return Ok(CategoryMatch {
                    category,
                    step,
                    confidence: if step == MatchStep::Gateway {
                        CategoryConfidence::Low
                    } else {
                        CategoryConfidence::High
                    },
                });
            }
        }

        Err(ProdmapError::category_unresolved(query.label))
    }
}

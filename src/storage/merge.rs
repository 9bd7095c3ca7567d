//! Merge rules for mapping documents.
//!
//! Re-learning owns the learned namespace (`key_map`, `value_map`,
//! `constants`) and replaces it wholesale. The suggestion namespace is only
//! ever added to: a stored suggestion survives re-learning while its key is
//! still unresolved, and is only replaced by a strictly more confident one.
//! Operator-verified suggestions are never discarded: when learning resolves
//! their key they move to `superseded_verified`, and they come back if the
//! key becomes unresolved again.

use serde::Serialize;

use crate::core::{MappingDefinition, Suggestion, SuggestionConfidence};

/// What happened when merging one suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// The key had no suggestion.
    Added,
    /// A weaker suggestion was replaced.
    Replaced { previous: SuggestionConfidence },
    /// The stored suggestion is at least as confident.
    KeptExisting,
    /// The same suggestion is already stored.
    Unchanged,
    /// The key is learned; suggestions never shadow learned rules.
    RejectedLearned,
}

impl MergeOutcome {
    /// Whether the document changed.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Added | Self::Replaced { .. })
    }
}

/// Combine a fresh learning result with the stored document.
///
/// Stored suggestions are kept for keys that are still unresolved and still
/// part of the category; everything else comes from `learned`.
pub fn merge_learned(
    existing: Option<&MappingDefinition>,
    learned: MappingDefinition,
) -> MappingDefinition {
    let mut merged = learned;
    let Some(existing) = existing else {
        return merged;
    };

    let stored = existing
        .gpt_suggestions
        .iter()
        .chain(&existing.superseded_verified);
    for (key, suggestion) in stored {
        if !merged.output_keys.iter().any(|k| k == key) {
            tracing::debug!(
                "{}/{}: dropping suggestion for key no longer in training data",
                merged.category,
                key
            );
            continue;
        }
        if merged.is_learned(key) {
            if suggestion.confidence == SuggestionConfidence::Verified {
                tracing::warn!(
                    "{}/{}: verified suggestion ({} from {}) superseded by learned rule",
                    merged.category,
                    key,
                    suggestion.transform,
                    suggestion.source
                );
                merged
                    .superseded_verified
                    .insert(key.clone(), suggestion.clone());
            } else {
                tracing::info!(
                    "{}/{}: learned rule supersedes stored suggestion",
                    merged.category,
                    key
                );
            }
            continue;
        }
        merged
            .gpt_suggestions
            .entry(key.clone())
            .or_insert_with(|| suggestion.clone());
    }

    merged
}

/// Merge one suggestion for `key` into a document.
///
/// Idempotent: merging the same suggestion twice changes nothing the second
/// time. A stored `manual` answer yields to any usable suggestion of at least
/// the same confidence.
pub fn merge_suggestion(
    definition: &mut MappingDefinition,
    key: &str,
    suggestion: Suggestion,
) -> MergeOutcome {
    if definition.is_learned(key) {
        return MergeOutcome::RejectedLearned;
    }
    if !definition.output_keys.iter().any(|k| k == key) {
        definition.output_keys.push(key.to_string());
    }

    let Some(current) = definition.gpt_suggestions.get(key) else {
        definition.gpt_suggestions.insert(key.to_string(), suggestion);
        return MergeOutcome::Added;
    };

    if *current == suggestion {
        return MergeOutcome::Unchanged;
    }

    let upgrades_manual = current.is_manual()
        && !suggestion.is_manual()
        && suggestion.confidence >= current.confidence
        && current.confidence != SuggestionConfidence::Verified;

    if suggestion.confidence > current.confidence || upgrades_manual {
        let previous = current.confidence;
        definition.gpt_suggestions.insert(key.to_string(), suggestion);
        MergeOutcome::Replaced { previous }
    } else {
        MergeOutcome::KeptExisting
    }
}

//! Key resolution.
//!
//! Picks one rule per output key of a category: a constant when the key
//! never varies, otherwise the best-scoring `(source key, transform)`
//! candidate if it strictly exceeds the acceptance threshold.
//!
//! Resolution is a pure function of the pair set. Candidates are visited in
//! first-seen input key order and ties are broken by transform rank, then by
//! that order, so the same corpus always yields the same rules.

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use super::corpus::TrainingPair;
use super::evaluate::{evaluate, EvaluationSettings};
use super::mapping::TransformKind;
use super::value::scalar_text;
use crate::config::Config;

/// A scored `(output key, source key, kind)` candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRule {
    pub output_key: String,
    pub source_key: String,
    pub kind: TransformKind,
    pub score: f64,
    /// Share of the output key's occurrences where the source is present.
    pub support: f64,
}

/// Outcome for one output key.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Constant(Value),
    Rule(CandidateRule),
    /// No candidate exceeded the threshold; `best` is the strongest reject.
    Unresolved { best: Option<CandidateRule> },
}

/// Resolution plus the statistics the learner records alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyOutcome {
    pub output_key: String,
    pub resolution: Resolution,
    /// Fraction of pairs containing the output key.
    pub coverage: f64,
    /// Coverage is below the configured minimum.
    pub low_trust: bool,
    /// Other candidates with the same score as the accepted one.
    pub tied: Vec<CandidateRule>,
}

impl KeyOutcome {
    /// Score recorded in the audit trail.
    pub fn score(&self) -> f64 {
        match &self.resolution {
            Resolution::Constant(_) => 1.0,
            Resolution::Rule(rule) => rule.score,
            Resolution::Unresolved { best } => best.as_ref().map_or(0.0, |b| b.score),
        }
    }
}

/// Thresholds used during resolution.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Scores must be strictly greater to be accepted.
    pub acceptance_threshold: f64,
    pub min_key_coverage: f64,
    pub min_source_support: f64,
    pub evaluation: EvaluationSettings,
}

impl ResolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            acceptance_threshold: config.learning.acceptance_threshold,
            min_key_coverage: config.learning.min_key_coverage,
            min_source_support: config.learning.min_source_support,
            evaluation: EvaluationSettings::from_config(&config.learning, &config.translation),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Keys of a record side in first-seen order across the pairs.
fn keys_in_order<'p>(
    pairs: &'p [TrainingPair],
    side: impl Fn(&'p TrainingPair) -> &'p crate::core::Record,
) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();
    for pair in pairs {
        for key in side(pair).keys() {
            if seen.insert(key.as_str()) {
                keys.push(key.clone());
            }
        }
    }
    keys
}

/// Resolves the output keys of one category.
pub struct KeyResolver<'a> {
    pairs: &'a [TrainingPair],
    input_keys: Vec<String>,
    settings: &'a ResolverSettings,
}

impl<'a> KeyResolver<'a> {
    pub fn new(pairs: &'a [TrainingPair], settings: &'a ResolverSettings) -> Self {
        Self {
            pairs,
            input_keys: keys_in_order(pairs, |p| &p.input),
            settings,
        }
    }

    /// Output keys in first-seen order; this becomes the definition order.
    pub fn output_keys(&self) -> Vec<String> {
        keys_in_order(self.pairs, |p| &p.output)
    }

    /// Input keys in the order used for tie-breaks.
    pub fn input_keys(&self) -> &[String] {
        &self.input_keys
    }

    /// Resolve every output key, optionally in parallel.
    ///
    /// Results are in definition order either way.
    pub fn resolve_all(&self, parallel: bool) -> Vec<KeyOutcome> {
        let keys = self.output_keys();
        if parallel {
            keys.par_iter().map(|key| self.resolve_key(key)).collect()
        } else {
            keys.iter().map(|key| self.resolve_key(key)).collect()
        }
    }

    /// Resolve a single output key.
    pub fn resolve_key(&self, output_key: &str) -> KeyOutcome {
        let occurrences: Vec<&Value> = self
            .pairs
            .iter()
            .filter_map(|p| p.output.get(output_key))
            .collect();
        let coverage = if self.pairs.is_empty() {
            0.0
        } else {
            occurrences.len() as f64 / self.pairs.len() as f64
        };
        let low_trust = coverage < self.settings.min_key_coverage;

        if let Some(value) = constant_value(&occurrences) {
            tracing::debug!("{}: constant {}", output_key, value);
            return KeyOutcome {
                output_key: output_key.to_string(),
                resolution: Resolution::Constant(value),
                coverage,
                low_trust,
                tied: Vec::new(),
            };
        }

        let mut best: Option<CandidateRule> = None;
        let mut tied: Vec<CandidateRule> = Vec::new();

        for source_key in &self.input_keys {
            for kind in TransformKind::LEARNABLE {
                let eval = evaluate(
                    self.pairs,
                    output_key,
                    source_key,
                    kind,
                    &self.settings.evaluation,
                );
                if eval.considered == 0 || eval.support() < self.settings.min_source_support {
                    continue;
                }

                let candidate = CandidateRule {
                    output_key: output_key.to_string(),
                    source_key: source_key.clone(),
                    kind,
                    score: eval.score,
                    support: eval.support(),
                };

                match &best {
                    None => best = Some(candidate),
                    Some(current) if candidate.score > current.score => {
                        tied.clear();
                        best = Some(candidate);
                    }
                    Some(current) if candidate.score == current.score => {
                        if candidate.kind.rank() < current.kind.rank() {
                            let previous = std::mem::replace(&mut best, Some(candidate));
                            tied.extend(previous);
                        } else {
                            tied.push(candidate);
                        }
                    }
                    Some(_) => {}
                }
            }
        }

        let resolution = match best {
            Some(rule) if rule.score > self.settings.acceptance_threshold => {
                tracing::debug!(
                    "{}: {} from {} (score {:.3})",
                    output_key,
                    rule.kind,
                    rule.source_key,
                    rule.score
                );
                Resolution::Rule(rule)
            }
            best => {
                tied.clear();
                Resolution::Unresolved { best }
            }
        };

        KeyOutcome {
            output_key: output_key.to_string(),
            resolution,
            coverage,
            low_trust,
            tied,
        }
    }
}

/// The shared value when every occurrence is identical.
fn constant_value(occurrences: &[&Value]) -> Option<Value> {
    let (first, rest) = occurrences.split_first()?;
    let text = scalar_text(first);
    if rest.iter().all(|v| scalar_text(v) == text && v.is_null() == first.is_null()) {
        Some((*first).clone())
    } else {
        None
    }
}

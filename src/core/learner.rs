//! Category learning.
//!
//! Turns the training pairs of one category into a [`MappingDefinition`]:
//! resolve every output key, build lookup tables for `lookup` rules, and
//! collect the unresolved keys with enough context to ask for help.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use super::corpus::{PairCorpus, TrainingPair};
use super::lookup::{build_value_table, LookupConflict};
use super::mapping::{KeyAudit, KeyRule, MappingDefinition, TransformKind};
use super::resolve::{CandidateRule, KeyResolver, Resolution, ResolverSettings};
use super::value::is_blank_output;
use crate::config::Config;
use crate::error::{ProdmapError, Result};

/// Sample output values kept per unresolved key.
pub const MAX_UNRESOLVED_SAMPLES: usize = 5;

/// Context gathered for a key learning could not resolve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedKey {
    pub output_key: String,
    /// Strongest rejected candidate, if any.
    pub best: Option<CandidateRule>,
    /// Distinct example output values, in first-seen order.
    pub sample_values: Vec<Value>,
    /// Input keys present in the pairs carrying those samples.
    pub sample_input_keys: Vec<String>,
}

/// Non-fatal findings of a learning run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearningWarning {
    /// Output key present in too few pairs to trust its rule.
    LowCoverage { output_key: String, coverage: f64 },
    /// Several candidates shared the winning score.
    Ambiguous {
        chosen: CandidateRule,
        tied: Vec<CandidateRule>,
    },
    LookupConflict(LookupConflict),
    /// No candidate exceeded the acceptance threshold.
    KeyUnresolved { output_key: String, best_score: f64 },
}

/// Result of learning one category.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnedCategory {
    pub definition: MappingDefinition,
    pub unresolved: Vec<UnresolvedKey>,
    pub warnings: Vec<LearningWarning>,
    pub pair_count: usize,
}

/// Learns mapping definitions from training pairs.
pub struct Learner {
    settings: ResolverSettings,
    parallel: bool,
}

impl Learner {
    pub fn new(config: &Config) -> Self {
        Self {
            settings: ResolverSettings::from_config(config),
            parallel: config.learning.parallel,
        }
    }

    /// Learn a single category.
    ///
    /// # Errors
    ///
    /// Returns `CorruptCorpus` if the category has no pairs or no output
    /// keys.
    pub fn learn_category(
        &self,
        category: &str,
        pairs: &[TrainingPair],
    ) -> Result<LearnedCategory> {
        if pairs.is_empty() {
            return Err(ProdmapError::corrupt_corpus(category, "no training pairs"));
        }

        let resolver = KeyResolver::new(pairs, &self.settings);
        let outcomes = resolver.resolve_all(self.parallel);
        if outcomes.is_empty() {
            return Err(ProdmapError::corrupt_corpus(
                category,
                "training pairs carry no output keys",
            ));
        }

        let mut definition = MappingDefinition::new(category);
        let mut unresolved = Vec::new();
        let mut warnings = Vec::new();

        for outcome in outcomes {
            let key = outcome.output_key.clone();
            definition.output_keys.push(key.clone());
            definition.audit.insert(
                key.clone(),
                KeyAudit {
                    score: outcome.score(),
                    coverage: outcome.coverage,
                    low_trust: outcome.low_trust,
                },
            );

            let is_constant = matches!(outcome.resolution, Resolution::Constant(_));
            if outcome.low_trust && !is_constant {
                warnings.push(LearningWarning::LowCoverage {
                    output_key: key.clone(),
                    coverage: outcome.coverage,
                });
            }

            match outcome.resolution {
                Resolution::Constant(value) => {
                    definition.constants.insert(key, value);
                }
                Resolution::Rule(rule) => {
                    if rule.kind == TransformKind::Lookup {
                        let (table, conflicts) = build_value_table(
                            pairs,
                            &key,
                            &rule.source_key,
                            &self.settings.evaluation.null_tokens,
                        );
                        definition.value_map.insert(key.clone(), table);
                        warnings.extend(conflicts.into_iter().map(LearningWarning::LookupConflict));
                    }
                    if !outcome.tied.is_empty() {
                        tracing::info!(
                            "{}/{}: {} candidates tied at {:.3}, chose {} from {}",
                            category,
                            key,
                            outcome.tied.len() + 1,
                            rule.score,
                            rule.kind,
                            rule.source_key
                        );
                        warnings.push(LearningWarning::Ambiguous {
                            chosen: rule.clone(),
                            tied: outcome.tied,
                        });
                    }
                    definition
                        .key_map
                        .insert(key, KeyRule::new(rule.source_key, rule.kind));
                }
                Resolution::Unresolved { best } => {
                    let best_score = best.as_ref().map_or(0.0, |b| b.score);
                    tracing::debug!("{}/{}: unresolved (best {:.3})", category, key, best_score);
                    warnings.push(LearningWarning::KeyUnresolved {
                        output_key: key.clone(),
                        best_score,
                    });
                    unresolved.push(unresolved_context(pairs, &key, best));
                }
            }
        }

        tracing::info!(
            "Learned {}: {} rules, {} constants, {} unresolved from {} pairs",
            category,
            definition.key_map.len(),
            definition.constants.len(),
            unresolved.len(),
            pairs.len()
        );

        Ok(LearnedCategory {
            definition,
            unresolved,
            warnings,
            pair_count: pairs.len(),
        })
    }

    /// Learn every category of a corpus.
    ///
    /// A failing category never affects the others. Results are in sorted
    /// category order.
    pub fn learn_corpus(&self, corpus: &PairCorpus) -> Vec<(String, Result<LearnedCategory>)> {
        let categories: Vec<(&str, &[TrainingPair])> = corpus.iter().collect();
        let learn = |(name, pairs): &(&str, &[TrainingPair])| {
            (name.to_string(), self.learn_category(name, pairs))
        };

        if self.parallel {
            categories.par_iter().map(learn).collect()
        } else {
            categories.iter().map(learn).collect()
        }
    }
}

fn unresolved_context(
    pairs: &[TrainingPair],
    output_key: &str,
    best: Option<CandidateRule>,
) -> UnresolvedKey {
    let mut sample_values: Vec<Value> = Vec::new();
    let mut input_keys: BTreeMap<String, ()> = BTreeMap::new();

    for pair in pairs {
        if sample_values.len() >= MAX_UNRESOLVED_SAMPLES {
            break;
        }
        let Some(value) = pair.output.get(output_key).filter(|v| !is_blank_output(v)) else {
            continue;
        };
        if sample_values.contains(value) {
            continue;
        }
        sample_values.push(value.clone());
        for key in pair.input.keys() {
            input_keys.insert(key.clone(), ());
        }
    }

    UnresolvedKey {
        output_key: output_key.to_string(),
        best,
        sample_values,
        sample_input_keys: input_keys.into_keys().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vertikale_pairs() -> Vec<TrainingPair> {
        [
            (
                "SZEROKOSC=985, WYSOKOSC=1200, STER=L, UWAGI=pilne",
                "B=985, H=120, S=SL, TYP=V, NOTE=a",
            ),
            (
                "SZEROKOSC=700, WYSOKOSC=1500, STER=P, UWAGI=brak",
                "B=700, H=150, S=SP, TYP=V, NOTE=b",
            ),
            (
                "SZEROKOSC=985, WYSOKOSC=1200, STER=P, UWAGI=pilne",
                "B=985, H=120, S=SP, TYP=V, NOTE=c",
            ),
            (
                "SZEROKOSC=700, WYSOKOSC=1000, STER=L, UWAGI=brak",
                "B=700, H=100, S=SL, TYP=V, NOTE=d",
            ),
        ]
        .iter()
        .map(|(i, o)| TrainingPair::from_param_strings(i, o))
        .collect()
    }

    #[test]
    fn test_learn_category() {
        let learner = Learner::new(&Config::default());
        let learned = learner.learn_category("Vertikale", &vertikale_pairs()).unwrap();
        let def = &learned.definition;

        assert_eq!(def.output_keys, vec!["B", "H", "S", "TYP", "NOTE"]);
        assert_eq!(def.key_map["B"], KeyRule::new("SZEROKOSC", TransformKind::Copy));
        assert_eq!(def.key_map["H"], KeyRule::new("WYSOKOSC", TransformKind::Scale10));
        assert_eq!(def.key_map["S"], KeyRule::new("STER", TransformKind::Lookup));
        assert_eq!(def.constants["TYP"], json!("V"));
        assert_eq!(def.value_map["S"]["L"], json!("SL"));
        assert!(def.validate().is_ok());

        assert_eq!(learned.unresolved.len(), 1);
        let note = &learned.unresolved[0];
        assert_eq!(note.output_key, "NOTE");
        assert_eq!(note.sample_values.len(), 4);
        assert!(note.sample_input_keys.contains(&"UWAGI".to_string()));
        assert_eq!(learned.pair_count, 4);
    }

    #[test]
    fn test_learning_is_deterministic() {
        let learner = Learner::new(&Config::default());
        let a = learner.learn_category("Vertikale", &vertikale_pairs()).unwrap();
        let b = learner.learn_category("Vertikale", &vertikale_pairs()).unwrap();

        assert_eq!(
            serde_json::to_string(&a.definition).unwrap(),
            serde_json::to_string(&b.definition).unwrap()
        );
    }

    #[test]
    fn test_empty_category_is_corrupt() {
        let learner = Learner::new(&Config::default());
        let err = learner.learn_category("Plisy", &[]).unwrap_err();
        assert!(matches!(err, ProdmapError::CorruptCorpus { .. }));
    }

    #[test]
    fn test_corpus_isolates_failures() {
        let mut corpus = PairCorpus::new();
        for pair in vertikale_pairs() {
            corpus.add("Vertikale", pair);
        }
        corpus.add("Plisy", TrainingPair::new(Default::default(), Default::default()));

        let learner = Learner::new(&Config::default());
        let results = learner.learn_corpus(&corpus);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "Plisy");
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_ok());
    }

    #[test]
    fn test_unresolved_samples_are_capped() {
        let pairs: Vec<TrainingPair> = (0..10)
            .map(|i| TrainingPair::from_param_strings(&format!("A={}", i % 3), &format!("X=v{i}")))
            .collect();
        let learner = Learner::new(&Config::default());
        let learned = learner.learn_category("C", &pairs).unwrap();

        assert_eq!(learned.unresolved[0].sample_values.len(), MAX_UNRESOLVED_SAMPLES);
        assert!(learned
            .warnings
            .iter()
            .any(|w| matches!(w, LearningWarning::KeyUnresolved { .. })));
    }

    #[test]
    fn test_inconsistent_lookup_stays_unresolved() {
        let mut pairs: Vec<TrainingPair> = Vec::new();
        for _ in 0..3 {
            pairs.push(TrainingPair::from_param_strings("K=L", "S=SL"));
        }
        for _ in 0..4 {
            pairs.push(TrainingPair::from_param_strings("K=P", "S=SP"));
        }
        pairs.push(TrainingPair::from_param_strings("K=L", "S=SX"));

        let learned = Learner::new(&Config::default())
            .learn_category("C", &pairs)
            .unwrap();

        assert!(!learned.definition.key_map.contains_key("S"));
        assert!(learned.definition.value_map.is_empty());
        assert_eq!(learned.unresolved[0].output_key, "S");
    }

    #[test]
    fn test_two_pair_lookup_table() {
        let pairs = vec![
            TrainingPair::from_param_strings("K=S", "S=SS"),
            TrainingPair::from_param_strings("K=D", "S=DD"),
        ];
        let learned = Learner::new(&Config::default())
            .learn_category("C", &pairs)
            .unwrap();
        let def = &learned.definition;

        assert_eq!(def.key_map["S"], KeyRule::new("K", TransformKind::Lookup));
        assert_eq!(def.value_map["S"]["S"], json!("SS"));
        assert_eq!(def.value_map["S"]["D"], json!("DD"));
        assert!(learned.unresolved.is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn rows() -> impl Strategy<Value = Vec<(u8, u8, u8)>> {
            prop::collection::vec((0u8..4, 0u8..50, 0u8..3), 1..30)
        }

        proptest! {
            #[test]
            fn test_learning_pure_function_of_pairs(rows in rows()) {
                let pairs: Vec<TrainingPair> = rows
                    .iter()
                    .map(|(code, width, noise)| {
                        TrainingPair::from_param_strings(
                            &format!("KOD={code}, SZER={width}, N={noise}"),
                            &format!("S=s{code}, B={width}, T=x"),
                        )
                    })
                    .collect();

                let parallel = Learner::new(&Config::default());
                let mut config = Config::default();
                config.learning.parallel = false;
                let sequential = Learner::new(&config);

                let a = parallel.learn_category("C", &pairs).unwrap().definition;
                let b = sequential.learn_category("C", &pairs).unwrap().definition;
                prop_assert_eq!(
                    serde_json::to_string(&a).unwrap(),
                    serde_json::to_string(&b).unwrap()
                );
            }
        }
    }
}

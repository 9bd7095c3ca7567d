//! Transform evaluation.
//!
//! Scores how well one input key explains one output key under a given
//! transform. Only pairs where both keys are present count toward the
//! denominator; the rest are tracked so callers can judge coverage.

use std::collections::HashMap;

use super::corpus::TrainingPair;
use super::mapping::TransformKind;
use super::value::{is_absent_input, is_blank_output, numeric, scalar_text};
use crate::config::{LearningConfig, TranslationConfig};

/// Knobs shared by every evaluation of a learning run.
#[derive(Debug, Clone)]
pub struct EvaluationSettings {
    /// Maximum `|input / 10 - output|` accepted by `scale10`.
    pub scale_tolerance: f64,
    /// Lookups whose distinct-input ratio exceeds this score zero. `1.0`
    /// never rejects.
    pub max_lookup_cardinality: f64,
    /// Input values that count as absent.
    pub null_tokens: Vec<String>,
}

impl EvaluationSettings {
    pub fn from_config(learning: &LearningConfig, translation: &TranslationConfig) -> Self {
        Self {
            scale_tolerance: learning.scale_tolerance,
            max_lookup_cardinality: learning.max_lookup_cardinality,
            null_tokens: translation.null_tokens.clone(),
        }
    }
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self::from_config(&LearningConfig::default(), &TranslationConfig::default())
    }
}

/// Result of scoring one `(output key, source key, kind)` triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub kind: TransformKind,
    /// Fraction of considered pairs satisfying the rule, in `[0, 1]`.
    pub score: f64,
    /// Pairs satisfying the rule.
    pub matched: usize,
    /// Pairs where both keys are present.
    pub considered: usize,
    /// Pairs where the output key is present.
    pub output_present: usize,
    /// All pairs of the category.
    pub total: usize,
}

impl Evaluation {
    /// Share of the output key's occurrences backed by the source key.
    pub fn support(&self) -> f64 {
        ratio(self.considered, self.output_present)
    }

    /// Share of pairs carrying the output key.
    pub fn coverage(&self) -> f64 {
        ratio(self.output_present, self.total)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Score `kind` as the rule producing `output_key` from `source_key`.
///
/// Side-effect free. `Constant` and `Manual` are not evaluated here and
/// always score zero.
pub fn evaluate(
    pairs: &[TrainingPair],
    output_key: &str,
    source_key: &str,
    kind: TransformKind,
    settings: &EvaluationSettings,
) -> Evaluation {
    let mut output_present = 0;
    let mut considered: Vec<(&serde_json::Value, &serde_json::Value)> = Vec::new();

    for pair in pairs {
        let Some(output) = pair.output.get(output_key).filter(|v| !is_blank_output(v)) else {
            continue;
        };
        output_present += 1;

        if let Some(input) = pair
            .input
            .get(source_key)
            .filter(|v| !is_absent_input(v, &settings.null_tokens))
        {
            considered.push((input, output));
        }
    }

    let matched = match kind {
        TransformKind::Copy => considered
            .iter()
            .filter(|(input, output)| scalar_text(input) == scalar_text(output))
            .count(),
        TransformKind::Scale10 => considered
            .iter()
            .filter(|(input, output)| {
                matches!(
                    (numeric(input), numeric(output)),
                    (Some(i), Some(o)) if (i / 10.0 - o).abs() <= settings.scale_tolerance
                )
            })
            .count(),
        TransformKind::Lookup => lookup_matches(&considered, settings.max_lookup_cardinality),
        TransformKind::Constant | TransformKind::Manual => 0,
    };

    Evaluation {
        kind,
        score: ratio(matched, considered.len()),
        matched,
        considered: considered.len(),
        output_present,
        total: pairs.len(),
    }
}

/// Count pairs explained by a `source value -> output value` table.
///
/// A lookup holds only if every input value always yields the same output;
/// a single disagreement scores the whole candidate zero. With a cardinality
/// cap below `1.0`, inputs with too many distinct values also score zero.
fn lookup_matches(
    considered: &[(&serde_json::Value, &serde_json::Value)],
    max_cardinality: f64,
) -> usize {
    if considered.is_empty() {
        return 0;
    }

    let mut table: HashMap<String, String> = HashMap::new();
    for (input, output) in considered {
        let input = scalar_text(input).unwrap_or_default();
        let output = scalar_text(output).unwrap_or_default();
        match table.get(&input) {
            Some(seen) if *seen != output => return 0,
            Some(_) => {}
            None => {
                table.insert(input, output);
            }
        }
    }

    if ratio(table.len(), considered.len()) > max_cardinality {
        return 0;
    }

    considered.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(rows: &[(&str, &str)]) -> Vec<TrainingPair> {
        rows.iter()
            .map(|(i, o)| TrainingPair::from_param_strings(i, o))
            .collect()
    }

    #[test]
    fn test_copy_exact_match() {
        let p = pairs(&[
            ("SZEROKOSC=985", "B=985"),
            ("SZEROKOSC=1200", "B=1200"),
            ("SZEROKOSC=700", "B=700"),
        ]);
        let eval = evaluate(
            &p,
            "B",
            "SZEROKOSC",
            TransformKind::Copy,
            &EvaluationSettings::default(),
        );

        assert_eq!(eval.score, 1.0);
        assert_eq!(eval.matched, 3);
        assert_eq!(eval.considered, 3);
    }

    #[test]
    fn test_copy_compares_canonical_text() {
        let mut input = crate::core::Record::new();
        input.insert("SZEROKOSC".into(), serde_json::json!(985.0));
        let mut output = crate::core::Record::new();
        output.insert("B".into(), serde_json::json!("985"));
        let p = vec![TrainingPair::new(input, output)];

        let eval = evaluate(
            &p,
            "B",
            "SZEROKOSC",
            TransformKind::Copy,
            &EvaluationSettings::default(),
        );
        assert_eq!(eval.score, 1.0);
    }

    #[test]
    fn test_scale10() {
        let p = pairs(&[("SZEROKOSC=985", "B=98.5"), ("SZEROKOSC=1200", "B=120")]);
        let settings = EvaluationSettings::default();

        let eval = evaluate(&p, "B", "SZEROKOSC", TransformKind::Scale10, &settings);
        assert_eq!(eval.score, 1.0);

        let copy = evaluate(&p, "B", "SZEROKOSC", TransformKind::Copy, &settings);
        assert_eq!(copy.score, 0.0);
    }

    #[test]
    fn test_scale10_non_numeric_counts_as_mismatch() {
        let p = pairs(&[("SZEROKOSC=abc", "B=98.5"), ("SZEROKOSC=985", "B=98.5")]);
        let eval = evaluate(
            &p,
            "B",
            "SZEROKOSC",
            TransformKind::Scale10,
            &EvaluationSettings::default(),
        );

        assert_eq!(eval.considered, 2);
        assert_eq!(eval.matched, 1);
        assert_eq!(eval.score, 0.5);
    }

    #[test]
    fn test_missing_keys_excluded_from_denominator() {
        let p = pairs(&[
            ("SZEROKOSC=985", "B=985"),
            ("WYSOKOSC=1", "B=7"),
            ("SZEROKOSC=<NULL>", "B=8"),
            ("SZEROKOSC=5", "B=-"),
            ("SZEROKOSC=5", "X=1"),
        ]);
        let eval = evaluate(
            &p,
            "B",
            "SZEROKOSC",
            TransformKind::Copy,
            &EvaluationSettings::default(),
        );

        assert_eq!(eval.total, 5);
        assert_eq!(eval.output_present, 3);
        assert_eq!(eval.considered, 1);
        assert_eq!(eval.score, 1.0);
        assert!((eval.support() - 1.0 / 3.0).abs() < 1e-12);
        assert!((eval.coverage() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_lookup_consistent_table() {
        let p = pairs(&[
            ("STEROWANIE=L", "S=SL"),
            ("STEROWANIE=P", "S=SP"),
            ("STEROWANIE=L", "S=SL"),
            ("STEROWANIE=<NULL>", "S=SX"),
        ]);
        let eval = evaluate(
            &p,
            "S",
            "STEROWANIE",
            TransformKind::Lookup,
            &EvaluationSettings::default(),
        );

        assert_eq!(eval.matched, 3);
        assert_eq!(eval.considered, 3);
        assert_eq!(eval.score, 1.0);
    }

    #[test]
    fn test_lookup_single_disagreement_scores_zero() {
        // Three L -> SL, then one L -> SX: the table is not a function.
        let p = pairs(&[
            ("STEROWANIE=L", "S=SL"),
            ("STEROWANIE=P", "S=SP"),
            ("STEROWANIE=L", "S=SL"),
            ("STEROWANIE=P", "S=SP"),
            ("STEROWANIE=L", "S=SL"),
            ("STEROWANIE=P", "S=SP"),
            ("STEROWANIE=P", "S=SP"),
            ("STEROWANIE=L", "S=SX"),
        ]);
        let eval = evaluate(
            &p,
            "S",
            "STEROWANIE",
            TransformKind::Lookup,
            &EvaluationSettings::default(),
        );

        assert_eq!(eval.considered, 8);
        assert_eq!(eval.matched, 0);
        assert_eq!(eval.score, 0.0);
    }

    #[test]
    fn test_lookup_two_pairs_two_values() {
        let p = pairs(&[("STEROWANIE=S", "S=SS"), ("STEROWANIE=D", "S=DD")]);
        let eval = evaluate(
            &p,
            "S",
            "STEROWANIE",
            TransformKind::Lookup,
            &EvaluationSettings::default(),
        );

        assert_eq!(eval.score, 1.0);
    }

    #[test]
    fn test_lookup_cardinality_cap_is_opt_in() {
        let p = pairs(&[
            ("ID=1", "S=A"),
            ("ID=2", "S=B"),
            ("ID=3", "S=A"),
            ("ID=4", "S=C"),
        ]);
        let default = evaluate(
            &p,
            "S",
            "ID",
            TransformKind::Lookup,
            &EvaluationSettings::default(),
        );
        assert_eq!(default.score, 1.0);

        let capped = EvaluationSettings {
            max_lookup_cardinality: 0.5,
            ..EvaluationSettings::default()
        };
        let eval = evaluate(&p, "S", "ID", TransformKind::Lookup, &capped);
        assert_eq!(eval.score, 0.0);
    }

    #[test]
    fn test_no_overlap_scores_zero() {
        let p = pairs(&[("A=1", "B=1")]);
        let eval = evaluate(
            &p,
            "B",
            "MISSING",
            TransformKind::Copy,
            &EvaluationSettings::default(),
        );

        assert_eq!(eval.considered, 0);
        assert_eq!(eval.score, 0.0);
    }
}

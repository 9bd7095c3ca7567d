//! Value lookup tables for `lookup` rules.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::corpus::TrainingPair;
use super::value::{is_absent_input, is_blank_output, scalar_text};

/// Two training pairs disagree on the output for the same source value.
///
/// The later pair wins; the conflict is a data-quality warning only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupConflict {
    pub output_key: String,
    pub source_value: String,
    pub previous: Value,
    pub replacement: Value,
}

/// Build the `source value -> output value` table for one lookup key.
///
/// Tables are keyed by canonical source text and only cover values seen in
/// training.
pub fn build_value_table(
    pairs: &[TrainingPair],
    output_key: &str,
    source_key: &str,
    null_tokens: &[String],
) -> (BTreeMap<String, Value>, Vec<LookupConflict>) {
    let mut table: BTreeMap<String, Value> = BTreeMap::new();
    let mut conflicts = Vec::new();

    for pair in pairs {
        let Some(output) = pair.output.get(output_key).filter(|v| !is_blank_output(v)) else {
            continue;
        };
        let Some(source) = pair
            .input
            .get(source_key)
            .filter(|v| !is_absent_input(v, null_tokens))
            .and_then(scalar_text)
        else {
            continue;
        };

        if let Some(previous) = table.insert(source.clone(), output.clone()) {
            if scalar_text(&previous) != scalar_text(output) {
                tracing::warn!(
                    "Lookup conflict for {}: '{}' maps to both {} and {}; keeping the later value",
                    output_key,
                    source,
                    previous,
                    output
                );
                conflicts.push(LookupConflict {
                    output_key: output_key.to_string(),
                    source_value: source,
                    previous,
                    replacement: output.clone(),
                });
            }
        }
    }

    (table, conflicts)
}

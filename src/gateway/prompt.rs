//! Prompt text for language-model gateways.
//!
//! The `openai` gateway sends these prompts directly; the `command` gateway
//! includes them in its request envelope so a wrapper script can forward
//! them to any model.

use super::traits::{CategorySuggestionRequest, KeySuggestionRequest, MappingProposalRequest};

/// System prompt shared by all requests.
pub const SYSTEM_PROMPT: &str = "You map order-capture parameters (EFOR) to production \
parameters (PROD) for window blinds. Answer with a single JSON object and nothing else. \
Do not wrap the answer in markdown or code fences.";

/// Prompt asking for a rule for one unresolved output key.
pub fn key_mapping_prompt(request: &KeySuggestionRequest) -> String {
    let known_rules = request
        .known_rules
        .iter()
        .map(|(key, rule)| format!("  {key} <- {} ({})", rule.source, rule.transform))
        .collect::<Vec<_>>()
        .join("\n");
    let constants = request
        .constants
        .iter()
        .map(|(key, value)| format!("  {key} = {value}"))
        .collect::<Vec<_>>()
        .join("\n");
    let samples = request
        .sample_values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Category: {category}\n\
         Unresolved PROD field: {key}\n\
         Example values of {key}: [{samples}]\n\
         EFOR fields available: [{inputs}]\n\
         Already mapped fields:\n{known_rules}\n\
         Constant fields:\n{constants}\n\n\
         Which EFOR field produces {key}, and how? Reply with:\n\
         {{\"source\": \"<EFOR field or manual>\", \
         \"transform\": \"copy|scale10|lookup|manual\", \
         \"value_map\": {{\"<EFOR value>\": \"<PROD value>\"}} (lookup only), \
         \"description\": \"<what the field means>\", \
         \"confidence\": \"high|medium|low\", \
         \"rationale\": \"<one sentence>\"}}\n\
         Use \"manual\" when no EFOR field carries this information.",
        category = request.category,
        key = request.output_key,
        samples = samples,
        inputs = request.sample_input_keys.join(", "),
        known_rules = known_rules,
        constants = constants,
    )
}

/// Prompt asking which known category a record belongs to.
pub fn category_prompt(request: &CategorySuggestionRequest) -> String {
    format!(
        "Product label: {label}\n\
         Product description: {secondary}\n\
         Known categories: [{known}]\n\n\
         Which known category does this product belong to? Reply with \
         {{\"category\": \"<one of the known categories>\"}} or {{\"category\": null}} \
         if none fits.",
        label = request.label,
        secondary = request.secondary.as_deref().unwrap_or("-"),
        known = request.known_categories.join(", "),
    )
}

/// Prompt asking for a whole mapping for a category without training data.
pub fn mapping_proposal_prompt(request: &MappingProposalRequest) -> String {
    let parameters = request
        .parameters
        .iter()
        .map(|(key, value)| format!("  {key} = {value}"))
        .collect::<Vec<_>>()
        .join("\n");
    let example = match &request.example_category {
        Some(category) => {
            let rules = request
                .example_rules
                .iter()
                .map(|(key, rule)| format!("  {key} <- {} ({})", rule.source, rule.transform))
                .collect::<Vec<_>>()
                .join("\n");
            format!("Example mapping for {category}:\n{rules}\n")
        }
        None => String::new(),
    };

    format!(
        "Category: {category}\n\
         EFOR parameters:\n{parameters}\n\
         {example}\n\
         For each PROD field this product needs, name the EFOR field that produces it \
         and how. Reply with:\n\
         {{\"key_map\": {{\"<PROD field>\": {{\"source\": \"<EFOR field>\", \
         \"transform\": \"copy|scale10|lookup\", \"confidence\": \"high|medium|low\"}}}}, \
         \"value_map\": {{\"<PROD field>\": {{\"<EFOR value>\": \"<PROD value>\"}}}}, \
         \"constants\": {{\"<PROD field>\": <value>}}}}\n\
         Common patterns: SZEROKOSC -> B (scale10), WYSOKOSC -> H (scale10), \
         KOLOR -> KOLOR (copy), MODEL -> MODEL (copy).",
        category = request.category,
        parameters = parameters,
        example = example,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{KeyRule, TransformKind};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_key_mapping_prompt_includes_context() {
        let request = KeySuggestionRequest {
            category: "Vertikale".into(),
            output_key: "S".into(),
            known_rules: BTreeMap::from([(
                "B".to_string(),
                KeyRule::new("SZEROKOSC", TransformKind::Copy),
            )]),
            constants: BTreeMap::from([("TYP".to_string(), json!("V"))]),
            sample_values: vec![json!("SL"), json!("SP")],
            sample_input_keys: vec!["STEROWANIE".into(), "SZEROKOSC".into()],
        };

        let prompt = key_mapping_prompt(&request);
        assert!(prompt.contains("Category: Vertikale"));
        assert!(prompt.contains("Unresolved PROD field: S"));
        assert!(prompt.contains("[\"SL\", \"SP\"]"));
        assert!(prompt.contains("STEROWANIE, SZEROKOSC"));
        assert!(prompt.contains("B <- SZEROKOSC (copy)"));
        assert!(prompt.contains("TYP = \"V\""));
    }

    #[test]
    fn test_category_prompt() {
        let request = CategorySuggestionRequest {
            label: "Markiza".into(),
            secondary: None,
            known_categories: vec!["Plisy".into(), "Vertikale".into()],
        };

        let prompt = category_prompt(&request);
        assert!(prompt.contains("Product label: Markiza"));
        assert!(prompt.contains("Product description: -"));
        assert!(prompt.contains("[Plisy, Vertikale]"));
    }

    #[test]
    fn test_mapping_proposal_prompt() {
        let request = MappingProposalRequest {
            category: "Markiza".into(),
            parameters: json!({"SZEROKOSC": 3000, "KOLOR": "szary"})
                .as_object()
                .cloned()
                .unwrap(),
            example_category: Some("Vertikale".into()),
            example_rules: BTreeMap::from([(
                "B".to_string(),
                KeyRule::new("SZEROKOSC", TransformKind::Scale10),
            )]),
        };

        let prompt = mapping_proposal_prompt(&request);
        assert!(prompt.contains("Category: Markiza"));
        assert!(prompt.contains("SZEROKOSC = 3000"));
        assert!(prompt.contains("KOLOR = \"szary\""));
        assert!(prompt.contains("Example mapping for Vertikale:\n  B <- SZEROKOSC (scale10)"));
        assert!(prompt.contains("\"key_map\""));

        let bare = MappingProposalRequest {
            example_category: None,
            example_rules: BTreeMap::new(),
            ..request
        };
        assert!(!mapping_proposal_prompt(&bare).contains("Example mapping"));
    }
}

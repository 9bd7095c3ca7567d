//! Mappings command for prodmap.
//!
//! Lists the stored mapping definitions, or shows one in full.

use serde::Serialize;

use crate::core::{MappingDefinition, MappingSummary};
use crate::storage::MappingStore;

/// Options for the mappings command.
#[derive(Debug, Clone, Default)]
pub struct MappingsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Show the full definition of this category instead of the listing.
    pub category: Option<String>,
}

/// Output format for the mappings command.
#[derive(Debug, Clone, Serialize)]
pub struct MappingsOutput {
    /// Whether the store could be read.
    pub success: bool,
    /// Number of mappings listed.
    pub count: usize,
    /// One summary per stored mapping.
    pub mappings: Vec<MappingSummary>,
    /// The full definition, when a single category was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<MappingDefinition>,
    /// Error message if the store could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MappingsOutput {
    /// Create a successful listing.
    pub fn success(mappings: Vec<MappingSummary>) -> Self {
        Self {
            success: true,
            count: mappings.len(),
            mappings,
            definition: None,
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            mappings: Vec::new(),
            definition: None,
            error: Some(error.into()),
        }
    }
}

/// The mappings command implementation.
pub struct MappingsCommand<S: MappingStore> {
    store: S,
}

impl<S: MappingStore> MappingsCommand<S> {
    /// Create a new mappings command.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Run the mappings command.
    pub fn run(&self, options: &MappingsOptions) -> MappingsOutput {
        if let Some(category) = &options.category {
            return match self.store.get(category) {
                Ok(Some(definition)) => {
                    let mut output = MappingsOutput::success(vec![definition.summary()]);
                    output.definition = Some(definition);
                    output
                }
                Ok(None) => MappingsOutput::failure(format!("no mapping for '{category}'")),
                Err(e) => MappingsOutput::failure(e.to_string()),
            };
        }

        match self.store.list() {
            Ok(definitions) => MappingsOutput::success(
                definitions.iter().map(MappingDefinition::summary).collect(),
            ),
            Err(e) => MappingsOutput::failure(e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &MappingsOutput, options: &MappingsOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &MappingsOutput) -> String {
        if !output.success {
            return format!(
                "Listing failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        if output.mappings.is_empty() {
            return "No mappings found.\n".to_string();
        }

        let mut lines = vec![format!("Found {} mapping(s):\n", output.count)];
        for summary in &output.mappings {
            let rules: Vec<String> = summary
                .rules_by_kind
                .iter()
                .map(|(kind, count)| format!("{count} {kind}"))
                .collect();
            lines.push(format!(
                "{}{} ({} keys): {}; {} constants, {} lookup entries",
                summary.category,
                if summary.proposed {
                    " (proposed, pending review)"
                } else {
                    ""
                },
                summary.output_keys,
                if rules.is_empty() {
                    "no rules".to_string()
                } else {
                    rules.join(", ")
                },
                summary.constants,
                summary.lookup_entries
            ));
            for suggestion in &summary.suggestions {
                lines.push(format!(
                    "   {} <- {} ({}, {})",
                    suggestion.key, suggestion.source, suggestion.transform, suggestion.confidence
                ));
            }
            if !summary.pending.is_empty() {
                lines.push(format!("   Pending: {}", summary.pending.join(", ")));
            }
        }

        if let Some(definition) = &output.definition {
            lines.push(String::new());
            lines.push(
                serde_json::to_string_pretty(definition).unwrap_or_else(|_| "{}".to_string()),
            );
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{KeyRule, Suggestion, SuggestionConfidence, TransformKind};
    use crate::storage::MemoryMappingStore;
    use serde_json::json;

    fn store() -> MemoryMappingStore {
        let store = MemoryMappingStore::new();

        let mut def = MappingDefinition::new("Vertikale");
        def.output_keys = vec!["B".into(), "TYP".into(), "UWAGI".into(), "KOLOR".into()];
        def.key_map
            .insert("B".into(), KeyRule::new("SZEROKOSC", TransformKind::Copy));
        def.constants.insert("TYP".into(), json!("V"));
        def.gpt_suggestions.insert(
            "UWAGI".into(),
            Suggestion {
                source: "UWAGI_KLIENTA".into(),
                transform: TransformKind::Copy,
                value_map: None,
                description: String::new(),
                confidence: SuggestionConfidence::High,
                rationale: String::new(),
            },
        );
        store.put(&def).unwrap();
        store.put(&MappingDefinition::new("Plisy")).unwrap();

        let mut proposed = MappingDefinition::new("Markiza");
        proposed.output_keys = vec!["B".into()];
        proposed
            .gpt_suggestions
            .insert("B".into(), Suggestion::manual("no source"));
        proposed.proposed = true;
        store.put(&proposed).unwrap();
        store
    }

    #[test]
    fn test_list_mappings() {
        let cmd = MappingsCommand::new(store());
        let output = cmd.run(&MappingsOptions::default());

        assert!(output.success);
        assert_eq!(output.count, 3);
        assert_eq!(output.mappings[0].category, "Markiza");
        assert!(output.mappings[0].proposed);
        assert_eq!(output.mappings[1].category, "Plisy");
        assert!(!output.mappings[1].proposed);
        assert_eq!(output.mappings[2].pending, vec!["KOLOR"]);
        assert!(output.definition.is_none());
    }

    #[test]
    fn test_show_one_mapping() {
        let cmd = MappingsCommand::new(store());
        let options = MappingsOptions {
            category: Some("Vertikale".into()),
            ..Default::default()
        };

        let output = cmd.run(&options);
        assert_eq!(output.count, 1);
        assert_eq!(output.definition.unwrap().key_map.len(), 1);
    }

    #[test]
    fn test_show_missing_mapping() {
        let cmd = MappingsCommand::new(store());
        let options = MappingsOptions {
            category: Some("Roleta".into()),
            ..Default::default()
        };

        let output = cmd.run(&options);
        assert!(!output.success);
        assert_eq!(output.error.as_deref(), Some("no mapping for 'Roleta'"));
    }

    #[test]
    fn test_format_human_readable() {
        let cmd = MappingsCommand::new(store());
        let options = MappingsOptions::default();
        let text = cmd.format_output(&cmd.run(&options), &options);

        assert!(text.contains("Found 3 mapping(s)"));
        assert!(text.contains("Markiza (proposed, pending review) (1 keys): no rules"));
        assert!(text.contains("Vertikale (4 keys): 1 copy; 1 constants, 0 lookup entries"));
        assert!(text.contains("UWAGI <- UWAGI_KLIENTA (copy, high)"));
        assert!(text.contains("Pending: KOLOR"));
        assert!(text.contains("Plisy (0 keys): no rules"));
    }

    #[test]
    fn test_empty_store() {
        let cmd = MappingsCommand::new(MemoryMappingStore::new());
        let options = MappingsOptions::default();
        let text = cmd.format_output(&cmd.run(&options), &options);
        assert_eq!(text, "No mappings found.\n");
    }
}

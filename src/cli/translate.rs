//! Translate command for prodmap.
//!
//! Translates an order document into PROD parameters using the stored
//! mappings, optionally writing the output table to a file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use crate::core::Provenance;
use crate::error::{ProdmapError, Result};
use crate::pipeline::{Engine, ItemOutcome, Order, OrderReport};
use crate::storage::MappingStore;

/// Options for the translate command.
#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Write the output table to this file.
    pub out: Option<PathBuf>,
}

/// Output format for the translate command.
#[derive(Debug, Clone, Serialize)]
pub struct TranslateOutput {
    /// Whether the order could be processed.
    pub success: bool,
    /// Number of translated items.
    pub translated: usize,
    /// Number of skipped items.
    pub skipped: usize,
    /// Output keys that need review in at least one item.
    pub review_keys: Vec<String>,
    /// Per-item outcomes.
    #[serde(flatten)]
    pub report: OrderReport,
    /// Where the output table was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written: Option<PathBuf>,
    /// Error message if the order could not be processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranslateOutput {
    /// Create a successful output.
    pub fn success(report: OrderReport) -> Self {
        Self {
            success: true,
            translated: report.items.len() - report.skipped_count(),
            skipped: report.skipped_count(),
            review_keys: report.review_keys().into_iter().collect(),
            report,
            written: None,
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            translated: 0,
            skipped: 0,
            review_keys: Vec::new(),
            report: OrderReport::default(),
            written: None,
            error: Some(error.into()),
        }
    }

    /// Whether some items were skipped.
    pub fn is_partial(&self) -> bool {
        self.success && self.skipped > 0
    }
}

/// The translate command implementation.
pub struct TranslateCommand<S: MappingStore> {
    engine: Engine<S>,
}

impl<S: MappingStore> TranslateCommand<S> {
    /// Create a new translate command.
    pub fn new(engine: Engine<S>) -> Self {
        Self { engine }
    }

    /// Run the translate command on an order file.
    pub fn run(&self, order_path: &Path, options: &TranslateOptions) -> TranslateOutput {
        let order = match Order::load_json(order_path) {
            Ok(order) => order,
            Err(e) => return TranslateOutput::failure(e.to_string()),
        };

        let report = match self.engine.translate_order(&order) {
            Ok(report) => report,
            Err(e) => return TranslateOutput::failure(e.to_string()),
        };

        let mut output = TranslateOutput::success(report);
        if let Some(out) = &options.out {
            match write_table(&output.report, out) {
                Ok(()) => output.written = Some(out.clone()),
                Err(e) => {
                    output.success = false;
                    output.error = Some(e.to_string());
                }
            }
        }
        output
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &TranslateOutput, options: &TranslateOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &TranslateOutput) -> String {
        if !output.success {
            return format!(
                "Translation failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let mut lines = Vec::new();
        for item in &output.report.items {
            match item {
                ItemOutcome::Translated {
                    index,
                    category,
                    result,
                } => {
                    lines.push(format!(
                        "#{} {} [{} via {}]",
                        index + 1,
                        category.category,
                        result.fields.len(),
                        category.step
                    ));
                    for field in &result.fields {
                        let marker = match field.provenance {
                            Provenance::Learned => "",
                            Provenance::Suggested => "  (suggested)",
                            Provenance::Manual => "  (manual)",
                        };
                        lines.push(format!("   {} = {}{}", field.key, field.value, marker));
                    }
                    for (key, issue) in result.issues() {
                        lines.push(format!("   ! {key}: {issue}"));
                    }
                }
                ItemOutcome::Skipped {
                    index,
                    label,
                    reason,
                } => lines.push(format!("#{} skipped '{}': {}", index + 1, label, reason)),
            }
        }

        lines.push(format!(
            "\n{} translated, {} skipped",
            output.translated, output.skipped
        ));
        if !output.review_keys.is_empty() {
            lines.push(format!("Review: {}", output.review_keys.join(", ")));
        }
        if let Some(path) = &output.written {
            lines.push(format!("Written to {}", path.display()));
        }
        lines.join("\n")
    }
}

/// Write the output table as JSON: columns, one row per translated item,
/// and the keys needing review.
fn write_table(report: &OrderReport, path: &Path) -> Result<()> {
    let table = json!({
        "columns": report.columns(),
        "rows": report.rows(),
        "review_keys": report.review_keys(),
    });
    let mut content = serde_json::to_string_pretty(&table)?;
    content.push('\n');
    fs::write(path, content).map_err(|e| ProdmapError::storage(path, e))
}

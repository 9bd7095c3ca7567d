//! Learn command for prodmap.
//!
//! Learns mapping definitions from a corpus file and stores them.

use std::path::Path;

use serde::Serialize;

use crate::core::PairCorpus;
use crate::pipeline::{CategoryReport, Engine, LearnReport};
use crate::storage::MappingStore;

/// Options for the learn command.
#[derive(Debug, Clone, Default)]
pub struct LearnOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the learn command.
#[derive(Debug, Clone, Serialize)]
pub struct LearnOutput {
    /// Whether the corpus could be read.
    pub success: bool,
    /// The learning report.
    #[serde(flatten)]
    pub report: LearnReport,
    /// Error message if the corpus could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LearnOutput {
    /// Create a successful output.
    pub fn success(report: LearnReport) -> Self {
        Self {
            success: true,
            report,
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            report: LearnReport::default(),
            error: Some(error.into()),
        }
    }

    /// Whether some categories failed.
    pub fn is_partial(&self) -> bool {
        self.success && self.report.failed() > 0
    }
}

/// The learn command implementation.
pub struct LearnCommand<S: MappingStore> {
    engine: Engine<S>,
}

impl<S: MappingStore> LearnCommand<S> {
    /// Create a new learn command.
    pub fn new(engine: Engine<S>) -> Self {
        Self { engine }
    }

    /// Run the learn command on a corpus file.
    pub fn run(&self, corpus_path: &Path, _options: &LearnOptions) -> LearnOutput {
        let (corpus, stats) = match PairCorpus::load_json(corpus_path) {
            Ok(loaded) => loaded,
            Err(e) => return LearnOutput::failure(e.to_string()),
        };

        if corpus.is_empty() {
            return LearnOutput::failure(format!(
                "{}: no usable training rows",
                corpus_path.display()
            ));
        }

        tracing::info!(
            "Learning {} categories from {} pairs ({} rows skipped)",
            corpus.len(),
            stats.loaded,
            stats.skipped
        );

        let mut report = self.engine.learn(&corpus);
        report.corpus = Some(stats);
        LearnOutput::success(report)
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &LearnOutput, options: &LearnOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &LearnOutput) -> String {
        if !output.success {
            return format!(
                "Learning failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let mut lines = Vec::new();
        if let Some(stats) = &output.report.corpus {
            lines.push(format!(
                "Corpus: {} rows, {} pairs loaded, {} skipped\n",
                stats.rows, stats.loaded, stats.skipped
            ));
        }

        for category in &output.report.categories {
            lines.push(format_category(category));
        }

        lines.push(format!(
            "\n{} learned, {} failed",
            output.report.succeeded(),
            output.report.failed()
        ));
        lines.join("\n")
    }
}

fn format_category(report: &CategoryReport) -> String {
    if let Some(error) = &report.error {
        return format!("✗ {}: {}", report.category, error);
    }

    let mut line = format!(
        "✓ {} ({} pairs): {} rules, {} constants, {} lookups",
        report.category, report.pairs, report.rules, report.constants, report.lookups
    );
    if report.suggested > 0 {
        line.push_str(&format!(", {} suggested", report.suggested));
    }
    if !report.manual.is_empty() {
        line.push_str(&format!("\n   Manual: {}", report.manual.join(", ")));
    }
    if !report.warnings.is_empty() {
        line.push_str(&format!("\n   Warnings: {}", report.warnings.len()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gateway::DisabledGateway;
    use crate::storage::MemoryMappingStore;
    use std::fs;
    use tempfile::TempDir;

    fn command() -> LearnCommand<MemoryMappingStore> {
        LearnCommand::new(Engine::new(
            Config::default(),
            MemoryMappingStore::new(),
            Box::new(DisabledGateway),
        ))
    }

    fn write_corpus(temp: &TempDir) -> std::path::PathBuf {
        let path = temp.path().join("corpus.json");
        fs::write(
            &path,
            r#"[
                {"category": "Vertikale", "input": "SZEROKOSC=985, STER=L", "output": "B=985, S=SL, TYP=V"},
                {"category": "Vertikale", "input": "SZEROKOSC=700, STER=P", "output": "B=700, S=SP, TYP=V"},
                {"category": "Vertikale", "input": "SZEROKOSC=985, STER=L", "output": "B=985, S=SL, TYP=V"},
                {"category": "Vertikale", "input": "SZEROKOSC=700, STER=P", "output": "B=700, S=SP, TYP=V"},
                {"category": "", "input": "A=1", "output": "B=1"}
            ]"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_learn_from_file() {
        let temp = TempDir::new().unwrap();
        let path = write_corpus(&temp);
        let cmd = command();

        let output = cmd.run(&path, &LearnOptions::default());

        assert!(output.success);
        assert!(!output.is_partial());
        let stats = output.report.corpus.as_ref().unwrap();
        assert_eq!(stats.loaded, 4);
        assert_eq!(stats.skipped, 1);
        assert_eq!(output.report.categories[0].rules, 2);
        assert_eq!(output.report.categories[0].constants, 1);
        assert!(cmd.engine.store().exists("Vertikale").unwrap());
    }

    #[test]
    fn test_learn_missing_file() {
        let temp = TempDir::new().unwrap();
        let output = command().run(&temp.path().join("missing.json"), &LearnOptions::default());

        assert!(!output.success);
        assert!(output.error.is_some());
    }

    #[test]
    fn test_learn_empty_corpus() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.json");
        fs::write(&path, "[]").unwrap();

        let output = command().run(&path, &LearnOptions::default());
        assert!(!output.success);
    }

    #[test]
    fn test_format_output() {
        let temp = TempDir::new().unwrap();
        let path = write_corpus(&temp);
        let cmd = command();
        let output = cmd.run(&path, &LearnOptions::default());

        let quiet = LearnOptions {
            quiet: true,
            ..Default::default()
        };
        assert!(cmd.format_output(&output, &quiet).is_empty());

        let json = LearnOptions {
            json: true,
            ..Default::default()
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&cmd.format_output(&output, &json)).unwrap();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["categories"][0]["category"], "Vertikale");

        let text = cmd.format_output(&output, &LearnOptions::default());
        assert!(text.contains("✓ Vertikale (4 pairs)"));
        assert!(text.contains("1 learned, 0 failed"));
    }
}

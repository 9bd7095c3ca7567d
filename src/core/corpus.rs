//! Training pair corpus.
//!
//! A corpus groups `(input, output)` record pairs by category. Training sets
//! of different categories never overlap: a pair is filed under exactly one
//! category label and is immutable once loaded.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::flatten::flatten_parameters;
use super::value::Record;
use crate::error::{ProdmapError, Result};
use crate::util::read_to_string_limited;

/// Parse a `KEY=VAL, KEY=VAL` parameter string.
///
/// Fragments are split on commas, then on the first `=`; both sides are
/// trimmed. Fragments without `=` or with an empty key are ignored. Values
/// are kept as strings.
pub fn parse_param_string(params: &str) -> Record {
    let mut record = Record::new();
    for fragment in params.split(',') {
        let Some((key, value)) = fragment.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        record.insert(key.to_string(), Value::String(value.trim().to_string()));
    }
    record
}

/// One paired example: an EFOR input record and its PROD output record.
///
/// The input side is stored flattened, so learning sees the same keys the
/// translator will see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPair {
    /// Flattened input record.
    pub input: Record,
    /// Output record.
    pub output: Record,
}

impl TrainingPair {
    /// Create a pair, flattening the input record.
    pub fn new(input: Record, output: Record) -> Self {
        Self {
            input: flatten_parameters(&input),
            output,
        }
    }

    /// Create a pair from two `KEY=VAL` parameter strings.
    pub fn from_param_strings(input: &str, output: &str) -> Self {
        Self::new(parse_param_string(input), parse_param_string(output))
    }
}

/// Paired examples grouped by category.
#[derive(Debug, Clone, Default)]
pub struct PairCorpus {
    categories: BTreeMap<String, Vec<TrainingPair>>,
}

/// Counters from loading a corpus file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorpusLoadStats {
    /// Rows present in the file.
    pub rows: usize,
    /// Rows filed into a category.
    pub loaded: usize,
    /// Rows skipped for a missing category or an empty side.
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct CorpusRow {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    output: Value,
}

fn side_to_record(side: &Value) -> Option<Record> {
    let record = match side {
        Value::Object(map) => map.clone(),
        Value::String(s) => parse_param_string(s),
        _ => return None,
    };
    if record.is_empty() {
        None
    } else {
        Some(record)
    }
}

impl PairCorpus {
    /// Create an empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// File a pair under a category. The label is trimmed.
    pub fn add(&mut self, category: &str, pair: TrainingPair) {
        self.categories
            .entry(category.trim().to_string())
            .or_default()
            .push(pair);
    }

    /// Category labels, in sorted order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Pairs of one category, in load order.
    pub fn pairs(&self, category: &str) -> Option<&[TrainingPair]> {
        self.categories.get(category).map(Vec::as_slice)
    }

    /// Iterate over `(category, pairs)` in sorted category order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TrainingPair])> {
        self.categories
            .iter()
            .map(|(name, pairs)| (name.as_str(), pairs.as_slice()))
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Whether the corpus has no categories.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Total number of pairs across categories.
    pub fn total_pairs(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Load a corpus from a JSON file.
    ///
    /// The file holds an array of `{category, input, output}` rows where each
    /// side is either an object or a `KEY=VAL` string.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JSON array of
    /// rows. Individual unusable rows are skipped and counted instead.
    pub fn load_json(path: &Path) -> Result<(Self, CorpusLoadStats)> {
        let content = read_to_string_limited(path)?;
        Self::from_json_str(&content).map_err(|e| match e {
            ProdmapError::Serde { message } => {
                ProdmapError::serde(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Parse a corpus from JSON text.
    pub fn from_json_str(content: &str) -> Result<(Self, CorpusLoadStats)> {
        let rows: Vec<CorpusRow> = serde_json::from_str(content)?;
        let mut corpus = Self::new();
        let mut stats = CorpusLoadStats {
            rows: rows.len(),
            ..Default::default()
        };

        for (index, row) in rows.iter().enumerate() {
            let category = row
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty());
            let (Some(category), Some(input), Some(output)) = (
                category,
                side_to_record(&row.input),
                side_to_record(&row.output),
            ) else {
                tracing::debug!("Skipping corpus row {}: missing category or empty side", index);
                stats.skipped += 1;
                continue;
            };

            corpus.add(category, TrainingPair::new(input, output));
            stats.loaded += 1;
        }

        if stats.skipped > 0 {
            tracing::warn!(
                "Skipped {} of {} corpus rows with a missing category or empty side",
                stats.skipped,
                stats.rows
            );
        }

        Ok((corpus, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_param_string() {
        let record = parse_param_string("B=985, H = 1200 ,KOLOR=biały,=x,broken, URL=a=b");

        let keys: Vec<&String> = record.keys().collect();
        assert_eq!(keys, vec!["B", "H", "KOLOR", "URL"]);
        assert_eq!(record.get("H"), Some(&json!("1200")));
        assert_eq!(record.get("URL"), Some(&json!("a=b")));
    }

    #[test]
    fn test_parse_param_string_empty() {
        assert!(parse_param_string("").is_empty());
        assert!(parse_param_string(" , ,").is_empty());
    }

    #[test]
    fn test_pair_flattens_input() {
        let input = json!({"G": {"TYP": "T"}, "B": 1});
        let Value::Object(input) = input else { unreachable!() };
        let pair = TrainingPair::new(input, Record::new());

        assert!(pair.input.contains_key("G.TYP"));
        assert_eq!(pair.input.get("G"), Some(&Value::Null));
    }

    #[test]
    fn test_corpus_groups_by_trimmed_category() {
        let mut corpus = PairCorpus::new();
        corpus.add("Vertikale ", TrainingPair::from_param_strings("B=1", "X=1"));
        corpus.add("Vertikale", TrainingPair::from_param_strings("B=2", "X=2"));
        corpus.add("Plisy", TrainingPair::from_param_strings("B=3", "X=3"));

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.total_pairs(), 3);
        assert_eq!(corpus.pairs("Vertikale").map(<[_]>::len), Some(2));
        assert_eq!(corpus.categories().collect::<Vec<_>>(), vec!["Plisy", "Vertikale"]);
    }

    #[test]
    fn test_from_json_str_mixed_sides() {
        let content = r#"[
            {"category": "Vertikale", "input": {"SZEROKOSC": 985}, "output": "B=985, TYP=V"},
            {"category": "Vertikale", "input": "SZEROKOSC=1000", "output": {"B": "1000"}},
            {"category": "", "input": "A=1", "output": "B=1"},
            {"input": "A=1", "output": "B=1"},
            {"category": "Plisy", "input": "", "output": "B=1"},
            {"category": "Plisy", "input": "A=1", "output": 7}
        ]"#;

        let (corpus, stats) = PairCorpus::from_json_str(content).unwrap();

        assert_eq!(
            stats,
            CorpusLoadStats {
                rows: 6,
                loaded: 2,
                skipped: 4
            }
        );
        let pairs = corpus.pairs("Vertikale").unwrap();
        assert_eq!(pairs[0].input.get("SZEROKOSC"), Some(&json!(985)));
        assert_eq!(pairs[0].output.get("TYP"), Some(&json!("V")));
        assert_eq!(pairs[1].output.get("B"), Some(&json!("1000")));
        assert!(corpus.pairs("Plisy").is_none());
    }

    #[test]
    fn test_from_json_str_rejects_non_array() {
        let result = PairCorpus::from_json_str(r#"{"category": "x"}"#);
        assert!(matches!(result, Err(ProdmapError::Serde { .. })));
    }

    #[test]
    fn test_load_json_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.json");
        std::fs::write(
            &path,
            r#"[{"category": "Plisy", "input": "A=1", "output": "B=1"}]"#,
        )
        .unwrap();

        let (corpus, stats) = PairCorpus::load_json(&path).unwrap();
        assert_eq!(stats.loaded, 1);
        assert_eq!(corpus.total_pairs(), 1);
    }

    #[test]
    fn test_load_json_reports_path_on_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        std::fs::write(&path, "not json").unwrap();

        let err = PairCorpus::load_json(&path).unwrap_err().to_string();
        assert!(err.contains("broken.json"));
    }
}

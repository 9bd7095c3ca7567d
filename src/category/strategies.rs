//! Category matching strategies.
//!
//! Each strategy maps a query to at most one known category. The resolver
//! tries them in order and stops at the first match.

use serde::{Deserialize, Serialize};

use crate::error::FailOpen;
use crate::gateway::{CategorySuggestionRequest, SuggestionGateway};

/// The step of the fallback chain that produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStep {
    /// Case-sensitive equality with the label.
    Exact,
    /// Case-insensitive substring in either direction on the label.
    Substring,
    /// Substring test on the secondary description.
    Secondary,
    /// Suggested by the external gateway.
    Gateway,
    /// No category matched; the gateway proposed a new mapping.
    Proposed,
}

impl MatchStep {
    /// Get the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Substring => "substring",
            Self::Secondary => "secondary",
            Self::Gateway => "gateway",
            Self::Proposed => "proposed",
        }
    }

    /// Position in the chain, starting at 1.
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Exact => 1,
            Self::Substring => 2,
            Self::Secondary => 3,
            Self::Gateway => 4,
            Self::Proposed => 5,
        }
    }
}

impl std::fmt::Display for MatchStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a record is matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryQuery<'a> {
    /// Primary label, e.g. the order item's department.
    pub label: &'a str,
    /// Secondary descriptive field, e.g. the product description.
    pub secondary: Option<&'a str>,
}

impl<'a> CategoryQuery<'a> {
    pub fn new(label: &'a str, secondary: Option<&'a str>) -> Self {
        Self { label, secondary }
    }
}

/// One step of the category fallback chain.
pub trait CategoryStrategy: Send + Sync {
    /// The step this strategy implements.
    fn step(&self) -> MatchStep;

    /// Try to match the query against the known categories.
    fn resolve(&self, query: &CategoryQuery<'_>, known: &[String]) -> Option<String>;
}

/// Step 1: exact, byte-for-byte match. Surrounding whitespace is left to
/// the substring step.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl CategoryStrategy for ExactMatch {
    fn step(&self) -> MatchStep {
        MatchStep::Exact
    }

    fn resolve(&self, query: &CategoryQuery<'_>, known: &[String]) -> Option<String> {
        known.iter().find(|k| k.as_str() == query.label).cloned()
    }
}

/// Substring match in either direction, ignoring case.
///
/// When several categories match, the longest one wins, so "Rolety Dzien-Noc"
/// beats "Rolety" for a label containing both.
fn substring_match(text: &str, known: &[String]) -> Option<String> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let mut best: Option<&String> = None;
    for category in known {
        let candidate = category.trim().to_lowercase();
        if candidate.is_empty() {
            continue;
        }
        if needle.contains(&candidate) || candidate.contains(&needle) {
            if best.is_none_or(|b| category.chars().count() > b.chars().count()) {
                best = Some(category);
            }
        }
    }
    best.cloned()
}

/// Step 2: substring match on the label.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatch;

impl CategoryStrategy for SubstringMatch {
    fn step(&self) -> MatchStep {
        MatchStep::Substring
    }

    fn resolve(&self, query: &CategoryQuery<'_>, known: &[String]) -> Option<String> {
        substring_match(query.label, known)
    }
}

/// Step 3: substring match on the secondary field.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecondaryFieldMatch;

impl CategoryStrategy for SecondaryFieldMatch {
    fn step(&self) -> MatchStep {
        MatchStep::Secondary
    }

    fn resolve(&self, query: &CategoryQuery<'_>, known: &[String]) -> Option<String> {
        query.secondary.and_then(|s| substring_match(s, known))
    }
}

/// Step 4: ask the external gateway.
///
/// Only a suggestion naming a known category (ignoring case) is accepted;
/// gateway failures count as no candidate.
pub struct GatewayMatch<'g> {
    gateway: &'g dyn SuggestionGateway,
}

impl<'g> GatewayMatch<'g> {
    pub fn new(gateway: &'g dyn SuggestionGateway) -> Self {
        Self { gateway }
    }
}

impl CategoryStrategy for GatewayMatch<'_> {
    fn step(&self) -> MatchStep {
        MatchStep::Gateway
    }

    fn resolve(&self, query: &CategoryQuery<'_>, known: &[String]) -> Option<String> {
        if !self.gateway.is_available() || known.is_empty() {
            return None;
        }

        let request = CategorySuggestionRequest {
            label: query.label.to_string(),
            secondary: query.secondary.map(str::to_string),
            known_categories: known.to_vec(),
        };
        let suggested = self
            .gateway
            .suggest_category(&request)
            .fail_open_default("category suggestion")?;

        let found = known
            .iter()
            .find(|k| **k == suggested)
            .or_else(|| {
                let wanted = suggested.to_lowercase();
                known.iter().find(|k| k.to_lowercase() == wanted)
            })
            .cloned();
        if found.is_none() {
            tracing::warn!(
                "Gateway '{}' suggested unknown category '{}' for '{}'",
                self.gateway.name(),
                suggested,
                query.label
            );
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::traits::tests::FakeGateway;

    fn known() -> Vec<String> {
        vec![
            "Plisy".to_string(),
            "Rolety".to_string(),
            "Rolety Dzien-Noc".to_string(),
            "Vertikale".to_string(),
        ]
    }

    #[test]
    fn test_exact_is_case_sensitive() {
        let q = CategoryQuery::new("Vertikale", None);
        assert_eq!(ExactMatch.resolve(&q, &known()), Some("Vertikale".into()));

        let q = CategoryQuery::new("VERTIKALE", None);
        assert_eq!(ExactMatch.resolve(&q, &known()), None);
    }

    #[test]
    fn test_exact_ignores_padded_label() {
        let q = CategoryQuery::new(" Vertikale ", None);
        assert_eq!(ExactMatch.resolve(&q, &known()), None);
        assert_eq!(SubstringMatch.resolve(&q, &known()), Some("Vertikale".into()));
    }

    #[test]
    fn test_substring_both_directions() {
        let q = CategoryQuery::new("VERTIKAL", None);
        assert_eq!(SubstringMatch.resolve(&q, &known()), Some("Vertikale".into()));

        let q = CategoryQuery::new("Plisy standard 25mm", None);
        assert_eq!(SubstringMatch.resolve(&q, &known()), Some("Plisy".into()));
    }

    #[test]
    fn test_substring_prefers_longest_category() {
        let q = CategoryQuery::new("rolety dzien-noc premium", None);
        assert_eq!(
            SubstringMatch.resolve(&q, &known()),
            Some("Rolety Dzien-Noc".into())
        );
    }

    #[test]
    fn test_empty_label_matches_nothing() {
        let q = CategoryQuery::new("  ", None);
        assert_eq!(SubstringMatch.resolve(&q, &known()), None);
    }

    #[test]
    fn test_secondary_field() {
        let q = CategoryQuery::new("Sonstiges", Some("Plisy na wymiar"));
        assert_eq!(SubstringMatch.resolve(&q, &known()), None);
        assert_eq!(
            SecondaryFieldMatch.resolve(&q, &known()),
            Some("Plisy".into())
        );
    }

    #[test]
    fn test_gateway_match_requires_known_category() {
        let q = CategoryQuery::new("Markiza", None);

        let gateway = FakeGateway::with_category("vertikale");
        assert_eq!(
            GatewayMatch::new(&gateway).resolve(&q, &known()),
            Some("Vertikale".into())
        );

        let gateway = FakeGateway::with_category("Markizy");
        assert_eq!(GatewayMatch::new(&gateway).resolve(&q, &known()), None);
    }

    #[test]
    fn test_gateway_failure_is_no_candidate() {
        let gateway = FakeGateway::failing(1);
        let q = CategoryQuery::new("Markiza", None);
        assert_eq!(GatewayMatch::new(&gateway).resolve(&q, &known()), None);
    }
}

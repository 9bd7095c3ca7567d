//! Gateway used when no external helper is configured.

use super::traits::{
    CategorySuggestionRequest, KeySuggestionRequest, MappingProposal, MappingProposalRequest,
    SuggestionGateway,
};
use crate::core::Suggestion;
use crate::error::{ProdmapError, Result};

/// A gateway that is never available.
///
/// Its presence only means more keys end up `manual`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGateway;

impl SuggestionGateway for DisabledGateway {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn suggest_key_mapping(&self, _request: &KeySuggestionRequest) -> Result<Suggestion> {
        Err(ProdmapError::gateway_unavailable(
            self.name(),
            "no suggestion gateway configured",
        ))
    }

    fn suggest_category(&self, _request: &CategorySuggestionRequest) -> Result<Option<String>> {
        Err(ProdmapError::gateway_unavailable(
            self.name(),
            "no suggestion gateway configured",
        ))
    }

    fn propose_mapping(&self, _request: &MappingProposalRequest) -> Result<MappingProposal> {
        Err(ProdmapError::gateway_unavailable(
            self.name(),
            "no suggestion gateway configured",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_gateway_is_unavailable() {
        let gateway = DisabledGateway;
        assert!(!gateway.is_available());

        let request = CategorySuggestionRequest {
            label: "Markiza".into(),
            secondary: None,
            known_categories: Vec::new(),
        };
        let err = gateway.suggest_category(&request).unwrap_err();
        assert!(matches!(err, ProdmapError::GatewayUnavailable { .. }));

        let proposal = MappingProposalRequest::new("Markiza", &Default::default(), &[]);
        let err = gateway.propose_mapping(&proposal).unwrap_err();
        assert!(matches!(err, ProdmapError::GatewayUnavailable { .. }));
    }
}

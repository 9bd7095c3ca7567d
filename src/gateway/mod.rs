//! External suggestion gateways for prodmap.
//!
//! This module provides the gateway trait, the available implementations
//! and the factory that builds the configured one, wrapped with retries.

pub mod command;
pub mod disabled;
#[cfg(feature = "openai-gateway")]
pub mod openai;
pub mod prompt;
pub mod reply;
pub mod retry;
pub mod traits;

use std::time::Duration;

pub use command::CommandGateway;
pub use disabled::DisabledGateway;
#[cfg(feature = "openai-gateway")]
pub use openai::OpenAiGateway;
pub use retry::{RetryPolicy, RetryingGateway};
pub use traits::{
    CategorySuggestionRequest, KeySuggestionRequest, MappingProposal, MappingProposalRequest,
    SuggestionGateway,
};

use crate::config::GatewayConfig;
use crate::error::{ProdmapError, Result};

/// Build the configured gateway, wrapped with the configured retry policy.
///
/// # Errors
///
/// Returns a config error for an unknown kind, an incomplete command, a
/// missing API key, or `openai` in a build without the `openai-gateway`
/// feature.
pub fn build_gateway(config: &GatewayConfig) -> Result<Box<dyn SuggestionGateway>> {
    let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
    let policy = RetryPolicy::from_config(config);

    let gateway: Box<dyn SuggestionGateway> = match config.kind.as_str() {
        "disabled" => Box::new(DisabledGateway),
        "command" => Box::new(RetryingGateway::new(
            CommandGateway::new(&config.command, timeout)?,
            policy,
        )),
        #[cfg(feature = "openai-gateway")]
        "openai" => Box::new(RetryingGateway::new(
            OpenAiGateway::from_config(config)?,
            policy,
        )),
        #[cfg(not(feature = "openai-gateway"))]
        "openai" => {
            return Err(ProdmapError::config(
                "the openai gateway requires building with the openai-gateway feature",
            ))
        }
        other => {
            return Err(ProdmapError::config(format!(
                "unknown gateway kind '{other}'"
            )))
        }
    };

    tracing::debug!("Using suggestion gateway '{}'", gateway.name());
    Ok(gateway)
}

/// Build the configured gateway, falling back to [`DisabledGateway`].
///
/// A misconfigured gateway must not stop learning or translation; it only
/// means more keys end up `manual`.
pub fn build_gateway_or_disabled(config: &GatewayConfig) -> Box<dyn SuggestionGateway> {
    match build_gateway(config) {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::warn!("Suggestion gateway unavailable, continuing without it: {}", e);
            Box::new(DisabledGateway)
        }
    }
}

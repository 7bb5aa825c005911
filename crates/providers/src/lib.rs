//! Model backends for Brandloom.
//!
//! Currently a single implementation: any OpenAI-compatible chat completion
//! endpoint. The runtime only sees the [`brandloom_core::ChatModel`] trait,
//! so further backends slot in without touching the loop.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatModel;

use std::sync::Arc;

use brandloom_config::AppConfig;
use brandloom_core::ChatModel;
use brandloom_core::error::ModelError;

/// Build the configured chat model.
///
/// Fails fast when no API key is present rather than at the first request.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn ChatModel>, ModelError> {
    let api_key = config
        .model
        .api_key
        .clone()
        .ok_or_else(|| ModelError::NotConfigured("no API key (set BRANDLOOM_API_KEY)".into()))?;

    let model = OpenAiCompatModel::new(
        &config.model.api_url,
        api_key,
        &config.model.model,
        config.model.temperature,
        config.model.max_tokens,
        config.model.timeout_secs,
    )?;
    Ok(Arc::new(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_fails_fast() {
        let config = AppConfig::default();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ModelError::NotConfigured(_)));
    }

    #[test]
    fn configured_model_builds() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("sk-test".into());
        let model = build_from_config(&config).unwrap();
        assert_eq!(model.id(), "gpt-4o-mini");
    }
}

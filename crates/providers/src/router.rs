//! Builds the configured completion service.

use crate::gemini::GeminiCompletion;
use crate::openai_compat::OpenAiCompatCompletion;
use cortex_config::{ProviderConfig, ProviderKind};
use cortex_core::completion::CompletionService;
use cortex_core::error::CompletionError;
use std::sync::Arc;
use tracing::info;

/// Build the completion service selected by `provider.kind`.
///
/// A missing key is only an error for hosted endpoints; an OpenAI-compatible
/// service with a custom `api_url` (e.g. Ollama) may run without one.
pub fn build_from_config(config: &ProviderConfig) -> Result<Arc<dyn CompletionService>, CompletionError> {
    let service: Arc<dyn CompletionService> = match config.kind {
        ProviderKind::Gemini => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| CompletionError::NotConfigured("no Gemini API key (set GEMINI_API_KEY)".into()))?;
            let mut service = GeminiCompletion::new(api_key, &config.model)?.with_temperature(config.temperature);
            if let Some(url) = &config.api_url {
                service = service.with_base_url(url);
            }
            Arc::new(service)
        }
        ProviderKind::OpenAi => {
            let service = match (&config.api_url, &config.api_key) {
                (Some(url), key) => {
                    OpenAiCompatCompletion::new(url, key.clone().unwrap_or_default(), &config.model)?
                }
                (None, Some(key)) => OpenAiCompatCompletion::openai(key, &config.model)?,
                (None, None) => {
                    return Err(CompletionError::NotConfigured(
                        "no OpenAI API key (set OPENAI_API_KEY)".into(),
                    ));
                }
            };
            Arc::new(service.with_temperature(config.temperature))
        }
    };
    info!(provider = %config.kind, model = %config.model, "Completion service configured");
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_requires_a_key() {
        let config = ProviderConfig::default();
        assert!(matches!(build_from_config(&config), Err(CompletionError::NotConfigured(_))));

        let config = ProviderConfig {
            api_key: Some("k".into()),
            ..ProviderConfig::default()
        };
        assert_eq!(build_from_config(&config).unwrap().name(), "gemini");
    }

    #[test]
    fn openai_with_custom_url_needs_no_key() {
        let config = ProviderConfig {
            kind: ProviderKind::OpenAi,
            api_url: Some("http://localhost:11434/v1".into()),
            ..ProviderConfig::default()
        };
        assert_eq!(build_from_config(&config).unwrap().name(), "openai");
    }

    #[test]
    fn openai_without_url_or_key_is_rejected() {
        let config = ProviderConfig {
            kind: ProviderKind::OpenAi,
            ..ProviderConfig::default()
        };
        assert!(build_from_config(&config).is_err());
    }
}

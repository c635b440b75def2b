//! LLM provider clients.
//!
//! - `anthropic` -- Anthropic Messages API
//! - `openai` -- OpenAI Chat Completions API
//!
//! [`build_llm_client`] picks a provider from config and environment and
//! returns it boxed, ready for the core extractor and recovery hook.

pub mod anthropic;
pub mod openai;

use std::time::Duration;

use secrecy::SecretString;

use rote_core::llm::BoxLlmClient;
use rote_types::config::LlmConfig;
use rote_types::llm::{LlmError, LlmProviderKind};

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

pub const ENV_PROVIDER: &str = "ROTE_LLM_PROVIDER";
pub const ENV_MODEL: &str = "ROTE_LLM_MODEL";
pub const ENV_ANTHROPIC_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";

/// Resolved provider settings, minus the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSelection {
    pub provider: LlmProviderKind,
    pub model: String,
    pub base_url: Option<String>,
}

/// Pick a provider and model.
///
/// Priority for the provider: `ROTE_LLM_PROVIDER`, then `[llm] provider`,
/// then whichever API key is present (Anthropic first). The model follows
/// `ROTE_LLM_MODEL`, then `[llm] model`, then the provider default.
pub fn select_provider(
    config: &LlmConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<LlmSelection, LlmError> {
    let configured = env(ENV_PROVIDER)
        .filter(|p| !p.trim().is_empty())
        .or_else(|| config.provider.clone());

    let provider = match configured {
        Some(name) => name.parse::<LlmProviderKind>().map_err(LlmError::NotConfigured)?,
        None if env(ENV_ANTHROPIC_KEY).is_some() => LlmProviderKind::Anthropic,
        None if env(ENV_OPENAI_KEY).is_some() => LlmProviderKind::OpenAi,
        None => {
            return Err(LlmError::NotConfigured(format!(
                "set {ENV_ANTHROPIC_KEY} or {ENV_OPENAI_KEY}"
            )));
        }
    };

    let model = env(ENV_MODEL)
        .filter(|m| !m.trim().is_empty())
        .or_else(|| config.model.clone())
        .unwrap_or_else(|| provider.default_model().to_string());

    Ok(LlmSelection {
        provider,
        model,
        base_url: config.base_url.clone(),
    })
}

/// Build a client for the selected provider, reading its API key from `env`.
pub fn build_llm_client(
    config: &LlmConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<BoxLlmClient, LlmError> {
    let selection = select_provider(config, &env)?;
    let key_var = match selection.provider {
        LlmProviderKind::Anthropic => ENV_ANTHROPIC_KEY,
        LlmProviderKind::OpenAi => ENV_OPENAI_KEY,
    };
    let api_key = env(key_var)
        .filter(|k| !k.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| LlmError::NotConfigured(format!("{key_var} is not set")))?;

    tracing::info!(provider = %selection.provider, model = %selection.model, "LLM client configured");

    let client = match selection.provider {
        LlmProviderKind::Anthropic => {
            let mut client = AnthropicClient::new(api_key, selection.model);
            if let Some(url) = selection.base_url {
                client = client.with_base_url(url);
            }
            BoxLlmClient::new(client)
        }
        LlmProviderKind::OpenAi => {
            let mut client = OpenAiClient::new(api_key, selection.model);
            if let Some(url) = selection.base_url {
                client = client.with_base_url(url);
            }
            BoxLlmClient::new(client)
        }
    };
    Ok(client)
}

/// [`build_llm_client`] against the process environment.
pub fn llm_client_from_env(config: &LlmConfig) -> Result<BoxLlmClient, LlmError> {
    build_llm_client(config, |name| std::env::var(name).ok())
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Map non-2xx responses onto `LlmError`.
async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited,
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rote_core::llm::LlmClient;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_detects_provider_from_keys() {
        let config = LlmConfig::default();
        let selection = select_provider(&config, env(&[(ENV_OPENAI_KEY, "sk")])).unwrap();
        assert_eq!(selection.provider, LlmProviderKind::OpenAi);
        assert_eq!(selection.model, "gpt-4o");

        let selection = select_provider(
            &config,
            env(&[(ENV_OPENAI_KEY, "sk"), (ENV_ANTHROPIC_KEY, "ak")]),
        )
        .unwrap();
        assert_eq!(selection.provider, LlmProviderKind::Anthropic);
    }

    #[test]
    fn test_env_overrides_config() {
        let config = LlmConfig {
            provider: Some("anthropic".into()),
            model: Some("claude-x".into()),
            ..LlmConfig::default()
        };
        let selection = select_provider(&config, env(&[])).unwrap();
        assert_eq!(selection.model, "claude-x");

        let selection = select_provider(
            &config,
            env(&[(ENV_PROVIDER, "openai"), (ENV_MODEL, "gpt-mini")]),
        )
        .unwrap();
        assert_eq!(selection.provider, LlmProviderKind::OpenAi);
        assert_eq!(selection.model, "gpt-mini");
    }

    #[test]
    fn test_not_configured_without_keys() {
        let err = select_provider(&LlmConfig::default(), env(&[])).unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured(_)));

        let err = select_provider(&LlmConfig::default(), env(&[(ENV_PROVIDER, "cohere")])).unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured(_)));
    }

    #[test]
    fn test_build_requires_key_for_selected_provider() {
        let config = LlmConfig {
            provider: Some("openai".into()),
            ..LlmConfig::default()
        };
        let err = build_llm_client(&config, env(&[(ENV_ANTHROPIC_KEY, "ak")])).unwrap_err();
        assert_eq!(err, LlmError::NotConfigured("OPENAI_API_KEY is not set".into()));

        let client = build_llm_client(&config, env(&[(ENV_OPENAI_KEY, "sk")])).unwrap();
        assert_eq!(client.name(), "openai");
    }
}

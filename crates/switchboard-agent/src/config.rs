use serde::{Deserialize, Serialize};

/// Connection settings for an OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub model_id: String,
    /// Inline key. Prefer `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Name of the environment variable holding the key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model_id: model_id.into(),
            api_key: None,
            api_key_env: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Inline key first, then the named env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.is_empty())
            })
    }

    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let cfg: HttpBackendConfig = serde_json::from_str(r#"{"model_id": "gpt-4o-mini"}"#).unwrap();
        assert_eq!(cfg.base_url, "https://api.openai.com");
        assert_eq!(cfg.timeout_ms, 30_000);
        assert_eq!(cfg.completions_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_resolve_api_key_prefers_inline() {
        let cfg = HttpBackendConfig::new("http://localhost:8080/", "m").with_api_key("inline");
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("inline"));
        assert_eq!(cfg.completions_url(), "http://localhost:8080/v1/chat/completions");

        let mut cfg = HttpBackendConfig::new("http://localhost", "m");
        cfg.api_key_env = Some("SWITCHBOARD_TEST_KEY_THAT_IS_NEVER_SET".into());
        assert!(cfg.resolve_api_key().is_none());
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Construction input for a backend instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Request timeout in seconds; 0 lets the backend pick.
    #[serde(default)]
    pub timeout_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            api_key: None,
            base_url: None,
            timeout_secs: 0,
            enabled: true,
            headers: HashMap::new(),
        }
    }
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_header(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.headers.insert(k.into(), v.into());
        self
    }

    /// Default pool key: backend plus model identity.
    pub fn pool_key(&self) -> String {
        format!("{}/{}", self.name.to_lowercase(), self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults() {
        let cfg: ProviderConfig =
            serde_json::from_str(r#"{"name":"OpenAI","model":"gpt-4o"}"#).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.timeout_secs, 0);
        assert_eq!(cfg.pool_key(), "openai/gpt-4o");
    }
}

//! Provider 注册表 — 以显式对象（依赖注入）替代全局单例。
//!
//! Provider registry. Constructed once at the composition root and handed to
//! the connection pool as its [`ProviderFactory`]; nothing in the core looks
//! a registry up implicitly.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::provider::{Provider, ProviderConfig};
use crate::{Error, ErrorContext, Result};

/// Builds backend instances from configuration.
pub trait ProviderFactory: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self, _config: &ProviderConfig) -> Result<()> {
        Ok(())
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>>;
}

/// Preferred order when auto-detecting a backend.
const PREFERRED_PROVIDERS: &[&str] = &["openai", "gemini", "ollama", "groq", "deepinfra"];

#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<HashMap<String, Arc<dyn ProviderFactory>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, factory: Arc<dyn ProviderFactory>) {
        let name = factory.name().to_lowercase();
        debug!(provider = %name, "registering provider factory");
        self.write().insert(name, factory);
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn ProviderFactory>> {
        self.write().remove(&name.to_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderFactory>> {
        self.read().get(&name.to_lowercase()).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.read().contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn validate_config(&self, config: &ProviderConfig) -> Result<()> {
        Self::check_name(config)?;
        self.lookup(config)?.validate(config)
    }

    /// Build every enabled config. Individual failures are collected and only
    /// reported when nothing could be built.
    pub fn create_many(
        &self,
        configs: &[ProviderConfig],
    ) -> Result<HashMap<String, Arc<dyn Provider>>> {
        let mut built = HashMap::new();
        let mut errors = Vec::new();
        for config in configs.iter().filter(|c| c.enabled) {
            match self.create(config) {
                Ok(p) => {
                    built.insert(config.name.clone(), p);
                }
                Err(e) => {
                    warn!(provider = %config.name, error = %e, "failed to create provider");
                    errors.push(format!("failed to create provider '{}': {}", config.name, e));
                }
            }
        }
        if built.is_empty() {
            let message = if errors.is_empty() {
                "no enabled providers found".to_string()
            } else {
                format!("failed to create any providers: {}", errors.join("; "))
            };
            return Err(Error::configuration_with_context(
                message,
                ErrorContext::new().with_source("provider_registry"),
            ));
        }
        Ok(built)
    }

    /// First enabled and valid config, preferring well-known backends.
    pub fn auto_detect<'a>(&self, configs: &'a [ProviderConfig]) -> Result<&'a ProviderConfig> {
        if configs.is_empty() {
            return Err(Error::configuration("no provider configurations provided"));
        }
        let usable = |c: &&ProviderConfig| c.enabled && self.validate_config(c).is_ok();
        let preferred = PREFERRED_PROVIDERS.iter().find_map(|want| {
            configs
                .iter()
                .filter(|c| c.name.eq_ignore_ascii_case(want))
                .find(usable)
        });
        preferred
            .or_else(|| configs.iter().find(usable))
            .ok_or_else(|| Error::configuration("no valid provider configurations found"))
    }

    fn check_name(config: &ProviderConfig) -> Result<()> {
        if config.name.trim().is_empty() {
            return Err(Error::validation_with_context(
                "provider name is required",
                ErrorContext::new().with_field_path("provider.name"),
            ));
        }
        Ok(())
    }

    fn lookup(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderFactory>> {
        self.get(&config.name).ok_or_else(|| {
            Error::configuration_with_context(
                format!("unknown provider: {}", config.name),
                ErrorContext::new()
                    .with_field_path("provider.name")
                    .with_details(format!("registered: [{}]", self.list().join(", "))),
            )
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn ProviderFactory>>> {
        self.factories.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn ProviderFactory>>> {
        self.factories.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProviderFactory for ProviderRegistry {
    fn name(&self) -> &str {
        "registry"
    }

    fn validate(&self, config: &ProviderConfig) -> Result<()> {
        self.validate_config(config)
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
        Self::check_name(config)?;
        if !config.enabled {
            return Err(Error::configuration_with_context(
                format!("provider '{}' is disabled", config.name),
                ErrorContext::new().with_field_path("provider.enabled"),
            ));
        }
        let factory = self.lookup(config)?;
        factory.validate(config)?;
        factory.create(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFactory;

    fn registry() -> ProviderRegistry {
        let r = ProviderRegistry::new();
        r.register(Arc::new(MockFactory::new("Ollama")));
        r.register(Arc::new(MockFactory::new("openai")));
        r
    }

    #[test]
    fn test_register_normalizes_names() {
        let r = registry();
        assert!(r.has("OLLAMA"));
        assert_eq!(r.list(), vec!["ollama".to_string(), "openai".to_string()]);
        assert!(r.unregister("Ollama").is_some());
        assert!(!r.has("ollama"));
    }

    #[test]
    fn test_create_rejects_missing_disabled_and_unknown() {
        let r = registry();
        let missing = r.create(&ProviderConfig::new("  ", "m"));
        assert!(matches!(missing, Err(Error::Validation { .. })));

        let disabled = r.create(&ProviderConfig::new("openai", "m").with_enabled(false));
        assert!(matches!(disabled, Err(Error::Configuration { .. })));

        let unknown = r.create(&ProviderConfig::new("nope", "m"));
        assert!(matches!(unknown, Err(Error::Configuration { .. })));

        assert!(r.create(&ProviderConfig::new("OpenAI", "gpt-4o")).is_ok());
    }

    #[test]
    fn test_create_many_collects_failures() {
        let r = registry();
        r.register(Arc::new(MockFactory::new("broken").failing()));
        let configs = vec![
            ProviderConfig::new("openai", "gpt-4o"),
            ProviderConfig::new("broken", "x"),
            ProviderConfig::new("ollama", "llama3").with_enabled(false),
        ];
        let built = r.create_many(&configs).unwrap();
        assert_eq!(built.len(), 1);
        assert!(built.contains_key("openai"));

        let err = r.create_many(&configs[1..]).err().unwrap();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_auto_detect_prefers_known_order() {
        let r = registry();
        r.register(Arc::new(MockFactory::new("custom")));
        let configs = vec![
            ProviderConfig::new("custom", "a"),
            ProviderConfig::new("ollama", "b"),
            ProviderConfig::new("openai", "c").with_enabled(false),
        ];
        assert_eq!(r.auto_detect(&configs).unwrap().name, "ollama");
        assert_eq!(r.auto_detect(&configs[..1]).unwrap().name, "custom");
        assert!(r.auto_detect(&[]).is_err());
    }
}

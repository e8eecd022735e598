//! Cache key generation.

use crate::types::{Message, RequestOptions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Request fingerprint. Two requests with the same hash are interchangeable
/// for caching purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
    pub model: String,
    pub provider: String,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.hash
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.hash[..self.hash.len().min(12)]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self { salt: None }
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// SHA-256 over backend, model, temperature (two decimals), max tokens and
    /// every message's role and content, in order. Each field is length-prefixed
    /// so adjacent fields cannot run together.
    pub fn generate(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        provider: &str,
    ) -> CacheKey {
        let mut hasher = Sha256::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };
        if let Some(ref s) = self.salt {
            field(s.as_bytes());
        }
        field(provider.as_bytes());
        field(options.model.as_bytes());
        field(format!("{:.2}", options.effective_temperature()).as_bytes());
        field(options.max_tokens.unwrap_or(0).to_string().as_bytes());
        for msg in messages {
            field(msg.role.as_str().as_bytes());
            field(msg.content.as_bytes());
        }
        let hash: String = hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect();
        CacheKey {
            hash,
            model: options.model.clone(),
            provider: provider.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> RequestOptions {
        RequestOptions::new("m1").with_temperature(0.0)
    }

    #[test]
    fn test_identical_inputs_identical_key() {
        let g = CacheKeyGenerator::new();
        let msgs = vec![Message::user("What is the capital of France?")];
        let a = g.generate(&msgs, &opts(), "openai");
        let b = g.generate(&msgs, &opts(), "openai");
        assert_eq!(a, b);
        assert_eq!(a.hash.len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_temperature_rounded_to_two_decimals() {
        let g = CacheKeyGenerator::new();
        let msgs = vec![Message::user("hi")];
        let a = g.generate(&msgs, &RequestOptions::new("m").with_temperature(0.7), "p");
        let b = g.generate(&msgs, &RequestOptions::new("m").with_temperature(0.700001), "p");
        let c = g.generate(&msgs, &RequestOptions::new("m").with_temperature(0.71), "p");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_order_and_field_sensitivity() {
        let g = CacheKeyGenerator::new();
        let ab = vec![Message::user("a"), Message::user("b")];
        let ba = vec![Message::user("b"), Message::user("a")];
        assert_ne!(g.generate(&ab, &opts(), "p"), g.generate(&ba, &opts(), "p"));

        let joined = vec![Message::user("ab")];
        let split = vec![Message::user("a"), Message::user("b")];
        assert_ne!(g.generate(&joined, &opts(), "p"), g.generate(&split, &opts(), "p"));

        let msgs = vec![Message::user("x")];
        assert_ne!(g.generate(&msgs, &opts(), "p1"), g.generate(&msgs, &opts(), "p2"));
        assert_ne!(
            g.generate(&msgs, &opts(), "p"),
            g.generate(&msgs, &opts().with_max_tokens(10), "p")
        );
        assert_ne!(
            g.generate(&msgs, &opts(), "p"),
            CacheKeyGenerator::new().with_salt("v2").generate(&msgs, &opts(), "p")
        );
    }
}

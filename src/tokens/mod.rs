//! Token 计数与成本估算模块：为缓存与批处理提供粗略的 Token/成本启发式。
//!
//! # Token Counting and Cost Estimation Module
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TokenCounter`] | Trait for token counting implementations |
//! | [`CharacterEstimator`] | Character-based approximation (4 chars ≈ 1 token) |
//! | [`ModelPricing`] | Per-model pricing used for cost calculation |
//!
//! ```rust
//! use ai_lib_accel::tokens::{estimate_cost, estimate_tokens};
//!
//! let tokens = estimate_tokens("What is the capital of France?");
//! assert_eq!(tokens, 7);
//! assert!(estimate_cost(tokens) > 0.0);
//! ```

mod counter;
mod pricing;

pub use counter::{estimate_message_tokens, estimate_tokens, CharacterEstimator, TokenCounter};
pub use pricing::{estimate_cost, ModelPricing, DEFAULT_COST_PER_TOKEN};

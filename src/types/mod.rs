//! 类型系统模块：定义 Provider 能力所交换的核心数据类型。
//!
//! # Types Module
//!
//! Strongly-typed request and response primitives shared by every engine.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and content |
//! | [`RequestOptions`] | Per-call model, temperature, max-tokens and timeout |
//! | [`ProviderResponse`] | Generated text plus [`ResponseMetadata`] |
//! | [`TokenUsage`] | Prompt/completion token counts |
//! | [`ModelInfo`] | Model descriptor reported by a provider |

pub mod message;
pub mod options;
pub mod response;

pub use message::{content_len, Message, MessageRole};
pub use options::RequestOptions;
pub use response::{ModelInfo, ProviderResponse, ResponseMetadata, TokenUsage};

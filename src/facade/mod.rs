//! 应用边界的便捷入口：进程级默认注册表与按环境变量构建的管线。
//!
//! Convenience helpers for the outermost application boundary. Core engines
//! never read the process-wide registry; they receive their factory
//! explicitly.

use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::registry::ProviderRegistry;
use std::sync::Arc;

static DEFAULT_REGISTRY: once_cell::sync::Lazy<Arc<ProviderRegistry>> =
    once_cell::sync::Lazy::new(|| Arc::new(ProviderRegistry::new()));

/// Process-wide registry, empty until the application registers factories.
pub fn default_registry() -> Arc<ProviderRegistry> {
    Arc::clone(&DEFAULT_REGISTRY)
}

/// Pipeline over [`default_registry`] configured from `AI_LIB_*` variables.
pub fn pipeline_from_env() -> Pipeline {
    Pipeline::new(PipelineConfig::from_env(), default_registry())
}

//! Domain types for the encryption pipeline.
//!
//! Payload types, configuration and error handling. No I/O lives here.

pub mod config;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use config::{
    ConfigError, EncryptionConfig, KeyAuthorityConfig, ModuleExports, ModuleLifecycle,
    PipelineConfig, RpcConfig, SubmissionConfig,
};
pub use error::{ConnectionError, EncryptionError, ModuleError, PipelineError, PipelineResult};
pub use types::*;

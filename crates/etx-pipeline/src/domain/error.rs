//! Pipeline error types.
//!
//! Every stage failure surfaces to the caller as a [`PipelineError`]; nothing
//! is retried or suppressed.

use super::config::ConfigError;

/// Failure talking to the node.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    /// Request never completed (DNS, refused connection, timeout, HTTP status)
    #[error("transport error: {0}")]
    Transport(String),

    /// Node answered with a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Node answered with something that is not a usable JSON-RPC response
    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),
}

/// Failure inside or at the boundary of the encryption module.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("failed to load module: {0}")]
    Load(String),

    #[error("module does not export `{0}`")]
    MissingExport(String),

    #[error("module trapped: {0}")]
    Trap(String),

    #[error("module could not allocate {0} bytes")]
    AllocationFailed(usize),

    #[error("memory access out of bounds at {ptr} (+{len} bytes)")]
    OutOfBounds { ptr: u32, len: usize },

    #[error("no NUL terminator within {max} bytes of {ptr}")]
    Unterminated { ptr: u32, max: usize },
}

/// Why the Encryptor could not produce ciphertext.
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("{0} contains an interior NUL byte")]
    InteriorNul(&'static str),

    #[error("encryptMessage returned a null pointer")]
    NullResult,

    #[error("encryptMessage returned an empty result")]
    EmptyResult,

    #[error("encryptMessage returned something other than hex text")]
    InvalidResult,

    #[error("module task did not complete: {0}")]
    TaskFailed(String),
}

/// Pipeline error, one variant per failure kind.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("connectivity error: {0}")]
    Connectivity(#[from] ConnectionError),

    #[error("malformed key response: {0}")]
    MalformedResponse(String),

    #[error("encryption failure: {0}")]
    EncryptionFailure(#[from] EncryptionError),

    #[error("no default sender account available")]
    NoAccount,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Connectivity(_) => "connectivity",
            PipelineError::MalformedResponse(_) => "malformed_response",
            PipelineError::EncryptionFailure(_) => "encryption_failure",
            PipelineError::NoAccount => "no_account",
            PipelineError::Config(_) => "config",
        }
    }
}

impl From<ModuleError> for PipelineError {
    fn from(e: ModuleError) -> Self {
        PipelineError::EncryptionFailure(EncryptionError::Module(e))
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

//! Pipeline configuration with validation.
//!
//! Defaults carry the well-known key authority contract and selector, so
//! `PipelineConfig::default()` only needs an RPC url and a module path that
//! exist in the deployment.

use primitive_types::H160;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::types::Address;

/// Contract that publishes the aggregate BLS public key.
pub const KEY_AUTHORITY_ADDRESS: Address = H160([
    0xd2, 0xaa, 0xa0, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00,
]);

/// Selector of the key getter on [`KEY_AUTHORITY_ADDRESS`]. Takes no arguments.
pub const KEY_GETTER_SELECTOR: &str = "0x554ef7a6";

/// Four G2 coordinates, 32 bytes each, hex encoded.
pub const AGGREGATE_KEY_HEX_LEN: usize = 256;

/// Gas limit attached to every submission unless configured otherwise.
pub const DEFAULT_GAS_LIMIT: u64 = 1_000_000;

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Node connection
    pub rpc: RpcConfig,
    /// Where the aggregate key is read from
    pub key_authority: KeyAuthorityConfig,
    /// Encryption module
    pub encryption: EncryptionConfig,
    /// Transaction parameters
    pub submission: SubmissionConfig,
}

impl PipelineConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rpc.url.starts_with("http://") || self.rpc.url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.rpc.url.clone()));
        }

        if self.rpc.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "rpc timeout cannot be 0".into(),
            ));
        }

        self.key_authority.selector_bytes()?;

        if let Some(len) = self.key_authority.key_hex_len {
            if len == 0 || len % 2 != 0 {
                return Err(ConfigError::Invalid(format!(
                    "key_hex_len must be a positive even number, got {}",
                    len
                )));
            }
        }

        let exports = &self.encryption.exports;
        for (name, value) in [
            ("memory", &exports.memory),
            ("malloc", &exports.malloc),
            ("free", &exports.free),
            ("encrypt", &exports.encrypt),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "export name `{}` cannot be empty",
                    name
                )));
            }
        }

        if self.encryption.max_result_len == 0 {
            return Err(ConfigError::Invalid(
                "max_result_len cannot be 0".into(),
            ));
        }

        if self.submission.gas_limit == 0 {
            return Err(ConfigError::InvalidGasLimit(self.submission.gas_limit));
        }

        Ok(())
    }
}

/// JSON-RPC connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// HTTP endpoint of the node
    pub url: String,
    /// Per-request timeout enforced by the HTTP client
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8545".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Key authority contract configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyAuthorityConfig {
    /// Contract address
    pub contract_address: Address,
    /// 4-byte selector as `0x`-prefixed hex
    pub selector: String,
    /// Required key length in hex chars (None = any non-empty hex)
    pub key_hex_len: Option<usize>,
}

impl Default for KeyAuthorityConfig {
    fn default() -> Self {
        Self {
            contract_address: KEY_AUTHORITY_ADDRESS,
            selector: KEY_GETTER_SELECTOR.to_string(),
            key_hex_len: None,
        }
    }
}

impl KeyAuthorityConfig {
    /// Decode the selector into call data.
    pub fn selector_bytes(&self) -> Result<[u8; 4], ConfigError> {
        let raw = self.selector.strip_prefix("0x").unwrap_or(&self.selector);
        let bytes =
            hex::decode(raw).map_err(|_| ConfigError::InvalidSelector(self.selector.clone()))?;
        bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidSelector(self.selector.clone()))
    }
}

/// How encryption module instances are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleLifecycle {
    /// Fresh instance for every encryption
    #[default]
    PerCall,
    /// One lazily created instance shared by all calls
    Shared,
}

/// Names the module exports for the encryption boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleExports {
    pub memory: String,
    pub malloc: String,
    pub free: String,
    pub encrypt: String,
}

impl Default for ModuleExports {
    fn default() -> Self {
        Self {
            memory: "memory".to_string(),
            malloc: "malloc".to_string(),
            free: "free".to_string(),
            encrypt: "encryptMessage".to_string(),
        }
    }
}

/// Encryption module configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Compiled module (`.wasm` or `.wat`)
    pub module_path: PathBuf,
    /// Instance reuse strategy
    pub lifecycle: ModuleLifecycle,
    /// Export names
    pub exports: ModuleExports,
    /// Upper bound when scanning for the result's NUL terminator
    pub max_result_len: usize,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            module_path: PathBuf::from("encrypt.wasm"),
            lifecycle: ModuleLifecycle::PerCall,
            exports: ModuleExports::default(),
            max_result_len: 1 << 20,
        }
    }
}

/// Transaction submission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Gas limit for every submission. Must cover the intrinsic cost of the
    /// largest expected ciphertext.
    pub gas_limit: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// RPC url is not http(s)
    #[error("invalid rpc url: {0}")]
    InvalidUrl(String),
    /// Selector is not 4 bytes of hex
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Gas limit of zero
    #[error("invalid gas limit: {0}")]
    InvalidGasLimit(u64),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

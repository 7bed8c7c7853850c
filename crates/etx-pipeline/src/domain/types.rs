//! Core types for the encryption pipeline with JSON-RPC serialization.
//!
//! Quantities and byte strings follow Ethereum JSON-RPC conventions
//! (`0x`-prefixed hex).

use primitive_types::U256 as PrimitiveU256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::error::{EncryptionError, PipelineError};

// Re-export primitive types for convenience
pub use primitive_types::H160 as Address;

/// U256 wrapper with hex string serialization for JSON-RPC compatibility.
///
/// Serializes as `"0x..."` hex string, deserializes from hex string or number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct U256(pub PrimitiveU256);

impl From<u64> for U256 {
    fn from(v: u64) -> Self {
        U256(PrimitiveU256::from(v))
    }
}

impl From<PrimitiveU256> for U256 {
    fn from(v: PrimitiveU256) -> Self {
        U256(v)
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl Serialize for U256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{:x}", self.0))
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct U256Visitor;

        impl<'de> de::Visitor<'de> for U256Visitor {
            type Value = U256;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a hex string starting with 0x or a number")
            }

            fn visit_str<E>(self, value: &str) -> Result<U256, E>
            where
                E: de::Error,
            {
                if let Some(hex_str) = value
                    .strip_prefix("0x")
                    .or_else(|| value.strip_prefix("0X"))
                {
                    PrimitiveU256::from_str(hex_str)
                        .map(U256)
                        .map_err(|_| de::Error::custom("invalid hex string for U256"))
                } else {
                    PrimitiveU256::from_dec_str(value)
                        .map(U256)
                        .map_err(|_| de::Error::custom("invalid decimal string for U256"))
                }
            }

            fn visit_u64<E>(self, value: u64) -> Result<U256, E>
            where
                E: de::Error,
            {
                Ok(U256::from(value))
            }
        }

        deserializer.deserialize_any(U256Visitor)
    }
}

/// Block tag for JSON-RPC. Every read the pipeline makes is at `latest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTag {
    #[default]
    Latest,
}

impl BlockTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockTag::Latest => "latest",
        }
    }
}

impl Serialize for BlockTag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Bytes wrapper with hex serialization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn from_slice(slice: &[u8]) -> Self {
        Bytes(slice.to_vec())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Bytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

/// Read-only call object for `eth_call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
}

/// Pointer into the encryption module's linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModulePtr(pub u32);

impl ModulePtr {
    pub const NULL: ModulePtr = ModulePtr(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ModulePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Aggregate BLS public key as hex text, without the `0x` wire prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(String);

impl PublicKey {
    /// Parse the `eth_call` result. Exactly one leading `0x` is stripped.
    ///
    /// `expected_len` is the required number of hex characters, if any.
    pub fn from_wire(raw: &str, expected_len: Option<usize>) -> Result<Self, PipelineError> {
        let hex_str = raw.strip_prefix("0x").ok_or_else(|| {
            PipelineError::MalformedResponse(format!("missing 0x prefix in {:?}", raw))
        })?;

        if hex_str.is_empty() {
            return Err(PipelineError::MalformedResponse("empty key".into()));
        }
        if !hex_str.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(PipelineError::MalformedResponse(format!(
                "key is not hex: {:?}",
                hex_str
            )));
        }
        if let Some(len) = expected_len {
            if hex_str.len() != len {
                return Err(PipelineError::MalformedResponse(format!(
                    "key has {} hex chars, expected {}",
                    hex_str.len(),
                    len
                )));
            }
        }

        Ok(PublicKey(hex_str.to_string()))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied bytes to encrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaintextPayload(Vec<u8>);

impl PlaintextPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for PlaintextPayload {
    fn from(v: Vec<u8>) -> Self {
        PlaintextPayload(v)
    }
}

impl From<&[u8]> for PlaintextPayload {
    fn from(v: &[u8]) -> Self {
        PlaintextPayload(v.to_vec())
    }
}

impl From<&str> for PlaintextPayload {
    fn from(v: &str) -> Self {
        PlaintextPayload(v.as_bytes().to_vec())
    }
}

impl From<String> for PlaintextPayload {
    fn from(v: String) -> Self {
        PlaintextPayload(v.into_bytes())
    }
}

/// Hex text produced by the encryption module. Sent as transaction data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextPayload(String);

impl CiphertextPayload {
    /// Accept non-empty hex text encoding whole bytes.
    pub fn from_hex(text: impl Into<String>) -> Result<Self, EncryptionError> {
        let text = text.into();
        if text.is_empty() {
            return Err(EncryptionError::EmptyResult);
        }
        if text.len() % 2 != 0 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(EncryptionError::InvalidResult);
        }
        Ok(CiphertextPayload(text))
    }

    /// Accept the raw bytes copied out of module memory.
    pub fn from_module_output(bytes: Vec<u8>) -> Result<Self, EncryptionError> {
        let text = String::from_utf8(bytes).map_err(|_| EncryptionError::InvalidResult)?;
        Self::from_hex(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decoded byte length as carried in the transaction.
    pub fn byte_len(&self) -> usize {
        self.0.len() / 2
    }

    /// Count of zero bytes in the decoded payload.
    pub fn zero_bytes(&self) -> usize {
        self.0
            .as_bytes()
            .chunks_exact(2)
            .filter(|pair| *pair == b"00")
            .count()
    }
}

impl fmt::Display for CiphertextPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for CiphertextPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", self.0))
    }
}

/// Transaction object for `eth_sendTransaction`.
///
/// Built right before submission and dropped afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: CiphertextPayload,
    pub gas: U256,
    pub nonce: U256,
    pub chain_id: U256,
}

/// Whatever the node returned for `eth_sendTransaction`, untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionReceipt(pub serde_json::Value);

impl TransactionReceipt {
    /// Transaction hash, if the node reported one.
    ///
    /// Handles a bare hash string and objects carrying `hash` or `transactionHash`.
    pub fn hash(&self) -> Option<&str> {
        match &self.0 {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Object(obj) => obj
                .get("hash")
                .or_else(|| obj.get("transactionHash"))
                .and_then(|v| v.as_str()),
            _ => None,
        }
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

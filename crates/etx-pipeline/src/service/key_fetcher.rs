//! Aggregate key lookup on the key authority contract.

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::domain::{
    BlockTag, Bytes, CallRequest, ConfigError, ConnectionError, KeyAuthorityConfig,
    PipelineError, PipelineResult, PublicKey,
};
use crate::ports::{KeyFetcher, LedgerConnection};

/// Reads the key with a single argument-less `eth_call`.
#[derive(Debug, Clone)]
pub struct ContractKeyFetcher {
    request: CallRequest,
    key_hex_len: Option<usize>,
}

impl ContractKeyFetcher {
    pub fn new(config: &KeyAuthorityConfig) -> Result<Self, ConfigError> {
        let selector = config.selector_bytes()?;
        Ok(Self {
            request: CallRequest {
                to: config.contract_address,
                data: Bytes::from_slice(&selector),
            },
            key_hex_len: config.key_hex_len,
        })
    }
}

#[async_trait]
impl KeyFetcher for ContractKeyFetcher {
    #[instrument(skip(self, connection), fields(contract = ?self.request.to))]
    async fn fetch(&self, connection: &dyn LedgerConnection) -> PipelineResult<PublicKey> {
        // A result that is not a string is a bad key, not a bad connection
        let raw = connection
            .call(&self.request, BlockTag::Latest)
            .await
            .map_err(|e| match e {
                ConnectionError::InvalidResponse(msg) => PipelineError::MalformedResponse(msg),
                other => PipelineError::Connectivity(other),
            })?;
        let key = PublicKey::from_wire(&raw, self.key_hex_len)?;
        debug!(key_hex_len = key.as_hex().len(), "aggregate key fetched");
        Ok(key)
    }
}

//! Transaction submission.
//!
//! The sender is the node's first managed account and the node signs. Nonce
//! and chain id are read fresh for every submission.
//!
//! Known limitation: the nonce is read at `latest` and not reserved, so two
//! submissions racing from the same sender can pick the same nonce. The node
//! rejects the loser and the error surfaces as `Connectivity`.

use async_trait::async_trait;
use etx_telemetry::metrics::TRANSACTIONS_SUBMITTED;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    Address, BlockTag, CiphertextPayload, PipelineError, PipelineResult, SubmissionConfig,
    TransactionReceipt, TransactionRequest, U256,
};
use crate::ports::{LedgerConnection, Submitter};

const TX_BASE_GAS: u64 = 21_000;
const TX_DATA_ZERO_GAS: u64 = 4;
const TX_DATA_NON_ZERO_GAS: u64 = 16;

/// Intrinsic gas of a plain call carrying `data`.
fn intrinsic_gas(data: &CiphertextPayload) -> u64 {
    let zero = data.zero_bytes() as u64;
    let non_zero = data.byte_len() as u64 - zero;
    TX_BASE_GAS + zero * TX_DATA_ZERO_GAS + non_zero * TX_DATA_NON_ZERO_GAS
}

/// Submits through `eth_sendTransaction` with a fixed gas limit.
#[derive(Debug, Clone)]
pub struct LedgerSubmitter {
    gas_limit: u64,
}

impl LedgerSubmitter {
    pub fn new(config: &SubmissionConfig) -> Self {
        Self {
            gas_limit: config.gas_limit,
        }
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }
}

impl Default for LedgerSubmitter {
    fn default() -> Self {
        Self::new(&SubmissionConfig::default())
    }
}

#[async_trait]
impl Submitter for LedgerSubmitter {
    #[instrument(skip(self, connection, ciphertext), fields(to = ?recipient, data_len = ciphertext.byte_len()))]
    async fn submit(
        &self,
        connection: &dyn LedgerConnection,
        recipient: Address,
        ciphertext: &CiphertextPayload,
    ) -> PipelineResult<TransactionReceipt> {
        let sender = connection
            .accounts()
            .await?
            .first()
            .copied()
            .ok_or(PipelineError::NoAccount)?;

        let nonce = connection.transaction_count(sender, BlockTag::Latest).await?;
        let chain_id = connection.chain_id().await?;
        debug!(?sender, %nonce, %chain_id, "transaction context resolved");

        let required = intrinsic_gas(ciphertext);
        if required > self.gas_limit {
            warn!(
                required,
                gas_limit = self.gas_limit,
                "gas limit below intrinsic gas, node will likely reject"
            );
        }

        let tx = TransactionRequest {
            from: sender,
            to: recipient,
            data: ciphertext.clone(),
            gas: U256::from(self.gas_limit),
            nonce,
            chain_id,
        };
        let receipt = connection.send_transaction(&tx).await?;

        TRANSACTIONS_SUBMITTED.inc();
        info!(hash = receipt.hash().unwrap_or("<none>"), "transaction submitted");
        Ok(receipt)
    }
}

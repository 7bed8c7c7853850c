//! Inbound (Driving) ports for the encryption pipeline.
//!
//! `EncryptedSubmissionApi` is what callers use. The three stage traits are
//! the seams the orchestrator is assembled from; each has one production
//! implementation in `crate::service`.

use async_trait::async_trait;

use super::outbound::LedgerConnection;
use crate::domain::{
    Address, CiphertextPayload, PipelineResult, PlaintextPayload, PublicKey, TransactionReceipt,
};

/// Resolves the current aggregate public key.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// # Errors
    /// - `Connectivity` when the authority cannot be reached
    /// - `MalformedResponse` when the answer is not a key
    async fn fetch(&self, connection: &dyn LedgerConnection) -> PipelineResult<PublicKey>;
}

/// Turns plaintext into ciphertext under a public key.
#[async_trait]
pub trait Encryptor: Send + Sync {
    /// # Errors
    /// - `EncryptionFailure` for anything that goes wrong in or around the module
    async fn encrypt(
        &self,
        plaintext: &PlaintextPayload,
        key: &PublicKey,
    ) -> PipelineResult<CiphertextPayload>;
}

/// Packages ciphertext as a transaction and hands it to the node.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// # Errors
    /// - `NoAccount` when the node manages no sender account
    /// - `Connectivity` for any failed round trip
    async fn submit(
        &self,
        connection: &dyn LedgerConnection,
        recipient: Address,
        ciphertext: &CiphertextPayload,
    ) -> PipelineResult<TransactionReceipt>;
}

/// Public API: fetch key, encrypt, submit.
#[async_trait]
pub trait EncryptedSubmissionApi: Send + Sync {
    /// Stops at the first failing stage and returns its error.
    async fn encrypt_and_send(
        &self,
        connection: &dyn LedgerConnection,
        recipient: Address,
        plaintext: &PlaintextPayload,
    ) -> PipelineResult<TransactionReceipt>;
}

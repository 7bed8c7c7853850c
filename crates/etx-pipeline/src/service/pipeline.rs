//! # Encrypt-and-Send Pipeline
//!
//! Orchestrates the three stages in order:
//!
//! ```text
//! fetch key ──→ encrypt ──→ submit
//!     │            │           │
//!     └── first error stops the pipeline and is returned as-is
//! ```
//!
//! Every stage is timed and its outcome counted in `etx_pipeline_stage_total`
//! under the stage name and either `ok` or the error kind.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use etx_telemetry::{record_stage, StageTimer};
use tracing::{info, instrument, Instrument};

use super::{ContractKeyFetcher, LedgerSubmitter, ModuleEncryptor};
use crate::domain::{
    Address, PipelineConfig, PipelineResult, PlaintextPayload, TransactionReceipt,
};
use crate::ports::{
    EncryptedSubmissionApi, Encryptor, KeyFetcher, LedgerConnection, ModuleFactory, Submitter,
};

/// Run one stage with timing and outcome accounting.
async fn stage<T, F>(name: &'static str, fut: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    let _timer = StageTimer::start(name);
    let result = fut.instrument(tracing::debug_span!("stage", stage = name)).await;
    match &result {
        Ok(_) => record_stage(name, "ok"),
        Err(e) => record_stage(name, e.kind()),
    }
    result
}

/// The pipeline, generic over its three stages.
pub struct EncryptAndSend<K, E, S> {
    key_fetcher: K,
    encryptor: E,
    submitter: S,
}

impl<K, E, S> EncryptAndSend<K, E, S>
where
    K: KeyFetcher,
    E: Encryptor,
    S: Submitter,
{
    pub fn new(key_fetcher: K, encryptor: E, submitter: S) -> Self {
        Self {
            key_fetcher,
            encryptor,
            submitter,
        }
    }

    pub fn encryptor(&self) -> &E {
        &self.encryptor
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }
}

/// Pipeline assembled from the production stages.
pub type DefaultPipeline = EncryptAndSend<ContractKeyFetcher, ModuleEncryptor, LedgerSubmitter>;

impl DefaultPipeline {
    /// Validate `config` and build the production stages from it.
    pub fn from_config(
        config: &PipelineConfig,
        factory: Arc<dyn ModuleFactory>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self::new(
            ContractKeyFetcher::new(&config.key_authority)?,
            ModuleEncryptor::new(factory, config.encryption.lifecycle),
            LedgerSubmitter::new(&config.submission),
        ))
    }
}

#[async_trait]
impl<K, E, S> EncryptedSubmissionApi for EncryptAndSend<K, E, S>
where
    K: KeyFetcher,
    E: Encryptor,
    S: Submitter,
{
    #[instrument(skip(self, connection, plaintext), fields(to = ?recipient, plaintext_len = plaintext.len()))]
    async fn encrypt_and_send(
        &self,
        connection: &dyn LedgerConnection,
        recipient: Address,
        plaintext: &PlaintextPayload,
    ) -> PipelineResult<TransactionReceipt> {
        let key = stage("key_fetch", self.key_fetcher.fetch(connection)).await?;
        let ciphertext = stage("encrypt", self.encryptor.encrypt(plaintext, &key)).await?;
        let receipt = stage(
            "submit",
            self.submitter.submit(connection, recipient, &ciphertext),
        )
        .await?;

        info!(hash = receipt.hash().unwrap_or("<none>"), "encrypted transaction sent");
        Ok(receipt)
    }
}

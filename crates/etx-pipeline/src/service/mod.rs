//! Stage implementations and the orchestrator that chains them.

mod encryptor;
mod key_fetcher;
mod pipeline;
mod submitter;

pub use encryptor::ModuleEncryptor;
pub use key_fetcher::ContractKeyFetcher;
pub use pipeline::{DefaultPipeline, EncryptAndSend};
pub use submitter::LedgerSubmitter;

//! Ports (hexagonal architecture boundaries).

pub mod inbound;
pub mod outbound;

pub use inbound::{EncryptedSubmissionApi, Encryptor, KeyFetcher, Submitter};
pub use outbound::{EncryptionModule, LedgerConnection, ModuleFactory};

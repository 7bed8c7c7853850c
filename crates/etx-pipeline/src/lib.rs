//! # Encrypted Transaction Pipeline
//!
//! Encrypts a plaintext payload under the network's aggregate threshold
//! public key and submits the ciphertext as transaction data.
//!
//! ## Pipeline
//!
//! ```text
//! [plaintext] ──fetch key──→ [PublicKey] ──encrypt──→ [Ciphertext] ──submit──→ [receipt]
//!                  │                         │                        │
//!            eth_call on the           encryption module        eth_accounts,
//!            key authority             (wasm, via wasmtime)     nonce, chain id,
//!                                                               eth_sendTransaction
//! ```
//!
//! | Stage | Trait | Implementation | Error on failure |
//! |-------|-------|----------------|------------------|
//! | Fetch key | `KeyFetcher` | `ContractKeyFetcher` | `Connectivity`, `MalformedResponse` |
//! | Encrypt | `Encryptor` | `ModuleEncryptor` | `EncryptionFailure` |
//! | Submit | `Submitter` | `LedgerSubmitter` | `NoAccount`, `Connectivity` |
//!
//! ## Module Memory
//!
//! Both input buffers handed to the module are released on every exit path,
//! including traps. The ciphertext buffer returned by `encryptMessage` is
//! owned by the module and never freed by the host.
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/rpc_client.rs  - HttpConnection (JSON-RPC over HTTP)  │
//! │  adapters/wasm_module.rs - WasmModuleFactory (wasmtime)         │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - EncryptedSubmissionApi + stage traits      │
//! │  ports/outbound.rs - LedgerConnection, EncryptionModule         │
//! │  service/          - stage implementations, EncryptAndSend      │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/types.rs  - PublicKey, payloads, transaction request    │
//! │  domain/config.rs - PipelineConfig                              │
//! │  domain/error.rs  - PipelineError                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = PipelineConfig::default();
//! let connection = HttpConnection::new(&config.rpc)?;
//! let factory = Arc::new(WasmModuleFactory::load(&config.encryption).await?);
//! let pipeline = DefaultPipeline::from_config(&config, factory)?;
//!
//! let receipt = pipeline
//!     .encrypt_and_send(&connection, recipient, &"hello".into())
//!     .await?;
//! ```

#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::*;
pub use domain::*;
pub use ports::*;
pub use service::*;

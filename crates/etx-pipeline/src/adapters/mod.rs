//! Adapters layer: concrete node connection and encryption module host.

pub mod rpc_client;
pub mod wasm_module;

pub use rpc_client::HttpConnection;
pub use wasm_module::{WasmEncryptionModule, WasmModuleFactory};

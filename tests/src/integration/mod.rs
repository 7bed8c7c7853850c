//! Integration tests: real JSON-RPC transport and real wasm instances.

mod http_pipeline;
mod wasm_module;

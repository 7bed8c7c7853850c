//! JSON-RPC over HTTP connection to an Ethereum-compatible node.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{instrument, trace};

use crate::domain::{
    Address, BlockTag, CallRequest, ConnectionError, RpcConfig, TransactionReceipt,
    TransactionRequest, U256,
};
use crate::ports::LedgerConnection;

/// JSON-RPC request structure.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure. `jsonrpc` and `id` are not checked.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn into_result<R: DeserializeOwned>(self) -> Result<R, ConnectionError> {
        if let Some(error) = self.error {
            return Err(ConnectionError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        let result = self
            .result
            .ok_or_else(|| ConnectionError::InvalidResponse("response missing result".into()))?;
        serde_json::from_value(result).map_err(|e| ConnectionError::InvalidResponse(e.to_string()))
    }
}

/// [`LedgerConnection`] speaking JSON-RPC 2.0 over HTTP POST.
pub struct HttpConnection {
    http_client: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
}

impl HttpConnection {
    pub fn new(config: &RpcConfig) -> Result<Self, ConnectionError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            rpc_url: config.url.clone(),
            request_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.rpc_url
    }

    /// Make a JSON-RPC call.
    async fn request<P: Serialize + Send, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, ConnectionError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        trace!(method, id, "sending rpc request");

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        let status = response.status();
        let body: JsonRpcResponse = response.json().await.map_err(|e| {
            if status.is_success() {
                ConnectionError::InvalidResponse(e.to_string())
            } else {
                ConnectionError::Transport(format!("http status {}", status))
            }
        })?;

        body.into_result()
    }
}

#[async_trait]
impl LedgerConnection for HttpConnection {
    #[instrument(skip(self, request), fields(to = ?request.to))]
    async fn call(
        &self,
        request: &CallRequest,
        block: BlockTag,
    ) -> Result<String, ConnectionError> {
        self.request("eth_call", (request, block)).await
    }

    async fn accounts(&self) -> Result<Vec<Address>, ConnectionError> {
        self.request("eth_accounts", Vec::<()>::new()).await
    }

    async fn transaction_count(
        &self,
        address: Address,
        block: BlockTag,
    ) -> Result<U256, ConnectionError> {
        self.request("eth_getTransactionCount", (address, block))
            .await
    }

    async fn chain_id(&self) -> Result<U256, ConnectionError> {
        self.request("eth_chainId", Vec::<()>::new()).await
    }

    #[instrument(skip(self, tx), fields(from = ?tx.from, nonce = %tx.nonce))]
    async fn send_transaction(
        &self,
        tx: &TransactionRequest,
    ) -> Result<TransactionReceipt, ConnectionError> {
        self.request("eth_sendTransaction", [tx]).await
    }
}

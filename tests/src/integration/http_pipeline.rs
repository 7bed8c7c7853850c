//! # HTTP Pipeline Tests
//!
//! Full `EncryptAndSend` runs over `HttpConnection` against the stub node,
//! with the encryption module compiled from WAT.
//!
//! ## Flow Tested:
//!
//! 1. `eth_call` to the key authority at `latest`
//! 2. Encryption inside a wasmtime instance
//! 3. `eth_accounts`, `eth_getTransactionCount`, `eth_chainId`
//! 4. `eth_sendTransaction` with the ciphertext as data

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use etx_pipeline::{
        domain::config::KEY_AUTHORITY_ADDRESS, Address, DefaultPipeline, EncryptedSubmissionApi,
        HttpConnection, ModuleFactory, PipelineConfig, PipelineError, RpcConfig,
    };
    use serde_json::{json, Value};
    use tokio_test::{assert_err, assert_ok};

    use crate::fixtures;
    use crate::stub_node::{StubNode, StubScript};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn recipient() -> Address {
        Address::repeat_byte(0x42)
    }

    fn pipeline(wat: &str) -> DefaultPipeline {
        let factory: Arc<dyn ModuleFactory> = Arc::new(fixtures::factory(wat).unwrap());
        DefaultPipeline::from_config(&PipelineConfig::default(), factory).unwrap()
    }

    fn connect(node: &StubNode) -> HttpConnection {
        HttpConnection::new(&RpcConfig {
            url: node.url(),
            ..Default::default()
        })
        .unwrap()
    }

    // =============================================================================
    // HAPPY PATH
    // =============================================================================

    #[tokio::test]
    async fn test_end_to_end_submission() {
        let node = StubNode::start(StubScript::default()).await.unwrap();
        let conn = connect(&node);

        let receipt = pipeline(fixtures::FIXED_CIPHERTEXT)
            .encrypt_and_send(&conn, recipient(), &"hello".into())
            .await
            .unwrap();

        assert_eq!(receipt.hash(), Some("0xfeedface"));
        assert_eq!(
            node.methods(),
            vec![
                "eth_call",
                "eth_accounts",
                "eth_getTransactionCount",
                "eth_chainId",
                "eth_sendTransaction"
            ]
        );

        let send = node.request("eth_sendTransaction").unwrap();
        let tx = &send["params"][0];
        assert_eq!(tx["from"], "0x1111111111111111111111111111111111111111");
        assert_eq!(tx["to"], serde_json::to_value(recipient()).unwrap());
        assert_eq!(tx["data"], "0xcafebabe");
        assert_eq!(tx["nonce"], "0x7");
        assert_eq!(tx["chainId"], "0x539");
        assert_eq!(tx["gas"], "0xf4240");
    }

    #[tokio::test]
    async fn test_key_request_targets_authority() {
        let node = StubNode::start(StubScript::default()).await.unwrap();
        let conn = connect(&node);

        assert_ok!(
            pipeline(fixtures::FIXED_CIPHERTEXT)
                .encrypt_and_send(&conn, recipient(), &"hello".into())
                .await
        );

        let call = node.request("eth_call").unwrap();
        assert_eq!(call["jsonrpc"], "2.0");
        assert_eq!(
            call["params"][0]["to"],
            serde_json::to_value(KEY_AUTHORITY_ADDRESS).unwrap()
        );
        assert_eq!(call["params"][0]["data"], "0x554ef7a6");
        assert_eq!(call["params"][1], "latest");

        let nonce = node.request("eth_getTransactionCount").unwrap();
        assert_eq!(
            nonce["params"],
            json!(["0x1111111111111111111111111111111111111111", "latest"])
        );
    }

    #[tokio::test]
    async fn test_object_receipt_passed_through() {
        let receipt_object = json!({ "transactionHash": "0xabc", "status": "0x1" });
        let node = StubNode::start(StubScript {
            send_result: receipt_object.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
        let conn = connect(&node);

        let receipt = pipeline(fixtures::FIXED_CIPHERTEXT)
            .encrypt_and_send(&conn, recipient(), &"hello".into())
            .await
            .unwrap();

        assert_eq!(receipt.hash(), Some("0xabc"));
        assert_eq!(receipt.into_inner(), receipt_object);
    }

    // =============================================================================
    // FAILURES
    // =============================================================================

    #[tokio::test]
    async fn test_unreachable_node() {
        let conn = HttpConnection::new(&RpcConfig {
            url: "http://127.0.0.1:1".into(),
            ..Default::default()
        })
        .unwrap();

        let err = assert_err!(
            pipeline(fixtures::FIXED_CIPHERTEXT)
                .encrypt_and_send(&conn, recipient(), &"hello".into())
                .await
        );
        assert!(matches!(err, PipelineError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_key_authority_error_stops_pipeline() {
        let node = StubNode::start(StubScript {
            fail_method: Some("eth_call"),
            ..Default::default()
        })
        .await
        .unwrap();
        let conn = connect(&node);

        let err = pipeline(fixtures::FIXED_CIPHERTEXT)
            .encrypt_and_send(&conn, recipient(), &"hello".into())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Connectivity(_)));
        assert_eq!(node.methods(), vec!["eth_call"]);
    }

    #[tokio::test]
    async fn test_malformed_key() {
        let node = StubNode::start(StubScript {
            key: json!("not-a-key"),
            ..Default::default()
        })
        .await
        .unwrap();
        let conn = connect(&node);

        let err = pipeline(fixtures::FIXED_CIPHERTEXT)
            .encrypt_and_send(&conn, recipient(), &"hello".into())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MalformedResponse(_)));
        assert_eq!(node.methods(), vec!["eth_call"]);
    }

    async fn assert_key_result_malformed(key: Value) {
        let node = StubNode::start(StubScript {
            key,
            ..Default::default()
        })
        .await
        .unwrap();
        let conn = connect(&node);

        let err = pipeline(fixtures::FIXED_CIPHERTEXT)
            .encrypt_and_send(&conn, recipient(), &"hello".into())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MalformedResponse(_)), "{err:?}");
        assert_eq!(node.methods(), vec!["eth_call"]);
    }

    #[tokio::test]
    async fn test_null_key_result_is_malformed() {
        assert_key_result_malformed(Value::Null).await;
    }

    #[tokio::test]
    async fn test_numeric_key_result_is_malformed() {
        assert_key_result_malformed(json!(42)).await;
    }

    #[tokio::test]
    async fn test_trapping_module_skips_submission() {
        let node = StubNode::start(StubScript::default()).await.unwrap();
        let conn = connect(&node);

        let err = pipeline(fixtures::TRAPPING)
            .encrypt_and_send(&conn, recipient(), &"hello".into())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::EncryptionFailure(_)));
        assert_eq!(node.methods(), vec!["eth_call"]);
    }

    #[tokio::test]
    async fn test_no_managed_account() {
        let node = StubNode::start(StubScript {
            accounts: Value::Array(Vec::new()),
            ..Default::default()
        })
        .await
        .unwrap();
        let conn = connect(&node);

        let err = pipeline(fixtures::FIXED_CIPHERTEXT)
            .encrypt_and_send(&conn, recipient(), &"hello".into())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoAccount));
        assert!(node.request("eth_sendTransaction").is_none());
    }

    #[tokio::test]
    async fn test_rejected_transaction() {
        let node = StubNode::start(StubScript {
            fail_method: Some("eth_sendTransaction"),
            ..Default::default()
        })
        .await
        .unwrap();
        let conn = connect(&node);

        let err = pipeline(fixtures::FIXED_CIPHERTEXT)
            .encrypt_and_send(&conn, recipient(), &"hello".into())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Connectivity(_)));
        assert!(err.to_string().contains("rejected"));
    }
}

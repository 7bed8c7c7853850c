//! # Encryption Module Tests
//!
//! `ModuleEncryptor` driving real wasmtime instances. A counting decorator
//! sits between the encryptor and each instance to observe buffer traffic.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use etx_pipeline::{
        EncryptionError, EncryptionModule, Encryptor, ModuleEncryptor, ModuleError,
        ModuleFactory, ModuleLifecycle, ModulePtr, PipelineError, PlaintextPayload, PublicKey,
        WasmModuleFactory,
    };

    use crate::fixtures;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    #[derive(Default)]
    struct Traffic {
        instances: AtomicUsize,
        allocs: AtomicUsize,
        frees: AtomicUsize,
    }

    struct CountingModule {
        inner: Box<dyn EncryptionModule>,
        traffic: Arc<Traffic>,
    }

    impl EncryptionModule for CountingModule {
        fn allocate(&mut self, len: usize) -> Result<ModulePtr, ModuleError> {
            let ptr = self.inner.allocate(len)?;
            self.traffic.allocs.fetch_add(1, Ordering::SeqCst);
            Ok(ptr)
        }

        fn write(&mut self, ptr: ModulePtr, bytes: &[u8]) -> Result<(), ModuleError> {
            self.inner.write(ptr, bytes)
        }

        fn free(&mut self, ptr: ModulePtr) -> Result<(), ModuleError> {
            self.traffic.frees.fetch_add(1, Ordering::SeqCst);
            self.inner.free(ptr)
        }

        fn encrypt_message(
            &mut self,
            data: ModulePtr,
            key: ModulePtr,
        ) -> Result<ModulePtr, ModuleError> {
            self.inner.encrypt_message(data, key)
        }

        fn read_c_string(&mut self, ptr: ModulePtr) -> Result<Vec<u8>, ModuleError> {
            self.inner.read_c_string(ptr)
        }
    }

    struct CountingFactory {
        inner: WasmModuleFactory,
        traffic: Arc<Traffic>,
    }

    #[async_trait]
    impl ModuleFactory for CountingFactory {
        async fn instantiate(&self) -> Result<Box<dyn EncryptionModule>, ModuleError> {
            let inner = self.inner.instantiate().await?;
            self.traffic.instances.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingModule {
                inner,
                traffic: Arc::clone(&self.traffic),
            }))
        }
    }

    fn encryptor(wat: &str, lifecycle: ModuleLifecycle) -> (ModuleEncryptor, Arc<Traffic>) {
        let traffic = Arc::new(Traffic::default());
        let factory = CountingFactory {
            inner: fixtures::factory(wat).unwrap(),
            traffic: Arc::clone(&traffic),
        };
        (ModuleEncryptor::new(Arc::new(factory), lifecycle), traffic)
    }

    fn key() -> PublicKey {
        PublicKey::from_wire(&format!("0x{}", "ab".repeat(128)), Some(256)).unwrap()
    }

    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    // =============================================================================
    // TESTS
    // =============================================================================

    #[tokio::test]
    async fn test_fixed_ciphertext() {
        let (encryptor, traffic) = encryptor(fixtures::FIXED_CIPHERTEXT, ModuleLifecycle::PerCall);

        let ciphertext = encryptor.encrypt(&"hello".into(), &key()).await.unwrap();

        assert_eq!(ciphertext.as_str(), "cafebabe");
        assert_eq!(get(&traffic.allocs), 2);
        assert_eq!(get(&traffic.frees), 2);
    }

    #[tokio::test]
    async fn test_plaintext_reaches_module_intact() {
        let (encryptor, _) = encryptor(fixtures::ECHO_PLAINTEXT, ModuleLifecycle::PerCall);

        let ciphertext = encryptor
            .encrypt(&"00ff10deadbeef".into(), &key())
            .await
            .unwrap();

        assert_eq!(ciphertext.as_str(), "00ff10deadbeef");
        assert_eq!(ciphertext.byte_len(), 7);
        assert_eq!(ciphertext.zero_bytes(), 1);
    }

    #[tokio::test]
    async fn test_non_hex_result_rejected() {
        let (encryptor, traffic) = encryptor(fixtures::ECHO_PLAINTEXT, ModuleLifecycle::PerCall);

        let err = encryptor
            .encrypt(&"hello".into(), &key())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::EncryptionFailure(EncryptionError::InvalidResult)
        ));
        assert_eq!(get(&traffic.frees), 2);
    }

    #[tokio::test]
    async fn test_trap_releases_buffers() {
        let (encryptor, traffic) = encryptor(fixtures::TRAPPING, ModuleLifecycle::PerCall);

        let err = encryptor
            .encrypt(&"hello".into(), &key())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::EncryptionFailure(EncryptionError::Module(ModuleError::Trap(_)))
        ));
        assert_eq!(get(&traffic.allocs), 2);
        assert_eq!(get(&traffic.frees), 2);
    }

    #[tokio::test]
    async fn test_null_result_releases_buffers() {
        let (encryptor, traffic) = encryptor(fixtures::NULL_RESULT, ModuleLifecycle::PerCall);

        let err = encryptor
            .encrypt(&"hello".into(), &key())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::EncryptionFailure(EncryptionError::NullResult)
        ));
        assert_eq!(get(&traffic.frees), 2);
    }

    #[tokio::test]
    async fn test_empty_plaintext() {
        let (encryptor, traffic) = encryptor(fixtures::FIXED_CIPHERTEXT, ModuleLifecycle::PerCall);

        let ciphertext = encryptor
            .encrypt(&PlaintextPayload::from(Vec::new()), &key())
            .await
            .unwrap();

        assert_eq!(ciphertext.as_str(), "cafebabe");
        assert_eq!(get(&traffic.frees), 2);
    }

    #[tokio::test]
    async fn test_shared_instance_reused() {
        let (encryptor, traffic) = encryptor(fixtures::FIXED_CIPHERTEXT, ModuleLifecycle::Shared);

        for _ in 0..3 {
            encryptor.encrypt(&"hello".into(), &key()).await.unwrap();
        }

        assert_eq!(get(&traffic.instances), 1);
        assert_eq!(get(&traffic.allocs), 6);
        assert_eq!(get(&traffic.frees), 6);
    }

    #[tokio::test]
    async fn test_shared_instance_does_not_exhaust_memory() {
        // Each call takes ~300 bytes of a 64 KiB memory; only release keeps it going
        let (encryptor, traffic) = encryptor(fixtures::FIXED_CIPHERTEXT, ModuleLifecycle::Shared);

        for _ in 0..1_000 {
            encryptor.encrypt(&"hello".into(), &key()).await.unwrap();
        }

        assert_eq!(get(&traffic.instances), 1);
        assert_eq!(get(&traffic.frees), 2_000);
    }

    #[tokio::test]
    async fn test_shared_instance_rebuilt_after_trap() {
        let (encryptor, traffic) = encryptor(fixtures::STACK_LEAKING, ModuleLifecycle::Shared);

        for _ in 0..8 {
            let err = encryptor.encrypt(&"boom".into(), &key()).await.unwrap_err();
            assert!(matches!(
                err,
                PipelineError::EncryptionFailure(EncryptionError::Module(ModuleError::Trap(_)))
            ));
        }
        let ciphertext = encryptor.encrypt(&"hello".into(), &key()).await.unwrap();

        assert_eq!(ciphertext.as_str(), "cafebabe");
        assert_eq!(get(&traffic.instances), 9);
        assert_eq!(get(&traffic.frees), get(&traffic.allocs));
    }

    #[tokio::test]
    async fn test_per_call_instances() {
        let (encryptor, traffic) = encryptor(fixtures::FIXED_CIPHERTEXT, ModuleLifecycle::PerCall);

        for _ in 0..3 {
            encryptor.encrypt(&"hello".into(), &key()).await.unwrap();
        }

        assert_eq!(get(&traffic.instances), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_instance_concurrent_callers() {
        let (encryptor, traffic) = encryptor(fixtures::FIXED_CIPHERTEXT, ModuleLifecycle::Shared);
        let encryptor = Arc::new(encryptor);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let encryptor = Arc::clone(&encryptor);
                tokio::spawn(async move { encryptor.encrypt(&"hello".into(), &key()).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_str(), "cafebabe");
        }

        assert_eq!(get(&traffic.instances), 1);
        assert_eq!(get(&traffic.frees), 32);
    }
}

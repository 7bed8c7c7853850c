//! Outbound (Driven) ports for the encryption pipeline.
//!
//! The node connection and the encryption module are external collaborators;
//! the pipeline only talks to them through these traits.

use async_trait::async_trait;

use crate::domain::{
    Address, BlockTag, CallRequest, ConnectionError, ModuleError, ModulePtr, TransactionReceipt,
    TransactionRequest, U256,
};

/// Connection to a node speaking the Ethereum JSON-RPC methods the pipeline uses.
#[async_trait]
pub trait LedgerConnection: Send + Sync {
    /// `eth_call`. Returns the raw `0x`-prefixed result string.
    async fn call(&self, request: &CallRequest, block: BlockTag)
        -> Result<String, ConnectionError>;

    /// `eth_accounts`.
    async fn accounts(&self) -> Result<Vec<Address>, ConnectionError>;

    /// `eth_getTransactionCount`.
    async fn transaction_count(
        &self,
        address: Address,
        block: BlockTag,
    ) -> Result<U256, ConnectionError>;

    /// `eth_chainId`.
    async fn chain_id(&self) -> Result<U256, ConnectionError>;

    /// `eth_sendTransaction`. The node's result is returned as-is.
    async fn send_transaction(
        &self,
        tx: &TransactionRequest,
    ) -> Result<TransactionReceipt, ConnectionError>;
}

/// One live instance of the encryption module.
///
/// Pointers refer to the instance's own memory. Every buffer obtained from
/// [`allocate`](Self::allocate) must be handed back to [`free`](Self::free)
/// exactly once; the result of `encrypt_message` belongs to the module.
pub trait EncryptionModule: Send {
    /// Reserve `len` bytes of module memory.
    fn allocate(&mut self, len: usize) -> Result<ModulePtr, ModuleError>;

    /// Copy `bytes` into module memory at `ptr`.
    fn write(&mut self, ptr: ModulePtr, bytes: &[u8]) -> Result<(), ModuleError>;

    /// Release a buffer obtained from `allocate`.
    fn free(&mut self, ptr: ModulePtr) -> Result<(), ModuleError>;

    /// Invoke `encryptMessage(data, key)`; both point at NUL-terminated strings.
    fn encrypt_message(
        &mut self,
        data: ModulePtr,
        key: ModulePtr,
    ) -> Result<ModulePtr, ModuleError>;

    /// Copy the NUL-terminated string at `ptr` out of module memory (terminator excluded).
    fn read_c_string(&mut self, ptr: ModulePtr) -> Result<Vec<u8>, ModuleError>;
}

/// Produces ready-to-use module instances. Construction may be slow.
#[async_trait]
pub trait ModuleFactory: Send + Sync {
    async fn instantiate(&self) -> Result<Box<dyn EncryptionModule>, ModuleError>;
}

// =============================================================================
// TEST DOUBLES
// =============================================================================

/// Scripted node for testing.
#[cfg(test)]
pub struct MockConnection {
    pub key_response: Result<String, ConnectionError>,
    pub accounts: Vec<Address>,
    pub nonce: u64,
    pub chain_id: u64,
    pub receipt: serde_json::Value,
    pub fail_send: bool,
    pub calls: parking_lot::Mutex<Vec<&'static str>>,
    pub call_requests: parking_lot::Mutex<Vec<(CallRequest, BlockTag)>>,
    pub sent: parking_lot::Mutex<Vec<TransactionRequest>>,
    pub nonce_queries: parking_lot::Mutex<Vec<(Address, BlockTag)>>,
}

#[cfg(test)]
impl MockConnection {
    pub fn new() -> Self {
        Self {
            key_response: Ok("0x1234".to_string()),
            accounts: vec![Address::repeat_byte(0xaa)],
            nonce: 0,
            chain_id: 1,
            receipt: serde_json::json!({ "hash": "0xdead" }),
            fail_send: false,
            calls: parking_lot::Mutex::new(Vec::new()),
            call_requests: parking_lot::Mutex::new(Vec::new()),
            sent: parking_lot::Mutex::new(Vec::new()),
            nonce_queries: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn with_key_response(mut self, raw: &str) -> Self {
        self.key_response = Ok(raw.to_string());
        self
    }

    pub fn unreachable_authority(mut self) -> Self {
        self.key_response = Err(ConnectionError::Transport("connection refused".to_string()));
        self
    }

    /// `eth_call` answers with a result that is not a string.
    pub fn undecodable_key(mut self) -> Self {
        self.key_response = Err(ConnectionError::InvalidResponse(
            "invalid type: null, expected a string".to_string(),
        ));
        self
    }

    pub fn with_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LedgerConnection for MockConnection {
    async fn call(
        &self,
        request: &CallRequest,
        block: BlockTag,
    ) -> Result<String, ConnectionError> {
        self.calls.lock().push("eth_call");
        self.call_requests.lock().push((request.clone(), block));
        self.key_response.clone()
    }

    async fn accounts(&self) -> Result<Vec<Address>, ConnectionError> {
        self.calls.lock().push("eth_accounts");
        Ok(self.accounts.clone())
    }

    async fn transaction_count(
        &self,
        address: Address,
        block: BlockTag,
    ) -> Result<U256, ConnectionError> {
        self.calls.lock().push("eth_getTransactionCount");
        self.nonce_queries.lock().push((address, block));
        Ok(U256::from(self.nonce))
    }

    async fn chain_id(&self) -> Result<U256, ConnectionError> {
        self.calls.lock().push("eth_chainId");
        Ok(U256::from(self.chain_id))
    }

    async fn send_transaction(
        &self,
        tx: &TransactionRequest,
    ) -> Result<TransactionReceipt, ConnectionError> {
        self.calls.lock().push("eth_sendTransaction");
        if self.fail_send {
            return Err(ConnectionError::Rpc {
                code: -32000,
                message: "nonce too low".to_string(),
            });
        }
        self.sent.lock().push(tx.clone());
        Ok(TransactionReceipt(self.receipt.clone()))
    }
}

/// How a [`FakeModule`] misbehaves.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Return `output` as the ciphertext
    Succeed,
    /// Trap inside `encryptMessage`
    Trap,
    /// Return a null pointer from `encryptMessage`
    NullResult,
    /// Fail the second allocation
    FailSecondAlloc,
    /// Fail the second write
    FailSecondWrite,
    /// Block the calling thread for a while, then succeed
    Slow,
}

/// Allocation bookkeeping shared between a fake module and the test.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FakeModuleStats {
    pub instances: std::sync::atomic::AtomicUsize,
    pub allocs: std::sync::atomic::AtomicUsize,
    pub frees: std::sync::atomic::AtomicUsize,
    pub invocations: std::sync::atomic::AtomicUsize,
    pub live: parking_lot::Mutex<std::collections::HashSet<u32>>,
    pub freed_twice: std::sync::atomic::AtomicUsize,
    /// (data, key) strings seen by `encrypt_message`
    pub inputs: parking_lot::Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
}

#[cfg(test)]
impl FakeModuleStats {
    pub fn get(counter: &std::sync::atomic::AtomicUsize) -> usize {
        counter.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// In-memory stand-in for the encryption module.
#[cfg(test)]
pub struct FakeModule {
    memory: Vec<u8>,
    next: usize,
    behavior: FakeBehavior,
    output: Vec<u8>,
    stats: std::sync::Arc<FakeModuleStats>,
}

#[cfg(test)]
impl FakeModule {
    pub fn new(
        behavior: FakeBehavior,
        output: &str,
        stats: std::sync::Arc<FakeModuleStats>,
    ) -> Self {
        Self {
            memory: vec![0u8; 64 * 1024],
            // Address 0 stays reserved for null
            next: 16,
            behavior,
            output: output.as_bytes().to_vec(),
            stats,
        }
    }

    fn c_string_at(&self, ptr: ModulePtr) -> Vec<u8> {
        self.memory[ptr.0 as usize..]
            .iter()
            .take_while(|b| **b != 0)
            .copied()
            .collect()
    }
}

#[cfg(test)]
impl EncryptionModule for FakeModule {
    fn allocate(&mut self, len: usize) -> Result<ModulePtr, ModuleError> {
        use std::sync::atomic::Ordering;
        let previous = self.stats.allocs.load(Ordering::SeqCst);
        if self.behavior == FakeBehavior::FailSecondAlloc && previous % 2 == 1 {
            return Err(ModuleError::AllocationFailed(len));
        }
        if self.next + len > self.memory.len() {
            return Err(ModuleError::AllocationFailed(len));
        }
        let ptr = self.next as u32;
        self.next += len;
        self.stats.allocs.fetch_add(1, Ordering::SeqCst);
        self.stats.live.lock().insert(ptr);
        Ok(ModulePtr(ptr))
    }

    fn write(&mut self, ptr: ModulePtr, bytes: &[u8]) -> Result<(), ModuleError> {
        use std::sync::atomic::Ordering;
        if self.behavior == FakeBehavior::FailSecondWrite
            && self.stats.allocs.load(Ordering::SeqCst) % 2 == 0
        {
            return Err(ModuleError::OutOfBounds {
                ptr: ptr.0,
                len: bytes.len(),
            });
        }
        let start = ptr.0 as usize;
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn free(&mut self, ptr: ModulePtr) -> Result<(), ModuleError> {
        use std::sync::atomic::Ordering;
        if !self.stats.live.lock().remove(&ptr.0) {
            self.stats.freed_twice.fetch_add(1, Ordering::SeqCst);
        }
        self.stats.frees.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn encrypt_message(
        &mut self,
        data: ModulePtr,
        key: ModulePtr,
    ) -> Result<ModulePtr, ModuleError> {
        use std::sync::atomic::Ordering;
        self.stats.invocations.fetch_add(1, Ordering::SeqCst);
        self.stats
            .inputs
            .lock()
            .push((self.c_string_at(data), self.c_string_at(key)));
        match self.behavior {
            FakeBehavior::Trap => Err(ModuleError::Trap("unreachable executed".into())),
            FakeBehavior::NullResult => Ok(ModulePtr::NULL),
            _ => {
                if self.behavior == FakeBehavior::Slow {
                    std::thread::sleep(std::time::Duration::from_millis(200));
                }
                // Result lives in a module-owned region that is never freed
                let ptr = self.next;
                self.memory[ptr..ptr + self.output.len()].copy_from_slice(&self.output);
                self.memory[ptr + self.output.len()] = 0;
                self.next += self.output.len() + 1;
                Ok(ModulePtr(ptr as u32))
            }
        }
    }

    fn read_c_string(&mut self, ptr: ModulePtr) -> Result<Vec<u8>, ModuleError> {
        Ok(self.c_string_at(ptr))
    }
}

/// Factory handing out [`FakeModule`]s that share one stats block.
#[cfg(test)]
pub struct FakeModuleFactory {
    pub behavior: FakeBehavior,
    pub output: String,
    pub stats: std::sync::Arc<FakeModuleStats>,
}

#[cfg(test)]
impl FakeModuleFactory {
    pub fn new(behavior: FakeBehavior, output: &str) -> Self {
        Self {
            behavior,
            output: output.to_string(),
            stats: std::sync::Arc::new(FakeModuleStats::default()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ModuleFactory for FakeModuleFactory {
    async fn instantiate(&self) -> Result<Box<dyn EncryptionModule>, ModuleError> {
        self.stats
            .instances
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(Box::new(FakeModule::new(
            self.behavior,
            &self.output,
            std::sync::Arc::clone(&self.stats),
        )))
    }
}

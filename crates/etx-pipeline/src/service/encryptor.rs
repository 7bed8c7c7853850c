//! Encryption through the external module.
//!
//! Inputs are copied into module memory as NUL-terminated buffers owned by a
//! [`BufferScope`]. The scope frees every buffer it allocated when it goes
//! out of scope, so a trap inside `encryptMessage`, a failed write or a
//! failed second allocation cannot leak module memory.
//!
//! Module calls are synchronous and run on the blocking pool. A shared
//! instance that fails inside the module is dropped and rebuilt on next use.

use std::ffi::{CStr, CString};
use std::sync::Arc;

use async_trait::async_trait;
use etx_telemetry::metrics::{MODULE_BUFFERS_ALLOCATED, MODULE_BUFFERS_FREED, MODULE_INSTANCES};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn, Span};

use crate::domain::{
    CiphertextPayload, EncryptionError, ModuleError, ModuleLifecycle, ModulePtr, PipelineResult,
    PlaintextPayload, PublicKey,
};
use crate::ports::{EncryptionModule, Encryptor, ModuleFactory};

/// Input buffers allocated in module memory for one invocation.
struct BufferScope<'m, M: EncryptionModule + ?Sized> {
    module: &'m mut M,
    buffers: Vec<ModulePtr>,
}

impl<'m, M: EncryptionModule + ?Sized> BufferScope<'m, M> {
    fn new(module: &'m mut M) -> Self {
        Self {
            module,
            buffers: Vec::with_capacity(2),
        }
    }

    /// Copy `value` (terminator included) into a fresh module buffer.
    fn marshal(&mut self, value: &CStr) -> Result<ModulePtr, ModuleError> {
        let bytes = value.to_bytes_with_nul();
        let ptr = self.module.allocate(bytes.len())?;
        if ptr.is_null() {
            return Err(ModuleError::AllocationFailed(bytes.len()));
        }
        // Tracked before writing so a failed write still frees it
        self.buffers.push(ptr);
        MODULE_BUFFERS_ALLOCATED.inc();

        self.module.write(ptr, bytes)?;
        Ok(ptr)
    }

    fn module(&mut self) -> &mut M {
        &mut *self.module
    }
}

impl<M: EncryptionModule + ?Sized> Drop for BufferScope<'_, M> {
    fn drop(&mut self) {
        for ptr in self.buffers.drain(..).rev() {
            match self.module.free(ptr) {
                Ok(()) => MODULE_BUFFERS_FREED.inc(),
                Err(e) => warn!(%ptr, error = %e, "failed to release module buffer"),
            }
        }
    }
}

/// Run `encryptMessage` once on an acquired module instance.
fn encrypt_in_module<M: EncryptionModule + ?Sized>(
    module: &mut M,
    data: &CStr,
    key: &CStr,
) -> Result<CiphertextPayload, EncryptionError> {
    let mut scope = BufferScope::new(module);
    let data_ptr = scope.marshal(data)?;
    let key_ptr = scope.marshal(key)?;

    let result = scope.module().encrypt_message(data_ptr, key_ptr)?;
    if result.is_null() {
        return Err(EncryptionError::NullResult);
    }
    let bytes = scope.module().read_c_string(result)?;
    drop(scope);

    CiphertextPayload::from_module_output(bytes)
}

type ModuleRun = (
    Box<dyn EncryptionModule>,
    Result<CiphertextPayload, EncryptionError>,
);

/// Run [`encrypt_in_module`] on the blocking pool, handing the instance back.
async fn run_blocking(
    mut module: Box<dyn EncryptionModule>,
    data: CString,
    key: CString,
) -> Result<ModuleRun, EncryptionError> {
    let span = Span::current();
    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let result = encrypt_in_module(module.as_mut(), &data, &key);
        (module, result)
    })
    .await
    .map_err(|e| EncryptionError::TaskFailed(e.to_string()))
}

/// [`Encryptor`] backed by a [`ModuleFactory`].
pub struct ModuleEncryptor {
    factory: Arc<dyn ModuleFactory>,
    lifecycle: ModuleLifecycle,
    /// Idle shared instance. Empty before first use and after a module failure.
    shared: Mutex<Option<Box<dyn EncryptionModule>>>,
}

impl ModuleEncryptor {
    pub fn new(factory: Arc<dyn ModuleFactory>, lifecycle: ModuleLifecycle) -> Self {
        Self {
            factory,
            lifecycle,
            shared: Mutex::new(None),
        }
    }

    pub fn lifecycle(&self) -> ModuleLifecycle {
        self.lifecycle
    }

    async fn instantiate(&self) -> Result<Box<dyn EncryptionModule>, ModuleError> {
        let module = self.factory.instantiate().await?;
        MODULE_INSTANCES.inc();
        debug!(lifecycle = ?self.lifecycle, "encryption module instantiated");
        Ok(module)
    }

    async fn encrypt_shared(
        &self,
        data: CString,
        key: CString,
    ) -> Result<CiphertextPayload, EncryptionError> {
        let mut slot = self.shared.lock().await;
        let module = match slot.take() {
            Some(module) => module,
            None => self.instantiate().await?,
        };

        let (module, result) = run_blocking(module, data, key).await?;
        match &result {
            Err(EncryptionError::Module(e)) => {
                warn!(error = %e, "discarding shared encryption module instance");
            }
            _ => *slot = Some(module),
        }
        result
    }
}

#[async_trait]
impl Encryptor for ModuleEncryptor {
    #[instrument(skip_all, fields(plaintext_len = plaintext.len(), lifecycle = ?self.lifecycle))]
    async fn encrypt(
        &self,
        plaintext: &PlaintextPayload,
        key: &PublicKey,
    ) -> PipelineResult<CiphertextPayload> {
        let data = CString::new(plaintext.as_bytes())
            .map_err(|_| EncryptionError::InteriorNul("plaintext"))?;
        let key = CString::new(key.as_hex())
            .map_err(|_| EncryptionError::InteriorNul("public key"))?;

        let ciphertext = match self.lifecycle {
            ModuleLifecycle::PerCall => {
                let module = self.instantiate().await?;
                let (_, result) = run_blocking(module, data, key).await?;
                result?
            }
            ModuleLifecycle::Shared => self.encrypt_shared(data, key).await?,
        };

        debug!(ciphertext_len = ciphertext.as_str().len(), "payload encrypted");
        Ok(ciphertext)
    }
}

//! WebAssembly encryption module hosted in wasmtime.
//!
//! The module must export a linear memory plus `malloc`, `free` and
//! `encryptMessage` (names configurable). Imports the module declares but the
//! host does not provide are linked as trapping stubs, so a module built for
//! a richer host still loads as long as the encryption path never calls them.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info, instrument};
use wasmtime::{Engine, Instance, Linker, Memory, Module, Store, TypedFunc};

use crate::domain::{EncryptionConfig, ModuleError, ModuleExports, ModulePtr};
use crate::ports::{EncryptionModule, ModuleFactory};

/// Reactor initialiser, called once per instance when exported.
const INITIALIZE_EXPORT: &str = "_initialize";

/// Compiled module plus what is needed to instantiate it.
#[derive(Clone)]
pub struct WasmModuleFactory {
    engine: Engine,
    module: Module,
    exports: ModuleExports,
    max_result_len: usize,
}

impl WasmModuleFactory {
    /// Compile the module at `config.module_path` off the async runtime.
    #[instrument(skip(config), fields(path = %config.module_path.display()))]
    pub async fn load(config: &EncryptionConfig) -> Result<Self, ModuleError> {
        let engine = Engine::default();
        let path = config.module_path.clone();
        let compile_engine = engine.clone();
        let module = tokio::task::spawn_blocking(move || compile_file(&compile_engine, &path))
            .await
            .map_err(|e| ModuleError::Load(e.to_string()))??;

        info!("encryption module compiled");
        Ok(Self {
            engine,
            module,
            exports: config.exports.clone(),
            max_result_len: config.max_result_len,
        })
    }

    /// Compile from in-memory `.wasm` bytes or `.wat` text.
    pub fn from_bytes(bytes: impl AsRef<[u8]>, config: &EncryptionConfig) -> Result<Self, ModuleError> {
        let engine = Engine::default();
        let module = Module::new(&engine, bytes.as_ref())
            .map_err(|e| ModuleError::Load(format!("{:#}", e)))?;
        Ok(Self {
            engine,
            module,
            exports: config.exports.clone(),
            max_result_len: config.max_result_len,
        })
    }

    fn instantiate_sync(&self) -> Result<WasmEncryptionModule, ModuleError> {
        let mut store = Store::new(&self.engine, ());
        let mut linker = Linker::new(&self.engine);
        linker
            .define_unknown_imports_as_traps(&self.module)
            .map_err(|e| ModuleError::Load(format!("{:#}", e)))?;
        let instance = linker
            .instantiate(&mut store, &self.module)
            .map_err(|e| ModuleError::Load(format!("{:#}", e)))?;

        if let Ok(init) = instance.get_typed_func::<(), ()>(&mut store, INITIALIZE_EXPORT) {
            init.call(&mut store, ()).map_err(trap)?;
        }

        let exports = &self.exports;
        let memory = instance
            .get_memory(&mut store, &exports.memory)
            .ok_or_else(|| ModuleError::MissingExport(exports.memory.clone()))?;
        let malloc = typed_export(&instance, &mut store, &exports.malloc)?;
        let free = typed_export(&instance, &mut store, &exports.free)?;
        let encrypt = typed_export(&instance, &mut store, &exports.encrypt)?;

        debug!("encryption module instantiated");
        Ok(WasmEncryptionModule {
            store,
            #[cfg(test)]
            instance,
            memory,
            malloc,
            free,
            encrypt,
            max_result_len: self.max_result_len,
        })
    }
}

#[async_trait]
impl ModuleFactory for WasmModuleFactory {
    async fn instantiate(&self) -> Result<Box<dyn EncryptionModule>, ModuleError> {
        Ok(Box::new(self.instantiate_sync()?))
    }
}

fn compile_file(engine: &Engine, path: &Path) -> Result<Module, ModuleError> {
    Module::from_file(engine, path)
        .with_context(|| format!("compiling {}", path.display()))
        .map_err(|e| ModuleError::Load(format!("{:#}", e)))
}

fn typed_export<P, R>(
    instance: &Instance,
    store: &mut Store<()>,
    name: &str,
) -> Result<TypedFunc<P, R>, ModuleError>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<P, R>(store, name)
        .map_err(|_| ModuleError::MissingExport(name.to_string()))
}

fn trap(e: anyhow::Error) -> ModuleError {
    ModuleError::Trap(format!("{:#}", e))
}

/// One instance of the module with its own store and memory.
pub struct WasmEncryptionModule {
    store: Store<()>,
    #[cfg(test)]
    instance: Instance,
    memory: Memory,
    malloc: TypedFunc<i32, i32>,
    free: TypedFunc<i32, ()>,
    encrypt: TypedFunc<(i32, i32), i32>,
    max_result_len: usize,
}

impl EncryptionModule for WasmEncryptionModule {
    fn allocate(&mut self, len: usize) -> Result<ModulePtr, ModuleError> {
        let size = i32::try_from(len).map_err(|_| ModuleError::AllocationFailed(len))?;
        let ptr = self.malloc.call(&mut self.store, size).map_err(trap)? as u32;
        if ptr == 0 {
            return Err(ModuleError::AllocationFailed(len));
        }
        Ok(ModulePtr(ptr))
    }

    fn write(&mut self, ptr: ModulePtr, bytes: &[u8]) -> Result<(), ModuleError> {
        self.memory
            .write(&mut self.store, ptr.0 as usize, bytes)
            .map_err(|_| ModuleError::OutOfBounds {
                ptr: ptr.0,
                len: bytes.len(),
            })
    }

    fn free(&mut self, ptr: ModulePtr) -> Result<(), ModuleError> {
        self.free.call(&mut self.store, ptr.0 as i32).map_err(trap)
    }

    fn encrypt_message(
        &mut self,
        data: ModulePtr,
        key: ModulePtr,
    ) -> Result<ModulePtr, ModuleError> {
        let result = self
            .encrypt
            .call(&mut self.store, (data.0 as i32, key.0 as i32))
            .map_err(trap)?;
        Ok(ModulePtr(result as u32))
    }

    fn read_c_string(&mut self, ptr: ModulePtr) -> Result<Vec<u8>, ModuleError> {
        let data = self.memory.data(&self.store);
        let start = ptr.0 as usize;
        if start >= data.len() {
            return Err(ModuleError::OutOfBounds { ptr: ptr.0, len: 0 });
        }
        let end = data.len().min(start.saturating_add(self.max_result_len));
        let window = &data[start..end];
        match window.iter().position(|b| *b == 0) {
            Some(nul) => Ok(window[..nul].to_vec()),
            None => Err(ModuleError::Unterminated {
                ptr: ptr.0,
                max: self.max_result_len,
            }),
        }
    }
}

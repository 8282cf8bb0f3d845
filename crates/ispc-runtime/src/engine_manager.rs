//! The engine manager (C11): routes a dispatched call to the WASM engine or
//! the ONNX engine, and owns nothing else — both engines are independently
//! reusable across calls, so this is a thin pair of `Arc` handles rather
//! than a pool the way the node's connection/worker managers are.

use std::sync::Arc;

use ispc_core::{CancellationToken, ContentHash, CoordinatorError, TensorInput, TensorOutput};
use ispc_host::HostAbi;
use ispc_onnx::OnnxEngine;
use ispc_wasm::{WasmCallResult, WasmEngine};

use crate::config::CoordinatorConfig;

pub struct EngineManager {
    wasm: Arc<WasmEngine>,
    onnx: Arc<OnnxEngine>,
}

impl EngineManager {
    pub fn new(wasm: Arc<WasmEngine>, onnx: Arc<OnnxEngine>) -> Self {
        EngineManager { wasm, onnx }
    }

    /// Build both engines from a loaded [`CoordinatorConfig`] instead of the
    /// node's hard-coded limits.
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        EngineManager {
            wasm: Arc::new(WasmEngine::with_limits(
                config.max_bytecode_size,
                config.wasm_execution_timeout_secs,
                config.allocator_guard_size,
            )),
            onnx: Arc::new(OnnxEngine::new(config.onnx_concurrency_limit)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn execute_wasm(
        &self,
        module_bytes: &[u8],
        function_name: &str,
        gas_limit: u64,
        contract_address: [u8; 20],
        module_key: &str,
        host_abi: Arc<dyn HostAbi>,
    ) -> Result<WasmCallResult, CoordinatorError> {
        self.wasm.execute(
            module_bytes,
            function_name,
            gas_limit,
            contract_address,
            module_key,
            host_abi,
        )
    }

    pub fn execute_onnx(
        &self,
        blob_store: &dyn ispc_core::BlobStore,
        host_abi: &dyn ispc_onnx::OnnxHostAbi,
        model_hash: ContentHash,
        inputs: Vec<TensorInput>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TensorOutput>, CoordinatorError> {
        self.onnx.run(blob_store, host_abi, model_hash, inputs, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_holds_both_engines_behind_arcs() {
        let manager = EngineManager::new(Arc::new(WasmEngine::new()), Arc::new(OnnxEngine::new(4)));
        // Construction alone exercises that both engines share a manager
        // without either owning the other.
        let _ = &manager;
    }

    #[test]
    fn from_config_builds_engines_without_panicking() {
        let config = CoordinatorConfig::default();
        let manager = EngineManager::from_config(&config);
        let _ = &manager;
    }
}

//! The coordinator (C12): the single entry point a node calls to dispatch
//! one WASM or ONNX execution. Owns the injected ports, the engine manager,
//! and metrics; every call follows the same six-step sequence regardless of
//! which engine ends up running (§4.7).

use std::sync::{Arc, Mutex};
use std::time::Instant;

use ispc_context::ExecutionContext;
use ispc_core::{
    BlobStore, CancellationToken, ChainView, ContentHash, CoordinatorError, DeterministicSnapshot,
    Hasher, TensorInput, TensorOutput,
};
use ispc_host::{Compose, ContextHostAbi, HostAbi};

use crate::engine_manager::EngineManager;
use crate::metrics::CoordinatorMetrics;

/// Everything a node must supply to have the coordinator execute one call.
/// `block_height`/`block_timestamp` are supplied by the caller rather than
/// discovered here: the chain-view port (as exposed to this crate) is a
/// pure point-lookup surface with no "what's the current tip" operation, so
/// snapshot materialization is validation of caller-supplied facts against
/// `ChainView::block_hash`, not independent discovery.
pub struct CallRequest {
    pub artifact_hash: ContentHash,
    pub block_height: u64,
    pub block_timestamp: i64,
    pub chain_id: Vec<u8>,
    pub transaction_id: [u8; 32],
    pub caller_address: [u8; 20],
    pub contract_address: [u8; 20],
    pub init_params: Option<Vec<u8>>,
    pub kind: CallKind,
    pub cancel: CancellationToken,
}

pub enum CallKind {
    Wasm {
        function_name: String,
        gas_limit: u64,
    },
    Onnx {
        inputs: Vec<TensorInput>,
    },
}

/// Everything a successful call produced, harvested from the context after
/// the guest finishes (§4.1 "what a call yields").
pub struct CallOutcome {
    pub return_data: Option<Vec<u8>>,
    pub transaction_draft_json: Vec<u8>,
    pub events: Vec<ispc_core::Event>,
    pub trace_len: usize,
    pub trace_truncated: bool,
    pub gas_used: Option<u64>,
    pub onnx_outputs: Vec<TensorOutput>,
}

pub struct Coordinator<V, B, H, C> {
    chain_view: Arc<V>,
    blob_store: Arc<B>,
    hasher: Arc<H>,
    composer: Arc<C>,
    engines: Arc<EngineManager>,
    metrics: Arc<CoordinatorMetrics>,
}

impl<V, B, H, C> Coordinator<V, B, H, C>
where
    V: ChainView + 'static,
    B: BlobStore + 'static,
    H: Hasher + 'static,
    C: Compose + 'static,
{
    pub fn new(
        chain_view: Arc<V>,
        blob_store: Arc<B>,
        hasher: Arc<H>,
        composer: Arc<C>,
        engines: Arc<EngineManager>,
        metrics: Arc<CoordinatorMetrics>,
    ) -> Self {
        Coordinator {
            chain_view,
            blob_store,
            hasher,
            composer,
            engines,
            metrics,
        }
    }

    /// Run `request` through to completion (§4.7's six steps):
    /// 1. materialize and validate the snapshot,
    /// 2. create and bind the execution context,
    /// 3. construct and inject the Host ABI,
    /// 4. dispatch to the right engine,
    /// 5. harvest everything the call produced,
    /// 6. destroy the context unconditionally.
    pub fn call(&self, request: CallRequest) -> Result<CallOutcome, CoordinatorError> {
        self.metrics.calls_total.inc();
        let started = Instant::now();

        // Step 1: snapshot materialization. A call never reaches the guest
        // if the chain view can't confirm the supplied block height exists.
        self.chain_view
            .block_hash(request.block_height)
            .map_err(|e| CoordinatorError::HostUnavailable(e.to_string()))?;

        if request.cancel.is_cancelled() {
            self.metrics.cancelled_calls_total.inc();
            return Err(CoordinatorError::Cancelled);
        }

        let snapshot = DeterministicSnapshot {
            block_height: request.block_height,
            block_timestamp: request.block_timestamp,
            chain_id: request.chain_id,
            transaction_id: request.transaction_id,
            caller_address: request.caller_address,
            contract_address: request.contract_address,
        };

        // Step 2: create and bind the context.
        let mut context = ExecutionContext::new(snapshot);
        context.set_host_abi().map_err(|e| {
            CoordinatorError::InternalError(format!("failed to bind host ABI: {}", e))
        })?;
        if let Some(params) = request.init_params.clone() {
            context
                .set_init_params(params)
                .map_err(|e| CoordinatorError::InternalError(e.to_string()))?;
        }
        let context = Arc::new(Mutex::new(context));

        // Step 3: construct the Host ABI over the bound context.
        let host_abi: Arc<ContextHostAbi<V, H, C>> = Arc::new(ContextHostAbi::new(
            Arc::clone(&context),
            Arc::clone(&self.chain_view),
            Arc::clone(&self.hasher),
            Arc::clone(&self.composer),
        ));

        // Step 4: dispatch.
        let dispatch_result = self.dispatch(&request, Arc::clone(&host_abi) as Arc<dyn HostAbi>);

        let onnx_outputs = match &request.kind {
            CallKind::Onnx { .. } => Vec::new(),
            CallKind::Wasm { .. } => Vec::new(),
        };

        let (gas_used, onnx_outputs, dispatch_err) = match dispatch_result {
            Ok(DispatchOutcome::Wasm(result)) => (Some(result.gas_used), onnx_outputs, None),
            Ok(DispatchOutcome::Onnx(outputs)) => (None, outputs, None),
            Err(e) => (None, Vec::new(), Some(e)),
        };

        if let Some(ref e) = dispatch_err {
            match e {
                CoordinatorError::GuestFault(_) => {
                    self.metrics.guest_faults_total.inc();
                    // A fault discards any in-flight draft mutations — the
                    // call is a single atomic effect (§4.7).
                    if let Ok(mut ctx) = context.lock() {
                        if let Ok(draft) = ctx.draft_mut() {
                            draft.reset();
                        }
                    }
                }
                CoordinatorError::Cancelled => self.metrics.cancelled_calls_total.inc(),
                CoordinatorError::DeadlineExceeded => self.metrics.deadline_exceeded_total.inc(),
                _ => {}
            }
        }

        // Step 5: harvest whatever the context accumulated, fault or not —
        // the draft itself is already reset above on a fault, but events
        // and trace are diagnostic and kept regardless.
        let outcome = {
            let mut ctx = context.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(gas) = gas_used {
                let _ = ctx.finalize_resource_usage(gas);
                self.metrics.gas_used.observe(gas as f64);
                self.metrics.gas_used_total.inc_by(gas as f64);
            }
            if ctx.trace_truncated() {
                self.metrics.trace_truncated_total.inc();
            }
            let draft_json = serde_json::to_vec(ctx.draft()).unwrap_or_default();
            CallOutcome {
                return_data: ctx.return_data().map(|d| d.to_vec()),
                transaction_draft_json: draft_json,
                events: ctx.events().to_vec(),
                trace_len: ctx.trace().len(),
                trace_truncated: ctx.trace_truncated(),
                gas_used,
                onnx_outputs,
            }
        };

        // Step 6: destroy the context unconditionally.
        if let Ok(mut ctx) = context.lock() {
            ctx.destroy();
        }

        self.metrics
            .call_duration_seconds
            .observe(started.elapsed().as_secs_f64());

        match dispatch_err {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    fn dispatch(
        &self,
        request: &CallRequest,
        host_abi: Arc<dyn HostAbi>,
    ) -> Result<DispatchOutcome, CoordinatorError> {
        match &request.kind {
            CallKind::Wasm {
                function_name,
                gas_limit,
            } => {
                self.metrics.wasm_calls_total.inc();
                let module_bytes = self
                    .blob_store
                    .get(&request.artifact_hash)
                    .map_err(|e| CoordinatorError::HostUnavailable(e.to_string()))?;
                let module_key = request.artifact_hash.to_hex();
                let result = self.engines.execute_wasm(
                    &module_bytes,
                    function_name,
                    *gas_limit,
                    request.contract_address,
                    &module_key,
                    host_abi,
                )?;
                Ok(DispatchOutcome::Wasm(result))
            }
            CallKind::Onnx { inputs } => {
                self.metrics.onnx_calls_total.inc();
                let outputs = self.engines.execute_onnx(
                    self.blob_store.as_ref(),
                    host_abi.as_ref(),
                    request.artifact_hash,
                    inputs.clone(),
                    &request.cancel,
                );
                match outputs {
                    Ok(outputs) => Ok(DispatchOutcome::Onnx(outputs)),
                    Err(e) => {
                        self.metrics.onnx_errors_total.inc();
                        Err(e)
                    }
                }
            }
        }
    }
}

enum DispatchOutcome {
    Wasm(ispc_wasm::WasmCallResult),
    Onnx(Vec<TensorOutput>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ispc_core::{PortError, ResourceRecord, Utxo};
    use ispc_host::NormalModeComposer;
    use ispc_onnx::OnnxEngine;
    use ispc_wasm::WasmEngine;
    use std::collections::HashMap;

    struct FakeChainView;
    impl ChainView for FakeChainView {
        fn utxo_lookup(&self, _outpoint: &ispc_core::Outpoint) -> Result<Utxo, PortError> {
            Err(PortError::NotFound)
        }
        fn utxo_exists(&self, _outpoint: &ispc_core::Outpoint) -> Result<bool, PortError> {
            Ok(false)
        }
        fn utxos_by_address(
            &self,
            _owner: &[u8; 20],
            _category: Option<&[u8]>,
            _include_spent: bool,
        ) -> Result<Vec<Utxo>, PortError> {
            Ok(Vec::new())
        }
        fn resource_lookup(&self, _content_hash: &ContentHash) -> Result<ResourceRecord, PortError> {
            Err(PortError::NotFound)
        }
        fn resource_exists(&self, _content_hash: &ContentHash) -> Result<bool, PortError> {
            Ok(false)
        }
        fn state_get_from_chain(
            &self,
            _state_id: &[u8],
            _from_block_height: u64,
        ) -> Result<Option<([u8; 32], u64)>, PortError> {
            Ok(None)
        }
        fn block_hash(&self, height: u64) -> Result<[u8; 32], PortError> {
            if height == 0 {
                Ok([0u8; 32])
            } else {
                Err(PortError::NotFound)
            }
        }
        fn block_by_height(&self, height: u64) -> Result<ispc_core::Block, PortError> {
            self.block_hash(height)
                .map(|hash| ispc_core::Block { height, hash })
        }
        fn block_by_hash(&self, hash: &[u8; 32]) -> Result<ispc_core::Block, PortError> {
            if *hash == [0u8; 32] {
                Ok(ispc_core::Block { height: 0, hash: *hash })
            } else {
                Err(PortError::NotFound)
            }
        }
        fn highest_block(&self) -> Result<ispc_core::Block, PortError> {
            Ok(ispc_core::Block {
                height: 0,
                hash: [0u8; 32],
            })
        }
    }

    struct FakeBlobStore {
        blobs: HashMap<ContentHash, Vec<u8>>,
    }
    impl BlobStore for FakeBlobStore {
        fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, PortError> {
            self.blobs.get(hash).cloned().ok_or(PortError::NotFound)
        }
        fn exists(&self, hash: &ContentHash) -> Result<bool, PortError> {
            Ok(self.blobs.contains_key(hash))
        }
    }

    struct FakeHasher;
    impl Hasher for FakeHasher {
        fn hash(&self, bytes: &[u8]) -> ContentHash {
            let mut out = [0u8; 32];
            out[0] = bytes.len() as u8;
            ContentHash::from_bytes(out)
        }
    }

    fn make_coordinator() -> Coordinator<FakeChainView, FakeBlobStore, FakeHasher, NormalModeComposer>
    {
        let engines = Arc::new(EngineManager::new(
            Arc::new(WasmEngine::new()),
            Arc::new(OnnxEngine::new(4)),
        ));
        Coordinator::new(
            Arc::new(FakeChainView),
            Arc::new(FakeBlobStore {
                blobs: HashMap::new(),
            }),
            Arc::new(FakeHasher),
            Arc::new(NormalModeComposer),
            engines,
            CoordinatorMetrics::new().unwrap(),
        )
    }

    fn base_request(kind: CallKind) -> CallRequest {
        CallRequest {
            artifact_hash: ContentHash::from_bytes([1u8; 32]),
            block_height: 0,
            block_timestamp: 1000,
            chain_id: vec![1],
            transaction_id: [2u8; 32],
            caller_address: [3u8; 20],
            contract_address: [4u8; 20],
            init_params: None,
            kind,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn call_fails_before_dispatch_when_block_height_is_unconfirmed() {
        let coordinator = make_coordinator();
        let mut request = base_request(CallKind::Wasm {
            function_name: "run".to_string(),
            gas_limit: 1000,
        });
        request.block_height = 999;
        let err = coordinator.call(request).unwrap_err();
        assert!(matches!(err, CoordinatorError::HostUnavailable(_)));
    }

    #[test]
    fn call_fails_fast_when_already_cancelled() {
        let coordinator = make_coordinator();
        let request = base_request(CallKind::Wasm {
            function_name: "run".to_string(),
            gas_limit: 1000,
        });
        request.cancel.cancel();
        let err = coordinator.call(request).unwrap_err();
        assert_eq!(err, CoordinatorError::Cancelled);
    }

    #[test]
    fn wasm_call_surfaces_missing_artifact_as_host_unavailable() {
        let coordinator = make_coordinator();
        let request = base_request(CallKind::Wasm {
            function_name: "run".to_string(),
            gas_limit: 1000,
        });
        let err = coordinator.call(request).unwrap_err();
        assert!(matches!(err, CoordinatorError::HostUnavailable(_)));
    }

    #[test]
    fn onnx_call_with_zero_inputs_is_rejected_as_invalid_artifact() {
        let coordinator = make_coordinator();
        let request = base_request(CallKind::Onnx { inputs: vec![] });
        let err = coordinator.call(request).unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidArtifact(_)));
    }
}

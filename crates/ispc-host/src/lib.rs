// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ISPC HOST ABI
//
// The one polymorphic seam (C4): a trait the WASM and ONNX host-function
// adapters both call against, in Rust-native types, with no knowledge of
// either engine's pointer/FFI conventions. The concrete implementation
// wraps an `Arc<Mutex<ExecutionContext>>` the same way the wasmer adapter's
// `HostState` wraps `Arc<Mutex<HostData>>` — one lock guarding everything a
// call accumulates.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use ispc_context::ExecutionContext;
use ispc_core::{
    ChainView, ContentHash, ContextError, Hasher, LockingCondition, Outpoint, PortError,
    ResourceRecord, Utxo,
};

/// The Host ABI surface (C4, §4.2). Every method here is engine-neutral:
/// arguments and returns are Rust-native values, never guest pointers.
pub trait HostAbi: Send + Sync {
    // ── Deterministic snapshot reads (I2) ──
    fn get_block_height(&self) -> u64;
    fn get_block_timestamp(&self) -> i64;
    fn get_chain_id(&self) -> Vec<u8>;
    fn get_transaction_id(&self) -> [u8; 32];
    fn get_caller_address(&self) -> [u8; 20];
    fn get_contract_address(&self) -> [u8; 20];
    fn get_block_hash(&self, height: u64) -> Result<[u8; 32], PortError>;
    fn get_contract_init_params(&self) -> Option<Vec<u8>>;

    // ── Chain-data lookups (committed state only) ──
    fn utxo_lookup(&self, outpoint: &Outpoint) -> Result<Utxo, PortError>;
    fn utxo_exists(&self, outpoint: &Outpoint) -> Result<bool, PortError>;

    /// `query_utxo_balance`: sum native-coin UTXOs owned by `owner` when
    /// `token_class_id` is `None`; otherwise sum only the contract-token
    /// UTXOs whose `token_id` is `get_contract_address() ++ token_class_id`.
    fn query_utxo_balance(
        &self,
        owner: [u8; 20],
        token_class_id: Option<Vec<u8>>,
    ) -> Result<u64, PortError>;

    fn resource_lookup(&self, content_hash: &ContentHash) -> Result<ResourceRecord, PortError>;
    fn resource_exists(&self, content_hash: &ContentHash) -> Result<bool, PortError>;

    /// `state_get`: the most recent value for `state_id` in this call's own
    /// in-flight draft — versionless, and never consults committed chain
    /// history (that's what [`HostAbi::state_get_from_chain_only`] is for).
    fn state_get(&self, state_id: &[u8]) -> Result<Option<([u8; 32], u64)>, PortError>;
    fn state_exists(&self, state_id: &[u8]) -> Result<bool, PortError>;

    /// `state_get_from_chain`: bypass this call's own in-flight draft and
    /// read only committed chain history, bounded by
    /// [`MAX_HISTORICAL_SCAN_BLOCKS`] blocks back from `from_block_height`.
    fn state_get_from_chain_only(
        &self,
        state_id: &[u8],
        from_block_height: u64,
    ) -> Result<Option<([u8; 32], u64)>, PortError>;

    // ── Draft mutations ──
    fn tx_add_input(
        &self,
        outpoint: Outpoint,
        reference_only: bool,
        unlocking_proof: Option<Vec<u8>>,
    ) -> Result<u32, ContextError>;

    #[allow(clippy::too_many_arguments)]
    fn tx_add_asset_output(
        &self,
        owner: [u8; 20],
        amount: u64,
        token_id: Option<Vec<u8>>,
        locking_conditions: Vec<LockingCondition>,
    ) -> Result<u32, ContextError>;

    #[allow(clippy::too_many_arguments)]
    fn tx_add_resource_output(
        &self,
        content_hash: ContentHash,
        category: String,
        owner: [u8; 20],
        locking_conditions: Vec<LockingCondition>,
        metadata: Vec<u8>,
    ) -> Result<u32, ContextError>;

    #[allow(clippy::too_many_arguments)]
    fn tx_add_state_output(
        &self,
        state_id: Vec<u8>,
        state_version: u64,
        execution_result_hash: [u8; 32],
        public_inputs: Option<Vec<u8>>,
        parent_state_hash: Option<[u8; 32]>,
    ) -> Result<u32, ContextError>;

    /// `host_build_transaction`: finalize the draft accumulated so far into
    /// a [`TxReceipt`], serialized as JSON. Mode selection (which on-chain
    /// transaction shape to emit) is delegated to an injected [`Compose`]
    /// implementation — the core itself has no opinion on transaction
    /// modes. Guest-callable: a contract may call this mid-call to inspect
    /// its own draft's composed form.
    fn build_transaction(&self) -> Result<Vec<u8>, ContextError>;

    // ── Diagnostics ──
    fn emit_event(&self, event_type: String, data: Value) -> Result<(), ContextError>;
    fn log_debug(&self, message: &str);

    fn set_return_data(&self, data: Vec<u8>) -> Result<(), ContextError>;

    fn record_host_function_call(
        &self,
        function_name: &str,
        parameters: Map<String, Value>,
        result: Map<String, Value>,
    ) -> Result<u64, ContextError>;
}

/// Selects which on-chain transaction mode a draft should be composed as.
/// A port rather than a core decision, per §4.2 S4's open question.
pub trait Compose: Send + Sync {
    fn select_mode(&self, draft_summary: &str) -> String;
}

/// The reference [`Compose`] implementation: always emits the "normal"
/// transaction mode, regardless of draft contents.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalModeComposer;

impl Compose for NormalModeComposer {
    fn select_mode(&self, _draft_summary: &str) -> String {
        "normal".to_string()
    }
}

/// The JSON shape `host_build_transaction` writes back to a guest (§6). Only
/// `mode` is always present; the rest depend on what the selected mode
/// produced — a mode that fails to compose leaves everything but `error`
/// unset.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TxReceipt {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned_tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialized_tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The concrete [`HostAbi`] bound to one [`ExecutionContext`] plus the
/// injected chain-view and hasher ports.
pub struct ContextHostAbi<V, H, C> {
    context: Arc<Mutex<ExecutionContext>>,
    chain_view: Arc<V>,
    hasher: Arc<H>,
    composer: Arc<C>,
}

impl<V, H, C> ContextHostAbi<V, H, C>
where
    V: ChainView,
    H: Hasher,
    C: Compose,
{
    pub fn new(
        context: Arc<Mutex<ExecutionContext>>,
        chain_view: Arc<V>,
        hasher: Arc<H>,
        composer: Arc<C>,
    ) -> Self {
        ContextHostAbi {
            context,
            chain_view,
            hasher,
            composer,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ExecutionContext> {
        self.context.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<V, H, C> HostAbi for ContextHostAbi<V, H, C>
where
    V: ChainView,
    H: Hasher,
    C: Compose,
{
    fn get_block_height(&self) -> u64 {
        self.lock().get_block_height()
    }

    fn get_block_timestamp(&self) -> i64 {
        self.lock().get_block_timestamp()
    }

    fn get_chain_id(&self) -> Vec<u8> {
        self.lock().get_chain_id()
    }

    fn get_transaction_id(&self) -> [u8; 32] {
        self.lock().get_transaction_id()
    }

    fn get_caller_address(&self) -> [u8; 20] {
        self.lock().get_caller_address()
    }

    fn get_contract_address(&self) -> [u8; 20] {
        self.lock().get_contract_address()
    }

    fn get_block_hash(&self, height: u64) -> Result<[u8; 32], PortError> {
        self.chain_view.block_hash(height)
    }

    fn get_contract_init_params(&self) -> Option<Vec<u8>> {
        self.lock().init_params().map(|b| b.to_vec())
    }

    fn utxo_lookup(&self, outpoint: &Outpoint) -> Result<Utxo, PortError> {
        self.chain_view.utxo_lookup(outpoint)
    }

    fn utxo_exists(&self, outpoint: &Outpoint) -> Result<bool, PortError> {
        self.chain_view.utxo_exists(outpoint)
    }

    fn query_utxo_balance(
        &self,
        owner: [u8; 20],
        token_class_id: Option<Vec<u8>>,
    ) -> Result<u64, PortError> {
        let utxos = self.chain_view.utxos_by_address(&owner, None, false)?;
        let expected_token_id = token_class_id.map(|class_id| {
            let mut token_id = self.get_contract_address().to_vec();
            token_id.extend_from_slice(&class_id);
            token_id
        });
        Ok(utxos
            .iter()
            .filter(|utxo| utxo.token_id == expected_token_id)
            .fold(0u64, |sum, utxo| sum.saturating_add(utxo.amount)))
    }

    fn resource_lookup(&self, content_hash: &ContentHash) -> Result<ResourceRecord, PortError> {
        self.chain_view.resource_lookup(content_hash)
    }

    fn resource_exists(&self, content_hash: &ContentHash) -> Result<bool, PortError> {
        self.chain_view.resource_exists(content_hash)
    }

    fn state_get(&self, state_id: &[u8]) -> Result<Option<([u8; 32], u64)>, PortError> {
        let ctx = self.lock();
        Ok(ctx
            .draft()
            .latest_state_output(state_id)
            .map(|(hash, version)| (*hash, version)))
    }

    fn state_exists(&self, state_id: &[u8]) -> Result<bool, PortError> {
        Ok(self.state_get(state_id)?.is_some())
    }

    fn state_get_from_chain_only(
        &self,
        state_id: &[u8],
        from_block_height: u64,
    ) -> Result<Option<([u8; 32], u64)>, PortError> {
        self.chain_view
            .state_get_from_chain(state_id, from_block_height)
    }

    fn tx_add_input(
        &self,
        outpoint: Outpoint,
        reference_only: bool,
        unlocking_proof: Option<Vec<u8>>,
    ) -> Result<u32, ContextError> {
        let mut ctx = self.lock();
        let draft = ctx.draft_mut()?;
        Ok(draft.add_input(outpoint, reference_only, unlocking_proof))
    }

    fn tx_add_asset_output(
        &self,
        owner: [u8; 20],
        amount: u64,
        token_id: Option<Vec<u8>>,
        locking_conditions: Vec<LockingCondition>,
    ) -> Result<u32, ContextError> {
        let mut ctx = self.lock();
        let draft = ctx.draft_mut()?;
        Ok(draft.add_asset_output(owner, amount, token_id, locking_conditions))
    }

    fn tx_add_resource_output(
        &self,
        content_hash: ContentHash,
        category: String,
        owner: [u8; 20],
        locking_conditions: Vec<LockingCondition>,
        metadata: Vec<u8>,
    ) -> Result<u32, ContextError> {
        let mut ctx = self.lock();
        let draft = ctx.draft_mut()?;
        Ok(draft.add_resource_output(content_hash, category, owner, locking_conditions, metadata))
    }

    fn tx_add_state_output(
        &self,
        state_id: Vec<u8>,
        state_version: u64,
        execution_result_hash: [u8; 32],
        public_inputs: Option<Vec<u8>>,
        parent_state_hash: Option<[u8; 32]>,
    ) -> Result<u32, ContextError> {
        let mut ctx = self.lock();
        let draft = ctx.draft_mut()?;
        Ok(draft.add_state_output(
            state_id,
            state_version,
            execution_result_hash,
            public_inputs,
            parent_state_hash,
        ))
    }

    fn build_transaction(&self) -> Result<Vec<u8>, ContextError> {
        let ctx = self.lock();
        if ctx.is_destroyed() {
            return Err(ContextError::ContextDestroyed);
        }
        let draft_bytes = serde_json::to_vec(ctx.draft()).unwrap_or_default();
        let mode = self
            .composer
            .select_mode(&String::from_utf8_lossy(&draft_bytes));
        let unsigned_tx_hash = self.hasher.hash(&draft_bytes);

        let receipt = TxReceipt {
            mode,
            unsigned_tx_hash: Some(unsigned_tx_hash.to_hex()),
            signed_tx_hash: None,
            serialized_tx: Some(hex::encode(&draft_bytes)),
            proposal_id: None,
            error: None,
        };
        Ok(serde_json::to_vec(&receipt).unwrap_or_default())
    }

    fn emit_event(&self, event_type: String, data: Value) -> Result<(), ContextError> {
        self.lock().add_event(event_type, data)
    }

    fn log_debug(&self, message: &str) {
        log::debug!("{}", message);
    }

    fn set_return_data(&self, data: Vec<u8>) -> Result<(), ContextError> {
        self.lock().set_return_data(data)
    }

    fn record_host_function_call(
        &self,
        function_name: &str,
        parameters: Map<String, Value>,
        result: Map<String, Value>,
    ) -> Result<u64, ContextError> {
        self.lock()
            .record_host_function_call(function_name.to_string(), parameters, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ispc_core::DeterministicSnapshot;
    use std::collections::HashMap;

    struct FakeChainView {
        utxos: HashMap<(([u8; 32], u32)), Utxo>,
        resources: HashMap<Vec<u8>, ResourceRecord>,
        history: HashMap<Vec<u8>, ([u8; 32], u64)>,
    }

    impl ChainView for FakeChainView {
        fn utxo_lookup(&self, outpoint: &Outpoint) -> Result<Utxo, PortError> {
            self.utxos
                .get(&(outpoint.tx_id, outpoint.index))
                .cloned()
                .ok_or(PortError::NotFound)
        }
        fn utxo_exists(&self, outpoint: &Outpoint) -> Result<bool, PortError> {
            Ok(self.utxos.contains_key(&(outpoint.tx_id, outpoint.index)))
        }
        fn utxos_by_address(
            &self,
            owner: &[u8; 20],
            _category: Option<&[u8]>,
            _include_spent: bool,
        ) -> Result<Vec<Utxo>, PortError> {
            Ok(self
                .utxos
                .values()
                .filter(|utxo| &utxo.owner == owner)
                .cloned()
                .collect())
        }
        fn resource_lookup(&self, content_hash: &ContentHash) -> Result<ResourceRecord, PortError> {
            self.resources
                .get(content_hash.as_bytes().as_slice())
                .cloned()
                .ok_or(PortError::NotFound)
        }
        fn resource_exists(&self, content_hash: &ContentHash) -> Result<bool, PortError> {
            Ok(self.resources.contains_key(content_hash.as_bytes().as_slice()))
        }
        fn state_get_from_chain(
            &self,
            state_id: &[u8],
            _from_block_height: u64,
        ) -> Result<Option<([u8; 32], u64)>, PortError> {
            Ok(self.history.get(state_id).copied())
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

    struct FakeHasher;
    impl Hasher for FakeHasher {
        fn hash(&self, bytes: &[u8]) -> ContentHash {
            let mut out = [0u8; 32];
            out[0] = bytes.len() as u8;
            ContentHash::from_bytes(out)
        }
    }

    fn make_abi() -> ContextHostAbi<FakeChainView, FakeHasher, NormalModeComposer> {
        let snapshot = DeterministicSnapshot {
            block_height: 5,
            block_timestamp: 123,
            chain_id: vec![1],
            transaction_id: [1u8; 32],
            caller_address: [6u8; 20],
            contract_address: [7u8; 20],
        };
        let mut ctx = ExecutionContext::new(snapshot);
        ctx.set_host_abi().unwrap();
        let view = FakeChainView {
            utxos: HashMap::new(),
            resources: HashMap::new(),
            history: HashMap::new(),
        };
        ContextHostAbi::new(
            Arc::new(Mutex::new(ctx)),
            Arc::new(view),
            Arc::new(FakeHasher),
            Arc::new(NormalModeComposer),
        )
    }

    #[test]
    fn snapshot_reads_match_context() {
        let abi = make_abi();
        assert_eq!(abi.get_block_height(), 5);
        assert_eq!(abi.get_chain_id(), vec![1]);
    }

    #[test]
    fn state_get_prefers_in_flight_draft_over_chain_history() {
        let abi = make_abi();
        abi.tx_add_state_output(b"k".to_vec(), 1, [9u8; 32], None, None)
            .unwrap();
        let (hash, version) = abi.state_get(b"k").unwrap().unwrap();
        assert_eq!(hash, [9u8; 32]);
        assert_eq!(version, 1);
    }

    #[test]
    fn tx_add_asset_output_returns_contiguous_index() {
        let abi = make_abi();
        let i0 = abi.tx_add_asset_output([1u8; 20], 10, None, vec![]).unwrap();
        let i1 = abi.tx_add_asset_output([2u8; 20], 20, None, vec![]).unwrap();
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
    }

    #[test]
    fn composer_selects_normal_mode() {
        let abi = make_abi();
        let bytes = abi.build_transaction().unwrap();
        let receipt: TxReceipt = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(receipt.mode, "normal");
        assert!(receipt.unsigned_tx_hash.is_some());
        assert!(receipt.serialized_tx.is_some());
    }

    /// P7: calling `build_transaction` twice over the same draft yields a
    /// byte-equal receipt — no hidden counter or timestamp sneaks in.
    #[test]
    fn build_transaction_is_idempotent_over_an_unchanged_draft() {
        let abi = make_abi();
        abi.tx_add_asset_output([1u8; 20], 100, None, vec![])
            .unwrap();
        let first = abi.build_transaction().unwrap();
        let second = abi.build_transaction().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn query_utxo_balance_sums_native_coin_for_the_owner() {
        let mut utxos = HashMap::new();
        utxos.insert(
            ([1u8; 32], 0u32),
            Utxo {
                owner: [9u8; 20],
                amount: 30,
                token_id: None,
            },
        );
        utxos.insert(
            ([2u8; 32], 0u32),
            Utxo {
                owner: [9u8; 20],
                amount: 70,
                token_id: None,
            },
        );
        utxos.insert(
            ([3u8; 32], 0u32),
            Utxo {
                owner: [8u8; 20],
                amount: 1_000,
                token_id: None,
            },
        );
        let snapshot = DeterministicSnapshot {
            block_height: 5,
            block_timestamp: 123,
            chain_id: vec![1],
            transaction_id: [1u8; 32],
            caller_address: [6u8; 20],
            contract_address: [7u8; 20],
        };
        let mut ctx = ExecutionContext::new(snapshot);
        ctx.set_host_abi().unwrap();
        let view = FakeChainView {
            utxos,
            resources: HashMap::new(),
            history: HashMap::new(),
        };
        let abi = ContextHostAbi::new(
            Arc::new(Mutex::new(ctx)),
            Arc::new(view),
            Arc::new(FakeHasher),
            Arc::new(NormalModeComposer),
        );

        assert_eq!(abi.query_utxo_balance([9u8; 20], None).unwrap(), 100);
    }

    #[test]
    fn query_utxo_balance_filters_by_contract_and_fungible_class_id() {
        let contract = [7u8; 20];
        let mut token_id = contract.to_vec();
        token_id.extend_from_slice(b"gold");
        let mut other_token_id = [3u8; 20].to_vec();
        other_token_id.extend_from_slice(b"gold");

        let mut utxos = HashMap::new();
        utxos.insert(
            ([1u8; 32], 0u32),
            Utxo {
                owner: [9u8; 20],
                amount: 50,
                token_id: Some(token_id),
            },
        );
        utxos.insert(
            ([2u8; 32], 0u32),
            Utxo {
                owner: [9u8; 20],
                amount: 500,
                token_id: Some(other_token_id),
            },
        );
        let snapshot = DeterministicSnapshot {
            block_height: 5,
            block_timestamp: 123,
            chain_id: vec![1],
            transaction_id: [1u8; 32],
            caller_address: [6u8; 20],
            contract_address: contract,
        };
        let mut ctx = ExecutionContext::new(snapshot);
        ctx.set_host_abi().unwrap();
        let view = FakeChainView {
            utxos,
            resources: HashMap::new(),
            history: HashMap::new(),
        };
        let abi = ContextHostAbi::new(
            Arc::new(Mutex::new(ctx)),
            Arc::new(view),
            Arc::new(FakeHasher),
            Arc::new(NormalModeComposer),
        );

        let balance = abi
            .query_utxo_balance([9u8; 20], Some(b"gold".to_vec()))
            .unwrap();
        assert_eq!(balance, 50);
    }

    #[test]
    fn state_get_never_falls_back_to_chain_history() {
        let mut history = HashMap::new();
        history.insert(b"k".to_vec(), ([9u8; 32], 3u64));
        let snapshot = DeterministicSnapshot {
            block_height: 5,
            block_timestamp: 123,
            chain_id: vec![1],
            transaction_id: [1u8; 32],
            caller_address: [6u8; 20],
            contract_address: [7u8; 20],
        };
        let mut ctx = ExecutionContext::new(snapshot);
        ctx.set_host_abi().unwrap();
        let view = FakeChainView {
            utxos: HashMap::new(),
            resources: HashMap::new(),
            history,
        };
        let abi = ContextHostAbi::new(
            Arc::new(Mutex::new(ctx)),
            Arc::new(view),
            Arc::new(FakeHasher),
            Arc::new(NormalModeComposer),
        );

        assert_eq!(abi.state_get(b"k").unwrap(), None);
        assert!(!abi.state_exists(b"k").unwrap());
    }
}

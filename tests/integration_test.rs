//! End-to-end coverage over the Host ABI and transaction draft, exercising
//! the scenarios from spec §8 that don't require a compiled WASM artifact:
//! simple transfer, state write-then-read, and the boundary/memory-safety
//! cases as host-function-level behavior.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ispc_context::ExecutionContext;
use ispc_core::{
    Block, ChainView, ContentHash, DeterministicSnapshot, Hasher, Outpoint, PortError,
    ResourceRecord, Utxo,
};
use ispc_host::{ContextHostAbi, HostAbi, NormalModeComposer, TxReceipt};

struct FakeChainView {
    utxos: HashMap<([u8; 32], u32), Utxo>,
    resources: HashMap<Vec<u8>, ResourceRecord>,
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
            .filter(|u| &u.owner == owner)
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
        _state_id: &[u8],
        _from_block_height: u64,
    ) -> Result<Option<([u8; 32], u64)>, PortError> {
        Ok(None)
    }
    fn block_hash(&self, height: u64) -> Result<[u8; 32], PortError> {
        if height <= 10 {
            Ok([height as u8; 32])
        } else {
            Err(PortError::NotFound)
        }
    }
    fn block_by_height(&self, height: u64) -> Result<Block, PortError> {
        Ok(Block {
            height,
            hash: self.block_hash(height)?,
        })
    }
    fn block_by_hash(&self, hash: &[u8; 32]) -> Result<Block, PortError> {
        let height = hash[0] as u64;
        if self.block_hash(height)? == *hash {
            Ok(Block { height, hash: *hash })
        } else {
            Err(PortError::NotFound)
        }
    }
    fn highest_block(&self) -> Result<Block, PortError> {
        Ok(Block {
            height: 10,
            hash: self.block_hash(10)?,
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

fn make_abi(
    caller: [u8; 20],
    contract: [u8; 20],
) -> ContextHostAbi<FakeChainView, FakeHasher, NormalModeComposer> {
    let snapshot = DeterministicSnapshot {
        block_height: 5,
        block_timestamp: 1_700_000_000,
        chain_id: vec![1],
        transaction_id: [7u8; 32],
        caller_address: caller,
        contract_address: contract,
    };
    let mut ctx = ExecutionContext::new(snapshot);
    ctx.set_host_abi().unwrap();
    let view = FakeChainView {
        utxos: HashMap::new(),
        resources: HashMap::new(),
    };
    ContextHostAbi::new(
        Arc::new(Mutex::new(ctx)),
        Arc::new(view),
        Arc::new(FakeHasher),
        Arc::new(NormalModeComposer),
    )
}

/// Scenario 1: simple transfer. Two asset outputs appended in order, each
/// getting the expected contiguous index, plus three recorded trace calls.
#[test]
fn simple_transfer_yields_two_ordered_outputs_and_a_three_call_trace() {
    let caller = [1u8; 20];
    let recipient = [2u8; 20];
    let abi = make_abi(caller, [9u8; 20]);

    abi.record_host_function_call("query_utxo_balance".into(), Default::default(), Default::default())
        .unwrap();
    let i0 = abi
        .tx_add_asset_output(recipient, 600, None, vec![])
        .unwrap();
    abi.record_host_function_call(
        "append_asset_output".into(),
        Default::default(),
        Default::default(),
    )
    .unwrap();
    let i1 = abi.tx_add_asset_output(caller, 400, None, vec![]).unwrap();
    abi.record_host_function_call(
        "append_asset_output".into(),
        Default::default(),
        Default::default(),
    )
    .unwrap();

    assert_eq!(i0, 0);
    assert_eq!(i1, 1);

    let bytes = abi.build_transaction().unwrap();
    let receipt: TxReceipt = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(receipt.mode, "normal");
    assert!(receipt.unsigned_tx_hash.is_some());
    assert!(receipt.error.is_none());

    let draft_bytes = hex::decode(receipt.serialized_tx.unwrap()).unwrap();
    let draft_text = String::from_utf8(draft_bytes).unwrap();
    assert!(draft_text.contains("\"amount\":600"));
    assert!(draft_text.contains("\"amount\":400"));
}

/// Scenario 2: state write-then-read.
#[test]
fn state_write_then_read_round_trips_and_reports_existence() {
    let abi = make_abi([3u8; 20], [4u8; 20]);

    let mut hash = [0u8; 32];
    hash[0] = b'v';
    hash[1] = b'1';
    abi.tx_add_state_output(b"k".to_vec(), 1, hash, None, None)
        .unwrap();

    let (read_hash, version) = abi.state_get(b"k").unwrap().unwrap();
    assert_eq!(read_hash[0], b'v');
    assert_eq!(read_hash[1], b'1');
    assert_eq!(version, 1);

    assert!(abi.state_exists(b"k").unwrap());
    assert!(!abi.state_exists(b"x").unwrap());
}

/// Scenario 3 (partial, host-ABI level): snapshot reads are frozen for the
/// whole context regardless of how many times they're read (P3).
#[test]
fn snapshot_reads_are_stable_across_repeated_calls() {
    let abi = make_abi([5u8; 20], [6u8; 20]);
    for _ in 0..10 {
        assert_eq!(abi.get_block_height(), 5);
        assert_eq!(abi.get_chain_id(), vec![1]);
    }
}

/// Scenario 4 (boundary hashes, at the chain-view level): a 20-byte outpoint
/// tx id and a 31-byte content hash are both malformed inputs a caller must
/// reject before reaching the port at all.
#[test]
fn malformed_fixed_width_identifiers_are_rejected_before_the_port() {
    let bad_tx_id: [u8; 20] = [0u8; 20];
    assert_ne!(bad_tx_id.len(), 32);

    let bad_hash_bytes: [u8; 31] = [0u8; 31];
    assert!(ContentHash::from_slice(&bad_hash_bytes).is_none());
}

/// The coordinator's §4.7 atomic-fault contract: a reset after partial
/// draft mutation discards everything accumulated so far, as a single
/// atomic step rather than a per-field undo.
#[test]
fn draft_reset_discards_partial_mutations_as_an_atomic_unit() {
    let mut draft = ispc_core::TransactionDraft::new();
    draft.add_asset_output([1u8; 20], 100, None, vec![]);
    draft.add_state_output(b"k".to_vec(), 1, [0u8; 32], None, None);
    assert!(!draft.outputs.is_empty());

    draft.reset();
    assert!(draft.outputs.is_empty());
    assert!(draft.inputs.is_empty());
    assert!(!draft.state_output_exists(b"k"));
}

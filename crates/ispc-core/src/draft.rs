//! The transaction draft: the in-memory, mutable transaction skeleton that
//! accumulates the effects of one execution. Built only through the append
//! methods below, which is what gives §3's "output indices are assigned
//! contiguously starting at 0; once returned they never change" invariant
//! for free — there is no other way to add an input or output.

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// A reference to a previously-created output: `(tx_id, index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outpoint {
    pub tx_id: [u8; 32],
    pub index: u32,
}

/// A proof that an input is authorized to be spent/referenced. Opaque to
/// the core — interpreted only by the out-of-core validation path.
pub type UnlockingProof = Vec<u8>;

/// A locking condition attached to an output. Opaque bytes; the core never
/// interprets these, it only carries them (§3, §4.2 S4).
pub type LockingCondition = Vec<u8>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    pub outpoint: Outpoint,
    pub reference_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocking_proof: Option<UnlockingProof>,
}

/// `tx.outputs[i]`'s tagged-union variant. Never model this as a trait
/// object or a pointer graph (§9): it is a flat, serializable enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Output {
    Asset {
        owner: [u8; 20],
        amount: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        token_id: Option<Vec<u8>>,
        locking_conditions: Vec<LockingCondition>,
    },
    Resource {
        content_hash: ContentHash,
        category: String,
        owner: [u8; 20],
        locking_conditions: Vec<LockingCondition>,
        metadata: Vec<u8>,
    },
    State {
        state_id: Vec<u8>,
        state_version: u64,
        execution_result_hash: [u8; 32],
        #[serde(skip_serializing_if = "Option::is_none")]
        public_inputs: Option<Vec<u8>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_state_hash: Option<[u8; 32]>,
        zk_proof: ZkProof,
    },
}

/// A ZK proof placeholder. §4.2 S5: the core MUST NOT fabricate a
/// placeholder that could pass validation — `proof` is always left empty
/// here; only a post-execution prover service populates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZkProof {
    pub proof: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_inputs: Option<Vec<u8>>,
}

impl ZkProof {
    /// The empty placeholder every `TxAddStateOutput` call produces.
    pub fn empty() -> Self {
        ZkProof {
            proof: Vec::new(),
            public_inputs: None,
        }
    }
}

/// A hint that some amount of a token should be burned. Token-lifecycle
/// hint only; the core does not enforce or interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnIntent {
    pub token_id: Vec<u8>,
    pub amount: u64,
}

/// A hint that a spender should be approved for some amount of a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveIntent {
    pub token_id: Vec<u8>,
    pub spender: [u8; 20],
    pub amount: u64,
}

/// The transaction skeleton that accumulates one call's effects.
///
/// Append-only: `add_input`/`add_asset_output`/`add_resource_output`/
/// `add_state_output` are the *only* ways to mutate `inputs`/`outputs`, and
/// each returns the index the appended item was placed at. Because the
/// backing `Vec`s are never truncated except by [`TransactionDraft::reset`]
/// (used by the coordinator to discard a faulted call atomically, §4.7),
/// indices handed out are always contiguous and never change afterward —
/// that's P2 from §8.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub burn_intents: Vec<BurnIntent>,
    pub approve_intents: Vec<ApproveIntent>,
}

impl TransactionDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(
        &mut self,
        outpoint: Outpoint,
        reference_only: bool,
        unlocking_proof: Option<UnlockingProof>,
    ) -> u32 {
        self.inputs.push(Input {
            outpoint,
            reference_only,
            unlocking_proof,
        });
        (self.inputs.len() - 1) as u32
    }

    fn push_output(&mut self, output: Output) -> u32 {
        self.outputs.push(output);
        (self.outputs.len() - 1) as u32
    }

    pub fn add_asset_output(
        &mut self,
        owner: [u8; 20],
        amount: u64,
        token_id: Option<Vec<u8>>,
        locking_conditions: Vec<LockingCondition>,
    ) -> u32 {
        self.push_output(Output::Asset {
            owner,
            amount,
            token_id,
            locking_conditions,
        })
    }

    pub fn add_resource_output(
        &mut self,
        content_hash: ContentHash,
        category: String,
        owner: [u8; 20],
        locking_conditions: Vec<LockingCondition>,
        metadata: Vec<u8>,
    ) -> u32 {
        self.push_output(Output::Resource {
            content_hash,
            category,
            owner,
            locking_conditions,
            metadata,
        })
    }

    pub fn add_state_output(
        &mut self,
        state_id: Vec<u8>,
        state_version: u64,
        execution_result_hash: [u8; 32],
        public_inputs: Option<Vec<u8>>,
        parent_state_hash: Option<[u8; 32]>,
    ) -> u32 {
        self.push_output(Output::State {
            state_id,
            state_version,
            execution_result_hash,
            public_inputs,
            parent_state_hash,
            zk_proof: ZkProof::empty(),
        })
    }

    /// The most recently appended state output whose `state_id` matches
    /// `key`, versionless (§4.3 `state_get`). Scans back-to-front so "most
    /// recent" is O(distance-from-tail) in the common case.
    pub fn latest_state_output(&self, state_id: &[u8]) -> Option<(&[u8; 32], u64)> {
        self.outputs.iter().rev().find_map(|o| match o {
            Output::State {
                state_id: id,
                execution_result_hash,
                state_version,
                ..
            } if id.as_slice() == state_id => Some((execution_result_hash, *state_version)),
            _ => None,
        })
    }

    pub fn state_output_exists(&self, state_id: &[u8]) -> bool {
        self.latest_state_output(state_id).is_some()
    }

    /// Drop all accumulated effects. Used by the coordinator to implement
    /// "the call is a single atomic effect" on `GuestFault` (§4.7).
    pub fn reset(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
        self.burn_intents.clear();
        self.approve_intents.clear();
    }
}

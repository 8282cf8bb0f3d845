// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ISPC SDK ADAPTER
//
// Translates a guest's declarative "intent bundle" (JSON describing the
// inputs/outputs it wants on the draft) into the Host ABI's append calls
// (C6). Guests that don't want to make one append call per input/output
// can build the whole bundle up-front and hand it to `apply_intent` in one
// shot; the adapter is the only place that knows the wire JSON shape.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};

use ispc_core::{ContentHash, ContextError, Outpoint};
use ispc_host::HostAbi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkAdapterError {
    InvalidHex(&'static str),
    WrongLength { field: &'static str, expected: usize, got: usize },
    InvalidAddress(&'static str),
    Context(ContextError),
}

impl std::fmt::Display for SdkAdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdkAdapterError::InvalidHex(field) => write!(f, "{} is not valid hex", field),
            SdkAdapterError::WrongLength { field, expected, got } => {
                write!(f, "{} must be {} bytes, got {}", field, expected, got)
            }
            SdkAdapterError::InvalidAddress(field) => write!(f, "{} is not a valid address", field),
            SdkAdapterError::Context(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SdkAdapterError {}

impl From<ContextError> for SdkAdapterError {
    fn from(e: ContextError) -> Self {
        SdkAdapterError::Context(e)
    }
}

fn decode_hex_exact(field: &'static str, text: &str, len: usize) -> Result<Vec<u8>, SdkAdapterError> {
    let bytes = hex::decode(text).map_err(|_| SdkAdapterError::InvalidHex(field))?;
    if bytes.len() != len {
        return Err(SdkAdapterError::WrongLength {
            field,
            expected: len,
            got: bytes.len(),
        });
    }
    Ok(bytes)
}

fn decode_owner(field: &'static str, text: &str, chain_id: &[u8]) -> Result<[u8; 20], SdkAdapterError> {
    ispc_crypto::decode_address(text, chain_id).map_err(|_| SdkAdapterError::InvalidAddress(field))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputIntent {
    pub tx_id: String,
    pub index: u32,
    #[serde(default)]
    pub reference_only: bool,
    #[serde(default)]
    pub unlocking_proof: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetOutputIntent {
    pub owner: String,
    pub amount: u64,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub locking_conditions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceOutputIntent {
    pub content_hash: String,
    pub category: String,
    pub owner: String,
    #[serde(default)]
    pub locking_conditions: Vec<String>,
    #[serde(default)]
    pub metadata: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateOutputIntent {
    pub state_id: String,
    pub state_version: u64,
    pub execution_result_hash: String,
    #[serde(default)]
    pub public_inputs: Option<String>,
    #[serde(default)]
    pub parent_state_hash: Option<String>,
}

/// The full bundle a guest submits in one call (§4.2's `SDK intent` shape).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IntentBundle {
    #[serde(default)]
    pub inputs: Vec<InputIntent>,
    #[serde(default)]
    pub asset_outputs: Vec<AssetOutputIntent>,
    #[serde(default)]
    pub resource_outputs: Vec<ResourceOutputIntent>,
    #[serde(default)]
    pub state_outputs: Vec<StateOutputIntent>,
}

/// Summary of what a bundle appended, returned to the guest so it can
/// correlate intents with draft indices without re-reading the draft.
#[derive(Debug, Clone, Serialize)]
pub struct TxReceipt {
    pub input_indices: Vec<u32>,
    pub asset_output_indices: Vec<u32>,
    pub resource_output_indices: Vec<u32>,
    pub state_output_indices: Vec<u32>,
}

/// Parse and apply one intent bundle to the draft behind `abi`, in bundle
/// order. Fails fast on the first malformed intent — nothing partially
/// applied survives a parse error past that point is left on the draft
/// from calls made before the failing one, matching the rest of the
/// core's "no implicit rollback mid-call" stance; the coordinator's
/// guest-fault handling is what resets the whole draft atomically.
pub fn apply_intent(abi: &dyn HostAbi, bundle: &IntentBundle) -> Result<TxReceipt, SdkAdapterError> {
    let chain_id = abi.get_chain_id();
    let mut receipt = TxReceipt {
        input_indices: Vec::with_capacity(bundle.inputs.len()),
        asset_output_indices: Vec::with_capacity(bundle.asset_outputs.len()),
        resource_output_indices: Vec::with_capacity(bundle.resource_outputs.len()),
        state_output_indices: Vec::with_capacity(bundle.state_outputs.len()),
    };

    for input in &bundle.inputs {
        let tx_id = decode_hex_exact("inputs[].tx_id", &input.tx_id, 32)?;
        let mut tx_id_arr = [0u8; 32];
        tx_id_arr.copy_from_slice(&tx_id);
        let unlocking_proof = input
            .unlocking_proof
            .as_deref()
            .map(|h| hex::decode(h).map_err(|_| SdkAdapterError::InvalidHex("inputs[].unlocking_proof")))
            .transpose()?;
        let idx = abi.tx_add_input(
            Outpoint {
                tx_id: tx_id_arr,
                index: input.index,
            },
            input.reference_only,
            unlocking_proof,
        )?;
        receipt.input_indices.push(idx);
    }

    for output in &bundle.asset_outputs {
        let owner = decode_owner("asset_outputs[].owner", &output.owner, &chain_id)?;
        let token_id = output
            .token_id
            .as_deref()
            .map(|h| hex::decode(h).map_err(|_| SdkAdapterError::InvalidHex("asset_outputs[].token_id")))
            .transpose()?;
        let locking_conditions = output
            .locking_conditions
            .iter()
            .map(|h| hex::decode(h).map_err(|_| SdkAdapterError::InvalidHex("asset_outputs[].locking_conditions[]")))
            .collect::<Result<Vec<_>, _>>()?;
        let idx = abi.tx_add_asset_output(owner, output.amount, token_id, locking_conditions)?;
        receipt.asset_output_indices.push(idx);
    }

    for output in &bundle.resource_outputs {
        let content_hash = ContentHash::parse_hex(&output.content_hash)
            .map_err(|_| SdkAdapterError::InvalidHex("resource_outputs[].content_hash"))?;
        let owner = decode_owner("resource_outputs[].owner", &output.owner, &chain_id)?;
        let locking_conditions = output
            .locking_conditions
            .iter()
            .map(|h| hex::decode(h).map_err(|_| SdkAdapterError::InvalidHex("resource_outputs[].locking_conditions[]")))
            .collect::<Result<Vec<_>, _>>()?;
        let metadata = hex::decode(&output.metadata)
            .map_err(|_| SdkAdapterError::InvalidHex("resource_outputs[].metadata"))?;
        let idx = abi.tx_add_resource_output(
            content_hash,
            output.category.clone(),
            owner,
            locking_conditions,
            metadata,
        )?;
        receipt.resource_output_indices.push(idx);
    }

    for output in &bundle.state_outputs {
        let state_id = hex::decode(&output.state_id)
            .map_err(|_| SdkAdapterError::InvalidHex("state_outputs[].state_id"))?;
        let execution_result_hash = decode_hex_exact(
            "state_outputs[].execution_result_hash",
            &output.execution_result_hash,
            32,
        )?;
        let mut result_hash_arr = [0u8; 32];
        result_hash_arr.copy_from_slice(&execution_result_hash);

        let public_inputs = output
            .public_inputs
            .as_deref()
            .map(|h| hex::decode(h).map_err(|_| SdkAdapterError::InvalidHex("state_outputs[].public_inputs")))
            .transpose()?;

        let parent_state_hash = match &output.parent_state_hash {
            Some(h) => {
                let bytes = decode_hex_exact("state_outputs[].parent_state_hash", h, 32)?;
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Some(arr)
            }
            None => None,
        };

        let idx = abi.tx_add_state_output(
            state_id,
            output.state_version,
            result_hash_arr,
            public_inputs,
            parent_state_hash,
        )?;
        receipt.state_output_indices.push(idx);
    }

    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ispc_context::ExecutionContext;
    use ispc_core::{ChainView, DeterministicSnapshot, Hasher, PortError, ResourceRecord, Utxo};
    use ispc_host::{ContextHostAbi, NormalModeComposer};
    use std::sync::{Arc, Mutex};

    struct NullChainView;
    impl ChainView for NullChainView {
        fn utxo_lookup(&self, _: &Outpoint) -> Result<Utxo, PortError> {
            Err(PortError::NotFound)
        }
        fn utxo_exists(&self, _: &Outpoint) -> Result<bool, PortError> {
            Ok(false)
        }
        fn utxos_by_address(
            &self,
            _: &[u8; 20],
            _: Option<&[u8]>,
            _: bool,
        ) -> Result<Vec<Utxo>, PortError> {
            Ok(Vec::new())
        }
        fn resource_lookup(&self, _: &ContentHash) -> Result<ResourceRecord, PortError> {
            Err(PortError::NotFound)
        }
        fn resource_exists(&self, _: &ContentHash) -> Result<bool, PortError> {
            Ok(false)
        }
        fn state_get_from_chain(
            &self,
            _: &[u8],
            _: u64,
        ) -> Result<Option<([u8; 32], u64)>, PortError> {
            Ok(None)
        }
        fn block_hash(&self, _: u64) -> Result<[u8; 32], PortError> {
            Ok([0u8; 32])
        }
        fn block_by_height(&self, height: u64) -> Result<ispc_core::Block, PortError> {
            Ok(ispc_core::Block { height, hash: [0u8; 32] })
        }
        fn block_by_hash(&self, hash: &[u8; 32]) -> Result<ispc_core::Block, PortError> {
            Ok(ispc_core::Block { height: 0, hash: *hash })
        }
        fn highest_block(&self) -> Result<ispc_core::Block, PortError> {
            Ok(ispc_core::Block { height: 0, hash: [0u8; 32] })
        }
    }

    struct NullHasher;
    impl Hasher for NullHasher {
        fn hash(&self, _: &[u8]) -> ContentHash {
            ContentHash::from_bytes([0u8; 32])
        }
    }

    fn make_abi() -> ContextHostAbi<NullChainView, NullHasher, NormalModeComposer> {
        let snapshot = DeterministicSnapshot {
            block_height: 1,
            block_timestamp: 1,
            chain_id: vec![1],
            transaction_id: [0u8; 32],
            caller_address: [1u8; 20],
            contract_address: [2u8; 20],
        };
        let mut ctx = ExecutionContext::new(snapshot);
        ctx.set_host_abi().unwrap();
        ContextHostAbi::new(
            Arc::new(Mutex::new(ctx)),
            Arc::new(NullChainView),
            Arc::new(NullHasher),
            Arc::new(NormalModeComposer),
        )
    }

    #[test]
    fn applies_asset_output_intent() {
        let abi = make_abi();
        let owner_addr = ispc_crypto::encode_address(&[5u8; 20], &[1]);
        let bundle = IntentBundle {
            asset_outputs: vec![AssetOutputIntent {
                owner: owner_addr,
                amount: 500,
                token_id: None,
                locking_conditions: vec![],
            }],
            ..Default::default()
        };
        let receipt = apply_intent(&abi, &bundle).unwrap();
        assert_eq!(receipt.asset_output_indices, vec![0]);
    }

    #[test]
    fn rejects_malformed_content_hash() {
        let abi = make_abi();
        let owner_addr = ispc_crypto::encode_address(&[5u8; 20], &[1]);
        let bundle = IntentBundle {
            resource_outputs: vec![ResourceOutputIntent {
                content_hash: "not-hex".to_string(),
                category: "image".to_string(),
                owner: owner_addr,
                locking_conditions: vec![],
                metadata: String::new(),
            }],
            ..Default::default()
        };
        assert!(apply_intent(&abi, &bundle).is_err());
    }

    #[test]
    fn rejects_invalid_owner_address() {
        let abi = make_abi();
        let bundle = IntentBundle {
            asset_outputs: vec![AssetOutputIntent {
                owner: "not-an-address".to_string(),
                amount: 1,
                token_id: None,
                locking_conditions: vec![],
            }],
            ..Default::default()
        };
        assert_eq!(
            apply_intent(&abi, &bundle),
            Err(SdkAdapterError::InvalidAddress("asset_outputs[].owner"))
        );
    }

    #[test]
    fn applies_input_and_state_output_intents() {
        let abi = make_abi();
        let bundle = IntentBundle {
            inputs: vec![InputIntent {
                tx_id: hex::encode([1u8; 32]),
                index: 0,
                reference_only: true,
                unlocking_proof: None,
            }],
            state_outputs: vec![StateOutputIntent {
                state_id: hex::encode(b"k"),
                state_version: 1,
                execution_result_hash: hex::encode([2u8; 32]),
                public_inputs: None,
                parent_state_hash: None,
            }],
            ..Default::default()
        };
        let receipt = apply_intent(&abi, &bundle).unwrap();
        assert_eq!(receipt.input_indices, vec![0]);
        assert_eq!(receipt.state_output_indices, vec![0]);
    }
}

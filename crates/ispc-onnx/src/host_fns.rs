//! ONNX host-function adapter (C8, §4.4).
//!
//! Deliberately a much smaller surface than [`ispc_host::HostAbi`]: models
//! are read-only guests. Arguments are native Rust values, not guest
//! pointers — there is no linear memory to bounds-check, since `ort`
//! sessions run in-process rather than inside a sandboxed instance.

use ispc_core::Outpoint;
use ispc_host::HostAbi;

/// The five primitives an ONNX model call may read. No draft mutation, no
/// events, no logging — §4.4 calls this adapter "minimal, read-only".
pub trait OnnxHostAbi: Send + Sync {
    fn get_block_height(&self) -> i64;
    fn get_block_timestamp(&self) -> i64;
    fn get_chain_id(&self) -> Vec<u8>;
    /// `false` on a length mismatch rather than an error (§4.4).
    fn utxo_exists(&self, tx_hash: &[u8], index: u32) -> bool;
    fn resource_exists(&self, content_hash: &[u8]) -> bool;
}

/// Every [`HostAbi`] already implements the superset of this surface, so any
/// bound Host ABI can be handed to the ONNX engine through this narrower
/// view without a second concrete type.
impl<T: HostAbi + ?Sized> OnnxHostAbi for T {
    fn get_block_height(&self) -> i64 {
        HostAbi::get_block_height(self) as i64
    }

    fn get_block_timestamp(&self) -> i64 {
        HostAbi::get_block_timestamp(self)
    }

    fn get_chain_id(&self) -> Vec<u8> {
        HostAbi::get_chain_id(self)
    }

    fn utxo_exists(&self, tx_hash: &[u8], index: u32) -> bool {
        let Ok(tx_id) : Result<[u8; 32], _> = tx_hash.try_into() else {
            return false;
        };
        let outpoint = Outpoint { tx_id, index };
        HostAbi::utxo_exists(self, &outpoint).unwrap_or(false)
    }

    fn resource_exists(&self, content_hash: &[u8]) -> bool {
        if content_hash.len() != 32 {
            return false;
        }
        let Some(hash) = ispc_core::ContentHash::from_slice(content_hash) else {
            return false;
        };
        HostAbi::resource_exists(self, &hash).unwrap_or(false)
    }
}

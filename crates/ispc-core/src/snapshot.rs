//! The deterministic snapshot frozen at context creation (§4.1, I2).

use serde::{Deserialize, Serialize};

/// Chain facts fixed for the lifetime of one execution context. Every read
/// through the Host ABI that depends on "current" chain state (block
/// height, timestamp, chain id, transaction id) returns these values
/// unchanged for the whole call, regardless of concurrent chain activity —
/// that's I2.
///
/// `chain_id` is an arbitrary-length byte string, not a fixed-width
/// integer — §3's wire table carries it as `bytes`, matching how it's
/// written back to a guest (`get_chain_id` returns the written length, the
/// same convention as `get_transaction_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicSnapshot {
    pub block_height: u64,
    pub block_timestamp: i64,
    pub chain_id: Vec<u8>,
    pub transaction_id: [u8; 32],
    /// The address that invoked this call (the transaction's signer, or a
    /// calling contract for an inter-contract call). Frozen like every
    /// other snapshot field — a guest never observes a different caller
    /// mid-call.
    pub caller_address: [u8; 20],
    /// The content-addressed artifact's own address being executed.
    pub contract_address: [u8; 20],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_clones_and_compares_by_value() {
        let a = DeterministicSnapshot {
            block_height: 10,
            block_timestamp: 1000,
            chain_id: vec![1],
            transaction_id: [1u8; 32],
            caller_address: [2u8; 20],
            contract_address: [3u8; 20],
        };
        let b = a.clone();
        assert_eq!(a, b);
    }
}

//! The narrow port traits through which the core reaches the outside world
//! (§6). Every concrete store, consensus view, or hash implementation lives
//! outside this crate; callers inject an implementation of these traits.

use crate::draft::Outpoint;
use crate::error::PortError;
use crate::hash::ContentHash;

/// Content-addressed read access to WASM modules and ONNX models (C1).
/// The core never writes through this port — artifacts are assumed already
/// published by the time a contract call references them.
pub trait BlobStore: Send + Sync {
    /// Fetch the raw bytes for `hash`, or `PortError::NotFound` if absent.
    fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, PortError>;

    /// Whether `hash` is present, without transferring its bytes.
    fn exists(&self, hash: &ContentHash) -> Result<bool, PortError>;
}

/// A single spendable/referenceable asset or resource record as read
/// through [`ChainView`]. Mirrors the shape of a committed
/// [`crate::draft::Output`], minus the zk proof scaffolding that only
/// applies to state outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub owner: [u8; 20],
    pub amount: u64,
    pub token_id: Option<Vec<u8>>,
}

/// A resource record as read through [`ChainView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub content_hash: ContentHash,
    pub category: String,
    pub owner: [u8; 20],
    pub metadata: Vec<u8>,
}

/// A block header as read through [`ChainView::block_by_height`] /
/// [`ChainView::highest_block`] — just enough for a caller to confirm a
/// height/hash pair without pulling the full block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub height: u64,
    pub hash: [u8; 32],
}

/// Read-only access to committed chain state (C2): confirmed UTXOs,
/// resource records, historical state outputs, and block hashes. Every
/// method here is a point lookup against already-finalized data — the core
/// never asks this port about the in-flight draft it is itself building.
pub trait ChainView: Send + Sync {
    fn utxo_lookup(&self, outpoint: &Outpoint) -> Result<Utxo, PortError>;

    fn utxo_exists(&self, outpoint: &Outpoint) -> Result<bool, PortError>;

    /// Every UTXO owned by `owner`, optionally narrowed to one token
    /// category (`None` matches native coin and every token alike), and
    /// optionally including already-spent outputs rather than only the
    /// unspent set.
    fn utxos_by_address(
        &self,
        owner: &[u8; 20],
        category: Option<&[u8]>,
        include_spent: bool,
    ) -> Result<Vec<Utxo>, PortError>;

    fn resource_lookup(&self, content_hash: &ContentHash) -> Result<ResourceRecord, PortError>;

    fn resource_exists(&self, content_hash: &ContentHash) -> Result<bool, PortError>;

    /// Most recent committed `(execution_result_hash, state_version)` for
    /// `state_id`, scanning at most [`MAX_HISTORICAL_SCAN_BLOCKS`] blocks
    /// back from `from_block_height` (SPEC_FULL §10 decision on the
    /// original's 100-block bound).
    fn state_get_from_chain(
        &self,
        state_id: &[u8],
        from_block_height: u64,
    ) -> Result<Option<([u8; 32], u64)>, PortError>;

    /// The hash committed for a given block height, or `NotFound` if the
    /// height hasn't been reached yet.
    fn block_hash(&self, height: u64) -> Result<[u8; 32], PortError>;

    /// The full header at `height`, or `NotFound` past the chain tip.
    fn block_by_height(&self, height: u64) -> Result<Block, PortError>;

    /// The full header whose hash is `hash`, or `NotFound` if no committed
    /// block matches.
    fn block_by_hash(&self, hash: &[u8; 32]) -> Result<Block, PortError>;

    /// The chain tip: the highest committed `(height, hash)` pair.
    fn highest_block(&self) -> Result<Block, PortError>;
}

/// The historical-scan bound referenced by [`ChainView::state_get_from_chain`].
pub const MAX_HISTORICAL_SCAN_BLOCKS: u64 = 100;

/// Content hashing (C3). Kept as a port — rather than a free function in
/// this crate — so the WASM and ONNX adapters and the coordinator all
/// derive hashes through one injected implementation instead of each
/// pulling in a digest crate directly.
pub trait Hasher: Send + Sync {
    /// The canonical content hash of `bytes` (double-SHA-256 per
    /// `ispc-crypto`).
    fn hash(&self, bytes: &[u8]) -> ContentHash;
}

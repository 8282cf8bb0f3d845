// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ISPC CORE
//
// Shared data model and port traits for the in-situ execution coordinator:
// content hashes, the transaction draft a call builds up as it runs, the
// host-function trace, tensor types, the deterministic per-call snapshot,
// and the error vocabulary that crosses the Host ABI boundary. Every other
// crate in this workspace depends on this one; this one depends on nothing
// in the workspace.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod cancel;
pub mod draft;
pub mod error;
pub mod hash;
pub mod ports;
pub mod snapshot;
pub mod tensor;
pub mod trace;

pub use cancel::CancellationToken;
pub use draft::{
    ApproveIntent, BurnIntent, Input, LockingCondition, Output, Outpoint, TransactionDraft,
    UnlockingProof, ZkProof,
};
pub use error::{ContextError, CoordinatorError, HostErrorCode, PortError};
pub use hash::{ContentHash, ContentHashParseError};
pub use ports::{
    Block, BlobStore, ChainView, Hasher, ResourceRecord, Utxo, MAX_HISTORICAL_SCAN_BLOCKS,
};
pub use snapshot::DeterministicSnapshot;
pub use tensor::{OnnxModelMetadata, TensorDType, TensorInfo, TensorInput, TensorOutput};
pub use trace::{Event, HostFunctionCall};

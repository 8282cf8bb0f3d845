// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ISPC ONNX INFERENCE (C8, C9)
//
// The read-only host-function adapter ONNX models see, plus the inference
// engine that loads a content-addressed model, marshals tensors in and out,
// and bounds concurrent sessions. No teacher or sibling example in the
// retrieval pack touches ONNX; this crate is built fresh against `ort`,
// following the node's own `Arc<Mutex<_>>`/`RwLock` concurrency idioms.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod engine;
pub mod host_fns;
pub mod marshal;
pub mod semaphore;

pub use engine::{OnnxEngine, DEFAULT_CONCURRENCY};
pub use host_fns::OnnxHostAbi;

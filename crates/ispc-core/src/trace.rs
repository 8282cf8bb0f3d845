//! The append-only host-function call trace recorded inside a context.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One recorded host-function invocation. `sequence` is strictly increasing
/// within a context (§3, P1): the sequence of trace records equals the
/// sequence of host-function invocations observed by the guest (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostFunctionCall {
    pub sequence: u64,
    pub function_name: String,
    pub parameters: Map<String, Value>,
    pub result: Map<String, Value>,
    pub timestamp_ns: i64,
}

/// An event emitted via `EmitEvent`. The node's `ContractEvent` keeps a
/// `timestamp` field alongside type/data (SPEC_FULL §4 supplement); this
/// type keeps that shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub data: Value,
    pub timestamp_ns: i64,
}

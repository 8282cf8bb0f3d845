// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ISPC EXECUTION CONTEXT
//
// Per-call state accumulated while one WASM or ONNX call runs: the
// deterministic snapshot it was created with, the transaction draft it is
// building, the append-only host-function trace, and the events a contract
// has emitted. One context backs exactly one call; the coordinator creates
// it, binds a Host ABI to it, and destroys it when the call ends.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde_json::{Map, Value};

use ispc_core::{ContextError, DeterministicSnapshot, Event, HostFunctionCall, TransactionDraft};

/// Bound on the number of trace records a single context retains in full
/// (I3). Beyond this, the context keeps recording call *counts* but stops
/// retaining the full parameter/result payloads, and flags the trace as
/// truncated rather than silently dropping the fact that more calls
/// happened.
pub const MAX_TRACE_RECORDS: usize = 10_000;

/// Gas/resource accounting finalized once, at the end of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceUsage {
    pub gas_used: u64,
}

/// Per-call execution state (C5).
pub struct ExecutionContext {
    snapshot: DeterministicSnapshot,
    host_abi_bound: bool,
    destroyed: bool,
    init_params: Option<Vec<u8>>,
    draft: TransactionDraft,
    trace: Vec<HostFunctionCall>,
    trace_truncated_count: u64,
    next_sequence: u64,
    events: Vec<Event>,
    return_data: Option<Vec<u8>>,
    resource_usage: Option<ResourceUsage>,
}

impl ExecutionContext {
    /// `CreateContext`: freeze `snapshot` for the lifetime of this context (I2).
    pub fn new(snapshot: DeterministicSnapshot) -> Self {
        ExecutionContext {
            snapshot,
            host_abi_bound: false,
            destroyed: false,
            init_params: None,
            draft: TransactionDraft::new(),
            trace: Vec::new(),
            trace_truncated_count: 0,
            next_sequence: 0,
            events: Vec::new(),
            return_data: None,
            resource_usage: None,
        }
    }

    fn check_live(&self) -> Result<(), ContextError> {
        if self.destroyed {
            return Err(ContextError::ContextDestroyed);
        }
        Ok(())
    }

    fn check_ready(&self) -> Result<(), ContextError> {
        self.check_live()?;
        if !self.host_abi_bound {
            return Err(ContextError::Unbound);
        }
        Ok(())
    }

    /// `SetHostABI`: bind this context to the Host ABI instance wrapping it
    /// (I1). No host-function call may be recorded before this happens —
    /// bound exactly once per context.
    pub fn set_host_abi(&mut self) -> Result<(), ContextError> {
        self.check_live()?;
        if self.host_abi_bound {
            return Err(ContextError::Unbound);
        }
        self.host_abi_bound = true;
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.host_abi_bound
    }

    /// `SetInitParams`: record the raw bytes passed to a constructor-style
    /// call. May be set at most once, before the call's host functions run.
    pub fn set_init_params(&mut self, params: Vec<u8>) -> Result<(), ContextError> {
        self.check_live()?;
        self.init_params = Some(params);
        Ok(())
    }

    pub fn init_params(&self) -> Option<&[u8]> {
        self.init_params.as_deref()
    }

    // ── I2: snapshot reads are frozen for the context's whole lifetime ──

    pub fn get_block_height(&self) -> u64 {
        self.snapshot.block_height
    }

    pub fn get_block_timestamp(&self) -> i64 {
        self.snapshot.block_timestamp
    }

    pub fn get_chain_id(&self) -> Vec<u8> {
        self.snapshot.chain_id.clone()
    }

    pub fn get_transaction_id(&self) -> [u8; 32] {
        self.snapshot.transaction_id
    }

    pub fn get_caller_address(&self) -> [u8; 20] {
        self.snapshot.caller_address
    }

    pub fn get_contract_address(&self) -> [u8; 20] {
        self.snapshot.contract_address
    }

    pub fn snapshot(&self) -> DeterministicSnapshot {
        self.snapshot.clone()
    }

    /// `UpdateTransactionDraft`: the one mutable handle into the draft this
    /// call is building. All mutation goes through [`TransactionDraft`]'s own
    /// append methods, so index stability (P2) holds regardless of what the
    /// caller does with the `&mut` here.
    pub fn draft_mut(&mut self) -> Result<&mut TransactionDraft, ContextError> {
        self.check_ready()?;
        Ok(&mut self.draft)
    }

    pub fn draft(&self) -> &TransactionDraft {
        &self.draft
    }

    /// `SetReturnData`: overwrite the call's return buffer. Later calls
    /// within the same context replace, rather than append to, the buffer.
    pub fn set_return_data(&mut self, data: Vec<u8>) -> Result<(), ContextError> {
        self.check_ready()?;
        self.return_data = Some(data);
        Ok(())
    }

    pub fn return_data(&self) -> Option<&[u8]> {
        self.return_data.as_deref()
    }

    /// `AddEvent`: append a contract-emitted event.
    pub fn add_event(&mut self, event_type: String, data: Value) -> Result<(), ContextError> {
        self.check_ready()?;
        self.events.push(Event {
            event_type,
            data,
            timestamp_ns: self.snapshot.block_timestamp,
        });
        Ok(())
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// `RecordHostFunctionCall` / `RecordTraceRecords`: append one
    /// host-function invocation to the trace (P1: sequence matches
    /// invocation order). Past [`MAX_TRACE_RECORDS`], the payload is no
    /// longer retained but the count keeps advancing and
    /// [`ExecutionContext::trace_truncated`] reports it (I3).
    pub fn record_host_function_call(
        &mut self,
        function_name: String,
        parameters: Map<String, Value>,
        result: Map<String, Value>,
    ) -> Result<u64, ContextError> {
        self.check_ready()?;
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if self.trace.len() < MAX_TRACE_RECORDS {
            self.trace.push(HostFunctionCall {
                sequence,
                function_name,
                parameters,
                result,
                timestamp_ns: self.snapshot.block_timestamp,
            });
        } else {
            self.trace_truncated_count += 1;
        }
        Ok(sequence)
    }

    pub fn trace(&self) -> &[HostFunctionCall] {
        &self.trace
    }

    pub fn trace_truncated(&self) -> bool {
        self.trace_truncated_count > 0
    }

    pub fn trace_truncated_count(&self) -> u64 {
        self.trace_truncated_count
    }

    pub fn call_count(&self) -> u64 {
        self.next_sequence
    }

    /// `FinalizeResourceUsage`: record gas accounting once, at call end.
    pub fn finalize_resource_usage(&mut self, gas_used: u64) -> Result<(), ContextError> {
        self.check_live()?;
        self.resource_usage = Some(ResourceUsage { gas_used });
        Ok(())
    }

    pub fn resource_usage(&self) -> Option<ResourceUsage> {
        self.resource_usage
    }

    /// `DestroyContext`: tear down the context (I4). Every method above
    /// that checks liveness starts failing with `ContextDestroyed`
    /// afterward; reads of the frozen snapshot remain valid since they
    /// don't borrow mutable state.
    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

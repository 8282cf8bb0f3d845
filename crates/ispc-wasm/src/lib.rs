// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ISPC WASM ENGINE (C10)
//
// Instantiates a content-addressed WASM module, binds the Host ABI through
// the function table in `host`, invokes the exported entry point, and
// reports gas consumption and trap/timeout faults back to the coordinator.
// Wasmer + Cranelift with deterministic instruction-level gas metering —
// every WASM instruction costs exactly 1 gas unit, so all callers computing
// the same module+function+gas_limit observe identical gas usage.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use wasmer::{imports, CompilerConfig, FunctionEnv, Instance, Module, Store};
use wasmer_compiler_cranelift::Cranelift;
use wasmer_middlewares::metering::{get_remaining_points, MeteringPoints};
use wasmer_middlewares::Metering;

use ispc_core::CoordinatorError;
use ispc_host::HostAbi;

/// Host functions: bridge between WASM guest and the Host ABI.
pub mod host;

/// Global counter for leaked WASM timeout threads. Once
/// [`MAX_LEAKED_THREADS`] is reached, new executions are rejected to prevent
/// unbounded resource consumption from pathological modules.
static LEAKED_THREADS: AtomicUsize = AtomicUsize::new(0);
const MAX_LEAKED_THREADS: usize = 16;

// Provide __rust_probestack stub for wasmer-vm 4.x compatibility with
// toolchains where this symbol was removed from compiler_builtins. The
// kernel's guard pages still catch genuine stack overflow.
#[cfg(all(
    any(target_arch = "x86_64", target_arch = "aarch64"),
    any(target_os = "linux", target_os = "macos")
))]
#[no_mangle]
pub extern "C" fn __rust_probestack() {}

/// Maximum allowed WASM bytecode size (1 MB).
const MAX_BYTECODE_SIZE: usize = 1_048_576;
/// Maximum WASM execution wall-clock time before the timeout safety net
/// fires (deterministic metering is expected to terminate first).
const MAX_EXECUTION_SECS: u64 = 5;
/// Gas cost per kilobyte of bytecode (compilation cost).
const GAS_PER_KB_BYTECODE: u64 = 100;

/// Outcome of one successful WASM call, handed back to the coordinator for
/// `FinalizeResourceUsage` (§4.1). Everything the guest did to the draft,
/// return-data, and events already landed in the Execution Context through
/// the Host ABI — the engine itself carries no guest-visible state.
#[derive(Debug, Clone, Copy)]
pub struct WasmCallResult {
    pub gas_used: u64,
}

/// The WASM engine (C10): instantiation, gas accounting, trap handling.
///
/// Two pieces of process-lifetime shared state (§5, §9's "legitimate
/// globals"): per-contract execution locks (TOCTOU prevention — without
/// them two concurrent calls to the same contract address could both
/// observe the same committed chain state and race on which draft lands
/// first) and the per-module bump allocator table, looked up by module key
/// under a reader/writer lock with the allocator itself behind a mutex.
pub struct WasmEngine {
    contract_locks: Arc<Mutex<BTreeMap<[u8; 20], Arc<Mutex<()>>>>>,
    allocators: Arc<RwLock<HashMap<String, Arc<Mutex<host::ModuleAllocator>>>>>,
    max_bytecode_size: usize,
    execution_timeout_secs: u64,
    allocator_guard_size: u32,
}

impl Default for WasmEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WasmEngine {
    pub fn new() -> Self {
        WasmEngine::with_limits(
            MAX_BYTECODE_SIZE,
            MAX_EXECUTION_SECS,
            host::DEFAULT_GUARD_SIZE,
        )
    }

    /// Construct with overridden limits, e.g. from a loaded
    /// `ispc_runtime::CoordinatorConfig` rather than the built-in defaults.
    pub fn with_limits(
        max_bytecode_size: usize,
        execution_timeout_secs: u64,
        allocator_guard_size: u32,
    ) -> Self {
        WasmEngine {
            contract_locks: Arc::new(Mutex::new(BTreeMap::new())),
            allocators: Arc::new(RwLock::new(HashMap::new())),
            max_bytecode_size,
            execution_timeout_secs,
            allocator_guard_size,
        }
    }

    fn get_contract_lock(&self, contract_address: [u8; 20]) -> Arc<Mutex<()>> {
        let mut locks = self
            .contract_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        locks
            .entry(contract_address)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Double-checked insertion under the reader/writer lock (§5): read lock
    /// first for the common case, only take the write lock to insert a
    /// fresh allocator for a module key we haven't seen yet.
    fn get_allocator(&self, module_key: &str, initial_top: u32) -> Arc<Mutex<host::ModuleAllocator>> {
        if let Some(existing) = self
            .allocators
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(module_key)
        {
            return existing.clone();
        }
        let mut allocators = self.allocators.write().unwrap_or_else(|e| e.into_inner());
        let guard_size = self.allocator_guard_size;
        allocators
            .entry(module_key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(host::ModuleAllocator::with_guard_size(
                    initial_top,
                    guard_size,
                )))
            })
            .clone()
    }

    /// Run `function_name` exported by `module_bytes`, with the Host ABI
    /// bound through `host::create_host_imports`. Per-contract execution is
    /// serialized (§5 S2's per-context draft-mutation contract depends on
    /// this at the engine layer, since a `HostAbi` wraps one
    /// `ExecutionContext` but several concurrent calls could still target
    /// the same contract's committed chain state).
    pub fn execute(
        &self,
        module_bytes: &[u8],
        function_name: &str,
        gas_limit: u64,
        contract_address: [u8; 20],
        module_key: &str,
        host_abi: Arc<dyn HostAbi>,
    ) -> Result<WasmCallResult, CoordinatorError> {
        let lock = self.get_contract_lock(contract_address);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        self.run(module_bytes, function_name, gas_limit, module_key, host_abi)
    }

    fn run(
        &self,
        module_bytes: &[u8],
        function_name: &str,
        gas_limit: u64,
        module_key: &str,
        host_abi: Arc<dyn HostAbi>,
    ) -> Result<WasmCallResult, CoordinatorError> {
        let leaked = LEAKED_THREADS.load(AtomicOrdering::Relaxed);
        if leaked >= MAX_LEAKED_THREADS {
            return Err(CoordinatorError::InternalError(format!(
                "WASM execution rejected: {} leaked timeout threads (max {})",
                leaked, MAX_LEAKED_THREADS
            )));
        }

        if module_bytes.len() < 4 || &module_bytes[0..4] != b"\0asm" {
            return Err(CoordinatorError::InvalidArtifact(
                "missing WASM magic header".to_string(),
            ));
        }
        if module_bytes.len() > self.max_bytecode_size {
            return Err(CoordinatorError::InvalidArtifact(format!(
                "bytecode too large: {} bytes (max {})",
                module_bytes.len(),
                self.max_bytecode_size
            )));
        }

        let compile_gas = (module_bytes.len() as u64 / 1024 + 1) * GAS_PER_KB_BYTECODE;
        if compile_gas > gas_limit {
            return Err(CoordinatorError::InvalidArtifact(format!(
                "out of gas: compilation cost {} exceeds limit {}",
                compile_gas, gas_limit
            )));
        }
        let remaining_gas = gas_limit - compile_gas;

        let module_owned = module_bytes.to_vec();
        let function_owned = function_name.to_string();
        let module_key_owned = module_key.to_string();
        let abort_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let abort_clone = Arc::clone(&abort_flag);
        let engine_allocators = Arc::clone(&self.allocators);
        let guard_size = self.allocator_guard_size;

        let (result_tx, result_rx) =
            std::sync::mpsc::channel::<Result<u64, CoordinatorError>>();

        let _handle = std::thread::spawn(move || {
            if abort_clone.load(std::sync::atomic::Ordering::Relaxed) {
                return;
            }

            let cost_fn = |_operator: &wasmer::wasmparser::Operator| -> u64 { 1 };
            let metering = Arc::new(Metering::new(remaining_gas, cost_fn));
            let mut compiler = Cranelift::default();
            compiler.push_middleware(metering);
            let mut store = Store::new(compiler);

            let module = match Module::new(&store, &module_owned) {
                Ok(m) => m,
                Err(e) => {
                    let _ = result_tx.send(Err(CoordinatorError::InvalidArtifact(format!(
                        "failed to compile WASM module: {}",
                        e
                    ))));
                    return;
                }
            };

            if abort_clone.load(std::sync::atomic::Ordering::Relaxed) {
                return;
            }

            let host_state = host::HostState {
                memory: None,
                abi: host_abi,
                allocator: Arc::new(Mutex::new(host::ModuleAllocator::with_guard_size(0, guard_size))),
            };
            let env = FunctionEnv::new(&mut store, host_state);
            let import_object = host::create_host_imports(&mut store, &env);

            let instance = match Instance::new(&mut store, &module, &import_object) {
                Ok(i) => i,
                Err(e) => {
                    let _ = result_tx.send(Err(CoordinatorError::GuestFault(format!(
                        "failed to instantiate WASM module: {}",
                        e
                    ))));
                    return;
                }
            };

            if let Ok(memory) = instance.exports.get_memory("memory") {
                let memory = memory.clone();
                let initial_top = memory.view(&store).data_size() as u32;
                // Re-key the allocator table by module content hash so
                // repeated calls to the same artifact keep growing the same
                // linear allocation instead of resetting it every call.
                let allocator = if let Some(existing) = engine_allocators
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&module_key_owned)
                {
                    existing.clone()
                } else {
                    let mut allocators =
                        engine_allocators.write().unwrap_or_else(|e| e.into_inner());
                    allocators
                        .entry(module_key_owned.clone())
                        .or_insert_with(|| {
                            Arc::new(Mutex::new(host::ModuleAllocator::with_guard_size(
                                initial_top,
                                guard_size,
                            )))
                        })
                        .clone()
                };
                env.as_mut(&mut store).memory = Some(memory);
                env.as_mut(&mut store).allocator = allocator;
            }

            let func = match instance.exports.get_function(&function_owned) {
                Ok(f) => f,
                Err(e) => {
                    let _ = result_tx.send(Err(CoordinatorError::InvalidArtifact(format!(
                        "function '{}' not found: {}",
                        function_owned, e
                    ))));
                    return;
                }
            };

            if abort_clone.load(std::sync::atomic::Ordering::Relaxed) {
                return;
            }

            let call_result = func.call(&mut store, &[]);

            if abort_clone.load(std::sync::atomic::Ordering::Relaxed) {
                return;
            }

            let exec_gas = match get_remaining_points(&mut store, &instance) {
                MeteringPoints::Remaining(remaining) => remaining_gas - remaining,
                MeteringPoints::Exhausted => {
                    let _ = result_tx.send(Err(CoordinatorError::GuestFault(format!(
                        "out of gas: execution exceeded {} instruction limit",
                        remaining_gas
                    ))));
                    return;
                }
            };

            match call_result {
                Ok(_results) => {
                    let _ = result_tx.send(Ok(exec_gas));
                }
                Err(e) => {
                    let err_str = format!("{}", e);
                    let _ = result_tx.send(Err(CoordinatorError::GuestFault(err_str)));
                }
            }
        });

        let timeout = std::time::Duration::from_secs(self.execution_timeout_secs);
        match result_rx.recv_timeout(timeout) {
            Ok(Ok(exec_gas)) => {
                let total_gas = compile_gas + exec_gas;
                if total_gas > gas_limit {
                    return Err(CoordinatorError::GuestFault(format!(
                        "out of gas: used {} (compile {} + exec {}) > limit {}",
                        total_gas, compile_gas, exec_gas, gas_limit
                    )));
                }
                Ok(WasmCallResult { gas_used: total_gas })
            }
            Ok(Err(e)) => Err(e),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                // Set the abort flag so the thread exits at its next
                // checkpoint. Do NOT join — if the guest entered an
                // infinite loop inside `func.call`, the thread is
                // permanently stuck and join() would block forever. The
                // thread leak is bounded by MAX_LEAKED_THREADS.
                abort_flag.store(true, std::sync::atomic::Ordering::Relaxed);
                LEAKED_THREADS.fetch_add(1, AtomicOrdering::Relaxed);
                Err(CoordinatorError::DeadlineExceeded)
            }
            Err(e) => Err(CoordinatorError::InternalError(format!(
                "WASM execution channel error: {}",
                e
            ))),
        }
    }
}

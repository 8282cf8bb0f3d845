// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ISPC COORDINATOR RUNTIME (C11, C12)
//
// Ties the WASM and ONNX engines, the injected ports, and Prometheus
// metrics together behind one `Coordinator::call` entry point, plus the
// on-disk configuration a node loads at startup.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod config;
pub mod coordinator;
pub mod engine_manager;
pub mod metrics;

pub use config::{ConfigError, CoordinatorConfig};
pub use coordinator::{CallKind, CallOutcome, CallRequest, Coordinator};
pub use engine_manager::EngineManager;
pub use metrics::CoordinatorMetrics;

//! §7 error handling design: the small, numerically stable host-function
//! error codes, plus the typed coordinator-level error sum.

use std::fmt;

/// A host-function error code, from the canonical table in §7. These are
/// returned as small positive integers across the pointer-ABI boundary, so
/// guests can branch on them — hence a transparent `u32` newtype rather
/// than a Rust enum (which has no stable wire representation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostErrorCode(pub u32);

impl HostErrorCode {
    pub const OK: HostErrorCode = HostErrorCode(0);
    pub const INVALID_PARAMETER: HostErrorCode = HostErrorCode(1001);
    pub const BUFFER_TOO_SMALL: HostErrorCode = HostErrorCode(1005);
    pub const INVALID_ADDRESS: HostErrorCode = HostErrorCode(1010);
    pub const INVALID_HASH: HostErrorCode = HostErrorCode(1011);
    pub const RESOURCE_NOT_FOUND: HostErrorCode = HostErrorCode(2003);
    pub const INTERNAL_ERROR: HostErrorCode = HostErrorCode(5001);
    pub const ENCODING_FAILED: HostErrorCode = HostErrorCode(5002);
    pub const CONTEXT_NOT_FOUND: HostErrorCode = HostErrorCode(5003);
    pub const MEMORY_ACCESS_FAILED: HostErrorCode = HostErrorCode(5004);
    pub const SERVICE_UNAVAILABLE: HostErrorCode = HostErrorCode(5005);
    pub const NOT_IMPLEMENTED: HostErrorCode = HostErrorCode(5006);

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "OK",
            1001 => "InvalidParameter",
            1005 => "BufferTooSmall",
            1010 => "InvalidAddress",
            1011 => "InvalidHash",
            2003 => "ResourceNotFound",
            5001 => "InternalError",
            5002 => "EncodingFailed",
            5003 => "ContextNotFound",
            5004 => "MemoryAccessFailed",
            5005 => "ServiceUnavailable",
            5006 => "NotImplemented",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for HostErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

impl From<HostErrorCode> for i32 {
    fn from(code: HostErrorCode) -> i32 {
        code.0 as i32
    }
}

/// Errors a port (blob store, chain view) can report back to the Host ABI.
/// §4.2: chain-data lookups "may fail with NotFound or Transient".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    NotFound,
    Transient(String),
    Unavailable,
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortError::NotFound => write!(f, "not found"),
            PortError::Transient(msg) => write!(f, "transient error: {}", msg),
            PortError::Unavailable => write!(f, "port unavailable"),
        }
    }
}

impl std::error::Error for PortError {}

impl From<&PortError> for HostErrorCode {
    fn from(e: &PortError) -> HostErrorCode {
        match e {
            PortError::NotFound => HostErrorCode::RESOURCE_NOT_FOUND,
            PortError::Transient(_) => HostErrorCode::INTERNAL_ERROR,
            PortError::Unavailable => HostErrorCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Errors that reach the Execution Context's own mutating methods, per
/// §4.1's failure semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The context was already destroyed (I4).
    ContextDestroyed,
    /// A path required `host_abi` to be set, but it wasn't yet (I1/§4.1).
    Unbound,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::ContextDestroyed => write!(f, "context destroyed"),
            ContextError::Unbound => write!(f, "host ABI not bound to context"),
        }
    }
}

impl std::error::Error for ContextError {}

/// Coordinator-level errors returned to the outer caller (§7). Each wraps
/// the underlying cause as a string, matching the node's habit of carrying
/// `format!`-built prose in its `Result<T, String>` internals while giving
/// the boundary a real enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The guest trapped or panicked; any draft mutations up to the fault
    /// are discarded (§4.7: the call is a single atomic effect).
    GuestFault(String),
    /// An injected port (blob store, chain view) was unavailable.
    HostUnavailable(String),
    /// The requested artifact failed to load or validate (bad magic,
    /// oversized, malformed ONNX graph, ...).
    InvalidArtifact(String),
    /// The call's cancellation token fired before completion.
    Cancelled,
    /// The call's deadline elapsed before completion.
    DeadlineExceeded,
    /// Any other condition that concerns runtime integrity rather than
    /// guest behavior (e.g. inference engine init failure surviving
    /// recovery).
    InternalError(String),
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorError::GuestFault(msg) => write!(f, "guest fault: {}", msg),
            CoordinatorError::HostUnavailable(msg) => write!(f, "host unavailable: {}", msg),
            CoordinatorError::InvalidArtifact(msg) => write!(f, "invalid artifact: {}", msg),
            CoordinatorError::Cancelled => write!(f, "cancelled"),
            CoordinatorError::DeadlineExceeded => write!(f, "deadline exceeded"),
            CoordinatorError::InternalError(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for CoordinatorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_names_match_table() {
        assert_eq!(HostErrorCode::INVALID_PARAMETER.name(), "InvalidParameter");
        assert_eq!(HostErrorCode::BUFFER_TOO_SMALL.0, 1005);
        assert_eq!(HostErrorCode::MEMORY_ACCESS_FAILED.0, 5004);
        assert!(HostErrorCode::OK.is_ok());
        assert!(!HostErrorCode::INTERNAL_ERROR.is_ok());
    }

    #[test]
    fn port_not_found_maps_to_resource_not_found() {
        let code: HostErrorCode = (&PortError::NotFound).into();
        assert_eq!(code, HostErrorCode::RESOURCE_NOT_FOUND);
    }

    #[test]
    fn port_unavailable_maps_to_service_unavailable() {
        let code: HostErrorCode = (&PortError::Unavailable).into();
        assert_eq!(code, HostErrorCode::SERVICE_UNAVAILABLE);
    }
}

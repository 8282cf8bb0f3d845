//! # ISPC Guest SDK
//!
//! Safe Rust wrappers around the host-function catalogue a coordinator's
//! WASM engine wires up under the `"env"` import module. Every function
//! here turns a pointer/length call into native Rust types; none of it
//! assumes anything about how the coordinator on the other side is built.
//!
//! ## Features
//! - `#![no_std]` — compiles to `wasm32-unknown-unknown` without libstd
//! - Global allocator backed by the host's own per-module bump allocator
//!   (`malloc` import) rather than a second allocator living in guest memory
//! - Deterministic-snapshot reads: [`chain::block_height`], [`chain::caller`], ...
//! - Draft mutations: [`draft::add_asset_output`], [`draft::add_state_output`], ...
//! - State access via [`state::get`] / [`state::set`] / [`state::exists`]
//! - Structured event emission via [`event::emit`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! #![no_std]
//! #![no_main]
//! extern crate alloc;
//! extern crate ispc_guest_sdk;
//!
//! use ispc_guest_sdk::*;
//!
//! #[no_mangle]
//! pub extern "C" fn init() -> i32 {
//!     let owner = chain::caller();
//!     state::set(b"owner", [0u8; 32]).ok();
//!     event::emit(r#"{"kind":"init"}"#);
//!     0
//! }
//! ```
//!
//! ## Compilation
//!
//! ```bash
//! cargo build --target wasm32-unknown-unknown --release
//! ```

#![no_std]

extern crate alloc;

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

// ─────────────────────────────────────────────────────────────────
// Global allocator — delegates to the host's per-module bump
// allocator (§4.5) via the `malloc` import, instead of growing guest
// memory independently. One allocator, one source of truth, shared
// with whatever the coordinator writes back into guest memory.
// ─────────────────────────────────────────────────────────────────

#[cfg(target_arch = "wasm32")]
mod allocator {
    use core::alloc::{GlobalAlloc, Layout};

    struct HostBackedAllocator;

    unsafe impl GlobalAlloc for HostBackedAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let size = layout.size().max(1) as i32;
            let ptr = super::raw::malloc(size);
            if ptr < 0 {
                core::ptr::null_mut()
            } else {
                ptr as u32 as *mut u8
            }
        }

        unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {
            // Bump allocator: individual frees are not supported. Memory is
            // reclaimed when the guest instance is torn down.
        }
    }

    #[global_allocator]
    static ALLOC: HostBackedAllocator = HostBackedAllocator;
}

#[cfg(target_arch = "wasm32")]
#[panic_handler]
fn panic_handler(info: &core::panic::PanicInfo) -> ! {
    let mut buf = [0u8; 256];
    let mut cursor = WriteCursor::new(&mut buf);
    let _ = core::fmt::write(&mut cursor, format_args!("{}", info));
    unsafe {
        raw::log_debug(buf.as_ptr() as i32, cursor.pos as i32);
    }
    core::arch::wasm32::unreachable();
}

struct WriteCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WriteCursor<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        WriteCursor { buf, pos: 0 }
    }
}

impl<'a> core::fmt::Write for WriteCursor<'a> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buf.len() - self.pos;
        let copy_len = bytes.len().min(remaining);
        self.buf[self.pos..self.pos + copy_len].copy_from_slice(&bytes[..copy_len]);
        self.pos += copy_len;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Host function imports — one extern per entry in
// `ispc_wasm::host::create_host_imports`'s `"env"` module.
// ─────────────────────────────────────────────────────────────────

mod raw {
    extern "C" {
        pub fn get_abi_version() -> i32;
        pub fn get_block_height() -> i64;
        pub fn get_block_timestamp() -> i64;
        pub fn get_chain_id(ptr: i32) -> i32;
        pub fn get_transaction_id(ptr: i32) -> i32;
        pub fn get_caller(addr_ptr: i32) -> i32;
        pub fn get_contract_address(addr_ptr: i32) -> i32;
        pub fn get_block_hash(height: i64, ptr: i32) -> i32;
        pub fn get_contract_init_params(buf_ptr: i32, buf_len: i32) -> i32;
        pub fn query_utxo_balance(addr_ptr: i32, token_ptr: i32, token_len: i32) -> i64;

        pub fn utxo_lookup_json(tx_ptr: i32, index: i32, out_ptr: i32, out_size: i32) -> i32;
        pub fn utxo_exists(tx_ptr: i32, index: i32) -> i32;
        pub fn resource_lookup_json(hash_ptr: i32, out_ptr: i32, out_size: i32) -> i32;
        pub fn resource_exists(hash_ptr: i32) -> i32;

        pub fn append_tx_input(
            tx_ptr: i32,
            index: i32,
            reference_only: i32,
            proof_ptr: i32,
            proof_len: i32,
        ) -> i32;
        pub fn append_asset_output(
            owner_ptr: i32,
            amount: i64,
            token_ptr: i32,
            token_len: i32,
            lock_ptr: i32,
            lock_len: i32,
        ) -> i32;
        pub fn append_resource_output(
            resource_json_ptr: i32,
            resource_json_len: i32,
            owner_ptr: i32,
            lock_ptr: i32,
            lock_len: i32,
            timestamp: i64,
        ) -> i32;
        pub fn append_state_output(
            state_id_ptr: i32,
            state_id_len: i32,
            version: i64,
            result_hash_ptr: i32,
            pub_inputs_ptr: i32,
            pub_inputs_len: i32,
            parent_hash_ptr: i32,
        ) -> i32;

        pub fn state_get(key_ptr: i32, key_len: i32, val_ptr: i32, val_len: i32) -> i32;
        pub fn state_set(key_ptr: i32, key_len: i32, val_ptr: i32, val_len: i32) -> i32;
        pub fn state_exists(key_ptr: i32, key_len: i32) -> i32;
        pub fn state_get_from_chain(
            id_ptr: i32,
            id_len: i32,
            val_ptr: i32,
            val_len: i32,
            version_ptr: i32,
        ) -> i32;

        pub fn address_bytes_to_base58(addr_ptr: i32, out_ptr: i32, max_len: i32) -> i32;
        pub fn base58_to_address_bytes(str_ptr: i32, str_len: i32, out_ptr: i32) -> i32;

        pub fn host_build_transaction(
            draft_ptr: i32,
            draft_len: i32,
            receipt_ptr: i32,
            receipt_size: i32,
        ) -> i32;

        pub fn set_return_data(ptr: i32, len: i32) -> i32;
        pub fn emit_event(json_ptr: i32, json_len: i32) -> i32;
        pub fn log_debug(ptr: i32, len: i32) -> i32;
        pub fn malloc(size: i32) -> i32;
    }
}

/// A host-function call returned one of the reserved error codes instead
/// of succeeding. The raw code matches the coordinator's `HostErrorCode`
/// catalogue; this crate doesn't duplicate the full table, since a guest
/// only needs to tell success from failure, not classify every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostError(pub i32);

type HostResult<T> = Result<T, HostError>;

fn buf_for(len: usize) -> Vec<u8> {
    vec![0u8; len]
}

// ─────────────────────────────────────────────────────────────────
// Deterministic snapshot reads
// ─────────────────────────────────────────────────────────────────

pub mod chain {
    use super::*;

    pub fn block_height() -> u64 {
        unsafe { raw::get_block_height() as u64 }
    }

    pub fn block_timestamp() -> i64 {
        unsafe { raw::get_block_timestamp() }
    }

    /// The chain id as a variable-length byte string — `get_chain_id`
    /// returns the number of bytes written, not a fixed width.
    pub fn chain_id() -> Vec<u8> {
        let mut buf = buf_for(64);
        let len = unsafe { raw::get_chain_id(buf.as_mut_ptr() as i32) };
        buf.truncate(len.max(0) as usize);
        buf
    }

    pub fn transaction_id() -> [u8; 32] {
        let mut buf = [0u8; 32];
        unsafe { raw::get_transaction_id(buf.as_mut_ptr() as i32) };
        buf
    }

    pub fn caller() -> [u8; 20] {
        let mut buf = [0u8; 20];
        unsafe { raw::get_caller(buf.as_mut_ptr() as i32) };
        buf
    }

    pub fn contract_address() -> [u8; 20] {
        let mut buf = [0u8; 20];
        unsafe { raw::get_contract_address(buf.as_mut_ptr() as i32) };
        buf
    }

    /// Sums native-coin UTXOs owned by `addr` when `token_id` is empty;
    /// otherwise sums only the contract-token UTXOs matching `token_id`
    /// under this contract's own address.
    pub fn query_utxo_balance(addr: &[u8; 20], token_id: &[u8]) -> HostResult<i64> {
        let rc = unsafe {
            raw::query_utxo_balance(
                addr.as_ptr() as i32,
                token_id.as_ptr() as i32,
                token_id.len() as i32,
            )
        };
        if rc >= 0 {
            Ok(rc)
        } else {
            Err(HostError(-1))
        }
    }

    pub fn block_hash(height: u64) -> HostResult<[u8; 32]> {
        let mut buf = [0u8; 32];
        let rc = unsafe { raw::get_block_hash(height as i64, buf.as_mut_ptr() as i32) };
        if rc < 0 || rc as usize == 32 {
            Ok(buf)
        } else {
            Err(HostError(rc))
        }
    }

    /// The raw bytes passed to a constructor-style call, if any.
    pub fn init_params() -> Option<Vec<u8>> {
        let mut buf = buf_for(262_144);
        let len = unsafe { raw::get_contract_init_params(buf.as_mut_ptr() as i32, buf.len() as i32) };
        if len <= 0 {
            return None;
        }
        buf.truncate(len as usize);
        Some(buf)
    }
}

// ─────────────────────────────────────────────────────────────────
// Chain-data lookups (committed state only)
// ─────────────────────────────────────────────────────────────────

pub mod lookup {
    use super::*;

    pub fn utxo_exists(tx_id: &[u8; 32], index: u32) -> bool {
        unsafe { raw::utxo_exists(tx_id.as_ptr() as i32, index as i32) == 1 }
    }

    /// A compact JSON document describing the UTXO (`owner`, `amount`,
    /// `token_id`), or `None` if it doesn't exist.
    pub fn utxo_lookup_json(tx_id: &[u8; 32], index: u32) -> Option<String> {
        let mut buf = buf_for(4_096);
        let rc = unsafe {
            raw::utxo_lookup_json(
                tx_id.as_ptr() as i32,
                index as i32,
                buf.as_mut_ptr() as i32,
                buf.len() as i32,
            )
        };
        if rc < 0 {
            return None;
        }
        buf.truncate(rc as usize);
        String::from_utf8(buf).ok()
    }

    pub fn resource_exists(content_hash: &[u8; 32]) -> bool {
        unsafe { raw::resource_exists(content_hash.as_ptr() as i32) == 1 }
    }

    pub fn resource_lookup_json(content_hash: &[u8; 32]) -> Option<String> {
        let mut buf = buf_for(65_536);
        let rc = unsafe {
            raw::resource_lookup_json(content_hash.as_ptr() as i32, buf.as_mut_ptr() as i32, buf.len() as i32)
        };
        if rc < 0 {
            return None;
        }
        buf.truncate(rc as usize);
        String::from_utf8(buf).ok()
    }
}

// ─────────────────────────────────────────────────────────────────
// Contract state
// ─────────────────────────────────────────────────────────────────

pub mod state {
    use super::*;

    /// `state_get`: the most recent execution-result hash recorded for
    /// `key`, checking the in-flight draft first. `None` if no value has
    /// ever been recorded.
    pub fn get(key: &[u8]) -> Option<[u8; 32]> {
        let mut out = [0u8; 32];
        let rc = unsafe {
            raw::state_get(
                key.as_ptr() as i32,
                key.len() as i32,
                out.as_mut_ptr() as i32,
                32,
            )
        };
        if rc == 0 {
            Some(out)
        } else {
            None
        }
    }

    /// Record `result_hash` as the new value for `key` (state version 1,
    /// no public inputs or parent hash — use [`draft::add_state_output`]
    /// directly for the full form).
    pub fn set(key: &[u8], result_hash: [u8; 32]) -> HostResult<()> {
        let rc = unsafe {
            raw::state_set(
                key.as_ptr() as i32,
                key.len() as i32,
                result_hash.as_ptr() as i32,
                32,
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(HostError(rc))
        }
    }

    pub fn exists(key: &[u8]) -> bool {
        unsafe { raw::state_exists(key.as_ptr() as i32, key.len() as i32) == 1 }
    }

    /// `state_get_from_chain`: bypass this call's own in-flight draft and
    /// read only committed chain history as of the current block height.
    pub fn get_from_chain(key: &[u8]) -> Option<([u8; 32], u64)> {
        let mut hash = [0u8; 32];
        let mut version_buf = [0u8; 8];
        let rc = unsafe {
            raw::state_get_from_chain(
                key.as_ptr() as i32,
                key.len() as i32,
                hash.as_mut_ptr() as i32,
                32,
                version_buf.as_mut_ptr() as i32,
            )
        };
        if rc == 0 {
            Some((hash, u64::from_le_bytes(version_buf)))
        } else {
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Transaction draft mutations
// ─────────────────────────────────────────────────────────────────

pub mod draft {
    use super::*;

    pub fn add_input(
        tx_id: &[u8; 32],
        index: u32,
        reference_only: bool,
        unlocking_proof: Option<&[u8]>,
    ) -> HostResult<u32> {
        let (proof_ptr, proof_len) = match unlocking_proof {
            Some(p) => (p.as_ptr() as i32, p.len() as i32),
            None => (0, 0),
        };
        let rc = unsafe {
            raw::append_tx_input(
                tx_id.as_ptr() as i32,
                index as i32,
                reference_only as i32,
                proof_ptr,
                proof_len,
            )
        };
        if rc >= 0 {
            Ok(rc as u32)
        } else {
            Err(HostError(rc))
        }
    }

    pub fn add_asset_output(
        owner: &[u8; 20],
        amount: u64,
        token_id: Option<&[u8]>,
        locking_condition: Option<&[u8]>,
    ) -> HostResult<u32> {
        let (token_ptr, token_len) = match token_id {
            Some(t) => (t.as_ptr() as i32, t.len() as i32),
            None => (0, 0),
        };
        let (lock_ptr, lock_len) = match locking_condition {
            Some(l) => (l.as_ptr() as i32, l.len() as i32),
            None => (0, 0),
        };
        let rc = unsafe {
            raw::append_asset_output(
                owner.as_ptr() as i32,
                amount as i64,
                token_ptr,
                token_len,
                lock_ptr,
                lock_len,
            )
        };
        if rc >= 0 {
            Ok(rc as u32)
        } else {
            Err(HostError(rc))
        }
    }

    /// `resource_json` is `{"content_hash": "<64 hex chars>", "category":
    /// "...", "metadata": "<hex, optional>"}`.
    pub fn add_resource_output(
        resource_json: &str,
        owner: &[u8; 20],
        locking_condition: Option<&[u8]>,
        timestamp: i64,
    ) -> HostResult<u32> {
        let (lock_ptr, lock_len) = match locking_condition {
            Some(l) => (l.as_ptr() as i32, l.len() as i32),
            None => (0, 0),
        };
        let rc = unsafe {
            raw::append_resource_output(
                resource_json.as_ptr() as i32,
                resource_json.len() as i32,
                owner.as_ptr() as i32,
                lock_ptr,
                lock_len,
                timestamp,
            )
        };
        if rc >= 0 {
            Ok(rc as u32)
        } else {
            Err(HostError(rc))
        }
    }

    pub fn add_state_output(
        state_id: &[u8],
        version: u64,
        execution_result_hash: [u8; 32],
        public_inputs: Option<&[u8]>,
        parent_state_hash: Option<&[u8; 32]>,
    ) -> HostResult<u32> {
        let (pub_ptr, pub_len) = match public_inputs {
            Some(p) => (p.as_ptr() as i32, p.len() as i32),
            None => (0, 0),
        };
        let parent_ptr = match parent_state_hash {
            Some(h) => h.as_ptr() as i32,
            None => 0,
        };
        let rc = unsafe {
            raw::append_state_output(
                state_id.as_ptr() as i32,
                state_id.len() as i32,
                version as i64,
                execution_result_hash.as_ptr() as i32,
                pub_ptr,
                pub_len,
                parent_ptr,
            )
        };
        if rc >= 0 {
            Ok(rc as u32)
        } else {
            Err(HostError(rc))
        }
    }

    /// `host_build_transaction`: finalize the draft accumulated so far and
    /// return the composed receipt as a JSON string (a `TxReceipt`: `mode`
    /// plus whichever of `unsigned_tx_hash`/`signed_tx_hash`/
    /// `serialized_tx`/`proposal_id`/`error` the selected mode produced).
    pub fn build_transaction() -> HostResult<String> {
        let mut buf = buf_for(65_536);
        let rc = unsafe {
            raw::host_build_transaction(0, 0, buf.as_mut_ptr() as i32, buf.len() as i32)
        };
        if rc != 0 {
            return Err(HostError(rc));
        }
        let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        buf.truncate(nul);
        String::from_utf8(buf).map_err(|_| HostError(-1))
    }
}

// ─────────────────────────────────────────────────────────────────
// Addresses
// ─────────────────────────────────────────────────────────────────

pub mod address {
    use super::*;

    pub fn to_base58(addr: &[u8; 20]) -> Option<String> {
        let mut buf = buf_for(64);
        let rc = unsafe {
            raw::address_bytes_to_base58(addr.as_ptr() as i32, buf.as_mut_ptr() as i32, buf.len() as i32)
        };
        if rc < 0 {
            return None;
        }
        buf.truncate(rc as usize);
        String::from_utf8(buf).ok()
    }

    pub fn from_base58(text: &str) -> Option<[u8; 20]> {
        let mut out = [0u8; 20];
        let rc = unsafe {
            raw::base58_to_address_bytes(text.as_ptr() as i32, text.len() as i32, out.as_mut_ptr() as i32)
        };
        if rc == 20 {
            Some(out)
        } else {
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Events, logging, return data
// ─────────────────────────────────────────────────────────────────

pub mod event {
    use super::*;

    /// Emit a structured event. `data_json` must be a JSON value.
    pub fn emit(data_json: &str) {
        unsafe {
            raw::emit_event(data_json.as_ptr() as i32, data_json.len() as i32);
        }
    }
}

/// Write a debug log line. Visible in coordinator logs, never stored
/// on-chain or charged gas beyond the call itself.
pub fn log(msg: &str) {
    unsafe {
        raw::log_debug(msg.as_ptr() as i32, msg.len() as i32);
    }
}

/// Set the return data for this call. Replaces, rather than appends to,
/// any previous return buffer set within the same call.
pub fn set_return(data: &[u8]) {
    unsafe {
        raw::set_return_data(data.as_ptr() as i32, data.len() as i32);
    }
}

pub fn set_return_str(s: &str) {
    set_return(s.as_bytes());
}

/// The ABI version the coordinator's engine reports, packed as
/// `(major << 16) | (minor << 8) | patch`.
pub fn abi_version() -> u32 {
    unsafe { raw::get_abi_version() as u32 }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    #[test]
    fn host_error_wraps_raw_code() {
        let e = super::HostError(1005);
        assert_eq!(e.0, 1005);
    }

    #[test]
    fn abi_version_packing_matches_engine_convention() {
        let packed = (1u32 << 16) | (0 << 8) | 0;
        assert_eq!(packed, 65_536);
    }

    #[test]
    fn amount_u64_roundtrips_through_i64_cast() {
        let amount: u64 = 1_000_000_000_000;
        let as_i64 = amount as i64;
        assert_eq!(as_i64 as u64, amount);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ISPC CRYPTO
//
// Content hashing (double-SHA-256, C3) and Base58Check address encoding.
// Everything here is a pure function over bytes — no keypairs, no signing,
// no key storage. Proof construction, signature verification, and key
// custody live outside the core, reached only through opaque bytes on the
// draft's Input/Output records.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use sha2::{Digest, Sha256};

use ispc_core::{ContentHash, Hasher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    InvalidBase58,
    WrongLength(usize),
    ChecksumMismatch,
    WrongChain,
}

impl std::fmt::Display for AddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressError::InvalidBase58 => write!(f, "not valid base58"),
            AddressError::WrongLength(n) => {
                write!(f, "decoded address must be 25 bytes, got {}", n)
            }
            AddressError::ChecksumMismatch => write!(f, "address checksum mismatch"),
            AddressError::WrongChain => write!(f, "address version byte does not match chain id"),
        }
    }
}

impl std::error::Error for AddressError {}

/// Version byte identifying a 20-byte owner hash as an ISPC address.
pub const ADDRESS_VERSION: u8 = 0x1C;

/// The version byte used for a given chain — [`ADDRESS_VERSION`] folded
/// with every byte of `chain_id`, so distinct chains never share an
/// address version and an empty `chain_id` degrades to the bare constant.
fn version_byte_for_chain(chain_id: &[u8]) -> u8 {
    chain_id.iter().fold(ADDRESS_VERSION, |acc, b| acc ^ b)
}

/// SHA-256(SHA-256(bytes)) — the canonical content hash, applied to any
/// artifact the coordinator content-addresses (WASM modules, ONNX models).
pub fn double_sha256(bytes: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// A [`Hasher`] port implementation backed by [`double_sha256`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DoubleSha256Hasher;

impl Hasher for DoubleSha256Hasher {
    fn hash(&self, bytes: &[u8]) -> ContentHash {
        ContentHash::from_bytes(double_sha256(bytes))
    }
}

/// Encode a 20-byte owner hash as Base58Check: `version || hash || checksum`,
/// where `version` is derived from `chain_id` (so addresses from different
/// chains never collide) and `checksum` is the first 4 bytes of
/// `double_sha256(version || hash)`.
pub fn encode_address(owner: &[u8; 20], chain_id: &[u8]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(version_byte_for_chain(chain_id));
    payload.extend_from_slice(owner);

    let checksum = double_sha256(&payload);

    let mut full = payload;
    full.extend_from_slice(&checksum[..4]);

    bs58::encode(&full).into_string()
}

/// Decode and checksum-validate a Base58Check address for `chain_id`,
/// returning the 20-byte owner hash. Fails with [`AddressError::WrongChain`]
/// if the address was encoded for a different chain.
pub fn decode_address(address: &str, chain_id: &[u8]) -> Result<[u8; 20], AddressError> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|_| AddressError::InvalidBase58)?;

    if decoded.len() != 25 {
        return Err(AddressError::WrongLength(decoded.len()));
    }

    let payload = &decoded[..21];
    let checksum = &decoded[21..];

    let expected = double_sha256(payload);
    if checksum != &expected[..4] {
        return Err(AddressError::ChecksumMismatch);
    }

    if payload[0] != version_byte_for_chain(chain_id) {
        return Err(AddressError::WrongChain);
    }

    let mut owner = [0u8; 20];
    owner.copy_from_slice(&payload[1..]);
    Ok(owner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_sha256_is_deterministic() {
        let a = double_sha256(b"hello");
        let b = double_sha256(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn double_sha256_differs_for_different_input() {
        assert_ne!(double_sha256(b"a"), double_sha256(b"b"));
    }

    #[test]
    fn address_round_trips() {
        let owner = [7u8; 20];
        let addr = encode_address(&owner, &[1]);
        let decoded = decode_address(&addr, &[1]).unwrap();
        assert_eq!(decoded, owner);
    }

    #[test]
    fn address_rejects_tampered_checksum() {
        let owner = [3u8; 20];
        let mut addr = encode_address(&owner, &[1]);
        addr.push('x');
        assert!(decode_address(&addr, &[1]).is_err());
    }

    #[test]
    fn address_rejects_garbage_base58() {
        assert_eq!(
            decode_address("not-valid-base58!!", &[1]),
            Err(AddressError::InvalidBase58)
        );
    }

    #[test]
    fn address_rejects_mismatched_chain_id() {
        let owner = [9u8; 20];
        let addr = encode_address(&owner, &[1]);
        assert_eq!(decode_address(&addr, &[2]), Err(AddressError::WrongChain));
    }

    #[test]
    fn different_chain_ids_yield_different_addresses_for_the_same_owner() {
        let owner = [9u8; 20];
        assert_ne!(encode_address(&owner, &[1]), encode_address(&owner, &[2]));
    }

    #[test]
    fn empty_chain_id_uses_the_bare_address_version() {
        let owner = [9u8; 20];
        let addr = encode_address(&owner, &[]);
        let decoded = bs58::decode(&addr).into_vec().unwrap();
        assert_eq!(decoded[0], ADDRESS_VERSION);
    }

    #[test]
    fn hasher_port_matches_double_sha256() {
        let hasher = DoubleSha256Hasher;
        let content_hash = hasher.hash(b"artifact bytes");
        assert_eq!(*content_hash.as_bytes(), double_sha256(b"artifact bytes"));
    }
}

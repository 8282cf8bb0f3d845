//! Content hash: the 32-byte identifier for any WASM module or ONNX model,
//! plus the textual form used at API boundaries.

use std::fmt;
use std::str::FromStr;

/// Fixed 32-byte content identifier. Canonically the double-SHA-256 of the
/// referenced artifact's bytes (see [`crate::ports::Hasher`]); this type
/// itself does no hashing, it only carries and validates the digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

/// Errors parsing a content hash from its textual form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentHashParseError {
    /// Not 64 hex characters after trimming whitespace.
    WrongLength(usize),
    /// Carried a `0x` prefix, which §3 explicitly forbids at API boundaries.
    HexPrefixRejected,
    /// Contained non-hex characters.
    InvalidHex,
}

impl fmt::Display for ContentHashParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentHashParseError::WrongLength(n) => {
                write!(f, "content hash must be 64 hex chars, got {}", n)
            }
            ContentHashParseError::HexPrefixRejected => {
                write!(f, "content hash must not carry a 0x prefix")
            }
            ContentHashParseError::InvalidHex => write!(f, "content hash is not valid hex"),
        }
    }
}

impl std::error::Error for ContentHashParseError {}

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ContentHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse the 64-lowercase-hex textual form. Leading/trailing whitespace
    /// is trimmed. A `0x` prefix is rejected, per §3.
    pub fn parse_hex(text: &str) -> Result<Self, ContentHashParseError> {
        let trimmed = text.trim();
        if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
            return Err(ContentHashParseError::HexPrefixRejected);
        }
        if trimmed.len() != 64 {
            return Err(ContentHashParseError::WrongLength(trimmed.len()));
        }
        let decoded = hex::decode(trimmed).map_err(|_| ContentHashParseError::InvalidHex)?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        Ok(ContentHash(bytes))
    }

    /// Parse from a raw 32-byte slice (e.g. a WASM pointer read), with no
    /// hex decoding. Fails if the slice length isn't exactly 32.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Some(ContentHash(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = ContentHashParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl serde::Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentHash::parse_hex(&s).map_err(serde::de::Error::custom)
    }
}

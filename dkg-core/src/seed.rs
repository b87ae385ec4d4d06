//! DKG seeds

use core::fmt;

use byteorder::{BigEndian, ByteOrder};
use sha2::{Digest, Sha256};

/// The value a DKG run is derived from.
///
/// Holds the big-endian encoding of the seed number without leading zero
/// bytes, so that every node hashes the same bytes for the same number.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DkgSeed(Vec<u8>);

impl DkgSeed {
    /// Create a seed from the big-endian bytes of the seed number.
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let start = bytes
            .iter()
            .position(|byte| *byte != 0)
            .unwrap_or(bytes.len());
        Self(bytes[start..].to_vec())
    }

    /// The minimal big-endian encoding of the seed.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The seed of the random retry algorithm: the first 8 bytes of
    /// `sha256(seed)` read as a big-endian signed integer.
    pub fn random_retry_seed(&self) -> i64 {
        let digest = Sha256::digest(&self.0);
        BigEndian::read_i64(&digest[..8])
    }

    /// Session identifier of one DKG attempt. Different for every attempt.
    pub fn session_id(&self, attempt: u32) -> String {
        format!("{}-{}", self, attempt)
    }

    /// Name of the broadcast channel used by the given protocol for this seed.
    pub fn channel_name(&self, protocol: &str) -> String {
        format!("{}-{}", protocol, self)
    }
}

impl From<u64> for DkgSeed {
    fn from(seed: u64) -> Self {
        Self::from_be_bytes(&seed.to_be_bytes())
    }
}

impl fmt::Display for DkgSeed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let encoded = hex::encode(&self.0);
        let trimmed = encoded.trim_start_matches('0');
        if trimmed.is_empty() {
            write!(f, "0")
        } else {
            write!(f, "{}", trimmed)
        }
    }
}

impl fmt::Debug for DkgSeed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("DkgSeed").field(&format!("0x{}", self)).finish()
    }
}

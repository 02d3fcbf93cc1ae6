// Self-describing hashes: an algorithm code plus a digest, canonically
// serialized as (code, digest length, digest bytes) -- the standard
// multihash wire format, which we get for free from the `multihash` crate.

use multihash::Multihash as GenericMultihash;
use multihash_codetable::{Code, MultihashDigest};

/// Maximum digest size we support (big enough for sha2-512).
pub const MAX_DIGEST_SIZE: usize = 64;

/// A self-describing hash value: an algorithm code and a digest.
pub type Hash = GenericMultihash<MAX_DIGEST_SIZE>;

/// Hash algorithms the core knows how to compute directly (as opposed to
/// ones it can only verify after seeing them on the wire). Mirrors the
/// multicodec hash-function table subset used by the original chain:
/// 0x11 sha1, 0x12 sha2-256, 0x13 sha2-512, 0x1053 ripemd-160.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SupportedHashes {
    Sha1,
    Sha2_256,
    Sha2_512,
    Ripemd160,
}

impl SupportedHashes {
    pub const SHA1_CODE: u64 = 0x11;
    pub const SHA2_256_CODE: u64 = 0x12;
    pub const SHA2_512_CODE: u64 = 0x13;
    pub const RIPEMD160_CODE: u64 = 0x1053;

    pub fn code(self) -> u64 {
        match self {
            SupportedHashes::Sha1 => Self::SHA1_CODE,
            SupportedHashes::Sha2_256 => Self::SHA2_256_CODE,
            SupportedHashes::Sha2_512 => Self::SHA2_512_CODE,
            SupportedHashes::Ripemd160 => Self::RIPEMD160_CODE,
        }
    }

    pub fn try_from_code(code: u64) -> Option<Self> {
        match code {
            Self::SHA1_CODE => Some(SupportedHashes::Sha1),
            Self::SHA2_256_CODE => Some(SupportedHashes::Sha2_256),
            Self::SHA2_512_CODE => Some(SupportedHashes::Sha2_512),
            Self::RIPEMD160_CODE => Some(SupportedHashes::Ripemd160),
            _ => None,
        }
    }

    /// Standard digest size for this algorithm, in bytes.
    pub fn digest_size(self) -> usize {
        match self {
            SupportedHashes::Sha1 => 20,
            SupportedHashes::Sha2_256 => 32,
            SupportedHashes::Sha2_512 => 64,
            SupportedHashes::Ripemd160 => 20,
        }
    }

    fn codetable_code(self) -> Code {
        match self {
            SupportedHashes::Sha1 => Code::Sha1,
            SupportedHashes::Sha2_256 => Code::Sha2_256,
            SupportedHashes::Sha2_512 => Code::Sha2_512,
            SupportedHashes::Ripemd160 => Code::Ripemd160,
        }
    }
}

/// Computes a self-describing hash of `data` using `code`.
///
/// `code` is the raw multicodec hash-function id (see [`SupportedHashes`]);
/// an unknown code is a caller error, reported as `None` so callers can
/// translate it into their own "unknown hash code" failure.
pub fn hash(code: u64, data: &[u8]) -> Option<Hash> {
    let supported = SupportedHashes::try_from_code(code)?;
    Some(supported.codetable_code().digest(data))
}

/// The all-zero hash of the given algorithm -- used as the "no previous
/// block" sentinel and as the root state node's identity.
pub fn zero_hash(code: u64) -> Option<Hash> {
    let supported = SupportedHashes::try_from_code(code)?;
    let digest = vec![0u8; supported.digest_size()];
    GenericMultihash::wrap(code, &digest).ok()
}

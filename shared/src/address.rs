// Address derivation, WIF encoding and ECDSA sign/recover.
//
// Addresses follow `base58(prefix || ripemd160(sha256(compressed_pubkey)) || checksum4)`
// with `prefix = 0x00`. WIF-encoded private keys use `prefix = 0x80` with the
// same double-sha256 checksum scheme.

use libsecp256k1::{Message, PublicKey, RecoveryId, SecretKey, Signature};
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ADDRESS_PREFIX: u8 = 0x00;
pub const WIF_PREFIX: u8 = 0x80;
pub const ADDRESS_DIGEST_LEN: usize = 20;
pub const SIGNATURE_LEN: usize = 65;

/// A 20-byte account address, derived from a public key's ripemd160(sha256(...)) digest.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_DIGEST_LEN]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid base58 payload: {0}")]
    Base58(String),
    #[error("checksum mismatch")]
    BadChecksum,
    #[error("unexpected address/key prefix byte {0:#04x}")]
    BadPrefix(u8),
    #[error("address payload must be {expected} bytes, got {got}")]
    BadLength { expected: usize, got: usize },
    #[error("invalid secp256k1 key or signature: {0:?}")]
    Secp256k1(libsecp256k1::Error),
    #[error("signature recovery id out of range: {0}")]
    BadRecoveryId(u8),
}

impl From<libsecp256k1::Error> for CryptoError {
    fn from(e: libsecp256k1::Error) -> Self {
        CryptoError::Secp256k1(e)
    }
}

fn checksum4(payload: &[u8]) -> [u8; 4] {
    let once = Code::Sha2_256.digest(payload);
    let twice = Code::Sha2_256.digest(once.digest());
    let mut out = [0u8; 4];
    out.copy_from_slice(&twice.digest()[..4]);
    out
}

fn encode_base58_check(prefix: u8, payload: &[u8]) -> String {
    let mut buf = Vec::with_capacity(1 + payload.len() + 4);
    buf.push(prefix);
    buf.extend_from_slice(payload);
    let sum = checksum4(&buf);
    buf.extend_from_slice(&sum);
    bs58::encode(buf).into_string()
}

fn decode_base58_check(s: &str, expected_prefix: u8) -> Result<Vec<u8>, CryptoError> {
    let raw = bs58::decode(s)
        .into_vec()
        .map_err(|e| CryptoError::Base58(e.to_string()))?;
    if raw.len() < 5 {
        return Err(CryptoError::Base58("too short".into()));
    }
    let (body, sum) = raw.split_at(raw.len() - 4);
    let expect = checksum4(body);
    if expect != sum {
        return Err(CryptoError::BadChecksum);
    }
    if body[0] != expected_prefix {
        return Err(CryptoError::BadPrefix(body[0]));
    }
    Ok(body[1..].to_vec())
}

impl Address {
    pub fn from_bytes(bytes: [u8; ADDRESS_DIGEST_LEN]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_DIGEST_LEN] {
        &self.0
    }

    /// Derives the address of the given (uncompressed or compressed) public key.
    pub fn from_public_key(pk: &PublicKey) -> Self {
        let compressed = pk.serialize_compressed();
        let sha = Code::Sha2_256.digest(&compressed);
        let ripemd = Code::Ripemd160.digest(sha.digest());
        let mut out = [0u8; ADDRESS_DIGEST_LEN];
        out.copy_from_slice(ripemd.digest());
        Address(out)
    }

    pub fn to_base58(&self) -> String {
        encode_base58_check(ADDRESS_PREFIX, &self.0)
    }

    pub fn from_base58(s: &str) -> Result<Self, CryptoError> {
        let body = decode_base58_check(s, ADDRESS_PREFIX)?;
        if body.len() != ADDRESS_DIGEST_LEN {
            return Err(CryptoError::BadLength {
                expected: ADDRESS_DIGEST_LEN,
                got: body.len(),
            });
        }
        let mut out = [0u8; ADDRESS_DIGEST_LEN];
        out.copy_from_slice(&body);
        Ok(Address(out))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// Encodes a secp256k1 private key as a WIF string.
pub fn encode_wif(sk: &SecretKey) -> String {
    encode_base58_check(WIF_PREFIX, &sk.serialize())
}

/// Decodes a WIF string back into a private key.
pub fn decode_wif(s: &str) -> Result<SecretKey, CryptoError> {
    let body = decode_base58_check(s, WIF_PREFIX)?;
    if body.len() != 32 {
        return Err(CryptoError::BadLength {
            expected: 32,
            got: body.len(),
        });
    }
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&body);
    SecretKey::parse(&bytes).map_err(CryptoError::from)
}

/// Deterministically derives a keypair from an arbitrary seed phrase, purely
/// for tests, demos and genesis bootstrapping -- never for production key
/// management (that lives outside the core, see spec.md's Non-goals).
pub fn privkey_from_seed(seed: &str) -> SecretKey {
    let digest = Code::Sha2_256.digest(seed.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(digest.digest());
    // A seed hash is vanishingly unlikely to land outside the curve order,
    // but loop to stay correct if it ever does.
    let mut attempt = bytes;
    loop {
        if let Ok(sk) = SecretKey::parse(&attempt) {
            return sk;
        }
        let rehash = Code::Sha2_256.digest(&attempt);
        attempt.copy_from_slice(rehash.digest());
    }
}

pub fn derive_address(sk: &SecretKey) -> Address {
    let pk = PublicKey::from_secret_key(sk);
    Address::from_public_key(&pk)
}

/// Signs a 32-byte digest, producing a 65-byte compact recoverable signature:
/// `sig[0] = 27 + recovery_id`, `sig[1..65] = r || s` (canonical, low-s).
pub fn sign_digest(sk: &SecretKey, digest: &[u8; 32]) -> [u8; SIGNATURE_LEN] {
    let message = Message::parse(digest);
    let (signature, recovery_id) = libsecp256k1::sign(&message, sk);
    let mut out = [0u8; SIGNATURE_LEN];
    out[0] = 27 + recovery_id.serialize();
    out[1..].copy_from_slice(&signature.serialize());
    out
}

/// Recovers the signer's public key from a signature and digest.
pub fn recover(digest: &[u8; 32], signature: &[u8; SIGNATURE_LEN]) -> Result<PublicKey, CryptoError> {
    let rec_byte = signature[0];
    if !(27..=30).contains(&rec_byte) {
        return Err(CryptoError::BadRecoveryId(rec_byte));
    }
    let recovery_id = RecoveryId::parse(rec_byte - 27)?;
    let mut compact = [0u8; 64];
    compact.copy_from_slice(&signature[1..]);
    let sig = Signature::parse_standard(&compact)?;
    let message = Message::parse(digest);
    Ok(libsecp256k1::recover(&message, &sig, &recovery_id)?)
}

/// Recovers the signer and compares its derived address against `expected`.
pub fn verify_signature(
    signature: &[u8; SIGNATURE_LEN],
    digest: &[u8; 32],
    expected: &Address,
) -> bool {
    match recover(digest, signature) {
        Ok(pk) => Address::from_public_key(&pk) == *expected,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wif_round_trips() {
        let sk = privkey_from_seed("test seed");
        let wif = encode_wif(&sk);
        let decoded = decode_wif(&wif).unwrap();
        assert_eq!(sk.serialize(), decoded.serialize());
    }

    #[test]
    fn address_round_trips_through_base58() {
        let sk = privkey_from_seed("upload seed");
        let addr = derive_address(&sk);
        let s = addr.to_base58();
        assert_eq!(Address::from_base58(&s).unwrap(), addr);
    }

    #[test]
    fn sign_then_recover_yields_same_pubkey() {
        let sk = privkey_from_seed("test seed");
        let pk = PublicKey::from_secret_key(&sk);
        let digest = Code::Sha2_256.digest(b"hello world");
        let mut d = [0u8; 32];
        d.copy_from_slice(digest.digest());
        let sig = sign_digest(&sk, &d);
        let recovered = recover(&d, &sig).unwrap();
        assert_eq!(pk, recovered);
        assert!(verify_signature(&sig, &d, &Address::from_public_key(&pk)));
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let sk = privkey_from_seed("test seed");
        let addr = derive_address(&sk);
        let mut s = addr.to_base58();
        // Flip the last character; vanishingly unlikely to still decode to the same bytes.
        s.pop();
        s.push(if s.ends_with('1') { '2' } else { '1' });
        assert!(Address::from_base58(&s).is_err());
    }
}

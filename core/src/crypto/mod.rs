//! Cryptographic primitives and canonical object hashing.
//!
//! `canonical_hash` is consensus-critical: its byte-exact JSON shape (sorted
//! keys, no inter-token whitespace, shortest round-trippable float
//! formatting) must be reproduced identically by every implementation. This
//! module relies on `serde_json`'s default (non-`preserve_order`) map
//! representation, which is backed by a `BTreeMap` and therefore always
//! serializes object keys in sorted order with compact separators.

use crate::error::CryptoError;
use ripemd::Ripemd160;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes, returned as the 32-byte digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// SHA-256 of raw bytes, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Serializes `value` as canonical JSON (sorted keys, no whitespace, UTF-8)
/// and returns the lowercase-hex SHA-256 of the resulting bytes.
///
/// This is the consensus-critical hashing contract used for transaction
/// hashes, block header hashes, and block hashes.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String, CryptoError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// Serializes `value` to canonical JSON bytes without hashing it. Exposed so
/// callers can sign the same bytes they will later hash.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CryptoError> {
    let json_value = serde_json::to_value(value)
        .map_err(|e| CryptoError::BadHex(format!("canonicalization failed: {e}")))?;
    serde_json::to_vec(&json_value)
        .map_err(|e| CryptoError::BadHex(format!("canonicalization failed: {e}")))
}

/// A secp256k1 keypair, used both for signing transactions and for deriving
/// addresses.
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Generates a fresh random keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (secret_key, public_key) = secp.generate_keypair(&mut rng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Loads a keypair from a 32-byte hex-encoded private key.
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key).map_err(|_| CryptoError::BadHex(hex_key.to_string()))?;
        let secret_key = SecretKey::from_slice(&bytes).map_err(|_| CryptoError::BadPoint)?;
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    pub fn export_private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    pub fn export_public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Address derived from this keypair's public key.
    pub fn address(&self) -> String {
        address_of(&self.public_key.serialize())
    }

    /// Signs the SHA-256 digest of `message_bytes`, returning a hex-encoded
    /// compact signature.
    pub fn sign(&self, message_bytes: &[u8]) -> Result<String, CryptoError> {
        let digest = sha256(message_bytes);
        let secp = Secp256k1::new();
        let msg = Message::from_slice(&digest).map_err(|_| CryptoError::BadPoint)?;
        let sig = secp.sign_ecdsa(&msg, &self.secret_key);
        Ok(hex::encode(sig.serialize_compact()))
    }
}

/// Derives an address from a raw (SEC1-encoded) public key:
/// `hex(RIPEMD160(SHA256(pubkey_bytes)))`.
pub fn address_of(pubkey_raw_bytes: &[u8]) -> String {
    let sha = sha256(pubkey_raw_bytes);
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha);
    let digest = ripemd.finalize();
    hex::encode(digest)
}

/// Verifies a hex-encoded compact ECDSA signature over `message_bytes`
/// against a hex-encoded raw public key. Never panics; malformed hex, a bad
/// curve point, or a wrong-length signature all resolve to `false` (or a
/// typed error where the distinction matters to the caller).
pub fn verify(pubkey_hex: &str, message_bytes: &[u8], signature_hex: &str) -> bool {
    verify_checked(pubkey_hex, message_bytes, signature_hex).unwrap_or(false)
}

/// Like [`verify`], but surfaces *why* verification could not even be
/// attempted (malformed hex, bad point, wrong signature length) instead of
/// folding every failure into `false`.
pub fn verify_checked(
    pubkey_hex: &str,
    message_bytes: &[u8],
    signature_hex: &str,
) -> Result<bool, CryptoError> {
    let pubkey_bytes =
        hex::decode(pubkey_hex).map_err(|_| CryptoError::BadHex(pubkey_hex.to_string()))?;
    let public_key = PublicKey::from_slice(&pubkey_bytes).map_err(|_| CryptoError::BadPoint)?;

    let sig_bytes =
        hex::decode(signature_hex).map_err(|_| CryptoError::BadHex(signature_hex.to_string()))?;
    if sig_bytes.len() != 64 {
        return Err(CryptoError::BadSignatureLength);
    }
    let signature =
        Signature::from_compact(&sig_bytes).map_err(|_| CryptoError::BadSignatureLength)?;

    let digest = sha256(message_bytes);
    let secp = Secp256k1::new();
    let msg = Message::from_slice(&digest).map_err(|_| CryptoError::BadPoint)?;

    Ok(secp.verify_ecdsa(&msg, &signature, &public_key).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_hash_is_order_independent() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
    }

    #[test]
    fn canonical_hash_differs_on_value_change() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
    }

    #[test]
    fn canonical_json_has_no_whitespace() {
        let bytes = canonical_json_bytes(&json!({"a": 1, "b": [1, 2]})).unwrap();
        let s = String::from_utf8(bytes).unwrap();
        assert_eq!(s, r#"{"a":1,"b":[1,2]}"#);
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = KeyPair::generate();
        let message = b"hello fractal chain";
        let sig = kp.sign(message).unwrap();
        let pubkey_hex = kp.export_public_key_hex();
        assert!(verify(&pubkey_hex, message, &sig));
    }

    #[test]
    fn mutated_message_fails_verification() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello").unwrap();
        let pubkey_hex = kp.export_public_key_hex();
        assert!(!verify(&pubkey_hex, b"goodbye", &sig));
    }

    #[test]
    fn mutated_signature_fails_verification() {
        let kp = KeyPair::generate();
        let mut sig = kp.sign(b"hello").unwrap();
        // flip a hex nibble
        sig.replace_range(0..1, if &sig[0..1] == "0" { "1" } else { "0" });
        let pubkey_hex = kp.export_public_key_hex();
        assert!(!verify(&pubkey_hex, b"hello", &sig));
    }

    #[test]
    fn malformed_hex_never_panics() {
        assert!(!verify("zz", b"hello", "zz"));
        assert_eq!(
            verify_checked("zz", b"hello", "zz"),
            Err(CryptoError::BadHex("zz".to_string()))
        );
    }

    #[test]
    fn address_of_is_forty_hex_chars() {
        let kp = KeyPair::generate();
        let addr = kp.address();
        assert_eq!(addr.len(), 40);
        assert!(addr.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

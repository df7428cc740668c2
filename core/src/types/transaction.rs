//! Transaction record type, canonical hashing, and structural/cryptographic
//! validation.

use crate::crypto::{self, canonical_json_bytes, KeyPair};
use crate::error::{CryptoError, StructuralError};
use crate::types::address::{self, COINBASE};
use serde::{Deserialize, Serialize};

/// The subset of a transaction's fields that participate in `tx_hash` and
/// in the signed message. Keys are serialized in sorted order by
/// `canonical_hash`/`canonical_json_bytes`, independent of this struct's
/// field declaration order.
#[derive(Debug, Serialize)]
struct SignableFields<'a> {
    sender: &'a str,
    recipient: &'a str,
    amount: f64,
    fee: f64,
    timestamp: f64,
}

/// A FractalChain transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub fee: f64,
    pub timestamp: f64,
    pub signature: String,
    pub public_key: String,
    pub tx_hash: String,
}

impl Transaction {
    fn signable_fields(&self) -> SignableFields<'_> {
        SignableFields {
            sender: &self.sender,
            recipient: &self.recipient,
            amount: self.amount,
            fee: self.fee,
            timestamp: self.timestamp,
        }
    }

    /// The canonical bytes that are both signed and hashed into `tx_hash`.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        canonical_json_bytes(&self.signable_fields())
    }

    /// Recomputes `tx_hash` from the signable fields.
    pub fn calculate_hash(&self) -> Result<String, CryptoError> {
        crypto::canonical_hash(&self.signable_fields())
    }

    /// Builds and signs a new transaction with `keypair`, deriving
    /// `sender` from the keypair's own address.
    pub fn new_signed(
        keypair: &KeyPair,
        recipient: String,
        amount: f64,
        fee: f64,
        timestamp: f64,
    ) -> Result<Self, CryptoError> {
        let sender = keypair.address();
        let unsigned = SignableFields {
            sender: &sender,
            recipient: &recipient,
            amount,
            fee,
            timestamp,
        };
        let bytes = canonical_json_bytes(&unsigned)?;
        let signature = keypair.sign(&bytes)?;
        let public_key = keypair.export_public_key_hex();

        let mut tx = Transaction {
            sender,
            recipient,
            amount,
            fee,
            timestamp,
            signature,
            public_key,
            tx_hash: String::new(),
        };
        tx.tx_hash = tx.calculate_hash()?;
        Ok(tx)
    }

    /// Creates the synthetic coinbase transaction paying the miner the
    /// block reward plus fees. Its signature is the fixed, never
    /// cryptographically verified string `coinbase_block_<index>`.
    pub fn create_coinbase(
        miner_address: String,
        amount: f64,
        block_index: u64,
        timestamp: f64,
    ) -> Result<Self, CryptoError> {
        let mut tx = Transaction {
            sender: COINBASE.to_string(),
            recipient: miner_address,
            amount,
            fee: 0.0,
            timestamp,
            signature: format!("coinbase_block_{block_index}"),
            public_key: String::new(),
            tx_hash: String::new(),
        };
        tx.tx_hash = tx.calculate_hash()?;
        Ok(tx)
    }

    pub fn is_coinbase(&self) -> bool {
        self.sender == COINBASE
    }

    /// Verifies the ECDSA signature over the canonical signable bytes
    /// against `sender`'s derived address. Coinbase transactions are never
    /// cryptographically verified (see `is_coinbase`).
    pub fn verify_signature(&self) -> bool {
        if self.is_coinbase() {
            return true;
        }
        if self.signature.is_empty() || self.public_key.is_empty() {
            return false;
        }
        let pubkey_bytes = match hex::decode(&self.public_key) {
            Ok(b) => b,
            Err(_) => return false,
        };
        if address::is_valid_keyed_address(&self.sender)
            && crypto::address_of(&pubkey_bytes) != self.sender
        {
            return false;
        }
        let bytes = match self.signable_bytes() {
            Ok(b) => b,
            Err(_) => return false,
        };
        crypto::verify(&self.public_key, &bytes, &self.signature)
    }

    /// Structural + cryptographic validation: positive amount (for
    /// non-coinbase), non-negative fee, and — for non-coinbase senders —
    /// a verifying signature whose public key derives `sender`.
    pub fn validate(&self) -> Result<(), StructuralError> {
        if !self.is_coinbase() && self.amount <= 0.0 {
            return Err(StructuralError::NonPositiveAmount);
        }
        if self.fee < 0.0 {
            return Err(StructuralError::NegativeFee);
        }
        if !self.is_coinbase() && !self.verify_signature() {
            return Err(StructuralError::InvalidAddress(format!(
                "signature does not verify for sender {}",
                self.sender
            )));
        }
        Ok(())
    }
}

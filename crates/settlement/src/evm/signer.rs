use crate::domain::{LedgerError, LedgerResult};
use crate::evm::abi::{format_address, parse_address};
use k256::ecdsa::SigningKey;
use rlp::RlpStream;
use sha3::{Digest, Keccak256};
use std::fmt;

/// Unsigned legacy (type 0) transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: [u8; 20],
    pub value: u128,
    pub data: Vec<u8>,
}

impl LegacyTransaction {
    fn append_unsigned_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        stream.append(&self.to.to_vec());
        stream.append(&self.value);
        stream.append(&self.data);
    }

    /// Keccak-256 of the EIP-155 signing payload
    pub fn signing_hash(&self, chain_id: u64) -> [u8; 32] {
        let mut stream = RlpStream::new_list(9);
        self.append_unsigned_fields(&mut stream);
        stream.append(&chain_id);
        stream.append(&0u8);
        stream.append(&0u8);

        keccak256(stream.as_raw())
    }
}

/// Holds the owner key and signs transactions for it
pub struct TransactionSigner {
    key: SigningKey,
    address: String,
}

impl fmt::Debug for TransactionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl TransactionSigner {
    /// Load a 32-byte hex private key, with or without `0x`
    pub fn from_hex(private_key: &str) -> LedgerResult<Self> {
        let trimmed = private_key.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(digits)
            .map_err(|_| LedgerError::InvalidCredential("private key is not hex".to_string()))?;
        if bytes.len() != 32 {
            return Err(LedgerError::InvalidCredential(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }

        let key = SigningKey::from_slice(&bytes).map_err(|_| {
            LedgerError::InvalidCredential("private key is not a valid secp256k1 scalar".to_string())
        })?;
        let address = derive_address(&key);

        Ok(Self { key, address })
    }

    /// Lowercase `0x` address controlled by this key
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn address_bytes(&self) -> LedgerResult<[u8; 20]> {
        parse_address(&self.address)
    }

    /// Sign `tx` for `chain_id` and return the raw RLP-encoded transaction
    pub fn sign_legacy(&self, tx: &LegacyTransaction, chain_id: u64) -> LedgerResult<Vec<u8>> {
        let hash = tx.signing_hash(chain_id);

        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| LedgerError::Signing(e.to_string()))?;

        let v = chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + u64::from(recovery_id.to_byte())))
            .ok_or_else(|| LedgerError::Signing(format!("chain id {} is too large", chain_id)))?;
        let signature_bytes = signature.to_bytes();
        let (r, s) = signature_bytes.split_at(32);

        let mut stream = RlpStream::new_list(9);
        tx.append_unsigned_fields(&mut stream);
        stream.append(&v);
        stream.append(&trim_leading_zeros(r).to_vec());
        stream.append(&trim_leading_zeros(s).to_vec());

        Ok(stream.out().to_vec())
    }
}

/// Signature scalars are RLP integers, so leading zero bytes are dropped
fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn derive_address(key: &SigningKey) -> String {
    let public_key = key.verifying_key().to_encoded_point(false);
    // Skip the 0x04 uncompressed marker
    let hash = keccak256(&public_key.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    format_address(&address)
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

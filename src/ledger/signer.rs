//! Transaction construction, signing and key material
//!
//! Keys are Ed25519, encoded base58. A transaction is stamped from the chain
//! head fetched just before signing:
//!
//! - `ref_block_num` = head height & 0x7ff
//! - `ref_block_prefix` = big-endian u32 of head block id bytes 8..12
//! - `expiration` = head time + 30s
//!
//! The signature and the transaction id both cover the canonical JSON of the
//! unsigned transaction.

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::rpc::ChainState;
use crate::types::{RelayError, Result};

/// Seconds a transaction stays valid after the head block it references
pub const EXPIRATION_WINDOW_SECS: u64 = 30;

const REF_BLOCK_NUM_MASK: u64 = 0x7ff;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub name: String,
    pub weight: u32,
}

/// Ledger operations the relay can emit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    AccountCreate {
        fee: u64,
        creator: String,
        new_account_name: String,
        owner: String,
    },
    Transfer {
        from: String,
        to: String,
        amount: u64,
        memo: String,
    },
    Post {
        uuid: u64,
        owner: String,
        title: String,
        content: String,
        tags: Vec<String>,
        beneficiaries: Vec<Beneficiary>,
    },
    Reply {
        uuid: u64,
        owner: String,
        content: String,
        parent_uuid: u64,
        beneficiaries: Vec<Beneficiary>,
    },
    Vote {
        voter: String,
        idx: u64,
    },
    Follow {
        account: String,
        f_account: String,
        cancel: bool,
    },
    ContractApply {
        caller: String,
        owner: String,
        amount: u64,
        gas: u64,
        contract: String,
        method: String,
        params: String,
    },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccountCreate { .. } => "account_create",
            Self::Transfer { .. } => "transfer",
            Self::Post { .. } => "post",
            Self::Reply { .. } => "reply",
            Self::Vote { .. } => "vote",
            Self::Follow { .. } => "follow",
            Self::ContractApply { .. } => "contract_apply",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub ref_block_num: u32,
    pub ref_block_prefix: u32,
    /// Unix seconds
    pub expiration: u64,
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Stamp operations against the given chain head
    pub fn stamp(state: &ChainState, operations: Vec<Operation>) -> Result<Self> {
        let block_id = hex::decode(&state.head_block_id)
            .map_err(|e| RelayError::Signing(format!("head block id is not hex: {}", e)))?;
        let prefix: [u8; 4] = block_id
            .get(8..12)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| {
                RelayError::Signing(format!(
                    "head block id too short ({} bytes)",
                    block_id.len()
                ))
            })?;

        Ok(Self {
            ref_block_num: (state.head_height & REF_BLOCK_NUM_MASK) as u32,
            ref_block_prefix: u32::from_be_bytes(prefix),
            expiration: state.head_time + EXPIRATION_WINDOW_SECS,
            operations,
        })
    }

    fn signing_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub trx: Transaction,
    /// Hex-encoded Ed25519 signature
    pub signature: String,
}

impl SignedTransaction {
    /// Hex SHA-256 of the unsigned transaction
    pub fn id(&self) -> Result<String> {
        let digest = Sha256::digest(self.trx.signing_bytes()?);
        Ok(hex::encode(digest))
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.trx.operations.iter().map(Operation::kind).collect()
    }
}

/// Turns operations into a broadcastable transaction
pub trait TransactionSigner: Send + Sync {
    /// Fails when `private_key` is malformed or the chain state cannot be used
    fn sign(
        &self,
        private_key: &str,
        state: &ChainState,
        operations: Vec<Operation>,
    ) -> Result<SignedTransaction>;
}

/// Ed25519 signer over base58 private keys
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Signer;

impl TransactionSigner for Ed25519Signer {
    fn sign(
        &self,
        private_key: &str,
        state: &ChainState,
        operations: Vec<Operation>,
    ) -> Result<SignedTransaction> {
        let key = decode_signing_key(private_key)?;
        let trx = Transaction::stamp(state, operations)?;
        let signature = key.sign(&trx.signing_bytes()?);

        Ok(SignedTransaction {
            trx,
            signature: hex::encode(signature.to_bytes()),
        })
    }
}

fn decode_signing_key(private_key: &str) -> Result<SigningKey> {
    let raw = Zeroizing::new(
        bs58::decode(private_key)
            .into_vec()
            .map_err(|e| RelayError::Signing(format!("private key is not base58: {}", e)))?,
    );
    let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
        RelayError::Signing(format!("private key must be 32 bytes, got {}", raw.len()))
    })?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Freshly generated key pair, base58 encoded
pub struct KeyPair {
    pub public_key: String,
    pub private_key: Zeroizing<String>,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Generate a new Ed25519 key pair from the OS RNG
pub fn generate_key_pair() -> KeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    let secret = Zeroizing::new(signing_key.to_bytes());
    KeyPair {
        public_key: bs58::encode(signing_key.verifying_key().as_bytes()).into_string(),
        private_key: Zeroizing::new(bs58::encode(secret.as_slice()).into_string()),
    }
}

/// Content uuid: unix seconds * 1e9 plus a 32-bit hash of the seed and a
/// random salt.
pub fn generate_content_uuid(seed: &str) -> u64 {
    let salt: u32 = rand::thread_rng().gen_range(0..100_000);
    let digest = Sha256::digest(format!("{}{}", seed, salt).as_bytes());
    let hash = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let seconds = chrono::Utc::now().timestamp().max(0) as u64;
    seconds * 1_000_000_000 + u64::from(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    fn public_key_of(private_key: &str) -> Result<String> {
        let key = decode_signing_key(private_key)?;
        Ok(bs58::encode(key.verifying_key().as_bytes()).into_string())
    }

    fn state() -> ChainState {
        ChainState {
            irreversible_height: 90,
            head_height: 0x1234,
            head_block_id: "000102030405060708090a0b0c0d0e0f".into(),
            head_time: 1_700_000_000,
        }
    }

    fn transfer() -> Operation {
        Operation::Transfer {
            from: "treasury".into(),
            to: "alice".into(),
            amount: 20,
            memo: String::new(),
        }
    }

    #[test]
    fn test_stamp_fields() {
        let trx = Transaction::stamp(&state(), vec![transfer()]).unwrap();
        assert_eq!(trx.ref_block_num, 0x234);
        assert_eq!(trx.ref_block_prefix, 0x08090a0b);
        assert_eq!(trx.expiration, 1_700_000_030);
    }

    #[test]
    fn test_stamp_rejects_short_block_id() {
        let mut s = state();
        s.head_block_id = "0001020304".into();
        assert!(matches!(
            Transaction::stamp(&s, vec![]),
            Err(RelayError::Signing(_))
        ));
    }

    #[test]
    fn test_sign_verifies_with_generated_key() {
        let pair = generate_key_pair();
        let signed = Ed25519Signer.sign(&pair.private_key, &state(), vec![transfer()]).unwrap();

        let public: [u8; 32] = bs58::decode(&pair.public_key)
            .into_vec()
            .unwrap()
            .try_into()
            .unwrap();
        let verifying = VerifyingKey::from_bytes(&public).unwrap();
        let sig_bytes: [u8; 64] = hex::decode(&signed.signature).unwrap().try_into().unwrap();
        let signature = Signature::from_bytes(&sig_bytes);
        let message = serde_json::to_vec(&signed.trx).unwrap();
        assert!(verifying.verify(&message, &signature).is_ok());

        assert_eq!(signed.id().unwrap().len(), 64);
        assert_eq!(signed.kinds(), vec!["transfer"]);
        assert_eq!(public_key_of(&pair.private_key).unwrap(), pair.public_key);
    }

    #[test]
    fn test_malformed_key_fails() {
        assert!(matches!(
            Ed25519Signer.sign("not-base58!!", &state(), vec![]),
            Err(RelayError::Signing(_))
        ));
        assert!(matches!(
            Ed25519Signer.sign("3mJr7AoUXx2Wqd", &state(), vec![]),
            Err(RelayError::Signing(_))
        ));
    }

    #[test]
    fn test_content_uuid_is_time_based() {
        let now = chrono::Utc::now().timestamp() as u64;
        let uuid = generate_content_uuid("alice");
        assert!(uuid / 1_000_000_000 >= now);
        assert!(uuid / 1_000_000_000 <= now + 5);
    }
}

//! Offchain config digest for CosmWasm OCR2 contracts.
//!
//! The digest binds a contract configuration to one chain and one contract
//! instance. Its first two bytes carry [`CONFIG_DIGEST_PREFIX`] so the
//! protocol can tell which chain family produced it.
//!
//! The hashed byte layout is specific to this crate. Digests are stable
//! across releases but do not match those of other OCR2 Cosmos relays.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::DigestError;

/// Protocol tag written over the first two bytes of every digest.
pub const CONFIG_DIGEST_PREFIX: u16 = 0x0002;

/// A 32-byte config digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConfigDigest(pub [u8; 32]);

impl ConfigDigest {
    /// Lowercase hex rendering.
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The big-endian prefix tag.
    pub fn prefix(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }
}

impl fmt::Display for ConfigDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

/// Oracle configuration as stored on the contract.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContractConfig {
    /// Number of times the config has been set.
    pub config_count: u64,
    /// Onchain signing keys, one per oracle.
    pub signers: Vec<Vec<u8>>,
    /// Transmitter accounts, one per oracle.
    pub transmitters: Vec<String>,
    /// Maximum number of faulty oracles tolerated.
    pub f: u8,
    /// Opaque onchain config blob.
    pub onchain_config: Vec<u8>,
    /// Version of the offchain config encoding.
    pub offchain_config_version: u64,
    /// Opaque offchain config blob.
    pub offchain_config: Vec<u8>,
}

/// Computes config digests for one chain and contract.
#[derive(Clone, Debug)]
pub struct ConfigDigester {
    chain_id: String,
    contract: String,
}

impl ConfigDigester {
    /// Create a digester bound to `chain_id` and the bech32 `contract` address.
    pub fn new(chain_id: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            contract: contract.into(),
        }
    }

    /// Hash `config` into a prefixed digest.
    pub fn config_digest(&self, config: &ContractConfig) -> Result<ConfigDigest, DigestError> {
        let chain_len = u8::try_from(self.chain_id.len()).map_err(|_| DigestError::ChainIdTooLong {
            len: self.chain_id.len(),
        })?;
        let (_, contract_bytes) =
            bech32::decode(&self.contract).map_err(|e| DigestError::InvalidContractAddress {
                address: self.contract.clone(),
                reason: e.to_string(),
            })?;

        let mut hasher = Sha256::new();
        hasher.update([chain_len]);
        hasher.update(self.chain_id.as_bytes());
        hasher.update(&contract_bytes);
        hasher.update(config.config_count.to_be_bytes());

        hasher.update([list_len("signers", config.signers.len())?]);
        for signer in &config.signers {
            hasher.update(signer);
        }
        hasher.update([list_len("transmitters", config.transmitters.len())?]);
        for transmitter in &config.transmitters {
            hasher.update(transmitter.as_bytes());
        }

        hasher.update([config.f]);
        hasher.update(blob_len("onchain config", config.onchain_config.len())?.to_be_bytes());
        hasher.update(&config.onchain_config);
        hasher.update(config.offchain_config_version.to_be_bytes());
        hasher.update(blob_len("offchain config", config.offchain_config.len())?.to_be_bytes());
        hasher.update(&config.offchain_config);

        let mut digest: [u8; 32] = hasher.finalize().into();
        digest[..2].copy_from_slice(&CONFIG_DIGEST_PREFIX.to_be_bytes());
        Ok(ConfigDigest(digest))
    }

    /// The chain id this digester is bound to.
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }
}

fn list_len(field: &'static str, len: usize) -> Result<u8, DigestError> {
    u8::try_from(len).map_err(|_| DigestError::TooMany { field, len })
}

fn blob_len(field: &'static str, len: usize) -> Result<u32, DigestError> {
    u32::try_from(len).map_err(|_| DigestError::BlobTooLarge { field, len })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

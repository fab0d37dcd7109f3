use std::str::FromStr;

use alloy::primitives::{Address, B256};
use alloy::signers::{local::PrivateKeySigner, SignerSync};
use anytx_types::{ChainFamily, SecretString};

use crate::{AccountError, AccountInterface};

/// A secp256k1 key held in memory for EVM chains.
#[derive(Debug, Clone)]
pub struct EvmAccount {
	signer: PrivateKeySigner,
}

impl EvmAccount {
	/// Parses a hex private key, with or without a `0x` prefix.
	pub fn from_secret(key: &SecretString) -> Result<Self, AccountError> {
		let signer = key.with_exposed(|hex_key| {
			PrivateKeySigner::from_str(hex_key.trim())
				.map_err(|e| AccountError::InvalidKey(format!("Invalid EVM private key: {}", e)))
		})?;
		Ok(Self { signer })
	}

	pub fn address_raw(&self) -> Address {
		self.signer.address()
	}

	/// The underlying alloy signer.
	pub fn signer(&self) -> &PrivateKeySigner {
		&self.signer
	}
}

impl AccountInterface for EvmAccount {
	fn family(&self) -> ChainFamily {
		ChainFamily::Evm
	}

	fn address(&self) -> String {
		self.signer.address().to_checksum(None)
	}

	fn public_key(&self) -> Vec<u8> {
		self.signer
			.credential()
			.verifying_key()
			.to_encoded_point(false)
			.as_bytes()
			.to_vec()
	}

	fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, AccountError> {
		if payload.len() != 32 {
			return Err(AccountError::SigningFailed(format!(
				"EVM signing expects a 32 byte hash, got {} bytes",
				payload.len()
			)));
		}
		let hash = B256::from_slice(payload);
		let signature = self
			.signer
			.sign_hash_sync(&hash)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(signature.as_bytes().to_vec())
	}
}

use std::fmt;

use anytx_types::{ChainFamily, SecretString};
use bech32::{Bech32, Hrp};
use bip32::{DerivationPath, Language, Mnemonic, XPrv};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{AccountError, AccountInterface, AccountOptions};

/// BIP44 path for a Cosmos SDK key.
pub fn derivation_path(coin_type: u32, account: u32, index: u32) -> String {
	format!("m/44'/{}'/{}'/0/{}", coin_type, account, index)
}

/// A secp256k1 key addressed with a bech32 prefix.
#[derive(Clone)]
pub struct TendermintAccount {
	signing_key: SigningKey,
	prefix: Hrp,
}

impl TendermintAccount {
	/// Loads either a mnemonic (anything containing whitespace) or a hex
	/// private key.
	pub fn from_secret(key: &SecretString, options: &AccountOptions) -> Result<Self, AccountError> {
		let is_mnemonic = key.with_exposed(|s| s.trim().contains(char::is_whitespace));
		if is_mnemonic {
			key.with_exposed(|phrase| {
				Self::from_mnemonic(
					phrase,
					options.coin_type,
					options.account,
					options.index,
					&options.bech32_prefix,
				)
			})
		} else {
			let bytes = key.decode_hex().map_err(AccountError::InvalidKey)?;
			Self::from_private_key(&bytes, &options.bech32_prefix)
		}
	}

	pub fn from_private_key(bytes: &[u8], prefix: &str) -> Result<Self, AccountError> {
		let signing_key = SigningKey::from_slice(bytes)
			.map_err(|e| AccountError::InvalidKey(format!("Invalid secp256k1 key: {}", e)))?;
		Ok(Self {
			signing_key,
			prefix: parse_prefix(prefix)?,
		})
	}

	pub fn from_mnemonic(
		phrase: &str,
		coin_type: u32,
		account: u32,
		index: u32,
		prefix: &str,
	) -> Result<Self, AccountError> {
		let normalized = Zeroizing::new(phrase.split_whitespace().collect::<Vec<_>>().join(" "));
		let mnemonic = Mnemonic::new(normalized.as_str(), Language::English)
			.map_err(|e| AccountError::InvalidKey(format!("Invalid mnemonic: {}", e)))?;
		let seed = mnemonic.to_seed("");

		let path: DerivationPath = derivation_path(coin_type, account, index)
			.parse()
			.map_err(|e| AccountError::Derivation(format!("Invalid derivation path: {}", e)))?;
		let xprv = XPrv::derive_from_path(seed.as_bytes(), &path)
			.map_err(|e| AccountError::Derivation(e.to_string()))?;

		Ok(Self {
			signing_key: xprv.private_key().clone(),
			prefix: parse_prefix(prefix)?,
		})
	}

	/// Compressed SEC1 public key.
	pub fn compressed_public_key(&self) -> Vec<u8> {
		self.signing_key
			.verifying_key()
			.to_encoded_point(true)
			.as_bytes()
			.to_vec()
	}

	/// Checks a 64 byte signature over `payload` against this key.
	pub fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
		Signature::from_slice(signature)
			.map(|sig| self.signing_key.verifying_key().verify(payload, &sig).is_ok())
			.unwrap_or(false)
	}
}

fn parse_prefix(prefix: &str) -> Result<Hrp, AccountError> {
	Hrp::parse(prefix)
		.map_err(|e| AccountError::InvalidKey(format!("Invalid bech32 prefix '{}': {}", prefix, e)))
}

impl fmt::Debug for TendermintAccount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TendermintAccount")
			.field("address", &self.address())
			.finish_non_exhaustive()
	}
}

impl AccountInterface for TendermintAccount {
	fn family(&self) -> ChainFamily {
		ChainFamily::Tendermint
	}

	fn address(&self) -> String {
		let sha = Sha256::digest(self.compressed_public_key());
		let hash = Ripemd160::digest(sha);
		// A parsed Hrp with 20 bytes of data is always within bech32 limits.
		bech32::encode::<Bech32>(self.prefix, &hash).unwrap_or_default()
	}

	fn public_key(&self) -> Vec<u8> {
		self.compressed_public_key()
	}

	fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, AccountError> {
		let signature: Signature = self
			.signing_key
			.try_sign(payload)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		let signature = signature.normalize_s().unwrap_or(signature);
		Ok(signature.to_bytes().to_vec())
	}
}

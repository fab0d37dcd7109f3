use std::fmt;

use anytx_types::{ChainFamily, SecretString};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{keypair_from_seed, Keypair, Signer};

use crate::{AccountError, AccountInterface};

/// An ed25519 keypair for Solana.
pub struct SolanaAccount {
	keypair: Keypair,
}

impl SolanaAccount {
	/// Accepts a base58 encoded 64 byte keypair or 32 byte seed.
	pub fn from_secret(key: &SecretString) -> Result<Self, AccountError> {
		let bytes = key.decode_bs58().map_err(AccountError::InvalidKey)?;
		let keypair = match bytes.len() {
			64 => {
				#[allow(deprecated)]
				let keypair = Keypair::from_bytes(&bytes)
					.map_err(|e| AccountError::InvalidKey(format!("Invalid Solana keypair: {}", e)))?;
				keypair
			},
			32 => keypair_from_seed(&bytes)
				.map_err(|e| AccountError::InvalidKey(format!("Invalid Solana seed: {}", e)))?,
			n => {
				return Err(AccountError::InvalidKey(format!(
					"Solana key must be 32 or 64 bytes, got {}",
					n
				)))
			},
		};
		Ok(Self { keypair })
	}

	pub fn from_keypair(keypair: Keypair) -> Self {
		Self { keypair }
	}

	pub fn pubkey(&self) -> Pubkey {
		self.keypair.pubkey()
	}

	pub fn keypair(&self) -> &Keypair {
		&self.keypair
	}
}

impl fmt::Debug for SolanaAccount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SolanaAccount")
			.field("pubkey", &self.keypair.pubkey())
			.finish_non_exhaustive()
	}
}

impl AccountInterface for SolanaAccount {
	fn family(&self) -> ChainFamily {
		ChainFamily::Solana
	}

	fn address(&self) -> String {
		self.keypair.pubkey().to_string()
	}

	fn public_key(&self) -> Vec<u8> {
		self.keypair.pubkey().to_bytes().to_vec()
	}

	fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, AccountError> {
		let signature = self
			.keypair
			.try_sign_message(payload)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(signature.as_ref().to_vec())
	}
}

/// A freshly generated keypair used for accounts created inside a single
/// transaction, such as a new stake account.
///
/// The caller receives it alongside the unsigned transaction and must pass it
/// back as a co-signer. It never touches storage.
pub struct EphemeralKey {
	keypair: Keypair,
}

impl EphemeralKey {
	pub fn generate() -> Self {
		Self {
			keypair: Keypair::new(),
		}
	}

	pub fn pubkey(&self) -> Pubkey {
		self.keypair.pubkey()
	}

	pub fn keypair(&self) -> &Keypair {
		&self.keypair
	}

	/// Base58 form accepted by [`SolanaAccount::from_secret`].
	pub fn to_secret(&self) -> SecretString {
		SecretString::new(bs58::encode(self.keypair.to_bytes()).into_string())
	}
}

impl fmt::Debug for EphemeralKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "EphemeralKey({})", self.keypair.pubkey())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use solana_sdk::signature::Signature;

	#[test]
	fn test_seed_and_keypair_forms_agree() {
		let seed = [7u8; 32];
		let from_seed =
			SolanaAccount::from_secret(&SecretString::new(bs58::encode(seed).into_string()))
				.unwrap();

		let full = bs58::encode(from_seed.keypair().to_bytes()).into_string();
		let from_full = SolanaAccount::from_secret(&SecretString::new(full)).unwrap();

		assert_eq!(from_seed.address(), from_full.address());
		assert_eq!(from_seed.public_key().len(), 32);
	}

	#[test]
	fn test_sign_verifies() {
		let account = SolanaAccount::from_keypair(Keypair::new());
		let sig = account.sign(b"message").unwrap();
		let signature = Signature::try_from(sig.as_slice()).unwrap();
		assert!(signature.verify(&account.public_key(), b"message"));
	}

	#[test]
	fn test_wrong_length_rejected() {
		let key = SecretString::new(bs58::encode([1u8; 16]).into_string());
		assert!(matches!(
			SolanaAccount::from_secret(&key),
			Err(AccountError::InvalidKey(_))
		));
	}

	#[test]
	fn test_ephemeral_round_trips_through_secret() {
		let key = EphemeralKey::generate();
		let restored = SolanaAccount::from_secret(&key.to_secret()).unwrap();
		assert_eq!(restored.pubkey(), key.pubkey());
		assert!(!format!("{:?}", key).contains(&key.to_secret().expose_secret().to_string()));
	}
}

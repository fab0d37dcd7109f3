//! Key handling for the three chain families.
//!
//! Keys are accepted per call as [`SecretString`]s and turned into an
//! [`AccountInterface`] that knows its address and how to sign a payload in
//! the family's native scheme. Nothing here stores keys beyond the lifetime
//! of the returned value.

use anytx_types::{ChainFamily, SecretString};
use thiserror::Error;

pub mod implementations {
	pub mod evm;
	pub mod solana;
	pub mod tendermint;
}

pub use implementations::evm::EvmAccount;
pub use implementations::solana::{EphemeralKey, SolanaAccount};
pub use implementations::tendermint::{derivation_path, TendermintAccount};

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Key derivation failed: {0}")]
	Derivation(String),
}

/// A loaded key able to sign for one chain family.
pub trait AccountInterface: Send + Sync {
	fn family(&self) -> ChainFamily;

	/// Address in the family's canonical text form.
	fn address(&self) -> String;

	/// Public key bytes: uncompressed secp256k1 for EVM, ed25519 for Solana,
	/// compressed secp256k1 for Tendermint.
	fn public_key(&self) -> Vec<u8>;

	/// Signs `payload` the way the family's transactions are signed.
	///
	/// EVM expects a 32 byte prehash and returns `r || s || v`. Solana signs
	/// the message bytes with ed25519. Tendermint hashes with SHA-256 and
	/// returns a low-S `r || s`.
	fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, AccountError>;
}

/// Settings that influence how a key is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountOptions {
	/// Bech32 human readable part for Tendermint addresses.
	pub bech32_prefix: String,
	/// SLIP-44 coin type used when a Tendermint key is given as a mnemonic.
	pub coin_type: u32,
	/// BIP44 account index.
	pub account: u32,
	/// BIP44 address index.
	pub index: u32,
}

impl Default for AccountOptions {
	fn default() -> Self {
		Self {
			bech32_prefix: "cosmos".to_string(),
			coin_type: 118,
			account: 0,
			index: 0,
		}
	}
}

/// Loads `key` for `family`.
///
/// EVM keys are hex. Solana keys are base58 keypairs or seeds. Tendermint
/// keys are either hex private keys or BIP39 mnemonics, the latter derived at
/// `m/44'/coin_type'/account'/0/index`.
pub fn load_account(
	family: ChainFamily,
	key: &SecretString,
	options: &AccountOptions,
) -> Result<Box<dyn AccountInterface>, AccountError> {
	Ok(match family {
		ChainFamily::Evm => Box::new(EvmAccount::from_secret(key)?),
		ChainFamily::Solana => Box::new(SolanaAccount::from_secret(key)?),
		ChainFamily::Tendermint => Box::new(TendermintAccount::from_secret(key, options)?),
	})
}

//! Key material wrapper.
//!
//! Private keys and mnemonics travel from the environment to the account
//! implementations as `SecretString`. The backing buffer is zeroed on drop
//! and the value never shows up in `Debug` output.

use std::fmt;
use zeroize::Zeroizing;

/// A string whose contents are wiped from memory when dropped.
#[derive(Clone)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
	pub fn new(s: String) -> Self {
		Self(Zeroizing::new(s))
	}

	/// Reads the secret from an environment variable.
	pub fn from_env(var: &str) -> Result<Self, String> {
		std::env::var(var)
			.map(Self::new)
			.map_err(|_| format!("Environment variable '{}' is not set", var))
	}

	/// Exposes the secret. Do not log the returned value.
	pub fn expose_secret(&self) -> &str {
		&self.0
	}

	/// Runs `f` with the secret in scope.
	pub fn with_exposed<F, R>(&self, f: F) -> R
	where
		F: FnOnce(&str) -> R,
	{
		f(&self.0)
	}

	/// Decodes a hex secret, with or without a `0x` prefix.
	pub fn decode_hex(&self) -> Result<Zeroizing<Vec<u8>>, String> {
		let trimmed = crate::without_0x_prefix(self.0.trim());
		hex::decode(trimmed)
			.map(Zeroizing::new)
			.map_err(|e| format!("Secret is not valid hex: {}", e))
	}

	/// Decodes a base58 secret, as used for Solana keypairs.
	pub fn decode_bs58(&self) -> Result<Zeroizing<Vec<u8>>, String> {
		bs58::decode(self.0.trim())
			.into_vec()
			.map(Zeroizing::new)
			.map_err(|e| format!("Secret is not valid base58: {}", e))
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretString(***REDACTED***)")
	}
}

impl From<String> for SecretString {
	fn from(s: String) -> Self {
		Self::new(s)
	}
}

impl From<&str> for SecretString {
	fn from(s: &str) -> Self {
		Self::new(s.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_secret_is_redacted() {
		let secret = SecretString::from("0xdeadbeef");
		assert_eq!(format!("{:?}", secret), "SecretString(***REDACTED***)");
		assert!(!format!("{:?}", vec![secret]).contains("deadbeef"));
	}

	#[test]
	fn test_decode_hex_with_and_without_prefix() {
		let with_prefix = SecretString::from("0xdeadbeef");
		let without_prefix = SecretString::from("DEADBEEF");
		assert_eq!(*with_prefix.decode_hex().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
		assert_eq!(*without_prefix.decode_hex().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
		assert!(SecretString::from("0xzz").decode_hex().is_err());
	}

	#[test]
	fn test_decode_bs58() {
		let secret = SecretString::from("2g");
		assert_eq!(*secret.decode_bs58().unwrap(), vec![0x61]);
		assert!(SecretString::from("0OIl").decode_bs58().is_err());
	}

	#[test]
	fn test_from_env() {
		std::env::set_var("ANYTX_TEST_SECRET_STRING", "mnemonic words");
		let secret = SecretString::from_env("ANYTX_TEST_SECRET_STRING").unwrap();
		assert_eq!(secret.expose_secret(), "mnemonic words");

		assert_eq!(
			SecretString::from_env("ANYTX_TEST_SECRET_STRING_UNSET").unwrap_err(),
			"Environment variable 'ANYTX_TEST_SECRET_STRING_UNSET' is not set"
		);
	}
}

//! Chain family identifiers.
//!
//! A builder is always selected through an explicit family taken from
//! configuration. Address formats are never inspected to guess the family.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The transaction model a chain follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
	/// Account based chains with nonces, gas and ABI encoded calls.
	Evm,
	/// Instruction list transactions signed by one or more ed25519 keys.
	Solana,
	/// Cosmos SDK chains using protobuf messages and SIGN_MODE_DIRECT.
	Tendermint,
}

impl ChainFamily {
	/// Every supported family, in configuration order.
	pub const ALL: [ChainFamily; 3] = [ChainFamily::Evm, ChainFamily::Solana, ChainFamily::Tendermint];

	/// Name used in configuration files.
	pub fn as_str(&self) -> &'static str {
		match self {
			ChainFamily::Evm => "evm",
			ChainFamily::Solana => "solana",
			ChainFamily::Tendermint => "tendermint",
		}
	}
}

impl fmt::Display for ChainFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ChainFamily {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"evm" => Ok(ChainFamily::Evm),
			"solana" => Ok(ChainFamily::Solana),
			"tendermint" | "cosmos" => Ok(ChainFamily::Tendermint),
			other => Err(format!(
				"Unknown chain family '{}', expected one of evm, solana, tendermint",
				other
			)),
		}
	}
}

//! Logical transaction requests and the chain-neutral results builders report.

use crate::coin::Coin;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Gas limit requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GasLimit {
	/// Let the builder simulate and pick the limit.
	#[default]
	Auto,
	/// Use this limit as is and skip simulation.
	Fixed(u64),
}

impl GasLimit {
	/// Returns the fixed limit, if one was given.
	pub fn fixed(&self) -> Option<u64> {
		match self {
			GasLimit::Auto => None,
			GasLimit::Fixed(limit) => Some(*limit),
		}
	}
}

impl From<Option<u64>> for GasLimit {
	fn from(value: Option<u64>) -> Self {
		match value {
			None | Some(0) => GasLimit::Auto,
			Some(limit) => GasLimit::Fixed(limit),
		}
	}
}

impl FromStr for GasLimit {
	type Err = String;

	/// Accepts `"auto"`, an empty string or a decimal limit. `"0"` means auto.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
			return Ok(GasLimit::Auto);
		}
		trimmed
			.parse::<u64>()
			.map(|limit| GasLimit::from(Some(limit)))
			.map_err(|e| format!("Invalid gas limit '{}': {}", s, e))
	}
}

/// A request to invoke a function on a contract, program or message router.
///
/// The meaning of `contract` and `function` depends on the chain family:
/// an EVM contract address and ABI function name, a Solana program id and
/// instruction name, or a Cosmos message kind such as `delegate`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractCall {
	/// Sender address, which also pays fees.
	pub from: String,
	/// Target contract, program or module.
	pub contract: String,
	/// Function, instruction or message name.
	pub function: String,
	/// Positional arguments in their textual form.
	#[serde(default)]
	pub args: Vec<String>,
	/// Native value attached to the call, in the chain's smallest unit.
	#[serde(default)]
	pub value: u128,
	/// Gas limit policy.
	#[serde(default)]
	pub gas: GasLimit,
	/// Optional memo, used by chains that support one.
	#[serde(default)]
	pub memo: Option<String>,
}

impl ContractCall {
	pub fn new(
		from: impl Into<String>,
		contract: impl Into<String>,
		function: impl Into<String>,
	) -> Self {
		Self {
			from: from.into(),
			contract: contract.into(),
			function: function.into(),
			..Default::default()
		}
	}

	pub fn with_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args = args.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_value(mut self, value: u128) -> Self {
		self.value = value;
		self
	}

	pub fn with_gas(mut self, gas: GasLimit) -> Self {
		self.gas = gas;
		self
	}

	pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
		self.memo = Some(memo.into());
		self
	}
}

/// Transaction identifier as raw bytes.
///
/// EVM and Tendermint hashes are 32 bytes, Solana signatures 64 bytes. The
/// textual form is chosen by the builder that produced the hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub Vec<u8>);

impl TransactionHash {
	/// Lowercase hex without prefix.
	pub fn to_hex(&self) -> String {
		hex::encode(&self.0)
	}
}

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", self.to_hex())
	}
}

/// Fee parameters computed at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum FeeEstimate {
	/// EIP-1559 pricing, both values in wei.
	Evm {
		max_fee_per_gas: u128,
		max_priority_fee_per_gas: u128,
	},
	/// Solana charges a fixed per-signature fee chosen by the network.
	Solana,
	/// Simulated gas limit and the fee paid for it.
	Tendermint { gas_limit: u64, amount: Vec<Coin> },
}

/// Outcome of looking a transaction up after broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastStatus {
	/// The node knows the transaction and reports no execution failure.
	Accepted,
	/// The transaction was included but execution failed.
	Failed(String),
	/// The node does not know the transaction (yet).
	NotFound,
	/// The lookup itself failed, so nothing is known.
	Unknown(String),
}

impl BroadcastStatus {
	pub fn is_accepted(&self) -> bool {
		matches!(self, BroadcastStatus::Accepted)
	}
}

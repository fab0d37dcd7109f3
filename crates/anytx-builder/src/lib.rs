//! Transaction builders for the anytx system.
//!
//! A builder turns a logical request ("call this function", "stake this
//! amount") into a chain-correct unsigned transaction, signs it with key
//! material handed in per call, submits it and reports on it afterwards.
//! Each chain family gets one implementation of [`BuilderInterface`]; the
//! family is always chosen from configuration, never guessed from an address.

use anytx_storage::StorageService;
use anytx_types::{
	BroadcastStatus, ChainFamily, ConfigSchema, ContractCall, FeeEstimate, ImplementationRegistry,
	SecretString, TransactionHash,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod transaction;

pub use transaction::{BuiltTransaction, SignedTransaction, UnsignedTransaction};

pub mod implementations {
	pub mod evm;
	pub mod solana;
	pub mod tendermint;
}

/// Errors that can occur while building, signing or submitting transactions.
#[derive(Debug, Error)]
pub enum BuilderError {
	/// RPC or HTTP failure, or a response that could not be understood.
	#[error("Transport error: {0}")]
	Transport(String),
	/// The node simulated the call and the contract reverted.
	#[error("Contract execution reverted: {0}")]
	ContractExecution(String),
	/// A contract ABI, function or named builder could not be found.
	#[error("Resolution error: {0}")]
	Resolution(String),
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	#[error("Signing error: {0}")]
	Signing(String),
	/// A transaction was handed to a builder of another chain family.
	#[error("Transaction for {actual} given to {expected} builder")]
	ChainMismatch {
		expected: ChainFamily,
		actual: ChainFamily,
	},
	/// The node refused a submitted transaction.
	#[error("Transaction rejected: {0}")]
	Rejected(String),
	#[error("{operation} is not supported for {family}")]
	Unsupported {
		operation: &'static str,
		family: ChainFamily,
	},
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<anytx_account::AccountError> for BuilderError {
	fn from(err: anytx_account::AccountError) -> Self {
		BuilderError::Signing(err.to_string())
	}
}

/// Key material for a single signing call.
///
/// `primary` is the fee payer and sender. `co_signers` are additional
/// signatures some transactions need, such as the freshly generated stake
/// account of a Solana delegation.
#[derive(Debug, Clone)]
pub struct SigningKeys {
	pub primary: SecretString,
	pub co_signers: Vec<SecretString>,
}

impl SigningKeys {
	pub fn new(primary: impl Into<SecretString>) -> Self {
		Self {
			primary: primary.into(),
			co_signers: Vec::new(),
		}
	}

	pub fn with_co_signer(mut self, key: impl Into<SecretString>) -> Self {
		self.co_signers.push(key.into());
		self
	}
}

/// The contract every chain adapter implements.
///
/// Build, sign, broadcast and status are separate calls and no state is kept
/// between them; every build reads nonce, sequence, fees and block hashes
/// fresh from the node. Nothing retries internally.
#[async_trait]
pub trait BuilderInterface: Send + Sync {
	fn family(&self) -> ChainFamily;

	/// Returns the configuration schema for this builder.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Builds an unsigned transaction invoking `call.function` on
	/// `call.contract`.
	async fn build_contract_transaction(
		&self,
		call: &ContractCall,
	) -> Result<UnsignedTransaction, BuilderError>;

	/// Sends `amount` of the native asset from `from` to `to`.
	///
	/// Amounts are decimals in the unit the chain is configured with: ETH or
	/// POL for EVM chains, SOL for Solana and the fee denomination (for
	/// example `uatom`) for Tendermint chains.
	async fn build_transfer_transaction(
		&self,
		from: &str,
		to: &str,
		amount: &str,
	) -> Result<UnsignedTransaction, BuilderError>;

	/// Stakes `amount` with `validator`.
	///
	/// The result carries any key that was generated for the transaction and
	/// must co-sign it.
	async fn build_stake_transaction(
		&self,
		_from: &str,
		_validator: &str,
		_amount: &str,
	) -> Result<BuiltTransaction, BuilderError> {
		Err(BuilderError::Unsupported {
			operation: "staking",
			family: self.family(),
		})
	}

	/// Starts withdrawing `amount` staked with `validator`.
	async fn build_unstake_transaction(
		&self,
		_from: &str,
		_validator: &str,
		_amount: &str,
	) -> Result<UnsignedTransaction, BuilderError> {
		Err(BuilderError::Unsupported {
			operation: "unstaking",
			family: self.family(),
		})
	}

	/// Stakes the rewards accrued with `validator`.
	async fn build_restake_transaction(
		&self,
		_from: &str,
		_validator: &str,
	) -> Result<UnsignedTransaction, BuilderError> {
		Err(BuilderError::Unsupported {
			operation: "restaking",
			family: self.family(),
		})
	}

	/// Claims the rewards accrued with `validator`.
	async fn build_withdraw_rewards_transaction(
		&self,
		_from: &str,
		_validator: &str,
	) -> Result<UnsignedTransaction, BuilderError> {
		Err(BuilderError::Unsupported {
			operation: "withdrawing rewards",
			family: self.family(),
		})
	}

	/// Unclaimed rewards of `delegator` with `validator`, in the same unit
	/// as transfer amounts.
	async fn staking_rewards(
		&self,
		_validator: &str,
		_delegator: &str,
	) -> Result<String, BuilderError> {
		Err(BuilderError::Unsupported {
			operation: "reading staking rewards",
			family: self.family(),
		})
	}

	async fn sign_transaction(
		&self,
		tx: UnsignedTransaction,
		keys: &SigningKeys,
	) -> Result<SignedTransaction, BuilderError>;

	/// Submits signed bytes and returns the transaction hash.
	async fn broadcast_transaction(
		&self,
		tx: &SignedTransaction,
	) -> Result<TransactionHash, BuilderError>;

	/// Looks the transaction up. Lookup failures are reported as
	/// [`BroadcastStatus::Unknown`], never as errors.
	async fn transaction_status(&self, hash: &TransactionHash) -> BroadcastStatus;

	/// True iff the node reports the transaction as accepted.
	///
	/// This never fails: a failed lookup is logged and reported as `false`,
	/// which cannot be told apart from "not yet included". Use
	/// [`BuilderInterface::transaction_status`] when the difference matters.
	async fn is_transaction_broadcasted(&self, hash: &TransactionHash) -> bool {
		match self.transaction_status(hash).await {
			BroadcastStatus::Accepted => true,
			BroadcastStatus::Unknown(reason) => {
				tracing::warn!(
					chain = %self.family(),
					tx_hash = %self.format_hash(hash),
					error = %reason,
					"Status lookup failed, reporting transaction as not broadcasted"
				);
				false
			},
			_ => false,
		}
	}

	async fn estimate_fee(&self, _call: &ContractCall) -> Result<FeeEstimate, BuilderError> {
		Err(BuilderError::Unsupported {
			operation: "fee estimation",
			family: self.family(),
		})
	}

	async fn list_contract_functions(&self, _contract: &str) -> Result<Vec<String>, BuilderError> {
		Err(BuilderError::Unsupported {
			operation: "listing contract functions",
			family: self.family(),
		})
	}

	async fn get_contract_abi(&self, _contract: &str) -> Result<serde_json::Value, BuilderError> {
		Err(BuilderError::Unsupported {
			operation: "contract ABI lookup",
			family: self.family(),
		})
	}

	/// Read-only call, decoded with the contract ABI.
	async fn call_contract_abi(
		&self,
		_contract: &str,
		_function: &str,
		_args: &[String],
	) -> Result<serde_json::Value, BuilderError> {
		Err(BuilderError::Unsupported {
			operation: "read-only contract calls",
			family: self.family(),
		})
	}

	/// Textual form of a hash as the chain's explorers show it.
	fn format_hash(&self, hash: &TransactionHash) -> String {
		hash.to_string()
	}

	fn parse_hash(&self, hash: &str) -> Result<TransactionHash, BuilderError> {
		hex::decode(anytx_types::without_0x_prefix(hash.trim()))
			.map(TransactionHash)
			.map_err(|e| BuilderError::InvalidInput(format!("Invalid transaction hash: {}", e)))
	}
}

/// Type alias for builder factory functions.
pub type BuilderFactory =
	fn(&toml::Value, Arc<StorageService>) -> Result<Box<dyn BuilderInterface>, BuilderError>;

/// Registry trait for builder implementations.
pub trait BuilderRegistry: ImplementationRegistry<Factory = BuilderFactory> {}

/// Get all registered builder implementations, keyed by chain family name.
pub fn get_all_implementations() -> Vec<(&'static str, BuilderFactory)> {
	use implementations::{evm, solana, tendermint};

	vec![
		(evm::Registry::NAME, evm::Registry::factory()),
		(solana::Registry::NAME, solana::Registry::factory()),
		(tendermint::Registry::NAME, tendermint::Registry::factory()),
	]
}

/// Routes requests to the builder configured for a named chain.
pub struct BuilderService {
	builders: HashMap<String, Box<dyn BuilderInterface>>,
}

impl BuilderService {
	pub fn new(builders: HashMap<String, Box<dyn BuilderInterface>>) -> Self {
		Self { builders }
	}

	/// Returns the builder for `chain`.
	pub fn builder(&self, chain: &str) -> Result<&dyn BuilderInterface, BuilderError> {
		self.builders
			.get(chain)
			.map(|b| b.as_ref())
			.ok_or_else(|| BuilderError::Resolution(format!("No builder for chain '{}'", chain)))
	}

	/// Names of all configured chains, sorted.
	pub fn chains(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
		names.sort_unstable();
		names
	}

	pub async fn build_contract_transaction(
		&self,
		chain: &str,
		call: &ContractCall,
	) -> Result<UnsignedTransaction, BuilderError> {
		let builder = self.builder(chain)?;
		let tx = builder.build_contract_transaction(call).await?;
		tracing::debug!(
			chain = %chain,
			contract = %call.contract,
			function = %call.function,
			"Built transaction"
		);
		Ok(tx)
	}

	pub async fn sign_transaction(
		&self,
		chain: &str,
		tx: UnsignedTransaction,
		keys: &SigningKeys,
	) -> Result<SignedTransaction, BuilderError> {
		self.builder(chain)?.sign_transaction(tx, keys).await
	}

	pub async fn broadcast_transaction(
		&self,
		chain: &str,
		tx: &SignedTransaction,
	) -> Result<TransactionHash, BuilderError> {
		let builder = self.builder(chain)?;
		let hash = builder.broadcast_transaction(tx).await?;
		tracing::info!(
			chain = %chain,
			tx_hash = %builder.format_hash(&hash),
			"Submitted transaction"
		);
		Ok(hash)
	}

	pub async fn transaction_status(
		&self,
		chain: &str,
		hash: &TransactionHash,
	) -> Result<BroadcastStatus, BuilderError> {
		Ok(self.builder(chain)?.transaction_status(hash).await)
	}

	pub async fn is_transaction_broadcasted(
		&self,
		chain: &str,
		hash: &TransactionHash,
	) -> Result<bool, BuilderError> {
		Ok(self.builder(chain)?.is_transaction_broadcasted(hash).await)
	}
}

//! EVM builder.
//!
//! Builds EIP-1559 transactions. The nonce is the sender's transaction count
//! at build time, `maxFeePerGas` is the latest base fee plus the node's
//! priority fee suggestion, and the gas limit is the simulated gas plus ten
//! percent, rounded up. Contract calls are encoded from the contract ABI,
//! which comes from storage or a block explorer.

use crate::{BuilderError, BuilderInterface, SigningKeys};
use crate::{BuiltTransaction, SignedTransaction, UnsignedTransaction};
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, Signature, TxKind, B256, U256};
use alloy::rpc::types::TransactionRequest;
use anytx_account::{AccountInterface, EvmAccount};
use anytx_storage::StorageService;
use anytx_types::{
	format_token_amount, parse_token_amount, BroadcastStatus, ChainFamily, ConfigSchema,
	ContractCall, FeeEstimate, Field, FieldType, GasLimit, Schema, TransactionHash,
	ValidationError,
};
use async_trait::async_trait;
use std::sync::Arc;

pub mod abi;
pub mod node;
pub mod polygon;

use abi::{coerce_args, select_function, value_to_json, AbiResolver, AbiSource, ExplorerClient};
use node::{AlloyNode, EvmNode};

const NATIVE_DECIMALS: u8 = 18;

/// An unsigned EIP-1559 transaction and its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct EvmTransaction {
	pub from: Address,
	pub tx: TxEip1559,
}

impl EvmTransaction {
	pub fn describe(&self) -> serde_json::Value {
		let to = match self.tx.to {
			TxKind::Call(to) => serde_json::Value::String(to.to_checksum(None)),
			TxKind::Create => serde_json::Value::Null,
		};
		serde_json::json!({
			"from": self.from.to_checksum(None),
			"to": to,
			"value": self.tx.value.to_string(),
			"value_native": format_token_amount(&self.tx.value.to_string(), NATIVE_DECIMALS),
			"chain_id": self.tx.chain_id,
			"nonce": self.tx.nonce,
			"gas_limit": self.tx.gas_limit,
			"max_fee_per_gas": self.tx.max_fee_per_gas.to_string(),
			"max_priority_fee_per_gas": self.tx.max_priority_fee_per_gas.to_string(),
			"data": format!("0x{}", hex::encode(&self.tx.input)),
		})
	}
}

/// Gas limit with a ten percent margin, rounded up.
pub fn gas_with_margin(simulated: u64) -> u64 {
	let padded = (u128::from(simulated) * 11).div_ceil(10);
	u64::try_from(padded).unwrap_or(u64::MAX)
}

/// EIP-1559 fee parameters for the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eip1559Fees {
	pub max_fee_per_gas: u128,
	pub max_priority_fee_per_gas: u128,
}

pub(crate) fn parse_address(value: &str, what: &str) -> Result<Address, BuilderError> {
	value
		.trim()
		.parse()
		.map_err(|e| BuilderError::InvalidInput(format!("Invalid {} address '{}': {}", what, value, e)))
}

/// Builder for EVM-compatible chains.
pub struct EvmBuilder {
	node: Arc<dyn EvmNode>,
	abi: AbiResolver,
	chain_id: u64,
}

impl EvmBuilder {
	pub fn new(node: Arc<dyn EvmNode>, abi: AbiResolver, chain_id: u64) -> Self {
		Self {
			node,
			abi,
			chain_id,
		}
	}

	pub fn chain_id(&self) -> u64 {
		self.chain_id
	}

	/// Current fee parameters. Never cached.
	pub async fn estimate_fees(&self) -> Result<Eip1559Fees, BuilderError> {
		let base_fee = self.node.base_fee_per_gas().await?;
		let priority = self.node.max_priority_fee_per_gas().await?;
		let max_fee = base_fee
			.checked_add(priority)
			.ok_or_else(|| BuilderError::Transport("Fee overflow".to_string()))?;

		tracing::debug!(
			chain_id = self.chain_id,
			base_fee,
			max_priority_fee_per_gas = priority,
			max_fee_per_gas = max_fee,
			"Estimated fees"
		);

		Ok(Eip1559Fees {
			max_fee_per_gas: max_fee,
			max_priority_fee_per_gas: priority,
		})
	}

	/// Simulates `request` and pads the result.
	pub async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, BuilderError> {
		let simulated = self.node.estimate_gas(request).await?;
		let limit = gas_with_margin(simulated);
		tracing::debug!(chain_id = self.chain_id, simulated, gas_limit = limit, "Estimated gas");
		Ok(limit)
	}

	/// Assembles a transaction from already encoded calldata.
	pub async fn build_transaction(
		&self,
		from: Address,
		to: Address,
		value: U256,
		input: Bytes,
		gas: GasLimit,
	) -> Result<EvmTransaction, BuilderError> {
		let nonce = self.node.transaction_count(from).await?;
		let fees = self.estimate_fees().await?;

		let gas_limit = match gas {
			GasLimit::Fixed(limit) => limit,
			GasLimit::Auto => {
				let request = TransactionRequest::default()
					.from(from)
					.to(to)
					.value(value)
					.input(input.clone().into())
					.nonce(nonce)
					.max_fee_per_gas(fees.max_fee_per_gas)
					.max_priority_fee_per_gas(fees.max_priority_fee_per_gas);
				self.estimate_gas(request).await?
			},
		};

		Ok(EvmTransaction {
			from,
			tx: TxEip1559 {
				chain_id: self.chain_id,
				nonce,
				gas_limit,
				max_fee_per_gas: fees.max_fee_per_gas,
				max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
				to: TxKind::Call(to),
				value,
				input,
				..Default::default()
			},
		})
	}

	/// Calls `function` with already typed arguments.
	pub async fn build_call_with_values(
		&self,
		from: Address,
		contract: Address,
		function: &str,
		args: Vec<DynSolValue>,
		value: U256,
		gas: GasLimit,
	) -> Result<EvmTransaction, BuilderError> {
		let abi = self.abi.resolve(&contract).await?;
		let func = select_function(&abi, function, args.len())?;
		let input = func
			.abi_encode_input(&args)
			.map_err(|e| BuilderError::InvalidInput(format!("Cannot encode {}: {}", function, e)))?;

		self.build_transaction(from, contract, value, input.into(), gas).await
	}

	/// ERC-20 `approve(spender, amount)` on `token`.
	pub async fn build_allowance_transaction(
		&self,
		from: Address,
		token: Address,
		spender: Address,
		amount: U256,
	) -> Result<EvmTransaction, BuilderError> {
		self.build_call_with_values(
			from,
			token,
			"approve",
			vec![DynSolValue::Address(spender), DynSolValue::Uint(amount, 256)],
			U256::ZERO,
			GasLimit::Auto,
		)
		.await
	}

	/// Read-only call with typed arguments.
	pub async fn call_with_values(
		&self,
		contract: Address,
		function: &str,
		args: Vec<DynSolValue>,
	) -> Result<Vec<DynSolValue>, BuilderError> {
		let abi = self.abi.resolve(&contract).await?;
		let func = select_function(&abi, function, args.len())?;
		let input = func
			.abi_encode_input(&args)
			.map_err(|e| BuilderError::InvalidInput(format!("Cannot encode {}: {}", function, e)))?;

		let request = TransactionRequest::default()
			.to(contract)
			.input(Bytes::from(input).into());
		let output = self.node.call(request).await?;

		func.abi_decode_output(&output)
			.map_err(|e| BuilderError::Transport(format!("Cannot decode {} output: {}", function, e)))
	}

	fn unsigned(tx: UnsignedTransaction) -> Result<EvmTransaction, BuilderError> {
		match tx {
			UnsignedTransaction::Evm(tx) => Ok(tx),
			other => Err(BuilderError::ChainMismatch {
				expected: ChainFamily::Evm,
				actual: other.family(),
			}),
		}
	}
}

#[async_trait]
impl BuilderInterface for EvmBuilder {
	fn family(&self) -> ChainFamily {
		ChainFamily::Evm
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EvmBuilderSchema)
	}

	async fn build_contract_transaction(
		&self,
		call: &ContractCall,
	) -> Result<UnsignedTransaction, BuilderError> {
		let from = parse_address(&call.from, "sender")?;
		let contract = parse_address(&call.contract, "contract")?;

		let abi = self.abi.resolve(&contract).await?;
		let func = select_function(&abi, &call.function, call.args.len())?;
		let args = coerce_args(func, &call.args)?;
		let input = func
			.abi_encode_input(&args)
			.map_err(|e| BuilderError::InvalidInput(format!("Cannot encode {}: {}", call.function, e)))?;

		let tx = self
			.build_transaction(from, contract, U256::from(call.value), input.into(), call.gas)
			.await?;
		Ok(UnsignedTransaction::Evm(tx))
	}

	async fn build_transfer_transaction(
		&self,
		from: &str,
		to: &str,
		amount: &str,
	) -> Result<UnsignedTransaction, BuilderError> {
		let from = parse_address(from, "sender")?;
		let to = parse_address(to, "recipient")?;
		let value =
			parse_token_amount(amount, NATIVE_DECIMALS).map_err(BuilderError::InvalidInput)?;

		let tx = self
			.build_transaction(from, to, U256::from(value), Bytes::new(), GasLimit::Auto)
			.await?;
		Ok(UnsignedTransaction::Evm(tx))
	}

	/// Delegates to a Polygon validator share contract with `buyVoucherPOL`.
	async fn build_stake_transaction(
		&self,
		from: &str,
		validator: &str,
		amount: &str,
	) -> Result<BuiltTransaction, BuilderError> {
		let from = parse_address(from, "sender")?;
		let validator = parse_address(validator, "validator share")?;
		let amount =
			parse_token_amount(amount, NATIVE_DECIMALS).map_err(BuilderError::InvalidInput)?;

		let tx = self
			.build_polygon_stake_transaction(from, validator, U256::from(amount))
			.await?;
		Ok(BuiltTransaction::new(UnsignedTransaction::Evm(tx)))
	}

	async fn build_unstake_transaction(
		&self,
		from: &str,
		validator: &str,
		amount: &str,
	) -> Result<UnsignedTransaction, BuilderError> {
		let from = parse_address(from, "sender")?;
		let validator = parse_address(validator, "validator share")?;
		let amount =
			parse_token_amount(amount, NATIVE_DECIMALS).map_err(BuilderError::InvalidInput)?;

		let tx = self
			.build_polygon_unstake_transaction(from, validator, U256::from(amount))
			.await?;
		Ok(UnsignedTransaction::Evm(tx))
	}

	async fn build_restake_transaction(
		&self,
		from: &str,
		validator: &str,
	) -> Result<UnsignedTransaction, BuilderError> {
		let tx = self
			.build_polygon_restake_transaction(
				parse_address(from, "sender")?,
				parse_address(validator, "validator share")?,
			)
			.await?;
		Ok(UnsignedTransaction::Evm(tx))
	}

	async fn build_withdraw_rewards_transaction(
		&self,
		from: &str,
		validator: &str,
	) -> Result<UnsignedTransaction, BuilderError> {
		let tx = self
			.build_polygon_withdraw_rewards_transaction(
				parse_address(from, "sender")?,
				parse_address(validator, "validator share")?,
			)
			.await?;
		Ok(UnsignedTransaction::Evm(tx))
	}

	/// Liquid POL rewards, formatted with 18 decimals.
	async fn staking_rewards(&self, validator: &str, delegator: &str) -> Result<String, BuilderError> {
		let rewards = self
			.polygon_liquid_rewards(
				parse_address(validator, "validator share")?,
				parse_address(delegator, "delegator")?,
			)
			.await?;
		Ok(format_token_amount(&rewards.to_string(), NATIVE_DECIMALS))
	}

	async fn sign_transaction(
		&self,
		tx: UnsignedTransaction,
		keys: &SigningKeys,
	) -> Result<SignedTransaction, BuilderError> {
		let EvmTransaction { from, tx } = Self::unsigned(tx)?;

		let account = EvmAccount::from_secret(&keys.primary)?;
		if account.address_raw() != from {
			return Err(BuilderError::Signing(format!(
				"Key for {} cannot sign for sender {}",
				account.address(),
				from
			)));
		}

		let hash = tx.signature_hash();
		let raw = account.sign(hash.as_slice())?;
		let signature = Signature::from_raw(&raw)
			.map_err(|e| BuilderError::Signing(format!("Malformed signature: {}", e)))?;

		Ok(SignedTransaction::Evm(TxEnvelope::Eip1559(tx.into_signed(signature))))
	}

	async fn broadcast_transaction(
		&self,
		tx: &SignedTransaction,
	) -> Result<TransactionHash, BuilderError> {
		let SignedTransaction::Evm(envelope) = tx else {
			return Err(BuilderError::ChainMismatch {
				expected: ChainFamily::Evm,
				actual: tx.family(),
			});
		};

		let hash = self
			.node
			.send_raw_transaction(envelope.encoded_2718().into())
			.await?;
		tracing::info!(tx_hash = %hash, chain_id = self.chain_id, "Submitted transaction");
		Ok(TransactionHash(hash.to_vec()))
	}

	async fn transaction_status(&self, hash: &TransactionHash) -> BroadcastStatus {
		if hash.0.len() != 32 {
			return BroadcastStatus::Unknown(format!(
				"EVM transaction hashes are 32 bytes, got {}",
				hash.0.len()
			));
		}

		match self.node.receipt_status(B256::from_slice(&hash.0)).await {
			Ok(Some(true)) => BroadcastStatus::Accepted,
			Ok(Some(false)) => BroadcastStatus::Failed("Execution reverted".to_string()),
			Ok(None) => BroadcastStatus::NotFound,
			Err(e) => BroadcastStatus::Unknown(e.to_string()),
		}
	}

	async fn estimate_fee(&self, _call: &ContractCall) -> Result<FeeEstimate, BuilderError> {
		let fees = self.estimate_fees().await?;
		Ok(FeeEstimate::Evm {
			max_fee_per_gas: fees.max_fee_per_gas,
			max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
		})
	}

	async fn list_contract_functions(&self, contract: &str) -> Result<Vec<String>, BuilderError> {
		let contract = parse_address(contract, "contract")?;
		let abi = self.abi.resolve(&contract).await?;
		Ok(abi.functions().map(|f| f.signature()).collect())
	}

	async fn get_contract_abi(&self, contract: &str) -> Result<serde_json::Value, BuilderError> {
		let contract = parse_address(contract, "contract")?;
		self.abi.resolve_json(&contract).await
	}

	async fn call_contract_abi(
		&self,
		contract: &str,
		function: &str,
		args: &[String],
	) -> Result<serde_json::Value, BuilderError> {
		let contract = parse_address(contract, "contract")?;
		let abi = self.abi.resolve(&contract).await?;
		let func = select_function(&abi, function, args.len())?;
		let values = coerce_args(func, args)?;

		let outputs = self.call_with_values(contract, function, values).await?;
		Ok(serde_json::Value::Array(outputs.iter().map(value_to_json).collect()))
	}
}

/// Configuration schema for EVM chains.
pub struct EvmBuilderSchema;

impl EvmBuilderSchema {
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		Self.validate(config)
	}
}

impl ConfigSchema for EvmBuilderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("rpc_url must be an http(s) URL".to_string()),
					}
				}),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![
				Field::new("environment", FieldType::OneOf(&["dev", "prod"])),
				Field::new("explorer_api_key", FieldType::String),
				Field::new("explorer_url", FieldType::String),
			],
		);

		schema.validate(config)
	}
}

/// Factory function to create an EVM builder from a chain table.
///
/// Configuration parameters:
/// - `rpc_url`: node endpoint
/// - `chain_id`: EIP-155 chain id
/// - `environment` (optional): `dev` or `prod`, selects the explorer
/// - `explorer_api_key` (optional): needed only for ABIs not yet cached
/// - `explorer_url` (optional): overrides the explorer endpoint
pub fn create_builder(
	config: &toml::Value,
	storage: Arc<StorageService>,
) -> Result<Box<dyn BuilderInterface>, BuilderError> {
	EvmBuilderSchema::validate_config(config)
		.map_err(|e| BuilderError::Configuration(format!("Invalid EVM configuration: {}", e)))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| BuilderError::Configuration("rpc_url is required".to_string()))?;
	let chain_id = parse_chain_id(config)?;
	let environment = config
		.get("environment")
		.and_then(|v| v.as_str())
		.unwrap_or("prod");
	let api_key = config
		.get("explorer_api_key")
		.and_then(|v| v.as_str())
		.filter(|key| !key.is_empty())
		.map(str::to_string);

	let explorer: Box<dyn AbiSource> = match config.get("explorer_url").and_then(|v| v.as_str()) {
		Some(url) => Box::new(ExplorerClient::new(url, api_key)),
		None => Box::new(ExplorerClient::for_environment(environment, api_key)),
	};

	let node = AlloyNode::new(rpc_url)?;
	Ok(Box::new(EvmBuilder::new(
		Arc::new(node),
		AbiResolver::new(storage, explorer),
		chain_id,
	)))
}

fn parse_chain_id(config: &toml::Value) -> Result<u64, BuilderError> {
	let id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.ok_or_else(|| BuilderError::Configuration("chain_id is required".to_string()))?;
	u64::try_from(id)
		.map_err(|_| BuilderError::Configuration(format!("Invalid chain_id {}", id)))
}

/// Registry for the EVM builder.
pub struct Registry;

impl anytx_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "evm";
	type Factory = crate::BuilderFactory;

	fn factory() -> Self::Factory {
		create_builder
	}
}

impl crate::BuilderRegistry for Registry {}

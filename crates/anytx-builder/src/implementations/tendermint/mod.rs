//! Tendermint (Cosmos SDK) builder.
//!
//! Transactions carry bank and staking messages, are priced by simulating
//! them against the node's REST endpoint and are signed in
//! `SIGN_MODE_DIRECT`. Account number and sequence are read from the node
//! for every build.

use crate::{BuilderError, BuilderInterface, SigningKeys};
use crate::{BuiltTransaction, SignedTransaction, UnsignedTransaction};
use anytx_account::{AccountInterface, AccountOptions, TendermintAccount};
use anytx_storage::StorageService;
use anytx_types::{
	BroadcastStatus, ChainFamily, Coin, ConfigSchema, ContractCall, FeeEstimate, Field, FieldType,
	GasLimit, Schema, TransactionHash, ValidationError,
};
use async_trait::async_trait;
use std::sync::Arc;

pub mod fee;
pub mod messages;
pub mod node;
pub mod signing;
pub mod tx;

pub use fee::TxOptions;
pub use messages::Message;
pub use tx::TendermintTransaction;

use messages::{to_chain_coin, MESSAGE_KINDS};
use node::{AccountInfo, LcdClient, LcdNode};
use signing::{sign_direct, SignerContext};

/// Chain level settings of a Tendermint builder.
#[derive(Debug, Clone)]
pub struct ChainSettings {
	pub chain_id: String,
	/// Denomination of fees and of transfer and staking amounts.
	pub denom: String,
	pub gas_price: Option<Coin>,
	pub gas_adjustment: f64,
	pub account_options: AccountOptions,
}

impl ChainSettings {
	pub fn new(chain_id: impl Into<String>, denom: impl Into<String>) -> Self {
		Self {
			chain_id: chain_id.into(),
			denom: denom.into(),
			gas_price: None,
			gas_adjustment: fee::DEFAULT_GAS_ADJUSTMENT,
			account_options: AccountOptions::default(),
		}
	}
}

/// Builder for Cosmos SDK chains.
pub struct TendermintBuilder {
	node: Arc<dyn LcdNode>,
	settings: ChainSettings,
}

impl TendermintBuilder {
	pub fn new(node: Arc<dyn LcdNode>, settings: ChainSettings) -> Self {
		Self { node, settings }
	}

	pub fn settings(&self) -> &ChainSettings {
		&self.settings
	}

	/// `amount` of the configured denomination.
	fn coin(&self, amount: &str) -> Result<Coin, BuilderError> {
		format!("{}{}", amount.trim(), self.settings.denom)
			.parse()
			.map_err(|e: anytx_types::CoinError| BuilderError::InvalidInput(e.to_string()))
	}

	/// Gas limit and fee for `options` sent by `signer`.
	///
	/// With [`GasLimit::Auto`] the body is simulated once with an empty
	/// fee and an empty signature, and the gas used is scaled by the
	/// adjustment. A fixed limit skips simulation.
	pub async fn estimate_fee_for(
		&self,
		options: &TxOptions,
		signer: &AccountInfo,
	) -> Result<(u64, Coin), BuilderError> {
		let gas_limit = match options.gas {
			GasLimit::Fixed(limit) => limit,
			GasLimit::Auto => {
				let simulation = TendermintTransaction {
					body: options.body()?,
					auth_info: tx::signer_info(signer.public_key.as_deref(), signer.sequence)?
						.auth_info(tx::fee(fee::empty_fee(&self.settings.denom)?, 0)),
					signatures: vec![Vec::new()],
					sender: String::new(),
					chain_id: self.settings.chain_id.clone(),
					account_number: signer.account_number,
					sequence: signer.sequence,
				};
				let gas_used = self.node.simulate(simulation.to_bytes()).await?;
				let adjustment = options
					.gas_adjustment
					.unwrap_or(self.settings.gas_adjustment);
				let limit = fee::adjusted_gas(gas_used, adjustment)?;
				tracing::debug!(
					chain_id = %self.settings.chain_id,
					gas_used,
					adjustment,
					gas_limit = limit,
					"Simulated transaction"
				);
				limit
			},
		};

		let price = options
			.gas_prices
			.as_ref()
			.or(self.settings.gas_price.as_ref());
		let amount = fee::fee_amount(price, gas_limit, &self.settings.denom)?;
		Ok((gas_limit, amount))
	}

	/// Builds an unsigned transaction from `sender` with its current
	/// account number and sequence.
	pub async fn create_transaction(
		&self,
		sender: &str,
		options: TxOptions,
	) -> Result<TendermintTransaction, BuilderError> {
		if options.msgs.is_empty() {
			return Err(BuilderError::InvalidInput(
				"A transaction needs at least one message".to_string(),
			));
		}

		let account = self.node.account(sender).await?;
		let (gas_limit, amount) = self.estimate_fee_for(&options, &account).await?;

		let tx = TendermintTransaction {
			body: options.body()?,
			auth_info: tx::unsigned_auth_info(tx::fee(to_chain_coin(&amount)?, gas_limit)),
			signatures: Vec::new(),
			sender: sender.to_string(),
			chain_id: self.settings.chain_id.clone(),
			account_number: account.account_number,
			sequence: account.sequence,
		};

		tracing::debug!(
			chain_id = %self.settings.chain_id,
			sender = %sender,
			messages = options.msgs.len(),
			gas_limit,
			fee = %amount,
			"Built transaction"
		);
		Ok(tx)
	}

	pub async fn create_send_tx(
		&self,
		sender: &str,
		recipient: &str,
		amount: &str,
		memo: Option<&str>,
	) -> Result<TendermintTransaction, BuilderError> {
		let msg = Message::Send {
			from: sender.to_string(),
			to: recipient.to_string(),
			amount: vec![self.coin(amount)?],
		};
		self.create_transaction(sender, with_memo(msg, memo)).await
	}

	pub async fn create_delegate_tx(
		&self,
		delegator: &str,
		validator: &str,
		amount: &str,
		memo: Option<&str>,
	) -> Result<TendermintTransaction, BuilderError> {
		let msg = Message::Delegate {
			delegator: delegator.to_string(),
			validator: validator.to_string(),
			amount: self.coin(amount)?,
		};
		self.create_transaction(delegator, with_memo(msg, memo)).await
	}

	pub async fn create_undelegate_tx(
		&self,
		delegator: &str,
		validator: &str,
		amount: &str,
		memo: Option<&str>,
	) -> Result<TendermintTransaction, BuilderError> {
		let msg = Message::Undelegate {
			delegator: delegator.to_string(),
			validator: validator.to_string(),
			amount: self.coin(amount)?,
		};
		self.create_transaction(delegator, with_memo(msg, memo)).await
	}

	pub async fn create_redelegate_tx(
		&self,
		delegator: &str,
		validator_src: &str,
		validator_dst: &str,
		amount: &str,
		memo: Option<&str>,
	) -> Result<TendermintTransaction, BuilderError> {
		let msg = Message::Redelegate {
			delegator: delegator.to_string(),
			validator_src: validator_src.to_string(),
			validator_dst: validator_dst.to_string(),
			amount: self.coin(amount)?,
		};
		self.create_transaction(delegator, with_memo(msg, memo)).await
	}

	fn load_key(&self, key: &anytx_types::SecretString) -> Result<TendermintAccount, BuilderError> {
		Ok(TendermintAccount::from_secret(
			key,
			&self.settings.account_options,
		)?)
	}

	fn hash_hex(hash: &TransactionHash) -> String {
		hex::encode_upper(&hash.0)
	}
}

fn with_memo(msg: Message, memo: Option<&str>) -> TxOptions {
	TxOptions::new(vec![msg]).with_memo(memo.unwrap_or_default())
}

#[async_trait]
impl BuilderInterface for TendermintBuilder {
	fn family(&self) -> ChainFamily {
		ChainFamily::Tendermint
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(TendermintBuilderSchema)
	}

	/// `call.function` names the message kind, see [`Message::from_call`].
	async fn build_contract_transaction(
		&self,
		call: &ContractCall,
	) -> Result<UnsignedTransaction, BuilderError> {
		if call.value != 0 {
			return Err(BuilderError::InvalidInput(
				"Pass coins as message arguments instead of a value".to_string(),
			));
		}
		let options = TxOptions::new(vec![Message::from_call(call)?])
			.with_memo(call.memo.clone().unwrap_or_default())
			.with_gas(call.gas);

		let tx = self.create_transaction(&call.from, options).await?;
		Ok(UnsignedTransaction::Tendermint(tx))
	}

	async fn build_transfer_transaction(
		&self,
		from: &str,
		to: &str,
		amount: &str,
	) -> Result<UnsignedTransaction, BuilderError> {
		let tx = self.create_send_tx(from, to, amount, None).await?;
		Ok(UnsignedTransaction::Tendermint(tx))
	}

	async fn build_stake_transaction(
		&self,
		from: &str,
		validator: &str,
		amount: &str,
	) -> Result<BuiltTransaction, BuilderError> {
		let tx = self.create_delegate_tx(from, validator, amount, None).await?;
		Ok(BuiltTransaction::new(UnsignedTransaction::Tendermint(tx)))
	}

	async fn build_unstake_transaction(
		&self,
		from: &str,
		validator: &str,
		amount: &str,
	) -> Result<UnsignedTransaction, BuilderError> {
		let tx = self.create_undelegate_tx(from, validator, amount, None).await?;
		Ok(UnsignedTransaction::Tendermint(tx))
	}

	/// The primary key signs with the account state read at build time.
	/// Co-signers sign with their current account state.
	async fn sign_transaction(
		&self,
		tx: UnsignedTransaction,
		keys: &SigningKeys,
	) -> Result<SignedTransaction, BuilderError> {
		let tx = match tx {
			UnsignedTransaction::Tendermint(tx) => tx,
			other => {
				return Err(BuilderError::ChainMismatch {
					expected: ChainFamily::Tendermint,
					actual: other.family(),
				})
			},
		};

		let primary = self.load_key(&keys.primary)?;
		if !tx.sender.is_empty() && primary.address() != tx.sender {
			return Err(BuilderError::Signing(format!(
				"Key for {} cannot sign for sender {}",
				primary.address(),
				tx.sender
			)));
		}
		let context = SignerContext {
			account_number: tx.account_number,
			sequence: tx.sequence,
		};
		let mut signed = sign_direct(tx, &primary, &context)?;

		for key in &keys.co_signers {
			let account = self.load_key(key)?;
			let info = self.node.account(&account.address()).await?;
			let context = SignerContext {
				account_number: info.account_number,
				sequence: info.sequence,
			};
			signed = sign_direct(signed, &account, &context)?;
		}

		Ok(SignedTransaction::Tendermint(signed))
	}

	async fn broadcast_transaction(
		&self,
		tx: &SignedTransaction,
	) -> Result<TransactionHash, BuilderError> {
		let SignedTransaction::Tendermint(tx) = tx else {
			return Err(BuilderError::ChainMismatch {
				expected: ChainFamily::Tendermint,
				actual: tx.family(),
			});
		};
		if tx.signatures.is_empty() {
			return Err(BuilderError::Signing("Transaction has no signatures".to_string()));
		}

		let hash = self.node.broadcast(tx.to_bytes()).await?;
		tracing::info!(chain_id = %self.settings.chain_id, tx_hash = %hash, "Submitted transaction");
		self.parse_hash(&hash)
	}

	/// Accepted when the transaction executed with code 0.
	async fn transaction_status(&self, hash: &TransactionHash) -> BroadcastStatus {
		match self.node.tx_outcome(&Self::hash_hex(hash)).await {
			Ok(Some(outcome)) if outcome.code == 0 => BroadcastStatus::Accepted,
			Ok(Some(outcome)) => {
				BroadcastStatus::Failed(format!("code {}: {}", outcome.code, outcome.raw_log))
			},
			Ok(None) => BroadcastStatus::NotFound,
			Err(e) => BroadcastStatus::Unknown(e.to_string()),
		}
	}

	async fn estimate_fee(&self, call: &ContractCall) -> Result<FeeEstimate, BuilderError> {
		let options = TxOptions::new(vec![Message::from_call(call)?])
			.with_memo(call.memo.clone().unwrap_or_default())
			.with_gas(call.gas);
		let account = self.node.account(&call.from).await?;
		let (gas_limit, amount) = self.estimate_fee_for(&options, &account).await?;
		Ok(FeeEstimate::Tendermint {
			gas_limit,
			amount: vec![amount],
		})
	}

	/// The message kinds this builder can produce. There is no contract to
	/// inspect.
	async fn list_contract_functions(&self, _contract: &str) -> Result<Vec<String>, BuilderError> {
		Ok(MESSAGE_KINDS.iter().map(|kind| kind.to_string()).collect())
	}

	fn format_hash(&self, hash: &TransactionHash) -> String {
		Self::hash_hex(hash)
	}

	fn parse_hash(&self, hash: &str) -> Result<TransactionHash, BuilderError> {
		let bytes = hex::decode(anytx_types::without_0x_prefix(hash.trim()))
			.map_err(|e| BuilderError::InvalidInput(format!("Invalid transaction hash: {}", e)))?;
		if bytes.len() != 32 {
			return Err(BuilderError::InvalidInput(format!(
				"Transaction hashes are 32 bytes, got {}",
				bytes.len()
			)));
		}
		Ok(TransactionHash(bytes))
	}
}

/// Configuration schema for Cosmos SDK chains.
pub struct TendermintBuilderSchema;

impl TendermintBuilderSchema {
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		Self.validate(config)
	}
}

impl ConfigSchema for TendermintBuilderSchema {
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
				Field::new("chain_id", FieldType::String),
				Field::new("denom", FieldType::String),
			],
			vec![
				Field::new("gas_price", FieldType::String).with_validator(|value| {
					value
						.as_str()
						.map(|s| s.parse::<Coin>().map(|_| ()).map_err(|e| e.to_string()))
						.unwrap_or(Ok(()))
				}),
				Field::new(
					"gas_adjustment",
					FieldType::Float {
						min: Some(1.0),
						max: None,
					},
				),
				Field::new(
					"coin_type",
					FieldType::Integer {
						min: Some(0),
						max: Some(i64::from(u32::MAX)),
					},
				),
				Field::new("bech32_prefix", FieldType::String),
			],
		);

		schema.validate(config)
	}
}

/// Factory function to create a Tendermint builder.
///
/// Configuration parameters:
/// - `rpc_url`: REST (LCD) endpoint
/// - `chain_id`: e.g. `cosmoshub-4`
/// - `denom`: fee and staking denomination, e.g. `uatom`
/// - `gas_price` (optional): e.g. `0.006uatom`, without it fees are a flat
///   3000 of `denom`
/// - `gas_adjustment` (optional): defaults to 1.2
/// - `coin_type` (optional): SLIP-44 coin type for mnemonic keys, defaults
///   to 118
/// - `bech32_prefix` (optional): defaults to `cosmos`
pub fn create_builder(
	config: &toml::Value,
	_storage: Arc<StorageService>,
) -> Result<Box<dyn BuilderInterface>, BuilderError> {
	TendermintBuilderSchema::validate_config(config).map_err(|e| {
		BuilderError::Configuration(format!("Invalid Tendermint configuration: {}", e))
	})?;

	let get_str = |key: &str| config.get(key).and_then(|v| v.as_str());
	let rpc_url = get_str("rpc_url")
		.ok_or_else(|| BuilderError::Configuration("rpc_url is required".to_string()))?;
	let chain_id = get_str("chain_id")
		.ok_or_else(|| BuilderError::Configuration("chain_id is required".to_string()))?;
	let denom = get_str("denom")
		.ok_or_else(|| BuilderError::Configuration("denom is required".to_string()))?;

	let mut settings = ChainSettings::new(chain_id, denom);
	settings.gas_price = get_str("gas_price")
		.map(|price| price.parse::<Coin>())
		.transpose()
		.map_err(|e| BuilderError::Configuration(e.to_string()))?;
	if let Some(adjustment) = config.get("gas_adjustment").and_then(|v| {
		v.as_float()
			.or_else(|| v.as_integer().map(|i| i as f64))
	}) {
		settings.gas_adjustment = adjustment;
	}
	settings.account_options = account_options(config);

	Ok(Box::new(TendermintBuilder::new(
		Arc::new(LcdClient::new(rpc_url)),
		settings,
	)))
}

/// Key derivation settings of a chain table: `coin_type` and
/// `bech32_prefix`, falling back to the Cosmos Hub defaults.
pub fn account_options(config: &toml::Value) -> AccountOptions {
	let mut options = AccountOptions::default();
	if let Some(coin_type) = config
		.get("coin_type")
		.and_then(|v| v.as_integer())
		.and_then(|v| u32::try_from(v).ok())
	{
		options.coin_type = coin_type;
	}
	if let Some(prefix) = config.get("bech32_prefix").and_then(|v| v.as_str()) {
		options.bech32_prefix = prefix.to_string();
	}
	options
}

/// Registry for the Tendermint builder.
pub struct Registry;

impl anytx_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "tendermint";
	type Factory = crate::BuilderFactory;

	fn factory() -> Self::Factory {
		create_builder
	}
}

impl crate::BuilderRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::node::{MockLcdNode, TxOutcome};
	use super::*;
	use anytx_storage::implementations::memory::MemoryStorage;
	use cosmrs::proto::cosmos::staking::v1beta1::MsgDelegate;
	use cosmrs::proto::cosmos::tx::v1beta1::{AuthInfo, TxRaw};
	use cosmrs::proto::traits::Message as _;
	use sha2::Digest;

	const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
	const ADDRESS: &str = "cosmos19rl4cm2hmr8afy4kldpxz3fka4jguq0auqdal4";
	const VALIDATOR: &str = "cosmosvaloper1sjllsnramtg3ewxqwwrwjxfgc4n4ef9u2lcnj0";

	fn settings() -> ChainSettings {
		let mut settings = ChainSettings::new("cosmoshub-4", "uatom");
		settings.gas_price = Some("0.006uatom".parse().unwrap());
		settings
	}

	fn account_info() -> AccountInfo {
		AccountInfo {
			account_number: 12,
			sequence: 3,
			public_key: None,
		}
	}

	fn node_with_account() -> MockLcdNode {
		let mut node = MockLcdNode::new();
		node.expect_account().returning(|_| Ok(account_info()));
		node
	}

	fn tendermint_builder(node: MockLcdNode) -> TendermintBuilder {
		TendermintBuilder::new(Arc::new(node), settings())
	}

	fn unwrap_tendermint(tx: UnsignedTransaction) -> TendermintTransaction {
		match tx {
			UnsignedTransaction::Tendermint(tx) => tx,
			other => panic!("expected a Tendermint transaction, got {:?}", other.family()),
		}
	}

	#[tokio::test]
	async fn test_auto_gas_simulates_once_and_adjusts() {
		let mut node = node_with_account();
		node.expect_simulate()
			.withf(|bytes| {
				let raw = TxRaw::decode(bytes.as_slice()).unwrap();
				let auth = AuthInfo::decode(raw.auth_info_bytes.as_slice()).unwrap();
				let fee = auth.fee.unwrap();
				// empty fee, one signer slot, empty signature
				fee.gas_limit == 0
					&& fee.amount[0].amount == "0"
					&& auth.signer_infos.len() == 1
					&& raw.signatures == vec![Vec::<u8>::new()]
			})
			.times(1)
			.returning(|_| Ok(100_000));
		let builder = tendermint_builder(node);

		let tx = builder
			.create_delegate_tx(ADDRESS, VALIDATOR, "1000000", Some("STAKING MEMO"))
			.await
			.unwrap();

		let fee = &tx.auth_info.fee;
		assert_eq!(fee.gas_limit, 120_000);
		assert_eq!(fee.amount[0].amount, 720);
		assert_eq!(fee.amount[0].denom.to_string(), "uatom");
		assert_eq!(tx.account_number, 12);
		assert_eq!(tx.sequence, 3);
		assert_eq!(tx.body.memo, "STAKING MEMO");
		assert!(tx.auth_info.signer_infos.is_empty());

		let msg = MsgDelegate::decode(tx.body.messages[0].value.as_slice()).unwrap();
		assert_eq!(msg.amount.unwrap().amount, "1000000");
	}

	#[tokio::test]
	async fn test_fixed_gas_skips_simulation() {
		let mut node = node_with_account();
		node.expect_simulate().never();
		let builder = tendermint_builder(node);

		let call = ContractCall::new(ADDRESS, VALIDATOR, "delegate")
			.with_args(["500uatom"])
			.with_gas(GasLimit::Fixed(200_000));
		let tx = unwrap_tendermint(builder.build_contract_transaction(&call).await.unwrap());
		let fee = tx.auth_info.fee;
		assert_eq!(fee.gas_limit, 200_000);
		assert_eq!(fee.amount[0].amount, 1200);
	}

	#[tokio::test]
	async fn test_option_overrides_and_fallback_fee() {
		let mut node = node_with_account();
		node.expect_simulate().times(2).returning(|_| Ok(100_000));
		let mut plain = settings();
		plain.gas_price = None;
		let builder = TendermintBuilder::new(Arc::new(node), plain);

		let msg = Message::Send {
			from: ADDRESS.to_string(),
			to: ADDRESS.to_string(),
			amount: vec!["1uatom".parse().unwrap()],
		};
		let (gas, fee) = builder
			.estimate_fee_for(&TxOptions::new(vec![msg.clone()]), &account_info())
			.await
			.unwrap();
		assert_eq!(gas, 120_000);
		assert_eq!(fee.to_string(), "3000uatom");

		let options = TxOptions::new(vec![msg])
			.with_gas_adjustment(1.5)
			.with_gas_prices("0.01uatom".parse().unwrap());
		let (gas, fee) = builder
			.estimate_fee_for(&options, &account_info())
			.await
			.unwrap();
		assert_eq!(gas, 150_000);
		assert_eq!(fee.to_string(), "1500uatom");
	}

	#[tokio::test]
	async fn test_simulation_failure_aborts_build() {
		let mut node = node_with_account();
		node.expect_simulate()
			.returning(|_| Err(BuilderError::ContractExecution("insufficient funds".into())));
		let builder = tendermint_builder(node);

		assert!(matches!(
			builder.build_transfer_transaction(ADDRESS, ADDRESS, "10").await,
			Err(BuilderError::ContractExecution(_))
		));
	}

	#[tokio::test]
	async fn test_sign_and_broadcast() {
		let mut node = node_with_account();
		node.expect_simulate().returning(|_| Ok(80_000));
		node.expect_broadcast()
			.times(1)
			.returning(|bytes| Ok(hex::encode_upper(sha2::Sha256::digest(&bytes))));
		let builder = tendermint_builder(node);

		let built = builder
			.build_stake_transaction(ADDRESS, VALIDATOR, "25")
			.await
			.unwrap();
		assert!(built.ephemeral_signers.is_empty());

		let signed = builder
			.sign_transaction(built.transaction, &SigningKeys::new(MNEMONIC))
			.await
			.unwrap();
		let SignedTransaction::Tendermint(ref signed_tx) = signed else {
			panic!("expected a Tendermint transaction");
		};
		assert_eq!(signed_tx.signatures.len(), 1);
		assert_eq!(signed_tx.signatures[0].len(), 64);

		let account = TendermintAccount::from_mnemonic(MNEMONIC, 118, 0, 0, "cosmos").unwrap();
		let doc =
			tx::sign_doc_bytes(&signed_tx.body, &signed_tx.auth_info, "cosmoshub-4", 12).unwrap();
		assert!(account.verify(&doc, &signed_tx.signatures[0]));

		let hash = builder.broadcast_transaction(&signed).await.unwrap();
		assert_eq!(builder.format_hash(&hash), signed_tx.hash());
	}

	#[tokio::test]
	async fn test_sign_rejects_foreign_key() {
		let mut node = node_with_account();
		node.expect_simulate().returning(|_| Ok(80_000));
		let builder = tendermint_builder(node);

		let unsigned = builder
			.build_transfer_transaction(ADDRESS, ADDRESS, "1")
			.await
			.unwrap();
		let other_key = hex::encode([0x42u8; 32]);
		assert!(matches!(
			builder
				.sign_transaction(unsigned, &SigningKeys::new(other_key))
				.await,
			Err(BuilderError::Signing(_))
		));
	}

	#[tokio::test]
	async fn test_co_signer_uses_its_own_account_state() {
		let co_signer = TendermintAccount::from_private_key(&[0x42u8; 32], "cosmos").unwrap();
		let co_address = co_signer.address();

		let mut node = MockLcdNode::new();
		node.expect_account().returning(move |address| {
			if address == co_address {
				Ok(AccountInfo {
					account_number: 99,
					sequence: 7,
					public_key: None,
				})
			} else {
				Ok(account_info())
			}
		});
		node.expect_simulate().returning(|_| Ok(80_000));
		let builder = tendermint_builder(node);

		let unsigned = builder
			.build_transfer_transaction(ADDRESS, ADDRESS, "1")
			.await
			.unwrap();
		let signed = builder
			.sign_transaction(
				unsigned,
				&SigningKeys::new(MNEMONIC).with_co_signer(hex::encode([0x42u8; 32])),
			)
			.await
			.unwrap();
		let SignedTransaction::Tendermint(tx) = signed else {
			panic!("expected a Tendermint transaction");
		};
		assert_eq!(tx.signatures.len(), 2);
		assert_eq!(tx.auth_info.signer_infos[0].sequence, 3);
		assert_eq!(tx.auth_info.signer_infos[1].sequence, 7);
	}

	#[tokio::test]
	async fn test_memo_survives_wire_round_trip() {
		let mut node = node_with_account();
		node.expect_simulate().returning(|_| Ok(80_000));
		let builder = tendermint_builder(node);

		let unsigned = builder
			.create_undelegate_tx(ADDRESS, VALIDATOR, "5", Some("STAKING MEMO"))
			.await
			.unwrap();
		let signed = builder
			.sign_transaction(
				UnsignedTransaction::Tendermint(unsigned),
				&SigningKeys::new(MNEMONIC),
			)
			.await
			.unwrap();

		let bytes = signed.to_bytes().unwrap();
		let SignedTransaction::Tendermint(parsed) =
			SignedTransaction::from_bytes(ChainFamily::Tendermint, &bytes).unwrap()
		else {
			panic!("expected a Tendermint transaction");
		};
		assert_eq!(parsed.body.memo, "STAKING MEMO");
		assert_eq!(
			parsed.body.messages[0].type_url,
			"/cosmos.staking.v1beta1.MsgUndelegate"
		);
	}

	#[tokio::test]
	async fn test_unstake_is_undelegate() {
		let mut node = node_with_account();
		node.expect_simulate().returning(|_| Ok(80_000));
		let builder = tendermint_builder(node);

		let tx = unwrap_tendermint(
			builder
				.build_unstake_transaction(ADDRESS, VALIDATOR, "40")
				.await
				.unwrap(),
		);
		assert_eq!(
			tx.body.messages[0].type_url,
			"/cosmos.staking.v1beta1.MsgUndelegate"
		);
		assert!(matches!(
			builder.build_restake_transaction(ADDRESS, VALIDATOR).await,
			Err(BuilderError::Unsupported { .. })
		));
	}

	#[tokio::test]
	async fn test_status_mapping() {
		let hash = TransactionHash(vec![0xab; 32]);
		let cases = [
			(Ok(Some(0)), BroadcastStatus::Accepted),
			(Ok(None), BroadcastStatus::NotFound),
			(
				Ok(Some(11)),
				BroadcastStatus::Failed("code 11: out of gas".to_string()),
			),
			(
				Err("connection refused".to_string()),
				BroadcastStatus::Unknown("Transport error: connection refused".to_string()),
			),
		];

		for (reply, expected) in cases {
			let mut node = MockLcdNode::new();
			node.expect_tx_outcome()
				.withf(|hash| hash.starts_with("ABAB"))
				.returning(move |_| match &reply {
					Ok(code) => Ok(code.map(|code| TxOutcome {
						code,
						raw_log: "out of gas".to_string(),
					})),
					Err(e) => Err(BuilderError::Transport(e.clone())),
				});
			let builder = tendermint_builder(node);
			assert_eq!(builder.transaction_status(&hash).await, expected);
		}
	}

	#[tokio::test]
	async fn test_estimate_fee_and_functions() {
		let mut node = node_with_account();
		node.expect_simulate().times(1).returning(|_| Ok(50_000));
		let builder = tendermint_builder(node);

		let call = ContractCall::new(ADDRESS, VALIDATOR, "delegate").with_args(["1uatom"]);
		assert_eq!(
			builder.estimate_fee(&call).await.unwrap(),
			FeeEstimate::Tendermint {
				gas_limit: 60_000,
				amount: vec!["360uatom".parse().unwrap()],
			}
		);
		assert_eq!(
			builder.list_contract_functions("").await.unwrap(),
			vec!["send", "delegate", "undelegate", "redelegate"]
		);
	}

	#[test]
	fn test_hash_format() {
		let builder = tendermint_builder(MockLcdNode::new());
		let text = "A".repeat(64);
		let hash = builder.parse_hash(&text).unwrap();
		assert_eq!(builder.format_hash(&hash), text);
		assert!(builder.parse_hash("ABCD").is_err());
	}

	#[test]
	fn test_schema() {
		let valid: toml::Value = toml::from_str(
			r#"
			family = "tendermint"
			rpc_url = "https://cosmos-api.polkachu.com"
			chain_id = "cosmoshub-4"
			denom = "uatom"
			gas_price = "0.006uatom"
			gas_adjustment = 1.2
			coin_type = 118
			"#,
		)
		.unwrap();
		assert!(TendermintBuilderSchema::validate_config(&valid).is_ok());

		let bad_price: toml::Value = toml::from_str(
			r#"
			rpc_url = "https://x"
			chain_id = "c"
			denom = "uatom"
			gas_price = "cheap"
			"#,
		)
		.unwrap();
		assert!(TendermintBuilderSchema::validate_config(&bad_price).is_err());

		let low_adjustment: toml::Value = toml::from_str(
			r#"
			rpc_url = "https://x"
			chain_id = "c"
			denom = "uatom"
			gas_adjustment = 0.5
			"#,
		)
		.unwrap();
		assert!(TendermintBuilderSchema::validate_config(&low_adjustment).is_err());
	}

	#[test]
	fn test_non_finite_adjustment_is_configuration_error() {
		let config: toml::Value = toml::from_str(
			r#"
			rpc_url = "https://x"
			chain_id = "cosmoshub-4"
			denom = "uatom"
			gas_adjustment = nan
			"#,
		)
		.unwrap();
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::default())));
		assert!(matches!(
			create_builder(&config, storage),
			Err(BuilderError::Configuration(_))
		));
	}

	#[tokio::test]
	async fn test_negative_adjustment_override_rejected() {
		let mut node = node_with_account();
		node.expect_simulate().returning(|_| Ok(100_000));
		let builder = tendermint_builder(node);

		let msg = Message::Send {
			from: ADDRESS.to_string(),
			to: ADDRESS.to_string(),
			amount: vec!["1uatom".parse().unwrap()],
		};
		let options = TxOptions::new(vec![msg]).with_gas_adjustment(-1.2);
		assert!(matches!(
			builder.estimate_fee_for(&options, &account_info()).await,
			Err(BuilderError::InvalidInput(_))
		));
	}

	#[test]
	fn test_account_options_from_config() {
		let config: toml::Value = toml::from_str(
			r#"
			coin_type = 330
			bech32_prefix = "terra"
			"#,
		)
		.unwrap();
		let options = account_options(&config);
		assert_eq!(options.coin_type, 330);
		assert_eq!(options.bech32_prefix, "terra");

		let defaults = account_options(&toml::Value::Table(toml::Table::new()));
		assert_eq!(defaults, AccountOptions::default());
	}
}

//! Solana builder.
//!
//! Transactions are an ordered instruction list with the sender as fee
//! payer and the latest finalized blockhash. Program calls use a plain
//! `function:args` payload. Staking creates a fresh stake account whose key
//! is returned to the caller and must co-sign.

use crate::{BuilderError, BuilderInterface, SigningKeys};
use crate::{BuiltTransaction, SignedTransaction, UnsignedTransaction};
use anytx_account::{EphemeralKey, SolanaAccount};
use anytx_storage::StorageService;
use anytx_types::{
	parse_token_amount, BroadcastStatus, ChainFamily, ConfigSchema, ContractCall, FeeEstimate,
	Field, FieldType, Schema, TransactionHash, ValidationError,
};
use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use std::sync::Arc;

pub mod instructions;
pub mod node;

use node::{RpcNode, SolanaNode};

const SOL_DECIMALS: u8 = 9;

/// A delegation transaction and the stake account key that must co-sign it.
#[derive(Debug)]
pub struct StakeTransaction {
	pub transaction: Transaction,
	pub stake_account: EphemeralKey,
}

pub(crate) fn parse_pubkey(value: &str, what: &str) -> Result<Pubkey, BuilderError> {
	Pubkey::from_str(value.trim())
		.map_err(|e| BuilderError::InvalidInput(format!("Invalid {} '{}': {}", what, value, e)))
}

fn to_base_units(amount: &str, decimals: u8) -> Result<u64, BuilderError> {
	let units = parse_token_amount(amount, decimals).map_err(BuilderError::InvalidInput)?;
	u64::try_from(units)
		.map_err(|_| BuilderError::InvalidInput(format!("Amount {} is too large", amount)))
}

/// Builder for Solana clusters.
pub struct SolanaBuilder {
	node: Arc<dyn SolanaNode>,
}

impl SolanaBuilder {
	pub fn new(node: Arc<dyn SolanaNode>) -> Self {
		Self { node }
	}

	/// Wraps `instructions` in a transaction paid by `payer`.
	async fn assemble(
		&self,
		instructions: &[Instruction],
		payer: &Pubkey,
	) -> Result<Transaction, BuilderError> {
		let blockhash = self.node.latest_blockhash().await?;
		let mut tx = Transaction::new_with_payer(instructions, Some(payer));
		tx.message.recent_blockhash = blockhash;
		Ok(tx)
	}

	/// Native transfer of `amount` SOL.
	pub async fn transfer_sol(
		&self,
		from: &Pubkey,
		to: &Pubkey,
		amount: &str,
	) -> Result<Transaction, BuilderError> {
		let lamports = to_base_units(amount, SOL_DECIMALS)?;
		self.assemble(&[system_instruction::transfer(from, to, lamports)], from)
			.await
	}

	/// Reads the decimals of an SPL mint.
	pub async fn get_token_decimals(&self, mint: &Pubkey) -> Result<u8, BuilderError> {
		let data = self
			.node
			.account_data(*mint)
			.await?
			.ok_or_else(|| BuilderError::Resolution(format!("Mint {} does not exist", mint)))?;
		instructions::mint_decimals(&data).ok_or_else(|| {
			BuilderError::Resolution(format!("Account {} is not an SPL mint", mint))
		})
	}

	/// SPL transfer of `amount` tokens between the associated token accounts
	/// of `from` and `to`.
	pub async fn transfer_token(
		&self,
		from: &Pubkey,
		to: &Pubkey,
		mint: &Pubkey,
		amount: &str,
	) -> Result<Transaction, BuilderError> {
		let decimals = self.get_token_decimals(mint).await?;
		let units = to_base_units(amount, decimals)?;

		let source = instructions::associated_token_address(from, mint);
		let destination = instructions::associated_token_address(to, mint);
		let ix = instructions::transfer_checked(&source, mint, &destination, from, units, decimals)?;

		self.assemble(&[ix], from).await
	}

	/// Creates, initializes and delegates a new stake account holding
	/// `amount` SOL.
	pub async fn build_staking_transaction(
		&self,
		from: &Pubkey,
		vote_account: &Pubkey,
		amount: &str,
	) -> Result<StakeTransaction, BuilderError> {
		let lamports = to_base_units(amount, SOL_DECIMALS)?;
		let stake_account = EphemeralKey::generate();
		let stake = stake_account.pubkey();

		let instructions = [
			system_instruction::create_account(
				from,
				&stake,
				lamports,
				instructions::STAKE_ACCOUNT_SPACE,
				&instructions::STAKE_PROGRAM_ID,
			),
			instructions::initialize_stake(&stake, from),
			instructions::delegate_stake(&stake, vote_account, from),
		];
		let transaction = self.assemble(&instructions, from).await?;

		tracing::debug!(
			stake_account = %stake,
			vote_account = %vote_account,
			lamports,
			"Built stake delegation"
		);

		Ok(StakeTransaction {
			transaction,
			stake_account,
		})
	}

	fn signature_of(hash: &TransactionHash) -> Result<Signature, BuilderError> {
		Signature::try_from(hash.0.as_slice()).map_err(|_| {
			BuilderError::InvalidInput(format!(
				"Solana signatures are 64 bytes, got {}",
				hash.0.len()
			))
		})
	}
}

#[async_trait]
impl BuilderInterface for SolanaBuilder {
	fn family(&self) -> ChainFamily {
		ChainFamily::Solana
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SolanaBuilderSchema)
	}

	async fn build_contract_transaction(
		&self,
		call: &ContractCall,
	) -> Result<UnsignedTransaction, BuilderError> {
		let from = parse_pubkey(&call.from, "sender")?;
		let program = parse_pubkey(&call.contract, "program id")?;

		let mut ixs = vec![instructions::program_call(
			&program,
			&from,
			&call.function,
			&call.args,
		)];
		if call.value > 0 {
			let lamports = u64::try_from(call.value).map_err(|_| {
				BuilderError::InvalidInput(format!("Value {} exceeds u64 lamports", call.value))
			})?;
			ixs.push(system_instruction::transfer(&from, &program, lamports));
		}
		if let Some(memo) = call.memo.as_deref().filter(|m| !m.is_empty()) {
			ixs.push(instructions::memo(&from, memo));
		}

		let tx = self.assemble(&ixs, &from).await?;
		Ok(UnsignedTransaction::Solana(tx))
	}

	async fn build_transfer_transaction(
		&self,
		from: &str,
		to: &str,
		amount: &str,
	) -> Result<UnsignedTransaction, BuilderError> {
		let from = parse_pubkey(from, "sender")?;
		let to = parse_pubkey(to, "recipient")?;
		let tx = self.transfer_sol(&from, &to, amount).await?;
		Ok(UnsignedTransaction::Solana(tx))
	}

	async fn build_stake_transaction(
		&self,
		from: &str,
		validator: &str,
		amount: &str,
	) -> Result<BuiltTransaction, BuilderError> {
		let from = parse_pubkey(from, "sender")?;
		let vote = parse_pubkey(validator, "vote account")?;
		let StakeTransaction {
			transaction,
			stake_account,
		} = self.build_staking_transaction(&from, &vote, amount).await?;

		Ok(BuiltTransaction::new(UnsignedTransaction::Solana(transaction))
			.with_ephemeral_signer(stake_account))
	}

	/// Signs with the primary key and every co-signer. Fails unless all
	/// required signatures end up present.
	async fn sign_transaction(
		&self,
		tx: UnsignedTransaction,
		keys: &SigningKeys,
	) -> Result<SignedTransaction, BuilderError> {
		let mut tx = match tx {
			UnsignedTransaction::Solana(tx) => tx,
			other => {
				return Err(BuilderError::ChainMismatch {
					expected: ChainFamily::Solana,
					actual: other.family(),
				})
			},
		};

		let mut accounts = vec![SolanaAccount::from_secret(&keys.primary)?];
		for key in &keys.co_signers {
			accounts.push(SolanaAccount::from_secret(key)?);
		}
		let keypairs: Vec<&Keypair> = accounts.iter().map(SolanaAccount::keypair).collect();

		let blockhash = tx.message.recent_blockhash;
		tx.try_partial_sign(&keypairs, blockhash)
			.map_err(|e| BuilderError::Signing(e.to_string()))?;

		if !tx.is_signed() {
			let required = usize::from(tx.message.header.num_required_signatures);
			let missing: Vec<String> = tx
				.message
				.account_keys
				.iter()
				.take(required)
				.zip(&tx.signatures)
				.filter(|(_, sig)| **sig == Signature::default())
				.map(|(key, _)| key.to_string())
				.collect();
			return Err(BuilderError::Signing(format!(
				"Missing signatures for {}",
				missing.join(", ")
			)));
		}

		Ok(SignedTransaction::Solana(tx))
	}

	async fn broadcast_transaction(
		&self,
		tx: &SignedTransaction,
	) -> Result<TransactionHash, BuilderError> {
		let SignedTransaction::Solana(transaction) = tx else {
			return Err(BuilderError::ChainMismatch {
				expected: ChainFamily::Solana,
				actual: tx.family(),
			});
		};

		let signature = self.node.send_transaction(transaction).await?;
		tracing::info!(signature = %signature, "Submitted transaction");
		Ok(TransactionHash(signature.as_ref().to_vec()))
	}

	/// Any transaction the node can find counts as accepted. Execution
	/// errors and finality are not inspected.
	async fn transaction_status(&self, hash: &TransactionHash) -> BroadcastStatus {
		let signature = match Self::signature_of(hash) {
			Ok(signature) => signature,
			Err(e) => return BroadcastStatus::Unknown(e.to_string()),
		};

		match self.node.transaction_exists(signature).await {
			Ok(true) => BroadcastStatus::Accepted,
			Ok(false) => BroadcastStatus::NotFound,
			Err(e) => BroadcastStatus::Unknown(e.to_string()),
		}
	}

	async fn estimate_fee(&self, _call: &ContractCall) -> Result<FeeEstimate, BuilderError> {
		Ok(FeeEstimate::Solana)
	}

	fn format_hash(&self, hash: &TransactionHash) -> String {
		bs58::encode(&hash.0).into_string()
	}

	fn parse_hash(&self, hash: &str) -> Result<TransactionHash, BuilderError> {
		let bytes = bs58::decode(hash.trim())
			.into_vec()
			.map_err(|e| BuilderError::InvalidInput(format!("Invalid signature: {}", e)))?;
		let hash = TransactionHash(bytes);
		Self::signature_of(&hash)?;
		Ok(hash)
	}
}

/// Configuration schema for Solana clusters.
pub struct SolanaBuilderSchema;

impl SolanaBuilderSchema {
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		Self.validate(config)
	}
}

impl ConfigSchema for SolanaBuilderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("rpc_url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
					_ => Err("rpc_url must be an http(s) URL".to_string()),
				}
			})],
			vec![],
		);

		schema.validate(config)
	}
}

/// Factory function to create a Solana builder.
///
/// Configuration parameters:
/// - `rpc_url`: JSON-RPC endpoint
pub fn create_builder(
	config: &toml::Value,
	_storage: Arc<StorageService>,
) -> Result<Box<dyn BuilderInterface>, BuilderError> {
	SolanaBuilderSchema::validate_config(config)
		.map_err(|e| BuilderError::Configuration(format!("Invalid Solana configuration: {}", e)))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| BuilderError::Configuration("rpc_url is required".to_string()))?;

	Ok(Box::new(SolanaBuilder::new(Arc::new(RpcNode::new(rpc_url)))))
}

/// Registry for the Solana builder.
pub struct Registry;

impl anytx_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "solana";
	type Factory = crate::BuilderFactory;

	fn factory() -> Self::Factory {
		create_builder
	}
}

impl crate::BuilderRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::node::MockSolanaNode;
	use super::*;
	use solana_sdk::hash::Hash;
	use solana_sdk::signature::Signer;
	use solana_sdk::system_program;

	fn node_with_blockhash(hash: Hash) -> MockSolanaNode {
		let mut node = MockSolanaNode::new();
		node.expect_latest_blockhash().returning(move || Ok(hash));
		node
	}

	fn solana_builder(node: MockSolanaNode) -> SolanaBuilder {
		SolanaBuilder::new(Arc::new(node))
	}

	fn wallet() -> (Keypair, String) {
		let keypair = Keypair::new();
		let secret = bs58::encode(keypair.to_bytes()).into_string();
		(keypair, secret)
	}

	fn unwrap_solana(tx: UnsignedTransaction) -> Transaction {
		match tx {
			UnsignedTransaction::Solana(tx) => tx,
			other => panic!("expected a Solana transaction, got {:?}", other.family()),
		}
	}

	#[tokio::test]
	async fn test_stake_transaction_layout() {
		let blockhash = Hash::new_unique();
		let builder = solana_builder(node_with_blockhash(blockhash));
		let from = Pubkey::new_unique();
		let vote = Pubkey::new_unique();

		let stake = builder
			.build_staking_transaction(&from, &vote, "1.5")
			.await
			.unwrap();
		let message = &stake.transaction.message;
		assert_eq!(message.recent_blockhash, blockhash);
		assert_eq!(message.account_keys[0], from);
		assert_eq!(message.instructions.len(), 3);

		let program = |i: usize| message.account_keys[usize::from(message.instructions[i].program_id_index)];
		assert_eq!(program(0), system_program::id());
		assert_eq!(program(1), instructions::STAKE_PROGRAM_ID);
		assert_eq!(program(2), instructions::STAKE_PROGRAM_ID);

		// create_account: tag 0, lamports, space, owner
		let create = &message.instructions[0].data;
		assert_eq!(&create[..4], &[0, 0, 0, 0]);
		assert_eq!(&create[4..12], &1_500_000_000u64.to_le_bytes());
		assert_eq!(&create[12..20], &200u64.to_le_bytes());
		assert_eq!(&create[20..52], instructions::STAKE_PROGRAM_ID.as_ref());

		assert_eq!(message.instructions[1].data.len(), 116);
		assert_eq!(message.instructions[2].data, vec![2, 0, 0, 0]);

		// payer and stake account both sign
		assert_eq!(message.header.num_required_signatures, 2);
		assert!(message.account_keys[..2].contains(&stake.stake_account.pubkey()));
	}

	#[tokio::test]
	async fn test_stake_needs_both_signatures() {
		let builder = solana_builder(node_with_blockhash(Hash::new_unique()));
		let (payer, secret) = wallet();
		let vote = Pubkey::new_unique();

		let built = builder
			.build_stake_transaction(&payer.pubkey().to_string(), &vote.to_string(), "2")
			.await
			.unwrap();
		assert_eq!(built.ephemeral_signers.len(), 1);
		let stake_secret = built.ephemeral_signers[0].to_secret();

		let payer_only = builder
			.sign_transaction(built.transaction.clone(), &SigningKeys::new(secret.clone()))
			.await;
		match payer_only {
			Err(BuilderError::Signing(reason)) => {
				assert!(reason.contains(&built.ephemeral_signers[0].pubkey().to_string()))
			},
			other => panic!("expected missing signature, got {:?}", other.map(|_| ())),
		}

		let signed = builder
			.sign_transaction(
				built.transaction,
				&SigningKeys::new(secret).with_co_signer(stake_secret),
			)
			.await
			.unwrap();
		let SignedTransaction::Solana(tx) = signed else {
			panic!("expected a Solana transaction");
		};
		assert!(tx.is_signed());
		assert!(tx.verify().is_ok());
	}

	#[tokio::test]
	async fn test_signing_order_does_not_matter() {
		let builder = solana_builder(node_with_blockhash(Hash::new_unique()));
		let (payer, secret) = wallet();

		let built = builder
			.build_stake_transaction(&payer.pubkey().to_string(), &Pubkey::new_unique().to_string(), "1")
			.await
			.unwrap();
		let stake_secret = built.ephemeral_signers[0].to_secret();

		let forward = builder
			.sign_transaction(
				built.transaction.clone(),
				&SigningKeys::new(secret.clone()).with_co_signer(stake_secret.clone()),
			)
			.await
			.unwrap();
		let reverse = builder
			.sign_transaction(
				built.transaction,
				&SigningKeys::new(stake_secret).with_co_signer(secret),
			)
			.await
			.unwrap();
		assert_eq!(forward, reverse);
	}

	#[tokio::test]
	async fn test_program_call_with_value_and_memo() {
		let builder = solana_builder(node_with_blockhash(Hash::new_unique()));
		let from = Pubkey::new_unique();
		let program = Pubkey::new_unique();

		let call = ContractCall::new(from.to_string(), program.to_string(), "deposit")
			.with_args(["7", "x"])
			.with_value(5_000)
			.with_memo("ref-42");
		let tx = unwrap_solana(builder.build_contract_transaction(&call).await.unwrap());

		let message = &tx.message;
		assert_eq!(message.instructions.len(), 3);
		assert_eq!(message.instructions[0].data, b"deposit:7x".to_vec());
		let transfer_program =
			message.account_keys[usize::from(message.instructions[1].program_id_index)];
		assert_eq!(transfer_program, system_program::id());
		assert_eq!(message.instructions[2].data, b"ref-42".to_vec());
	}

	#[tokio::test]
	async fn test_program_call_without_value_is_single_instruction() {
		let builder = solana_builder(node_with_blockhash(Hash::new_unique()));
		let call = ContractCall::new(
			Pubkey::new_unique().to_string(),
			Pubkey::new_unique().to_string(),
			"ping",
		);
		let tx = unwrap_solana(builder.build_contract_transaction(&call).await.unwrap());
		assert_eq!(tx.message.instructions.len(), 1);
		assert_eq!(tx.message.instructions[0].data, b"ping:".to_vec());
	}

	#[tokio::test]
	async fn test_transfer_sol_scales_to_lamports() {
		let builder = solana_builder(node_with_blockhash(Hash::new_unique()));
		let tx = unwrap_solana(
			builder
				.build_transfer_transaction(
					&Pubkey::new_unique().to_string(),
					&Pubkey::new_unique().to_string(),
					"0.25",
				)
				.await
				.unwrap(),
		);
		// system transfer: tag 2, lamports
		let data = &tx.message.instructions[0].data;
		assert_eq!(&data[..4], &[2, 0, 0, 0]);
		assert_eq!(&data[4..12], &250_000_000u64.to_le_bytes());
	}

	#[tokio::test]
	async fn test_transfer_token_reads_decimals() {
		let mint = Pubkey::new_unique();
		let mut node = node_with_blockhash(Hash::new_unique());
		node.expect_account_data()
			.withf(move |key| *key == mint)
			.times(1)
			.returning(|_| Ok(Some(instructions::tests::mint_account(6))));
		let builder = solana_builder(node);
		let from = Pubkey::new_unique();
		let to = Pubkey::new_unique();

		let tx = builder.transfer_token(&from, &to, &mint, "2.5").await.unwrap();
		let ix = &tx.message.instructions[0];
		assert_eq!(
			tx.message.account_keys[ix.program_id_index as usize],
			spl_token::id()
		);
		assert_eq!(ix.data[0], 12);
		assert_eq!(&ix.data[1..9], &2_500_000u64.to_le_bytes());
		assert_eq!(ix.data[9], 6);

		let source = instructions::associated_token_address(&from, &mint);
		let destination = instructions::associated_token_address(&to, &mint);
		assert!(tx.message.account_keys.contains(&source));
		assert!(tx.message.account_keys.contains(&destination));
	}

	#[tokio::test]
	async fn test_missing_mint_is_resolution_error() {
		let mut node = MockSolanaNode::new();
		node.expect_account_data().returning(|_| Ok(None));
		node.expect_latest_blockhash().never();
		let builder = solana_builder(node);

		assert!(matches!(
			builder.get_token_decimals(&Pubkey::new_unique()).await,
			Err(BuilderError::Resolution(_))
		));
	}

	#[tokio::test]
	async fn test_non_mint_account_is_resolution_error() {
		let mut node = MockSolanaNode::new();
		node.expect_account_data()
			.returning(|_| Ok(Some(vec![0u8; 165])));
		let builder = solana_builder(node);

		assert!(matches!(
			builder.get_token_decimals(&Pubkey::new_unique()).await,
			Err(BuilderError::Resolution(msg)) if msg.contains("is not an SPL mint")
		));
	}

	#[tokio::test]
	async fn test_broadcast_and_status() {
		let signature = Signature::from([7u8; 64]);
		let mut node = node_with_blockhash(Hash::new_unique());
		node.expect_send_transaction()
			.times(1)
			.returning(move |_| Ok(signature));
		node.expect_transaction_exists()
			.withf(move |sig| *sig == signature)
			.returning(|_| Ok(true));
		let builder = solana_builder(node);
		let (payer, secret) = wallet();

		let unsigned = builder
			.build_transfer_transaction(
				&payer.pubkey().to_string(),
				&Pubkey::new_unique().to_string(),
				"1",
			)
			.await
			.unwrap();
		let signed = builder
			.sign_transaction(unsigned, &SigningKeys::new(secret))
			.await
			.unwrap();
		let hash = builder.broadcast_transaction(&signed).await.unwrap();

		assert_eq!(builder.format_hash(&hash), signature.to_string());
		assert_eq!(builder.parse_hash(&signature.to_string()).unwrap(), hash);
		assert!(builder.is_transaction_broadcasted(&hash).await);
	}

	#[tokio::test]
	async fn test_status_not_found_and_lookup_errors() {
		let mut node = MockSolanaNode::new();
		node.expect_transaction_exists().times(1).returning(|_| Ok(false));
		let builder = solana_builder(node);
		let hash = TransactionHash(vec![1; 64]);
		assert_eq!(builder.transaction_status(&hash).await, BroadcastStatus::NotFound);

		let mut node = MockSolanaNode::new();
		node.expect_transaction_exists()
			.returning(|_| Err(BuilderError::Transport("timeout".into())));
		let builder = solana_builder(node);
		assert!(matches!(
			builder.transaction_status(&hash).await,
			BroadcastStatus::Unknown(_)
		));
		assert!(!builder.is_transaction_broadcasted(&hash).await);

		assert!(matches!(
			builder.transaction_status(&TransactionHash(vec![1; 32])).await,
			BroadcastStatus::Unknown(_)
		));
	}

	#[tokio::test]
	async fn test_foreign_transaction_rejected() {
		let builder = solana_builder(MockSolanaNode::new());
		let tx = UnsignedTransaction::Evm(crate::implementations::evm::EvmTransaction {
			from: Default::default(),
			tx: Default::default(),
		});
		assert!(matches!(
			builder.sign_transaction(tx, &SigningKeys::new("x")).await,
			Err(BuilderError::ChainMismatch {
				expected: ChainFamily::Solana,
				actual: ChainFamily::Evm
			})
		));
	}

	#[test]
	fn test_schema() {
		let valid: toml::Value =
			toml::from_str(r#"rpc_url = "https://api.mainnet-beta.solana.com""#).unwrap();
		assert!(SolanaBuilderSchema::validate_config(&valid).is_ok());

		let invalid: toml::Value = toml::from_str(r#"rpc_url = "ws://localhost""#).unwrap();
		assert!(SolanaBuilderSchema::validate_config(&invalid).is_err());
	}
}

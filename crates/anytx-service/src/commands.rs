//! Command line operations.
//!
//! Every command resolves its chain against the configuration, runs against
//! the [`BuilderService`] and returns a JSON document for stdout. Signing
//! keys are only ever read from environment variables named on the command
//! line.

use anytx_account::{load_account, AccountOptions};
use anytx_builder::implementations::tendermint;
use anytx_builder::{
	BuilderError, BuilderInterface, BuilderService, BuiltTransaction, SignedTransaction, SigningKeys,
};
use anytx_config::{ChainEntry, Config};
use anytx_types::{BroadcastStatus, ChainFamily, ContractCall, GasLimit, SecretString};
use clap::{Args, Subcommand};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
	#[error(transparent)]
	Builder(#[from] BuilderError),
	#[error(transparent)]
	Config(#[from] anytx_config::ConfigError),
	#[error(transparent)]
	Account(#[from] anytx_account::AccountError),
	#[error("{0}")]
	Input(String),
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// List configured chains and their families
	Chains,
	/// List the callable functions of a contract
	Functions {
		#[arg(long)]
		chain: Option<String>,
		contract: String,
	},
	/// Print the ABI of a contract
	Abi {
		#[arg(long)]
		chain: Option<String>,
		contract: String,
	},
	/// Read-only contract call
	Call {
		#[arg(long)]
		chain: Option<String>,
		contract: String,
		function: String,
		args: Vec<String>,
	},
	/// Estimate the fee of a contract call
	Fee {
		#[command(flatten)]
		call: CallArgs,
	},
	/// Build a contract call, optionally signing and broadcasting it
	Build {
		#[command(flatten)]
		call: CallArgs,
		#[command(flatten)]
		submit: SubmitArgs,
	},
	/// Transfer the native asset
	Transfer {
		#[arg(long)]
		chain: Option<String>,
		#[arg(long)]
		from: Option<String>,
		to: String,
		amount: String,
		#[command(flatten)]
		submit: SubmitArgs,
	},
	/// Stake with a validator
	Stake {
		#[arg(long)]
		chain: Option<String>,
		#[arg(long)]
		from: Option<String>,
		validator: String,
		amount: String,
		#[command(flatten)]
		submit: SubmitArgs,
	},
	/// Start withdrawing stake from a validator
	Unstake {
		#[arg(long)]
		chain: Option<String>,
		#[arg(long)]
		from: Option<String>,
		validator: String,
		amount: String,
		#[command(flatten)]
		submit: SubmitArgs,
	},
	/// Stake the rewards accrued with a validator
	Restake {
		#[arg(long)]
		chain: Option<String>,
		#[arg(long)]
		from: Option<String>,
		validator: String,
		#[command(flatten)]
		submit: SubmitArgs,
	},
	/// Claim the rewards accrued with a validator
	WithdrawRewards {
		#[arg(long)]
		chain: Option<String>,
		#[arg(long)]
		from: Option<String>,
		validator: String,
		#[command(flatten)]
		submit: SubmitArgs,
	},
	/// Show unclaimed staking rewards
	Rewards {
		#[arg(long)]
		chain: Option<String>,
		validator: String,
		delegator: String,
	},
	/// Broadcast a signed transaction given as hex
	Broadcast {
		#[arg(long)]
		chain: Option<String>,
		raw: String,
	},
	/// Look up a transaction by hash
	Status {
		#[arg(long)]
		chain: Option<String>,
		hash: String,
	},
	/// Print the address of a key
	Address {
		#[arg(long)]
		chain: Option<String>,
		/// Environment variable holding the key
		#[arg(long)]
		key_env: String,
	},
}

#[derive(Args, Debug, Clone)]
pub struct CallArgs {
	#[arg(long)]
	pub chain: Option<String>,
	/// Sender, derived from the signing key when omitted
	#[arg(long)]
	pub from: Option<String>,
	/// Contract address, program id or message recipient
	pub contract: String,
	/// Function, instruction or message kind
	pub function: String,
	pub args: Vec<String>,
	/// Native value in the chain's smallest unit
	#[arg(long, default_value_t = 0)]
	pub value: u128,
	/// Gas limit, `auto` to estimate
	#[arg(long, default_value = "auto")]
	pub gas: GasLimit,
	#[arg(long)]
	pub memo: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SubmitArgs {
	/// Environment variable holding the signing key
	#[arg(long)]
	pub sign_key_env: Option<String>,
	/// Environment variables holding additional signer keys
	#[arg(long)]
	pub co_signer_env: Vec<String>,
	/// Submit the signed transaction
	#[arg(long, requires = "sign_key_env")]
	pub broadcast: bool,
}

fn secret_from_env(var: &str) -> Result<SecretString, CommandError> {
	SecretString::from_env(var).map_err(CommandError::Input)
}

impl SubmitArgs {
	/// Keys named on the command line, or `None` when nothing is signed.
	fn signing_keys(&self) -> Result<Option<SigningKeys>, CommandError> {
		if self.broadcast && self.sign_key_env.is_none() {
			return Err(CommandError::Input(
				"--broadcast requires --sign-key-env".to_string(),
			));
		}
		let Some(var) = &self.sign_key_env else {
			return Ok(None);
		};
		let mut keys = SigningKeys::new(secret_from_env(var)?);
		for var in &self.co_signer_env {
			keys = keys.with_co_signer(secret_from_env(var)?);
		}
		Ok(Some(keys))
	}
}

fn account_options(chain: &ChainEntry<'_>) -> AccountOptions {
	match chain.family {
		ChainFamily::Tendermint => tendermint::account_options(chain.config),
		_ => AccountOptions::default(),
	}
}

/// Uses `from` when given, otherwise the address of the primary key.
fn sender(
	from: Option<String>,
	keys: Option<&SigningKeys>,
	chain: &ChainEntry<'_>,
) -> Result<String, CommandError> {
	match (from, keys) {
		(Some(from), _) => Ok(from),
		(None, Some(keys)) => {
			Ok(load_account(chain.family, &keys.primary, &account_options(chain))?.address())
		},
		(None, None) => Err(CommandError::Input(
			"--from is required when no signing key is given".to_string(),
		)),
	}
}

fn to_call(call: CallArgs, from: String) -> ContractCall {
	let mut contract_call = ContractCall::new(from, call.contract, call.function)
		.with_args(call.args)
		.with_value(call.value)
		.with_gas(call.gas);
	if let Some(memo) = call.memo {
		contract_call = contract_call.with_memo(memo);
	}
	contract_call
}

/// Signs and broadcasts `built` as far as `keys` and `broadcast` ask for.
async fn finish(
	service: &BuilderService,
	chain: &ChainEntry<'_>,
	built: BuiltTransaction,
	keys: Option<SigningKeys>,
	broadcast: bool,
) -> Result<Value, CommandError> {
	let mut output = json!({
		"chain": chain.name,
		"family": chain.family,
		"transaction": built.transaction.describe(),
	});

	let Some(mut keys) = keys else {
		// Generated keys cannot be recovered later, so an unsigned build is a preview.
		let generated: Vec<String> = built
			.ephemeral_signers
			.iter()
			.map(|key| key.pubkey().to_string())
			.collect();
		if !generated.is_empty() {
			output["ephemeral_signers"] = json!(generated);
		}
		return Ok(output);
	};

	for key in &built.ephemeral_signers {
		keys = keys.with_co_signer(key.to_secret());
	}
	let signed = service
		.sign_transaction(chain.name, built.transaction, &keys)
		.await?;
	output["signed"] = json!(signed.to_hex()?);

	if broadcast {
		let builder: &dyn BuilderInterface = service.builder(chain.name)?;
		let hash = service.broadcast_transaction(chain.name, &signed).await?;
		output["hash"] = json!(builder.format_hash(&hash));
	}
	Ok(output)
}

fn status_name(status: &BroadcastStatus) -> Value {
	match status {
		BroadcastStatus::Accepted => json!({"status": "accepted"}),
		BroadcastStatus::Failed(reason) => json!({"status": "failed", "reason": reason}),
		BroadcastStatus::NotFound => json!({"status": "not_found"}),
		BroadcastStatus::Unknown(reason) => json!({"status": "unknown", "reason": reason}),
	}
}

/// Runs one command.
pub async fn execute(
	config: &Config,
	service: &BuilderService,
	command: Command,
) -> Result<Value, CommandError> {
	match command {
		Command::Chains => {
			let chains: Vec<Value> = config
				.chain_entries()?
				.into_iter()
				.map(|chain| json!({"name": chain.name, "family": chain.family}))
				.collect();
			Ok(json!(chains))
		},
		Command::Functions { chain, contract } => {
			let chain = config.chain_or_default(chain.as_deref())?;
			let functions = service
				.builder(chain.name)?
				.list_contract_functions(&contract)
				.await?;
			Ok(json!(functions))
		},
		Command::Abi { chain, contract } => {
			let chain = config.chain_or_default(chain.as_deref())?;
			Ok(service.builder(chain.name)?.get_contract_abi(&contract).await?)
		},
		Command::Call {
			chain,
			contract,
			function,
			args,
		} => {
			let chain = config.chain_or_default(chain.as_deref())?;
			Ok(service
				.builder(chain.name)?
				.call_contract_abi(&contract, &function, &args)
				.await?)
		},
		Command::Fee { call } => {
			let chain = config.chain_or_default(call.chain.as_deref())?;
			let from = sender(call.from.clone(), None, &chain)?;
			let estimate = service
				.builder(chain.name)?
				.estimate_fee(&to_call(call, from))
				.await?;
			Ok(json!(estimate))
		},
		Command::Build { call, submit } => {
			let chain = config.chain_or_default(call.chain.as_deref())?;
			let keys = submit.signing_keys()?;
			let from = sender(call.from.clone(), keys.as_ref(), &chain)?;
			tracing::info!(chain = %chain.name, function = %call.function, "Building contract call");

			let tx = service
				.build_contract_transaction(chain.name, &to_call(call, from))
				.await?;
			finish(service, &chain, BuiltTransaction::new(tx), keys, submit.broadcast).await
		},
		Command::Transfer {
			chain,
			from,
			to,
			amount,
			submit,
		} => {
			let chain = config.chain_or_default(chain.as_deref())?;
			let keys = submit.signing_keys()?;
			let from = sender(from, keys.as_ref(), &chain)?;
			tracing::info!(chain = %chain.name, to = %to, amount = %amount, "Building transfer");

			let tx = service
				.builder(chain.name)?
				.build_transfer_transaction(&from, &to, &amount)
				.await?;
			finish(service, &chain, BuiltTransaction::new(tx), keys, submit.broadcast).await
		},
		Command::Stake {
			chain,
			from,
			validator,
			amount,
			submit,
		} => {
			let chain = config.chain_or_default(chain.as_deref())?;
			let keys = submit.signing_keys()?;
			let from = sender(from, keys.as_ref(), &chain)?;
			tracing::info!(chain = %chain.name, validator = %validator, amount = %amount, "Building stake");

			let built = service
				.builder(chain.name)?
				.build_stake_transaction(&from, &validator, &amount)
				.await?;
			finish(service, &chain, built, keys, submit.broadcast).await
		},
		Command::Unstake {
			chain,
			from,
			validator,
			amount,
			submit,
		} => {
			let chain = config.chain_or_default(chain.as_deref())?;
			let keys = submit.signing_keys()?;
			let from = sender(from, keys.as_ref(), &chain)?;
			tracing::info!(chain = %chain.name, validator = %validator, amount = %amount, "Building unstake");

			let tx = service
				.builder(chain.name)?
				.build_unstake_transaction(&from, &validator, &amount)
				.await?;
			finish(service, &chain, BuiltTransaction::new(tx), keys, submit.broadcast).await
		},
		Command::Restake {
			chain,
			from,
			validator,
			submit,
		} => {
			let chain = config.chain_or_default(chain.as_deref())?;
			let keys = submit.signing_keys()?;
			let from = sender(from, keys.as_ref(), &chain)?;
			tracing::info!(chain = %chain.name, validator = %validator, "Building restake");

			let tx = service
				.builder(chain.name)?
				.build_restake_transaction(&from, &validator)
				.await?;
			finish(service, &chain, BuiltTransaction::new(tx), keys, submit.broadcast).await
		},
		Command::WithdrawRewards {
			chain,
			from,
			validator,
			submit,
		} => {
			let chain = config.chain_or_default(chain.as_deref())?;
			let keys = submit.signing_keys()?;
			let from = sender(from, keys.as_ref(), &chain)?;
			tracing::info!(chain = %chain.name, validator = %validator, "Building reward withdrawal");

			let tx = service
				.builder(chain.name)?
				.build_withdraw_rewards_transaction(&from, &validator)
				.await?;
			finish(service, &chain, BuiltTransaction::new(tx), keys, submit.broadcast).await
		},
		Command::Rewards {
			chain,
			validator,
			delegator,
		} => {
			let chain = config.chain_or_default(chain.as_deref())?;
			let rewards = service
				.builder(chain.name)?
				.staking_rewards(&validator, &delegator)
				.await?;
			Ok(json!({
				"chain": chain.name,
				"validator": validator,
				"delegator": delegator,
				"rewards": rewards,
			}))
		},
		Command::Broadcast { chain, raw } => {
			let chain = config.chain_or_default(chain.as_deref())?;
			let bytes = hex::decode(anytx_types::without_0x_prefix(raw.trim()))
				.map_err(|e| CommandError::Input(format!("Invalid transaction hex: {}", e)))?;
			let signed = SignedTransaction::from_bytes(chain.family, &bytes)?;
			let hash = service.broadcast_transaction(chain.name, &signed).await?;
			Ok(json!({
				"chain": chain.name,
				"hash": service.builder(chain.name)?.format_hash(&hash),
			}))
		},
		Command::Status { chain, hash } => {
			let chain = config.chain_or_default(chain.as_deref())?;
			let builder = service.builder(chain.name)?;
			let hash = builder.parse_hash(&hash)?;
			let status = service.transaction_status(chain.name, &hash).await?;

			let mut output = status_name(&status);
			output["chain"] = json!(chain.name);
			output["hash"] = json!(builder.format_hash(&hash));
			output["broadcasted"] = json!(status == BroadcastStatus::Accepted);
			Ok(output)
		},
		Command::Address { chain, key_env } => {
			let chain = config.chain_or_default(chain.as_deref())?;
			let key = secret_from_env(&key_env)?;
			let account = load_account(chain.family, &key, &account_options(&chain))?;
			Ok(json!({
				"chain": chain.name,
				"family": chain.family,
				"address": account.address(),
				"public_key": hex::encode(account.public_key()),
			}))
		},
	}
}

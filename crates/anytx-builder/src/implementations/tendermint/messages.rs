//! Bank and staking messages.

use crate::BuilderError;
use anytx_types::{Coin, ContractCall};
use cosmrs::bank::MsgSend;
use cosmrs::staking::{MsgBeginRedelegate, MsgDelegate, MsgUndelegate};
use cosmrs::tx::Msg;
use cosmrs::{AccountId, Any};

/// Message kinds accepted as `ContractCall::function`.
pub const MESSAGE_KINDS: [&str; 4] = ["send", "delegate", "undelegate", "redelegate"];

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
	Send {
		from: String,
		to: String,
		amount: Vec<Coin>,
	},
	Delegate {
		delegator: String,
		validator: String,
		amount: Coin,
	},
	Undelegate {
		delegator: String,
		validator: String,
		amount: Coin,
	},
	Redelegate {
		delegator: String,
		validator_src: String,
		validator_dst: String,
		amount: Coin,
	},
}

/// Converts to the on-chain representation, which only carries integers.
pub fn to_chain_coin(coin: &Coin) -> Result<cosmrs::Coin, BuilderError> {
	if coin.truncated() != *coin {
		return Err(BuilderError::InvalidInput(format!(
			"{} is not a whole amount of {}",
			coin, coin.denom
		)));
	}
	let amount = coin
		.integer_amount()
		.map_err(|e| BuilderError::InvalidInput(e.to_string()))?;
	cosmrs::Coin::new(amount, &coin.denom)
		.map_err(|e| BuilderError::InvalidInput(format!("Invalid denom '{}': {}", coin.denom, e)))
}

fn account_id(address: &str) -> Result<AccountId, BuilderError> {
	address
		.parse()
		.map_err(|e| BuilderError::InvalidInput(format!("Invalid address '{}': {}", address, e)))
}

fn parse_coin(value: &str) -> Result<Coin, BuilderError> {
	value
		.parse()
		.map_err(|e: anytx_types::CoinError| BuilderError::InvalidInput(e.to_string()))
}

impl Message {
	pub fn kind(&self) -> &'static str {
		match self {
			Message::Send { .. } => "send",
			Message::Delegate { .. } => "delegate",
			Message::Undelegate { .. } => "undelegate",
			Message::Redelegate { .. } => "redelegate",
		}
	}

	/// Interprets a call as one message.
	///
	/// - `send`: `contract` is the recipient, `args` are coins
	/// - `delegate` / `undelegate`: `contract` is the validator, `args` is one coin
	/// - `redelegate`: `contract` is the source validator, `args` are the
	///   destination validator and one coin
	pub fn from_call(call: &ContractCall) -> Result<Self, BuilderError> {
		let single_coin = |args: &[String]| match args {
			[coin] => parse_coin(coin),
			_ => Err(BuilderError::InvalidInput(format!(
				"{} takes exactly one coin argument, got {}",
				call.function,
				args.len()
			))),
		};

		match call.function.as_str() {
			"send" => {
				if call.args.is_empty() {
					return Err(BuilderError::InvalidInput(
						"send needs at least one coin".to_string(),
					));
				}
				Ok(Message::Send {
					from: call.from.clone(),
					to: call.contract.clone(),
					amount: call
						.args
						.iter()
						.map(|c| parse_coin(c))
						.collect::<Result<_, _>>()?,
				})
			},
			"delegate" => Ok(Message::Delegate {
				delegator: call.from.clone(),
				validator: call.contract.clone(),
				amount: single_coin(&call.args)?,
			}),
			"undelegate" => Ok(Message::Undelegate {
				delegator: call.from.clone(),
				validator: call.contract.clone(),
				amount: single_coin(&call.args)?,
			}),
			"redelegate" => match call.args.as_slice() {
				[dst, coin] => Ok(Message::Redelegate {
					delegator: call.from.clone(),
					validator_src: call.contract.clone(),
					validator_dst: dst.clone(),
					amount: parse_coin(coin)?,
				}),
				_ => Err(BuilderError::InvalidInput(
					"redelegate takes a destination validator and a coin".to_string(),
				)),
			},
			other => Err(BuilderError::Resolution(format!(
				"Unknown message kind '{}', expected one of {}",
				other,
				MESSAGE_KINDS.join(", ")
			))),
		}
	}

	/// Packs the message into an `Any`.
	pub fn to_any(&self) -> Result<Any, BuilderError> {
		let packed = match self {
			Message::Send { from, to, amount } => MsgSend {
				from_address: account_id(from)?,
				to_address: account_id(to)?,
				amount: amount.iter().map(to_chain_coin).collect::<Result<_, _>>()?,
			}
			.to_any(),
			Message::Delegate {
				delegator,
				validator,
				amount,
			} => MsgDelegate {
				delegator_address: account_id(delegator)?,
				validator_address: account_id(validator)?,
				amount: to_chain_coin(amount)?,
			}
			.to_any(),
			Message::Undelegate {
				delegator,
				validator,
				amount,
			} => MsgUndelegate {
				delegator_address: account_id(delegator)?,
				validator_address: account_id(validator)?,
				amount: to_chain_coin(amount)?,
			}
			.to_any(),
			Message::Redelegate {
				delegator,
				validator_src,
				validator_dst,
				amount,
			} => MsgBeginRedelegate {
				delegator_address: account_id(delegator)?,
				validator_src_address: account_id(validator_src)?,
				validator_dst_address: account_id(validator_dst)?,
				amount: to_chain_coin(amount)?,
			}
			.to_any(),
		};

		packed.map_err(|e| {
			BuilderError::InvalidInput(format!("Cannot encode {} message: {}", self.kind(), e))
		})
	}
}

//! Polygon (POL) staking on Ethereum mainnet.
//!
//! Delegation goes through a validator's share contract. Staking needs an
//! allowance for the stake manager on the POL token first.

use super::{EvmBuilder, EvmTransaction};
use crate::BuilderError;
use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{address, Address, U256};
use anytx_types::GasLimit;

/// POL token contract.
pub const POL_TOKEN: Address = address!("44499312f493F62f2DFd3C6435Ca3603EbFCeeBa");

/// Polygon stake manager proxy, the spender of staked POL.
pub const STAKE_MANAGER: Address = address!("4AE8f648B1Ec892B6cc68C89cc088583964d08bE");

impl EvmBuilder {
	async fn validator_share_call(
		&self,
		from: Address,
		validator_share: Address,
		function: &str,
		args: Vec<DynSolValue>,
	) -> Result<EvmTransaction, BuilderError> {
		self.build_call_with_values(
			from,
			validator_share,
			function,
			args,
			U256::ZERO,
			GasLimit::Auto,
		)
		.await
	}

	/// Allows the stake manager to pull `amount` POL from `from`.
	pub async fn build_pol_allowance_transaction(
		&self,
		from: Address,
		amount: U256,
	) -> Result<EvmTransaction, BuilderError> {
		self.build_allowance_transaction(from, POL_TOKEN, STAKE_MANAGER, amount)
			.await
	}

	/// `buyVoucherPOL(amount, 0)`: delegate `amount` POL.
	pub async fn build_polygon_stake_transaction(
		&self,
		from: Address,
		validator_share: Address,
		amount: U256,
	) -> Result<EvmTransaction, BuilderError> {
		self.validator_share_call(
			from,
			validator_share,
			"buyVoucherPOL",
			vec![DynSolValue::Uint(amount, 256), DynSolValue::Uint(U256::ZERO, 256)],
		)
		.await
	}

	/// `sellVoucher_newPOL(amount, amount)`: start unbonding `amount` POL.
	pub async fn build_polygon_unstake_transaction(
		&self,
		from: Address,
		validator_share: Address,
		amount: U256,
	) -> Result<EvmTransaction, BuilderError> {
		self.validator_share_call(
			from,
			validator_share,
			"sellVoucher_newPOL",
			vec![DynSolValue::Uint(amount, 256), DynSolValue::Uint(amount, 256)],
		)
		.await
	}

	/// `restake()`: delegate accrued rewards.
	pub async fn build_polygon_restake_transaction(
		&self,
		from: Address,
		validator_share: Address,
	) -> Result<EvmTransaction, BuilderError> {
		self.validator_share_call(from, validator_share, "restake", vec![])
			.await
	}

	/// `withdrawRewardsPOL()`.
	pub async fn build_polygon_withdraw_rewards_transaction(
		&self,
		from: Address,
		validator_share: Address,
	) -> Result<EvmTransaction, BuilderError> {
		self.validator_share_call(from, validator_share, "withdrawRewardsPOL", vec![])
			.await
	}

	/// Unclaimed rewards of `delegator`, in wei.
	pub async fn polygon_liquid_rewards(
		&self,
		validator_share: Address,
		delegator: Address,
	) -> Result<U256, BuilderError> {
		let outputs = self
			.call_with_values(
				validator_share,
				"getLiquidRewards",
				vec![DynSolValue::Address(delegator)],
			)
			.await?;

		match outputs.first() {
			Some(DynSolValue::Uint(rewards, _)) => Ok(*rewards),
			other => Err(BuilderError::Transport(format!(
				"Unexpected getLiquidRewards output: {:?}",
				other
			))),
		}
	}
}

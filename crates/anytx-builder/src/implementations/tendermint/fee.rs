//! Transaction options and fee arithmetic.

use super::messages::{to_chain_coin, Message};
use crate::BuilderError;
use anytx_types::{Coin, GasLimit};
use cosmrs::tx::Body;
use cosmrs::tendermint::block::Height;

pub const DEFAULT_GAS_ADJUSTMENT: f64 = 1.2;

/// Fee charged when no gas price is known.
pub const FALLBACK_FEE_AMOUNT: u64 = 3000;

/// Everything that goes into one transaction besides the signer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TxOptions {
	pub msgs: Vec<Message>,
	pub memo: String,
	pub gas: GasLimit,
	/// Overrides the configured gas price.
	pub gas_prices: Option<Coin>,
	/// Overrides the configured adjustment.
	pub gas_adjustment: Option<f64>,
	pub timeout_height: u64,
}

impl TxOptions {
	pub fn new(msgs: Vec<Message>) -> Self {
		Self {
			msgs,
			..Default::default()
		}
	}

	pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
		self.memo = memo.into();
		self
	}

	pub fn with_gas(mut self, gas: GasLimit) -> Self {
		self.gas = gas;
		self
	}

	pub fn with_gas_prices(mut self, price: Coin) -> Self {
		self.gas_prices = Some(price);
		self
	}

	pub fn with_gas_adjustment(mut self, adjustment: f64) -> Self {
		self.gas_adjustment = Some(adjustment);
		self
	}

	pub fn with_timeout_height(mut self, height: u64) -> Self {
		self.timeout_height = height;
		self
	}

	/// The transaction body carrying these messages, memo and timeout.
	pub fn body(&self) -> Result<Body, BuilderError> {
		let messages = self
			.msgs
			.iter()
			.map(Message::to_any)
			.collect::<Result<Vec<_>, _>>()?;
		let timeout_height = Height::try_from(self.timeout_height).map_err(|e| {
			BuilderError::InvalidInput(format!(
				"Invalid timeout height {}: {}",
				self.timeout_height, e
			))
		})?;
		Ok(Body::new(messages, self.memo.clone(), timeout_height))
	}
}

/// Simulated gas scaled by `adjustment`, rounded down. The adjustment must
/// be a positive finite number.
pub fn adjusted_gas(gas_used: u64, adjustment: f64) -> Result<u64, BuilderError> {
	if !adjustment.is_finite() || adjustment <= 0.0 {
		return Err(BuilderError::InvalidInput(format!(
			"Gas adjustment must be a positive number, got {}",
			adjustment
		)));
	}
	Ok((gas_used as f64 * adjustment) as u64)
}

/// `gas_price × gas_limit` with the fraction dropped, or the fallback
/// amount of `denom` without a price.
pub fn fee_amount(
	gas_price: Option<&Coin>,
	gas_limit: u64,
	denom: &str,
) -> Result<Coin, BuilderError> {
	match gas_price {
		Some(price) => price
			.mul(gas_limit)
			.map(|fee| fee.truncated())
			.map_err(|e| BuilderError::InvalidInput(e.to_string())),
		None => Ok(Coin::new(FALLBACK_FEE_AMOUNT, denom)),
	}
}

/// Zero fee in `denom`, used while simulating.
pub fn empty_fee(denom: &str) -> Result<cosmrs::Coin, BuilderError> {
	to_chain_coin(&Coin::new(0u64, denom))
}

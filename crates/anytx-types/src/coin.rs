//! Denominated amounts such as `1200uatom` or `0.006uatom`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing or converting coins.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoinError {
	#[error("Invalid coin '{0}': expected <amount><denom>")]
	Format(String),
	#[error("Invalid coin amount '{0}'")]
	Amount(String),
	#[error("Coin amount overflow")]
	Overflow,
}

/// An amount of a single denomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
	pub denom: String,
	pub amount: Decimal,
}

impl Coin {
	pub fn new(amount: impl Into<Decimal>, denom: impl Into<String>) -> Self {
		Self {
			denom: denom.into(),
			amount: amount.into(),
		}
	}

	/// Multiplies the amount by a gas quantity, keeping the denomination.
	pub fn mul(&self, quantity: u64) -> Result<Coin, CoinError> {
		let amount = self
			.amount
			.checked_mul(Decimal::from(quantity))
			.ok_or(CoinError::Overflow)?;
		Ok(Coin::new(amount, self.denom.clone()))
	}

	/// Integer amount with any fractional part truncated.
	pub fn integer_amount(&self) -> Result<u128, CoinError> {
		self.amount
			.trunc()
			.to_u128()
			.ok_or_else(|| CoinError::Amount(self.amount.to_string()))
	}

	/// Same coin with the fractional part dropped.
	pub fn truncated(&self) -> Coin {
		Coin::new(self.amount.trunc(), self.denom.clone())
	}
}

impl FromStr for Coin {
	type Err = CoinError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		let split = s
			.find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
			.ok_or_else(|| CoinError::Format(s.to_string()))?;
		let (amount, denom) = s.split_at(split);

		if amount.is_empty()
			|| amount.starts_with('.')
			|| amount.ends_with('.')
			|| amount[1..].contains('-')
			|| !denom
				.chars()
				.all(|c| c.is_ascii_alphanumeric() || c == '/')
		{
			return Err(CoinError::Format(s.to_string()));
		}

		let amount =
			Decimal::from_str_exact(amount).map_err(|_| CoinError::Amount(amount.to_string()))?;
		Ok(Coin::new(amount, denom))
	}
}

impl fmt::Display for Coin {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}{}", self.amount.normalize(), self.denom)
	}
}

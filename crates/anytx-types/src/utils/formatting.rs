//! String formatting and amount scaling.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Strips a `0x` or `0X` prefix if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Renders a raw on-chain amount with `decimals` places, trimming trailing zeros.
///
/// `format_token_amount("1500000", 6)` gives `"1.5"`.
pub fn format_token_amount(amount: &str, decimals: u8) -> String {
	if decimals == 0 {
		return amount.to_string();
	}

	let decimal_places = decimals as usize;
	let (integer_part, decimal_part) = if amount.len() <= decimal_places {
		("0".to_string(), format!("{:0>width$}", amount, width = decimal_places))
	} else {
		let split_pos = amount.len() - decimal_places;
		(amount[..split_pos].to_string(), amount[split_pos..].to_string())
	};

	let decimal_trimmed = decimal_part.trim_end_matches('0');
	if decimal_trimmed.is_empty() {
		integer_part
	} else {
		format!("{}.{}", integer_part, decimal_trimmed)
	}
}

/// Scales a human readable amount into base units.
///
/// `parse_token_amount("1.5", 9)` gives `1_500_000_000`. Amounts with more
/// fractional digits than `decimals`, negative amounts and overflows are
/// rejected rather than rounded.
pub fn parse_token_amount(amount: &str, decimals: u8) -> Result<u128, String> {
	let value = Decimal::from_str_exact(amount.trim())
		.map_err(|e| format!("Invalid amount '{}': {}", amount, e))?;
	if value.is_sign_negative() {
		return Err(format!("Amount '{}' must not be negative", amount));
	}

	let scale = 10u64
		.checked_pow(u32::from(decimals))
		.map(Decimal::from)
		.ok_or_else(|| format!("Unsupported decimals {}", decimals))?;
	let scaled = value
		.checked_mul(scale)
		.ok_or_else(|| format!("Amount '{}' overflows", amount))?;

	if !scaled.fract().is_zero() {
		return Err(format!(
			"Amount '{}' has more than {} decimal places",
			amount, decimals
		));
	}

	scaled
		.to_u128()
		.ok_or_else(|| format!("Amount '{}' overflows", amount))
}

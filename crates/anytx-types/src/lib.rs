//! Shared types for the anytx transaction builder.
//!
//! Everything in here is chain-neutral: the logical call description handed
//! to a builder, fee and status reporting, key material wrappers and the
//! configuration validation framework used by every adapter.

/// Chain family selection.
pub mod chain;
/// Denominated amounts used for fees and transfers.
pub mod coin;
/// Implementation registry trait.
pub mod registry;
/// Zeroizing wrapper for key material.
pub mod secret_string;
/// Logical transaction requests, hashes, fees and broadcast status.
pub mod transaction;
/// Amount and hex formatting helpers.
pub mod utils;
/// Configuration validation.
pub mod validation;

pub use chain::ChainFamily;
pub use coin::{Coin, CoinError};
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use transaction::{
	BroadcastStatus, ContractCall, FeeEstimate, GasLimit, TransactionHash,
};
pub use utils::{format_token_amount, parse_token_amount, without_0x_prefix};
pub use validation::*;

//! Helper functions shared by the builders and the command line.

pub mod formatting;

pub use formatting::{format_token_amount, parse_token_amount, without_0x_prefix};

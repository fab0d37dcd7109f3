//! Instruction encoders for the programs the builder talks to.

use crate::BuilderError;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::{system_program, sysvar};
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Mint;

pub const STAKE_PROGRAM_ID: Pubkey = pubkey!("Stake11111111111111111111111111111111111111");
pub const STAKE_CONFIG_ID: Pubkey = pubkey!("StakeConfig11111111111111111111111111111111");
pub const MEMO_PROGRAM_ID: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// Size of a stake account.
pub const STAKE_ACCOUNT_SPACE: u64 = 200;

const STAKE_INITIALIZE: u32 = 0;
const STAKE_DELEGATE: u32 = 2;

/// Call data for a program invocation: `function:arg0arg1...`.
pub fn call_data(function: &str, args: &[String]) -> Vec<u8> {
	let mut data = Vec::with_capacity(function.len() + 1);
	data.extend_from_slice(function.as_bytes());
	data.push(b':');
	for arg in args {
		data.extend_from_slice(arg.as_bytes());
	}
	data
}

/// Invokes `program` with `from` as the only (signing, writable) account.
pub fn program_call(program: &Pubkey, from: &Pubkey, function: &str, args: &[String]) -> Instruction {
	Instruction::new_with_bytes(
		*program,
		&call_data(function, args),
		vec![AccountMeta::new(*from, true)],
	)
}

/// Memo program instruction signed by `signer`.
pub fn memo(signer: &Pubkey, text: &str) -> Instruction {
	Instruction::new_with_bytes(
		MEMO_PROGRAM_ID,
		text.as_bytes(),
		vec![AccountMeta::new_readonly(*signer, true)],
	)
}

/// `Initialize` with `authority` as both staker and withdrawer, no lockup.
pub fn initialize_stake(stake: &Pubkey, authority: &Pubkey) -> Instruction {
	let mut data = Vec::with_capacity(116);
	data.extend_from_slice(&STAKE_INITIALIZE.to_le_bytes());
	data.extend_from_slice(authority.as_ref());
	data.extend_from_slice(authority.as_ref());
	// lockup: unix timestamp, epoch, custodian
	data.extend_from_slice(&0i64.to_le_bytes());
	data.extend_from_slice(&0u64.to_le_bytes());
	data.extend_from_slice(system_program::id().as_ref());

	Instruction::new_with_bytes(
		STAKE_PROGRAM_ID,
		&data,
		vec![
			AccountMeta::new(*stake, false),
			AccountMeta::new_readonly(sysvar::rent::id(), false),
		],
	)
}

/// `DelegateStake` of `stake` to `vote`, authorized by `authority`.
pub fn delegate_stake(stake: &Pubkey, vote: &Pubkey, authority: &Pubkey) -> Instruction {
	Instruction::new_with_bytes(
		STAKE_PROGRAM_ID,
		&STAKE_DELEGATE.to_le_bytes(),
		vec![
			AccountMeta::new(*stake, false),
			AccountMeta::new_readonly(*vote, false),
			AccountMeta::new_readonly(sysvar::clock::id(), false),
			AccountMeta::new_readonly(sysvar::stake_history::id(), false),
			AccountMeta::new_readonly(STAKE_CONFIG_ID, false),
			AccountMeta::new_readonly(*authority, true),
		],
	)
}

/// Associated token account of `wallet` for `mint`.
pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
	spl_associated_token_account::get_associated_token_address(wallet, mint)
}

/// SPL `TransferChecked` between two token accounts owned by the token
/// program.
pub fn transfer_checked(
	source: &Pubkey,
	mint: &Pubkey,
	destination: &Pubkey,
	owner: &Pubkey,
	amount: u64,
	decimals: u8,
) -> Result<Instruction, BuilderError> {
	spl_token::instruction::transfer_checked(
		&spl_token::id(),
		source,
		mint,
		destination,
		owner,
		&[],
		amount,
		decimals,
	)
	.map_err(|e| BuilderError::InvalidInput(format!("Invalid token transfer: {}", e)))
}

/// Decimals of an initialized SPL mint, `None` for any other account data.
pub fn mint_decimals(data: &[u8]) -> Option<u8> {
	Mint::unpack(data).ok().map(|mint| mint.decimals)
}

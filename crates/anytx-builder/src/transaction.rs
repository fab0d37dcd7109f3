//! Chain-specific transactions as they move from build to broadcast.

use crate::implementations::evm::EvmTransaction;
use crate::implementations::tendermint::TendermintTransaction;
use crate::BuilderError;
use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::{Decodable2718, Encodable2718};
use anytx_account::EphemeralKey;
use anytx_types::ChainFamily;
use base64::Engine;
use solana_sdk::transaction::Transaction as SolanaTransaction;

/// A built transaction, not yet signed.
#[derive(Debug, Clone, PartialEq)]
pub enum UnsignedTransaction {
	Evm(EvmTransaction),
	/// Message with recent blockhash and fee payer set, signatures zeroed.
	Solana(SolanaTransaction),
	Tendermint(TendermintTransaction),
}

impl UnsignedTransaction {
	pub fn family(&self) -> ChainFamily {
		match self {
			UnsignedTransaction::Evm(_) => ChainFamily::Evm,
			UnsignedTransaction::Solana(_) => ChainFamily::Solana,
			UnsignedTransaction::Tendermint(_) => ChainFamily::Tendermint,
		}
	}

	/// Human readable summary of the logical fields.
	pub fn describe(&self) -> serde_json::Value {
		match self {
			UnsignedTransaction::Evm(tx) => tx.describe(),
			UnsignedTransaction::Solana(tx) => describe_solana(tx),
			UnsignedTransaction::Tendermint(tx) => tx.describe(),
		}
	}
}

/// A transaction carrying every signature it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum SignedTransaction {
	/// EIP-2718 typed envelope.
	Evm(TxEnvelope),
	Solana(SolanaTransaction),
	Tendermint(TendermintTransaction),
}

impl SignedTransaction {
	pub fn family(&self) -> ChainFamily {
		match self {
			SignedTransaction::Evm(_) => ChainFamily::Evm,
			SignedTransaction::Solana(_) => ChainFamily::Solana,
			SignedTransaction::Tendermint(_) => ChainFamily::Tendermint,
		}
	}

	/// Canonical wire bytes: the 2718 envelope, the bincode transaction or
	/// the protobuf `TxRaw`.
	pub fn to_bytes(&self) -> Result<Vec<u8>, BuilderError> {
		match self {
			SignedTransaction::Evm(envelope) => Ok(envelope.encoded_2718()),
			SignedTransaction::Solana(tx) => bincode::serialize(tx)
				.map_err(|e| BuilderError::InvalidInput(format!("Cannot serialize transaction: {}", e))),
			SignedTransaction::Tendermint(tx) => Ok(tx.to_bytes()),
		}
	}

	/// Parses wire bytes produced by [`SignedTransaction::to_bytes`].
	///
	/// Tendermint bytes do not carry the chain id, account number or
	/// sequence used for signing, so those come back empty.
	pub fn from_bytes(family: ChainFamily, bytes: &[u8]) -> Result<Self, BuilderError> {
		match family {
			ChainFamily::Evm => TxEnvelope::decode_2718(&mut &bytes[..])
				.map(SignedTransaction::Evm)
				.map_err(|e| BuilderError::InvalidInput(format!("Invalid EVM transaction: {}", e))),
			ChainFamily::Solana => bincode::deserialize(bytes)
				.map(SignedTransaction::Solana)
				.map_err(|e| BuilderError::InvalidInput(format!("Invalid Solana transaction: {}", e))),
			ChainFamily::Tendermint => {
				TendermintTransaction::from_raw_bytes(bytes).map(SignedTransaction::Tendermint)
			},
		}
	}

	pub fn to_hex(&self) -> Result<String, BuilderError> {
		self.to_bytes().map(hex::encode)
	}

	pub fn to_base64(&self) -> Result<String, BuilderError> {
		self.to_bytes()
			.map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
	}
}

/// Result of a build that generated keys of its own.
///
/// Every key in `ephemeral_signers` must co-sign the transaction. They exist
/// only here; dropping them before signing leaves the transaction
/// unsignable.
#[derive(Debug)]
pub struct BuiltTransaction {
	pub transaction: UnsignedTransaction,
	pub ephemeral_signers: Vec<EphemeralKey>,
}

impl BuiltTransaction {
	pub fn new(transaction: UnsignedTransaction) -> Self {
		Self {
			transaction,
			ephemeral_signers: Vec::new(),
		}
	}

	pub fn with_ephemeral_signer(mut self, key: EphemeralKey) -> Self {
		self.ephemeral_signers.push(key);
		self
	}
}

fn describe_solana(tx: &SolanaTransaction) -> serde_json::Value {
	let keys = &tx.message.account_keys;
	let instructions: Vec<_> = tx
		.message
		.instructions
		.iter()
		.map(|ix| {
			serde_json::json!({
				"program_id": keys
					.get(usize::from(ix.program_id_index))
					.map(|k| k.to_string()),
				"accounts": ix
					.accounts
					.iter()
					.filter_map(|i| keys.get(usize::from(*i)).map(|k| k.to_string()))
					.collect::<Vec<_>>(),
				"data": hex::encode(&ix.data),
			})
		})
		.collect();

	serde_json::json!({
		"fee_payer": keys.first().map(|k| k.to_string()),
		"recent_blockhash": tx.message.recent_blockhash.to_string(),
		"required_signatures": tx.message.header.num_required_signatures,
		"instructions": instructions,
	})
}

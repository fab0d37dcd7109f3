//! Solana RPC methods used by the builder.

use crate::BuilderError;
use async_trait::async_trait;
use serde_json::json;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::{RpcError, RpcRequest};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

/// Remote Solana node.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SolanaNode: Send + Sync {
	async fn latest_blockhash(&self) -> Result<Hash, BuilderError>;

	/// Submits a signed transaction and returns its first signature.
	async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, BuilderError>;

	/// Whether the node can find a transaction with this signature.
	async fn transaction_exists(&self, signature: Signature) -> Result<bool, BuilderError>;

	/// Raw account data, `None` if the account does not exist.
	async fn account_data(&self, pubkey: Pubkey) -> Result<Option<Vec<u8>>, BuilderError>;
}

/// [`SolanaNode`] backed by the nonblocking RPC client.
pub struct RpcNode(RpcClient);

impl RpcNode {
	pub fn new(url: impl Into<String>) -> Self {
		Self(RpcClient::new_with_commitment(
			url.into(),
			CommitmentConfig::finalized(),
		))
	}
}

/// Errors the node answered with become rejections, everything else is
/// transport.
fn rejection_or_transport(context: &str, err: ClientError) -> BuilderError {
	match err.kind() {
		ClientErrorKind::RpcError(RpcError::RpcResponseError { code, message, .. }) => {
			BuilderError::Rejected(format!("{} ({})", message, code))
		},
		_ => transport(context, err),
	}
}

fn transport(context: &str, err: ClientError) -> BuilderError {
	BuilderError::Transport(format!("{} failed: {}", context, err))
}

#[async_trait]
impl SolanaNode for RpcNode {
	async fn latest_blockhash(&self) -> Result<Hash, BuilderError> {
		let (hash, _last_valid_height) = self
			.0
			.get_latest_blockhash_with_commitment(CommitmentConfig::finalized())
			.await
			.map_err(|e| transport("getLatestBlockhash", e))?;
		Ok(hash)
	}

	async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, BuilderError> {
		self.0
			.send_transaction(transaction)
			.await
			.map_err(|e| rejection_or_transport("sendTransaction", e))
	}

	async fn transaction_exists(&self, signature: Signature) -> Result<bool, BuilderError> {
		// The typed `get_transaction` treats a null result as a decode error,
		// so ask for the raw value instead.
		let result: Option<serde_json::Value> = self
			.0
			.send(
				RpcRequest::GetTransaction,
				json!([
					signature.to_string(),
					{ "encoding": "json", "maxSupportedTransactionVersion": 0 }
				]),
			)
			.await
			.map_err(|e| transport("getTransaction", e))?;
		Ok(result.is_some_and(|tx| !tx.is_null()))
	}

	async fn account_data(&self, pubkey: Pubkey) -> Result<Option<Vec<u8>>, BuilderError> {
		let account = self
			.0
			.get_account_with_commitment(&pubkey, CommitmentConfig::finalized())
			.await
			.map_err(|e| transport("getAccountInfo", e))?
			.value;
		Ok(account.map(|account| account.data))
	}
}

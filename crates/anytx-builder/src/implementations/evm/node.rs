//! The slice of the Ethereum JSON-RPC surface the EVM builder reads from.

use crate::BuilderError;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportError;
use async_trait::async_trait;

/// Remote EVM node.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EvmNode: Send + Sync {
	/// Number of transactions sent from `address`, i.e. its next nonce.
	async fn transaction_count(&self, address: Address) -> Result<u64, BuilderError>;

	/// Base fee of the latest block.
	async fn base_fee_per_gas(&self) -> Result<u128, BuilderError>;

	async fn max_priority_fee_per_gas(&self) -> Result<u128, BuilderError>;

	/// Simulates `request`. A revert is reported as
	/// [`BuilderError::ContractExecution`].
	async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, BuilderError>;

	/// Executes `request` read-only against the latest block.
	async fn call(&self, request: TransactionRequest) -> Result<Bytes, BuilderError>;

	async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, BuilderError>;

	/// Receipt status for `hash`: `None` while no receipt exists.
	async fn receipt_status(&self, hash: B256) -> Result<Option<bool>, BuilderError>;
}

/// [`EvmNode`] over an alloy HTTP provider.
pub struct AlloyNode {
	provider: DynProvider,
}

impl AlloyNode {
	pub fn new(rpc_url: &str) -> Result<Self, BuilderError> {
		let url = rpc_url
			.parse()
			.map_err(|e| BuilderError::Configuration(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;

		// Nonce, fees and gas are filled by the builder itself.
		let provider = ProviderBuilder::new()
			.disable_recommended_fillers()
			.connect_http(url)
			.erased();

		Ok(Self { provider })
	}
}

/// Maps an RPC failure, keeping revert messages apart from transport errors.
fn rpc_error(context: &str, err: TransportError) -> BuilderError {
	if let Some(payload) = err.as_error_resp() {
		if payload.message.to_lowercase().contains("revert") {
			return BuilderError::ContractExecution(payload.message.to_string());
		}
	}
	BuilderError::Transport(format!("{}: {}", context, err))
}

#[async_trait]
impl EvmNode for AlloyNode {
	async fn transaction_count(&self, address: Address) -> Result<u64, BuilderError> {
		self.provider
			.get_transaction_count(address)
			.await
			.map_err(|e| BuilderError::Transport(format!("Failed to get nonce: {}", e)))
	}

	async fn base_fee_per_gas(&self) -> Result<u128, BuilderError> {
		let block = self
			.provider
			.get_block_by_number(BlockNumberOrTag::Latest)
			.await
			.map_err(|e| BuilderError::Transport(format!("Failed to get latest block: {}", e)))?
			.ok_or_else(|| BuilderError::Transport("Latest block not available".to_string()))?;

		block
			.header
			.base_fee_per_gas
			.map(u128::from)
			.ok_or_else(|| BuilderError::Transport("Latest block has no base fee".to_string()))
	}

	async fn max_priority_fee_per_gas(&self) -> Result<u128, BuilderError> {
		self.provider
			.get_max_priority_fee_per_gas()
			.await
			.map_err(|e| BuilderError::Transport(format!("Failed to get priority fee: {}", e)))
	}

	async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, BuilderError> {
		self.provider
			.estimate_gas(request)
			.await
			.map_err(|e| rpc_error("Failed to estimate gas", e))
	}

	async fn call(&self, request: TransactionRequest) -> Result<Bytes, BuilderError> {
		self.provider
			.call(request)
			.await
			.map_err(|e| rpc_error("Call failed", e))
	}

	async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, BuilderError> {
		let pending = self
			.provider
			.send_raw_transaction(&raw)
			.await
			.map_err(|e| match e.as_error_resp() {
				Some(payload) => BuilderError::Rejected(payload.message.to_string()),
				None => BuilderError::Transport(format!("Failed to send transaction: {}", e)),
			})?;
		Ok(*pending.tx_hash())
	}

	async fn receipt_status(&self, hash: B256) -> Result<Option<bool>, BuilderError> {
		self.provider
			.get_transaction_receipt(hash)
			.await
			.map(|receipt| receipt.map(|r| r.status()))
			.map_err(|e| BuilderError::Transport(format!("Failed to get receipt: {}", e)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_invalid_url_is_configuration_error() {
		assert!(matches!(
			AlloyNode::new("not a url"),
			Err(BuilderError::Configuration(_))
		));
	}

	#[test]
	fn test_valid_url_builds_provider() {
		assert!(AlloyNode::new("http://localhost:8545").is_ok());
	}
}

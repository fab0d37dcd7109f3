//! Contract ABI lookup, argument coercion and output rendering.
//!
//! ABIs are looked up in storage first, keyed by the lowercase contract
//! address, and fetched from a block explorer on a miss. A fetched ABI is
//! stored before it is returned so the explorer is asked at most once per
//! contract.

use crate::BuilderError;
use alloy::dyn_abi::{DynSolValue, Specifier};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::Address;
use anytx_storage::{StorageError, StorageService};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const ABI_NAMESPACE: &str = "abi";

const MAINNET_EXPLORER: &str = "https://api.etherscan.io/api";
const SEPOLIA_EXPLORER: &str = "https://api-sepolia.etherscan.io/api";

/// Remote source of contract ABIs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AbiSource: Send + Sync {
	/// Returns the ABI of `address` as a JSON string.
	async fn fetch_abi(&self, address: &str) -> Result<String, BuilderError>;
}

/// Etherscan-compatible `getabi` endpoint.
pub struct ExplorerClient {
	client: reqwest::Client,
	base_url: String,
	api_key: Option<String>,
}

#[derive(Deserialize)]
struct ExplorerResponse {
	status: String,
	#[serde(default)]
	message: String,
	result: serde_json::Value,
}

impl ExplorerClient {
	pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url: base_url.into(),
			api_key,
		}
	}

	/// `"dev"` selects the Sepolia explorer, anything else mainnet.
	pub fn for_environment(environment: &str, api_key: Option<String>) -> Self {
		let base_url = if environment == "dev" {
			SEPOLIA_EXPLORER
		} else {
			MAINNET_EXPLORER
		};
		Self::new(base_url, api_key)
	}
}

#[async_trait]
impl AbiSource for ExplorerClient {
	async fn fetch_abi(&self, address: &str) -> Result<String, BuilderError> {
		let api_key = self.api_key.as_deref().ok_or_else(|| {
			BuilderError::Resolution(format!(
				"ABI for {} is not cached and no explorer API key is configured",
				address
			))
		})?;

		let response: ExplorerResponse = self
			.client
			.get(&self.base_url)
			.query(&[
				("module", "contract"),
				("action", "getabi"),
				("address", address),
				("apikey", api_key),
			])
			.send()
			.await
			.map_err(|e| BuilderError::Transport(format!("Explorer request failed: {}", e)))?
			.json()
			.await
			.map_err(|e| BuilderError::Transport(format!("Invalid explorer response: {}", e)))?;

		match (response.status.as_str(), response.result) {
			("1", serde_json::Value::String(abi)) => Ok(abi),
			(_, result) => Err(BuilderError::Resolution(format!(
				"Explorer has no ABI for {}: {} {}",
				address, response.message, result
			))),
		}
	}
}

/// Cache-then-explorer ABI lookup.
pub struct AbiResolver {
	storage: Arc<StorageService>,
	source: Box<dyn AbiSource>,
}

impl AbiResolver {
	pub fn new(storage: Arc<StorageService>, source: Box<dyn AbiSource>) -> Self {
		Self { storage, source }
	}

	/// Cache key for a contract: its lowercase `0x` address.
	pub fn cache_key(contract: &Address) -> String {
		format!("0x{}", hex::encode(contract))
	}

	/// Raw ABI JSON for `contract`.
	pub async fn resolve_json(&self, contract: &Address) -> Result<serde_json::Value, BuilderError> {
		let key = Self::cache_key(contract);

		match self.storage.retrieve::<serde_json::Value>(ABI_NAMESPACE, &key).await {
			Ok(abi) => return Ok(abi),
			Err(StorageError::NotFound) => {},
			Err(e) => {
				tracing::warn!(contract = %key, error = %e, "Cached ABI unreadable, refetching");
			},
		}

		let raw = self.source.fetch_abi(&key).await?;
		let abi: serde_json::Value = serde_json::from_str(&raw)
			.map_err(|e| BuilderError::Resolution(format!("Invalid ABI for {}: {}", key, e)))?;
		// Reject anything that does not parse as an ABI before caching it.
		serde_json::from_value::<JsonAbi>(abi.clone())
			.map_err(|e| BuilderError::Resolution(format!("Invalid ABI for {}: {}", key, e)))?;

		if let Err(e) = self.storage.store(ABI_NAMESPACE, &key, &abi).await {
			tracing::warn!(contract = %key, error = %e, "Failed to cache ABI");
		} else {
			tracing::debug!(contract = %key, "Cached ABI");
		}

		Ok(abi)
	}

	/// Parsed ABI for `contract`.
	pub async fn resolve(&self, contract: &Address) -> Result<JsonAbi, BuilderError> {
		let json = self.resolve_json(contract).await?;
		serde_json::from_value(json).map_err(|e| {
			BuilderError::Resolution(format!(
				"Invalid ABI for {}: {}",
				Self::cache_key(contract),
				e
			))
		})
	}
}

/// Finds `name` in `abi`. Overloads are told apart by argument count.
pub fn select_function<'a>(
	abi: &'a JsonAbi,
	name: &str,
	arity: usize,
) -> Result<&'a Function, BuilderError> {
	let overloads = abi
		.function(name)
		.ok_or_else(|| BuilderError::Resolution(format!("Function '{}' not found in ABI", name)))?;

	overloads
		.iter()
		.find(|f| f.inputs.len() == arity)
		.ok_or_else(|| {
			BuilderError::InvalidInput(format!(
				"Function '{}' takes {} arguments, got {}",
				name,
				overloads
					.iter()
					.map(|f| f.inputs.len().to_string())
					.collect::<Vec<_>>()
					.join(" or "),
				arity
			))
		})
}

/// Parses textual arguments into the types `function` declares.
pub fn coerce_args(function: &Function, args: &[String]) -> Result<Vec<DynSolValue>, BuilderError> {
	function
		.inputs
		.iter()
		.zip(args)
		.map(|(param, arg)| {
			let ty = param.resolve().map_err(|e| {
				BuilderError::Resolution(format!("Unsupported parameter type {}: {}", param.ty, e))
			})?;
			ty.coerce_str(arg).map_err(|e| {
				BuilderError::InvalidInput(format!(
					"Argument '{}' is not a valid {}: {}",
					arg, param.ty, e
				))
			})
		})
		.collect()
}

/// Renders decoded values as JSON. Integers become decimal strings.
pub fn value_to_json(value: &DynSolValue) -> serde_json::Value {
	use serde_json::Value;

	match value {
		DynSolValue::Bool(b) => Value::Bool(*b),
		DynSolValue::Int(i, _) => Value::String(i.to_string()),
		DynSolValue::Uint(u, _) => Value::String(u.to_string()),
		DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
		DynSolValue::FixedBytes(word, size) => {
			Value::String(format!("0x{}", hex::encode(&word[..*size])))
		},
		DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
		DynSolValue::String(s) => Value::String(s.clone()),
		DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
			Value::Array(items.iter().map(value_to_json).collect())
		},
		DynSolValue::Function(f) => Value::String(format!("0x{}", hex::encode(f.as_slice()))),
		#[allow(unreachable_patterns)]
		_ => Value::Null,
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use alloy::primitives::U256;
	use anytx_storage::implementations::memory::MemoryStorage;

	pub(crate) const ERC20_ABI: &str = r#"[
		{"type":"function","name":"approve","stateMutability":"nonpayable",
		 "inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],
		 "outputs":[{"name":"","type":"bool"}]},
		{"type":"function","name":"allowance","stateMutability":"view",
		 "inputs":[{"name":"owner","type":"address"},{"name":"spender","type":"address"}],
		 "outputs":[{"name":"","type":"uint256"}]},
		{"type":"function","name":"buyVoucherPOL","stateMutability":"nonpayable",
		 "inputs":[{"name":"_amount","type":"uint256"},{"name":"_minSharesToMint","type":"uint256"}],
		 "outputs":[{"name":"amountToDeposit","type":"uint256"}]},
		{"type":"function","name":"sellVoucher_newPOL","stateMutability":"nonpayable",
		 "inputs":[{"name":"claimAmount","type":"uint256"},{"name":"maximumSharesToBurn","type":"uint256"}],
		 "outputs":[]},
		{"type":"function","name":"restake","stateMutability":"nonpayable","inputs":[],
		 "outputs":[{"name":"","type":"uint256"},{"name":"","type":"uint256"}]},
		{"type":"function","name":"withdrawRewardsPOL","stateMutability":"nonpayable","inputs":[],"outputs":[]},
		{"type":"function","name":"getLiquidRewards","stateMutability":"view",
		 "inputs":[{"name":"user","type":"address"}],
		 "outputs":[{"name":"","type":"uint256"}]}
	]"#;

	fn storage() -> Arc<StorageService> {
		Arc::new(StorageService::new(Box::new(MemoryStorage::default())))
	}

	fn contract() -> Address {
		"0x44499312f493F62f2DFd3C6435Ca3603EbFCeeBa".parse().unwrap()
	}

	#[tokio::test]
	async fn test_explorer_consulted_once_then_cached() {
		let mut source = MockAbiSource::new();
		source
			.expect_fetch_abi()
			.withf(|address| address.eq_ignore_ascii_case("0x44499312f493f62f2dfd3c6435ca3603ebfceeba"))
			.times(1)
			.returning(|_| Ok(ERC20_ABI.to_string()));

		let storage = storage();
		let resolver = AbiResolver::new(storage.clone(), Box::new(source));

		let first = resolver.resolve(&contract()).await.unwrap();
		let second = resolver.resolve(&contract()).await.unwrap();
		assert_eq!(first, second);
		assert!(storage
			.exists("abi", "0x44499312f493f62f2dfd3c6435ca3603ebfceeba")
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_missing_everywhere_is_resolution_error() {
		let mut source = MockAbiSource::new();
		source
			.expect_fetch_abi()
			.returning(|_| Err(BuilderError::Resolution("Contract source code not verified".into())));

		let resolver = AbiResolver::new(storage(), Box::new(source));
		assert!(matches!(
			resolver.resolve(&contract()).await,
			Err(BuilderError::Resolution(_))
		));
	}

	#[tokio::test]
	async fn test_malformed_abi_is_not_cached() {
		let mut source = MockAbiSource::new();
		source
			.expect_fetch_abi()
			.times(1)
			.returning(|_| Ok("{\"not\": \"an abi\"}".to_string()));

		let storage = storage();
		let resolver = AbiResolver::new(storage.clone(), Box::new(source));
		assert!(resolver.resolve(&contract()).await.is_err());
		assert!(!storage
			.exists("abi", &AbiResolver::cache_key(&contract()))
			.await
			.unwrap());
	}

	#[test]
	fn test_select_and_coerce() {
		let abi: JsonAbi = serde_json::from_str(ERC20_ABI).unwrap();
		let approve = select_function(&abi, "approve", 2).unwrap();
		let values = coerce_args(
			approve,
			&[
				"0x4AE8f648B1Ec892B6cc68C89cc088583964d08bE".to_string(),
				"1000".to_string(),
			],
		)
		.unwrap();
		assert_eq!(values[1], DynSolValue::Uint(U256::from(1000), 256));

		assert!(matches!(
			select_function(&abi, "transferFrom", 3),
			Err(BuilderError::Resolution(_))
		));
		assert!(matches!(
			select_function(&abi, "approve", 1),
			Err(BuilderError::InvalidInput(_))
		));
		assert!(matches!(
			coerce_args(approve, &["0x1234".to_string(), "1".to_string()]),
			Err(BuilderError::InvalidInput(_))
		));
	}

	#[test]
	fn test_value_to_json() {
		let value = DynSolValue::Tuple(vec![
			DynSolValue::Uint(U256::from(42u64), 256),
			DynSolValue::Bool(true),
			DynSolValue::Bytes(vec![0xab, 0xcd]),
		]);
		assert_eq!(
			value_to_json(&value),
			serde_json::json!(["42", true, "0xabcd"])
		);
	}

	#[test]
	fn test_explorer_environment() {
		assert_eq!(ExplorerClient::for_environment("dev", None).base_url, SEPOLIA_EXPLORER);
		assert_eq!(ExplorerClient::for_environment("prod", None).base_url, MAINNET_EXPLORER);
	}
}

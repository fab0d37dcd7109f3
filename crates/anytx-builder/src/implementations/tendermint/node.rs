//! Cosmos SDK REST (LCD) endpoints used by the builder.

use crate::BuilderError;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

/// Sender state needed to sign.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccountInfo {
	pub account_number: u64,
	pub sequence: u64,
	/// Compressed secp256k1 key, absent until the account first signs.
	pub public_key: Option<Vec<u8>>,
}

/// Execution result of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
	pub code: u32,
	pub raw_log: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LcdNode: Send + Sync {
	async fn account(&self, address: &str) -> Result<AccountInfo, BuilderError>;

	/// Simulates encoded `TxRaw` bytes and returns the gas used.
	async fn simulate(&self, tx_bytes: Vec<u8>) -> Result<u64, BuilderError>;

	/// Submits encoded `TxRaw` bytes in sync mode and returns the hash.
	async fn broadcast(&self, tx_bytes: Vec<u8>) -> Result<String, BuilderError>;

	/// `None` when the node does not know the hash.
	async fn tx_outcome(&self, hash: &str) -> Result<Option<TxOutcome>, BuilderError>;
}

/// Numbers arrive as JSON strings from the LCD.
#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
	Int(u64),
	Text(String),
}

impl Number {
	fn value(&self) -> Result<u64, BuilderError> {
		match self {
			Number::Int(n) => Ok(*n),
			Number::Text(s) => s
				.parse()
				.map_err(|e| BuilderError::Transport(format!("Invalid number '{}': {}", s, e))),
		}
	}
}

#[derive(Deserialize)]
struct PubKeyJson {
	key: String,
}

#[derive(Deserialize)]
struct BaseAccountJson {
	#[serde(default)]
	pub_key: Option<PubKeyJson>,
	account_number: Number,
	sequence: Number,
}

#[derive(Deserialize)]
struct AccountResponse {
	account: serde_json::Value,
}

#[derive(Deserialize)]
struct SimulateResponse {
	gas_info: GasInfo,
}

#[derive(Deserialize)]
struct GasInfo {
	gas_used: Number,
}

#[derive(Deserialize)]
struct TxResponseEnvelope {
	tx_response: TxResponseJson,
}

#[derive(Deserialize)]
struct TxResponseJson {
	txhash: String,
	#[serde(default)]
	code: u32,
	#[serde(default)]
	raw_log: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
	#[serde(default)]
	code: i64,
	message: String,
}

/// Finds the base account inside plain, module and vesting account JSON.
fn base_account(account: &serde_json::Value) -> Option<&serde_json::Value> {
	if account.get("account_number").is_some() {
		return Some(account);
	}
	account
		.get("base_account")
		.or_else(|| account.pointer("/base_vesting_account/base_account"))
}

fn parse_account(account: &serde_json::Value) -> Result<AccountInfo, BuilderError> {
	let base = base_account(account)
		.ok_or_else(|| BuilderError::Transport(format!("Unrecognized account: {}", account)))?;
	let parsed: BaseAccountJson = serde_json::from_value(base.clone())
		.map_err(|e| BuilderError::Transport(format!("Invalid account: {}", e)))?;

	let public_key = parsed
		.pub_key
		.map(|pk| base64::engine::general_purpose::STANDARD.decode(pk.key))
		.transpose()
		.map_err(|e| BuilderError::Transport(format!("Invalid account public key: {}", e)))?;

	Ok(AccountInfo {
		account_number: parsed.account_number.value()?,
		sequence: parsed.sequence.value()?,
		public_key,
	})
}

/// [`LcdNode`] over HTTP.
pub struct LcdClient {
	client: reqwest::Client,
	base_url: String,
}

impl LcdClient {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url: base_url.into().trim_end_matches('/').to_string(),
		}
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	/// Reads the body, returning the node's error message on a non-success
	/// status.
	async fn read(response: reqwest::Response) -> Result<Result<String, ErrorResponse>, BuilderError> {
		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| BuilderError::Transport(format!("Failed to read response: {}", e)))?;

		if status.is_success() {
			return Ok(Ok(body));
		}
		let error = serde_json::from_str::<ErrorResponse>(&body).unwrap_or(ErrorResponse {
			code: i64::from(status.as_u16()),
			message: body,
		});
		Ok(Err(error))
	}

	fn decode<T: serde::de::DeserializeOwned>(body: &str, what: &str) -> Result<T, BuilderError> {
		serde_json::from_str(body)
			.map_err(|e| BuilderError::Transport(format!("Invalid {} response: {}", what, e)))
	}
}

#[async_trait]
impl LcdNode for LcdClient {
	async fn account(&self, address: &str) -> Result<AccountInfo, BuilderError> {
		let response = self
			.client
			.get(self.url(&format!("/cosmos/auth/v1beta1/accounts/{}", address)))
			.send()
			.await
			.map_err(|e| BuilderError::Transport(format!("Account request failed: {}", e)))?;

		match Self::read(response).await? {
			Ok(body) => {
				let parsed: AccountResponse = Self::decode(&body, "account")?;
				parse_account(&parsed.account)
			},
			Err(e) => Err(BuilderError::Resolution(format!(
				"Account {} not available: {}",
				address, e.message
			))),
		}
	}

	async fn simulate(&self, tx_bytes: Vec<u8>) -> Result<u64, BuilderError> {
		let body = json!({
			"tx_bytes": base64::engine::general_purpose::STANDARD.encode(tx_bytes),
		});
		let response = self
			.client
			.post(self.url("/cosmos/tx/v1beta1/simulate"))
			.json(&body)
			.send()
			.await
			.map_err(|e| BuilderError::Transport(format!("Simulation request failed: {}", e)))?;

		match Self::read(response).await? {
			Ok(body) => {
				let parsed: SimulateResponse = Self::decode(&body, "simulation")?;
				parsed.gas_info.gas_used.value()
			},
			Err(e) => Err(BuilderError::ContractExecution(e.message)),
		}
	}

	async fn broadcast(&self, tx_bytes: Vec<u8>) -> Result<String, BuilderError> {
		let body = json!({
			"tx_bytes": base64::engine::general_purpose::STANDARD.encode(tx_bytes),
			"mode": "BROADCAST_MODE_SYNC",
		});
		let response = self
			.client
			.post(self.url("/cosmos/tx/v1beta1/txs"))
			.json(&body)
			.send()
			.await
			.map_err(|e| BuilderError::Transport(format!("Broadcast request failed: {}", e)))?;

		match Self::read(response).await? {
			Ok(body) => {
				let parsed: TxResponseEnvelope = Self::decode(&body, "broadcast")?;
				let tx = parsed.tx_response;
				if tx.code != 0 {
					return Err(BuilderError::Rejected(format!(
						"code {}: {}",
						tx.code, tx.raw_log
					)));
				}
				Ok(tx.txhash)
			},
			Err(e) => Err(BuilderError::Rejected(format!("code {}: {}", e.code, e.message))),
		}
	}

	async fn tx_outcome(&self, hash: &str) -> Result<Option<TxOutcome>, BuilderError> {
		let response = self
			.client
			.get(self.url(&format!("/cosmos/tx/v1beta1/txs/{}", hash)))
			.send()
			.await
			.map_err(|e| BuilderError::Transport(format!("Status request failed: {}", e)))?;

		if response.status() == reqwest::StatusCode::NOT_FOUND {
			return Ok(None);
		}
		match Self::read(response).await? {
			Ok(body) => {
				let parsed: TxResponseEnvelope = Self::decode(&body, "transaction")?;
				Ok(Some(TxOutcome {
					code: parsed.tx_response.code,
					raw_log: parsed.tx_response.raw_log,
				}))
			},
			// gRPC NotFound surfaced through the gateway
			Err(e) if e.code == 5 => Ok(None),
			Err(e) => Err(BuilderError::Transport(e.message)),
		}
	}
}

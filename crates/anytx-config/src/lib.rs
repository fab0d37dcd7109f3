//! Configuration for the anytx command line and builder wiring.
//!
//! A configuration file names every chain the process can talk to. Each
//! `[chains.<name>]` table selects its adapter through an explicit `family`
//! key and carries the adapter specific settings, which the adapter validates
//! itself when it is constructed.
//!
//! ```toml
//! [chains.polygon]
//! family = "evm"
//! rpc_url = "${EVM_PROVIDER_URL}"
//! chain_id = 137
//! ```
//!
//! Values may reference environment variables as `${VAR}` or
//! `${VAR:-default}`, and `include = ["other.toml"]` pulls in further files
//! as long as every top-level section stays unique.

mod loader;

use anytx_types::ChainFamily;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	#[serde(default)]
	pub builder: BuilderConfig,
	#[serde(default)]
	pub storage: StorageConfig,
	/// Chain tables keyed by the name callers use to address them.
	pub chains: BTreeMap<String, toml::Value>,
}

/// Settings that apply across chains.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BuilderConfig {
	/// Chain used when a command does not name one.
	pub default_chain: Option<String>,
}

/// Storage backend used for the ABI cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	pub primary: String,
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

impl Default for StorageConfig {
	fn default() -> Self {
		let mut implementations = HashMap::new();
		implementations.insert("file".to_string(), toml::Value::Table(toml::Table::new()));
		Self {
			primary: "file".to_string(),
			implementations,
		}
	}
}

impl StorageConfig {
	/// Configuration table of the primary backend.
	pub fn primary_config(&self) -> Option<&toml::Value> {
		self.implementations.get(&self.primary)
	}
}

/// Borrowed view of one `[chains.<name>]` table.
#[derive(Debug, Clone, Copy)]
pub struct ChainEntry<'a> {
	pub name: &'a str,
	pub family: ChainFamily,
	pub config: &'a toml::Value,
}

/// Substitutes `${VAR}` and `${VAR:-default}` references.
///
/// Inputs over 1MB are refused to bound regex work.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |caps: &regex::Captures| {
		let var_name = &caps[1];
		match (std::env::var(var_name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| var_name.to_string());
				String::new()
			},
		}
	});

	if let Some(var_name) = missing {
		return Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		)));
	}

	Ok(resolved.into_owned())
}

fn chain_family(name: &str, config: &toml::Value) -> Result<ChainFamily, ConfigError> {
	config
		.get("family")
		.and_then(|v| v.as_str())
		.ok_or_else(|| ConfigError::Validation(format!("Chain '{}' must set 'family'", name)))?
		.parse()
		.map_err(|e: String| ConfigError::Validation(format!("Chain '{}': {}", name, e)))
}

impl Config {
	/// Loads a configuration file and everything it includes.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;

		loader::ConfigLoader::new(base_dir).load_config(file_name).await
	}

	/// Looks up a chain by name.
	pub fn chain(&self, name: &str) -> Result<ChainEntry<'_>, ConfigError> {
		let (name, config) = self
			.chains
			.get_key_value(name)
			.ok_or_else(|| ConfigError::Validation(format!("Unknown chain '{}'", name)))?;
		Ok(ChainEntry {
			name,
			family: chain_family(name, config)?,
			config,
		})
	}

	/// Resolves an optional chain name against `builder.default_chain`.
	pub fn chain_or_default(&self, name: Option<&str>) -> Result<ChainEntry<'_>, ConfigError> {
		match name.or(self.builder.default_chain.as_deref()) {
			Some(name) => self.chain(name),
			None => Err(ConfigError::Validation(
				"No chain given and no builder.default_chain configured".into(),
			)),
		}
	}

	/// All chains in name order.
	pub fn chain_entries(&self) -> Result<Vec<ChainEntry<'_>>, ConfigError> {
		self.chains.keys().map(|name| self.chain(name)).collect()
	}

	/// Structural checks. Adapter specific keys are checked by the adapters.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.chains.is_empty() {
			return Err(ConfigError::Validation(
				"At least one chain must be configured".into(),
			));
		}

		for (name, config) in &self.chains {
			if !config.is_table() {
				return Err(ConfigError::Validation(format!(
					"Chain '{}' must be a table",
					name
				)));
			}
			chain_family(name, config)?;
			match config.get("rpc_url").and_then(|v| v.as_str()) {
				Some(url) if !url.trim().is_empty() => {},
				_ => {
					return Err(ConfigError::Validation(format!(
						"Chain '{}' must set a non-empty 'rpc_url'",
						name
					)))
				},
			}
		}

		if let Some(default_chain) = &self.builder.default_chain {
			if !self.chains.contains_key(default_chain) {
				return Err(ConfigError::Validation(format!(
					"Default chain '{}' is not configured",
					default_chain
				)));
			}
		}

		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if self.storage.primary_config().is_none() {
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

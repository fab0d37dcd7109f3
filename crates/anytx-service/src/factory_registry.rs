//! Factory registry for storage backends and chain builders.
//!
//! Implementations register themselves by name: storage backends under the
//! name used in `[storage.implementations]`, builders under their chain
//! family. The registry is filled once and used to turn a [`Config`] into a
//! ready [`BuilderService`].

use anytx_builder::{BuilderFactory, BuilderInterface, BuilderService};
use anytx_config::Config;
use anytx_storage::{StorageFactory, StorageService};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FactoryError {
	#[error("Unknown {kind} implementation '{name}'. Available: [{available}]")]
	UnknownImplementation {
		kind: &'static str,
		name: String,
		available: String,
	},
	#[error("Failed to create {kind} '{name}': {reason}")]
	Creation {
		kind: &'static str,
		name: String,
		reason: String,
	},
	#[error(transparent)]
	Config(#[from] anytx_config::ConfigError),
}

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub builder: HashMap<String, BuilderFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			builder: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_builder(&mut self, name: impl Into<String>, factory: BuilderFactory) {
		self.builder.insert(name.into(), factory);
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Initialize the global registry with all available implementations
pub fn initialize_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in anytx_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in anytx_builder::get_all_implementations() {
			tracing::debug!("Registering builder implementation: {}", name);
			registry.register_builder(name, factory);
		}

		registry
	})
}

fn available(factories: &HashMap<String, impl Sized>) -> String {
	let mut names: Vec<&str> = factories.keys().map(String::as_str).collect();
	names.sort_unstable();
	names.join(", ")
}

impl FactoryRegistry {
	/// Creates the primary storage backend named in the config.
	pub fn build_storage(&self, config: &Config) -> Result<StorageService, FactoryError> {
		let name = &config.storage.primary;
		let factory =
			self.storage
				.get(name)
				.ok_or_else(|| FactoryError::UnknownImplementation {
					kind: "storage",
					name: name.clone(),
					available: available(&self.storage),
				})?;
		let empty = toml::Value::Table(toml::Table::new());
		let backend = factory(config.storage.primary_config().unwrap_or(&empty)).map_err(|e| {
			FactoryError::Creation {
				kind: "storage",
				name: name.clone(),
				reason: e.to_string(),
			}
		})?;
		Ok(StorageService::new(backend))
	}

	/// Creates one builder per configured chain, all sharing one storage.
	pub fn build_service(&self, config: &Config) -> Result<BuilderService, FactoryError> {
		let storage = Arc::new(self.build_storage(config)?);

		let mut builders: HashMap<String, Box<dyn BuilderInterface>> = HashMap::new();
		for chain in config.chain_entries()? {
			let family = chain.family.as_str();
			let factory =
				self.builder
					.get(family)
					.ok_or_else(|| FactoryError::UnknownImplementation {
						kind: "builder",
						name: family.to_string(),
						available: available(&self.builder),
					})?;
			let builder =
				factory(chain.config, Arc::clone(&storage)).map_err(|e| FactoryError::Creation {
					kind: "builder",
					name: chain.name.to_string(),
					reason: e.to_string(),
				})?;
			tracing::debug!(chain = %chain.name, family = %family, "Created builder");
			builders.insert(chain.name.to_string(), builder);
		}

		Ok(BuilderService::new(builders))
	}
}

/// Build the builder service using the global registry.
pub fn build_service_from_config(config: &Config) -> Result<BuilderService, FactoryError> {
	initialize_registry().build_service(config)
}

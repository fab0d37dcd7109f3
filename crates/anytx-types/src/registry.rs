//! Self-registration of pluggable implementations.

/// Links a configuration name to the factory that builds the implementation.
///
/// Builders register under their chain family name (`evm`, `solana`,
/// `tendermint`), storage backends under `file` and `memory`.
pub trait ImplementationRegistry {
	/// Name used in configuration to select this implementation.
	const NAME: &'static str;

	/// Factory function type of the owning module.
	type Factory;

	/// Returns the factory.
	fn factory() -> Self::Factory;
}

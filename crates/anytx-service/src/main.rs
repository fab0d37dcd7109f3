//! Command line entry point for building, signing and broadcasting
//! transactions on EVM, Solana and Cosmos SDK chains.
//!
//! Chains are declared in a TOML configuration file. Results are printed to
//! stdout as JSON; logs go to stderr and are filtered with `RUST_LOG` or
//! `--log-level`.

use anytx_config::Config;
use clap::Parser;
use std::path::PathBuf;

mod commands;
mod factory_registry;

use commands::Command;
use factory_registry::build_service_from_config;

/// Command-line arguments for the anytx tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", env = "ANYTX_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "warn")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Invalid config path: {}", args.config.display()))?;
	let config = Config::from_file(config_path).await?;
	tracing::debug!(chains = config.chains.len(), "Loaded configuration");

	let service = build_service_from_config(&config)?;

	let output = commands::execute(&config, &service, args.command).await?;
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}

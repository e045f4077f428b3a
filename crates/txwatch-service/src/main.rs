//! Main entry point for the txpool-watch service.
//!
//! Polls the transaction pools of several execution clients, tracks every
//! transaction's lifecycle per client, and reconciles validator inclusion
//! lists against what the clients have seen.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use txwatch_config::Config;
use txwatch_core::{MonitorBuilder, MonitorEngine, MonitorFactories};

mod apis;
mod server;

use txwatch_inclusion::implementations::beacon::create_source as create_beacon_source;
use txwatch_poller::implementations::rpc::create_source as create_rpc_source;
use txwatch_storage::implementations::file::create_storage as create_file_storage;
use txwatch_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the monitor.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", env = "TXWATCH_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started txpool-watch");

	let config_path = args
		.config
		.to_str()
		.ok_or("configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!(monitor_id = %config.monitor.id, endpoints = config.endpoints.len(), "Loaded configuration");

	let engine = Arc::new(build_engine(config.clone())?);

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let api_task = server::start_server(api_config, Arc::clone(&engine));
			tokio::select! {
				result = engine.run() => {
					tracing::info!("Monitor finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("Starting monitor only");
			engine.run().await?;
		},
	}

	tracing::info!("Stopped txpool-watch");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Wires the concrete storage, pool-source and announcement implementations.
fn build_engine(config: Config) -> Result<MonitorEngine, Box<dyn std::error::Error>> {
	let storage_factories = create_factory_map!(
		txwatch_storage::StorageInterface,
		txwatch_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let pool_source_factories = create_factory_map!(
		txwatch_poller::PoolSource,
		txwatch_poller::PollError,
		"rpc" => create_rpc_source,
	);

	let announcement_factories = create_factory_map!(
		txwatch_inclusion::AnnouncementSource,
		txwatch_inclusion::AnnouncementError,
		"beacon" => create_beacon_source,
	);

	let factories = MonitorFactories {
		storage_factories,
		pool_source_factories,
		announcement_factories,
	};

	Ok(MonitorBuilder::new(config).build(factories)?)
}

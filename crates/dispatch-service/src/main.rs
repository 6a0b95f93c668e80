//! Main entry point for the dispatch command-line tool.
//!
//! Loads the configured transition rules and answers questions about them:
//! which rules exist, where an order can go next, and whether a specific
//! status change would be accepted.

use clap::{Parser, Subcommand};
use dispatch_config::Config;
use dispatch_core::DispatchBuilder;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

/// Command-line arguments for the dispatch tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file. Built-in rules are used when omitted.
	#[arg(short, long, env = "DISPATCH_CONFIG")]
	config: Option<PathBuf>,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "warn")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print the active transition rules
	Rules,
	/// List the statuses an order can move to right now
	Targets {
		/// Current status (code or label)
		#[arg(long)]
		from: String,
		/// Driver attached to the order
		#[arg(long)]
		driver: Option<String>,
		/// Role of the acting user
		#[arg(long)]
		role: Option<String>,
	},
	/// Validate a status change and print the result as JSON
	Check {
		/// Current status (code or label)
		#[arg(long)]
		from: String,
		/// Requested status (code or label)
		#[arg(long)]
		to: String,
		/// Driver attached to the order
		#[arg(long)]
		driver: Option<String>,
		/// Role of the acting user
		#[arg(long)]
		role: Option<String>,
	},
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	let config = load_config(args.config.as_ref()).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = DispatchBuilder::new(config).build_engine()?;

	match args.command {
		Command::Rules => println!("{}", commands::render_rules(&engine)),
		Command::Targets { from, driver, role } => {
			let output =
				commands::render_targets(&engine, &from, driver.as_deref(), role.as_deref());
			if !output.is_empty() {
				println!("{}", output);
			}
		},
		Command::Check {
			from,
			to,
			driver,
			role,
		} => {
			let (output, valid) = commands::render_check(
				&engine,
				&from,
				&to,
				driver.as_deref(),
				role.as_deref(),
			)?;
			println!("{}", output);
			if !valid {
				return Ok(ExitCode::FAILURE);
			}
		},
	}

	Ok(ExitCode::SUCCESS)
}

async fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
	match path {
		Some(path) => {
			let path = path
				.to_str()
				.ok_or_else(|| format!("Configuration path is not valid UTF-8: {}", path.display()))?;
			Ok(Config::from_file(path).await?)
		},
		None => Ok(Config::default()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn test_args_check_command() {
		let args = Args::try_parse_from([
			"dispatch",
			"check",
			"--from",
			"PENDING",
			"--to",
			"OUT_FOR_DELIVERY",
			"--driver",
			"driver-123",
		])
		.unwrap();

		assert_eq!(args.log_level, "warn");
		match args.command {
			Command::Check {
				from,
				to,
				driver,
				role,
			} => {
				assert_eq!(from, "PENDING");
				assert_eq!(to, "OUT_FOR_DELIVERY");
				assert_eq!(driver.as_deref(), Some("driver-123"));
				assert!(role.is_none());
			},
			other => panic!("unexpected command: {:?}", other),
		}
	}

	#[test]
	fn test_args_custom_values() {
		let args = Args::try_parse_from([
			"dispatch",
			"--config",
			"custom.toml",
			"--log-level",
			"debug",
			"rules",
		])
		.unwrap();

		assert_eq!(args.config, Some(PathBuf::from("custom.toml")));
		assert_eq!(args.log_level, "debug");
		assert!(matches!(args.command, Command::Rules));
	}

	#[test]
	fn test_args_require_command() {
		assert!(Args::try_parse_from(["dispatch"]).is_err());
		assert!(Args::try_parse_from(["dispatch", "check", "--from", "PENDING"]).is_err());
	}

	#[tokio::test]
	async fn test_load_default_config() {
		let config = load_config(None).await.unwrap();
		assert_eq!(config.service.id, "dispatch");
	}

	#[tokio::test]
	async fn test_load_config_file() {
		let temp_dir = tempdir().expect("Failed to create temp dir");
		let config_path = temp_dir.path().join("dispatch.toml");
		std::fs::write(
			&config_path,
			r#"
[service]
id = "branch-file"

[storage]
primary = "memory"
[storage.implementations.memory]

[transitions]
rule_set = "custom"

[[transitions.rules]]
from = "RETURNED"
to = "PENDING"
allowed_roles = ["admin"]
"#,
		)
		.expect("Failed to write config");

		let config = load_config(Some(&config_path)).await.unwrap();
		assert_eq!(config.service.id, "branch-file");

		let engine = DispatchBuilder::new(config).build_engine().unwrap();
		assert_eq!(
			commands::render_rules(&engine),
			"RETURNED -> PENDING roles=admin"
		);
	}
}

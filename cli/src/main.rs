//! Threshold random beacon CLI.

use beacon_chain::Entry;
use beacon_cryptography::bls12381::primitives::group::Element;
use beacon_utils::hex;
use clap::{Arg, Command};
use std::{path::PathBuf, process::ExitCode, str::FromStr};
use tracing::error;

mod config;
mod relay;

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Flag for the log level
const LOG_LEVEL_FLAG: &str = "log-level";

/// Flag for the configuration file
const CONFIG_FLAG: &str = "config";

/// Prints an entry to stdout.
fn print_entry(entry: &Entry) {
    println!("request: {}", entry.request_id);
    println!("entry: {}", hex(&entry.value.serialize()));
    println!("previous entry: {}", hex(&entry.previous_entry));
    println!("group: {}", hex(&entry.group_public_key.serialize()));
    println!("block: {}", entry.timestamp);
}

/// Flag for the request a submitted entry answers
const REQUEST_ID_FLAG: &str = "request-id";

/// Defines the command line interface.
fn command() -> Command {
    Command::new("beacon")
        .version(crate_version())
        .about("Interact with a threshold random beacon.")
        .arg(
            Arg::new(LOG_LEVEL_FLAG)
                .long(LOG_LEVEL_FLAG)
                .default_value("info")
                .help("Log level (trace, debug, info, warn, error)")
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new(CONFIG_FLAG)
                .long(CONFIG_FLAG)
                .help("Path to YAML config file")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new(relay::CMD)
                .about("Request and submit relay entries.")
                .subcommand_required(true)
                .subcommand(
                    Command::new(relay::REQUEST_CMD)
                        .about("Request a new relay entry and wait for it to be generated."),
                )
                .subcommand(
                    Command::new(relay::ENTRY_CMD).about("Look up an existing relay entry."),
                )
                .subcommand(
                    Command::new(relay::SUBMIT_CMD)
                        .about("Submit the bootstrap relay entry.")
                        .arg(
                            Arg::new(REQUEST_ID_FLAG)
                                .short('r')
                                .long(REQUEST_ID_FLAG)
                                .default_value("0")
                                .help("Request the entry answers")
                                .value_parser(clap::value_parser!(u64)),
                        ),
                ),
        )
}

/// Entrypoint for the beacon CLI
#[tokio::main]
async fn main() -> ExitCode {
    let matches = command().get_matches();

    // Create logger
    let level = matches
        .get_one::<String>(LOG_LEVEL_FLAG)
        .and_then(|level| tracing::Level::from_str(level).ok())
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config_path = matches.get_one::<PathBuf>(CONFIG_FLAG);
    let config = match config::Config::load(config_path.map(PathBuf::as_path)) {
        Ok(config) => config,
        Err(e) => {
            error!(error=?e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    // Parse subcommands
    if let Some(relay_matches) = matches.subcommand_matches(relay::CMD) {
        let result = match relay_matches.subcommand() {
            Some((relay::REQUEST_CMD, _)) => relay::request(&config).await,
            Some((relay::ENTRY_CMD, _)) => relay::entry().await,
            Some((relay::SUBMIT_CMD, matches)) => {
                let Some(request_id) = matches.get_one::<u64>(REQUEST_ID_FLAG) else {
                    error!("missing request id");
                    return ExitCode::FAILURE;
                };
                relay::submit(&config, *request_id).await
            }
            Some((cmd, _)) => {
                error!(cmd, "invalid subcommand");
                return ExitCode::FAILURE;
            }
            None => {
                error!("no subcommand provided");
                return ExitCode::FAILURE;
            }
        };
        match result {
            Ok(entry) => {
                print_entry(&entry);
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                error!(error=?e, "relay command failed");
            }
        }
    }
    ExitCode::FAILURE
}

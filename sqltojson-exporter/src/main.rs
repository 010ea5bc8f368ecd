//! `sqltojson` command line exporter.
//!
//! Reads an export configuration, connects to the source database, and writes the nested
//! documents and their inferred index mapping.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sqltojson_telemetry::tracing::init_tracing;

use crate::config::load_export_config;
use crate::core::start_export;
use crate::error::{ExporterError, ExporterResult};

mod config;
mod core;
mod error;

/// Exports relational data as nested JSON documents for bulk indexing.
#[derive(Debug, Parser)]
#[command(name = "sqltojson", version, about)]
struct Args {
    /// Path to the export configuration (yaml, yml or json).
    #[arg(long, default_value = "sqltojson.yaml")]
    config: PathBuf,

    /// Number of concurrent build workers, overriding the configuration.
    #[arg(long)]
    workers: Option<u16>,

    /// Maximum number of source connections, overriding the configuration.
    #[arg(long)]
    connections: Option<u32>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> ExporterResult<()> {
    init_tracing(env!("CARGO_BIN_NAME")).map_err(ExporterError::config)?;

    let config = load_export_config(&args.config, args.workers, args.connections)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_export(config))
}

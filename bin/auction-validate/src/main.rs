//! `auction-validate` entrypoint.
//!
//! Prints the accepted call as JSON on stdout, or the rejection reason on
//! stderr with exit code 1. Startup failures exit with 2.

use std::process::ExitCode;

use anyhow::Context;
use argh::from_env;
use auction_common::logging;
use auction_config::Config;
use auction_validator::{CallDescriptor, ScriptValidator, ValidationError};
use tracing::{debug, warn};

use crate::args::Args;

mod args;

/// Exit code for a script the validator turned down.
const EXIT_REJECTED: u8 = 1;
const EXIT_STARTUP: u8 = 2;

fn main() -> ExitCode {
    let args: Args = from_env();

    let (validator, script) = match setup(&args) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    match check(&validator, &script, args.call.as_deref()) {
        Ok(call) => match serde_json::to_string_pretty(&call) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: serialize result: {e}");
                ExitCode::from(EXIT_STARTUP)
            }
        },
        Err(e) => {
            warn!(error = %e, "script rejected");
            eprintln!("rejected: {e}");
            ExitCode::from(EXIT_REJECTED)
        }
    }
}

fn setup(args: &Args) -> anyhow::Result<(ScriptValidator, Vec<u8>)> {
    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    init_logging(&config)?;

    let validator =
        ScriptValidator::from_config(&config.validator).context("invalid call table")?;
    debug!(calls = validator.table().len(), "call table loaded");

    let script = args.script_bytes()?;
    Ok((validator, script))
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    logging::init_logging_from_config(logging::LoggingInitConfig {
        service_base_name: "auction-validate",
        service_label: config.logging.service_label.as_deref(),
        log_dir: config.logging.log_dir.as_ref(),
        log_file_prefix: config.logging.log_file_prefix.as_deref(),
        json_format: config.logging.json_format,
        default_log_prefix: "auction",
        use_stderr: true,
    })
    .context("failed to initialize logging")
}

fn check(
    validator: &ScriptValidator,
    script: &[u8],
    call: Option<&str>,
) -> Result<CallDescriptor, ValidationError> {
    match call {
        Some(name) => validator.validate_as(script, name),
        None => validator.validate(script),
    }
}

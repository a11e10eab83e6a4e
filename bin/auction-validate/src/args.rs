//! Command line arguments for `auction-validate`.

use std::path::PathBuf;

use anyhow::Context;
use argh::FromArgs;

/// Dry-runs a contract-call script through the validator pipeline.
#[derive(FromArgs, Debug)]
pub(crate) struct Args {
    #[argh(option, short = 'c', description = "path to the TOML config")]
    pub(crate) config: PathBuf,

    #[argh(option, short = 's', description = "hex-encoded script, 0x prefix optional")]
    pub(crate) script: String,

    #[argh(
        option,
        description = "check against this call spec instead of dispatching on target and method"
    )]
    pub(crate) call: Option<String>,
}

impl Args {
    pub(crate) fn script_bytes(&self) -> anyhow::Result<Vec<u8>> {
        parse_script_hex(&self.script)
    }
}

pub(crate) fn parse_script_hex(raw: &str) -> anyhow::Result<Vec<u8>> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).context("script is not valid hex")
}

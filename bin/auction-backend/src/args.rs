//! Command line arguments for `auction-backend`.

use std::path::PathBuf;

use argh::FromArgs;

/// Co-signs validated auction calls through the notary service.
#[derive(FromArgs, Debug)]
pub(crate) struct Args {
    #[argh(option, short = 'c', description = "path to the TOML config")]
    pub(crate) config: PathBuf,
}

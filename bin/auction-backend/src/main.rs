//! `auction-backend` entrypoint.
//!
//! Polls the node for notary requests, co-signs the ones that pass
//! validation and runs their post-confirmation actions. Optionally serves
//! notary deposits over JSON-RPC.

use std::{fs, path::Path, sync::Arc};

use anyhow::Context;
use argh::from_env;
use auction_common::logging;
use auction_config::Config;
use auction_neo::{KeyPair, NeoActor, NeoRpc, NeoRpcClient};
use auction_notary::{
    ChainEventHub, HttpGatewayStore, HttpMediaSource, PostConfirmActions, SubmissionCoordinator,
};
use auction_tasks::{start_signal_listeners, ShutdownSignal};
use auction_validator::ScriptValidator;
use tokio::{runtime, task::JoinSet};
use tracing::*;

use crate::{
    args::Args,
    rpc::ActorDepositor,
    services::{effective_notary_config, start_deposit_rpc, start_notary_services},
};

mod args;
mod rpc;
mod services;

fn main() -> anyhow::Result<()> {
    let args: Args = from_env();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    init_logging(&config)?;

    let rt = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("auction-rt")
        .build()
        .context("failed to build runtime")?;

    rt.block_on(run(config))?;
    info!("exiting auction-backend");
    Ok(())
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    logging::init_logging_from_config(logging::LoggingInitConfig {
        service_base_name: "auction-backend",
        service_label: config.logging.service_label.as_deref(),
        log_dir: config.logging.log_dir.as_ref(),
        log_file_prefix: config.logging.log_file_prefix.as_deref(),
        json_format: config.logging.json_format,
        default_log_prefix: "auction",
        use_stderr: false,
    })
    .context("failed to initialize logging")
}

fn load_key(path: &Path) -> anyhow::Result<KeyPair> {
    let wif = fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    KeyPair::from_wif(&wif).with_context(|| format!("invalid key in {}", path.display()))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let signer = config
        .signer
        .as_ref()
        .context("config has no [signer] section")?;
    let storage = config
        .storage
        .as_ref()
        .context("config has no [storage] section")?;
    let key = load_key(&signer.key_file)?;
    let validator =
        ScriptValidator::from_config(&config.validator).context("invalid call table")?;

    let rpc = Arc::new(NeoRpcClient::from_config(&config.rpc).context("invalid rpc config")?);
    let protocol = rpc
        .protocol()
        .await
        .context("failed to fetch node protocol")?;
    let notary = effective_notary_config(&config.notary, &protocol);
    info!(account = %key.address(), network = %protocol.network, "backend account loaded");

    let hub = ChainEventHub::new(notary.execution_cache);
    let watcher = Arc::new(hub.clone());
    let actor = Arc::new(NeoActor::new(
        rpc.clone(),
        watcher.clone(),
        key,
        protocol.network,
        &notary,
    ));
    let coordinator = Arc::new(SubmissionCoordinator::new(actor.clone(), watcher));
    let actions = Arc::new(PostConfirmActions::new(
        Arc::new(HttpGatewayStore::from_config(storage)?),
        Arc::new(HttpMediaSource::from_config(storage)?),
        actor.clone(),
        storage.container.clone(),
    ));

    let signal = ShutdownSignal::new();
    let _listener = start_signal_listeners(&signal);

    let mut tasks = JoinSet::new();
    start_notary_services(
        &mut tasks,
        notary,
        rpc,
        hub,
        validator,
        coordinator,
        actions,
        &signal,
    );

    let deposit_rpc = match &config.deposit {
        Some(deposit) => {
            let depositor = Arc::new(ActorDepositor::new(actor, deposit));
            Some(start_deposit_rpc(&deposit.listen_addr, depositor).await?)
        }
        None => None,
    };

    // the first task to stop takes the others down
    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        signal.send();
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(err = %e, "service failed");
                result = Err(e);
            }
            Err(e) => {
                error!(err = %e, "service panicked");
                result = Err(e.into());
            }
        }
    }

    if let Some((_, handle)) = deposit_rpc {
        if handle.stop().is_err() {
            warn!("deposit rpc already stopped");
        }
        handle.stopped().await;
    }
    result
}

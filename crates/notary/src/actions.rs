//! Side effects that follow a confirmed call.

use std::{fmt, sync::Arc};

use auction_primitives::{ArgValue, Hash160};
use auction_tasks::ShutdownGuard;
use auction_validator::{builtin, CallDescriptor};
use tracing::*;

use crate::{
    coordinator::{Branch, Confirmation},
    error::ActionError,
    store::{MediaSource, ObjectAddress, ObjectHeader, ObjectStore},
    traits::ContractInvoker,
};

/// Method on the minting contract that records where the media lives.
pub const SET_ADDRESS_METHOD: &str = "setAddress";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Nothing ran: fallback branch or shutdown.
    Skipped,
    Stored(ObjectAddress),
    Logged,
}

pub struct PostConfirmActions<S, M, I> {
    store: Arc<S>,
    media: Arc<M>,
    invoker: Arc<I>,
    container: String,
}

impl<S, M, I> fmt::Debug for PostConfirmActions<S, M, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostConfirmActions")
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl<S, M, I> PostConfirmActions<S, M, I>
where
    S: ObjectStore,
    M: MediaSource,
    I: ContractInvoker,
{
    pub fn new(
        store: Arc<S>,
        media: Arc<M>,
        invoker: Arc<I>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            store,
            media,
            invoker,
            container: container.into(),
        }
    }

    /// Runs the action for `call` at most once per confirmation.
    pub async fn run(
        &self,
        call: &CallDescriptor,
        confirmation: &Confirmation,
        shutdown: &ShutdownGuard,
    ) -> Result<ActionOutcome, ActionError> {
        if confirmation.branch == Branch::Fallback {
            warn!(op = %call.operation, tx = %confirmation.result.tx_hash, "fallback executed; main call dropped");
            return Ok(ActionOutcome::Skipped);
        }
        if shutdown.should_shutdown() {
            debug!(op = %call.operation, "shutting down; skipping post-confirm action");
            return Ok(ActionOutcome::Skipped);
        }

        match call.operation.as_str() {
            builtin::MINT => self.mint(call, shutdown).await,
            builtin::START => self.start(call).await,
            builtin::MAKE_BET => {
                info!(
                    bidder = %hash_arg(call, 0)?,
                    bet = int_arg(call, 1)?,
                    "bet accepted"
                );
                Ok(ActionOutcome::Logged)
            }
            builtin::FINISH | builtin::POTENTIAL_WINNER => {
                match confirmation.result.stack.first().and_then(|s| s.as_hash160()) {
                    Some(winner) => info!(op = %call.operation, %winner, "auction winner"),
                    None => info!(op = %call.operation, "no winner"),
                }
                Ok(ActionOutcome::Logged)
            }
            other => {
                info!(op = %other, tx = %confirmation.result.tx_hash, "call confirmed");
                Ok(ActionOutcome::Logged)
            }
        }
    }

    async fn mint(
        &self,
        call: &CallDescriptor,
        shutdown: &ShutdownGuard,
    ) -> Result<ActionOutcome, ActionError> {
        let owner = hash_arg(call, 0)?;
        let token = call
            .argument(1)
            .and_then(ArgValue::as_str)
            .ok_or(ActionError::BadArgument(1))?;

        let media = self.media.fetch(token).await?;
        // nothing is written once shutdown was requested
        if shutdown.should_shutdown() {
            return Ok(ActionOutcome::Skipped);
        }

        let header = ObjectHeader::default()
            .with_attribute("token", token)
            .with_attribute("owner", owner.to_string());
        let address = self
            .store
            .put_object(self.container.clone(), header, media)
            .await?;
        info!(%token, %address, "token media stored");

        let result = self
            .invoker
            .send_call(
                call.target,
                SET_ADDRESS_METHOD.to_owned(),
                vec![
                    ArgValue::String(token.to_owned()),
                    ArgValue::String(address.to_string()),
                ],
            )
            .await?;
        if !result.is_halt() {
            return Err(ActionError::CallFaulted {
                method: SET_ADDRESS_METHOD,
                message: result.exception.unwrap_or_default(),
            });
        }

        Ok(ActionOutcome::Stored(address))
    }

    async fn start(&self, call: &CallDescriptor) -> Result<ActionOutcome, ActionError> {
        let owner = hash_arg(call, 0)?;
        let lot = call
            .argument(1)
            .ok_or(ActionError::BadArgument(1))?
            .to_string();
        let init_bet = int_arg(call, 2)?;

        let header = ObjectHeader::default()
            .with_attribute("lot", lot)
            .with_attribute("owner", owner.to_string())
            .with_attribute("init_bet", init_bet.to_string());
        let address = self
            .store
            .put_object(self.container.clone(), header, Vec::new())
            .await?;
        info!(%address, %owner, %init_bet, "auction lot stored");

        Ok(ActionOutcome::Stored(address))
    }
}

fn hash_arg(call: &CallDescriptor, pos: usize) -> Result<Hash160, ActionError> {
    call.argument(pos)
        .and_then(ArgValue::as_hash160)
        .copied()
        .ok_or(ActionError::BadArgument(pos))
}

fn int_arg(call: &CallDescriptor, pos: usize) -> Result<i64, ActionError> {
    call.argument(pos)
        .and_then(ArgValue::as_integer)
        .ok_or(ActionError::BadArgument(pos))
}

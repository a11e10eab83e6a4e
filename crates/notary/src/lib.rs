//! Co-signing of validated notary requests.
//!
//! The worker validates every request from the feed, then hands accepted
//! ones to the [`SubmissionCoordinator`], which signs, notarizes and waits
//! for whichever of the main or fallback transaction executes first.
//! [`PostConfirmActions`] run only for a main-branch confirmation.

pub mod actions;
pub mod coordinator;
pub mod error;
pub mod hub;
pub mod store;
pub mod traits;
pub mod worker;

pub use actions::{ActionOutcome, PostConfirmActions};
pub use coordinator::{Branch, Confirmation, SubmissionCoordinator};
pub use error::{ActionError, ActorError, SignatureError, StoreError, SubmissionError, WatchError};
pub use hub::{ChainEvent, ChainEventHub};
pub use store::{HttpGatewayStore, HttpMediaSource, MediaSource, ObjectAddress, ObjectHeader, ObjectStore};
pub use traits::{ChainWatcher, ContractInvoker, NotaryActor, PendingSubmission};
pub use worker::{notary_request_worker, request_channel};

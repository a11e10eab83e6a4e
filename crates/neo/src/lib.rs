//! N3 node access for the backend.
//!
//! [`NeoActor`] is the backend's account: it co-signs notary requests,
//! builds their fallbacks and sends calls paid by the backend alone.
//! [`chain_poller_task`] feeds the chain event hub and the notary request
//! worker from the node.

pub mod actor;
pub mod error;
pub mod key;
pub mod native;
pub mod poller;
pub mod rpc;

pub use actor::NeoActor;
pub use error::{KeyError, NeoError};
pub use key::{address_from_script_hash, script_hash_from_address, KeyPair};
pub use poller::chain_poller_task;
pub use rpc::{NeoRpc, NeoRpcClient, RpcProtocol};

//! JSON-RPC access to an N3 node.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use auction_config::RpcConfig;
use auction_primitives::{
    ApplicationLog, Hash256, NotaryPayload, Signer, StackItem, Transaction, VmState,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use jsonrpsee::{
    core::RpcResult,
    http_client::{HttpClient, HttpClientBuilder},
    proc_macros::rpc,
};
use serde::Deserialize;

use crate::error::NeoError;

/// Node methods the backend uses, with their wire parameter order.
#[rpc(client)]
pub trait NeoNodeApi {
    #[method(name = "getversion")]
    async fn get_version(&self) -> RpcResult<RpcVersion>;

    /// Number of blocks, one above the current height.
    #[method(name = "getblockcount")]
    async fn get_block_count(&self) -> RpcResult<u32>;

    #[method(name = "getblock")]
    async fn get_block(&self, index: u32, verbose: bool) -> RpcResult<RpcBlock>;

    #[method(name = "getapplicationlog")]
    async fn get_application_log(&self, tx: Hash256) -> RpcResult<ApplicationLog>;

    #[method(name = "getrawnotarypool")]
    async fn get_raw_notary_pool(&self) -> RpcResult<RpcNotaryPool>;

    /// Base64 of the transaction when `verbose` is false.
    #[method(name = "getrawnotarytransaction")]
    async fn get_raw_notary_transaction(&self, tx: Hash256, verbose: bool) -> RpcResult<String>;

    #[method(name = "invokescript")]
    async fn invoke_script(
        &self,
        script: String,
        signers: Vec<Signer>,
    ) -> RpcResult<RpcInvokeResult>;

    #[method(name = "calculatenetworkfee")]
    async fn calculate_network_fee(&self, tx: String) -> RpcResult<RpcNetworkFee>;

    #[method(name = "sendrawtransaction")]
    async fn send_raw_transaction(&self, tx: String) -> RpcResult<RpcRelayResult>;

    #[method(name = "submitnotaryrequest")]
    async fn submit_notary_request(&self, payload: String) -> RpcResult<RpcRelayResult>;
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcVersion {
    pub protocol: RpcProtocol,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RpcProtocol {
    /// Network magic mixed into every signed message.
    pub network: u32,

    #[serde(rename = "msperblock")]
    pub ms_per_block: u64,

    #[serde(rename = "maxvaliduntilblockincrement")]
    pub max_valid_until_block_increment: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcBlock {
    pub hash: Hash256,
    pub index: u32,
    #[serde(default)]
    pub tx: Vec<RpcBlockTx>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcBlockTx {
    pub hash: Hash256,
}

/// Pending notary requests, keyed by main transaction hash.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RpcNotaryPool {
    #[serde(default)]
    pub hashes: Option<HashMap<Hash256, Vec<Hash256>>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcInvokeResult {
    pub state: VmState,
    #[serde(rename = "gasconsumed")]
    pub gas_consumed: String,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub stack: Vec<StackItem>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcNetworkFee {
    #[serde(rename = "networkfee")]
    pub network_fee: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcRelayResult {
    pub hash: Hash256,
}

/// Outcome of a test invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub state: VmState,
    pub gas_consumed: i64,
    pub exception: Option<String>,
    pub stack: Vec<StackItem>,
}

/// Decoded view of the node calls, so callers can be tested without a node.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NeoRpc: Send + Sync {
    async fn protocol(&self) -> Result<RpcProtocol, NeoError>;

    /// Height of the latest persisted block.
    async fn height(&self) -> Result<u32, NeoError>;

    async fn block_transactions(&self, index: u32) -> Result<Vec<Hash256>, NeoError>;

    async fn application_log(&self, tx: Hash256) -> Result<ApplicationLog, NeoError>;

    /// Main transaction hashes with pending notary requests.
    async fn notary_pool(&self) -> Result<Vec<Hash256>, NeoError>;

    async fn notary_transaction(&self, tx: Hash256) -> Result<Transaction, NeoError>;

    async fn invoke_script(
        &self,
        script: Vec<u8>,
        signers: Vec<Signer>,
    ) -> Result<Invocation, NeoError>;

    /// Network fee of `tx` as witnessed by its verification scripts.
    async fn network_fee(&self, tx: &Transaction) -> Result<i64, NeoError>;

    async fn send_transaction(&self, tx: &Transaction) -> Result<Hash256, NeoError>;

    async fn submit_notary_request(&self, payload: &NotaryPayload) -> Result<Hash256, NeoError>;
}

/// [`NeoRpc`] over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct NeoRpcClient {
    client: Arc<HttpClient>,
}

impl NeoRpcClient {
    pub fn from_config(config: &RpcConfig) -> Result<Self, NeoError> {
        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_millis(config.request_timeout_ms))
            .build(&config.endpoint)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }
}

#[async_trait]
impl NeoRpc for NeoRpcClient {
    async fn protocol(&self) -> Result<RpcProtocol, NeoError> {
        Ok(self.client.get_version().await?.protocol)
    }

    async fn height(&self) -> Result<u32, NeoError> {
        let count = self.client.get_block_count().await?;
        Ok(count.saturating_sub(1))
    }

    async fn block_transactions(&self, index: u32) -> Result<Vec<Hash256>, NeoError> {
        let block = self.client.get_block(index, true).await?;
        Ok(block.tx.into_iter().map(|tx| tx.hash).collect())
    }

    async fn application_log(&self, tx: Hash256) -> Result<ApplicationLog, NeoError> {
        Ok(self.client.get_application_log(tx).await?)
    }

    async fn notary_pool(&self) -> Result<Vec<Hash256>, NeoError> {
        let pool = self.client.get_raw_notary_pool().await?;
        Ok(pool_main_hashes(pool))
    }

    async fn notary_transaction(&self, tx: Hash256) -> Result<Transaction, NeoError> {
        let raw = self.client.get_raw_notary_transaction(tx, false).await?;
        decode_transaction(&raw)
    }

    async fn invoke_script(
        &self,
        script: Vec<u8>,
        signers: Vec<Signer>,
    ) -> Result<Invocation, NeoError> {
        let res = self
            .client
            .invoke_script(STANDARD.encode(script), signers)
            .await?;
        Ok(Invocation {
            state: res.state,
            gas_consumed: parse_amount("gasconsumed", &res.gas_consumed)?,
            exception: res.exception,
            stack: res.stack,
        })
    }

    async fn network_fee(&self, tx: &Transaction) -> Result<i64, NeoError> {
        let raw = STANDARD.encode(tx.to_bytes()?);
        let fee = self.client.calculate_network_fee(raw).await?;
        parse_amount("networkfee", &fee.network_fee)
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Hash256, NeoError> {
        let raw = STANDARD.encode(tx.to_bytes()?);
        Ok(self.client.send_raw_transaction(raw).await?.hash)
    }

    async fn submit_notary_request(&self, payload: &NotaryPayload) -> Result<Hash256, NeoError> {
        let raw = STANDARD.encode(payload.to_bytes()?);
        Ok(self.client.submit_notary_request(raw).await?.hash)
    }
}

fn pool_main_hashes(pool: RpcNotaryPool) -> Vec<Hash256> {
    let mut hashes: Vec<_> = pool.hashes.unwrap_or_default().into_keys().collect();
    hashes.sort();
    hashes
}

pub(crate) fn decode_transaction(raw: &str) -> Result<Transaction, NeoError> {
    let bytes = STANDARD.decode(raw.trim())?;
    Ok(Transaction::from_bytes(&bytes)?)
}

/// Nodes report GAS amounts as decimal strings of fractions.
pub(crate) fn parse_amount(what: &'static str, value: &str) -> Result<i64, NeoError> {
    value.parse().map_err(|_| NeoError::BadNumber {
        what,
        value: value.to_owned(),
    })
}

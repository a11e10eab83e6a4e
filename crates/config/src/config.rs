use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use auction_primitives::{ArgType, Hash160};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default value for `max_call_flags` in [`ValidatorConfig`] (`CallFlags::ALL`).
const DEFAULT_MAX_CALL_FLAGS: u8 = 15;

/// Highest call flag value the VM defines.
const CALL_FLAGS_ALL: u8 = 15;

/// Default RPC request timeout in ms.
const DEFAULT_RPC_TIMEOUT_MS: u64 = 10_000;

/// Default ceiling on submissions awaiting confirmation at once.
const DEFAULT_MAX_CONCURRENT_SUBMISSIONS: usize = 16;

/// Default capacity of the inbound request channel.
const DEFAULT_REQUEST_BUFFER: usize = 64;

/// Default number of request hashes remembered for de-duplication.
const DEFAULT_SEEN_REQUEST_CACHE: usize = 4096;

/// Default number of recent executions kept by the event hub.
const DEFAULT_EXECUTION_CACHE: usize = 1024;

/// Default delay, in blocks, before a fallback transaction becomes valid.
const DEFAULT_FALLBACK_DELAY_BLOCKS: u32 = 20;

/// Default lifetime, in blocks, of transactions the backend sends alone.
const DEFAULT_VUB_INCREMENT: u32 = 100;

/// Default interval between node polls in ms.
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default notary deposit, in GAS fractions (1 GAS).
const DEFAULT_DEPOSIT_AMOUNT: i64 = 100_000_000;

/// Default deposit lock, in blocks.
const DEFAULT_DEPOSIT_TILL_BLOCKS: u32 = 5_760;

const DEFAULT_DEPOSIT_LISTEN_ADDR: &str = "127.0.0.1:5555";

/// Default source of token media.
const DEFAULT_MEDIA_BASE_URL: &str = "https://www.nyan.cat/cats";

/// Default media fetch timeout in ms.
const DEFAULT_MEDIA_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Node endpoint, websocket or http.
    pub endpoint: String,

    #[serde(default = "default_rpc_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

/// One contract call the backend is willing to co-sign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Operation name, also the key for the built-in method ABIs.
    pub name: String,

    /// Contract hash in little-endian hex.
    pub contract: Hash160,

    /// Method name; defaults to the built-in ABI for `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Argument types in declaration order; defaults to the built-in ABI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<ArgType>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Highest call flag value a candidate script may request.
    #[serde(default = "default_max_call_flags")]
    pub max_call_flags: u8,

    /// Reject scripts that end without an explicit `RET`. Set to false to
    /// treat the end of the script as `RET`, as NeoVM does.
    #[serde(default = "default_require_explicit_ret")]
    pub require_explicit_ret: bool,

    pub calls: Vec<CallConfig>,
}

fn default_max_call_flags() -> u8 {
    DEFAULT_MAX_CALL_FLAGS
}

fn default_require_explicit_ret() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotaryConfig {
    #[serde(default = "default_max_concurrent_submissions")]
    pub max_concurrent_submissions: usize,

    #[serde(default = "default_request_buffer")]
    pub request_buffer: usize,

    #[serde(default = "default_seen_request_cache")]
    pub seen_request_cache: usize,

    #[serde(default = "default_execution_cache")]
    pub execution_cache: usize,

    /// Blocks after the current height before a fallback becomes valid.
    /// Clamped below the main transaction's `valid_until_block`.
    #[serde(default = "default_fallback_delay_blocks")]
    pub fallback_delay_blocks: u32,

    /// Lifetime of calls the backend signs alone, counted from the
    /// current height.
    #[serde(default = "default_vub_increment")]
    pub vub_increment: u32,

    /// How often the node is polled for new blocks and notary requests.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_submissions: DEFAULT_MAX_CONCURRENT_SUBMISSIONS,
            request_buffer: DEFAULT_REQUEST_BUFFER,
            seen_request_cache: DEFAULT_SEEN_REQUEST_CACHE,
            execution_cache: DEFAULT_EXECUTION_CACHE,
            fallback_delay_blocks: DEFAULT_FALLBACK_DELAY_BLOCKS,
            vub_increment: DEFAULT_VUB_INCREMENT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

fn default_max_concurrent_submissions() -> usize {
    DEFAULT_MAX_CONCURRENT_SUBMISSIONS
}

fn default_request_buffer() -> usize {
    DEFAULT_REQUEST_BUFFER
}

fn default_seen_request_cache() -> usize {
    DEFAULT_SEEN_REQUEST_CACHE
}

fn default_execution_cache() -> usize {
    DEFAULT_EXECUTION_CACHE
}

fn default_fallback_delay_blocks() -> u32 {
    DEFAULT_FALLBACK_DELAY_BLOCKS
}

fn default_vub_increment() -> u32 {
    DEFAULT_VUB_INCREMENT
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Object storage used for auction item media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Container that receives the objects.
    pub container: String,

    /// Token media is fetched from `<media_base_url>/<token name>`.
    #[serde(default = "default_media_base_url")]
    pub media_base_url: String,

    #[serde(default = "default_media_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// HTTP gateway that accepts uploads at `<gateway_url>/upload/<container>`.
    pub gateway_url: String,
}

fn default_media_base_url() -> String {
    DEFAULT_MEDIA_BASE_URL.to_owned()
}

fn default_media_timeout_ms() -> u64 {
    DEFAULT_MEDIA_TIMEOUT_MS
}

/// The backend's own account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// File holding the WIF-encoded private key.
    pub key_file: PathBuf,
}

/// Endpoint that tops up a user's notary deposit from the backend's GAS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositConfig {
    #[serde(default = "default_deposit_listen_addr")]
    pub listen_addr: String,

    /// GAS fractions transferred per request.
    #[serde(default = "default_deposit_amount")]
    pub amount: i64,

    /// Blocks from the current height the deposit stays locked.
    #[serde(default = "default_deposit_till_blocks")]
    pub till_blocks: u32,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_deposit_listen_addr(),
            amount: DEFAULT_DEPOSIT_AMOUNT,
            till_blocks: DEFAULT_DEPOSIT_TILL_BLOCKS,
        }
    }
}

fn default_deposit_listen_addr() -> String {
    DEFAULT_DEPOSIT_LISTEN_ADDR.to_owned()
}

fn default_deposit_amount() -> i64 {
    DEFAULT_DEPOSIT_AMOUNT
}

fn default_deposit_till_blocks() -> u32 {
    DEFAULT_DEPOSIT_TILL_BLOCKS
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Service label to append to the service name (e.g., "prod", "dev").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_label: Option<String>,

    /// Directory path for file-based logging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Prefix for log file names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file_prefix: Option<String>,

    /// Use JSON format for logs instead of compact format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_format: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub validator: ValidatorConfig,

    #[serde(default)]
    pub notary: NotaryConfig,

    /// Media storage (only required when post-confirmation uploads run).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    /// Signing key, required by the backend service only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<SignerConfig>,

    /// Notary deposit endpoint; disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit: Option<DepositConfig>,

    /// Logging configuration (optional section in TOML).
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Reads, parses and validates the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }

        let v = &self.validator;
        if v.max_call_flags > CALL_FLAGS_ALL {
            return Err(ConfigError::CallFlagsOutOfRange(v.max_call_flags));
        }
        if v.calls.is_empty() {
            return Err(ConfigError::NoCalls);
        }

        let mut names = HashSet::new();
        for call in &v.calls {
            if call.name.is_empty() {
                return Err(ConfigError::EmptyCallName);
            }
            if !names.insert(call.name.as_str()) {
                return Err(ConfigError::DuplicateCall(call.name.clone()));
            }
            if call.method.is_some() != call.args.is_some() {
                return Err(ConfigError::PartialAbi(call.name.clone()));
            }
        }

        let n = &self.notary;
        for (field, value) in [
            ("notary.max_concurrent_submissions", n.max_concurrent_submissions),
            ("notary.request_buffer", n.request_buffer),
            ("notary.seen_request_cache", n.seen_request_cache),
            ("notary.execution_cache", n.execution_cache),
            ("notary.vub_increment", n.vub_increment as usize),
            ("notary.poll_interval_ms", n.poll_interval_ms as usize),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroLimit(field));
            }
        }

        if let Some(storage) = &self.storage {
            if storage.container.is_empty() {
                return Err(ConfigError::EmptyContainer);
            }
            if storage.gateway_url.trim().is_empty() {
                return Err(ConfigError::EmptyGateway);
            }
        }

        if let Some(deposit) = &self.deposit {
            if deposit.amount <= 0 {
                return Err(ConfigError::DepositAmount(deposit.amount));
            }
            if deposit.till_blocks == 0 {
                return Err(ConfigError::ZeroLimit("deposit.till_blocks"));
            }
        }

        Ok(())
    }
}

// Configuration loading, SPEC_FULL.md §D. Outside the core's concern per
// spec §1, but a complete binary needs one; shaped after the
// `clap::Args` + `serde` dual-derive pattern this workspace uses for its
// own daemon config (see `daemon/src/discovery/config.rs`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logger::LogLevel;
use crate::state::{ChainDescriptor, TokenSpec};
use ww_common::error::ConfigError;

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "whale-watch")]
#[command(about = "Multi-chain ERC-20 whale-watch pipeline")]
pub struct CliArgs {
    /// Path to the config file (.json or .toml).
    #[clap(long, default_value = "config.json")]
    pub config: PathBuf,

    /// Minimum log level printed to stdout / written to the log file.
    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Disable ANSI colors in terminal log output.
    #[clap(long)]
    pub disable_log_color: bool,

    /// Directory for the on-disk holder cache. Overrides the config file.
    #[clap(long)]
    pub cache_dir: Option<PathBuf>,

    /// Directory for rolling log files. Omit to log to stdout only.
    #[clap(long)]
    pub logs_dir: Option<PathBuf>,
}

fn default_top_n() -> u32 {
    20
}

fn default_threshold_usd() -> f64 {
    10_000.0
}

/// One entry of the on-disk token list. Spec §9 "Dynamic config shapes":
/// a bare address, an `[address, chain]` pair, or a full object, all
/// normalized into `TokenSpec` at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenSpecShape {
    Bare(String),
    Pair(String, String),
    Full {
        address: String,
        chain: String,
        #[serde(default)]
        top_n: Option<u32>,
        #[serde(default)]
        threshold_usd: Option<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenDefaults {
    #[serde(default = "default_top_n")]
    pub top_n: u32,
    #[serde(default = "default_threshold_usd")]
    pub threshold_usd: f64,
    /// Chain name assumed for the bare-address shape.
    pub default_chain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretHandles {
    /// Env var holding the primary holder-provider API key.
    pub primary_api_key_env: String,
    /// Env var holding the messaging sink webhook token.
    pub sink_token_env: String,
    /// Env var holding the messaging sink chat id.
    pub sink_chat_id_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalsFile {
    pub block_poll_secs: u64,
    pub whale_refresh_secs: u64,
    pub price_refresh_secs: u64,
    pub status_print_secs: u64,
}

/// On-disk shape of the config file (spec §6 `CoreConfig`, pre-normalization).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfigFile {
    pub chains: Vec<ChainDescriptor>,
    pub tokens: Vec<TokenSpecShape>,
    #[serde(default)]
    pub token_defaults: Option<TokenDefaults>,
    pub intervals: IntervalsFile,
    /// Seconds; omit or `null` for "never-expire".
    #[serde(default)]
    pub cache_freshness_horizon_secs: Option<u64>,
    pub dedup_capacity: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    pub secrets: SecretHandles,
    pub primary_provider_url: String,
    pub secondary_provider_url: String,
    pub price_oracle_url: String,
    pub messaging_webhook_url: String,
}

fn default_max_retries() -> u32 {
    3
}

/// Runtime config the Supervisor wires everything from (spec §6).
pub struct CoreConfig {
    pub chains: HashMap<String, ChainDescriptor>,
    pub tokens: Vec<TokenSpec>,
    pub block_poll_interval: Duration,
    pub whale_refresh_interval: Duration,
    pub price_refresh_interval: Duration,
    pub status_print_interval: Duration,
    pub cache_freshness_horizon: Option<Duration>,
    pub dedup_capacity: usize,
    pub max_retries: u32,
    pub primary_api_key: String,
    pub sink_token: String,
    pub sink_chat_id: String,
    pub primary_provider_url: String,
    pub secondary_provider_url: String,
    pub price_oracle_url: String,
    pub messaging_webhook_url: String,
    pub cache_dir: PathBuf,
}

fn normalize_token(index: usize, shape: TokenSpecShape, defaults: &TokenDefaults) -> Result<TokenSpec, ConfigError> {
    let (address_str, chain, top_n, threshold_usd) = match shape {
        TokenSpecShape::Bare(address) => (address, defaults.default_chain.clone(), None, None),
        TokenSpecShape::Pair(address, chain) => (address, chain, None, None),
        TokenSpecShape::Full {
            address,
            chain,
            top_n,
            threshold_usd,
        } => (address, chain, top_n, threshold_usd),
    };

    let address = address_str.parse().map_err(|e| ConfigError::MalformedTokenSpec {
        index,
        reason: format!("invalid address '{address_str}': {e}"),
    })?;

    Ok(TokenSpec {
        address,
        chain,
        top_n: top_n.unwrap_or(defaults.top_n),
        threshold_usd: threshold_usd.unwrap_or(defaults.threshold_usd),
    })
}

/// Loads and normalizes the config file, applying CLI overrides.
pub fn load(args: &CliArgs) -> Result<CoreConfig> {
    let raw = std::fs::read_to_string(&args.config)
        .map_err(|e| ConfigError::Read {
            path: args.config.display().to_string(),
            source: e,
        })
        .context("reading config file")?;

    let file: CoreConfigFile = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::Parse {
            path: args.config.display().to_string(),
            source: e,
        })
        .context("parsing config file")?;

    let chains: HashMap<String, ChainDescriptor> =
        file.chains.iter().map(|c| (c.name.clone(), c.clone())).collect();

    let defaults = file.token_defaults.clone().unwrap_or_else(|| TokenDefaults {
        top_n: default_top_n(),
        threshold_usd: default_threshold_usd(),
        // First-declared chain in the config file, not `chains.keys().next()`
        // (HashMap iteration order is unspecified and would make the
        // fallback non-deterministic across runs).
        default_chain: file.chains.first().map(|c| c.name.clone()).unwrap_or_default(),
    });

    let mut tokens = Vec::with_capacity(file.tokens.len());
    for (index, shape) in file.tokens.into_iter().enumerate() {
        let spec = normalize_token(index, shape, &defaults).context("normalizing token spec")?;
        if !chains.contains_key(&spec.chain) {
            return Err(ConfigError::UnknownChain(spec.chain.clone()).into());
        }
        tokens.push(spec);
    }

    if tokens.is_empty() {
        return Err(ConfigError::Invalid("config defines no tokens to watch".to_string()).into());
    }

    let primary_api_key = std::env::var(&file.secrets.primary_api_key_env)
        .with_context(|| format!("reading {}", file.secrets.primary_api_key_env))?;
    let sink_token = std::env::var(&file.secrets.sink_token_env)
        .with_context(|| format!("reading {}", file.secrets.sink_token_env))?;
    let sink_chat_id = std::env::var(&file.secrets.sink_chat_id_env)
        .with_context(|| format!("reading {}", file.secrets.sink_chat_id_env))?;

    Ok(CoreConfig {
        chains,
        tokens,
        block_poll_interval: Duration::from_secs(file.intervals.block_poll_secs),
        whale_refresh_interval: Duration::from_secs(file.intervals.whale_refresh_secs),
        price_refresh_interval: Duration::from_secs(file.intervals.price_refresh_secs),
        status_print_interval: Duration::from_secs(file.intervals.status_print_secs),
        cache_freshness_horizon: file.cache_freshness_horizon_secs.map(Duration::from_secs),
        dedup_capacity: file.dedup_capacity,
        max_retries: file.max_retries,
        primary_api_key,
        sink_token,
        sink_chat_id,
        primary_provider_url: file.primary_provider_url,
        secondary_provider_url: file.secondary_provider_url,
        price_oracle_url: file.price_oracle_url,
        messaging_webhook_url: file.messaging_webhook_url,
        cache_dir: args.cache_dir.clone().unwrap_or_else(|| PathBuf::from("cache")),
    })
}

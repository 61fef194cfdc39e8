// Chain Client Pool, spec §4.5 / §6. One JSON-RPC client per configured
// chain. Request shape and retry-classification style are grounded on the
// daemon-facing JSON-RPC client this workspace used to ship for its own
// node, generalized to the handful of EVM methods this pipeline needs.

use std::collections::HashMap;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ww_common::error::ChainError;

use crate::state::ChainDescriptor;

#[derive(Debug, Clone)]
pub struct ChainClientConfig {
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
}

impl Default for ChainClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub transaction_hash: String,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
}

/// A single chain's JSON-RPC capability: `chain_id`, `block_number`,
/// `get_logs`, and `call` (used only for `symbol()`/`decimals()` at init,
/// per spec §6).
pub struct ChainClient {
    pub name: String,
    rpc_url: String,
    http: reqwest::Client,
    request_id: std::sync::atomic::AtomicU64,
}

impl ChainClient {
    pub fn new(name: String, rpc_url: String, config: &ChainClientConfig) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connection_timeout)
            .build()
            .map_err(|e| ChainError::CallFailed {
                chain: name.clone(),
                method: "client_build".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name,
            rpc_url,
            http,
            request_id: std::sync::atomic::AtomicU64::new(1),
        })
    }

    async fn call_rpc<T: for<'de> Deserialize<'de>>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, ChainError> {
        let id = self
            .request_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChainError::Timeout {
                        chain: self.name.clone(),
                        method: method.to_string(),
                    }
                } else {
                    ChainError::CallFailed {
                        chain: self.name.clone(),
                        method: method.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(ChainError::CallFailed {
                chain: self.name.clone(),
                method: method.to_string(),
                reason: format!("http status {}", response.status()),
            });
        }

        let body: JsonRpcResponse<T> = response.json().await.map_err(|e| ChainError::CallFailed {
            chain: self.name.clone(),
            method: method.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(err) = body.error {
            return Err(ChainError::CallFailed {
                chain: self.name.clone(),
                method: method.to_string(),
                reason: err.message,
            });
        }

        body.result.ok_or_else(|| ChainError::CallFailed {
            chain: self.name.clone(),
            method: method.to_string(),
            reason: "empty result".to_string(),
        })
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let hex: String = self.call_rpc("eth_chainId", json!([])).await?;
        parse_hex_u64(&hex, &self.name, "eth_chainId")
    }

    pub async fn block_number(&self) -> Result<u64, ChainError> {
        let hex: String = self.call_rpc("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&hex, &self.name, "eth_blockNumber")
    }

    pub async fn get_logs(
        &self,
        from: u64,
        to: u64,
        addresses: &[Address],
        topics: &[B256],
    ) -> Result<Vec<LogEntry>, ChainError> {
        let filter = json!({
            "fromBlock": format!("0x{:x}", from),
            "toBlock": format!("0x{:x}", to),
            "address": addresses.iter().map(|a| format!("{:#x}", a)).collect::<Vec<_>>(),
            "topics": [topics.iter().map(|t| format!("{:#x}", t)).collect::<Vec<_>>()],
        });
        let raw: Vec<RawLog> = self.call_rpc("eth_getLogs", json!([filter])).await?;

        raw.into_iter()
            .map(|log| {
                let address = log.address.parse::<Address>().map_err(|e| ChainError::CallFailed {
                    chain: self.name.clone(),
                    method: "eth_getLogs".to_string(),
                    reason: format!("bad address in log: {e}"),
                })?;
                let topics = log
                    .topics
                    .iter()
                    .map(|t| t.parse::<B256>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ChainError::CallFailed {
                        chain: self.name.clone(),
                        method: "eth_getLogs".to_string(),
                        reason: format!("bad topic in log: {e}"),
                    })?;
                let data = hex::decode(log.data.trim_start_matches("0x")).map_err(|e| {
                    ChainError::CallFailed {
                        chain: self.name.clone(),
                        method: "eth_getLogs".to_string(),
                        reason: format!("bad data in log: {e}"),
                    }
                })?;
                let block_number = parse_hex_u64(&log.block_number, &self.name, "eth_getLogs")?;
                Ok(LogEntry {
                    address,
                    topics,
                    data,
                    block_number,
                    transaction_hash: log.transaction_hash,
                })
            })
            .collect()
    }

    pub async fn call(&self, contract: Address, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        let call_obj = json!({
            "to": format!("{:#x}", contract),
            "data": format!("0x{}", hex::encode(data)),
        });
        let hex_result: String = self.call_rpc("eth_call", json!([call_obj, "latest"])).await?;
        hex::decode(hex_result.trim_start_matches("0x")).map_err(|e| ChainError::CallFailed {
            chain: self.name.clone(),
            method: "eth_call".to_string(),
            reason: format!("bad eth_call return data: {e}"),
        })
    }

    /// `symbol()` selector `0x95d89b41`, decoding the ABI-encoded dynamic
    /// `string` return value.
    pub async fn symbol(&self, token: Address) -> Result<String, ChainError> {
        let raw = self.call(token, &hex::decode("95d89b41").unwrap()).await?;
        decode_abi_string(&raw).ok_or_else(|| ChainError::CallFailed {
            chain: self.name.clone(),
            method: "symbol".to_string(),
            reason: "could not decode ABI string".to_string(),
        })
    }

    /// `decimals()` selector `0x313ce567`, decoding the right-aligned
    /// `uint8` return value.
    pub async fn decimals(&self, token: Address) -> Result<u8, ChainError> {
        let raw = self.call(token, &hex::decode("313ce567").unwrap()).await?;
        raw.last().copied().ok_or_else(|| ChainError::CallFailed {
            chain: self.name.clone(),
            method: "decimals".to_string(),
            reason: "empty decimals() return".to_string(),
        })
    }
}

fn parse_hex_u64(hex_str: &str, chain: &str, method: &str) -> Result<u64, ChainError> {
    u64::from_str_radix(hex_str.trim_start_matches("0x"), 16).map_err(|e| ChainError::CallFailed {
        chain: chain.to_string(),
        method: method.to_string(),
        reason: format!("non-hex response {hex_str}: {e}"),
    })
}

/// Minimal ABI decode for a single dynamic `string` return value:
/// [offset(32)] [length(32)] [bytes...].
fn decode_abi_string(raw: &[u8]) -> Option<String> {
    if raw.len() < 64 {
        return None;
    }
    let len = u32::from_be_bytes(raw[60..64].try_into().ok()?) as usize;
    let start = 64;
    let end = start.checked_add(len)?;
    let bytes = raw.get(start..end)?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// Per-chain JSON-RPC clients plus the head block observed at init.
pub struct ChainClientPool {
    clients: HashMap<String, ChainClient>,
    heads: std::sync::RwLock<HashMap<String, u64>>,
}

impl ChainClientPool {
    /// Validates each RPC endpoint: connects, reads `chain_id`, warns on a
    /// mismatch with the descriptor, and records the current head. Fatal
    /// only if every chain fails; otherwise continues with the reachable
    /// subset (spec §4.5).
    pub async fn init(
        descriptors: &[ChainDescriptor],
        config: &ChainClientConfig,
    ) -> Result<Self, ChainError> {
        let mut clients = HashMap::new();
        let mut heads = HashMap::new();

        for descriptor in descriptors {
            let client = match ChainClient::new(descriptor.name.clone(), descriptor.rpc_url.clone(), config) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("chain '{}' unreachable at init: {e}", descriptor.name);
                    continue;
                }
            };

            match client.chain_id().await {
                Ok(observed) if observed != descriptor.chain_id => {
                    log::warn!(
                        "chain '{}' reported chain_id {} but descriptor says {}",
                        descriptor.name,
                        observed,
                        descriptor.chain_id
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("chain '{}' unreachable at init: {e}", descriptor.name);
                    continue;
                }
            }

            match client.block_number().await {
                Ok(head) => {
                    heads.insert(descriptor.name.clone(), head);
                    clients.insert(descriptor.name.clone(), client);
                }
                Err(e) => {
                    log::warn!("chain '{}' unreachable at init: {e}", descriptor.name);
                }
            }
        }

        if clients.is_empty() {
            return Err(ChainError::Unreachable {
                chain: "*".to_string(),
                reason: "every configured chain failed init".to_string(),
            });
        }

        Ok(Self {
            clients,
            heads: std::sync::RwLock::new(heads),
        })
    }

    pub fn client(&self, chain: &str) -> Result<&ChainClient, ChainError> {
        self.clients
            .get(chain)
            .ok_or_else(|| ChainError::UnknownChain(chain.to_string()))
    }

    pub fn initial_head(&self, chain: &str) -> Option<u64> {
        self.heads.read().unwrap().get(chain).copied()
    }

    pub fn chains(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(|s| s.as_str())
    }

    #[cfg(test)]
    pub fn empty_for_tests() -> Self {
        Self {
            clients: HashMap::new(),
            heads: std::sync::RwLock::new(HashMap::new()),
        }
    }
}

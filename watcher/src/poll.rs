// Log Polling Engine, spec §4.8 / §4.8.1. One instance per chain: batches
// `Transfer` log queries across all tokens on that chain, classifies hits
// against the Whale Index, and gates on USD value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use ww_common::amount::{decode_amount_be, raw_to_decimal, usd_value};
use ww_common::time::get_current_time_in_seconds;

use crate::alert::AlertSink;
use crate::chain::{ChainClientPool, LogEntry};
use crate::constants::{DEAD_ADDRESS, TRANSFER_TOPIC, ZERO_ADDRESS};
use crate::dedup::DedupSet;
use crate::state::{AlertKind, AlertRecord, ChainDescriptor, TokenRegistry, TokenState};
use crate::whale_index::WhaleIndex;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
pub const STALE_CHAIN_THRESHOLD: Duration = Duration::from_secs(180);
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;

pub struct PollEngine {
    chain: ChainDescriptor,
    chain_client: Arc<ChainClientPool>,
    tokens: TokenRegistry,
    token_addresses: Vec<Address>,
    whale_index: Arc<WhaleIndex>,
    dedup: Arc<DedupSet>,
    sink: Arc<dyn AlertSink>,
    block_poll_interval: Duration,

    last_block: u64,
    consecutive_errors: u32,
    last_new_block_at: u64,
    last_heartbeat_at: u64,
}

impl PollEngine {
    pub fn new(
        chain: ChainDescriptor,
        chain_client: Arc<ChainClientPool>,
        tokens: TokenRegistry,
        token_addresses: Vec<Address>,
        whale_index: Arc<WhaleIndex>,
        dedup: Arc<DedupSet>,
        sink: Arc<dyn AlertSink>,
        start_block: u64,
        block_poll_interval: Duration,
    ) -> Self {
        let now = get_current_time_in_seconds();
        Self {
            chain,
            chain_client,
            tokens,
            token_addresses,
            whale_index,
            dedup,
            sink,
            block_poll_interval,
            last_block: start_block,
            consecutive_errors: 0,
            last_new_block_at: now,
            last_heartbeat_at: now,
        }
    }

    /// Per-chain head-follow loop (spec §4.8). Consumes `self`: exactly one
    /// task owns a `PollEngine` for its whole lifetime.
    pub async fn run(mut self, running: Arc<AtomicBool>) {
        while running.load(Ordering::SeqCst) {
            let sleep_for = self.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Runs one tick; returns how long to sleep before the next one.
    async fn tick(&mut self) -> Duration {
        self.maybe_heartbeat();

        let client = match self.chain_client.client(&self.chain.name) {
            Ok(c) => c,
            Err(e) => {
                log::error!("chain '{}' has no client: {e}", self.chain.name);
                return self.on_tick_error().await;
            }
        };

        let head = match client.block_number().await {
            Ok(h) => h,
            Err(e) => {
                log::warn!("chain '{}' failed to read head: {e}", self.chain.name);
                return self.on_tick_error().await;
            }
        };

        if head > self.last_block {
            let from = self.last_block + 1;
            match client
                .get_logs(from, head, &self.token_addresses, &[TRANSFER_TOPIC])
                .await
            {
                Ok(logs) => {
                    for log in logs {
                        self.classify_and_dispatch(log).await;
                    }
                    self.last_block = head;
                    self.last_new_block_at = get_current_time_in_seconds();
                    self.consecutive_errors = 0;
                }
                Err(e) => {
                    log::warn!("chain '{}' get_logs failed: {e}", self.chain.name);
                    return self.on_tick_error().await;
                }
            }
        }

        self.block_poll_interval
    }

    fn maybe_heartbeat(&mut self) {
        let now = get_current_time_in_seconds();
        if now.saturating_sub(self.last_heartbeat_at) >= HEARTBEAT_INTERVAL.as_secs() {
            log::info!(
                "chain '{}' heartbeat: last_block={}",
                self.chain.name,
                self.last_block
            );
            self.last_heartbeat_at = now;
        }
        if now.saturating_sub(self.last_new_block_at) >= STALE_CHAIN_THRESHOLD.as_secs() {
            log::warn!(
                "chain '{}' has produced no new block in over {}s",
                self.chain.name,
                STALE_CHAIN_THRESHOLD.as_secs()
            );
        }
    }

    async fn on_tick_error(&mut self) -> Duration {
        self.consecutive_errors += 1;
        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            let notice = format!(
                "chain '{}' hit {} consecutive errors; pausing 60s",
                self.chain.name, self.consecutive_errors
            );
            log::error!("{notice}");
            if let Err(e) = self.sink.send_system_notice(&notice).await {
                log::warn!("failed to deliver system notice: {e}");
            }
            self.consecutive_errors = 0;
            Duration::from_secs(60)
        } else {
            Duration::from_secs((5 * self.consecutive_errors as u64).min(30))
        }
    }

    async fn classify_and_dispatch(&self, log: LogEntry) {
        if let Some(record) = self
            .classify(log, &self.tokens, &self.dedup, &self.whale_index)
            .await
        {
            if let Err(e) = self.sink.send_alert(&record, &self.chain).await {
                log::warn!("alert delivery failed: {e}");
            }
        }
    }

    async fn classify(
        &self,
        log: LogEntry,
        tokens: &TokenRegistry,
        dedup: &DedupSet,
        whale_index: &WhaleIndex,
    ) -> Option<AlertRecord> {
        // 1. Malformed.
        if log.topics.len() < 3 {
            return None;
        }

        // 2. Already processed.
        if dedup.contains(&log.transaction_hash) {
            return None;
        }

        // 3. Resolve token among those monitored on this chain.
        let handle = tokens.get(&(self.chain.name.clone(), log.address))?.clone();
        let snapshot: TokenState = handle.read().await.clone();

        // 4. Decode from/to from the low 20 bytes of their topic words.
        let from = Address::from_slice(&log.topics[1].as_slice()[12..32]);
        let to = Address::from_slice(&log.topics[2].as_slice()[12..32]);

        // 5. Flags.
        let is_mint = from == ZERO_ADDRESS;
        let is_burn = to == ZERO_ADDRESS || to == DEAD_ADDRESS;

        // 6. Check `from` first, then `to` (from wins ties).
        let (whale, rank, is_sender) = if let Some(rank) = whale_index.rank_for(from, log.address) {
            (from, rank, true)
        } else if let Some(rank) = whale_index.rank_for(to, log.address) {
            (to, rank, false)
        } else {
            return None;
        };

        // 7. Classification table.
        let kind = if is_sender {
            if is_burn {
                AlertKind::Burn
            } else {
                AlertKind::Sell
            }
        } else if is_mint {
            AlertKind::Mint
        } else {
            AlertKind::Buy
        };

        // 8. Amount / USD value.
        let raw = decode_amount_be(&log.data);
        let amount = raw_to_decimal(raw, snapshot.decimals)?;
        let value = usd_value(amount, snapshot.price);

        // 9/10. Threshold gate; dedup insertion happens either way.
        dedup.add(log.transaction_hash.clone());
        if value < rust_decimal::Decimal::try_from(snapshot.threshold_usd).unwrap_or_default() {
            return None;
        }

        Some(AlertRecord {
            token: log.address,
            whale,
            rank,
            kind,
            amount,
            usd_value: value,
            tx_hash: log.transaction_hash,
            block_number: log.block_number,
            chain: self.chain.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TokenSpec;
    use alloy_primitives::{address, B256};

    fn make_log(from: Address, to: Address, token: Address, amount_raw: u64, tx: &str) -> LogEntry {
        let mut from_word = [0u8; 32];
        from_word[12..32].copy_from_slice(from.as_slice());
        let mut to_word = [0u8; 32];
        to_word[12..32].copy_from_slice(to.as_slice());

        let mut data = [0u8; 32];
        data[24..32].copy_from_slice(&amount_raw.to_be_bytes());

        LogEntry {
            address: token,
            topics: vec![TRANSFER_TOPIC, B256::from(from_word), B256::from(to_word)],
            data: data.to_vec(),
            block_number: 100,
            transaction_hash: tx.to_string(),
        }
    }

    #[tokio::test]
    async fn malformed_log_with_too_few_topics_is_dropped() {
        let token = address!("0000000000000000000000000000000000000a");
        let (engine, registry, whale_index) = build_engine(token, 1.0, 2.0).await;
        let mut log = make_log(Address::ZERO, Address::ZERO, token, 5, "0xdeadbeef");
        log.topics.truncate(2);
        let dedup = DedupSet::new(16);
        assert!(engine.classify(log, &registry, &dedup, &whale_index).await.is_none());
    }

    #[tokio::test]
    async fn mint_to_whale_is_classified_mint() {
        let token = address!("0000000000000000000000000000000000000b");
        let whale = address!("000000000000000000000000000000000000aa");
        let (engine, registry, whale_index) = build_engine(token, 1.0, 2.0).await;
        install_whale(&whale_index, token, whale, 3);

        let log = make_log(Address::ZERO, whale, token, 5_000_000_000_000_000_000, "0xaaa1");
        let dedup = DedupSet::new(16);
        let record = engine.classify(log, &registry, &dedup, &whale_index).await.unwrap();
        assert_eq!(record.kind, AlertKind::Mint);
        assert_eq!(record.rank, 3);
        assert_eq!(record.amount, rust_decimal::Decimal::from(5));
        assert_eq!(record.usd_value, rust_decimal::Decimal::from(10));
    }

    #[tokio::test]
    async fn below_threshold_transfer_enters_dedup_without_alert() {
        let token = address!("0000000000000000000000000000000000000c");
        let whale = address!("000000000000000000000000000000000000bb");
        let (engine, registry, whale_index) = build_engine(token, 1.0, 0.0001).await;
        install_whale(&whale_index, token, whale, 3);

        let log = make_log(Address::ZERO, whale, token, 5_000_000_000_000_000_000, "0xbbb1");
        let dedup = DedupSet::new(16);
        let record = engine.classify(log, &registry, &dedup, &whale_index).await;
        assert!(record.is_none());
        assert!(dedup.contains("0xbbb1"));
    }

    #[tokio::test]
    async fn reprocessing_the_same_tx_hash_yields_no_second_alert() {
        let token = address!("0000000000000000000000000000000000000d");
        let whale = address!("000000000000000000000000000000000000cc");
        let (engine, registry, whale_index) = build_engine(token, 1.0, 2.0).await;
        install_whale(&whale_index, token, whale, 3);

        let log1 = make_log(Address::ZERO, whale, token, 5_000_000_000_000_000_000, "0xccc1");
        let log2 = make_log(Address::ZERO, whale, token, 5_000_000_000_000_000_000, "0xccc1");
        let dedup = DedupSet::new(16);

        let first = engine.classify(log1, &registry, &dedup, &whale_index).await;
        assert!(first.is_some());
        let second = engine.classify(log2, &registry, &dedup, &whale_index).await;
        assert!(second.is_none());
        assert_eq!(dedup.len(), 1);
    }

    #[tokio::test]
    async fn sell_between_two_whales_reports_sender_only() {
        let token = address!("0000000000000000000000000000000000000e");
        let sender = address!("000000000000000000000000000000000000dd");
        let recipient = address!("000000000000000000000000000000000000ee");
        let (engine, registry, whale_index) = build_engine(token, 1.0, 2.0).await;
        install_whale(&whale_index, token, sender, 1);
        install_whale(&whale_index, token, recipient, 2);

        let log = make_log(sender, recipient, token, 5_000_000_000_000_000_000, "0xddd1");
        let dedup = DedupSet::new(16);
        let record = engine.classify(log, &registry, &dedup, &whale_index).await.unwrap();
        assert_eq!(record.kind, AlertKind::Sell);
        assert_eq!(record.whale, sender);
        assert_eq!(record.rank, 1);
    }

    fn install_whale(index: &WhaleIndex, token: Address, whale: Address, rank: u32) {
        let mut set = std::collections::HashSet::new();
        set.insert(whale);
        let mut details = HashMap::new();
        details.insert(
            whale,
            crate::state::HolderDetail {
                rank,
                balance: "1".to_string(),
            },
        );
        index.replace(token, &std::collections::HashSet::new(), &set, &details);
    }

    async fn build_engine(token: Address, threshold_usd: f64, price: f64) -> (PollEngine, TokenRegistry, Arc<WhaleIndex>) {
        let registry: TokenRegistry = Arc::new(dashmap::DashMap::new());
        let spec = TokenSpec {
            address: token,
            chain: "ethereum".to_string(),
            top_n: 10,
            threshold_usd,
        };
        let mut state = TokenState::new(&spec, "TEST".to_string(), 18);
        state.price = price;
        registry.insert(
            ("ethereum".to_string(), token),
            Arc::new(tokio::sync::RwLock::new(state)),
        );

        let whale_index = Arc::new(WhaleIndex::new());
        let chain = ChainDescriptor {
            name: "ethereum".to_string(),
            chain_id: 1,
            rpc_url: "http://127.0.0.1:1".to_string(),
            explorer_base_url: "https://etherscan.io".to_string(),
            price_prefix: "ethereum".to_string(),
            display_name: "Ethereum".to_string(),
        };

        // `ChainClientPool` is never touched by `classify`; an empty pool
        // is enough for these classification-only tests.
        let engine = PollEngine {
            chain,
            chain_client: Arc::new(ChainClientPool::empty_for_tests()),
            tokens: registry.clone(),
            token_addresses: vec![token],
            whale_index: whale_index.clone(),
            dedup: Arc::new(DedupSet::new(16)),
            sink: Arc::new(crate::alert::NullSink::default()),
            block_poll_interval: Duration::from_secs(12),
            last_block: 0,
            consecutive_errors: 0,
            last_new_block_at: get_current_time_in_seconds(),
            last_heartbeat_at: get_current_time_in_seconds(),
        };
        (engine, registry, whale_index)
    }
}

// Refresh Engine, spec §4.7. Per-token state machine that chooses a source
// by freshness + degradation rules and atomically installs a new whale-set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use ww_common::error::ProviderError;
use ww_common::time::get_current_time_in_seconds;

use crate::alert::AlertSink;
use crate::cache::HolderCacheStore;
use crate::providers::cache_adapter::CacheAdapter;
use crate::providers::{filter_and_rank, to_holder_entries, HolderProvider, RankedHolder};
use crate::state::{ChainDescriptor, HolderDetail, TokenKey, TokenRegistry, TokenState};
use crate::whale_index::WhaleIndex;

pub struct RefreshEngine {
    cache: Arc<HolderCacheStore>,
    cache_fresh: CacheAdapter,
    cache_stale: CacheAdapter,
    primary: Arc<dyn HolderProvider>,
    secondary: Arc<dyn HolderProvider>,
    whale_index: Arc<WhaleIndex>,
    registry: TokenRegistry,
    descriptors: Arc<HashMap<String, ChainDescriptor>>,
    sink: Arc<dyn AlertSink>,
    freshness_horizon: Option<Duration>,
    refresh_interval: Duration,
    tick_interval: Duration,
}

impl RefreshEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<HolderCacheStore>,
        primary: Arc<dyn HolderProvider>,
        secondary: Arc<dyn HolderProvider>,
        whale_index: Arc<WhaleIndex>,
        registry: TokenRegistry,
        descriptors: Arc<HashMap<String, ChainDescriptor>>,
        sink: Arc<dyn AlertSink>,
        freshness_horizon: Option<Duration>,
        refresh_interval: Duration,
        tick_interval: Duration,
    ) -> Self {
        let cache_fresh = CacheAdapter::new(cache.clone(), freshness_horizon);
        let cache_stale = CacheAdapter::new(cache.clone(), None);
        Self {
            cache,
            cache_fresh,
            cache_stale,
            primary,
            secondary,
            whale_index,
            registry,
            descriptors,
            sink,
            freshness_horizon,
            refresh_interval,
            tick_interval,
        }
    }

    /// Runs the refresh policy for one token (spec §4.7 ordered policy).
    pub async fn refresh_token(&self, key: TokenKey) {
        let handle = match self.registry.get(&key) {
            Some(h) => h.clone(),
            None => return,
        };
        let token_addr = key.1;

        let snapshot = handle.read().await.clone();
        let chain_id = self
            .descriptors
            .get(&snapshot.chain)
            .map(|d| d.chain_id)
            .unwrap_or_default();

        // 1. Fresh cache document, if a horizon is configured.
        if self.freshness_horizon.is_some() {
            if let Ok(holders) = self.cache_fresh.fetch(&snapshot, chain_id).await {
                let holders = filter_and_rank(holders, snapshot.top_n);
                self.install(&key, "cache", holders).await;
                return;
            }
        }

        // 2. Primary adapter, unless degraded.
        if !snapshot.is_degraded("primary") {
            match self.primary.fetch(&snapshot, chain_id).await {
                Ok(holders) => {
                    let holders = filter_and_rank(holders, snapshot.top_n);
                    self.write_through_and_install(&key, &snapshot, "primary", holders)
                        .await;
                    return;
                }
                Err(ProviderError::RateLimited) => {
                    handle.write().await.set_degraded("primary");
                    let notice = format!(
                        "primary provider rate-limited for {:#x} on {}; degrading",
                        token_addr, snapshot.chain
                    );
                    log::warn!("{notice}");
                    if let Err(e) = self.sink.send_system_notice(&notice).await {
                        log::warn!("failed to deliver system notice: {e}");
                    }
                }
                Err(e) => {
                    if log::log_enabled!(log::Level::Debug) {
                        log::debug!("primary adapter failed for {:#x}: {e}", token_addr);
                    }
                }
            }
        }

        // 3. Secondary adapter (Ethereum only).
        match self.secondary.fetch(&snapshot, chain_id).await {
            Ok(holders) => {
                let holders = filter_and_rank(holders, snapshot.top_n);
                self.write_through_and_install(&key, &snapshot, self.secondary.name(), holders)
                    .await;
                return;
            }
            Err(e) => {
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!("secondary adapter failed for {:#x}: {e}", token_addr);
                }
            }
        }

        // 4. Stale cache, no freshness check.
        if let Ok(holders) = self.cache_stale.fetch(&snapshot, chain_id).await {
            let holders = filter_and_rank(holders, snapshot.top_n);
            self.install(&key, "stale-cache", holders).await;
            return;
        }

        // 5. Hard failure; prior state stands.
        log::error!(
            "refresh exhausted all sources for {:#x} on {}; keeping prior state",
            token_addr,
            snapshot.chain
        );
    }

    async fn write_through_and_install(
        &self,
        key: &TokenKey,
        snapshot: &TokenState,
        source: &str,
        holders: Vec<RankedHolder>,
    ) {
        let entries = to_holder_entries(&holders);
        if let Err(e) = self.cache.save(
            &snapshot.chain,
            key.1,
            &entries,
            &snapshot.symbol,
            source,
            snapshot.decimals,
        ) {
            log::warn!("failed to write cache for {:#x}: {e}", key.1);
        }
        self.install(key, source, holders).await;
    }

    /// The only legal way to mutate ranking state (spec §4.7 Install
    /// procedure): swap the index before swapping `TokenState` fields.
    async fn install(&self, key: &TokenKey, source: &str, holders: Vec<RankedHolder>) {
        let handle = match self.registry.get(key) {
            Some(h) => h.clone(),
            None => return,
        };

        let new_whitelist: std::collections::HashSet<Address> =
            holders.iter().map(|h| h.address).collect();
        let new_details: HashMap<Address, HolderDetail> = holders
            .iter()
            .map(|h| {
                (
                    h.address,
                    HolderDetail {
                        rank: h.rank,
                        balance: h.balance.clone(),
                    },
                )
            })
            .collect();

        let old_whitelist = handle.read().await.whitelist.clone();
        self.whale_index
            .replace(key.1, &old_whitelist, &new_whitelist, &new_details);

        let mut state = handle.write().await;
        state.whitelist = new_whitelist;
        state.details = new_details;
        state.last_refresh = get_current_time_in_seconds();
        state.source = Some(source.to_string());
    }

    /// Background loop: wakes every `tick_interval`, refreshing any token
    /// whose `refresh_interval` has elapsed (spec §4.7 Scheduling).
    pub async fn run(self: Arc<Self>, running: Arc<AtomicBool>) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }

            let due: Vec<TokenKey> = {
                let mut due = Vec::new();
                for entry in self.registry.iter() {
                    let state = entry.value().read().await;
                    if get_current_time_in_seconds().saturating_sub(state.last_refresh)
                        >= self.refresh_interval.as_secs()
                    {
                        due.push(entry.key().clone());
                    }
                }
                due
            };

            for key in due {
                self.refresh_token(key).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::NullSink;
    use crate::state::TokenSpec;
    use alloy_primitives::address;
    use async_trait::async_trait;

    struct AlwaysFails;
    #[async_trait]
    impl HolderProvider for AlwaysFails {
        fn name(&self) -> &'static str {
            "always-fails"
        }
        async fn fetch(&self, _token: &TokenState, _chain_id: u64) -> Result<Vec<RankedHolder>, ProviderError> {
            Err(ProviderError::Empty)
        }
    }

    struct AlwaysRateLimited;
    #[async_trait]
    impl HolderProvider for AlwaysRateLimited {
        fn name(&self) -> &'static str {
            "primary"
        }
        async fn fetch(&self, _token: &TokenState, _chain_id: u64) -> Result<Vec<RankedHolder>, ProviderError> {
            Err(ProviderError::RateLimited)
        }
    }

    struct FakeSucceeds {
        tag: &'static str,
    }
    #[async_trait]
    impl HolderProvider for FakeSucceeds {
        fn name(&self) -> &'static str {
            self.tag
        }
        async fn fetch(&self, _token: &TokenState, _chain_id: u64) -> Result<Vec<RankedHolder>, ProviderError> {
            Ok(vec![RankedHolder {
                address: address!("000000000000000000000000000000000000aa"),
                rank: 1,
                balance: "1000".to_string(),
            }])
        }
    }

    fn setup_registry(token_addr: Address) -> (TokenRegistry, Arc<WhaleIndex>, TokenKey) {
        let registry: TokenRegistry = Arc::new(dashmap::DashMap::new());
        let spec = TokenSpec {
            address: token_addr,
            chain: "ethereum".to_string(),
            top_n: 10,
            threshold_usd: 100.0,
        };
        let state = TokenState::new(&spec, "TEST".to_string(), 18);
        let key: TokenKey = ("ethereum".to_string(), token_addr);
        registry.insert(key.clone(), Arc::new(tokio::sync::RwLock::new(state)));
        (registry, Arc::new(WhaleIndex::new()), key)
    }

    fn tempdir_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("{name}-{}", std::process::id()))
    }

    #[tokio::test]
    async fn rate_limit_sets_degradation_flag_and_falls_through_to_secondary() {
        let token_addr = address!("000000000000000000000000000000000000bb");
        let (registry, whale_index, key) = setup_registry(token_addr);
        let dir = tempdir_path("ww-refresh-ratelimit");
        let cache = Arc::new(HolderCacheStore::new(&dir));

        let engine = RefreshEngine::new(
            cache,
            Arc::new(AlwaysRateLimited),
            Arc::new(FakeSucceeds { tag: "ethplorer" }),
            whale_index.clone(),
            registry.clone(),
            Arc::new(HashMap::new()),
            Arc::new(NullSink::default()),
            None,
            Duration::from_secs(300),
            Duration::from_secs(10),
        );

        engine.refresh_token(key.clone()).await;

        let state = registry.get(&key).unwrap().clone();
        let state = state.read().await;
        assert!(state.is_degraded("primary"));
        assert_eq!(state.source.as_deref(), Some("ethplorer"));
        assert!(!state.whitelist.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn all_sources_failing_leaves_prior_state_intact() {
        let token_addr = address!("000000000000000000000000000000000000cc");
        let (registry, whale_index, key) = setup_registry(token_addr);
        let dir = tempdir_path("ww-refresh-allfail");
        let cache = Arc::new(HolderCacheStore::new(&dir));

        let engine = RefreshEngine::new(
            cache,
            Arc::new(AlwaysFails),
            Arc::new(AlwaysFails),
            whale_index,
            registry.clone(),
            Arc::new(HashMap::new()),
            Arc::new(NullSink::default()),
            None,
            Duration::from_secs(300),
            Duration::from_secs(10),
        );

        engine.refresh_token(key.clone()).await;

        let state = registry.get(&key).unwrap().clone();
        let state = state.read().await;
        assert!(state.whitelist.is_empty());
        assert_eq!(state.last_refresh, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn second_refresh_within_horizon_is_a_noop_on_the_index() {
        let token_addr = address!("000000000000000000000000000000000000dd");
        let (registry, whale_index, key) = setup_registry(token_addr);
        let dir = tempdir_path("ww-refresh-idempotent");
        let cache = Arc::new(HolderCacheStore::new(&dir));

        let engine = RefreshEngine::new(
            cache.clone(),
            Arc::new(FakeSucceeds { tag: "primary" }),
            Arc::new(AlwaysFails),
            whale_index,
            registry.clone(),
            Arc::new(HashMap::new()),
            Arc::new(NullSink::default()),
            Some(Duration::from_secs(1800)),
            Duration::from_secs(300),
            Duration::from_secs(10),
        );

        engine.refresh_token(key.clone()).await;
        let first = registry.get(&key).unwrap().clone();
        let first_whitelist = first.read().await.whitelist.clone();

        engine.refresh_token(key.clone()).await;
        let second_whitelist = first.read().await.whitelist.clone();

        assert_eq!(first_whitelist, second_whitelist);

        let _ = std::fs::remove_dir_all(&dir);
    }
}

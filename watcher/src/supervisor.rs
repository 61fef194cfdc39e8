// Supervisor, spec §5 Scheduling model. Owns every shared resource's
// lifetime and spawns the fixed task set: one refresh-scheduler, one
// status-printer, one price-refresh, and N polling tasks (one per chain).
// Shutdown is cooperative on a shared `running` flag, the same pattern
// `DiscoveryServer` uses for its receive loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::Address;

use crate::alert::{AlertSink, MessagingSink};
use crate::cache::HolderCacheStore;
use crate::chain::{ChainClientConfig, ChainClientPool};
use crate::config::CoreConfig;
use crate::dedup::DedupSet;
use crate::price::PriceOracleClient;
use crate::providers::primary::PrimaryProvider;
use crate::providers::secondary::SecondaryProvider;
use crate::providers::HolderProvider;
use crate::refresh::RefreshEngine;
use crate::poll::PollEngine;
use crate::state::{ChainDescriptor, TokenRegistry, TokenState};
use crate::whale_index::WhaleIndex;

pub struct Supervisor {
    config: CoreConfig,
    registry: TokenRegistry,
    whale_index: Arc<WhaleIndex>,
    dedup: Arc<DedupSet>,
    cache: Arc<HolderCacheStore>,
    chain_client: Arc<ChainClientPool>,
    sink: Arc<dyn AlertSink>,
    running: Arc<AtomicBool>,
}

impl Supervisor {
    /// Resolves `symbol()`/`decimals()` for each token at init (spec §6(a)).
    /// A token whose metadata call fails is dropped with a warning
    /// (`TokenMetadataUnavailable`, spec §7: non-fatal).
    pub async fn init(config: CoreConfig) -> anyhow::Result<Self> {
        let chain_client = Arc::new(
            ChainClientPool::init(
                &config.chains.values().cloned().collect::<Vec<_>>(),
                &ChainClientConfig::default(),
            )
            .await?,
        );

        let registry: TokenRegistry = Arc::new(dashmap::DashMap::new());
        for spec in &config.tokens {
            let client = match chain_client.client(&spec.chain) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("skipping {:#x}: {e}", spec.address);
                    continue;
                }
            };

            let symbol = match client.symbol(spec.address).await {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("token metadata unavailable for {:#x}: {e}", spec.address);
                    continue;
                }
            };
            let decimals = match client.decimals(spec.address).await {
                Ok(d) => d,
                Err(e) => {
                    log::warn!("token metadata unavailable for {:#x}: {e}", spec.address);
                    continue;
                }
            };

            let state = TokenState::new(spec, symbol, decimals);
            registry.insert(
                (spec.chain.clone(), spec.address),
                Arc::new(tokio::sync::RwLock::new(state)),
            );
        }

        if registry.is_empty() {
            anyhow::bail!("no token survived metadata resolution; nothing to watch");
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        let sink = Arc::new(MessagingSink::new(
            http.clone(),
            config.messaging_webhook_url.clone(),
            config.sink_chat_id.clone(),
            config.sink_token.clone(),
        ));

        Ok(Self {
            registry,
            whale_index: Arc::new(WhaleIndex::new()),
            dedup: Arc::new(DedupSet::new(config.dedup_capacity)),
            cache: Arc::new(HolderCacheStore::new(config.cache_dir.clone())),
            chain_client,
            sink,
            config,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Spawns the fixed task set and blocks until `SIGINT`/`SIGTERM` flips
    /// the running flag (SPEC_FULL.md §F).
    pub async fn run(self) -> anyhow::Result<()> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        let primary: Arc<dyn HolderProvider> = Arc::new(
            PrimaryProvider::new(
                http.clone(),
                self.config.primary_provider_url.clone(),
                self.config.primary_api_key.clone(),
            )
            .with_max_retries(self.config.max_retries),
        );
        let secondary: Arc<dyn HolderProvider> = Arc::new(
            SecondaryProvider::new(http.clone(), self.config.secondary_provider_url.clone())
                .with_max_retries(self.config.max_retries),
        );
        let descriptors: Arc<HashMap<String, ChainDescriptor>> = Arc::new(self.config.chains.clone());

        let refresh_engine = Arc::new(RefreshEngine::new(
            self.cache.clone(),
            primary,
            secondary,
            self.whale_index.clone(),
            self.registry.clone(),
            descriptors.clone(),
            self.sink.clone(),
            self.config.cache_freshness_horizon,
            self.config.whale_refresh_interval,
            std::time::Duration::from_secs(10),
        ));

        let price_client = Arc::new(PriceOracleClient::new(http, self.config.price_oracle_url.clone()));

        let mut handles = Vec::new();

        {
            let engine = refresh_engine.clone();
            let running = self.running.clone();
            handles.push(tokio::spawn(async move { engine.run(running).await }));
        }

        {
            let registry = self.registry.clone();
            let descriptors = descriptors.clone();
            let running = self.running.clone();
            let interval = self.config.price_refresh_interval;
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                while running.load(Ordering::SeqCst) {
                    ticker.tick().await;
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    let updated = price_client.refresh_all(&registry, &descriptors).await;
                    log::debug!("price refresh updated {updated} tokens");
                }
            }));
        }

        {
            let registry = self.registry.clone();
            let dedup = self.dedup.clone();
            let running = self.running.clone();
            let interval = self.config.status_print_interval;
            handles.push(tokio::spawn(async move {
                status_loop(registry, dedup, running, interval).await
            }));
        }

        for chain in self.config.chains.values() {
            let token_addresses: Vec<Address> = self
                .config
                .tokens
                .iter()
                .filter(|t| t.chain == chain.name)
                .map(|t| t.address)
                .collect();
            if token_addresses.is_empty() {
                continue;
            }

            let start_block = self.chain_client.initial_head(&chain.name).unwrap_or(0);
            let engine = PollEngine::new(
                chain.clone(),
                self.chain_client.clone(),
                self.registry.clone(),
                token_addresses,
                self.whale_index.clone(),
                self.dedup.clone(),
                self.sink.clone(),
                start_block,
                self.config.block_poll_interval,
            );
            let running = self.running.clone();
            handles.push(tokio::spawn(async move { engine.run(running).await }));
        }

        wait_for_shutdown_signal().await;
        log::info!("shutdown signal received, stopping");
        self.running.store(false, Ordering::SeqCst);

        for handle in handles {
            let _ = handle.await;
        }

        Ok(())
    }
}

/// Periodically logs a one-line summary of pipeline activity (spec §2/§5:
/// "a status-printer task... samples counters").
async fn status_loop(
    registry: TokenRegistry,
    dedup: Arc<DedupSet>,
    running: Arc<AtomicBool>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    while running.load(Ordering::SeqCst) {
        ticker.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let mut degraded = 0;
        for entry in registry.iter() {
            if entry.value().read().await.is_degraded("primary") {
                degraded += 1;
            }
        }

        log::info!(
            "status: {} tokens tracked ({} degraded), {} dedup entries",
            registry.len(),
            degraded,
            dedup.len(),
        );
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

// Price Oracle Client, spec §4.4. Batched spot-price fetcher keyed by
// `chain-prefix:address`.

use std::collections::HashMap;

use serde::Deserialize;
use ww_common::time::get_current_time_in_seconds;

use crate::state::{ChainDescriptor, TokenRegistry};

#[derive(Debug, Deserialize)]
struct PriceResponse {
    coins: HashMap<String, CoinPrice>,
}

#[derive(Debug, Deserialize)]
struct CoinPrice {
    price: f64,
}

pub struct PriceOracleClient {
    http: reqwest::Client,
    base_url: String,
}

impl PriceOracleClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// Forms one request for every monitored token, keyed by the
    /// comma-joined `chain-prefix:address` list. Missing entries in the
    /// response are left untouched; a whole-request failure is logged and
    /// counted, with no per-token retry (spec §4.4).
    pub async fn refresh_all(
        &self,
        registry: &TokenRegistry,
        descriptors: &HashMap<String, ChainDescriptor>,
    ) -> usize {
        let mut key_to_token = HashMap::new();
        for entry in registry.iter() {
            let state = entry.value().read().await;
            let prefix = descriptors
                .get(&state.chain)
                .map(|d| d.price_prefix.clone())
                .unwrap_or_default();
            let key = format!("{}:{:#x}", prefix, state.address);
            key_to_token.insert(key, entry.key().clone());
        }

        if key_to_token.is_empty() {
            return 0;
        }

        let joined = key_to_token.keys().cloned().collect::<Vec<_>>().join(",");
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), joined);

        let response = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("price oracle request failed: {e}");
                return 0;
            }
        };

        if !response.status().is_success() {
            log::warn!("price oracle returned status {}", response.status());
            return 0;
        }

        let body: PriceResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                log::warn!("price oracle response could not be parsed: {e}");
                return 0;
            }
        };

        let mut updated = 0;
        let now = get_current_time_in_seconds();
        for (key, coin) in body.coins {
            if let Some(token_key) = key_to_token.get(&key) {
                if let Some(handle) = registry.get(token_key) {
                    let mut state = handle.write().await;
                    state.price = coin.price;
                    state.price_updated_at = now;
                    updated += 1;
                }
            }
        }
        updated
    }
}

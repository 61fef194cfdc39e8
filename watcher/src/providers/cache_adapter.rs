// Cache Holder Provider Adapter, spec §4.3. Reads the Holder Cache Store;
// used either as the preferred fresh source (with a freshness horizon) or
// as the last-resort backup (with none).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ww_common::error::ProviderError;

use crate::cache::HolderCacheStore;
use crate::providers::{HolderProvider, RankedHolder};
use crate::state::TokenState;

pub struct CacheAdapter {
    store: Arc<HolderCacheStore>,
    max_age: Option<Duration>,
}

impl CacheAdapter {
    pub fn new(store: Arc<HolderCacheStore>, max_age: Option<Duration>) -> Self {
        Self { store, max_age }
    }
}

#[async_trait]
impl HolderProvider for CacheAdapter {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn fetch(&self, token: &TokenState, _chain_id: u64) -> Result<Vec<RankedHolder>, ProviderError> {
        let doc = self
            .store
            .load(&token.chain, token.address, self.max_age)
            .ok_or(ProviderError::Empty)?;

        if doc.holders.is_empty() {
            return Err(ProviderError::Empty);
        }

        Ok(doc
            .holders
            .into_iter()
            .map(|h| RankedHolder {
                address: h.address,
                rank: h.rank,
                balance: h.balance,
            })
            .collect())
    }
}

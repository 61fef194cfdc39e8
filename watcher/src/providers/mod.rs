// Holder Provider Adapters, spec §4.3. Uniform capability over heterogeneous
// upstreams: primary paid provider, free fallback, local cache.

pub mod cache_adapter;
pub mod primary;
pub mod secondary;

use alloy_primitives::Address;
use async_trait::async_trait;
use ww_common::error::ProviderError;

use crate::state::{HolderEntry, TokenState};

/// One ranked holder as an adapter assembles it, before it's stored in
/// `TokenState.details`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedHolder {
    pub address: Address,
    pub rank: u32,
    pub balance: String,
}

#[async_trait]
pub trait HolderProvider: Send + Sync {
    /// Short tag recorded as the cache document's `source` field.
    fn name(&self) -> &'static str;

    async fn fetch(&self, token: &TokenState, chain_id: u64) -> Result<Vec<RankedHolder>, ProviderError>;
}

/// Filters ignore-list addresses, re-ranks the remainder starting at 1, and
/// truncates to `top_n` (spec §4.3: filter then truncate, in that order).
pub fn filter_and_rank(mut holders: Vec<RankedHolder>, top_n: u32) -> Vec<RankedHolder> {
    holders.retain(|h| !crate::constants::is_ignored(&h.address));
    holders.sort_by_key(|h| h.rank);
    for (i, holder) in holders.iter_mut().enumerate() {
        holder.rank = (i + 1) as u32;
    }
    holders.truncate(top_n as usize);
    holders
}

pub fn to_holder_entries(holders: &[RankedHolder]) -> Vec<HolderEntry> {
    holders
        .iter()
        .map(|h| HolderEntry {
            address: h.address,
            rank: h.rank,
            balance: h.balance.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn holder(addr: Address, rank: u32) -> RankedHolder {
        RankedHolder {
            address: addr,
            rank,
            balance: "1".to_string(),
        }
    }

    #[test]
    fn filter_and_rank_drops_ignored_addresses_and_renumbers() {
        let whale = address!("000000000000000000000000000000000000aa");
        let holders = vec![holder(Address::ZERO, 1), holder(whale, 2)];
        let result = filter_and_rank(holders, 10);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].address, whale);
        assert_eq!(result[0].rank, 1);
    }

    #[test]
    fn filter_and_rank_truncates_to_top_n() {
        let whale_a = address!("000000000000000000000000000000000000aa");
        let whale_b = address!("000000000000000000000000000000000000bb");
        let holders = vec![holder(whale_a, 1), holder(whale_b, 2)];
        let result = filter_and_rank(holders, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].address, whale_a);
    }

    #[test]
    fn top_n_zero_yields_no_whales() {
        let whale = address!("000000000000000000000000000000000000aa");
        let holders = vec![holder(whale, 1)];
        assert!(filter_and_rank(holders, 0).is_empty());
    }
}

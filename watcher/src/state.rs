// Core data model, spec §3.

use std::collections::HashMap;

use alloy_primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ww_common::time::TimestampSeconds;

/// Immutable per-chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub explorer_base_url: String,
    /// Prefix used by the price oracle for `chain-prefix:address` keys.
    pub price_prefix: String,
    pub display_name: String,
}

/// Immutable per-token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSpec {
    pub address: Address,
    pub chain: String,
    pub top_n: u32,
    pub threshold_usd: f64,
}

/// One ranked holder, as returned by a provider adapter or read back from
/// the cache store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HolderEntry {
    pub address: Address,
    pub rank: u32,
    pub balance: String, // raw integer units, stored as a decimal string
}

/// Per-address detail kept alongside the whitelist set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderDetail {
    pub rank: u32,
    pub balance: String,
}

/// Mutable per-token runtime record. Ranking/provenance fields are mutated
/// only by the Refresh Engine; price fields only by the Price Oracle Client
/// (spec §3 Ownership).
#[derive(Debug, Clone)]
pub struct TokenState {
    pub address: Address,
    pub chain: String,
    pub symbol: String,
    pub decimals: u8,

    pub price: f64,
    pub price_updated_at: TimestampSeconds,

    pub whitelist: std::collections::HashSet<Address>,
    pub details: HashMap<Address, HolderDetail>,

    pub source: Option<String>,
    pub last_refresh: TimestampSeconds,

    pub top_n: u32,
    pub threshold_usd: f64,

    /// Per-upstream degradation flags, keyed by adapter name ("primary").
    pub degraded: HashMap<String, bool>,
}

impl TokenState {
    pub fn new(spec: &TokenSpec, symbol: String, decimals: u8) -> Self {
        Self {
            address: spec.address,
            chain: spec.chain.clone(),
            symbol,
            decimals,
            price: 0.0,
            price_updated_at: 0,
            whitelist: std::collections::HashSet::new(),
            details: HashMap::new(),
            source: None,
            last_refresh: 0,
            top_n: spec.top_n,
            threshold_usd: spec.threshold_usd,
            degraded: HashMap::new(),
        }
    }

    pub fn is_degraded(&self, adapter: &str) -> bool {
        self.degraded.get(adapter).copied().unwrap_or(false)
    }

    pub fn set_degraded(&mut self, adapter: &str) {
        self.degraded.insert(adapter.to_string(), true);
    }

    /// Decimal amount for a raw balance, using this token's decimals.
    pub fn to_decimal_amount(&self, raw: alloy_primitives::U256) -> Option<Decimal> {
        ww_common::amount::raw_to_decimal(raw, self.decimals)
    }
}

/// Shared handle to a single token's runtime record. The Supervisor owns
/// the registry; the Refresh Engine and Price Oracle Client are the only
/// mutators (spec §3 Ownership).
pub type TokenHandle = std::sync::Arc<tokio::sync::RwLock<TokenState>>;

/// Identifies one configured token: chain name plus address. Two tokens can
/// legitimately share an address across chains (e.g. a CREATE2 deployment
/// repeated on multiple EVM chains), so the registry is keyed on the pair
/// rather than address alone — unlike `WhaleIndex`, which spec §4.6 fixes
/// as address-only by design.
pub type TokenKey = (String, Address);

/// All monitored tokens, keyed by `(chain, address)`.
pub type TokenRegistry = std::sync::Arc<dashmap::DashMap<TokenKey, TokenHandle>>;

/// On-disk cache document, spec §3 `CachedHolderSet`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedHolderSet {
    pub token_address: String,
    #[serde(default)]
    pub chain: Option<String>,
    pub symbol: String,
    pub decimals: u8,
    pub updated_at: f64,
    pub source: String,
    pub holders: Vec<HolderEntry>,
}

/// A transfer classified against the whale index, ready for the Alert
/// Formatter (spec §3, ephemeral — never persisted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertKind {
    Buy,
    Sell,
    Mint,
    Burn,
}

#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub token: Address,
    pub whale: Address,
    pub rank: u32,
    pub kind: AlertKind,
    pub amount: Decimal,
    pub usd_value: Decimal,
    pub tx_hash: String,
    pub block_number: u64,
    pub chain: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TokenSpec {
        TokenSpec {
            address: Address::ZERO,
            chain: "ethereum".to_string(),
            top_n: 20,
            threshold_usd: 1000.0,
        }
    }

    #[test]
    fn new_token_state_starts_with_zero_price_and_no_whales() {
        let state = TokenState::new(&spec(), "TEST".to_string(), 18);
        assert_eq!(state.price, 0.0);
        assert!(state.whitelist.is_empty());
        assert!(!state.is_degraded("primary"));
    }

    #[test]
    fn set_degraded_marks_only_the_named_adapter() {
        let mut state = TokenState::new(&spec(), "TEST".to_string(), 18);
        state.set_degraded("primary");
        assert!(state.is_degraded("primary"));
        assert!(!state.is_degraded("secondary"));
    }
}

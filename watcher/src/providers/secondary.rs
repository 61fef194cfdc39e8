// Secondary Holder Provider Adapter, spec §4.3. Free ranked-holders
// endpoint; canonical Ethereum only.

use async_trait::async_trait;
use serde::Deserialize;
use ww_common::error::ProviderError;
use ww_common::retry::{retry, RetryPolicy};

use crate::providers::{HolderProvider, RankedHolder};
use crate::state::TokenState;

#[derive(Debug, Deserialize)]
struct SecondaryResponse {
    holders: Vec<SecondaryRow>,
}

#[derive(Debug, Deserialize)]
struct SecondaryRow {
    address: String,
    balance: String,
}

pub struct SecondaryProvider {
    http: reqwest::Client,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl SecondaryProvider {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self {
            http,
            base_url,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry_policy.max_retries = max_retries;
        self
    }

    async fn fetch_once(&self, token: &TokenState) -> Result<Vec<RankedHolder>, ProviderError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("address", format!("{:#x}", token.address)),
                ("apiKey", "freekey".to_string()),
                ("limit", (token.top_n + 10).min(100).to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ProviderError::Transient(e.to_string())
                } else {
                    ProviderError::Other(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ProviderError::Transient(format!("http {status}")));
        }
        if !status.is_success() {
            return Err(ProviderError::Other(format!("http {status}")));
        }

        let body: SecondaryResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(e.to_string()))?;

        if body.holders.is_empty() {
            return Err(ProviderError::Empty);
        }

        body.holders
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let address = row
                    .address
                    .parse()
                    .map_err(|e| ProviderError::Other(format!("bad address {}: {e}", row.address)))?;
                Ok(RankedHolder {
                    address,
                    rank: (i + 1) as u32,
                    balance: row.balance,
                })
            })
            .collect()
    }
}

#[async_trait]
impl HolderProvider for SecondaryProvider {
    fn name(&self) -> &'static str {
        "ethplorer"
    }

    async fn fetch(&self, token: &TokenState, _chain_id: u64) -> Result<Vec<RankedHolder>, ProviderError> {
        if token.chain != "ethereum" {
            return Err(ProviderError::Unsupported);
        }
        retry(|| self.fetch_once(token), &self.retry_policy).await
    }
}

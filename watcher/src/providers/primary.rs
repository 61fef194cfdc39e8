// Primary Holder Provider Adapter, spec §4.3. Paid ranked-holders endpoint
// parameterised by (chain_id, token_address, limit).

use async_trait::async_trait;
use serde::Deserialize;
use ww_common::error::ProviderError;
use ww_common::retry::{retry, RetryPolicy};

use crate::providers::{HolderProvider, RankedHolder};
use crate::state::TokenState;

#[derive(Debug, Deserialize)]
struct PrimaryResponse {
    data: Vec<PrimaryRow>,
}

#[derive(Debug, Deserialize)]
struct PrimaryRow {
    #[serde(alias = "wallet_address", alias = "address")]
    address: String,
    #[serde(alias = "original_amount", alias = "amount")]
    amount: String,
}

pub struct PrimaryProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry_policy: RetryPolicy,
}

impl PrimaryProvider {
    pub fn new(http: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url,
            api_key,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry_policy.max_retries = max_retries;
        self
    }

    async fn fetch_once(&self, token: &TokenState, chain_id: u64, limit: u32) -> Result<Vec<RankedHolder>, ProviderError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("chain_id", chain_id.to_string()),
                ("token_address", format!("{:#x}", token.address)),
                ("limit", limit.to_string()),
                ("api_key", self.api_key.clone()),
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

        let body: PrimaryResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(e.to_string()))?;

        if body.data.is_empty() {
            return Err(ProviderError::Empty);
        }

        body.data
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
                    balance: row.amount,
                })
            })
            .collect()
    }
}

#[async_trait]
impl HolderProvider for PrimaryProvider {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn fetch(&self, token: &TokenState, chain_id: u64) -> Result<Vec<RankedHolder>, ProviderError> {
        let limit = (token.top_n + 10).min(100);
        retry(|| self.fetch_once(token, chain_id, limit), &self.retry_policy).await
    }
}

//! Etherscan helpers
//!
//! Two lookups that are useful when judging a new pair by hand: whether the token's
//! source is verified, and how many distinct transactions have moved tokens through
//! the pair. Neither is part of the alert pipeline.

use std::collections::HashSet;
use std::time::Duration;

use alloy::primitives::Address;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// Etherscan API base URL
pub const DEFAULT_ETHERSCAN_API: &str = "https://api.etherscan.io/api";

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("explorer returned HTTP {0}")]
    Status(u16),

    #[error("malformed explorer response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Envelope shared by every Etherscan endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerResponse {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub result: Value,
}

impl ExplorerResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "1"
    }
}

/// One row of `account/tokentx`; only the hash matters here
#[derive(Debug, Clone, Deserialize)]
pub struct TokenTransfer {
    pub hash: String,
}

#[derive(Debug, Clone)]
pub struct EtherscanClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EtherscanClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ExplorerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn with_default_endpoint(
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ExplorerError> {
        Self::new(DEFAULT_ETHERSCAN_API, api_key, timeout)
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<ExplorerResponse, ExplorerError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ExplorerError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Whether Etherscan has verified source (and therefore an ABI) for a contract
    pub async fn is_contract_verified(&self, contract: Address) -> Result<bool, ExplorerError> {
        let address = contract.to_string();
        let reply = self
            .query(&[
                ("module", "contract"),
                ("action", "getabi"),
                ("address", address.as_str()),
            ])
            .await?;

        debug!(contract = %contract, status = %reply.status, message = %reply.message, "getabi");
        Ok(is_verified(&reply))
    }

    /// Number of distinct transactions that transferred tokens through a pair
    pub async fn pair_transaction_count(&self, pair: Address) -> Result<usize, ExplorerError> {
        let address = pair.to_string();
        let reply = self
            .query(&[
                ("module", "account"),
                ("action", "tokentx"),
                ("address", address.as_str()),
                ("sort", "desc"),
            ])
            .await?;

        if !reply.is_ok() {
            info!(pair = %pair, message = %reply.message, "no token transactions for pair");
            return Ok(0);
        }

        let transfers: Vec<TokenTransfer> = serde_json::from_value(reply.result)?;
        let count = count_distinct_transactions(&transfers);
        debug!(pair = %pair, transfers = transfers.len(), transactions = count, "tokentx");
        Ok(count)
    }
}

/// `getabi` succeeds only for verified contracts
pub fn is_verified(reply: &ExplorerResponse) -> bool {
    reply.is_ok() && reply.message == "OK"
}

/// A swap moves two tokens in one transaction; count each transaction once
pub fn count_distinct_transactions(transfers: &[TokenTransfer]) -> usize {
    transfers
        .iter()
        .map(|t| t.hash.as_str())
        .collect::<HashSet<_>>()
        .len()
}

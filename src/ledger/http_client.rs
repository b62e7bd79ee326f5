//! JSON-over-HTTP ledger node client
//!
//! Any reply other than a decodable 2xx body is a transport failure, so a
//! node answering 5xx is demoted like one that does not answer at all.
//! Transaction refusals travel inside a 2xx [`BroadcastReceipt`].

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::rpc::{AccountInfo, ActionRecord, BroadcastReceipt, ChainState, LedgerRpc, RewardEntry};
use super::signer::SignedTransaction;
use crate::types::{RelayError, Result};

#[derive(Serialize)]
struct AccountByNameRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct HistoryRequest<'a> {
    name: &'a str,
    limit: u32,
}

/// Ledger node reached over HTTP
///
/// Timeouts are applied by [`super::LedgerClient`], not here.
pub struct HttpLedgerClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpLedgerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Decode a 2xx JSON body
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::Transport(format!(
            "{} answered {}",
            response.url(),
            status
        )));
    }
    response
        .json()
        .await
        .map_err(|e| RelayError::Transport(format!("Undecodable ledger response: {}", e)))
}

#[async_trait]
impl LedgerRpc for HttpLedgerClient {
    async fn get_account_by_name(&self, name: &str) -> Result<Option<AccountInfo>> {
        let response = self
            .http
            .post(self.url("/v1/account/by_name"))
            .json(&AccountByNameRequest { name })
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(read_json(response).await?))
    }

    async fn get_chain_state(&self) -> Result<ChainState> {
        let response = self.http.get(self.url("/v1/chain/state")).send().await?;
        read_json(response).await
    }

    async fn broadcast_transaction(&self, tx: &SignedTransaction) -> Result<BroadcastReceipt> {
        let response = self
            .http
            .post(self.url("/v1/transaction/broadcast"))
            .json(tx)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_block_rewards(&self, height: u64) -> Result<Vec<RewardEntry>> {
        let response = self
            .http
            .get(self.url(&format!("/v1/block/{}/rewards", height)))
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_user_action_history(&self, name: &str, limit: u32) -> Result<Vec<ActionRecord>> {
        let response = self
            .http
            .post(self.url("/v1/account/history"))
            .json(&HistoryRequest { name, limit })
            .send()
            .await?;
        read_json(response).await
    }
}

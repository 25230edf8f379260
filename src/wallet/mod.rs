//! E-cash wallet collaborator
//!
//! The wallet itself (token cryptography, mint protocol) is external; this
//! module defines the seam the payment gate consumes and a thin HTTP client
//! for a wallet sidecar process.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use crate::types::{ColloquyError, Result};

/// Wallet operations the core depends on. Decoding has no side effects;
/// claiming is irreversible and single-use per credential.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Verified total amount carried by a credential, without claiming it.
    async fn credential_amount(&self, credential: &str) -> Result<u64>;

    /// Irreversibly claim a credential. Must succeed before the paid-for
    /// operation is served.
    async fn claim(&self, credential: &str) -> Result<()>;

    /// Balance per mint.
    async fn balances(&self) -> Result<HashMap<String, u64>>;
}

/// HTTP client for a wallet sidecar.
///
/// Expected surface: `POST /decode {token} -> {amount}`,
/// `POST /receive {token}`, `GET /balances -> {mint_url: amount}`.
pub struct HttpWallet {
    base_url: String,
    http: reqwest::Client,
}

impl HttpWallet {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ColloquyError::PaymentFailed(format!("wallet client init: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[derive(Deserialize)]
struct DecodeResponse {
    amount: u64,
}

#[async_trait]
impl Wallet for HttpWallet {
    async fn credential_amount(&self, credential: &str) -> Result<u64> {
        let res = self
            .http
            .post(format!("{}/decode", self.base_url))
            .json(&json!({ "token": credential }))
            .send()
            .await
            .map_err(|e| ColloquyError::PaymentFailed(format!("wallet unreachable: {e}")))?;

        if !res.status().is_success() {
            return Err(ColloquyError::InvalidCredential(format!(
                "wallet rejected credential ({})",
                res.status()
            )));
        }
        let body: DecodeResponse = res
            .json()
            .await
            .map_err(|e| ColloquyError::InvalidCredential(format!("bad decode response: {e}")))?;
        Ok(body.amount)
    }

    async fn claim(&self, credential: &str) -> Result<()> {
        let res = self
            .http
            .post(format!("{}/receive", self.base_url))
            .json(&json!({ "token": credential }))
            .send()
            .await
            .map_err(|e| ColloquyError::PaymentFailed(format!("wallet unreachable: {e}")))?;

        if !res.status().is_success() {
            let detail = res.text().await.unwrap_or_default();
            return Err(ColloquyError::PaymentFailed(detail));
        }
        Ok(())
    }

    async fn balances(&self) -> Result<HashMap<String, u64>> {
        let res = self
            .http
            .get(format!("{}/balances", self.base_url))
            .send()
            .await
            .map_err(|e| ColloquyError::PaymentFailed(format!("wallet unreachable: {e}")))?;

        res.json()
            .await
            .map_err(|e| ColloquyError::PaymentFailed(format!("bad balances response: {e}")))
    }
}

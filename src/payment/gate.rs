//! Payment gate
//!
//! An explicit admission decision for gated operations. The HTTP layer
//! calls `admit` with the request's credential header and translates the
//! outcome into a status code; the gated handler runs only on `Admit`.
//!
//! Fund safety: a credential's amount is verified before it is claimed, and
//! the claim must be confirmed before the downstream operation executes.

use std::sync::Arc;
use tracing::{debug, info};

use crate::payment::request::encode_payment_request;
use crate::types::{ColloquyError, Result};
use crate::wallet::Wallet;

/// Gate configuration
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub enabled: bool,
    pub amount: u64,
    pub unit: String,
    pub mints: Vec<String>,
}

impl PaymentConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            amount: 0,
            unit: String::new(),
            mints: Vec::new(),
        }
    }
}

/// Outcome of an admission decision
#[derive(Debug, Clone)]
pub enum Admission {
    /// Claim confirmed (or payment disabled); serve the operation
    Admit,
    /// No credential attached; carries the encoded request to retry with
    PaymentRequired {
        encoded_request: String,
        amount: u64,
        unit: String,
    },
    /// Credential decoded below the required amount; nothing was claimed
    InsufficientPayment {
        required: u64,
        received: u64,
        unit: String,
    },
    /// Credential could not be decoded; nothing was claimed
    InvalidCredential,
    /// Wallet rejected the claim; the operation must not run
    PaymentFailed { detail: String },
}

/// Request-admission middleware state
pub struct PaymentGate {
    config: PaymentConfig,
    wallet: Option<Arc<dyn Wallet>>,
}

impl PaymentGate {
    /// Gate that admits everything.
    pub fn disabled() -> Self {
        Self {
            config: PaymentConfig::disabled(),
            wallet: None,
        }
    }

    /// Gate enforcing the configured payment through the given wallet.
    pub fn new(config: PaymentConfig, wallet: Arc<dyn Wallet>) -> Self {
        Self {
            config,
            wallet: Some(wallet),
        }
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    /// Decide admission for one gated request.
    pub async fn admit(&self, credential: Option<&str>) -> Result<Admission> {
        if !self.config.enabled {
            return Ok(Admission::Admit);
        }
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| ColloquyError::PaymentFailed("no wallet configured".to_string()))?;

        let Some(credential) = credential else {
            let encoded_request =
                encode_payment_request(self.config.amount, &self.config.unit, &self.config.mints)?;
            debug!("Gated request without credential, answering with payment request");
            return Ok(Admission::PaymentRequired {
                encoded_request,
                amount: self.config.amount,
                unit: self.config.unit.clone(),
            });
        };

        // Verify amount before claiming
        let received = match wallet.credential_amount(credential).await {
            Ok(amount) => amount,
            Err(ColloquyError::InvalidCredential(e)) => {
                debug!("Credential failed to decode: {}", e);
                return Ok(Admission::InvalidCredential);
            }
            Err(e) => return Err(e),
        };

        if received < self.config.amount {
            debug!(
                "Insufficient credential: required {} got {}",
                self.config.amount, received
            );
            return Ok(Admission::InsufficientPayment {
                required: self.config.amount,
                received,
                unit: self.config.unit.clone(),
            });
        }

        // Claim BEFORE the gated operation runs
        if let Err(e) = wallet.claim(credential).await {
            return Ok(Admission::PaymentFailed {
                detail: e.to_string(),
            });
        }

        info!("Claimed {} {} credential", received, self.config.unit);
        Ok(Admission::Admit)
    }
}

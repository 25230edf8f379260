//! Configuration for Colloquy binaries
//!
//! CLI arguments and environment variable handling using clap, one Args
//! struct per binary with shared payment flags flattened in.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Colloquy - serve an agent's knowledge over a tunnel
#[derive(Parser, Debug, Clone)]
#[command(name = "colloquy")]
#[command(about = "Serve distilled agent experience as a queryable expert")]
pub struct ServeArgs {
    /// Agent identifier used for directory registration
    #[arg(long, env = "AGENT_ID", default_value = "local")]
    pub agent_id: String,

    /// Human-readable agent name
    #[arg(long, env = "DISPLAY_NAME", default_value = "Colloquy Agent")]
    pub display_name: String,

    /// Directory containing knowledge artifact markdown files
    #[arg(long, env = "ARTIFACTS_DIR", default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Path to the expertise index YAML (optional; retrieval degrades without it)
    #[arg(long, env = "INDEX_PATH")]
    pub index_path: Option<PathBuf>,

    /// Local address to bind before exposing through the tunnel
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Local port (0 = ephemeral)
    #[arg(long, env = "PORT", default_value = "0")]
    pub port: u16,

    /// Tunnel seed file for a stable address across restarts
    /// (created with restrictive permissions on first run)
    #[arg(long, env = "SEED_FILE")]
    pub seed_file: Option<PathBuf>,

    /// Directory address to register with (optional)
    #[arg(long, env = "DIRECTORY_ADDRESS")]
    pub directory: Option<String>,

    /// Heartbeat interval towards the directory
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value = "30")]
    pub heartbeat_interval_secs: u64,

    /// Anthropic API key for the reasoning collaborator
    #[arg(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_api_key: Option<String>,

    /// Model id passed to the reasoning collaborator
    #[arg(long, env = "COLLOQUY_MODEL", default_value = "claude-sonnet-4-5-20250929")]
    pub model: String,

    /// Reasoning collaborator timeout in seconds
    #[arg(long, env = "REASONING_TIMEOUT_SECS", default_value = "60")]
    pub reasoning_timeout_secs: u64,

    /// Consultation session idle TTL in seconds
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "600")]
    pub session_ttl_secs: u64,

    /// Session sweep interval in seconds
    #[arg(long, env = "SESSION_SWEEP_SECS", default_value = "60")]
    pub session_sweep_secs: u64,

    /// Maximum artifacts handed to the reasoning collaborator per question
    #[arg(long, env = "MAX_ARTIFACTS", default_value = "5")]
    pub max_artifacts: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Payment configuration
    #[command(flatten)]
    pub payment: PaymentArgs,
}

/// Colloquy directory - agent registry and discovery service
#[derive(Parser, Debug, Clone)]
#[command(name = "colloquy-directory")]
#[command(about = "Registry and discovery directory for Colloquy agents")]
pub struct DirectoryArgs {
    /// Local address to bind before exposing through the tunnel
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Local port (0 = ephemeral)
    #[arg(long, env = "PORT", default_value = "0")]
    pub port: u16,

    /// Path to the persisted registry snapshot
    #[arg(long, env = "REGISTRY_PATH", default_value = "directory/registry.json")]
    pub registry_path: PathBuf,

    /// Tunnel seed file for a stable address across restarts
    #[arg(long, env = "SEED_FILE")]
    pub seed_file: Option<PathBuf>,

    /// Seconds without a heartbeat before an agent is marked offline
    #[arg(long, env = "OFFLINE_THRESHOLD_SECS", default_value = "90")]
    pub offline_threshold_secs: u64,

    /// Liveness sweep interval in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "15")]
    pub sweep_interval_secs: u64,

    /// Maximum shortlist handed to the reasoning collaborator
    #[arg(long, env = "SHORTLIST_SIZE", default_value = "10")]
    pub shortlist_size: usize,

    /// Anthropic API key for reasoning-backed discovery (optional;
    /// discovery falls back to raw keyword scoring without it)
    #[arg(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_api_key: Option<String>,

    /// Model id passed to the reasoning collaborator
    #[arg(long, env = "COLLOQUY_MODEL", default_value = "claude-sonnet-4-5-20250929")]
    pub model: String,

    /// Reasoning collaborator timeout in seconds
    #[arg(long, env = "REASONING_TIMEOUT_SECS", default_value = "60")]
    pub reasoning_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Payment configuration (gates /connect)
    #[command(flatten)]
    pub payment: PaymentArgs,
}

/// Payment gate configuration shared by both binaries
#[derive(Parser, Debug, Clone)]
pub struct PaymentArgs {
    /// Require payment on gated operations
    #[arg(long, env = "PAYMENT_ENABLED", default_value = "false")]
    pub payment_enabled: bool,

    /// Required amount per gated request
    #[arg(long, env = "PAYMENT_AMOUNT", default_value = "100")]
    pub payment_amount: u64,

    /// Payment unit
    #[arg(long, env = "PAYMENT_UNIT", default_value = "sat")]
    pub payment_unit: String,

    /// Comma-separated list of accepted mint URLs
    #[arg(long, env = "PAYMENT_MINTS")]
    pub payment_mints: Option<String>,

    /// Base URL of the wallet sidecar (required when payment is enabled)
    #[arg(long, env = "WALLET_URL")]
    pub wallet_url: Option<String>,
}

impl PaymentArgs {
    /// Accepted mint URLs as a list
    pub fn mint_list(&self) -> Vec<String> {
        self.payment_mints
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Validate payment flags as a group
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.payment_enabled {
            return Ok(());
        }
        if self.wallet_url.is_none() {
            return Err("WALLET_URL is required when payment is enabled".to_string());
        }
        if self.mint_list().is_empty() {
            return Err("PAYMENT_MINTS is required when payment is enabled".to_string());
        }
        if self.payment_amount == 0 {
            return Err("PAYMENT_AMOUNT must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl ServeArgs {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.anthropic_api_key.is_none() {
            return Err("ANTHROPIC_API_KEY is required to serve consultations".to_string());
        }
        if self.session_sweep_secs == 0 || self.session_ttl_secs == 0 {
            return Err("session TTL and sweep interval must be greater than zero".to_string());
        }
        if self.session_sweep_secs >= self.session_ttl_secs {
            return Err("SESSION_SWEEP_SECS must be less than SESSION_TTL_SECS".to_string());
        }
        self.payment.validate()
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_secs)
    }
}

impl DirectoryArgs {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.sweep_interval_secs == 0 || self.offline_threshold_secs == 0 {
            return Err("sweep interval and offline threshold must be greater than zero".to_string());
        }
        // The sweep must run more often than the threshold to detect it promptly
        if self.sweep_interval_secs >= self.offline_threshold_secs {
            return Err(
                "SWEEP_INTERVAL_SECS must be less than OFFLINE_THRESHOLD_SECS".to_string(),
            );
        }
        self.payment.validate()
    }

    pub fn offline_threshold(&self) -> Duration {
        Duration::from_secs(self.offline_threshold_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_directory(args: &[&str]) -> DirectoryArgs {
        DirectoryArgs::parse_from(std::iter::once("colloquy-directory").chain(args.iter().copied()))
    }

    #[test]
    fn sweep_must_run_more_often_than_threshold() {
        let args = parse_directory(&[
            "--offline-threshold-secs",
            "30",
            "--sweep-interval-secs",
            "30",
        ]);
        assert!(args.validate().is_err());

        let args = parse_directory(&[
            "--offline-threshold-secs",
            "90",
            "--sweep-interval-secs",
            "15",
        ]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn payment_requires_wallet_and_mints() {
        let args = parse_directory(&["--payment-enabled"]);
        assert!(args.payment.validate().is_err());

        let args = parse_directory(&[
            "--payment-enabled",
            "--wallet-url",
            "http://127.0.0.1:7700",
            "--payment-mints",
            "https://mint.example.com, https://mint2.example.com",
        ]);
        assert!(args.payment.validate().is_ok());
        assert_eq!(args.payment.mint_list().len(), 2);
    }
}

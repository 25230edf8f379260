//! Colloquy - serve distilled agent experience as a queryable expert

use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use colloquy::client::{spawn_heartbeat_task, DirectoryClient};
use colloquy::config::ServeArgs;
use colloquy::consult::ConsultationHandler;
use colloquy::knowledge::ExpertiseIndex;
use colloquy::payment::{PaymentConfig, PaymentGate};
use colloquy::reasoning::AnthropicReasoner;
use colloquy::retrieval::RetrievalEngine;
use colloquy::server::{self, AgentState};
use colloquy::sessions::SessionStore;
use colloquy::tunnel::{load_or_create_seed, DirectTransport, TunnelListener};
use colloquy::wallet::HttpWallet;
use colloquy::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = ServeArgs::parse();

    logging::init(&args.log_level);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Colloquy - consultation gateway");
    info!("======================================");
    info!("Agent: {} ({})", args.display_name, args.agent_id);
    info!("Artifacts: {}", args.artifacts_dir.display());
    if let Some(ref index) = args.index_path {
        info!("Index: {}", index.display());
    }
    info!(
        "Payment: {}",
        if args.payment.payment_enabled {
            format!("{} {} per question", args.payment.payment_amount, args.payment.payment_unit)
        } else {
            "disabled".to_string()
        }
    );
    info!("======================================");

    if !args.artifacts_dir.exists() {
        error!(
            "Artifacts directory not found: {}",
            args.artifacts_dir.display()
        );
        std::process::exit(1);
    }

    // Payment gate (admits everything when disabled)
    let gate = if args.payment.payment_enabled {
        let wallet_url = args.payment.wallet_url.as_deref().unwrap_or_default();
        let wallet = Arc::new(HttpWallet::new(wallet_url)?);
        PaymentGate::new(
            PaymentConfig {
                enabled: true,
                amount: args.payment.payment_amount,
                unit: args.payment.payment_unit.clone(),
                mints: args.payment.mint_list(),
            },
            wallet,
        )
    } else {
        PaymentGate::disabled()
    };

    let api_key = args.anthropic_api_key.clone().unwrap_or_default();
    let reasoner = Arc::new(AnthropicReasoner::new(
        &args.model,
        &api_key,
        Duration::from_secs(args.reasoning_timeout_secs),
    )?);

    let sessions = SessionStore::new(args.session_ttl(), args.session_sweep_interval());
    sessions.start_sweeper();

    let retrieval = RetrievalEngine::new(args.artifacts_dir.clone(), args.index_path.clone())
        .with_max_artifacts(args.max_artifacts);
    let handler = ConsultationHandler::new(retrieval, Arc::clone(&sessions), reasoner);

    let state = Arc::new(AgentState {
        agent_id: args.agent_id.clone(),
        display_name: args.display_name.clone(),
        index_path: args.index_path.clone(),
        handler,
        gate,
        sessions: Arc::clone(&sessions),
        started_at: Instant::now(),
    });

    // Bind first so the actual port is known, then expose it
    let listener = TcpListener::bind((args.host.as_str(), args.port)).await?;
    let port = listener.local_addr()?.port();
    let server = tokio::spawn(server::serve(
        listener,
        Arc::clone(&state),
        server::handle_agent_request,
    ));

    let seed = match args.seed_file {
        Some(ref path) => Some(load_or_create_seed(path)?),
        None => None,
    };
    let transport = DirectTransport;
    let tunnel = TunnelListener::establish(&transport, port, seed.as_deref(), server).await?;

    info!("Serving consultations at {}", tunnel.address());
    println!("{}", tunnel.address());

    // Optional directory membership: register once, then heartbeat forever
    let mut heartbeat = None;
    let mut directory_client = None;
    if let Some(ref directory_address) = args.directory {
        match DirectoryClient::connect(&transport, directory_address).await {
            Ok(client) => {
                let client = Arc::new(client);
                let profile = build_registration_profile(&args, tunnel.address());
                match client.register(profile.clone()).await {
                    Ok(()) => info!("Registered with directory at {}", directory_address),
                    Err(e) => warn!("Directory registration failed (will retry): {}", e),
                }
                heartbeat = Some(spawn_heartbeat_task(
                    Arc::clone(&client),
                    args.agent_id.clone(),
                    profile,
                    Duration::from_secs(args.heartbeat_interval_secs),
                ));
                directory_client = Some(client);
            }
            Err(e) => warn!("Could not reach directory {}: {}", directory_address, e),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    if let Some(task) = heartbeat {
        task.abort();
    }
    if let Some(client) = directory_client {
        let _ = client.disconnect().await;
    }
    tunnel.stop().await?;
    sessions.destroy();

    Ok(())
}

/// The profile this agent submits to the directory.
fn build_registration_profile(args: &ServeArgs, connection_key: &str) -> serde_json::Value {
    let expertise_index = args
        .index_path
        .as_deref()
        .and_then(ExpertiseIndex::load)
        .and_then(|index| serde_json::to_value(index).ok());

    let mut profile = serde_json::json!({
        "agent_id": args.agent_id,
        "display_name": args.display_name,
        "connection_key": connection_key,
    });
    if let Some(index) = expertise_index {
        profile["expertise_index"] = index;
    }
    if args.payment.payment_enabled {
        profile["payment"] = serde_json::json!({
            "amount": args.payment.payment_amount,
            "unit": args.payment.payment_unit,
        });
    }
    profile
}

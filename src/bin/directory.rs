//! Colloquy directory - agent registry and discovery service

use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info};

use colloquy::config::DirectoryArgs;
use colloquy::discovery::DiscoveryMatcher;
use colloquy::logging;
use colloquy::payment::{PaymentConfig, PaymentGate};
use colloquy::reasoning::{AnthropicReasoner, Reasoner};
use colloquy::registry::AgentRegistry;
use colloquy::server::{self, DirectoryState};
use colloquy::tunnel::{load_or_create_seed, DirectTransport, TunnelListener};
use colloquy::wallet::HttpWallet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = DirectoryArgs::parse();

    logging::init(&args.log_level);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Colloquy Directory");
    info!("======================================");
    info!("Registry: {}", args.registry_path.display());
    info!(
        "Liveness: offline after {}s, sweep every {}s",
        args.offline_threshold_secs, args.sweep_interval_secs
    );
    info!(
        "Discovery ranking: {}",
        if args.anthropic_api_key.is_some() {
            "reasoning-backed"
        } else {
            "keyword scoring"
        }
    );
    if args.payment.payment_enabled {
        info!(
            "Payment enabled: {} {} per connection",
            args.payment.payment_amount, args.payment.payment_unit
        );
    }
    info!("======================================");

    let registry = AgentRegistry::open(
        args.registry_path.clone(),
        args.offline_threshold(),
        args.sweep_interval(),
    );
    registry.start_sweeper();

    // Reasoning-backed discovery is optional; without a key the raw
    // keyword shortlist is the ranking
    let reasoner: Option<Arc<dyn Reasoner>> = match args.anthropic_api_key {
        Some(ref api_key) => Some(Arc::new(AnthropicReasoner::new(
            &args.model,
            api_key,
            Duration::from_secs(args.reasoning_timeout_secs),
        )?)),
        None => None,
    };
    let matcher = DiscoveryMatcher::new(reasoner, args.shortlist_size);

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

    let state = Arc::new(DirectoryState {
        registry: Arc::clone(&registry),
        matcher,
        gate,
        started_at: Instant::now(),
    });

    // Bind first so the actual port is known, then expose it
    let listener = TcpListener::bind((args.host.as_str(), args.port)).await?;
    let port = listener.local_addr()?.port();
    let server = tokio::spawn(server::serve(
        listener,
        Arc::clone(&state),
        server::handle_directory_request,
    ));

    let seed = match args.seed_file {
        Some(ref path) => Some(load_or_create_seed(path)?),
        None => None,
    };
    let transport = DirectTransport;
    let tunnel = TunnelListener::establish(&transport, port, seed.as_deref(), server).await?;

    info!("Directory reachable at {}", tunnel.address());
    println!("{}", tunnel.address());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down directory...");

    tunnel.stop().await?;
    registry.destroy();

    Ok(())
}

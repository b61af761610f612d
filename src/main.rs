//! Application entry point.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::SecretString;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use merchant_gateway::api::{RateLimitConfig, create_router, create_router_with_rate_limit};
use merchant_gateway::app::{
    AppState, GatewayConfig, GatewayService, Multiplexer, MultiplexerConfig,
};
use merchant_gateway::infra::{
    EnvelopeSigner, FileFeeScheduleStore, NodePool, NodePoolConfig, miner_key_from_secret,
};

/// Application configuration
struct Config {
    host: String,
    port: u16,
    nodes: NodePoolConfig,
    multiplexer: MultiplexerConfig,
    gateway: GatewayConfig,
    fees: FileFeeScheduleStore,
    signer: EnvelopeSigner,
    enable_rate_limiting: bool,
    rate_limit_config: RateLimitConfig,
}

impl Config {
    fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(9004);
        let enable_rate_limiting = env::var("ENABLE_RATE_LIMITING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let nodes = NodePoolConfig::from_env().context("Invalid node pool configuration")?;
        let gateway = GatewayConfig::from_env().context("Invalid gateway configuration")?;
        let signer = Self::load_signer()?;

        Ok(Self {
            host,
            port,
            nodes,
            multiplexer: MultiplexerConfig::from_env(),
            gateway: gateway.with_miner_id(signer.public_key()),
            fees: FileFeeScheduleStore::from_env(),
            signer,
            enable_rate_limiting,
            rate_limit_config: RateLimitConfig::from_env(),
        })
    }

    fn load_signer() -> Result<EnvelopeSigner> {
        match env::var("MINER_PRIVATE_KEY").ok().filter(|k| !k.is_empty()) {
            Some(key) => {
                info!("Loading miner key from environment");
                let secret = SecretString::from(key);
                let miner_key = miner_key_from_secret(&secret)
                    .context("Failed to parse MINER_PRIVATE_KEY as WIF or hex")?;
                Ok(EnvelopeSigner::new(miner_key))
            }
            None => {
                warn!("MINER_PRIVATE_KEY not set, responses will be unsigned");
                Ok(EnvelopeSigner::unsigned())
            }
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("Merchant Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    match config.signer.public_key() {
        Some(public_key) => info!("Miner id: {}", public_key),
        None => info!("Miner id: none"),
    }

    info!("Initializing infrastructure...");

    let pool = NodePool::connect(&config.nodes, config.multiplexer.call_timeout)
        .context("Failed to build node clients")?;
    info!(
        "   Node pool ready ({} nodes, {}s call timeout, {} max in-flight calls)",
        pool.len(),
        config.multiplexer.call_timeout.as_secs(),
        config.multiplexer.max_concurrent_calls
    );

    let multiplexer = Arc::new(Multiplexer::new(pool, config.multiplexer.clone()));
    info!("   Fee schedules read from {}", config.fees.dir().display());
    info!(
        "   Previous transaction policy: {}",
        config.gateway.prev_tx_policy
    );

    let service = Arc::new(GatewayService::new(
        multiplexer,
        Arc::new(config.fees.clone()),
        config.gateway.clone(),
    ));
    let app_state = Arc::new(AppState::new(service).with_signer(Arc::new(config.signer.clone())));

    let router = if config.enable_rate_limiting {
        info!("   Rate limiting enabled");
        create_router_with_rate_limit(app_state, config.rate_limit_config)
    } else {
        info!("   Rate limiting disabled");
        create_router(app_state)
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server starting on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);
    info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

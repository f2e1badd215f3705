use std::process;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use molecule::cli::Args;
use molecule::client::{InMemoryNomadClient, NomadClient, NomadClientTrait};
use molecule::config::{
    load_config_file, load_from_environment, resolve_config_path, Config, ConfigError,
    CONFIG_FILE_ENV, DEFAULT_SERVER_PORT,
};
use molecule::discovery::DiscoveryService;
use molecule::server::{create_router, AppState};

/// Config is mandatory against a live cluster, optional with sample data
fn load_config(args: &Args) -> Result<Config, ConfigError> {
    if args.prod {
        return load_from_environment(args.config.as_deref());
    }

    let from_env = std::env::var(CONFIG_FILE_ENV).ok();
    match resolve_config_path(args.config.as_deref(), from_env.as_deref()) {
        Ok(path) => load_config_file(&path),
        Err(ConfigError::MissingConfigPath) => {
            info!("No config file given, using built-in defaults");
            Ok(Config::default())
        }
        Err(e) => Err(e),
    }
}

fn build_client(args: &Args, config: &Config) -> Arc<dyn NomadClientTrait> {
    if !args.prod {
        warn!("Not in production mode, serving sample allocation data");
        return Arc::new(InMemoryNomadClient::sample());
    }

    let nomad = &config.nomad;
    match NomadClient::new(
        &nomad.address,
        nomad.token.clone(),
        nomad.namespace.clone(),
        nomad.timeout(),
    ) {
        Ok(client) => {
            info!("Using Nomad agent at {}", client.base_url());
            Arc::new(client)
        }
        Err(e) => {
            error!("Failed to create Nomad client: {}", e);
            process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    // The env file is loaded before anything reads the environment
    let args = match Args::load() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter())),
        )
        .init();

    if let Some(ref env_file) = args.env_file {
        info!("Loaded environment from {}", env_file.display());
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {}", e);
            process::exit(1);
        }
    };

    let client = build_client(&args, &config);
    let discovery = DiscoveryService::new(client, config.static_endpoints())
        .with_concurrency(config.nomad.concurrency);

    let shutdown = CancellationToken::new();

    // List mode: print the directory tables once and exit
    if args.list {
        if let Err(e) = discovery.extract_all(true, &shutdown).await {
            error!("Failed to extract endpoints: {}", e);
            process::exit(1);
        }
        return;
    }

    let Some(api_key) = args.resolve_api_key() else {
        error!("API_KEY environment variable is required");
        process::exit(1);
    };

    let host = args
        .bind_addr
        .clone()
        .unwrap_or_else(|| config.server_config.host.clone());
    let bind_host = if host.is_empty() { "0.0.0.0" } else { host.as_str() };
    let port = args
        .port
        .or(Some(config.server_config.port).filter(|p| *p != 0))
        .unwrap_or(DEFAULT_SERVER_PORT);
    let addr = format!("{}:{}", bind_host, port);

    let state = AppState::new(discovery, api_key).with_shutdown(shutdown.clone());
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            process::exit(1);
        }
    };

    let display_host = if host.is_empty() { "localhost" } else { &host };
    info!("Server listening on http://{}:{}", display_host, port);
    info!("Endpoints:");
    info!("  GET  /health                              - Health check");
    info!("  GET  /v1/urls                             - All endpoints");
    info!("  GET  /v1/urls/traefik                     - Routed service URLs");
    info!("  GET  /v1/urls/hosts                       - Host reserved ports");
    info!("  GET  /v1/urls/services                    - Service ports");
    info!("  GET  /v1/services/{{service}}/status        - Service status");
    info!("  POST /v1/services/{{service}}/alloc-restart - Restart allocations");

    let signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutting down");
        shutdown.cancel();
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
    {
        error!("Server error: {}", e);
        process::exit(1);
    }
}

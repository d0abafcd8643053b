use anyhow::{Context, Result};
use std::sync::Arc;

use ice_backend::{
    auth::{CredentialVerifier, TokenSigner},
    config::Config,
    db::Database,
    middleware,
    routes::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Refuse to start without a signing secret
    if let Err(e) = config.validate() {
        tracing::error!("❌ Invalid configuration: {}", e);
        return Err(e.into());
    }
    let secret = config.shared_secret()?;

    tracing::info!("🚀 ICE backend starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    tracing::info!("Opening database: {}", config.database_file.display());
    let store = Arc::new(
        Database::open(&config.database_file).context("Startup failed: unable to open database")?,
    );
    tracing::info!("✅ Identity store ready");

    let verifier = Arc::new(CredentialVerifier::new(TokenSigner::new(secret), store.clone()));
    tracing::info!(
        "✅ Token signer initialized (token ttl: {}s)",
        config.token_ttl
    );

    let app_state = AppState {
        store,
        verifier,
        config: Arc::new(config.clone()),
    };

    // Build the application with routes and middleware
    let app = build_app(app_state);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    print_startup_banner(&config);

    // Start server with graceful shutdown
    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Build the application with all routes and middleware
fn build_app(state: AppState) -> axum::Router {
    use axum::Router;

    // Index and health routes (no auth required)
    let health_routes = routes::health_routes();

    // Registration and user lookup (no auth required)
    let user_routes = routes::user_routes(state.clone());

    // Resource and token routes (with auth)
    let protected_routes = routes::protected_routes(state);

    // Combine all routes
    Router::new()
        .merge(health_routes)
        .merge(user_routes)
        .merge(protected_routes)
        // Apply middleware stack: CORS → Trace → (Auth is per-route)
        .layer(middleware::cors_layer())
        .layer(middleware::trace_layer())
}

/// Print startup banner
fn print_startup_banner(config: &Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║                    ❄  ICE Event Backend                   ║
║                                                           ║
║  User accounts and session tokens over a REST API         ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    println!("{}", banner);
    println!("  Version:     {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:      http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Database:    {}", config.database_file.display());
    println!("  Token TTL:   {}s", config.token_ttl);
    println!("  Log Level:   {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}

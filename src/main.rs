use anyhow::Context;
use paygate_backend::api::{self, AppState};
use paygate_backend::config::Config;
use paygate_backend::database::{self, payment_repository::PaymentRepository};
use paygate_backend::ledger::LedgerUpdater;
use paygate_backend::logging;
use paygate_backend::payments::callback::CallbackAuthenticator;
use paygate_backend::payments::providers::TBankProvider;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    logging::init(config.logging.format);

    tracing::info!("Starting payment gateway backend");
    tracing::info!("Environment: {}", config.server.environment);

    let pool = database::init_pool(&config.database.url, Some(config.database.pool_config()))
        .await
        .context("failed to connect to the ledger database")?;
    if config.database.run_migrations {
        database::run_migrations(&pool)
            .await
            .context("failed to apply migrations")?;
    }

    let store = Arc::new(PaymentRepository::new(pool.clone()));
    let ledger = LedgerUpdater::new(
        store,
        config.ledger.retry_policy(),
        config.ledger.attempt_timeout(),
    );
    let authenticator = CallbackAuthenticator::new(config.gateway.authenticator_config()?);
    let provider = TBankProvider::new(config.gateway.tbank_config())
        .map_err(|e| anyhow::anyhow!("failed to create gateway client: {}", e))?;

    let state = AppState::new(
        config.server.environment.clone(),
        authenticator,
        ledger,
        Arc::new(provider),
    );
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Closing database pool");
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

use code_harvester::config::AppConfig;
use code_harvester::database;
use code_harvester::logging;
use code_harvester::services::ServiceContainer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let log_handle = logging::init_logging(&config.log_dir)?;

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let container = ServiceContainer::new(pool, config).await?;
    log_handle.start_retention_cleanup(container.cancellation_token());
    container.scheduler.start();

    info!(
        session_dir = %container.config.session_dir.display(),
        gateway = %container.config.gateway_url,
        "code-harvester started"
    );

    shutdown_signal().await;
    info!("Shutdown signal received");
    container.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

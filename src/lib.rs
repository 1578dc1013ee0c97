pub mod adherence; // Completion rate, adherence rate, streaks
pub mod api; // HTTP hosting layer
pub mod assignments; // Assignment store + state machine
pub mod catalog; // Exercise catalog
pub mod clock;
pub mod config;
pub mod coordinator; // ExerciseService
pub mod db;
pub mod error;
pub mod models;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

pub use coordinator::ExerciseService;
pub use error::ExerciseError;

/// Anything that can stop the binary from coming up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("Cannot create data directory {}: {source}", path.display())]
    DataDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Service(#[from] ExerciseError),
    #[error(transparent)]
    Server(#[from] api::ServerError),
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(std::io::Error),
}

/// Initialize tracing, falling back to `config::default_log_filter()`
/// when `RUST_LOG` is unset.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Loads configuration from the environment, opens the database and serves
/// the API until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    init_tracing();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::ServiceConfig::from_env()?;
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StartupError::DataDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let service = Arc::new(ExerciseService::open(
        &config.db_path,
        Arc::new(clock::SystemClock),
        config.adherence,
    )?);

    let server = api::start_api_server(service, config.bind_addr).await?;
    tracing::info!(addr = %server.session.server_addr, "Ready");

    let signal = tokio::signal::ctrl_c().await.map_err(StartupError::Signal);
    server.stop().await;
    signal?;

    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}

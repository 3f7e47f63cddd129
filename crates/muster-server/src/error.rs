use muster_core::error::MusterError;
use muster_db::DbError;
use muster_engine::EngineError;

/// Startup and runtime failures of the daemon.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Muster(#[from] MusterError),

    #[error("signal handler failed: {0}")]
    Signal(std::io::Error),
}

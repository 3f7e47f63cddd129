//! SurrealDB connection management.
//!
//! The endpoint scheme selects the engine: `ws://host:port` talks to a
//! SurrealDB server, `mem://` runs an in-process store. Root credentials
//! are only needed for server endpoints.

use serde::Deserialize;
use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;

/// Root user to sign in as after connecting.
#[derive(Debug, Clone, Deserialize)]
pub struct RootCredentials {
    pub username: String,
    pub password: String,
}

/// Where the muster tables live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Engine endpoint, e.g. `ws://127.0.0.1:8000` or `mem://`.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    /// Ignored for embedded endpoints.
    pub credentials: Option<RootCredentials>,
}

impl DbConfig {
    /// Whether the endpoint runs the store inside this process.
    pub fn is_embedded(&self) -> bool {
        self.endpoint.starts_with("mem:")
    }

    /// A throwaway in-process store without authentication.
    pub fn in_memory() -> Self {
        Self {
            endpoint: "mem://".into(),
            credentials: None,
            ..Self::default()
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000".into(),
            namespace: "muster".into(),
            database: "main".into(),
            credentials: Some(RootCredentials {
                username: "root".into(),
                password: "root".into(),
            }),
        }
    }
}

/// An open SurrealDB client scoped to the configured namespace and
/// database.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Any>,
}

impl DbManager {
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            endpoint = %config.endpoint,
            namespace = %config.namespace,
            database = %config.database,
            embedded = config.is_embedded(),
            "Connecting to SurrealDB"
        );

        let db = any::connect(config.endpoint.as_str()).await?;
        if let Some(credentials) = config.credentials.as_ref().filter(|_| !config.is_embedded()) {
            db.signin(Root {
                username: credentials.username.clone(),
                password: credentials.password.clone(),
            })
            .await?;
        }
        db.use_ns(&config.namespace).use_db(&config.database).await?;

        info!(endpoint = %config.endpoint, "Connected to SurrealDB");
        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<Any> {
        &self.db
    }
}

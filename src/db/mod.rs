use std::future::Future;
use std::sync::Arc;

use mongodb::options::{ClientOptions, Credential, ServerAddress};

use crate::config::{BackendKind, DatabaseConfig};
use crate::error::AppResult;

pub mod client;
pub mod memory;
pub mod models;

use client::StoreError;
use memory::MemoryDatabase;

/// Where connections go. Cheap to clone; shared through `AppState`.
#[derive(Clone)]
pub enum DbBackend {
    Mongo(DatabaseConfig),
    Memory(Arc<MemoryDatabase>),
}

impl DbBackend {
    pub fn from_config(cfg: &DatabaseConfig) -> Self {
        match cfg.backend {
            BackendKind::Mongo => DbBackend::Mongo(cfg.clone()),
            BackendKind::Memory => {
                DbBackend::Memory(Arc::new(MemoryDatabase::new(cfg.database_name())))
            }
        }
    }

    pub fn database_name(&self) -> &str {
        match self {
            DbBackend::Mongo(cfg) => cfg.database_name(),
            DbBackend::Memory(db) => db.name(),
        }
    }

    /// A fresh, not yet connected connection.
    pub fn open(&self) -> DbConnection {
        DbConnection { backend: self.clone(), session: None }
    }

    /// Runs `work` with a connected connection and closes it afterwards,
    /// whether `work` succeeded or not. A failed close is logged and does not
    /// replace the result of `work`.
    pub async fn scoped<T, F, Fut>(&self, work: F) -> AppResult<T>
    where
        F: FnOnce(DbConnection) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut conn = self.open();
        conn.connect().await?;

        let result = work(conn.clone()).await;

        if let Err(e) = conn.close().await {
            tracing::warn!("Failed to release store connection: {}", e);
        }
        result
    }
}

#[derive(Clone)]
pub(crate) enum Session {
    Mongo { client: mongodb::Client, database: mongodb::Database },
    Memory(Arc<MemoryDatabase>),
}

/// One logical connection to the document store. Clones share the underlying
/// driver session but track their own connected flag.
#[derive(Clone)]
pub struct DbConnection {
    backend: DbBackend,
    session: Option<Session>,
}

impl DbConnection {
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn database_name(&self) -> &str {
        self.backend.database_name()
    }

    pub(crate) fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub async fn connect(&mut self) -> Result<(), StoreError> {
        if self.is_connected() {
            return Ok(());
        }

        let session = match &self.backend {
            DbBackend::Mongo(cfg) => {
                let client = mongo_client(cfg).map_err(|e| self.connect_error(e))?;
                let database = client.database(cfg.database_name());
                Session::Mongo { client, database }
            }
            DbBackend::Memory(db) => {
                if !db.is_available() {
                    return Err(self.connect_error("memory database is offline"));
                }
                Session::Memory(db.clone())
            }
        };

        tracing::debug!("Connected to document store database={}", self.database_name());
        self.session = Some(session);
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), StoreError> {
        match self.session.take() {
            Some(Session::Mongo { client, .. }) => client.shutdown().await,
            Some(Session::Memory(db)) => {
                if !db.is_available() {
                    return Err(StoreError::new(format!(
                        "Error trying to close connection with database={}: memory database is offline",
                        self.database_name()
                    )));
                }
            }
            None => return Ok(()),
        }
        tracing::debug!("Closed document store connection database={}", self.database_name());
        Ok(())
    }

    fn connect_error(&self, cause: impl std::fmt::Display) -> StoreError {
        StoreError::new(format!(
            "Error trying to connect to database={}: {}",
            self.database_name(),
            cause
        ))
    }
}

fn mongo_client(cfg: &DatabaseConfig) -> Result<mongodb::Client, mongodb::error::Error> {
    let host = cfg.host.as_deref().unwrap_or("localhost");
    let port = cfg.port.unwrap_or(27017);

    let mut options = ClientOptions::default();
    options.hosts = vec![ServerAddress::parse(format!("{}:{}", host, port))?];
    options.app_name = Some(env!("CARGO_PKG_NAME").to_string());

    if cfg.username.is_some() || cfg.password.is_some() {
        let mut credential = Credential::default();
        credential.username = cfg.username.clone();
        credential.password = cfg.password.clone();
        options.credential = Some(credential);
    }

    mongodb::Client::with_options(options)
}

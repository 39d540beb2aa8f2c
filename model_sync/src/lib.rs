//! model_sync: keeps database tables in line with column declarations
//!
//! Declarations are found in source directories, either as Rust types
//! registered with the [`DeclarationRegistry`] (usually through
//! `#[derive(ColumnDeclarations)]`) or as TOML / YAML / JSON files. Each run
//! creates missing tables, adds and removes columns and attaches indexes and
//! foreign keys to newly added columns.

extern crate self as model_sync;

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod schema;
pub mod sync;
pub mod utils;

// Re-export main types for easier access
pub use config::Config;
pub use db::connection::DatabaseConnection;
pub use db::executor::{SqlExecutor, SyncTarget};
pub use error::{Error, Result};
pub use model_sync_macros::ColumnDeclarations;
pub use models::declaration::ModelDeclaration;
pub use models::registry::{DeclarationRegistry, HasColumnDeclarations};
pub use schema::analyzer::SchemaAnalyzer;
pub use schema::diff::SyncPlan;
pub use schema::generator::MigrationGenerator;
pub use schema::types::{ColumnTypes, Operation, SyncAction, TableSnapshot, TypeSpec};
pub use sync::{SchemaSynchronizer, SyncReport};

/// Initialize model_sync with the specified configuration file
pub async fn init(config_path: &str) -> Result<ModelSyncClient> {
    let config = config::load_from_file(config_path)?;
    ModelSyncClient::new(config).await
}

/// The main client for interacting with model_sync
pub struct ModelSyncClient {
    config: Config,
    executor: SqlExecutor,
    registry: DeclarationRegistry,
}

impl ModelSyncClient {
    /// Create a new client from configuration, opening the database connection
    pub async fn new(config: Config) -> Result<Self> {
        let connection = DatabaseConnection::connect(&config.database).await?;
        let executor = SqlExecutor::new(connection, config.database.schema.clone());
        let registry = DeclarationRegistry::new(&config.models);

        Ok(Self {
            config,
            executor,
            registry,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registry used to resolve declarations implemented in Rust
    pub fn registry_mut(&mut self) -> &mut DeclarationRegistry {
        &mut self.registry
    }

    /// Synchronize the sources listed in the configuration
    pub async fn sync_database(&self) -> Result<SyncReport> {
        self.synchronize(&self.config.sources).await
    }

    /// Synchronize an explicit list of sources
    pub async fn synchronize(&self, sources: &[config::SourceConfig]) -> Result<SyncReport> {
        SchemaSynchronizer::new(&self.executor, &self.registry, &self.config)
            .synchronize(sources)
            .await
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.executor.connection().close().await;
    }
}

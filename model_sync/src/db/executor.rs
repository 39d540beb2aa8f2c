//! SQL executor
//!
//! This module defines the database seam the synchronizer works against and
//! its live implementation on top of a [`DatabaseConnection`].

use async_trait::async_trait;

use crate::db::connection::DatabaseConnection;
use crate::error::Result;
use crate::schema::analyzer::SchemaAnalyzer;
use crate::schema::generator::MigrationGenerator;
use crate::schema::types::{SyncAction, TableSnapshot};

/// Database the synchronizer reads tables from and applies actions to
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Live structure of `table`, or `None` when it does not exist
    async fn snapshot(&self, table: &str) -> Result<Option<TableSnapshot>>;

    /// Run one action against the database
    async fn apply(&self, action: &SyncAction) -> Result<()>;
}

/// SQL executor for running sync actions
#[derive(Debug, Clone)]
pub struct SqlExecutor {
    connection: DatabaseConnection,
    analyzer: SchemaAnalyzer,
    generator: MigrationGenerator,
}

impl SqlExecutor {
    /// Create a new SQL executor
    pub fn new(connection: DatabaseConnection, schema: Option<String>) -> Self {
        let generator = MigrationGenerator::new(connection.driver());
        let analyzer = SchemaAnalyzer::new(connection.clone(), schema);

        Self {
            connection,
            analyzer,
            generator,
        }
    }

    /// Execute a single SQL statement
    pub async fn execute(&self, sql: &str) -> Result<()> {
        tracing::debug!(sql = %sql, "Executing statement");
        self.connection.execute(sql).await
    }

    pub fn generator(&self) -> &MigrationGenerator {
        &self.generator
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

#[async_trait]
impl SyncTarget for SqlExecutor {
    async fn snapshot(&self, table: &str) -> Result<Option<TableSnapshot>> {
        self.analyzer.snapshot(table).await
    }

    async fn apply(&self, action: &SyncAction) -> Result<()> {
        // Bare names land in the configured schema, the same one snapshots read
        let action = action.map_tables(|table| self.analyzer.qualify(table));
        let sql = self.generator.generate(&action)?;
        self.execute(&sql).await
    }
}

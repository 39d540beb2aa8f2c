//! Database schema analyzer
//!
//! This module reads the live structure of a single table: whether it exists,
//! its columns in ordinal order and the foreign keys defined on it.

use async_trait::async_trait;
use sqlx::{FromRow, MySql, Pool, Postgres, Row, Sqlite};

use crate::config::Driver;
use crate::db::connection::DatabaseConnection;
use crate::error::{Error, Result};
use crate::schema::types::TableSnapshot;
use crate::utils::naming::{format_sql_identifier, qualified_table_name, split_table_name};

/// Per-driver table introspection
#[async_trait]
trait Analyzer {
    /// Read the snapshot of `table` in `schema`, or `None` when it does not exist
    async fn snapshot(
        &self,
        schema: Option<&str>,
        table: &str,
        full_name: &str,
    ) -> Result<Option<TableSnapshot>>;
}

/// Schema analyzer for database schema introspection
#[derive(Debug, Clone)]
pub struct SchemaAnalyzer {
    connection: DatabaseConnection,
    schema: Option<String>,
}

impl SchemaAnalyzer {
    /// Create a new schema analyzer
    pub fn new(connection: DatabaseConnection, schema: Option<String>) -> Self {
        Self { connection, schema }
    }

    /// Name `table` is addressed by, qualified with the configured schema
    pub fn qualify(&self, table: &str) -> String {
        qualified_table_name(table, self.schema.as_deref(), self.connection.driver())
    }

    /// Read the live structure of one table.
    ///
    /// `table` may be schema-qualified (`audit.posts`); a bare name is looked
    /// up in the configured schema.
    pub async fn snapshot(&self, table: &str) -> Result<Option<TableSnapshot>> {
        let full_name = self.qualify(table);
        let (schema, name) = split_table_name(&full_name);
        let schema = schema.or(self.schema.as_deref());

        let snapshot = match &self.connection {
            DatabaseConnection::Postgres(pool) => {
                PostgresAnalyzer { pool }.snapshot(schema, name, &full_name).await
            }
            DatabaseConnection::MySql(pool) => {
                MySqlAnalyzer { pool }.snapshot(schema, name, &full_name).await
            }
            DatabaseConnection::Sqlite(pool) => {
                SqliteAnalyzer { pool }.snapshot(schema, name, &full_name).await
            }
        };

        snapshot.map_err(|e| match e {
            Error::SqlxError(e) => Error::SchemaAnalysisError(format!(
                "Failed to read table '{}': {}",
                table, e
            )),
            other => other,
        })
    }
}

#[derive(FromRow)]
struct ColumnRow {
    column_name: String,
}

#[derive(FromRow)]
struct ForeignKeyRow {
    constraint_name: String,
    column_name: String,
}

fn build_snapshot(
    full_name: &str,
    columns: Vec<ColumnRow>,
    foreign_keys: Vec<ForeignKeyRow>,
) -> TableSnapshot {
    let mut snapshot = TableSnapshot::new(full_name);
    for row in columns {
        snapshot.add_column(&row.column_name);
    }
    for row in foreign_keys {
        snapshot.add_foreign_key_column(&row.constraint_name, &row.column_name);
    }
    snapshot
}

/// PostgreSQL schema analyzer
struct PostgresAnalyzer<'a> {
    pool: &'a Pool<Postgres>,
}

#[async_trait]
impl<'a> Analyzer for PostgresAnalyzer<'a> {
    async fn snapshot(
        &self,
        schema: Option<&str>,
        table: &str,
        full_name: &str,
    ) -> Result<Option<TableSnapshot>> {
        let schema = schema.unwrap_or("public");

        let sql = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_name = $2 AND table_type = 'BASE TABLE'
        "#;

        let exists = sqlx::query_scalar::<_, String>(sql)
            .bind(schema)
            .bind(table)
            .fetch_optional(self.pool)
            .await?;

        if exists.is_none() {
            return Ok(None);
        }

        let sql = r#"
            SELECT column_name::text AS column_name
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let columns = sqlx::query_as::<_, ColumnRow>(sql)
            .bind(schema)
            .bind(table)
            .fetch_all(self.pool)
            .await?;

        let sql = r#"
            SELECT
                con.conname::text AS constraint_name,
                att.attname::text AS column_name
            FROM pg_constraint con
            JOIN pg_class rel ON rel.oid = con.conrelid
            JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
            JOIN LATERAL unnest(con.conkey) AS k(attnum) ON TRUE
            JOIN pg_attribute att ON att.attrelid = rel.oid AND att.attnum = k.attnum
            WHERE con.contype = 'f' AND nsp.nspname = $1 AND rel.relname = $2
            ORDER BY con.conname
        "#;

        let foreign_keys = sqlx::query_as::<_, ForeignKeyRow>(sql)
            .bind(schema)
            .bind(table)
            .fetch_all(self.pool)
            .await?;

        Ok(Some(build_snapshot(full_name, columns, foreign_keys)))
    }
}

/// MySQL schema analyzer
struct MySqlAnalyzer<'a> {
    pool: &'a Pool<MySql>,
}

#[async_trait]
impl<'a> Analyzer for MySqlAnalyzer<'a> {
    async fn snapshot(
        &self,
        schema: Option<&str>,
        table: &str,
        full_name: &str,
    ) -> Result<Option<TableSnapshot>> {
        // Without a configured schema the connection's default database is used
        let sql = r#"
            SELECT CAST(table_name AS CHAR) AS table_name
            FROM information_schema.tables
            WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ?
              AND table_type = 'BASE TABLE'
        "#;

        let exists = sqlx::query_scalar::<_, String>(sql)
            .bind(schema)
            .bind(table)
            .fetch_optional(self.pool)
            .await?;

        if exists.is_none() {
            return Ok(None);
        }

        let sql = r#"
            SELECT CAST(column_name AS CHAR) AS column_name
            FROM information_schema.columns
            WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ?
            ORDER BY ordinal_position
        "#;

        let columns = sqlx::query_as::<_, ColumnRow>(sql)
            .bind(schema)
            .bind(table)
            .fetch_all(self.pool)
            .await?;

        let sql = r#"
            SELECT
                CAST(constraint_name AS CHAR) AS constraint_name,
                CAST(column_name AS CHAR) AS column_name
            FROM information_schema.key_column_usage
            WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ?
              AND referenced_table_name IS NOT NULL
            ORDER BY constraint_name, ordinal_position
        "#;

        let foreign_keys = sqlx::query_as::<_, ForeignKeyRow>(sql)
            .bind(schema)
            .bind(table)
            .fetch_all(self.pool)
            .await?;

        Ok(Some(build_snapshot(full_name, columns, foreign_keys)))
    }
}

/// SQLite schema analyzer
struct SqliteAnalyzer<'a> {
    pool: &'a Pool<Sqlite>,
}

#[async_trait]
impl<'a> Analyzer for SqliteAnalyzer<'a> {
    async fn snapshot(
        &self,
        schema: Option<&str>,
        table: &str,
        full_name: &str,
    ) -> Result<Option<TableSnapshot>> {
        // Attached databases act as schemas
        let schema = format_sql_identifier(schema.unwrap_or("main"), Driver::Sqlite);

        let sql = format!(
            "SELECT name FROM {}.sqlite_master WHERE type = 'table' AND name = ?",
            schema
        );
        let exists = sqlx::query_scalar::<_, String>(&sql)
            .bind(table)
            .fetch_optional(self.pool)
            .await?;

        if exists.is_none() {
            return Ok(None);
        }

        let quoted = format_sql_identifier(table, Driver::Sqlite);

        let pragma = format!("PRAGMA {}.table_info({})", schema, quoted);
        let columns = sqlx::query(&pragma)
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(|row| {
                Ok(ColumnRow {
                    column_name: row.try_get("name")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // SQLite foreign keys carry no name, only a per-table id
        let pragma = format!("PRAGMA {}.foreign_key_list({})", schema, quoted);
        let foreign_keys = sqlx::query(&pragma)
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(|row| {
                let id: i64 = row.try_get("id")?;
                Ok(ForeignKeyRow {
                    constraint_name: format!("fk_{}_{}", table, id),
                    column_name: row.try_get("from")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(build_snapshot(full_name, columns, foreign_keys)))
    }
}

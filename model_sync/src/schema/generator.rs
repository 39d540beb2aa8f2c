//! Migration generator
//!
//! This module renders sync actions into driver-specific DDL statements and
//! maps abstract column types onto concrete database types.

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use crate::config::Driver;
use crate::error::{Error, Result};
use crate::schema::types::{SyncAction, TypeSpec};
use crate::utils::naming::{format_sql_identifier, format_table_name, split_table_name};

static SIZED_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\((.+?)\)(.*)$").expect("static regex is valid"));
static MODIFIED_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\s+").expect("static regex is valid"));
static PARENTHESIZED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(.+\)").expect("static regex is valid"));

/// Migration SQL generator
#[derive(Debug, Clone, Copy)]
pub struct MigrationGenerator {
    driver: Driver,
}

impl MigrationGenerator {
    /// Create a new migration generator
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Render one sync action as a single SQL statement
    pub fn generate(&self, action: &SyncAction) -> Result<String> {
        match action {
            SyncAction::CreateTable { table, columns } => {
                let column_defs: Vec<String> = columns
                    .iter()
                    .map(|(name, spec)| {
                        format!("\t{} {}", self.quote(name), self.column_type(spec))
                    })
                    .collect();

                let mut sql = format!(
                    "CREATE TABLE {} (\n{}\n)",
                    self.quote_table(table),
                    column_defs.join(",\n")
                );
                if self.driver == Driver::Mysql {
                    sql.push_str(" DEFAULT CHARACTER SET=utf8mb4 COLLATE=utf8mb4_unicode_ci");
                }

                Ok(sql)
            }
            SyncAction::AddColumn {
                table,
                column,
                type_spec,
            } => Ok(format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                self.quote_table(table),
                self.quote(column),
                self.column_type(type_spec)
            )),
            SyncAction::DropColumn { table, column } => Ok(format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.quote_table(table),
                self.quote(column)
            )),
            SyncAction::CreateIndex { name, table, column } => {
                // SQLite puts the schema on the index, the table must stay bare
                let (index, table) = match (self.driver, split_table_name(table)) {
                    (Driver::Sqlite, (Some(schema), bare)) => (
                        format!("{}.{}", self.quote(schema), self.quote(name)),
                        self.quote(bare),
                    ),
                    _ => (self.quote(name), self.quote_table(table)),
                };

                Ok(format!(
                    "CREATE INDEX {} ON {} ({})",
                    index,
                    table,
                    self.quote(column)
                ))
            }
            SyncAction::AddForeignKey {
                name,
                table,
                column,
                ref_table,
                ref_column,
                on_delete,
                on_update,
            } => {
                if self.driver == Driver::Sqlite {
                    return Err(Error::MigrationError(
                        "SQLite does not support adding foreign keys to existing tables. \
                         You need to recreate the table with the foreign key constraints."
                            .to_string(),
                    ));
                }

                let mut sql = format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                    self.quote_table(table),
                    self.quote(name),
                    self.quote(column),
                    self.quote_table(ref_table),
                    self.quote(ref_column)
                );
                if let Some(rule) = on_delete {
                    sql.push_str(&format!(" ON DELETE {}", rule));
                }
                if let Some(rule) = on_update {
                    sql.push_str(&format!(" ON UPDATE {}", rule));
                }

                Ok(sql)
            }
            SyncAction::DropForeignKey { name, table } => match self.driver {
                Driver::Postgres => Ok(format!(
                    "ALTER TABLE {} DROP CONSTRAINT {}",
                    self.quote_table(table),
                    self.quote(name)
                )),
                Driver::Mysql => Ok(format!(
                    "ALTER TABLE {} DROP FOREIGN KEY {}",
                    self.quote_table(table),
                    self.quote(name)
                )),
                Driver::Sqlite => Err(Error::MigrationError(
                    "SQLite does not support dropping foreign keys from existing tables. \
                     You need to recreate the table without the foreign key constraints."
                        .to_string(),
                )),
            },
        }
    }

    /// Map a declared type onto the driver's column type.
    ///
    /// `string(64)` keeps its size, `string NOT NULL` keeps its modifiers and
    /// anything that is not an abstract type passes through unchanged.
    pub fn column_type(&self, spec: &TypeSpec) -> String {
        let spec = spec.as_str().trim();

        if let Some(mapped) = self.abstract_type(spec) {
            return mapped.to_string();
        }

        if let Some(captures) = SIZED_TYPE.captures(spec) {
            if let Some(mapped) = self.abstract_type(&captures[1]) {
                let size = format!("({})", &captures[2]);
                let sized = PARENTHESIZED.replace(mapped, NoExpand(&size));
                return format!("{}{}", sized, &captures[3]);
            }
        }

        if let Some(captures) = MODIFIED_TYPE.captures(spec) {
            if let Some(mapped) = self.abstract_type(&captures[1]) {
                return format!("{}{}", mapped, &spec[captures[1].len()..]);
            }
        }

        spec.to_string()
    }

    fn abstract_type(&self, name: &str) -> Option<&'static str> {
        let mapped = match self.driver {
            Driver::Postgres => match name {
                "pk" => "serial NOT NULL PRIMARY KEY",
                "bigpk" => "bigserial NOT NULL PRIMARY KEY",
                "string" => "varchar(255)",
                "text" => "text",
                "smallint" => "smallint",
                "integer" => "integer",
                "bigint" => "bigint",
                "float" | "double" => "double precision",
                "decimal" => "numeric(10,0)",
                "datetime" | "timestamp" => "timestamp(0)",
                "time" => "time(0)",
                "date" => "date",
                "binary" => "bytea",
                "boolean" => "boolean",
                "money" => "numeric(19,4)",
                "json" => "jsonb",
                "uuid" => "uuid",
                _ => return None,
            },
            Driver::Mysql => match name {
                "pk" => "int(11) NOT NULL AUTO_INCREMENT PRIMARY KEY",
                "bigpk" => "bigint(20) NOT NULL AUTO_INCREMENT PRIMARY KEY",
                "string" => "varchar(255)",
                "text" => "text",
                "smallint" => "smallint(6)",
                "integer" => "int(11)",
                "bigint" => "bigint(20)",
                "float" => "float",
                "double" => "double",
                "decimal" => "decimal(10,0)",
                "datetime" => "datetime",
                "timestamp" => "timestamp",
                "time" => "time",
                "date" => "date",
                "binary" => "blob",
                "boolean" => "tinyint(1)",
                "money" => "decimal(19,4)",
                "json" => "json",
                "uuid" => "char(36)",
                _ => return None,
            },
            Driver::Sqlite => match name {
                "pk" | "bigpk" => "integer PRIMARY KEY AUTOINCREMENT NOT NULL",
                "string" => "varchar(255)",
                "text" | "json" | "uuid" => "text",
                "smallint" => "smallint",
                "integer" => "integer",
                "bigint" => "bigint",
                "float" => "float",
                "double" => "double",
                "decimal" => "decimal(10,0)",
                "datetime" => "datetime",
                "timestamp" => "timestamp",
                "time" => "time",
                "date" => "date",
                "binary" => "blob",
                "boolean" => "boolean",
                "money" => "decimal(19,4)",
                _ => return None,
            },
        };

        Some(mapped)
    }

    fn quote(&self, name: &str) -> String {
        format_sql_identifier(name, self.driver)
    }

    fn quote_table(&self, name: &str) -> String {
        format_table_name(name, self.driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::ColumnTypes;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Driver::Postgres, "pk", "serial NOT NULL PRIMARY KEY")]
    #[case(Driver::Mysql, "pk", "int(11) NOT NULL AUTO_INCREMENT PRIMARY KEY")]
    #[case(Driver::Sqlite, "pk", "integer PRIMARY KEY AUTOINCREMENT NOT NULL")]
    #[case(Driver::Postgres, "string(64)", "varchar(64)")]
    #[case(Driver::Mysql, "string(64) NOT NULL", "varchar(64) NOT NULL")]
    #[case(Driver::Postgres, "decimal(12,2)", "numeric(12,2)")]
    #[case(Driver::Postgres, "string NOT NULL DEFAULT ''", "varchar(255) NOT NULL DEFAULT ''")]
    #[case(Driver::Mysql, "boolean", "tinyint(1)")]
    #[case(Driver::Sqlite, "json", "text")]
    #[case(Driver::Postgres, "integer(8)", "integer")]
    #[case(Driver::Postgres, "character varying(40)", "character varying(40)")]
    #[case(Driver::Mysql, "ENUM('a','b')", "ENUM('a','b')")]
    fn test_column_type(#[case] driver: Driver, #[case] spec: &str, #[case] expected: &str) {
        let generator = MigrationGenerator::new(driver);
        assert_eq!(generator.column_type(&TypeSpec::from(spec)), expected);
    }

    #[test]
    fn test_create_table_sql() {
        let mut columns = ColumnTypes::new();
        columns.insert("id".to_string(), TypeSpec::from("pk"));
        columns.insert("title".to_string(), TypeSpec::from("string NOT NULL"));
        let action = SyncAction::CreateTable {
            table: "posts".to_string(),
            columns,
        };

        let sql = MigrationGenerator::new(Driver::Postgres).generate(&action).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"posts\" (\n\t\"id\" serial NOT NULL PRIMARY KEY,\n\t\"title\" varchar(255) NOT NULL\n)"
        );

        let sql = MigrationGenerator::new(Driver::Mysql).generate(&action).unwrap();
        assert!(sql.starts_with(
            "CREATE TABLE `posts` (\n\t`id` int(11) NOT NULL AUTO_INCREMENT PRIMARY KEY,"
        ));
        assert!(sql.ends_with("DEFAULT CHARACTER SET=utf8mb4 COLLATE=utf8mb4_unicode_ci"));
    }

    #[test]
    fn test_alter_statements() {
        let generator = MigrationGenerator::new(Driver::Mysql);

        let add = SyncAction::AddColumn {
            table: "posts".to_string(),
            column: "slug".to_string(),
            type_spec: TypeSpec::from("string(128)"),
        };
        assert_eq!(
            generator.generate(&add).unwrap(),
            "ALTER TABLE `posts` ADD COLUMN `slug` varchar(128)"
        );

        let drop = SyncAction::DropColumn {
            table: "posts".to_string(),
            column: "legacy".to_string(),
        };
        assert_eq!(
            generator.generate(&drop).unwrap(),
            "ALTER TABLE `posts` DROP COLUMN `legacy`"
        );

        let drop_fk = SyncAction::DropForeignKey {
            name: "posts_legacy_fk_0".to_string(),
            table: "posts".to_string(),
        };
        assert_eq!(
            generator.generate(&drop_fk).unwrap(),
            "ALTER TABLE `posts` DROP FOREIGN KEY `posts_legacy_fk_0`"
        );
    }

    #[test]
    fn test_constraint_statements() {
        let generator = MigrationGenerator::new(Driver::Postgres);

        let index = SyncAction::CreateIndex {
            name: "posts_author_id_idx_0".to_string(),
            table: "posts".to_string(),
            column: "author_id".to_string(),
        };
        assert_eq!(
            generator.generate(&index).unwrap(),
            "CREATE INDEX \"posts_author_id_idx_0\" ON \"posts\" (\"author_id\")"
        );

        let fk = SyncAction::AddForeignKey {
            name: "posts_author_id_fk_0".to_string(),
            table: "posts".to_string(),
            column: "author_id".to_string(),
            ref_table: "users".to_string(),
            ref_column: "id".to_string(),
            on_delete: Some("CASCADE".to_string()),
            on_update: None,
        };
        assert_eq!(
            generator.generate(&fk).unwrap(),
            "ALTER TABLE \"posts\" ADD CONSTRAINT \"posts_author_id_fk_0\" FOREIGN KEY (\"author_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
        );

        let drop_fk = SyncAction::DropForeignKey {
            name: "posts_author_id_fk_0".to_string(),
            table: "posts".to_string(),
        };
        assert_eq!(
            generator.generate(&drop_fk).unwrap(),
            "ALTER TABLE \"posts\" DROP CONSTRAINT \"posts_author_id_fk_0\""
        );
    }

    #[rstest]
    #[case(Driver::Sqlite, "CREATE INDEX \"audit\".\"posts_slug_idx_0\" ON \"posts\" (\"slug\")")]
    #[case(Driver::Postgres, "CREATE INDEX \"posts_slug_idx_0\" ON \"audit\".\"posts\" (\"slug\")")]
    #[case(Driver::Mysql, "CREATE INDEX `posts_slug_idx_0` ON `audit`.`posts` (`slug`)")]
    fn test_index_on_qualified_table(#[case] driver: Driver, #[case] expected: &str) {
        let index = SyncAction::CreateIndex {
            name: "posts_slug_idx_0".to_string(),
            table: "audit.posts".to_string(),
            column: "slug".to_string(),
        };
        assert_eq!(MigrationGenerator::new(driver).generate(&index).unwrap(), expected);
    }

    #[test]
    fn test_sqlite_rejects_foreign_key_changes() {
        let generator = MigrationGenerator::new(Driver::Sqlite);
        let drop_fk = SyncAction::DropForeignKey {
            name: "fk_posts_0".to_string(),
            table: "posts".to_string(),
        };

        assert!(matches!(generator.generate(&drop_fk), Err(Error::MigrationError(_))));
    }
}

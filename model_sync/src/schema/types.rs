//! Type definitions for declarations, live table snapshots and sync actions

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::NamingConfig;
use crate::utils::naming;

/// A declared column type, either an abstract type such as `pk`, `string(64)`,
/// `integer NOT NULL` or a raw SQL type passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeSpec(String);

impl TypeSpec {
    pub fn new(spec: impl Into<String>) -> Self {
        Self(spec.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeSpec {
    fn from(spec: &str) -> Self {
        Self(spec.to_string())
    }
}

impl From<String> for TypeSpec {
    fn from(spec: String) -> Self {
        Self(spec)
    }
}

/// Ordered mapping of column name to declared type
pub type ColumnTypes = IndexMap<String, TypeSpec>;

/// A declared index or foreign key instruction attached to a declaration.
///
/// Arguments stay optional so an incomplete operation can be reported with
/// the argument that is missing instead of failing to load.
///
/// `group` is the ordinal of the column group the operation was declared in.
/// Operations declared together (an index and a foreign key on one column)
/// share it, and it feeds the default constraint name when set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    CreateIndex {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        table: Option<String>,
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        group: Option<usize>,
    },
    AddForeignKey {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        table: Option<String>,
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        ref_table: Option<String>,
        #[serde(default)]
        ref_column: Option<String>,
        #[serde(default)]
        on_delete: Option<String>,
        #[serde(default)]
        on_update: Option<String>,
        #[serde(default)]
        group: Option<usize>,
    },
}

impl Operation {
    /// Index on `table.column`
    pub fn create_index(table: &str, column: &str) -> Self {
        Operation::CreateIndex {
            name: None,
            table: Some(table.to_string()),
            column: Some(column.to_string()),
            group: None,
        }
    }

    /// Foreign key from `table.column` to `ref_table.ref_column`
    pub fn add_foreign_key(table: &str, column: &str, ref_table: &str, ref_column: &str) -> Self {
        Operation::AddForeignKey {
            name: None,
            table: Some(table.to_string()),
            column: Some(column.to_string()),
            ref_table: Some(ref_table.to_string()),
            ref_column: Some(ref_column.to_string()),
            on_delete: None,
            on_update: None,
            group: None,
        }
    }

    /// Set the `ON DELETE` / `ON UPDATE` rules of a foreign key operation
    pub fn with_rules(mut self, delete: Option<&str>, update: Option<&str>) -> Self {
        if let Operation::AddForeignKey {
            on_delete,
            on_update,
            ..
        } = &mut self
        {
            *on_delete = delete.map(str::to_string);
            *on_update = update.map(str::to_string);
        }
        self
    }

    /// Place the operation in column group `index`
    pub fn in_group(mut self, index: usize) -> Self {
        match &mut self {
            Operation::CreateIndex { group, .. } | Operation::AddForeignKey { group, .. } => {
                *group = Some(index);
            }
        }
        self
    }

    pub fn group(&self) -> Option<usize> {
        match self {
            Operation::CreateIndex { group, .. } | Operation::AddForeignKey { group, .. } => {
                *group
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateIndex { .. } => "createIndex",
            Operation::AddForeignKey { .. } => "addForeignKey",
        }
    }

    /// Column the operation applies to, if given
    pub fn target_column(&self) -> Option<&str> {
        match self {
            Operation::CreateIndex { column, .. } | Operation::AddForeignKey { column, .. } => {
                column.as_deref()
            }
        }
    }

    /// Turn the operation into an executable action.
    ///
    /// `position` feeds the default constraint name. Callers pass the
    /// operation's group when it has one, otherwise its ordinal among the
    /// declaration's operations of the same kind.
    /// Returns the name of the first missing required argument on failure.
    pub fn resolve(
        &self,
        position: usize,
        naming_config: &NamingConfig,
    ) -> std::result::Result<SyncAction, &'static str> {
        match self {
            Operation::CreateIndex {
                name,
                table,
                column,
                ..
            } => {
                let table = required(table, "table")?;
                let column = required(column, "column")?;
                let name = name.clone().unwrap_or_else(|| {
                    naming::get_index_name(&naming_config.index_pattern, table, column, position)
                });

                Ok(SyncAction::CreateIndex {
                    name,
                    table: table.to_string(),
                    column: column.to_string(),
                })
            }
            Operation::AddForeignKey {
                name,
                table,
                column,
                ref_table,
                ref_column,
                on_delete,
                on_update,
                ..
            } => {
                let table = required(table, "table")?;
                let column = required(column, "column")?;
                let ref_table = required(ref_table, "ref_table")?;
                let ref_column = required(ref_column, "ref_column")?;
                let name = name.clone().unwrap_or_else(|| {
                    naming::get_foreign_key_name(
                        &naming_config.foreign_key_pattern,
                        table,
                        column,
                        position,
                    )
                });

                Ok(SyncAction::AddForeignKey {
                    name,
                    table: table.to_string(),
                    column: column.to_string(),
                    ref_table: ref_table.to_string(),
                    ref_column: ref_column.to_string(),
                    on_delete: on_delete.clone(),
                    on_update: on_update.clone(),
                })
            }
        }
    }
}

fn required<'a>(
    value: &'a Option<String>,
    argument: &'static str,
) -> std::result::Result<&'a str, &'static str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(argument),
    }
}

/// Live structure of one database table at the moment of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub full_name: String,
    pub columns: Vec<String>,
    /// Foreign key name to the columns of this table it covers
    pub foreign_keys: IndexMap<String, Vec<String>>,
}

impl TableSnapshot {
    pub fn new(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            columns: Vec::new(),
            foreign_keys: IndexMap::new(),
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn add_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    /// Record that foreign key `name` covers `column`
    pub fn add_foreign_key_column(&mut self, name: &str, column: &str) {
        let columns = self.foreign_keys.entry(name.to_string()).or_default();
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn has_foreign_key(&self, name: &str) -> bool {
        self.foreign_keys.contains_key(name)
    }

    /// Names of the foreign keys that cover `column`
    pub fn foreign_keys_referencing(&self, column: &str) -> Vec<&str> {
        self.foreign_keys
            .iter()
            .filter(|(_, columns)| columns.iter().any(|c| c == column))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// One atomic DDL operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncAction {
    CreateTable {
        table: String,
        columns: ColumnTypes,
    },
    AddColumn {
        table: String,
        column: String,
        type_spec: TypeSpec,
    },
    DropColumn {
        table: String,
        column: String,
    },
    CreateIndex {
        name: String,
        table: String,
        column: String,
    },
    AddForeignKey {
        name: String,
        table: String,
        column: String,
        ref_table: String,
        ref_column: String,
        on_delete: Option<String>,
        on_update: Option<String>,
    },
    DropForeignKey {
        name: String,
        table: String,
    },
}

impl SyncAction {
    pub fn table(&self) -> &str {
        match self {
            SyncAction::CreateTable { table, .. }
            | SyncAction::AddColumn { table, .. }
            | SyncAction::DropColumn { table, .. }
            | SyncAction::CreateIndex { table, .. }
            | SyncAction::AddForeignKey { table, .. }
            | SyncAction::DropForeignKey { table, .. } => table,
        }
    }

    /// Same action with every table it names (including a referenced one)
    /// renamed through `rename`
    pub fn map_tables(&self, rename: impl Fn(&str) -> String) -> SyncAction {
        let mut action = self.clone();
        match &mut action {
            SyncAction::AddForeignKey {
                table, ref_table, ..
            } => {
                *table = rename(table);
                *ref_table = rename(ref_table);
            }
            SyncAction::CreateTable { table, .. }
            | SyncAction::AddColumn { table, .. }
            | SyncAction::DropColumn { table, .. }
            | SyncAction::CreateIndex { table, .. }
            | SyncAction::DropForeignKey { table, .. } => *table = rename(table),
        }
        action
    }

    /// Column introduced or constrained by the action
    pub fn column(&self) -> Option<&str> {
        match self {
            SyncAction::AddColumn { column, .. }
            | SyncAction::DropColumn { column, .. }
            | SyncAction::CreateIndex { column, .. }
            | SyncAction::AddForeignKey { column, .. } => Some(column),
            SyncAction::CreateTable { .. } | SyncAction::DropForeignKey { .. } => None,
        }
    }

    /// Operator-facing line reported once the action has run
    pub fn summary(&self) -> String {
        match self {
            SyncAction::CreateTable { table, .. } => {
                format!("New table '{}' is created.", table)
            }
            SyncAction::AddColumn {
                table,
                column,
                type_spec,
            } => format!(
                "Column '{}' added to '{}' with type [{}].",
                column, table, type_spec
            ),
            SyncAction::DropColumn { table, column } => {
                format!("Column '{}' is removed from '{}'.", column, table)
            }
            SyncAction::CreateIndex { name, table, column } => {
                format!("Index '{}' is created on '{}.{}'.", name, table, column)
            }
            SyncAction::AddForeignKey {
                name,
                table,
                column,
                ref_table,
                ref_column,
                ..
            } => format!(
                "Foreign key '{}' on '{}.{}' references '{}.{}'.",
                name, table, column, ref_table, ref_column
            ),
            SyncAction::DropForeignKey { name, table } => {
                format!("Foreign key '{}' is removed from '{}'.", name, table)
            }
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::CreateTable { table, columns } => {
                let columns: Vec<String> = columns
                    .iter()
                    .map(|(name, spec)| format!("{}: {}", name, spec))
                    .collect();
                write!(f, "CreateTable({}, {{{}}})", table, columns.join(", "))
            }
            SyncAction::AddColumn {
                table,
                column,
                type_spec,
            } => write!(f, "AddColumn({}, {}, {})", table, column, type_spec),
            SyncAction::DropColumn { table, column } => {
                write!(f, "DropColumn({}, {})", table, column)
            }
            SyncAction::CreateIndex { name, table, column } => {
                write!(f, "CreateIndex({}, {}, {})", name, table, column)
            }
            SyncAction::AddForeignKey {
                name,
                table,
                column,
                ref_table,
                ref_column,
                ..
            } => write!(
                f,
                "AddForeignKey({}, {}.{} -> {}.{})",
                name, table, column, ref_table, ref_column
            ),
            SyncAction::DropForeignKey { name, table } => {
                write!(f, "DropForeignKey({}, {})", name, table)
            }
        }
    }
}

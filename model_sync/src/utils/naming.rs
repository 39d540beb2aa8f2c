//! Naming utilities for model_sync
//!
//! Declaration identities, default table names, constraint names and SQL
//! identifier quoting.

use inflector::Inflector;

use crate::config::Driver;

/// Format a name according to a pattern with placeholders
pub fn format_name(pattern: &str, replacements: &[(&str, &str)]) -> String {
    let mut result = pattern.to_string();

    for (placeholder, value) in replacements {
        result = result.replace(&format!("{{{}}}", placeholder), value);
    }

    result
}

/// Default table name for a model or declaration file name
pub fn default_table_name(model_name: &str) -> String {
    model_name.to_snake_case()
}

/// Normalize a source label: `app\models\` and `app::models` both become `app::models`
pub fn normalize_label(label: &str) -> String {
    label
        .replace('\\', "::")
        .replace('/', "::")
        .split("::")
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("::")
}

/// Fully-qualified identity of a declaration: `<label>::<snake_case name>`
pub fn declaration_identity(label: &str, name: &str) -> String {
    let label = normalize_label(label);
    let name = name.to_snake_case();

    if label.is_empty() {
        name
    } else {
        format!("{}::{}", label, name)
    }
}

/// Relative directory a label maps to when a source has no explicit path
pub fn label_to_relative_path(label: &str) -> std::path::PathBuf {
    normalize_label(label).split("::").collect()
}

/// Get index name for `table.column` according to pattern
pub fn get_index_name(
    pattern: &str,
    table_name: &str,
    column_name: &str,
    position: usize,
) -> String {
    let position = position.to_string();

    format_name(
        pattern,
        &[
            ("table", table_name),
            ("column", column_name),
            ("position", &position),
        ],
    )
}

/// Get foreign key constraint name according to pattern
pub fn get_foreign_key_name(
    pattern: &str,
    table_name: &str,
    column_name: &str,
    position: usize,
) -> String {
    let position = position.to_string();

    format_name(
        pattern,
        &[
            ("table", table_name),
            ("column", column_name),
            ("position", &position),
        ],
    )
}

/// Quote a SQL identifier for the given driver, escaping embedded quotes
pub fn format_sql_identifier(name: &str, driver: Driver) -> String {
    match driver {
        Driver::Postgres | Driver::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
        Driver::Mysql => format!("`{}`", name.replace('`', "``")),
    }
}

/// Quote a possibly schema-qualified table name (`schema.table`)
pub fn format_table_name(name: &str, driver: Driver) -> String {
    name.split('.')
        .map(|part| format_sql_identifier(part, driver))
        .collect::<Vec<_>>()
        .join(".")
}

/// Split `schema.table` into its schema and bare table name
pub fn split_table_name(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    }
}

/// Name a table is addressed by in DDL and reported under.
///
/// An explicitly qualified name is kept as is. A bare name is qualified with
/// the configured schema unless that schema is the driver's default one.
pub fn qualified_table_name(name: &str, schema: Option<&str>, driver: Driver) -> String {
    let default_schema = match driver {
        Driver::Postgres => Some("public"),
        Driver::Sqlite => Some("main"),
        Driver::Mysql => None,
    };

    if split_table_name(name).0.is_some() {
        return name.to_string();
    }

    match schema {
        Some(schema) if Some(schema) != default_schema => format!("{}.{}", schema, name),
        _ => name.to_string(),
    }
}

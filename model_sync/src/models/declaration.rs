//! Model declarations
//!
//! A declaration is the source of truth for one table: its column types and
//! the index / foreign key meta-operations attached to them. Declarations come
//! either from registered Rust types or from declaration files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::registry::HasColumnDeclarations;
use crate::schema::types::{ColumnTypes, Operation};
use crate::utils::naming::default_table_name;

/// One table's desired column set and auxiliary operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDeclaration {
    pub identity: String,
    pub table_name: String,
    pub columns: ColumnTypes,
    pub operations: Vec<Operation>,
}

impl ModelDeclaration {
    /// Capture a declaration from anything implementing the declaration contract
    pub fn from_source(identity: &str, source: &dyn HasColumnDeclarations) -> Result<Self> {
        let declaration = Self {
            identity: identity.to_string(),
            table_name: source.table_name(),
            columns: source.column_types(),
            operations: source.operations(),
        };
        declaration.validate()?;

        Ok(declaration)
    }

    /// Load a declaration file (`.toml`, `.yaml`, `.yml` or `.json`).
    ///
    /// Returns `Ok(None)` for files of any other type. A file that cannot be
    /// parsed into the declaration shape is an unsupported declaration.
    pub fn from_file(identity: &str, path: &Path) -> Result<Option<Self>> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);

        let format = match extension.as_deref() {
            Some(ext @ ("toml" | "yaml" | "yml" | "json")) => ext.to_string(),
            _ => return Ok(None),
        };

        let unsupported =
            |e: String| Error::UnsupportedDeclaration(format!("{}: {}", path.display(), e));
        // Text that is not UTF-8 cannot be a declaration
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => unsupported(e.to_string()),
            _ => e.into(),
        })?;

        let file: DeclarationFile = match format.as_str() {
            "toml" => toml::from_str(&content).map_err(|e| unsupported(e.to_string()))?,
            "json" => serde_json::from_str(&content).map_err(|e| unsupported(e.to_string()))?,
            _ => serde_yaml::from_str(&content).map_err(|e| unsupported(e.to_string()))?,
        };

        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();

        let declaration = Self {
            identity: identity.to_string(),
            table_name: file.table.unwrap_or_else(|| default_table_name(stem)),
            columns: file.columns,
            operations: file.operations,
        };
        declaration.validate()?;

        Ok(Some(declaration))
    }

    /// Check the declaration has the shape the synchronizer needs
    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(Error::UnsupportedDeclaration(format!(
                "{} declares an empty table name",
                self.identity
            )));
        }

        if self.columns.is_empty() {
            return Err(Error::UnsupportedDeclaration(format!(
                "{} declares no columns",
                self.identity
            )));
        }

        Ok(())
    }
}

impl HasColumnDeclarations for ModelDeclaration {
    fn table_name(&self) -> String {
        self.table_name.clone()
    }

    fn column_types(&self) -> ColumnTypes {
        self.columns.clone()
    }

    fn operations(&self) -> Vec<Operation> {
        self.operations.clone()
    }
}

/// On-disk shape of a declaration file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeclarationFile {
    #[serde(default, alias = "table_name")]
    table: Option<String>,
    columns: ColumnTypes,
    #[serde(default)]
    operations: Vec<Operation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::TypeSpec;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_toml_declaration_keeps_column_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Post.toml");
        fs::write(
            &path,
            r#"
            table = "posts"

            [columns]
            id = "pk"
            title = "string NOT NULL"
            author_id = "integer"

            [[operations]]
            kind = "create_index"
            table = "posts"
            column = "author_id"
            "#,
        )
        .unwrap();

        let declaration = ModelDeclaration::from_file("app::post", &path).unwrap().unwrap();

        assert_eq!(declaration.table_name, "posts");
        assert_eq!(
            declaration.columns.keys().collect::<Vec<_>>(),
            vec!["id", "title", "author_id"]
        );
        assert_eq!(declaration.columns["title"], TypeSpec::from("string NOT NULL"));
        assert_eq!(declaration.operations, vec![Operation::create_index("posts", "author_id")]);
    }

    #[test]
    fn test_yaml_and_json_declarations() {
        let dir = tempdir().unwrap();

        let yaml = dir.path().join("ProductCategory.yaml");
        fs::write(&yaml, "columns:\n  id: pk\n  name: string\n").unwrap();
        let declaration = ModelDeclaration::from_file("app::product_category", &yaml)
            .unwrap()
            .unwrap();
        assert_eq!(declaration.table_name, "product_category");
        assert_eq!(declaration.columns.len(), 2);

        let json = dir.path().join("tag.json");
        fs::write(
            &json,
            r#"{"table_name": "tags", "columns": {"id": "pk", "label": "string(32)"}}"#,
        )
        .unwrap();
        let declaration = ModelDeclaration::from_file("app::tag", &json).unwrap().unwrap();
        assert_eq!(declaration.table_name, "tags");
        assert_eq!(declaration.columns["label"], TypeSpec::from("string(32)"));
    }

    #[test]
    fn test_other_files_are_not_declarations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("README.md");
        fs::write(&path, "# models").unwrap();

        assert!(ModelDeclaration::from_file("app::readme", &path).unwrap().is_none());
    }

    #[test]
    fn test_malformed_files_are_unsupported() {
        let dir = tempdir().unwrap();

        let no_columns = dir.path().join("empty.toml");
        fs::write(&no_columns, "table = \"empty\"\n[columns]\n").unwrap();
        assert!(matches!(
            ModelDeclaration::from_file("app::empty", &no_columns),
            Err(Error::UnsupportedDeclaration(_))
        ));

        let garbage = dir.path().join("broken.json");
        fs::write(&garbage, "{ not json").unwrap();
        assert!(matches!(
            ModelDeclaration::from_file("app::broken", &garbage),
            Err(Error::UnsupportedDeclaration(_))
        ));
    }

    #[test]
    fn test_non_utf8_file_is_unsupported() {
        let dir = tempdir().unwrap();
        let binary = dir.path().join("Broken.toml");
        fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();

        match ModelDeclaration::from_file("app::broken", &binary) {
            Err(Error::UnsupportedDeclaration(message)) => {
                assert!(message.contains("Broken.toml"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let missing = dir.path().join("Missing.toml");
        assert!(matches!(
            ModelDeclaration::from_file("app::missing", &missing),
            Err(Error::IoError(_))
        ));
    }
}

//! Declaration registry for model_sync
//!
//! This module defines the declaration contract, keeps the statically
//! registered declaration types and discovers declarations in source
//! directories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::{ModelsConfig, SourceConfig};
use crate::error::{Error, Result};
use crate::models::declaration::ModelDeclaration;
use crate::schema::types::{ColumnTypes, Operation};
use crate::utils::naming::{declaration_identity, label_to_relative_path};

/// Anything that declares the columns of one table
pub trait HasColumnDeclarations {
    /// Get the table name for this declaration
    fn table_name(&self) -> String;

    /// Get the declared column types, in column order
    fn column_types(&self) -> ColumnTypes;

    /// Get the index and foreign key operations attached to the columns
    fn operations(&self) -> Vec<Operation> {
        Vec::new()
    }
}

type Constructor = Box<dyn Fn() -> Box<dyn HasColumnDeclarations> + Send + Sync>;

/// A declaration found while scanning a source directory
#[derive(Debug)]
pub struct DiscoveredDeclaration {
    pub identity: String,
    pub path: PathBuf,
    pub declaration: Result<ModelDeclaration>,
}

/// Registry of declaration types, keyed by declaration identity
pub struct DeclarationRegistry {
    constructors: HashMap<String, Constructor>,
    base_dir: PathBuf,
}

impl DeclarationRegistry {
    /// Create a new, empty registry
    pub fn new(config: &ModelsConfig) -> Self {
        Self {
            constructors: HashMap::new(),
            base_dir: config.base_dir.clone(),
        }
    }

    /// Register a declaration type under `<label>::<name>`.
    ///
    /// The name is matched against declaration file stems in snake case, so
    /// `register::<ProductCategory>("app::models", "ProductCategory")` picks
    /// up `app/models/product_category.rs`.
    pub fn register<T>(&mut self, label: &str, name: &str) -> &mut Self
    where
        T: HasColumnDeclarations + Default + 'static,
    {
        self.register_with(label, name, || T::default())
    }

    /// Register a declaration built by `constructor`
    pub fn register_with<T, F>(&mut self, label: &str, name: &str, constructor: F) -> &mut Self
    where
        T: HasColumnDeclarations + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let identity = declaration_identity(label, name);
        tracing::debug!(identity = %identity, "Registered declaration");

        self.constructors.insert(
            identity,
            Box::new(move || Box::new(constructor()) as Box<dyn HasColumnDeclarations>),
        );
        self
    }

    pub fn is_registered(&self, identity: &str) -> bool {
        self.constructors.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Directory scanned for a source: its explicit path, or one derived from its label
    pub fn resolve_directory(&self, source: &SourceConfig) -> PathBuf {
        match &source.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.base_dir.join(path),
            None => self.base_dir.join(label_to_relative_path(&source.label)),
        }
    }

    /// Enumerate and load the declarations of one source, non-recursively.
    ///
    /// A missing directory is a configuration error. Files that do not hold a
    /// usable declaration are returned with an `UnsupportedDeclaration` error so
    /// the caller can skip them.
    pub fn discover(&self, source: &SourceConfig) -> Result<Vec<DiscoveredDeclaration>> {
        let directory = self.resolve_directory(source);

        if !directory.is_dir() {
            return Err(Error::ConfigError(format!(
                "Directory does not exist: {} (source '{}')",
                directory.display(),
                source.label
            )));
        }

        let directory_str = directory.to_str().ok_or_else(|| {
            Error::ConfigError(format!("Non UTF-8 directory: {}", directory.display()))
        })?;
        let pattern = format!("{}/{}", glob::Pattern::escape(directory_str), source.pattern);

        let entries = glob::glob(&pattern).map_err(|e| {
            Error::ConfigError(format!("Invalid pattern '{}': {}", source.pattern, e))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Error::IoError(e.into_error()))?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let mut discovered = Vec::with_capacity(files.len());
        for path in files {
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_string();
            let identity = declaration_identity(&source.label, &stem);
            let declaration = self.load(&identity, &path)?;

            discovered.push(DiscoveredDeclaration {
                identity,
                path,
                declaration,
            });
        }

        Ok(discovered)
    }

    /// Load one file. The outer error is fatal (I/O), the inner one marks an
    /// unsupported declaration.
    fn load(&self, identity: &str, path: &Path) -> Result<Result<ModelDeclaration>> {
        if let Some(constructor) = self.constructors.get(identity) {
            let source = constructor();
            return Ok(ModelDeclaration::from_source(identity, source.as_ref()));
        }

        match ModelDeclaration::from_file(identity, path) {
            Ok(Some(declaration)) => Ok(Ok(declaration)),
            Ok(None) => Ok(Err(Error::UnsupportedDeclaration(format!(
                "{} is neither registered nor a declaration file",
                path.display()
            )))),
            Err(e @ Error::UnsupportedDeclaration(_)) => Ok(Err(e)),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for DeclarationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut identities: Vec<&String> = self.constructors.keys().collect();
        identities.sort();

        f.debug_struct("DeclarationRegistry")
            .field("identities", &identities)
            .field("base_dir", &self.base_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::TypeSpec;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct ProductCategory;

    impl HasColumnDeclarations for ProductCategory {
        fn table_name(&self) -> String {
            "product_category".to_string()
        }

        fn column_types(&self) -> ColumnTypes {
            let mut columns = ColumnTypes::new();
            columns.insert("id".to_string(), TypeSpec::from("pk"));
            columns.insert("name".to_string(), TypeSpec::from("string"));
            columns
        }
    }

    fn registry(base_dir: &Path) -> DeclarationRegistry {
        DeclarationRegistry::new(&ModelsConfig {
            base_dir: base_dir.to_path_buf(),
        })
    }

    #[test]
    fn test_resolve_directory() {
        let registry = registry(Path::new("/srv/app"));

        assert_eq!(
            registry.resolve_directory(&SourceConfig::from_label("common\\models\\")),
            PathBuf::from("/srv/app/common/models")
        );
        assert_eq!(
            registry.resolve_directory(&SourceConfig::with_path("x", "decl")),
            PathBuf::from("/srv/app/decl")
        );
        assert_eq!(
            registry.resolve_directory(&SourceConfig::with_path("x", "/etc/decl")),
            PathBuf::from("/etc/decl")
        );
    }

    #[test]
    fn test_discover_missing_directory_is_config_error() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());

        let err = registry
            .discover(&SourceConfig::from_label("nowhere::models"))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_discover_mixes_registered_and_file_declarations() {
        let dir = tempdir().unwrap();
        let models = dir.path().join("app").join("models");
        fs::create_dir_all(models.join("nested")).unwrap();
        fs::write(models.join("product_category.rs"), "// declared in code").unwrap();
        fs::write(models.join("Post.toml"), "[columns]\nid = \"pk\"\n").unwrap();
        fs::write(models.join("notes.txt"), "not a model").unwrap();
        fs::write(models.join("nested").join("Hidden.toml"), "[columns]\nid = \"pk\"\n").unwrap();

        let mut registry = registry(dir.path());
        registry.register::<ProductCategory>("app::models", "ProductCategory");
        assert!(registry.is_registered("app::models::product_category"));

        let discovered = registry.discover(&SourceConfig::from_label("app::models")).unwrap();
        let identities: Vec<&str> = discovered.iter().map(|d| d.identity.as_str()).collect();
        assert_eq!(
            identities,
            vec!["app::models::post", "app::models::notes", "app::models::product_category"]
        );

        let post = discovered[0].declaration.as_ref().unwrap();
        assert_eq!(post.table_name, "post");

        assert!(matches!(
            discovered[1].declaration,
            Err(Error::UnsupportedDeclaration(_))
        ));

        let category = discovered[2].declaration.as_ref().unwrap();
        assert_eq!(category.table_name, "product_category");
        assert_eq!(category.columns.len(), 2);
    }

    #[test]
    fn test_discover_honours_pattern() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.toml"), "[columns]\nid = \"pk\"\n").unwrap();
        fs::write(dir.path().join("b.json"), r#"{"columns": {"id": "pk"}}"#).unwrap();

        let registry = registry(dir.path());
        let source = SourceConfig {
            label: "app".to_string(),
            path: Some(dir.path().to_path_buf()),
            pattern: "*.toml".to_string(),
        };

        let discovered = registry.discover(&source).unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].identity, "app::a");
    }
}

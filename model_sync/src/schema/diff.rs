//! Declaration-to-table difference calculator
//!
//! This module compares one model declaration with the live snapshot of its
//! table and works out the DDL actions that converge the table.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::models::declaration::ModelDeclaration;
use crate::schema::types::{ColumnTypes, SyncAction, TableSnapshot};

/// Changes needed to bring one table in line with its declaration
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub table_name: String,
    pub full_name: String,
    /// Full column set when the table does not exist yet
    pub table_to_create: Option<ColumnTypes>,
    pub columns_to_add: ColumnTypes,
    pub columns_to_remove: Vec<String>,
    /// Removed column to the foreign keys dropped right before it
    pub foreign_keys_to_drop: IndexMap<String, Vec<String>>,
    /// Meta-operations whose column is added in this run
    pub deferred_operations: Vec<SyncAction>,
    pub skipped_operations: Vec<SkippedOperation>,
}

/// A meta-operation that was not turned into an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedOperation {
    pub table: String,
    pub kind: String,
    pub position: usize,
    pub reason: String,
}

impl SyncPlan {
    /// Generate the plan for `declaration` against the live table, if any
    pub fn generate(
        declaration: &ModelDeclaration,
        snapshot: Option<&TableSnapshot>,
        config: &Config,
    ) -> Self {
        let table_name = declaration.table_name.clone();
        let full_name = snapshot
            .map(|s| s.full_name.clone())
            .unwrap_or_else(|| table_name.clone());

        let mut plan = Self {
            table_name,
            full_name,
            table_to_create: None,
            columns_to_add: ColumnTypes::new(),
            columns_to_remove: Vec::new(),
            foreign_keys_to_drop: IndexMap::new(),
            deferred_operations: Vec::new(),
            skipped_operations: Vec::new(),
        };

        match snapshot {
            None => {
                plan.table_to_create = Some(declaration.columns.clone());
            }
            Some(snapshot) => {
                plan.columns_to_add = declaration
                    .columns
                    .iter()
                    .filter(|(name, _)| !snapshot.has_column(name))
                    .map(|(name, spec)| (name.clone(), spec.clone()))
                    .collect();

                if config.sync.allow_column_removal {
                    plan.columns_to_remove = snapshot
                        .columns
                        .iter()
                        .filter(|name| !declaration.columns.contains_key(name.as_str()))
                        .cloned()
                        .collect();

                    // A key spanning several removed columns goes before the first of them
                    let mut dropped = HashSet::new();
                    for column in &plan.columns_to_remove {
                        let keys: Vec<String> = snapshot
                            .foreign_keys_referencing(column)
                            .into_iter()
                            .filter(|name| dropped.insert(name.to_string()))
                            .map(str::to_string)
                            .collect();

                        if !keys.is_empty() {
                            plan.foreign_keys_to_drop.insert(column.clone(), keys);
                        }
                    }
                }
            }
        }

        plan.resolve_operations(declaration, snapshot, config);
        plan
    }

    fn resolve_operations(
        &mut self,
        declaration: &ModelDeclaration,
        snapshot: Option<&TableSnapshot>,
        config: &Config,
    ) {
        let added: HashSet<&str> = self.added_columns().collect();
        let dropped: HashSet<&str> = self
            .foreign_keys_to_drop
            .values()
            .flatten()
            .map(String::as_str)
            .collect();
        let mut existing: HashSet<String> = snapshot
            .map(|s| {
                s.foreign_keys
                    .keys()
                    .filter(|name| !dropped.contains(name.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut positions: HashMap<&'static str, usize> = HashMap::new();
        let mut deferred = Vec::new();
        let mut skipped = Vec::new();

        for operation in &declaration.operations {
            let kind = operation.kind();
            let counter = positions.entry(kind).or_insert(0);
            let position = operation.group().unwrap_or(*counter);
            *counter += 1;

            let action = match operation.resolve(position, &config.naming) {
                Ok(action) => action,
                Err(argument) => {
                    skipped.push(SkippedOperation {
                        table: self.table_name.clone(),
                        kind: kind.to_string(),
                        position,
                        reason: format!("missing argument '{}'", argument),
                    });
                    continue;
                }
            };

            // Only columns introduced by this run get their constraints
            if !action.column().is_some_and(|column| added.contains(column)) {
                continue;
            }

            if let SyncAction::AddForeignKey { name, .. } = &action {
                if !existing.insert(name.clone()) {
                    skipped.push(SkippedOperation {
                        table: self.table_name.clone(),
                        kind: kind.to_string(),
                        position,
                        reason: format!("foreign key '{}' already exists", name),
                    });
                    continue;
                }
            }

            deferred.push(action);
        }

        self.deferred_operations = deferred;
        self.skipped_operations = skipped;
    }

    /// Columns introduced by this plan, in declaration order
    pub fn added_columns(&self) -> impl Iterator<Item = &str> {
        self.table_to_create
            .as_ref()
            .unwrap_or(&self.columns_to_add)
            .keys()
            .map(String::as_str)
    }

    pub fn is_create(&self) -> bool {
        self.table_to_create.is_some()
    }

    /// Check if the plan is empty (no changes needed)
    pub fn is_empty(&self) -> bool {
        self.table_to_create.is_none()
            && self.columns_to_add.is_empty()
            && self.columns_to_remove.is_empty()
            && self.deferred_operations.is_empty()
    }

    /// Actions in execution order: table or column changes first, then the
    /// deferred meta-operations
    pub fn actions(&self) -> Vec<SyncAction> {
        let mut actions = Vec::new();

        if let Some(columns) = &self.table_to_create {
            actions.push(SyncAction::CreateTable {
                table: self.table_name.clone(),
                columns: columns.clone(),
            });
        }

        for (column, type_spec) in &self.columns_to_add {
            actions.push(SyncAction::AddColumn {
                table: self.table_name.clone(),
                column: column.clone(),
                type_spec: type_spec.clone(),
            });
        }

        for column in &self.columns_to_remove {
            if let Some(keys) = self.foreign_keys_to_drop.get(column) {
                for name in keys {
                    actions.push(SyncAction::DropForeignKey {
                        name: name.clone(),
                        table: self.table_name.clone(),
                    });
                }
            }

            actions.push(SyncAction::DropColumn {
                table: self.table_name.clone(),
                column: column.clone(),
            });
        }

        actions.extend(self.deferred_operations.iter().cloned());
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{Operation, TypeSpec};
    use pretty_assertions::assert_eq;

    fn test_config() -> Config {
        toml::from_str(
            r#"
            [database]
            driver = "postgres"
            url = "postgres://localhost/app"
            "#,
        )
        .unwrap()
    }

    fn declaration(
        table: &str,
        columns: &[(&str, &str)],
        operations: Vec<Operation>,
    ) -> ModelDeclaration {
        ModelDeclaration {
            identity: format!("app::models::{}", table),
            table_name: table.to_string(),
            columns: columns
                .iter()
                .map(|(name, spec)| (name.to_string(), TypeSpec::from(*spec)))
                .collect(),
            operations,
        }
    }

    #[test]
    fn test_missing_table_is_created_with_all_columns() {
        let decl = declaration("posts", &[("id", "pk"), ("title", "string")], vec![]);
        let plan = SyncPlan::generate(&decl, None, &test_config());

        assert!(plan.is_create());
        assert_eq!(
            plan.actions(),
            vec![SyncAction::CreateTable {
                table: "posts".to_string(),
                columns: decl.columns.clone(),
            }]
        );
    }

    #[test]
    fn test_existing_table_adds_and_removes_columns() {
        let decl = declaration("posts", &[("b", "string"), ("c", "integer")], vec![]);
        let snapshot = TableSnapshot::new("posts").with_columns(["a", "b"]);
        let plan = SyncPlan::generate(&decl, Some(&snapshot), &test_config());

        assert!(!plan.is_create());
        assert_eq!(
            plan.actions(),
            vec![
                SyncAction::AddColumn {
                    table: "posts".to_string(),
                    column: "c".to_string(),
                    type_spec: TypeSpec::from("integer"),
                },
                SyncAction::DropColumn {
                    table: "posts".to_string(),
                    column: "a".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_foreign_keys_drop_before_their_column() {
        let decl = declaration("posts", &[("id", "pk")], vec![]);
        let mut snapshot =
            TableSnapshot::new("posts").with_columns(["id", "author_id", "editor_id"]);
        snapshot.add_foreign_key_column("fk_people", "author_id");
        snapshot.add_foreign_key_column("fk_people", "editor_id");
        snapshot.add_foreign_key_column("fk_editor", "editor_id");

        let actions: Vec<String> = SyncPlan::generate(&decl, Some(&snapshot), &test_config())
            .actions()
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(
            actions,
            vec![
                "DropForeignKey(fk_people, posts)",
                "DropColumn(posts, author_id)",
                "DropForeignKey(fk_editor, posts)",
                "DropColumn(posts, editor_id)",
            ]
        );
    }

    #[test]
    fn test_column_removal_can_be_disabled() {
        let mut config = test_config();
        config.sync.allow_column_removal = false;

        let decl = declaration("posts", &[("id", "pk")], vec![]);
        let snapshot = TableSnapshot::new("posts").with_columns(["id", "legacy"]);
        let plan = SyncPlan::generate(&decl, Some(&snapshot), &config);

        assert!(plan.is_empty());
    }

    #[test]
    fn test_operations_only_apply_to_added_columns() {
        let decl = declaration(
            "posts",
            &[("id", "pk"), ("author_id", "integer"), ("category_id", "integer")],
            vec![
                Operation::create_index("posts", "author_id"),
                Operation::add_foreign_key("posts", "author_id", "users", "id")
                    .with_rules(Some("CASCADE"), None),
                Operation::create_index("posts", "category_id"),
                Operation::add_foreign_key("posts", "ghost_id", "ghosts", "id"),
            ],
        );
        let snapshot = TableSnapshot::new("posts").with_columns(["id", "category_id"]);
        let plan = SyncPlan::generate(&decl, Some(&snapshot), &test_config());

        assert_eq!(
            plan.deferred_operations,
            vec![
                SyncAction::CreateIndex {
                    name: "posts_author_id_idx_0".to_string(),
                    table: "posts".to_string(),
                    column: "author_id".to_string(),
                },
                SyncAction::AddForeignKey {
                    name: "posts_author_id_fk_0".to_string(),
                    table: "posts".to_string(),
                    column: "author_id".to_string(),
                    ref_table: "users".to_string(),
                    ref_column: "id".to_string(),
                    on_delete: Some("CASCADE".to_string()),
                    on_update: None,
                },
            ]
        );
        assert!(plan.skipped_operations.is_empty());
    }

    #[test]
    fn test_created_table_runs_all_operations() {
        let decl = declaration(
            "posts",
            &[("id", "pk"), ("author_id", "integer")],
            vec![Operation::create_index("posts", "author_id")],
        );
        let plan = SyncPlan::generate(&decl, None, &test_config());
        let actions = plan.actions();

        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], SyncAction::CreateTable { .. }));
        assert!(matches!(actions[1], SyncAction::CreateIndex { .. }));
    }

    #[test]
    fn test_existing_foreign_key_is_skipped() {
        let decl = declaration(
            "posts",
            &[("id", "pk"), ("author_id", "integer")],
            vec![Operation::add_foreign_key("posts", "author_id", "users", "id")],
        );
        let mut snapshot = TableSnapshot::new("posts").with_columns(["id"]);
        snapshot.add_foreign_key_column("posts_author_id_fk_0", "id");

        let plan = SyncPlan::generate(&decl, Some(&snapshot), &test_config());

        assert!(plan.deferred_operations.is_empty());
        assert_eq!(
            plan.skipped_operations,
            vec![SkippedOperation {
                table: "posts".to_string(),
                kind: "addForeignKey".to_string(),
                position: 0,
                reason: "foreign key 'posts_author_id_fk_0' already exists".to_string(),
            }]
        );
    }

    #[test]
    fn test_operation_with_missing_argument_is_skipped() {
        let decl = declaration(
            "posts",
            &[("id", "pk"), ("author_id", "integer")],
            vec![Operation::AddForeignKey {
                name: None,
                table: Some("posts".to_string()),
                column: Some("author_id".to_string()),
                ref_table: Some("users".to_string()),
                ref_column: None,
                on_delete: None,
                on_update: None,
                group: None,
            }],
        );
        let plan = SyncPlan::generate(&decl, None, &test_config());

        assert_eq!(plan.actions().len(), 1);
        assert_eq!(plan.skipped_operations[0].reason, "missing argument 'ref_column'");
    }

    #[test]
    fn test_grouped_operations_are_named_by_group() {
        let decl = declaration(
            "posts",
            &[("id", "pk"), ("author_id", "integer"), ("editor_id", "integer")],
            vec![
                Operation::create_index("posts", "author_id").in_group(0),
                Operation::add_foreign_key("posts", "editor_id", "users", "id").in_group(1),
            ],
        );
        let plan = SyncPlan::generate(&decl, None, &test_config());

        let names: Vec<&str> = plan
            .deferred_operations
            .iter()
            .filter_map(|action| match action {
                SyncAction::CreateIndex { name, .. } | SyncAction::AddForeignKey { name, .. } => {
                    Some(name.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["posts_author_id_idx_0", "posts_editor_id_fk_1"]);
    }

    #[test]
    fn test_unchanged_table_is_empty() {
        let decl = declaration(
            "posts",
            &[("id", "pk"), ("author_id", "integer")],
            vec![Operation::create_index("posts", "author_id")],
        );
        let snapshot = TableSnapshot::new("posts").with_columns(["id", "author_id"]);
        let plan = SyncPlan::generate(&decl, Some(&snapshot), &test_config());

        assert!(plan.is_empty());
        assert!(plan.actions().is_empty());
    }

    #[test]
    fn test_full_name_comes_from_snapshot() {
        let decl = declaration("posts", &[("id", "pk")], vec![]);

        let plan = SyncPlan::generate(&decl, None, &test_config());
        assert_eq!(plan.full_name, "posts");

        let snapshot = TableSnapshot::new("audit.posts").with_columns(["id"]);
        let plan = SyncPlan::generate(&decl, Some(&snapshot), &test_config());
        assert_eq!(plan.full_name, "audit.posts");
    }
}

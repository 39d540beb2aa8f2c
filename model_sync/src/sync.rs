//! Schema synchronization
//!
//! The synchronizer walks the configured sources, loads every declaration it
//! finds, compares it with the live table and applies the resulting actions
//! one by one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Config, MissingSourcePolicy, SourceConfig};
use crate::db::executor::SyncTarget;
use crate::error::{Error, Result};
use crate::models::declaration::ModelDeclaration;
use crate::models::registry::DeclarationRegistry;
use crate::schema::diff::{SkippedOperation, SyncPlan};
use crate::schema::types::SyncAction;

/// A source whose directory could not be scanned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub label: String,
    pub reason: String,
}

/// A discovered file that did not yield a usable declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDeclaration {
    pub identity: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one synchronization run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    /// Whether any action ran (or would have run, for a dry run)
    pub changed: bool,
    pub actions: Vec<SyncAction>,
    pub tables_created: Vec<String>,
    /// Operator-facing lines, in the order they were emitted
    pub messages: Vec<String>,
    pub skipped_sources: Vec<SkippedSource>,
    pub skipped_declarations: Vec<SkippedDeclaration>,
    pub skipped_operations: Vec<SkippedOperation>,
}

impl SyncReport {
    fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            changed: false,
            actions: Vec::new(),
            tables_created: Vec::new(),
            messages: Vec::new(),
            skipped_sources: Vec::new(),
            skipped_declarations: Vec::new(),
            skipped_operations: Vec::new(),
        }
    }

    fn say(&mut self, message: String) {
        tracing::info!("{}", message);
        self.messages.push(message);
    }

    fn record(&mut self, action: SyncAction) {
        let summary = action.summary();
        if self.dry_run {
            self.say(format!("[dry run] {}", summary));
        } else {
            self.say(summary);
        }

        if let SyncAction::CreateTable { table, .. } = &action {
            self.tables_created.push(table.clone());
        }
        self.actions.push(action);
        self.changed = true;
    }

    /// Check whether a message was emitted during the run
    pub fn has_message(&self, message: &str) -> bool {
        self.messages.iter().any(|m| m == message)
    }
}

/// Drives one run over a set of declaration sources
pub struct SchemaSynchronizer<'a, T: SyncTarget + ?Sized> {
    target: &'a T,
    registry: &'a DeclarationRegistry,
    config: &'a Config,
}

impl<'a, T: SyncTarget + ?Sized> SchemaSynchronizer<'a, T> {
    /// Create a new synchronizer
    pub fn new(target: &'a T, registry: &'a DeclarationRegistry, config: &'a Config) -> Self {
        Self {
            target,
            registry,
            config,
        }
    }

    /// Synchronize every declaration found in `sources`, in order.
    ///
    /// Missing directories and unsupported declarations are reported and
    /// skipped. The first failing statement stops the run; statements that
    /// already ran stay applied.
    pub async fn synchronize(&self, sources: &[SourceConfig]) -> Result<SyncReport> {
        let mut report = SyncReport::new(self.config.sync.dry_run);
        let span = tracing::info_span!(
            "sync_run",
            run_id = %report.run_id,
            dry_run = report.dry_run
        );

        self.run(sources, &mut report).instrument(span).await?;

        report.finished_at = Some(Utc::now());
        Ok(report)
    }

    async fn run(&self, sources: &[SourceConfig], report: &mut SyncReport) -> Result<()> {
        for source in sources {
            let discovered = match self.registry.discover(source) {
                Ok(discovered) => discovered,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(source = %source.label, error = %e, "Skipping source");
                    report.say(format!("Source '{}' skipped: {}", source.label, e));
                    report.skipped_sources.push(SkippedSource {
                        label: source.label.clone(),
                        reason: e.to_string(),
                    });

                    match self.config.sync.on_missing_source {
                        MissingSourcePolicy::Skip => continue,
                        MissingSourcePolicy::Abort => break,
                    }
                }
                Err(e) => return Err(e),
            };

            tracing::debug!(
                source = %source.label,
                files = discovered.len(),
                "Scanned source"
            );

            for item in discovered {
                match item.declaration {
                    Ok(declaration) => self.sync_declaration(&declaration, report).await?,
                    Err(e) => {
                        tracing::debug!(
                            identity = %item.identity,
                            path = %item.path.display(),
                            error = %e,
                            "Skipping declaration"
                        );
                        report.skipped_declarations.push(SkippedDeclaration {
                            identity: item.identity,
                            path: item.path,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        if !report.changed {
            report.say("No changes found.".to_string());
        }

        Ok(())
    }

    async fn sync_declaration(
        &self,
        declaration: &ModelDeclaration,
        report: &mut SyncReport,
    ) -> Result<()> {
        let snapshot = self.target.snapshot(&declaration.table_name).await?;
        let plan = SyncPlan::generate(declaration, snapshot.as_ref(), self.config);

        tracing::debug!(
            identity = %declaration.identity,
            table = %plan.full_name,
            create = plan.is_create(),
            add = plan.columns_to_add.len(),
            remove = plan.columns_to_remove.len(),
            "Planned table"
        );

        for skipped in &plan.skipped_operations {
            report.say(format!(
                "Skipping {} #{} on '{}': {}.",
                skipped.kind, skipped.position, skipped.table, skipped.reason
            ));
        }
        report
            .skipped_operations
            .extend(plan.skipped_operations.iter().cloned());

        for action in plan.actions() {
            if !self.config.sync.dry_run {
                self.target
                    .apply(&action)
                    .await
                    .map_err(|e| Error::StatementExecution {
                        action: action.to_string(),
                        source: Box::new(e),
                    })?;
            }

            report.record(action);
        }

        Ok(())
    }
}

//! Schema module for model_sync
//!
//! This module handles table introspection, declaration diffing and DDL generation.

pub mod analyzer;
pub mod diff;
pub mod generator;
pub mod types;

// Re-export key types
pub use analyzer::SchemaAnalyzer;
pub use diff::{SkippedOperation, SyncPlan};
pub use generator::MigrationGenerator;
pub use types::{ColumnTypes, Operation, SyncAction, TableSnapshot, TypeSpec};

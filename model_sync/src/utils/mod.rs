//! Utilities for model_sync
//!
//! This module provides utility functions used across the library.

pub mod logging;
pub mod naming;

// Re-export key utility functions
pub use naming::{
    declaration_identity, default_table_name, format_name, format_sql_identifier,
    get_foreign_key_name, get_index_name,
};

//! Models module for model_sync
//!
//! This module handles declaration registration and discovery.

pub mod declaration;
pub mod registry;

// Re-export key types
pub use declaration::ModelDeclaration;
pub use registry::{DeclarationRegistry, DiscoveredDeclaration, HasColumnDeclarations};

//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `config` - Effective configuration and override path
//! - `core` - Shared utilities (load_config, narrative_client)
//! - `extract` - Statement total extraction
//! - `prompts` - Prompt library management commands
//! - `reconcile` - Reconcile, investigate, and run
//! - `report` - Report show and export

pub mod config;
pub mod core;
pub mod extract;
pub mod prompts;
pub mod reconcile;
pub mod report;

// Re-export command functions for main.rs
pub use config::*;
pub use core::*;
pub use extract::*;
pub use prompts::*;
pub use reconcile::*;
pub use report::*;

//! Statement extraction command

use std::path::Path;

use anyhow::{bail, Result};
use aprecon_core::{ReconConfig, StatementDocument};

/// Print the total a statement document yields, and which tier found it
pub fn cmd_extract(config: &ReconConfig, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("Statement file not found: {}", file.display());
    }

    let document = StatementDocument::open(file);
    let total = document.extract_total(config.reconciliation.fallback_statement_total);

    println!("File: {}", file.display());
    if let Some(hash) = &document.sha256 {
        println!("SHA-256: {}", hash);
    }
    println!("Total: {}", total.amount);
    println!("Found by: {}", total.provenance);

    let preview = document.preview();
    if !preview.is_empty() {
        println!();
        println!("--- Preview ---");
        println!("{}", preview);
    }

    Ok(())
}

//! Report inspection and export commands

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use aprecon_core::ReconciliationReport;

use crate::cli::ExportFormat;

fn load_report(path: &Path) -> Result<ReconciliationReport> {
    ReconciliationReport::load(path).with_context(|| {
        format!(
            "No report at {} (run `aprecon reconcile` first)",
            path.display()
        )
    })
}

pub fn cmd_report_show(path: &Path) -> Result<()> {
    let report = load_report(path)?;

    println!(
        "📊 AP Reconciliation: account {} ({} → {})",
        report.account_code, report.prior_period, report.current_period
    );
    println!("   {}", report.note);
    println!();

    println!("{:<30} {:>20}  {}", "ITEM", "AMOUNT", "CELL");
    println!("{}", "-".repeat(60));
    for row in &report.summary {
        let cell = report.cell_ref(&row.item).unwrap_or_default();
        if row.item.eq_ignore_ascii_case("Reason") {
            println!("{:<30} {:>20}  {}", row.item, "", cell);
            for line in row.value.to_string().lines() {
                println!("   {}", line);
            }
        } else {
            println!("{:<30} {:>20}  {}", row.item, row.value.to_string(), cell);
        }
    }

    println!();
    println!("Detail:");
    for row in &report.detail.rows {
        println!("   {}", row);
    }
    if let Some(ref attachment) = report.detail.attachment {
        println!("   Document: {}", attachment.path);
        if let Some(ref hash) = attachment.sha256 {
            println!("   SHA-256: {}", hash);
        }
    }

    Ok(())
}

pub fn cmd_report_export(path: &Path, format: ExportFormat, output: Option<&Path>) -> Result<()> {
    let report = load_report(path)?;

    let content = match format {
        ExportFormat::Csv => report.export_csv()?,
        ExportFormat::Json => report.to_json()?,
    };

    match output {
        Some(out) => {
            fs::write(out, &content)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("✅ Exported report to {}", out.display());
        }
        None => print!("{}", content),
    }

    Ok(())
}

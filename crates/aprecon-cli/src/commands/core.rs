//! Shared command utilities
//!
//! This module contains:
//! - `load_config` - Resolve configuration and apply CLI overrides
//! - `narrative_client` - Narrative backend from environment variables

use std::path::Path;

use anyhow::{Context, Result};
use aprecon_core::{NarrativeBackend, NarrativeClient, ReconConfig};

use crate::cli::ConfigOverrides;

/// Load configuration, then apply per-run flag overrides
pub fn load_config(explicit: Option<&Path>, overrides: &ConfigOverrides) -> Result<ReconConfig> {
    let mut config = ReconConfig::load(explicit).context("Failed to load configuration")?;
    apply_overrides(&mut config, overrides);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn apply_overrides(config: &mut ReconConfig, overrides: &ConfigOverrides) {
    let ConfigOverrides {
        ledger,
        statement_dir,
        statement_pattern,
        emails,
        report,
        account,
        prior,
        current,
        threshold,
    } = overrides.clone();

    if let Some(ledger) = ledger {
        config.paths.ledger = ledger;
    }
    if let Some(dir) = statement_dir {
        config.paths.statement_dir = dir;
    }
    if let Some(pattern) = statement_pattern {
        config.paths.statement_pattern = pattern;
    }
    if let Some(emails) = emails {
        config.paths.emails = emails;
    }
    if let Some(report) = report {
        config.paths.report = report;
    }
    if let Some(account) = account {
        config.reconciliation.account_code = account;
    }
    if let Some(prior) = prior {
        config.reconciliation.prior_period = prior;
    }
    if let Some(current) = current {
        config.reconciliation.current_period = current;
    }
    if let Some(threshold) = threshold {
        config.investigation.threshold_percent = threshold;
    }
}

/// Narrative backend configured through the environment, if any
pub fn narrative_client() -> Option<NarrativeClient> {
    let client = NarrativeClient::from_env();
    match &client {
        Some(c) => tracing::info!(
            backend = c.backend_name(),
            host = c.host(),
            model = c.model(),
            "Narrative backend configured"
        ),
        None => tracing::warn!("No narrative backend configured (set AI_BACKEND)"),
    }
    client
}

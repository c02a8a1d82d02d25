//! Reconciliation configuration
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a three-layer resolution:
//! 1. An explicit path (`--config`)
//! 2. Override in data dir (~/.local/share/aprecon/config/recon.toml)
//! 3. Embedded defaults (compiled into binary)
//!
//! Override files are merged over the embedded defaults, so they only need
//! the keys they change.

use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::YearMonth;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/recon.toml");

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub ledger: PathBuf,
    pub statement_dir: PathBuf,
    pub statement_pattern: String,
    pub emails: PathBuf,
    pub report: PathBuf,
}

/// What is being reconciled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    pub account_code: String,
    pub prior_period: YearMonth,
    pub current_period: YearMonth,
    pub fallback_statement_total: Decimal,
    pub fallback_invoice_total: Decimal,
}

/// Threshold and narrative settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationConfig {
    pub threshold_percent: Decimal,
    pub email_char_budget: usize,
    pub investigate_undefined: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Full configuration, passed explicitly to each component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconConfig {
    pub paths: PathsConfig,
    pub reconciliation: ReconciliationConfig,
    pub investigation: InvestigationConfig,
}

impl ReconConfig {
    /// Embedded defaults only
    pub fn embedded() -> Result<Self> {
        Ok(toml::from_str(DEFAULT_CONFIG)?)
    }

    /// Load configuration (explicit path, then data dir override, then defaults)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Self::from_override_file(path)
            }
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_override_file(&path),
                _ => Self::embedded(),
            },
        }
    }

    /// Merge an override file over the embedded defaults
    pub fn from_override_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading config override");
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_override_str(&content)
    }

    /// Merge override TOML text over the embedded defaults
    pub fn from_override_str(content: &str) -> Result<Self> {
        let mut base: toml::Value = toml::from_str(DEFAULT_CONFIG)?;
        let overlay: toml::Value = toml::from_str(content)?;
        merge_toml(&mut base, overlay);

        let config = base.try_into::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.reconciliation.account_code.trim().is_empty() {
            return Err(Error::Config("account_code must not be empty".into()));
        }
        if self.investigation.threshold_percent <= Decimal::ZERO {
            return Err(Error::Config(format!(
                "threshold_percent must be positive, got {}",
                self.investigation.threshold_percent
            )));
        }
        if self.reconciliation.current_period != self.reconciliation.prior_period.succ() {
            warn!(
                prior = %self.reconciliation.prior_period,
                current = %self.reconciliation.current_period,
                "Reconciliation periods are not consecutive months"
            );
        }
        Ok(())
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("aprecon").join("config").join("recon.toml"))
}

/// Recursively merge `overlay` tables into `base`
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

//! Configuration commands

use anyhow::{Context, Result};
use aprecon_core::config::default_config_path;
use aprecon_core::ReconConfig;

/// Print the effective configuration (after overrides) as TOML
pub fn cmd_config_show(config: &ReconConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

/// Show where a config override file is picked up from
pub fn cmd_config_path() -> Result<()> {
    match default_config_path() {
        Some(path) => {
            println!("{}", path.display());
            if !path.exists() {
                eprintln!();
                eprintln!("Note: No override file yet; built-in defaults are in use.");
            }
        }
        None => {
            eprintln!("Could not determine config directory.");
            eprintln!("The data directory is not available on this system.");
        }
    }
    Ok(())
}

//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use tb_core::config::{self, ClientConfig};

fn resolve(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

/// Print the config file path
pub fn config_path(config_path: Option<&Path>) -> Result<()> {
    println!("{}", resolve(config_path).display());
    Ok(())
}

/// Show the effective configuration
///
/// Prints defaults merged with the file, or plain defaults when no file
/// exists yet.
pub fn config_show(config_path: Option<&Path>) -> Result<()> {
    let path = resolve(config_path);

    if path.exists() {
        print_info(&format!("Configuration file: {}", path.display()));
    } else {
        print_warning(&format!(
            "No configuration file found at {}; showing defaults",
            path.display()
        ));
        print_info("Run 'tb-notify config init' to create one");
    }

    let config = ClientConfig::load_or_default(Some(&path))
        .with_context(|| format!("Failed to load config file: {}", path.display()))?;

    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Write the default configuration
pub fn config_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = resolve(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {}", path.display()));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&path, &ClientConfig::default())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    print_success(&format!("Created configuration file: {}", path.display()));
    Ok(())
}

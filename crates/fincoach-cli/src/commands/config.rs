//! Configuration inspection commands

use anyhow::{Context, Result};
use fincoach_core::config::default_config_path;
use fincoach_core::EngineConfig;

pub fn cmd_config_show(config: &EngineConfig) -> Result<String> {
    let rendered = config.to_toml().context("Failed to render config")?;
    println!("{}", rendered);
    Ok(rendered)
}

pub fn cmd_config_path() -> Result<()> {
    match default_config_path() {
        Some(path) => {
            let note = if path.exists() {
                "in use"
            } else {
                "not present, built-in defaults apply"
            };
            println!("{} ({})", path.display(), note);
        }
        None => println!("No data directory on this platform; built-in defaults apply"),
    }
    Ok(())
}

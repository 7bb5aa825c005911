//! `brandloom init` — Write a starter config file.

use brandloom_config::AppConfig;
use std::path::Path;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new("brandloom.toml");

    if path.exists() {
        println!("  Config file already exists: {}", path.display());
        return Ok(());
    }

    std::fs::write(path, AppConfig::default_toml())?;
    println!("Created {}", path.display());
    println!("Set BRANDLOOM_API_KEY (or add model.api_key) before `brandloom serve`.");
    Ok(())
}

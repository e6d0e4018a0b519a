use super::config::{default_config_path, WardenConfig};
use std::path::PathBuf;
use warden::snapshot::Manifest;

/// Show persisted engine state.
///
/// Reads the JSON files in the data directory directly, so it works
/// whether or not the engine is running: trust registry size, current
/// manifest summary, and whether an emergency manifest exists.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = WardenConfig::load(&config_path)?;
    let data_dir = &config.storage.data_dir;

    println!("Warden status (data: {})", data_dir.display());
    println!();

    let trust_path = data_dir.join("trust.json");
    match std::fs::read_to_string(&trust_path) {
        Ok(data) => {
            let parsed: serde_json::Value = serde_json::from_str(&data)?;
            let count = parsed["entries"].as_array().map(|a| a.len()).unwrap_or(0);
            println!("Trust registry: {} principal(s)", count);
        }
        Err(_) => println!("Trust registry: not initialized"),
    }

    match Manifest::load(&data_dir.join("current.json")) {
        Ok(manifest) => {
            println!(
                "Current manifest: '{}': {} roles, {} categories, {} channels",
                manifest.metadata.community_name,
                manifest.roles.len(),
                manifest.categories.len(),
                manifest.channels.len()
            );
        }
        Err(_) => println!("Current manifest: none"),
    }

    if data_dir.join("emergency.json").exists() {
        println!("Emergency manifest: present (a restore has run)");
    } else {
        println!("Emergency manifest: none");
    }

    Ok(())
}

use super::config::{default_config_path, WardenConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use warden::engine::WardenOptions;
use warden::platform::types::{ChannelId, PrincipalId};

/// Run the protection engine.
///
/// Loads the operator configuration, initializes logging, and prepares
/// the engine options. Configuration is taken from `--config` if
/// provided, otherwise from the default location.
///
/// Log filtering honors `WARDEN_LOG` when set, otherwise the level from
/// the config file; category targets (`warden::integrity`,
/// `warden::raid`, ...) can be tuned individually. Output goes to the
/// file named in `[logging] file` when set, otherwise to stderr.
pub async fn execute(
    config_path: Option<String>,
    data_dir: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        return Err(format!(
            "No config file at '{}'. Create one with at least:\n\n[community]\nowner = <principal id>\n",
            config_path.display()
        )
        .into());
    }
    let config = WardenConfig::load(&config_path)?;

    let filter = std::env::var("WARDEN_LOG").unwrap_or_else(|_| config.logging.level.clone());
    let subscriber = tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter));
    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {e}", path.display()))?;
            subscriber
                .with_writer(std::sync::Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => subscriber.init(),
    }

    let data_dir = data_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| config.storage.data_dir.clone());
    std::fs::create_dir_all(&data_dir)?;

    let mut options = WardenOptions::new(PrincipalId(config.community.owner), &data_dir);
    options.sentinel_target = config.community.sentinel_target.map(ChannelId);

    println!("Config: {}", config_path.display());
    println!("Data:   {}", data_dir.display());
    println!("Owner:  {}", options.owner);

    // TODO: wire the gateway connector. `Warden::new(client, options)`
    // plus `spawn()` is the whole startup once a `PlatformClient`
    // implementation for the production gateway lands; events from the
    // connector feed the returned ingress sender.
    Err("no platform connector is built into this binary yet".into())
}

#[cfg(test)]
mod tests {
    use super::super::config::{CommunityConfig, LoggingConfig, StorageConfig};
    use super::*;
    use tempfile::tempdir;

    // The only test in this binary that installs the global subscriber.
    #[tokio::test]
    async fn test_run_opens_configured_log_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let log_path = dir.path().join("warden.log");

        let config = WardenConfig {
            community: CommunityConfig {
                owner: 1,
                sentinel_target: None,
            },
            storage: StorageConfig {
                data_dir: dir.path().join("data"),
            },
            logging: LoggingConfig {
                level: "info".into(),
                file: Some(log_path.clone()),
            },
        };
        config.save(&config_path).unwrap();

        let result = execute(Some(config_path.to_string_lossy().into_owned()), None).await;

        // Startup stops at the missing connector, after logging was wired.
        assert!(result.is_err());
        assert!(log_path.exists());
    }
}

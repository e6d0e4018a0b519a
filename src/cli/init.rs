use super::config::{default_config_path, WardenConfig};
use std::path::PathBuf;

/// Write a starter configuration file.
pub fn execute(owner: u64, config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    if config_path.exists() {
        return Err(format!(
            "Config file '{}' already exists, refusing to overwrite",
            config_path.display()
        )
        .into());
    }

    WardenConfig::create_default(&config_path, owner)?;
    println!("Wrote {}", config_path.display());
    println!("Edit it to set the sentinel target and logging, then run 'warden run'.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_writes_config_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path_arg = Some(path.to_string_lossy().into_owned());

        execute(42, path_arg.clone()).unwrap();
        let config = WardenConfig::load(&path).unwrap();
        assert_eq!(config.community.owner, 42);

        // A second init must not clobber the existing file.
        assert!(execute(7, path_arg).is_err());
        assert_eq!(WardenConfig::load(&path).unwrap().community.owner, 42);
    }
}

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Get the XDG config directory for denv
///
/// Returns `$XDG_CONFIG_HOME/denv` or `~/.config/denv` if not set
pub fn config_dir() -> Result<PathBuf> {
    let base = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            directories::BaseDirs::new()
                .expect("Failed to get home directory")
                .home_dir()
                .join(".config")
        });

    Ok(base.join("denv"))
}

/// Get the path to the denv config file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the shared export directory for environment binaries
///
/// Returns `$DENV_BIN_DIR` or `~/.local/bin` if not set
pub fn export_bin_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("DENV_BIN_DIR") {
        return Ok(PathBuf::from(dir));
    }

    let base_dirs = directories::BaseDirs::new().context("Failed to get home directory")?;
    Ok(base_dirs.home_dir().join(".local/bin"))
}

/// Get the home directory
pub fn home_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .context("Failed to get home directory")
        .map(|bd| bd.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_dir() {
        let dir = config_dir().unwrap();
        assert!(dir.to_string_lossy().contains("denv"));
    }

    #[test]
    fn test_config_file() {
        let file = config_file().unwrap();
        assert!(file.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    #[serial]
    fn test_export_bin_dir_default() {
        std::env::remove_var("DENV_BIN_DIR");
        let dir = export_bin_dir().unwrap();
        assert!(dir.to_string_lossy().contains(".local/bin"));
    }

    #[test]
    #[serial]
    fn test_export_bin_dir_override() {
        std::env::set_var("DENV_BIN_DIR", "/opt/denv/bin");
        let dir = export_bin_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/opt/denv/bin"));
        std::env::remove_var("DENV_BIN_DIR");
    }

    #[test]
    fn test_home_dir() {
        let dir = home_dir().unwrap();
        assert!(dir.is_absolute());
    }
}

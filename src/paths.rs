//! Config file location for zonepush
//!
//! # Resolution Priority
//!
//! 1. `--config` flag or `ZONEPUSH_CONFIG` environment variable
//! 2. `./config.yaml` in the working directory
//! 3. `<config dir>/zonepush/config.yaml`:
//!    - Linux: `~/.config/zonepush/config.yaml`
//!    - macOS: `~/Library/Application Support/zonepush/config.yaml`
//!    - Windows: `%APPDATA%\zonepush\config.yaml`

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const ENV_CONFIG: &str = "ZONEPUSH_CONFIG";

/// Config file name looked up in the working directory
pub const DEFAULT_FILE: &str = "config.yaml";

/// Resolve the config file to load.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    resolve(explicit, Path::new(DEFAULT_FILE), user_config_file())
}

/// Per-user config file location, if the platform has one.
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("zonepush").join(DEFAULT_FILE))
}

fn resolve(explicit: Option<&Path>, local: &Path, user: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = expand(&path.to_string_lossy());
        log::debug!("Using config file from flag or {}: {}", ENV_CONFIG, path.display());
        return Ok(path);
    }

    if local.is_file() {
        log::debug!("Using config file in working directory: {}", local.display());
        return Ok(local.to_path_buf());
    }

    if let Some(path) = user.filter(|p| p.is_file()) {
        log::debug!("Using user config file: {}", path.display());
        return Ok(path);
    }

    bail!("No config file found: pass --config, set {ENV_CONFIG}, or create ./{DEFAULT_FILE}")
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join(DEFAULT_FILE);
        fs::write(&local, "inventory: []").unwrap();

        let explicit = dir.path().join("fleet.toml");
        let resolved = resolve(Some(&explicit), &local, None).unwrap();
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn test_local_file_before_user_file() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join(DEFAULT_FILE);
        let user = dir.path().join("user.yaml");
        fs::write(&local, "").unwrap();
        fs::write(&user, "").unwrap();

        assert_eq!(resolve(None, &local, Some(user)).unwrap(), local);
    }

    #[test]
    fn test_falls_back_to_user_file() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join(DEFAULT_FILE);
        let user = dir.path().join("user.yaml");
        fs::write(&user, "").unwrap();

        assert_eq!(resolve(None, &local, Some(user.clone())).unwrap(), user);
    }

    #[test]
    fn test_missing_everywhere_is_error() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join(DEFAULT_FILE);
        let user = dir.path().join("user.yaml");

        let err = resolve(None, &local, Some(user)).unwrap_err();
        assert!(err.to_string().contains(ENV_CONFIG));
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/keys/fw"), home.join("keys").join("fw"));
        assert_eq!(expand("/abs/path"), PathBuf::from("/abs/path"));
    }
}

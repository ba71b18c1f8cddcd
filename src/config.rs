//! Optional user configuration.
//!
//! Read from `~/.config/querylab/config.toml` when present; every field
//! has a default so a missing file is not an error. CLI flags override
//! whatever the file says.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{ShellError, ShellResult};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// JSON seed file loaded into the in-memory store on startup.
    pub seed: Option<PathBuf>,
    /// Pretty-print results by default.
    pub pretty: Option<bool>,
    /// Disable colored output.
    pub no_color: Option<bool>,
}

impl Config {
    /// Path of the config file, if a config directory exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("querylab").join("config.toml"))
    }

    /// Load from the default location. A missing file yields defaults;
    /// a present-but-invalid file is an error.
    pub fn load() -> ShellResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &std::path::Path) -> ShellResult<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| ShellError::Config(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.seed.is_none());
        assert!(config.pretty.is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let config: Config = toml::from_str(
            r#"
            seed = "/tmp/seed.json"
            pretty = true
            no_color = false
            "#,
        )
        .unwrap();
        assert_eq!(config.seed.unwrap(), PathBuf::from("/tmp/seed.json"));
        assert_eq!(config.pretty, Some(true));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("verbose = 3").is_err());
    }
}

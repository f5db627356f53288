//! Configuration file: swift profiles and ssh tool settings.
//!
//! ```json
//! {
//!   "swift": {
//!     "archive": {
//!       "user_name": "alice",
//!       "tenant_name": "research",
//!       "auth_url": "https://keystone.example.com/v2.0",
//!       "password": "..."
//!     }
//!   },
//!   "ssh": { "options": ["-o", "BatchMode=yes"] }
//! }
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use urlfs_core::Error;
use urlfs_ssh::OpenSsh;
use urlfs_swift::SwiftProfile;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "URLFS_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Swift locations by name, reachable as `swift://<name>/...`.
    pub swift: BTreeMap<String, SwiftProfile>,
    pub ssh: OpenSsh,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Config {
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        log::debug!("loading config from {}", path.display());
        let text = fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        Self::from_json(&text).map_err(|e| match e {
            Error::Config { message } => Error::Config {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    /// `<config dir>/urlfs/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("urlfs").join("config.json"))
    }

    /// Find and load the config.
    ///
    /// `explicit` wins, then [`CONFIG_ENV`], then [`Config::default_path`].
    /// Only the default file may be missing, which yields the default config.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, Error> {
        Self::locate_in(
            explicit,
            std::env::var_os(CONFIG_ENV),
            Self::default_path(),
        )
    }

    fn locate_in(
        explicit: Option<&Path>,
        from_env: Option<OsString>,
        default: Option<PathBuf>,
    ) -> Result<Self, Error> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = from_env.filter(|value| !value.is_empty()) {
            return Self::load(Path::new(&path));
        }
        match default {
            Some(path) => match fs::metadata(&path) {
                Ok(_) => Self::load(&path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
                Err(e) => Err(Error::Config {
                    message: format!("{}: {}", path.display(), e),
                }),
            },
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "swift": {
            "archive": {
                "user_name": "alice",
                "tenant_name": "research",
                "auth_url": "https://keystone.example.com/v2.0",
                "password": "hunter2"
            }
        },
        "ssh": { "options": ["-o", "BatchMode=yes"] }
    }"#;

    #[test]
    fn parse_sample() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert_eq!(config.swift["archive"].user_name, "alice");
        assert_eq!(config.ssh.options, vec!["-o", "BatchMode=yes"]);
        assert_eq!(config.ssh.ssh_program, "ssh");
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn bad_json_is_config_error() {
        assert!(matches!(
            Config::from_json(r#"{"swift": 3}"#),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn explicit_path_wins_and_must_exist() {
        let tmp = TempDir::new().unwrap();
        let explicit = tmp.path().join("explicit.json");
        let env = tmp.path().join("env.json");
        fs::write(&explicit, SAMPLE).unwrap();
        fs::write(&env, "{}").unwrap();

        let config =
            Config::locate_in(Some(&explicit), Some(env.clone().into()), None).unwrap();
        assert!(config.swift.contains_key("archive"));

        let missing = tmp.path().join("missing.json");
        assert!(matches!(
            Config::locate_in(Some(&missing), None, None),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn env_path_before_default() {
        let tmp = TempDir::new().unwrap();
        let env = tmp.path().join("env.json");
        let default = tmp.path().join("default.json");
        fs::write(&env, SAMPLE).unwrap();
        fs::write(&default, "{}").unwrap();

        let config = Config::locate_in(None, Some(env.into()), Some(default.clone())).unwrap();
        assert!(config.swift.contains_key("archive"));

        let config = Config::locate_in(None, Some(OsString::new()), Some(default)).unwrap();
        assert!(config.swift.is_empty());
    }

    #[test]
    fn missing_default_is_default_config() {
        let tmp = TempDir::new().unwrap();
        let config =
            Config::locate_in(None, None, Some(tmp.path().join("urlfs/config.json"))).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(Config::locate_in(None, None, None).unwrap(), Config::default());
    }
}

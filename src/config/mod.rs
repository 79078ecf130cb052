use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::Serialize;

/// Contents of `~/.dirbust/config.yml`. Every key is optional; command line
/// flags take precedence over values found here.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(alias = "url")]
    pub urls: Option<Vec<String>>,
    pub list: Option<String>,
    pub wordlist: Option<String>,
    pub threads: Option<usize>,
    /// Duration such as `10s` or `500ms`.
    pub timeout: Option<String>,
    pub delay: Option<String>,
    pub retry_attempts: Option<usize>,
    #[serde(alias = "user_agent")]
    pub useragent: Option<String>,
    pub random_agent: Option<bool>,
    pub headers: Option<Vec<String>>,
    pub cookies: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub proxy: Option<String>,
    pub method: Option<String>,
    pub no_tls_validation: Option<bool>,

    pub extensions: Option<String>,
    pub extensions_file: Option<String>,
    pub status_codes: Option<String>,
    pub status_codes_blacklist: Option<String>,
    pub exclude_length: Option<String>,
    pub add_slash: Option<bool>,
    pub expanded: Option<bool>,
    pub discover_backup: Option<bool>,
    pub autocalibrate: Option<bool>,
    pub force: Option<bool>,

    pub output: Option<String>,
    pub output_format: Option<String>,
    pub append: Option<bool>,
    pub no_status: Option<bool>,
    pub hide_length: Option<bool>,
    pub no_color: Option<bool>,
    pub no_progress: Option<bool>,
    pub no_error: Option<bool>,
    pub quiet: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".dirbust").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).to_string_lossy().to_string()
}

pub fn parse_config(contents: &str, origin: &Path) -> Result<ConfigFile, String> {
    if contents.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str::<ConfigFile>(contents)
        .map_err(|e| format!("failed to parse config '{}': {e}", origin.display()))
}

/// Reads a config file. With `allow_missing` a nonexistent file yields the
/// empty config instead of an error.
pub fn load_config(path: &Path, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents, path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}

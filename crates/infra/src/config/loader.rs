//! Configuration loader
//!
//! Loads client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `MAILWIRE_API_TOKEN` is not set, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Every loaded configuration is validated before it is returned.
//!
//! ## Environment Variables
//! - `MAILWIRE_API_TOKEN`: API token used for login (required)
//! - `MAILWIRE_REFRESH_ON_SAVE`: Re-read records after save (true/false)
//! - `MAILWIRE_RETRY_LIMIT`: Replay attempts per stored unit
//! - `MAILWIRE_RETRYER_TYPE`: `file` or `none`
//! - `MAILWIRE_RETRYER_PATH`: Directory for the file retry store
//! - `MAILWIRE_DEBUG`: Capture request/response exchanges (true/false)
//! - `MAILWIRE_CONNECTION_TIMEOUT`: Transport timeout in seconds
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./mailwire.json` or `./mailwire.toml` (current working directory)
//! 2. `./config.json` or `./config.toml` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use mailwire_domain::{ClientConfig, MailwireError, Result, RetryerConfig, RetryerKind};

const CONFIG_FILE_NAMES: [&str; 4] = ["mailwire.json", "mailwire.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `MailwireError::Config` if configuration cannot be loaded from
/// either source, a file is malformed, or validation fails.
pub fn load() -> Result<ClientConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// Only `MAILWIRE_API_TOKEN` is required; every other option falls back to
/// its default.
///
/// # Errors
/// Returns `MailwireError::Config` if the token is missing or a variable
/// has an invalid value.
pub fn load_from_env() -> Result<ClientConfig> {
    let defaults = ClientConfig::default();

    let api_token = env_var("MAILWIRE_API_TOKEN")?;
    let retry_limit = env_parse("MAILWIRE_RETRY_LIMIT", defaults.retry_limit)?;
    let connection_timeout_secs =
        env_parse("MAILWIRE_CONNECTION_TIMEOUT", defaults.connection_timeout_secs)?;
    let kind = env_parse("MAILWIRE_RETRYER_TYPE", RetryerKind::None)?;
    let path = std::env::var("MAILWIRE_RETRYER_PATH").ok().filter(|p| !p.is_empty()).map(PathBuf::from);

    let config = ClientConfig {
        api_token: Some(api_token),
        refresh_on_save: env_bool("MAILWIRE_REFRESH_ON_SAVE", defaults.refresh_on_save),
        retry_limit,
        retryer: RetryerConfig { kind, path },
        debug: env_bool("MAILWIRE_DEBUG", defaults.debug),
        connection_timeout_secs,
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations (see
/// [`probe_config_paths`]). Format is detected by file extension.
///
/// # Errors
/// Returns `MailwireError::Config` if the file is missing, malformed, or
/// fails validation.
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(MailwireError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            MailwireError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| MailwireError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content, by extension (`.json`/`.toml`)
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| MailwireError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| MailwireError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(MailwireError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut bases = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        bases.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            bases.push(exe_dir.to_path_buf());
        }
    }

    candidates_in(&bases).into_iter().find(|path| path.exists())
}

fn candidates_in(bases: &[PathBuf]) -> Vec<PathBuf> {
    bases
        .iter()
        .flat_map(|base| CONFIG_FILE_NAMES.iter().map(move |name| base.join(name)))
        .collect()
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| MailwireError::Config(format!("Missing required environment variable: {key}")))
}

/// Parse an optional environment variable, or return `default` if unset
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| MailwireError::Config(format!("Invalid value for {key}: {e}"))),
        _ => Ok(default),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ENV_KEYS: [&str; 7] = [
        "MAILWIRE_API_TOKEN",
        "MAILWIRE_REFRESH_ON_SAVE",
        "MAILWIRE_RETRY_LIMIT",
        "MAILWIRE_RETRYER_TYPE",
        "MAILWIRE_RETRYER_PATH",
        "MAILWIRE_DEBUG",
        "MAILWIRE_CONNECTION_TIMEOUT",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    fn temp_config(contents: &str, extension: &str) -> PathBuf {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        path
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        for (key, value) in [("MW_TEST_B1", "1"), ("MW_TEST_B2", "TRUE"), ("MW_TEST_B3", "on")] {
            std::env::set_var(key, value);
            assert!(env_bool(key, false));
            std::env::remove_var(key);
        }
        for (key, value) in [("MW_TEST_B4", "0"), ("MW_TEST_B5", "no"), ("MW_TEST_B6", "off")] {
            std::env::set_var(key, value);
            assert!(!env_bool(key, true));
            std::env::remove_var(key);
        }

        std::env::remove_var("MW_TEST_MISSING");
        assert!(env_bool("MW_TEST_MISSING", true));
        assert!(!env_bool("MW_TEST_MISSING", false));
    }

    #[test]
    fn test_load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("MAILWIRE_API_TOKEN", "tok-123");
        std::env::set_var("MAILWIRE_REFRESH_ON_SAVE", "true");
        std::env::set_var("MAILWIRE_RETRY_LIMIT", "7");
        std::env::set_var("MAILWIRE_RETRYER_TYPE", "FILE");
        std::env::set_var("MAILWIRE_RETRYER_PATH", "/var/spool/mailwire");
        std::env::set_var("MAILWIRE_DEBUG", "yes");
        std::env::set_var("MAILWIRE_CONNECTION_TIMEOUT", "12");

        let result = load_from_env();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.api_token.as_deref(), Some("tok-123"));
        assert!(config.refresh_on_save);
        assert_eq!(config.retry_limit, 7);
        assert_eq!(config.retryer, RetryerConfig::file("/var/spool/mailwire"));
        assert!(config.debug);
        assert_eq!(config.connection_timeout_secs, 12);
    }

    #[test]
    fn test_load_from_env_defaults() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("MAILWIRE_API_TOKEN", "tok");

        let result = load_from_env();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.retry_limit, 5);
        assert_eq!(config.retryer.kind, RetryerKind::None);
        assert!(!config.refresh_on_save);
    }

    #[test]
    fn test_load_from_env_missing_token() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let err = load_from_env().unwrap_err();
        assert!(matches!(err, MailwireError::Config(_)), "Should be a Config error");
    }

    #[test]
    fn test_load_from_env_invalid_values() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("MAILWIRE_API_TOKEN", "tok");

        std::env::set_var("MAILWIRE_RETRY_LIMIT", "many");
        assert!(matches!(load_from_env(), Err(MailwireError::Config(_))));
        std::env::remove_var("MAILWIRE_RETRY_LIMIT");

        std::env::set_var("MAILWIRE_RETRYER_TYPE", "database");
        assert!(matches!(load_from_env(), Err(MailwireError::Config(_))));
        std::env::remove_var("MAILWIRE_RETRYER_TYPE");

        std::env::set_var("MAILWIRE_RETRYER_TYPE", "file");
        std::env::set_var("MAILWIRE_RETRY_LIMIT", "0");
        assert!(matches!(load_from_env(), Err(MailwireError::Config(_))));

        clear_env();
    }

    #[test]
    fn test_load_from_file_json() {
        let path = temp_config(
            r#"{
                "api_token": "file-token",
                "refresh_on_save": true,
                "retry_limit": 2,
                "retryer": { "type": "file", "path": "/tmp/mailwire-json" }
            }"#,
            "json",
        );

        let config = load_from_file(Some(path.clone())).unwrap();
        assert_eq!(config.api_token.as_deref(), Some("file-token"));
        assert!(config.refresh_on_save);
        assert_eq!(config.retry_limit, 2);
        assert_eq!(config.retryer, RetryerConfig::file("/tmp/mailwire-json"));
        assert_eq!(config.connection_timeout_secs, 30);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_toml() {
        let path = temp_config(
            r#"
api_token = "toml-token"
debug = true

[retryer]
type = "none"
"#,
            "toml",
        );

        let config = load_from_file(Some(path.clone())).unwrap();
        assert_eq!(config.api_token.as_deref(), Some("toml-token"));
        assert!(config.debug);
        assert_eq!(config.retryer.kind, RetryerKind::None);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_not_found() {
        let err = load_from_file(Some(PathBuf::from("/nonexistent/mailwire.json"))).unwrap_err();
        assert!(matches!(err, MailwireError::Config(_)), "Should be a Config error");
    }

    #[test]
    fn test_load_from_file_rejects_invalid_options() {
        let path = temp_config(r#"{ "connection_timeout_secs": 0 }"#, "json");
        assert!(matches!(load_from_file(Some(path.clone())), Err(MailwireError::Config(_))));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_candidates_order() {
        let candidates = candidates_in(&[PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(candidates.len(), 8);
        assert_eq!(candidates[0], PathBuf::from("/a/mailwire.json"));
        assert_eq!(candidates[3], PathBuf::from("/a/config.toml"));
        assert_eq!(candidates[4], PathBuf::from("/b/mailwire.json"));
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("retry_limit: 3", &PathBuf::from("mailwire.yaml"));
        assert!(result.is_err(), "Should fail with unsupported format");
    }

    #[test]
    fn test_parse_config_unknown_retryer_type() {
        let result = parse_config(r#"{"retryer": {"type": "redis"}}"#, &PathBuf::from("m.json"));
        assert!(matches!(result, Err(MailwireError::Config(_))));
    }
}

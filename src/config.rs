//! Configuration for exeda runs.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (EXEDA_OUTPUT)
//! 2. Config file (.exeda/config.yaml)
//! 3. Defaults (./output, 3 attempts, 30s backoff)
//!
//! Config file discovery:
//! - Searches current directory and parents for .exeda/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::pipeline::RetryPolicy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<std::result::Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Output directory (relative to the project root)
    pub output: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Directory all run artifacts land in
    pub output_dir: PathBuf,
    /// Stage retry settings
    pub retry: RetryPolicy,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".exeda").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path_str)
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let config_file = find_config_file();

    let mut output_dir = PathBuf::from("output");
    let mut retry = RetryPolicy::default();

    if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        // Base directory is the parent of .exeda/ (i.e., the project root)
        let base_dir = config_path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));

        if let Some(ref out) = config.paths.output {
            output_dir = resolve_path(base_dir, out);
        }
        if let Some(ref retry_cfg) = config.retry {
            if let Some(max) = retry_cfg.max_attempts {
                retry.max_attempts = max;
            }
            if let Some(base) = retry_cfg.base_delay_ms {
                retry.base_delay_ms = base;
            }
        }
    }

    if let Ok(env_out) = std::env::var("EXEDA_OUTPUT") {
        output_dir = PathBuf::from(env_out);
    }

    Ok(ResolvedConfig {
        output_dir,
        retry,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the output directory for run artifacts.
pub fn output_dir() -> Result<PathBuf> {
    Ok(config()?.output_dir.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let exeda_dir = temp.path().join(".exeda");
        std::fs::create_dir_all(&exeda_dir).unwrap();

        let config_path = exeda_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
paths:
  output: ./results
retry:
  max_attempts: 5
  base_delay_ms: 1000
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.paths.output, Some("./results".to_string()));
        let retry = config.retry.unwrap();
        assert_eq!(retry.max_attempts, Some(5));
        assert_eq!(retry.base_delay_ms, Some(1000));
    }

    #[test]
    fn test_reload_config_sees_env_override() {
        std::env::set_var("EXEDA_OUTPUT", "/tmp/exeda-env-out");
        let config = reload_config().unwrap();
        std::env::remove_var("EXEDA_OUTPUT");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/exeda-env-out"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./results"),
            PathBuf::from("/home/user/project/./results")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}

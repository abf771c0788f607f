use std::path::{Path, PathBuf};

use crate::config::{config_dir, ApiConfig};
use crate::error::{FeedError, Result};

/// Run a shell command and take its trimmed stdout as the key
fn try_cli_key(command: &str) -> Option<String> {
    let output = std::process::Command::new("sh")
        .args(["-c", command])
        .output()
        .ok()?;

    if output.status.success() {
        let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !key.is_empty() {
            return Some(key);
        }
    }
    None
}

/// Stored key path: ~/.config/photofeed/api_key
fn key_path() -> Option<PathBuf> {
    Some(config_dir()?.join("api_key"))
}

fn read_key_file(path: &Path) -> Option<String> {
    let key = std::fs::read_to_string(path).ok()?;
    let key = key.trim().to_string();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

fn key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|key| !key.is_empty())
}

/// Find the Pexels API key, trying in order:
/// 1. The env var named in the config
/// 2. ~/.config/photofeed/api_key
/// 3. The configured key command
pub fn load_api_key(api: &ApiConfig) -> Result<String> {
    resolve_api_key(api, key_path().as_deref())
}

fn resolve_api_key(api: &ApiConfig, stored: Option<&Path>) -> Result<String> {
    if let Some(key) = api.api_key_env.as_deref().and_then(key_from_env) {
        return Ok(key);
    }

    if let Some(key) = stored.and_then(read_key_file) {
        return Ok(key);
    }

    if let Some(key) = api.api_key_command.as_deref().and_then(try_cli_key) {
        return Ok(key);
    }

    Err(FeedError::Auth(format!(
        "No Pexels API key found. Set {} or configure api_key_command.",
        api.api_key_env.as_deref().unwrap_or("an API key env var")
    )))
}

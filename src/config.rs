//! Client configuration.
//!
//! Priority (highest to lowest): CLI / env var > TOML file > built-in
//! default. The TOML file lives at `{config_dir}/config.toml`; a parse
//! failure logs an error and falls back to defaults rather than aborting.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::error;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// `{config_dir}/config.toml` — all fields are optional overrides.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Tracker REST API base URL (default: http://127.0.0.1:8000).
    api_url: Option<String>,
    /// Push channel WebSocket URL (default: derived from api_url).
    ws_url: Option<String>,
    /// Log level filter string, e.g. "debug", "info,tasklink=trace".
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
}

fn load_toml(config_dir: &Path) -> Option<TomlConfig> {
    let path = config_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── ClientConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Tracker REST API base URL.
    pub api_url: String,
    /// Push channel WebSocket URL.
    pub ws_url: String,
    /// Log level filter string.
    pub log: String,
    /// Log output format: "pretty" | "json".
    pub log_format: String,
}

impl ClientConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// `api_url` / `ws_url` / `log` arrive as `Some(value)` from clap when
    /// given on the command line or through `TASKLINK_*` env vars.
    pub fn new(
        api_url: Option<String>,
        ws_url: Option<String>,
        log: Option<String>,
        config_dir: Option<PathBuf>,
    ) -> Self {
        let config_dir = config_dir.unwrap_or_else(default_config_dir);
        let toml = load_toml(&config_dir).unwrap_or_default();

        let api_url = api_url
            .filter(|s| !s.is_empty())
            .or(toml.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let ws_url = ws_url
            .filter(|s| !s.is_empty())
            .or(toml.ws_url)
            .unwrap_or_else(|| derive_ws_url(&api_url));

        let log = log
            .filter(|s| !s.is_empty())
            .or(toml.log)
            .unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("TASKLINK_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            ws_url,
            log,
            log_format,
        }
    }
}

/// Derive the push URL from the API URL: `http(s)` → `ws(s)`, path `/ws`.
fn derive_ws_url(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws_base}/ws")
}

fn default_config_dir() -> PathBuf {
    // $XDG_CONFIG_HOME/tasklink or ~/.config/tasklink
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("tasklink");
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("tasklink");
    }
    PathBuf::from(".tasklink")
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_apply_without_file() {
        let dir = TempDir::new().unwrap();
        let cfg = ClientConfig::new(None, None, None, Some(dir.path().to_path_buf()));
        assert_eq!(cfg.api_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.ws_url, "ws://127.0.0.1:8000/ws");
        assert_eq!(cfg.log, "info");
        assert_eq!(cfg.log_format, "pretty");
    }

    #[test]
    fn toml_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
            api_url = "https://tracker.example.com"
            log = "debug"
            "#,
        )
        .unwrap();
        let cfg = ClientConfig::new(None, None, None, Some(dir.path().to_path_buf()));
        assert_eq!(cfg.api_url, "https://tracker.example.com");
        assert_eq!(cfg.ws_url, "wss://tracker.example.com/ws");
        assert_eq!(cfg.log, "debug");
    }

    #[test]
    fn explicit_args_beat_toml() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), r#"api_url = "http://toml:1""#)
            .unwrap();
        let cfg = ClientConfig::new(
            Some("http://cli:2".into()),
            Some("ws://cli:2/push".into()),
            None,
            Some(dir.path().to_path_buf()),
        );
        assert_eq!(cfg.api_url, "http://cli:2");
        assert_eq!(cfg.ws_url, "ws://cli:2/push");
    }

    #[test]
    fn empty_overrides_are_ignored() {
        // An env var set to "" arrives as Some("") through clap; it must not
        // shadow the TOML value or the default.
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), r#"log = "debug""#).unwrap();
        let cfg = ClientConfig::new(
            Some(String::new()),
            Some(String::new()),
            Some(String::new()),
            Some(dir.path().to_path_buf()),
        );
        assert_eq!(cfg.api_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.ws_url, "ws://127.0.0.1:8000/ws");
        assert_eq!(cfg.log, "debug");
    }

    #[test]
    fn broken_toml_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "not valid toml [[").unwrap();
        let cfg = ClientConfig::new(None, None, None, Some(dir.path().to_path_buf()));
        assert_eq!(cfg.api_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn ws_url_derivation() {
        assert_eq!(derive_ws_url("http://127.0.0.1:8000"), "ws://127.0.0.1:8000/ws");
        assert_eq!(derive_ws_url("https://t.example.com/"), "wss://t.example.com/ws");
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;

use crate::modules::errors::ConsoleError;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000/".to_string(),
            user_agent: "mekanai-console/0.1".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Contents of `console.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub backend: BackendConfig,
    pub theme_file: String,
    pub log_level: String,
    pub nav_breakpoint: u32,
    pub app_port: u16,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            theme_file: "./theme.toml".to_string(),
            log_level: "info".to_string(),
            nav_breakpoint: 768,
            app_port: 7879,
        }
    }
}

impl ConsoleConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

/// Reads `console.toml`; a missing file means defaults.
pub fn load_console_config(path: &str) -> Result<ConsoleConfig, ConsoleError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ConsoleConfig::default()),
        Err(err) => return Err(err.into()),
    };
    Ok(toml::from_str(&text)?)
}

pub fn save_console_config(path: &str, config: &ConsoleConfig) -> Result<(), ConsoleError> {
    let toml_str = toml::to_string_pretty(config)?;
    fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("mekanai-{}-{name}", std::process::id()));
        dir.to_string_lossy().into_owned()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = load_console_config(&temp_path("absent.toml")).unwrap();
        assert_eq!(config.nav_breakpoint, 768);
        assert_eq!(config.backend.timeout_secs, 30);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let path = temp_path("partial.toml");
        fs::write(&path, "log_level = \"debug\"\n[backend]\nbase_url = \"http://gpu-box:5000/\"\n").unwrap();
        let config = load_console_config(&path).unwrap();
        assert_eq!(config.backend.base_url, "http://gpu-box:5000/");
        assert_eq!(config.backend.user_agent, "mekanai-console/0.1");
        assert_eq!(config.level_filter(), log::LevelFilter::Debug);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn saved_config_loads_back() {
        let path = temp_path("saved.toml");
        let mut config = ConsoleConfig::default();
        config.app_port = 9000;
        save_console_config(&path, &config).unwrap();
        assert_eq!(load_console_config(&path).unwrap().app_port, 9000);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn broken_toml_is_an_error() {
        let path = temp_path("broken.toml");
        fs::write(&path, "app_port = \"not a port\"").unwrap();
        assert!(matches!(load_console_config(&path), Err(ConsoleError::TomlRead(_))));
        fs::remove_file(&path).unwrap();
    }
}

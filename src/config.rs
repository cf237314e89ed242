use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub base_url: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub chat_page_size: u32,
    pub session_page_size: u32,
    pub image_history_page_size: u32,
    pub image_sidebar_page_size: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            chat_page_size: 10,
            session_page_size: 10,
            image_history_page_size: 20,
            image_sidebar_page_size: 8,
        }
    }
}

/// Scroll tuning. Distances are in the rendering layer's own units.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub throttle_ms: u64,
    pub top_threshold: f64,
    pub bottom_threshold: f64,
    pub affordance_threshold: f64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 300,
            top_threshold: 0.0,
            bottom_threshold: 50.0,
            affordance_threshold: 100.0,
        }
    }
}

impl ScrollConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub scroll: ScrollConfig,
}

fn config_path() -> Option<PathBuf> {
    let config_dir = dirs::config_dir()?;
    Some(config_dir.join("thinkora").join("config.toml"))
}

impl Config {
    /// Load from the user config dir, then apply `THINKORA_BASE_URL`.
    pub fn load() -> Self {
        let mut config = config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default();

        if let Ok(url) = std::env::var("THINKORA_BASE_URL") {
            if !url.trim().is_empty() {
                config.general.base_url = url;
            }
        }
        config
    }

    /// Missing or unparsable files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Config::default();
        };

        match toml::from_str::<Config>(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("ignoring invalid config {}: {}", path.display(), e);
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_partial_config_keeps_defaults() {
        let toml_str = r#"
[general]
base_url = "https://api.thinkora.dev"

[paging]
chat_page_size = 25
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.base_url, "https://api.thinkora.dev");
        assert_eq!(config.paging.chat_page_size, 25);
        assert_eq!(config.paging.session_page_size, 10);
        assert_eq!(config.scroll.throttle_ms, 300);
    }

    #[test]
    fn missing_file_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml"));
        assert_eq!(config.general.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.scroll.bottom_threshold, 50.0);
    }

    #[test]
    fn invalid_file_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[paging\nchat_page_size = ").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.paging.chat_page_size, 10);
    }

    #[test]
    fn scroll_section_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scroll]\nthrottle_ms = 120\ntop_threshold = 4.0\n").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.scroll.throttle(), Duration::from_millis(120));
        assert_eq!(config.scroll.top_threshold, 4.0);
        assert_eq!(config.scroll.bottom_threshold, 50.0);
    }
}

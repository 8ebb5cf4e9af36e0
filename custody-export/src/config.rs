//! YAML run configuration.
//!
//! ```yaml
//! portal:
//!   login_url: https://www.e-custody.com/#/login
//!   username: operator
//!   password: secret
//! download_root: D:\Data
//! resource_dir: seek
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ExportError;
use crate::session::PortalLayout;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalCredentials {
    #[serde(default)]
    pub login_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome or Edge executable; discovered when unset.
    pub executable: Option<PathBuf>,
    /// Profile directory; a throwaway one is used when unset.
    pub user_data_dir: Option<PathBuf>,
    pub launch_timeout_secs: u64,
    pub default_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            user_data_dir: None,
            launch_timeout_secs: 30,
            default_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Wait for the post-login landmark; long enough for a human to solve a CAPTCHA.
    pub login_secs: u64,
    pub rows_secs: u64,
    pub search_settle_ms: u64,
    pub menu_settle_ms: u64,
    pub download_secs: u64,
    pub print_preview_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            login_secs: 90,
            rows_secs: 10,
            search_settle_ms: 1000,
            menu_settle_ms: 1000,
            download_secs: 120,
            print_preview_ms: 2000,
        }
    }
}

impl Timeouts {
    pub fn login(&self) -> Duration {
        Duration::from_secs(self.login_secs)
    }

    pub fn rows(&self) -> Duration {
        Duration::from_secs(self.rows_secs)
    }

    pub fn search_settle(&self) -> Duration {
        Duration::from_millis(self.search_settle_ms)
    }

    pub fn menu_settle(&self) -> Duration {
        Duration::from_millis(self.menu_settle_ms)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn print_preview(&self) -> Duration {
        Duration::from_millis(self.print_preview_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub threshold: f32,
    pub max_attempts: u32,
    pub interval_ms: u64,
    /// The "target printer" label sits this far left of its dropdown.
    pub printer_offset_x: i32,
    pub hover_offset_y: i32,
    pub save_as_pdf_attempts: u32,
    pub menu_template_attempts: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            max_attempts: 10,
            interval_ms: 1000,
            printer_offset_x: 250,
            hover_offset_y: 20,
            save_as_pdf_attempts: 3,
            menu_template_attempts: 15,
        }
    }
}

impl MatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    /// Exact title of the native save dialog.
    pub save_title: String,
    pub save_button: String,
    pub overwrite_title: String,
    pub overwrite_button: String,
    /// How long to wait for the save dialog to appear.
    pub appear_timeout_secs: u64,
    pub settle_ms: u64,
    pub after_save_ms: u64,
    pub overwrite_timeout_secs: u64,
}

impl DialogConfig {
    pub fn appear_timeout(&self) -> Duration {
        Duration::from_secs(self.appear_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn after_save(&self) -> Duration {
        Duration::from_millis(self.after_save_ms)
    }

    pub fn overwrite_timeout(&self) -> Duration {
        Duration::from_secs(self.overwrite_timeout_secs)
    }
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            save_title: "另存为".to_string(),
            save_button: "保存|Save".to_string(),
            overwrite_title: ".*文件已存在.*|.*确认保存.*|.*确认另存为.*|.*Confirm Save.*|.*Replace.*"
                .to_string(),
            overwrite_button: "是.*|替换.*|Yes.*|Replace.*".to_string(),
            appear_timeout_secs: 10,
            settle_ms: 500,
            after_save_ms: 3000,
            overwrite_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub portal: PortalCredentials,
    #[serde(default)]
    pub download_root: PathBuf,
    #[serde(default)]
    pub log_root: Option<PathBuf>,
    #[serde(default = "default_resource_dir")]
    pub resource_dir: PathBuf,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub dialog: DialogConfig,
    #[serde(default)]
    pub layout: PortalLayout,
    /// Directory the config was loaded from; relative paths resolve against it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_resource_dir() -> PathBuf {
    PathBuf::from("seek")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            portal: PortalCredentials::default(),
            download_root: PathBuf::new(),
            log_root: None,
            resource_dir: default_resource_dir(),
            browser: BrowserConfig::default(),
            timeouts: Timeouts::default(),
            matcher: MatcherConfig::default(),
            dialog: DialogConfig::default(),
            layout: PortalLayout::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ExportError> {
        serde_yaml::from_str(text)
            .map_err(|e| ExportError::Config(format!("malformed configuration: {e}")))
    }

    /// Reads, parses and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ExportError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a configuration file without validating it, so
    /// callers can apply overrides first.
    pub fn read(path: &Path) -> Result<Self, ExportError> {
        debug!(path = %path.display(), "loading configuration");
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExportError::Config(format!("cannot read configuration {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml(&text)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        let missing: Vec<&str> = [
            ("portal.login_url", &self.portal.login_url),
            ("portal.username", &self.portal.username),
            ("portal.password", &self.portal.password),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();
        if !missing.is_empty() {
            return Err(ExportError::Config(format!(
                "incomplete portal configuration, missing: {}",
                missing.join(", ")
            )));
        }
        if self.download_root.as_os_str().is_empty() {
            return Err(ExportError::Config("download_root is not set".to_string()));
        }
        if !(0.0..=1.0).contains(&self.matcher.threshold) {
            return Err(ExportError::Config(format!(
                "matcher.threshold must be within 0..=1, got {}",
                self.matcher.threshold
            )));
        }
        if self.matcher.max_attempts == 0 {
            return Err(ExportError::Config(
                "matcher.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn log_root(&self) -> &Path {
        self.log_root.as_deref().unwrap_or(&self.download_root)
    }

    /// Resource directory resolved against the config location.
    pub fn resource_dir(&self) -> PathBuf {
        if self.resource_dir.is_absolute() {
            self.resource_dir.clone()
        } else {
            self.base_dir.join(&self.resource_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
portal:
  login_url: https://portal.example/#/login
  username: operator
  password: secret
download_root: /data/out
timeouts:
  login_secs: 120
matcher:
  threshold: 0.8
"#;

    #[test]
    fn test_parses_with_defaults() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.timeouts.login_secs, 120);
        assert_eq!(config.timeouts.rows_secs, 10);
        assert_eq!(config.matcher.threshold, 0.8);
        assert_eq!(config.matcher.max_attempts, 10);
        assert_eq!(config.dialog.save_title, "另存为");
        assert_eq!(config.log_root(), Path::new("/data/out"));
        assert_eq!(config.resource_dir, PathBuf::from("seek"));
    }

    #[test]
    fn test_missing_credentials_are_fatal() {
        let config = AppConfig::from_yaml("portal:\n  login_url: https://x\ndownload_root: /tmp\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
        let message = err.to_string();
        assert!(message.contains("portal.username"));
        assert!(message.contains("portal.password"));
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let err = AppConfig::from_yaml("portal: [unclosed").unwrap_err();
        assert!(matches!(err, ExportError::Config(_)));
    }

    #[test]
    fn test_load_resolves_relative_resource_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.resource_dir(), dir.path().join("seek"));
    }
}

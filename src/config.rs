//! Configuration for the helpdesk service.
//!
//! Settings are read from `panichd.toml` and layered file → environment →
//! CLI. Every field has a default so an empty (or missing) file yields a
//! working configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! port = 8080
//! db_path = "panichd.db"
//!
//! [settings]
//! paginate_items = 10
//! subject_content_column = true
//! departments_feature = false
//! agent_restrict = false
//! default_status_id = 1
//! default_reopen_status_id = 2
//! default_close_status_id = 3
//! recent_comments_hours = 48
//!
//! [settings.reopen_ticket_perm]
//! admin = true
//! agent = true
//! owner = false
//!
//! [locale]
//! datetime_format = "%d/%m/%Y %H:%M"
//!
//! [locale.lang]
//! "btn-change" = "Change"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "panichd.toml";

/// Top-level `panichd.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelpdeskToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub locale: LocaleSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    PathBuf::from("panichd.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            db_path: default_db_path(),
        }
    }
}

/// Per-role switch used by the close and reopen permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub agent: bool,
    #[serde(default)]
    pub owner: bool,
}

/// `[settings]` section: helpdesk behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Comments per page on the ticket detail view.
    #[serde(default = "default_paginate_items")]
    pub paginate_items: usize,
    /// Page sizes offered by the grid widget.
    #[serde(default = "default_length_menu")]
    pub length_menu: Vec<i64>,
    /// Render ticket content under the subject instead of in its own column.
    #[serde(default = "default_true")]
    pub subject_content_column: bool,
    #[serde(default)]
    pub departments_feature: bool,
    /// Agents only see tickets assigned to them.
    #[serde(default)]
    pub agent_restrict: bool,
    /// Status given to new tickets. Also defines the "newest" list.
    #[serde(default = "default_status_id")]
    pub default_status_id: i64,
    #[serde(default = "default_reopen_status_id")]
    pub default_reopen_status_id: Option<i64>,
    #[serde(default = "default_close_status_id")]
    pub default_close_status_id: i64,
    #[serde(default = "default_true")]
    pub ticket_attachments_feature: bool,
    #[serde(default = "default_attachments_path")]
    pub attachments_path: PathBuf,
    #[serde(default = "default_attachments_upload_max_size_mb")]
    pub attachments_upload_max_size_mb: u64,
    /// Comments newer than this count as "recent" in the grid.
    #[serde(default = "default_recent_comments_hours")]
    pub recent_comments_hours: i64,
    #[serde(default = "default_close_ticket_perm")]
    pub close_ticket_perm: RolePermissions,
    #[serde(default = "default_reopen_ticket_perm")]
    pub reopen_ticket_perm: RolePermissions,
}

fn default_true() -> bool {
    true
}

fn default_paginate_items() -> usize {
    10
}

fn default_length_menu() -> Vec<i64> {
    vec![10, 50, 100]
}

fn default_status_id() -> i64 {
    1
}

fn default_reopen_status_id() -> Option<i64> {
    Some(2)
}

fn default_close_status_id() -> i64 {
    3
}

fn default_attachments_path() -> PathBuf {
    PathBuf::from("storage/attachments")
}

fn default_attachments_upload_max_size_mb() -> u64 {
    10
}

fn default_recent_comments_hours() -> i64 {
    48
}

fn default_close_ticket_perm() -> RolePermissions {
    RolePermissions {
        admin: true,
        agent: true,
        owner: true,
    }
}

fn default_reopen_ticket_perm() -> RolePermissions {
    RolePermissions {
        admin: true,
        agent: true,
        owner: false,
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            paginate_items: default_paginate_items(),
            length_menu: default_length_menu(),
            subject_content_column: true,
            departments_feature: false,
            agent_restrict: false,
            default_status_id: default_status_id(),
            default_reopen_status_id: default_reopen_status_id(),
            default_close_status_id: default_close_status_id(),
            ticket_attachments_feature: true,
            attachments_path: default_attachments_path(),
            attachments_upload_max_size_mb: default_attachments_upload_max_size_mb(),
            recent_comments_hours: default_recent_comments_hours(),
            close_ticket_perm: default_close_ticket_perm(),
            reopen_ticket_perm: default_reopen_ticket_perm(),
        }
    }
}

impl Settings {
    pub fn attachments_max_bytes(&self) -> u64 {
        self.attachments_upload_max_size_mb * 1024 * 1024
    }
}

/// `[locale]` section: date formats and translation overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleSection {
    /// chrono format used to parse and display form date-times.
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,
    /// chrono format used in audit lines appended to interventions.
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Overrides for translation keys, see `helpdesk::lang`.
    #[serde(default)]
    pub lang: HashMap<String, String>,
}

fn default_datetime_format() -> String {
    "%d/%m/%Y %H:%M".to_string()
}

fn default_date_format() -> String {
    "%d/%m/%Y".to_string()
}

impl Default for LocaleSection {
    fn default() -> Self {
        Self {
            datetime_format: default_datetime_format(),
            date_format: default_date_format(),
            lang: HashMap::new(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files. Logs go to stdout when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl HelpdeskToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse panichd.toml")
    }

    /// Load from `path` when it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize panichd.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `PANICHD_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("PANICHD_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }
        if let Some(port) = lookup("PANICHD_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(level) = lookup("PANICHD_LOG") {
            self.logging.level = level;
        }
        if let Some(path) = lookup("PANICHD_ATTACHMENTS_PATH") {
            self.settings.attachments_path = PathBuf::from(path);
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.settings.paginate_items == 0 {
            warnings.push("paginate_items must be greater than 0".to_string());
        }
        if self.settings.recent_comments_hours <= 0 {
            warnings.push(format!(
                "recent_comments_hours should be positive, got {}",
                self.settings.recent_comments_hours
            ));
        }
        if self.settings.length_menu.is_empty() {
            warnings.push("length_menu is empty; the grid will offer no page sizes".to_string());
        }
        if self.settings.default_status_id == self.settings.default_close_status_id {
            warnings.push(
                "default_status_id equals default_close_status_id; completed tickets will look new"
                    .to_string(),
            );
        }
        for (name, fmt) in [
            ("datetime_format", &self.locale.datetime_format),
            ("date_format", &self.locale.date_format),
        ] {
            if !fmt.contains('%') {
                warnings.push(format!(
                    "Invalid {} '{}': expected a chrono format such as '%d/%m/%Y'",
                    name, fmt
                ));
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HelpdeskToml::parse("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.settings.paginate_items, 10);
        assert_eq!(config.settings.default_status_id, 1);
        assert_eq!(config.settings.default_reopen_status_id, Some(2));
        assert!(config.settings.subject_content_column);
        assert!(config.settings.reopen_ticket_perm.admin);
        assert!(!config.settings.reopen_ticket_perm.owner);
        assert_eq!(config.locale.datetime_format, "%d/%m/%Y %H:%M");
    }

    #[test]
    fn test_parse_sections() {
        let config = HelpdeskToml::parse(
            r#"
            [server]
            port = 9000

            [settings]
            agent_restrict = true
            departments_feature = true
            recent_comments_hours = 24

            [settings.reopen_ticket_perm]
            owner = true

            [locale.lang]
            "btn-change" = "Cambiar"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert!(config.settings.agent_restrict);
        assert!(config.settings.departments_feature);
        assert_eq!(config.settings.recent_comments_hours, 24);
        assert!(config.settings.reopen_ticket_perm.owner);
        assert!(!config.settings.reopen_ticket_perm.admin);
        assert_eq!(config.locale.lang.get("btn-change").unwrap(), "Cambiar");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HelpdeskToml::default();
        config.apply_overrides(|key| match key {
            "PANICHD_DB_PATH" => Some("/var/lib/panichd.db".to_string()),
            "PANICHD_PORT" => Some("4242".to_string()),
            "PANICHD_LOG" => Some("debug".to_string()),
            _ => None,
        });
        assert_eq!(config.server.db_path, PathBuf::from("/var/lib/panichd.db"));
        assert_eq!(config.server.port, 4242);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_env_override_ignores_bad_port() {
        let mut config = HelpdeskToml::default();
        config.apply_overrides(|key| (key == "PANICHD_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_validate_default_has_no_warnings() {
        assert!(HelpdeskToml::default().validate().is_empty());
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let mut config = HelpdeskToml::default();
        config.settings.paginate_items = 0;
        config.settings.recent_comments_hours = 0;
        config.locale.date_format = "dd/mm/yyyy".to_string();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("date_format")));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = HelpdeskToml::default();
        config.settings.paginate_items = 25;
        config.save(&path).unwrap();

        let loaded = HelpdeskToml::load_or_default(&path).unwrap();
        assert_eq!(loaded.settings.paginate_items, 25);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = HelpdeskToml::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{InvoiceError, Result};
use crate::export::ExportOptions;
use crate::model::DEFAULT_DUE_DAYS;

const DEFAULT_SENDER_TEMPLATE: &str = include_str!("../sender.toml");

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub data_root: String,
    pub currency: String,
    pub invoice_prefix: String,
    pub due_days: u64,
    pub autosave_secs: u64,
    pub log_level: Option<String>,
    pub export: ExportOptions,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            data_root: "~/Documents/Invoices".to_string(),
            currency: "TZS".to_string(),
            invoice_prefix: "FWT".to_string(),
            due_days: DEFAULT_DUE_DAYS,
            autosave_secs: 30,
            log_level: None,
            export: ExportOptions::default(),
        }
    }
}

impl AppSettings {
    pub fn root(&self) -> PathBuf {
        PathBuf::from(expand_home_dir(&self.data_root))
    }
}

/// Issuer details printed on every invoice (payment block, terms, footer).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SenderConfig {
    pub name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub bank: String,
    pub account_name: String,
    pub account_number: String,
    pub currency_name: String,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub thank_you: String,
}

impl SenderConfig {
    pub fn builtin() -> Result<Self> {
        toml::from_str(DEFAULT_SENDER_TEMPLATE).map_err(|e| InvoiceError::Settings {
            path: PathBuf::from("sender.toml (built-in)"),
            reason: e.to_string(),
        })
    }
}

pub fn get_config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "invoice-editor", "app") {
        let config_dir = proj_dirs.config_dir();
        if !config_dir.exists() {
            fs::create_dir_all(config_dir).ok();
        }
        return config_dir.join("settings.toml");
    }
    PathBuf::from("settings.toml")
}

/// `Ok(None)` when no settings file has been written yet.
pub fn load_settings_from(path: &Path) -> Result<Option<AppSettings>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| InvoiceError::storage(path, e))?;
    let settings = toml::from_str(&content)
        .map_err(|e| InvoiceError::Settings { path: path.to_path_buf(), reason: e.to_string() })?;
    debug!(path = %path.display(), "settings loaded");
    Ok(Some(settings))
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<()> {
    let toml_str = toml::to_string_pretty(settings)
        .map_err(|e| InvoiceError::Settings { path: path.to_path_buf(), reason: e.to_string() })?;
    fs::write(path, toml_str).map_err(|e| InvoiceError::storage(path, e))?;
    info!(path = %path.display(), "settings saved");
    Ok(())
}

/// Reads `sender.toml` from the data root, writing the built-in profile
/// there first if it is missing.
pub fn load_sender_config(root: &Path) -> Result<SenderConfig> {
    let path = root.join("sender.toml");
    if path.exists() {
        let content = fs::read_to_string(&path).map_err(|e| InvoiceError::storage(&path, e))?;
        return toml::from_str(&content)
            .map_err(|e| InvoiceError::Settings { path: path.clone(), reason: e.to_string() });
    }
    info!(path = %path.display(), "seeding default sender profile");
    let default_sender = SenderConfig::builtin()?;
    fs::create_dir_all(root).map_err(|e| InvoiceError::storage(root, e))?;
    fs::write(&path, DEFAULT_SENDER_TEMPLATE).map_err(|e| InvoiceError::storage(&path, e))?;
    Ok(default_sender)
}

pub fn expand_home_dir(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(base_dirs) = BaseDirs::new() {
            let home = base_dirs.home_dir().to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{Orientation, PaperSize};

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "data_root = \"/srv/invoices\"\ncurrency = \"USD\"\n").unwrap();

        let settings = load_settings_from(&path).unwrap().unwrap();
        assert_eq!(settings.data_root, "/srv/invoices");
        assert_eq!(settings.currency, "USD");
        assert_eq!(settings.invoice_prefix, "FWT");
        assert_eq!(settings.autosave_secs, 30);
        assert_eq!(settings.export.paper, PaperSize::A4);
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut settings = AppSettings::default();
        settings.export.orientation = Orientation::Landscape;
        settings.due_days = 14;

        save_settings_to(&path, &settings).unwrap();
        assert_eq!(load_settings_from(&path).unwrap(), Some(settings));
    }

    #[test]
    fn missing_settings_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_settings_from(&dir.path().join("absent.toml")).unwrap(), None);
    }

    #[test]
    fn broken_settings_report_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "due_days = \"soon\"").unwrap();
        assert!(matches!(load_settings_from(&path), Err(InvoiceError::Settings { .. })));
    }

    #[test]
    fn sender_profile_is_written_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let sender = load_sender_config(dir.path()).unwrap();
        assert!(dir.path().join("sender.toml").exists());
        assert_eq!(sender, SenderConfig::builtin().unwrap());
        assert!(!sender.terms.is_empty());
    }

    #[test]
    fn home_dir_is_expanded() {
        if BaseDirs::new().is_none() {
            return;
        }
        let expanded = expand_home_dir("~/Invoices");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("Invoices"));
        assert_eq!(expand_home_dir("/abs/path"), "/abs/path");
    }
}

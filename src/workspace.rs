use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::debug;

use crate::draft::{DraftStore, FileDraftStore};
use crate::error::{InvoiceError, Result};
use crate::export::Exporter;
use crate::model::InvoiceData;
use crate::settings::{AppSettings, SenderConfig, load_sender_config};

/// Everything rooted at the configured data directory: the draft, the
/// sender profile, templates and exported documents.
pub struct Workspace {
    pub settings: AppSettings,
    pub sender: SenderConfig,
    pub store: FileDraftStore,
    pub exporter: Exporter,
}

impl Workspace {
    pub fn open(settings: AppSettings) -> Result<Self> {
        let root = settings.root();
        Self::open_at(settings, root)
    }

    pub fn open_at(settings: AppSettings, root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).map_err(|e| InvoiceError::storage(&root, e))?;
        let sender = load_sender_config(&root)?;
        let store = FileDraftStore::new(&root);
        let exporter = Exporter::new(root.clone(), settings.export.clone(), settings.currency.clone());
        debug!(root = %root.display(), "workspace opened");
        Ok(Workspace { settings, sender, store, exporter })
    }

    pub fn seed(&self, today: NaiveDate) -> InvoiceData {
        InvoiceData::seed(&self.settings.invoice_prefix, today, self.settings.due_days)
    }

    /// The saved draft, or the seed invoice when nothing is saved yet.
    pub fn current_invoice(&self, today: NaiveDate) -> Result<InvoiceData> {
        Ok(self.store.load()?.unwrap_or_else(|| self.seed(today)))
    }

    pub fn commit(&self, data: &InvoiceData) -> Result<()> {
        self.store.save(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    #[test]
    fn fresh_workspace_starts_from_seed() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open_at(AppSettings::default(), dir.path().join("data")).unwrap();

        let inv = ws.current_invoice(today()).unwrap();
        assert_eq!(inv.invoice_number, "FWT-001");
        assert_eq!(inv.items.len(), 1);
        assert!(dir.path().join("data").join("sender.toml").exists());
    }

    #[test]
    fn committed_invoice_is_current() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open_at(AppSettings::default(), dir.path().to_path_buf()).unwrap();

        let mut inv = ws.seed(today());
        inv.client_name = "Acme".into();
        inv.add_item();
        ws.commit(&inv).unwrap();
        assert_eq!(ws.current_invoice(today()).unwrap(), inv);
    }

    #[test]
    fn seed_uses_configured_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings { invoice_prefix: "INV".into(), due_days: 14, ..AppSettings::default() };
        let ws = Workspace::open_at(settings, dir.path().to_path_buf()).unwrap();

        let inv = ws.seed(today());
        assert_eq!(inv.invoice_number, "INV-001");
        assert_eq!(inv.due_date, NaiveDate::from_ymd_opt(2026, 10, 29).unwrap());
    }
}

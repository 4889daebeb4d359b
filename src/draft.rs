//! Draft persistence: one named key holding the whole invoice as JSON,
//! plus the periodic autosave policy.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::error::{InvoiceError, Result};
use crate::model::InvoiceData;

pub const DRAFT_KEY: &str = "fw_invoice_draft";

pub trait DraftStore {
    /// Overwrites the stored draft.
    fn save(&self, data: &InvoiceData) -> Result<()>;

    /// `Ok(None)` when nothing has been saved yet. A snapshot that does
    /// not parse or fails validation is an error, never a partial value.
    fn load(&self) -> Result<Option<InvoiceData>>;
}

/// Stores the draft as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    path: PathBuf,
}

impl FileDraftStore {
    pub fn new(dir: &Path) -> Self {
        FileDraftStore { path: dir.join(format!("{DRAFT_KEY}.json")) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DraftStore for FileDraftStore {
    fn save(&self, data: &InvoiceData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| InvoiceError::storage(parent, e))?;
        }
        let json = serde_json::to_string_pretty(data)?;
        // Write beside the target and rename so a crash never leaves half a draft.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| InvoiceError::storage(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| InvoiceError::storage(&self.path, e))?;
        debug!(path = %self.path.display(), items = data.items.len(), "draft written");
        Ok(())
    }

    fn load(&self) -> Result<Option<InvoiceData>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(InvoiceError::storage(&self.path, e)),
        };
        let data: InvoiceData = serde_json::from_str(&content)?;
        data.validate()?;
        debug!(path = %self.path.display(), number = %data.invoice_number, "draft read");
        Ok(Some(data))
    }
}

/// Saves the invoice every `interval` while it has content worth keeping.
#[derive(Debug)]
pub struct Autosave {
    interval: Duration,
    last_tick: Instant,
    last_saved: Option<DateTime<Local>>,
}

pub enum AutosaveOutcome {
    Saved(DateTime<Local>),
    Failed(InvoiceError),
}

impl Autosave {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Autosave { interval, last_tick: now, last_saved: None }
    }

    pub fn last_saved(&self) -> Option<DateTime<Local>> {
        self.last_saved
    }

    pub fn mark_saved(&mut self, at: DateTime<Local>) {
        self.last_saved = Some(at);
    }

    /// Time left until the next tick, for scheduling a repaint.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.interval.saturating_sub(now.saturating_duration_since(self.last_tick))
    }

    /// Returns `None` between ticks and on ticks where the invoice is
    /// still empty.
    pub fn poll(&mut self, now: Instant, data: &InvoiceData, store: &dyn DraftStore) -> Option<AutosaveOutcome> {
        if now.saturating_duration_since(self.last_tick) < self.interval {
            return None;
        }
        self.last_tick = now;
        if !data.has_content() {
            return None;
        }
        match store.save(data) {
            Ok(()) => {
                let at = Local::now();
                self.last_saved = Some(at);
                info!(number = %data.invoice_number, "autosaved draft");
                Some(AutosaveOutcome::Saved(at))
            }
            Err(e) => {
                warn!(error = %e, "autosave failed");
                Some(AutosaveOutcome::Failed(e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::cell::Cell;

    /// A store whose writes always fail, counting attempts.
    #[derive(Default)]
    pub(crate) struct BrokenStore {
        pub attempts: Cell<u32>,
    }

    impl DraftStore for BrokenStore {
        fn save(&self, _data: &InvoiceData) -> Result<()> {
            self.attempts.set(self.attempts.get() + 1);
            Err(InvoiceError::storage(
                "/unavailable",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "quota exceeded"),
            ))
        }

        fn load(&self) -> Result<Option<InvoiceData>> {
            Err(InvoiceError::storage(
                "/unavailable",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "storage disabled"),
            ))
        }
    }

    pub(crate) fn sample_invoice() -> InvoiceData {
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let mut inv = InvoiceData::seed("FWT", today, 30);
        inv.client_name = "Meilleur Trading Group".into();
        inv.client_type = "Trading & Commerce".into();
        inv.client_location = "Dar es Salaam, Tanzania".into();
        inv.items[0].description = "Website Development & Hosting Services".into();
        inv.items[0].details = "Design, development, deployment\nand annual hosting".into();
        inv.items[0].rate = 300000.0;
        let id = inv.add_item();
        inv.items.iter_mut().find(|i| i.id == id).unwrap().quantity = 2.5;
        inv.tax_rate = 18.0;
        inv
    }

    #[test]
    fn save_then_load_reproduces_the_invoice() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path());
        let inv = sample_invoice();

        store.save(&inv).unwrap();
        assert_eq!(store.load().unwrap(), Some(inv));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn load_without_draft_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(FileDraftStore::new(dir.path()).load().unwrap(), None);
    }

    #[test]
    fn save_overwrites_previous_draft() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path());
        let mut inv = sample_invoice();
        store.save(&inv).unwrap();
        inv.client_name = "Second Client".into();
        store.save(&inv).unwrap();
        assert_eq!(store.load().unwrap().unwrap().client_name, "Second Client");
    }

    #[test]
    fn corrupt_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path());
        fs::write(store.path(), "{\"invoiceNumber\": \"FWT-001\", ").unwrap();
        assert!(matches!(store.load(), Err(InvoiceError::CorruptDraft(_))));

        fs::write(store.path(), "{\"invoiceNumber\": 7}").unwrap();
        assert!(matches!(store.load(), Err(InvoiceError::CorruptDraft(_))));
    }

    #[test]
    fn schema_violations_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path());
        let snapshot = r#"{
            "invoiceNumber": "FWT-003",
            "date": "2026-10-15",
            "dueDate": "2026-11-14",
            "clientName": "Acme",
            "clientType": "",
            "clientLocation": "",
            "items": [
                {"id": "1", "description": "a", "details": "", "quantity": 1, "rate": 5},
                {"id": "1", "description": "b", "details": "", "quantity": 1, "rate": 5}
            ],
            "taxRate": 0
        }"#;
        fs::write(store.path(), snapshot).unwrap();
        assert!(matches!(store.load(), Err(InvoiceError::InvalidDraft(_))));
    }

    #[test]
    fn browser_era_snapshot_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path());
        let snapshot = r#"{"invoiceNumber":"FWT-001","date":"2026-10-15","dueDate":"2026-11-14",
            "clientName":"Meilleur Trading Group","clientType":"Trading & Commerce",
            "clientLocation":"Dar es Salaam, Tanzania",
            "items":[{"id":"1","description":"Website","details":"","quantity":1,"rate":300000}],
            "taxRate":0}"#;
        fs::write(store.path(), snapshot).unwrap();
        let inv = store.load().unwrap().unwrap();
        assert_eq!(inv.items[0].id, "1");
        assert_eq!(inv.total(), 300000.0);
    }

    #[test]
    fn autosave_waits_for_the_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path());
        let start = Instant::now();
        let mut autosave = Autosave::new(Duration::from_secs(30), start);
        let inv = sample_invoice();

        assert!(autosave.poll(start + Duration::from_secs(10), &inv, &store).is_none());
        assert!(store.load().unwrap().is_none());

        let outcome = autosave.poll(start + Duration::from_secs(30), &inv, &store);
        assert!(matches!(outcome, Some(AutosaveOutcome::Saved(_))));
        assert!(autosave.last_saved().is_some());
        assert_eq!(store.load().unwrap(), Some(inv.clone()));

        assert!(autosave.poll(start + Duration::from_secs(45), &inv, &store).is_none());
        assert_eq!(autosave.remaining(start + Duration::from_secs(45)), Duration::from_secs(15));
    }

    #[test]
    fn autosave_skips_empty_invoices() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path());
        let start = Instant::now();
        let mut autosave = Autosave::new(Duration::from_secs(30), start);
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let blank = InvoiceData::seed("FWT", today, 30);

        assert!(autosave.poll(start + Duration::from_secs(31), &blank, &store).is_none());
        assert!(store.load().unwrap().is_none());
        assert!(autosave.last_saved().is_none());
    }

    #[test]
    fn autosave_failure_is_reported_not_raised() {
        let store = BrokenStore::default();
        let start = Instant::now();
        let mut autosave = Autosave::new(Duration::from_secs(30), start);

        let outcome = autosave.poll(start + Duration::from_secs(30), &sample_invoice(), &store);
        assert!(matches!(outcome, Some(AutosaveOutcome::Failed(InvoiceError::Storage { .. }))));
        assert_eq!(store.attempts.get(), 1);
        assert!(autosave.last_saved().is_none());
    }
}

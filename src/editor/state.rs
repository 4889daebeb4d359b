use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::draft::{Autosave, AutosaveOutcome, DraftStore};
use crate::error::Result;
use crate::export::{Exporter, OutputFormat};
use crate::model::InvoiceData;
use crate::notice::Notice;
use crate::settings::SenderConfig;

const NOTICE_TTL: Duration = Duration::from_secs(4);
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Edit,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Load,
    Save,
    NewInvoice,
    ToggleMode,
    Print,
    DownloadPdf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Pdf,
    Print,
}

struct ExportJob {
    kind: JobKind,
    was_editing: bool,
    rx: Receiver<Result<PathBuf>>,
}

/// The editor session: the one invoice being edited plus its UI flags.
/// Owned by the window; nothing here touches egui.
pub struct EditorState {
    pub data: InvoiceData,
    pub mode: Mode,
    pub autosave: Autosave,
    pub confirm_reset: bool,
    pub date_input: String,
    pub due_input: String,
    due_days: u64,
    notices: Vec<(Notice, Instant)>,
    job: Option<ExportJob>,
}

impl EditorState {
    pub fn new(data: InvoiceData, due_days: u64, autosave_every: Duration, now: Instant) -> Self {
        let mut state = EditorState {
            date_input: String::new(),
            due_input: String::new(),
            data,
            mode: Mode::Edit,
            autosave: Autosave::new(autosave_every, now),
            confirm_reset: false,
            due_days,
            notices: Vec::new(),
            job: None,
        };
        state.sync_date_inputs();
        state
    }

    pub fn is_editing(&self) -> bool {
        self.mode == Mode::Edit
    }

    pub fn is_generating(&self) -> bool {
        self.job.is_some()
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            Mode::Edit => Mode::Preview,
            Mode::Preview => Mode::Edit,
        };
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push((notice, Instant::now()));
    }

    /// Drops expired notices and returns the rest, oldest first.
    pub fn active_notices(&mut self, now: Instant) -> Vec<Notice> {
        self.notices.retain(|(_, at)| now.saturating_duration_since(*at) < NOTICE_TTL);
        self.notices.iter().map(|(n, _)| n.clone()).collect()
    }

    fn sync_date_inputs(&mut self) {
        self.date_input = self.data.date.format(DATE_FORMAT).to_string();
        self.due_input = self.data.due_date.format(DATE_FORMAT).to_string();
    }

    /// Applies the date text fields once they hold a valid date.
    pub fn apply_date_inputs(&mut self) {
        if let Ok(d) = NaiveDate::parse_from_str(self.date_input.trim(), DATE_FORMAT) {
            self.data.date = d;
        }
        if let Ok(d) = NaiveDate::parse_from_str(self.due_input.trim(), DATE_FORMAT) {
            self.data.due_date = d;
        }
    }

    pub fn save(&mut self, store: &dyn DraftStore) {
        match store.save(&self.data) {
            Ok(()) => {
                self.autosave.mark_saved(Local::now());
                info!(number = %self.data.invoice_number, "draft saved");
                self.notify(Notice::success(
                    "Invoice saved!",
                    "Your invoice has been saved to local storage.",
                ));
            }
            Err(e) => {
                warn!(error = %e, "save failed");
                self.notify(Notice::error("Failed to save invoice", "Please try again."));
            }
        }
    }

    /// Replaces the invoice with the saved draft. On any failure the
    /// current invoice stays as it is.
    pub fn load(&mut self, store: &dyn DraftStore) {
        match store.load() {
            Ok(Some(data)) => {
                self.data = data;
                self.sync_date_inputs();
                self.notify(Notice::success("Invoice loaded!", "Your saved invoice has been restored."));
            }
            Ok(None) => {
                self.notify(Notice::info("No saved invoice found", "Create and save an invoice first."));
            }
            Err(e) => {
                warn!(error = %e, "load failed");
                self.notify(Notice::error("Failed to load invoice", "Please try again."));
            }
        }
    }

    pub fn reset(&mut self, today: NaiveDate) {
        match self.data.reset_invoice(today, self.due_days) {
            Ok(()) => {
                self.sync_date_inputs();
                self.mode = Mode::Edit;
                let number = self.data.invoice_number.clone();
                self.notify(Notice::success("New invoice created", format!("Invoice number: {number}")));
            }
            Err(e) => {
                warn!(error = %e, "reset refused");
                self.notify(Notice::error("Could not start a new invoice", e.to_string()));
            }
        }
    }

    pub fn poll_autosave(&mut self, now: Instant, store: &dyn DraftStore) {
        match self.autosave.poll(now, &self.data, store) {
            Some(AutosaveOutcome::Saved(at)) => debug!(at = %at.format("%H:%M:%S"), "autosave tick"),
            Some(AutosaveOutcome::Failed(e)) => self.notify(Notice::error("Autosave failed", e.to_string())),
            None => {}
        }
    }

    /// Starts a PDF or print job on a worker thread. Editing controls are
    /// hidden until [`EditorState::poll_job`] sees it finish. Returns
    /// `false` if a job is already running.
    pub fn start_job(
        &mut self,
        kind: JobKind,
        exporter: Exporter,
        sender: SenderConfig,
        today: NaiveDate,
    ) -> bool {
        if self.job.is_some() {
            return false;
        }
        self.apply_date_inputs();
        let was_editing = self.is_editing();
        self.mode = Mode::Preview;

        let data = self.data.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = match kind {
                JobKind::Pdf => exporter.export(&data, &sender, OutputFormat::Pdf, today),
                JobKind::Print => exporter.print(&data, &sender, today),
            };
            let _ = tx.send(result);
        });

        self.job = Some(ExportJob { kind, was_editing, rx });
        true
    }

    /// Collects a finished job, reports it, and restores edit mode if the
    /// job started from it.
    pub fn poll_job(&mut self) {
        let Some(job) = &self.job else {
            return;
        };
        let outcome = match job.rx.try_recv() {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => Err("export worker stopped unexpectedly".to_string()),
        };
        let Some(job) = self.job.take() else {
            return;
        };
        if job.was_editing {
            self.mode = Mode::Edit;
        }

        let notice = match (job.kind, outcome) {
            (JobKind::Pdf, Ok(path)) => {
                let name =
                    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                Notice::success("PDF downloaded successfully!", format!("Saved as {name}"))
            }
            (JobKind::Print, Ok(_)) => Notice::info(
                "Print view opened",
                "Use the viewer's print settings to save as PDF or print to paper.",
            ),
            (JobKind::Pdf, Err(e)) => {
                warn!(error = %e, "PDF generation failed");
                Notice::error(
                    "Failed to generate PDF",
                    "Please try using the Print button instead (Ctrl+P)",
                )
            }
            (JobKind::Print, Err(e)) => {
                warn!(error = %e, "print failed");
                Notice::error("Failed to open print view", e)
            }
        };
        self.notify(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::FileDraftStore;
    use crate::draft::tests::{BrokenStore, sample_invoice};
    use crate::export::ExportOptions;
    use crate::export::tests::{FakeCompiler, FakeOpener};
    use crate::notice::Level;
    use std::sync::Arc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    fn state_with(data: InvoiceData) -> EditorState {
        EditorState::new(data, 30, Duration::from_secs(30), Instant::now())
    }

    fn fake_exporter(root: &std::path::Path) -> Exporter {
        Exporter::with_compiler(
            root.to_path_buf(),
            ExportOptions::default(),
            "TZS".into(),
            Arc::new(FakeCompiler::default()),
        )
    }

    fn wait_for_job(state: &mut EditorState) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while state.is_generating() && Instant::now() < deadline {
            state.poll_job();
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn last_notice(state: &mut EditorState) -> Notice {
        state.active_notices(Instant::now()).pop().unwrap()
    }

    #[test]
    fn toggle_switches_between_edit_and_preview() {
        let mut state = state_with(sample_invoice());
        assert!(state.is_editing());
        state.toggle_mode();
        assert_eq!(state.mode, Mode::Preview);
        state.toggle_mode();
        assert_eq!(state.mode, Mode::Edit);
    }

    #[test]
    fn save_records_timestamp_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path());
        let mut state = state_with(sample_invoice());

        state.save(&store);
        assert!(state.autosave.last_saved().is_some());
        assert_eq!(last_notice(&mut state).level, Level::Success);
        assert_eq!(store.load().unwrap(), Some(state.data.clone()));
    }

    #[test]
    fn failed_load_keeps_current_invoice() {
        let mut state = state_with(sample_invoice());
        let before = state.data.clone();

        state.load(&BrokenStore::default());
        assert_eq!(state.data, before);
        assert_eq!(last_notice(&mut state).level, Level::Error);
    }

    #[test]
    fn corrupt_draft_is_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path());
        std::fs::write(store.path(), "{\"invoiceNumber\": \"FWT-009\", \"items\": [").unwrap();
        let mut state = state_with(sample_invoice());
        let before = state.data.clone();

        state.load(&store);
        assert_eq!(state.data, before);
        assert_eq!(last_notice(&mut state).title, "Failed to load invoice");
    }

    #[test]
    fn load_without_draft_informs() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_with(sample_invoice());
        state.load(&FileDraftStore::new(dir.path()));
        assert_eq!(last_notice(&mut state).level, Level::Info);
    }

    #[test]
    fn load_refreshes_date_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path());
        let mut saved = sample_invoice();
        saved.date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        store.save(&saved).unwrap();

        let mut state = state_with(sample_invoice());
        state.load(&store);
        assert_eq!(state.date_input, "2026-03-01");
        assert_eq!(state.data, saved);
    }

    #[test]
    fn reset_moves_to_next_number_in_edit_mode() {
        let mut state = state_with(sample_invoice());
        state.data.invoice_number = "FWT-099".into();
        state.mode = Mode::Preview;

        state.reset(today());
        assert_eq!(state.data.invoice_number, "FWT-100");
        assert!(state.is_editing());
        assert_eq!(state.due_input, "2026-11-14");
        assert_eq!(last_notice(&mut state).description, "Invoice number: FWT-100");
    }

    #[test]
    fn reset_with_malformed_number_reports() {
        let mut state = state_with(sample_invoice());
        state.data.invoice_number = "DRAFT".into();
        let before = state.data.clone();

        state.reset(today());
        assert_eq!(state.data, before);
        assert_eq!(last_notice(&mut state).level, Level::Error);
    }

    #[test]
    fn invalid_date_text_is_ignored() {
        let mut state = state_with(sample_invoice());
        let before = state.data.date;
        state.date_input = "15/10/2026".into();
        state.due_input = "2026-12-01".into();
        state.apply_date_inputs();
        assert_eq!(state.data.date, before);
        assert_eq!(state.data.due_date, NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
    }

    #[test]
    fn autosave_failure_becomes_a_notice() {
        let mut state = state_with(sample_invoice());
        let later = Instant::now() + Duration::from_secs(31);
        state.poll_autosave(later, &BrokenStore::default());
        assert_eq!(last_notice(&mut state).title, "Autosave failed");
    }

    #[test]
    fn pdf_job_hides_and_restores_edit_mode() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = fake_exporter(dir.path());
        let sender = SenderConfig::builtin().unwrap();
        let mut state = state_with(sample_invoice());

        assert!(state.start_job(JobKind::Pdf, exporter.clone(), sender.clone(), today()));
        assert_eq!(state.mode, Mode::Preview);
        assert!(!state.start_job(JobKind::Pdf, exporter, sender, today()));

        wait_for_job(&mut state);
        assert!(!state.is_generating());
        assert!(state.is_editing());
        let notice = last_notice(&mut state);
        assert_eq!(notice.level, Level::Success);
        assert!(notice.description.ends_with("_2026-10-15.pdf"));
    }

    #[test]
    fn failed_pdf_job_still_restores_edit_mode() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = FakeCompiler { fail_with: Some("typst missing".into()), ..Default::default() };
        let exporter = Exporter::with_compiler(
            dir.path().to_path_buf(),
            ExportOptions::default(),
            "TZS".into(),
            Arc::new(compiler),
        );
        let mut state = state_with(sample_invoice());

        state.start_job(JobKind::Pdf, exporter, SenderConfig::builtin().unwrap(), today());
        wait_for_job(&mut state);
        assert!(state.is_editing());
        let notice = last_notice(&mut state);
        assert_eq!(notice.level, Level::Error);
        assert!(notice.description.contains("Print"));
    }

    #[test]
    fn job_started_from_preview_stays_in_preview() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = fake_exporter(dir.path());
        let mut state = state_with(sample_invoice());
        state.mode = Mode::Preview;

        state.start_job(JobKind::Pdf, exporter, SenderConfig::builtin().unwrap(), today());
        wait_for_job(&mut state);
        assert_eq!(state.mode, Mode::Preview);
    }

    #[test]
    fn print_job_opens_viewer_and_restores_edit_mode() {
        let dir = tempfile::tempdir().unwrap();
        let opener = Arc::new(FakeOpener::default());
        let exporter = fake_exporter(dir.path()).with_opener(opener.clone());
        let mut state = state_with(sample_invoice());

        assert!(state.start_job(JobKind::Print, exporter, SenderConfig::builtin().unwrap(), today()));
        assert_eq!(state.mode, Mode::Preview);

        wait_for_job(&mut state);
        assert!(state.is_editing());
        let notice = last_notice(&mut state);
        assert_eq!(notice.level, Level::Info);
        assert_eq!(notice.title, "Print view opened");
        let opened = opener.opened.lock().unwrap();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].to_string_lossy().ends_with("_2026-10-15.pdf"));
    }

    #[test]
    fn failed_print_job_reports_and_restores_edit_mode() {
        let dir = tempfile::tempdir().unwrap();
        let opener = Arc::new(FakeOpener { fail: true, ..Default::default() });
        let exporter = fake_exporter(dir.path()).with_opener(opener);
        let mut state = state_with(sample_invoice());

        state.start_job(JobKind::Print, exporter, SenderConfig::builtin().unwrap(), today());
        wait_for_job(&mut state);
        assert!(state.is_editing());
        let notice = last_notice(&mut state);
        assert_eq!(notice.level, Level::Error);
        assert_eq!(notice.title, "Failed to open print view");
        assert!(notice.description.contains("viewer"));
    }
}

use std::time::{Duration, Instant};

use anyhow::anyhow;
use chrono::Local;
use eframe::egui::{self, Color32, RichText};
use tracing::info;

use super::state::{Action, EditorState, JobKind};
use crate::draft::FileDraftStore;
use crate::export::{Exporter, long_date};
use crate::model::{InvoiceData, ItemUpdate, format_amount, format_currency};
use crate::notice::{Level, Notice};
use crate::settings::SenderConfig;
use crate::workspace::Workspace;

const SHORTCUTS: [(egui::Key, Action); 3] = [
    (egui::Key::S, Action::Save),
    (egui::Key::P, Action::Print),
    (egui::Key::E, Action::ToggleMode),
];

const MUTED: Color32 = Color32::from_rgb(107, 114, 128);
const SUCCESS: Color32 = Color32::from_rgb(4, 120, 87);
const FAILURE: Color32 = Color32::from_rgb(185, 28, 28);

pub fn run(workspace: Workspace, data: InvoiceData) -> anyhow::Result<()> {
    let autosave_every = Duration::from_secs(workspace.settings.autosave_secs.max(1));
    let app = EditorApp {
        state: EditorState::new(data, workspace.settings.due_days, autosave_every, Instant::now()),
        currency: workspace.settings.currency.clone(),
        autosave_secs: workspace.settings.autosave_secs,
        store: workspace.store,
        exporter: workspace.exporter,
        sender: workspace.sender,
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([980.0, 900.0])
            .with_title("Invoice Generator"),
        ..Default::default()
    };

    info!("opening editor window");
    eframe::run_native("Invoice Generator", options, Box::new(move |_cc| Ok(Box::new(app))))
        .map_err(|e| anyhow!("editor window failed: {e}"))
}

struct EditorApp {
    state: EditorState,
    store: FileDraftStore,
    exporter: Exporter,
    sender: SenderConfig,
    currency: String,
    autosave_secs: u64,
}

impl EditorApp {
    fn dispatch(&mut self, action: Action) {
        let today = Local::now().date_naive();
        match action {
            Action::Load => self.state.load(&self.store),
            Action::Save => {
                self.state.apply_date_inputs();
                self.state.save(&self.store);
            }
            Action::NewInvoice => self.state.confirm_reset = true,
            Action::ToggleMode => {
                self.state.apply_date_inputs();
                self.state.toggle_mode();
            }
            Action::Print => {
                self.state.start_job(JobKind::Print, self.exporter.clone(), self.sender.clone(), today);
            }
            Action::DownloadPdf => {
                self.state.start_job(JobKind::Pdf, self.exporter.clone(), self.sender.clone(), today);
            }
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        for (key, action) in SHORTCUTS {
            if ctx.input_mut(|i| i.consume_key(egui::Modifiers::COMMAND, key)) {
                self.dispatch(action);
            }
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) -> Option<Action> {
        let mut action = None;
        ui.horizontal(|ui| {
            ui.heading("Invoice Generator");
            if let Some(at) = self.state.autosave.last_saved() {
                ui.label(RichText::new(format!("Last saved: {}", at.format("%H:%M:%S"))).small().color(MUTED));
            }
        });
        ui.horizontal(|ui| {
            if ui.button("📂 Load").clicked() {
                action = Some(Action::Load);
            }
            if ui.button("💾 Save").clicked() {
                action = Some(Action::Save);
            }
            if ui.button("📄 New Invoice").clicked() {
                action = Some(Action::NewInvoice);
            }
            let toggle = if self.state.is_editing() { "👁 Preview" } else { "✏ Edit" };
            if ui.button(toggle).clicked() {
                action = Some(Action::ToggleMode);
            }
            if ui.button("🖨 Print").clicked() {
                action = Some(Action::Print);
            }
            let generating = self.state.is_generating();
            let label = if generating { "Generating..." } else { "⬇ Download PDF" };
            if ui.add_enabled(!generating, egui::Button::new(label)).clicked() {
                action = Some(Action::DownloadPdf);
            }
        });
        ui.label(
            RichText::new(format!(
                "Fill in details • Auto-saves every {}s • \
                 Shortcuts: Ctrl+S (Save), Ctrl+E (Edit), Ctrl+P (Print)",
                self.autosave_secs
            ))
            .small()
            .color(MUTED),
        );
        action
    }

    fn header(&mut self, ui: &mut egui::Ui) {
        let editing = self.state.is_editing();
        ui.columns(2, |cols| {
            cols[0].label(RichText::new(&self.sender.name).size(22.0).strong());
            cols[0].label(RichText::new(&self.sender.tagline).color(MUTED));

            cols[1].with_layout(egui::Layout::top_down(egui::Align::Max), |ui| {
                ui.label(RichText::new("INVOICE").size(26.0).strong());
                if editing {
                    ui.add(egui::TextEdit::singleline(&mut self.state.data.invoice_number).desired_width(120.0));
                } else {
                    ui.label(&self.state.data.invoice_number);
                }
            });
        });

        ui.add_space(16.0);
        ui.columns(2, |cols| {
            cols[0].label(RichText::new("Bill To").strong());
            let data = &mut self.state.data;
            if editing {
                cols[0].add(egui::TextEdit::singleline(&mut data.client_name).hint_text("Client name"));
                cols[0].add(egui::TextEdit::singleline(&mut data.client_type).hint_text("Client type"));
                cols[0].add(egui::TextEdit::singleline(&mut data.client_location).hint_text("Location"));
            } else {
                cols[0].label(&data.client_name);
                cols[0].label(RichText::new(&data.client_type).color(MUTED));
                cols[0].label(RichText::new(&data.client_location).color(MUTED));
            }

            cols[1].with_layout(egui::Layout::top_down(egui::Align::Max), |ui| {
                if editing {
                    ui.horizontal(|ui| {
                        ui.add(egui::TextEdit::singleline(&mut self.state.date_input).desired_width(100.0));
                        ui.label("Invoice Date:");
                    });
                    ui.horizontal(|ui| {
                        ui.add(egui::TextEdit::singleline(&mut self.state.due_input).desired_width(100.0));
                        ui.label("Due Date:");
                    });
                } else {
                    ui.label(format!("Invoice Date: {}", long_date(self.state.data.date)));
                    ui.label(format!("Due Date: {}", long_date(self.state.data.due_date)));
                }
            });
        });
        if editing {
            self.state.apply_date_inputs();
        }
    }

    fn items(&mut self, ui: &mut egui::Ui) {
        let editing = self.state.is_editing();
        let removable = self.state.data.items.len() > 1;
        let currency = self.currency.as_str();
        let mut updates: Vec<(String, ItemUpdate)> = Vec::new();
        let mut remove: Option<String> = None;

        egui::Grid::new("invoice_items")
            .num_columns(5)
            .spacing([16.0, 10.0])
            .striped(true)
            .show(ui, |ui| {
                ui.label(RichText::new("Description").strong());
                ui.label(RichText::new("Qty").strong());
                ui.label(RichText::new("Rate").strong());
                ui.label(RichText::new("Amount").strong());
                ui.label("");
                ui.end_row();

                for item in &self.state.data.items {
                    if editing {
                        ui.vertical(|ui| {
                            let mut description = item.description.clone();
                            let field = egui::TextEdit::singleline(&mut description)
                                .hint_text("Item description")
                                .desired_width(360.0);
                            if ui.add(field).changed() {
                                updates.push((item.id.clone(), ItemUpdate::Description(description)));
                            }
                            let mut details = item.details.clone();
                            let field = egui::TextEdit::multiline(&mut details)
                                .hint_text("Details")
                                .desired_rows(2)
                                .desired_width(360.0);
                            if ui.add(field).changed() {
                                updates.push((item.id.clone(), ItemUpdate::Details(details)));
                            }
                        });

                        let mut quantity = item.quantity;
                        if ui.add(egui::DragValue::new(&mut quantity).range(0.0..=f64::MAX).speed(0.1)).changed() {
                            updates.push((item.id.clone(), ItemUpdate::Quantity(quantity)));
                        }
                        let mut rate = item.rate;
                        if ui.add(egui::DragValue::new(&mut rate).range(0.0..=f64::MAX).speed(100.0)).changed() {
                            updates.push((item.id.clone(), ItemUpdate::Rate(rate)));
                        }
                    } else {
                        ui.vertical(|ui| {
                            ui.label(RichText::new(&item.description).strong());
                            if !item.details.is_empty() {
                                ui.label(RichText::new(&item.details).small().color(MUTED));
                            }
                        });
                        ui.label(format_amount(item.quantity));
                        ui.label(format_currency(item.rate, currency));
                    }

                    ui.label(format_currency(item.amount(), currency));
                    if editing && removable {
                        if ui.small_button("🗑").on_hover_text("Remove item").clicked() {
                            remove = Some(item.id.clone());
                        }
                    } else {
                        ui.label("");
                    }
                    ui.end_row();
                }
            });

        for (id, update) in updates {
            self.state.data.update_item(&id, update);
        }
        if let Some(id) = remove {
            if let Err(e) = self.state.data.remove_item(&id) {
                self.state.notify(Notice::error("Cannot remove item", e.to_string()));
            }
        }

        let add = egui::Button::new("➕ Add Item").min_size(egui::vec2(ui.available_width(), 28.0));
        if editing && ui.add(add).clicked() {
            self.state.data.add_item();
        }
    }

    fn totals(&mut self, ui: &mut egui::Ui) {
        let editing = self.state.is_editing();
        let currency = self.currency.clone();
        let totals = self.state.data.totals();

        ui.with_layout(egui::Layout::top_down(egui::Align::Max), |ui| {
            egui::Grid::new("invoice_totals").num_columns(2).spacing([24.0, 8.0]).show(ui, |ui| {
                ui.label("Subtotal:");
                ui.label(format_currency(totals.subtotal, &currency));
                ui.end_row();

                ui.horizontal(|ui| {
                    ui.label("Tax (");
                    if editing {
                        // Loaded rates above 100 are shown as-is until edited.
                        let rate = egui::DragValue::new(&mut self.state.data.tax_rate)
                            .range(0.0..=100.0)
                            .clamp_existing_to_range(false)
                            .speed(0.5);
                        ui.add(rate);
                    } else {
                        ui.label(format_amount(self.state.data.tax_rate));
                    }
                    ui.label("%):");
                });
                ui.label(format_currency(totals.tax, &currency));
                ui.end_row();

                ui.label(RichText::new("Total:").size(18.0).strong());
                ui.label(RichText::new(format_currency(totals.total, &currency)).size(18.0).strong());
                ui.end_row();
            });
        });
    }

    fn footer(&self, ui: &mut egui::Ui) {
        let sender = &self.sender;
        ui.columns(2, |cols| {
            cols[0].label(RichText::new("Payment Information").size(16.0).strong());
            cols[0].label(format!("Bank: {}", sender.bank));
            cols[0].label(format!("Account Name: {}", sender.account_name));
            cols[0].label(format!("Account Number: {}", sender.account_number));
            cols[0].label(format!("Currency: {}", sender.currency_name));

            cols[1].label(RichText::new("Terms & Conditions").size(16.0).strong());
            for term in &sender.terms {
                cols[1].label(RichText::new(format!("• {term}")).small().color(MUTED));
            }
        });
        ui.add_space(24.0);
        ui.vertical_centered(|ui| {
            ui.label(RichText::new(&sender.thank_you).small().color(MUTED));
            ui.label(
                RichText::new(format!("This invoice was generated on {}", long_date(Local::now().date_naive())))
                    .small()
                    .color(MUTED),
            );
        });
    }

    fn confirm_reset_dialog(&mut self, ctx: &egui::Context) {
        if !self.state.confirm_reset {
            return;
        }
        let mut decision = None;
        egui::Window::new("New invoice")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label("Are you sure you want to create a new invoice? All current data will be cleared.");
                ui.horizontal(|ui| {
                    if ui.button("Create new invoice").clicked() {
                        decision = Some(true);
                    }
                    if ui.button("Cancel").clicked() {
                        decision = Some(false);
                    }
                });
            });
        if let Some(confirmed) = decision {
            self.state.confirm_reset = false;
            if confirmed {
                self.state.reset(Local::now().date_naive());
            }
        }
    }

    fn notices(&mut self, ctx: &egui::Context) {
        let notices = self.state.active_notices(Instant::now());
        if notices.is_empty() {
            return;
        }
        egui::Area::new(egui::Id::new("notices"))
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-16.0, -16.0))
            .show(ctx, |ui| {
                for notice in &notices {
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        let color = match notice.level {
                            Level::Success => SUCCESS,
                            Level::Info => MUTED,
                            Level::Error => FAILURE,
                        };
                        let title = format!("{} {}", notice.icon(), notice.title);
                        ui.label(RichText::new(title).strong().color(color));
                        if !notice.description.is_empty() {
                            ui.label(RichText::new(&notice.description).small());
                        }
                    });
                    ui.add_space(6.0);
                }
            });
    }
}

impl eframe::App for EditorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.handle_shortcuts(ctx);
        self.state.poll_autosave(now, &self.store);
        self.state.poll_job();

        let mut action = None;
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.add_space(6.0);
            action = self.toolbar(ui);
            ui.add_space(6.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.header(ui);
                ui.add_space(24.0);
                self.items(ui);
                ui.add_space(24.0);
                self.totals(ui);
                ui.add_space(32.0);
                ui.separator();
                self.footer(ui);
            });
        });

        if let Some(action) = action {
            self.dispatch(action);
        }
        self.confirm_reset_dialog(ctx);
        self.notices(ctx);

        let wake = if self.state.is_generating() {
            Duration::from_millis(100)
        } else {
            self.state.autosave.remaining(now).min(Duration::from_secs(1))
        };
        ctx.request_repaint_after(wake);
    }
}

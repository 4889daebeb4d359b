mod draft;
mod editor;
mod error;
mod export;
mod model;
mod notice;
mod settings;
mod workspace;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table};
use inquire::{Confirm, DateSelect, Select, Text};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::error::InvoiceError;
use crate::export::{OutputFormat, open_path, reveal};
use crate::model::{InvoiceData, ItemUpdate, format_amount, format_currency, parse_amount};
use crate::notice::Notice;
use crate::settings::{AppSettings, get_config_path, load_settings_from, save_settings_to};
use crate::workspace::Workspace;

// ==========================================
// Structs & Enums
// ==========================================

#[derive(Parser)]
#[command(name = "invoice-editor", about = "Edit, preview and export a single invoice")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the editor window (default)
    Edit,
    /// Show the current draft
    Show,
    /// Start a new invoice with the next number
    New {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Edit invoice number, dates, client and tax interactively
    Details,
    /// Append a line item (prompts when no description is given)
    AddItem {
        description: Option<String>,
        #[arg(long, default_value = "")]
        details: String,
        #[arg(long, default_value_t = 1.0, value_parser = non_negative)]
        quantity: f64,
        #[arg(long, default_value_t = 0.0, value_parser = non_negative)]
        rate: f64,
    },
    /// Remove a line item (pick from a list when no id is given)
    RemoveItem { id: Option<String> },
    /// Replace one field (description, details, quantity, rate) of a line item
    UpdateItem { id: String, field: String, value: String },
    /// Set the tax rate in percent
    Tax {
        #[arg(value_parser = non_negative)]
        rate: f64,
    },
    /// Export the draft to output/<year>/
    Export {
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Render a PDF and open it for printing
    Print,
    /// Configure data directory, currency and numbering
    Config,
    /// Open output folder
    Open,
}

fn non_negative(s: &str) -> Result<f64, String> {
    parse_amount("value", s).map_err(|e| e.to_string())
}

// ==========================================
// Main Function
// ==========================================

fn main() {
    let cli = Cli::parse();

    // 1. Initialize configuration
    let (settings, just_configured) = match load_settings_from(&get_config_path()) {
        Ok(Some(settings)) => (settings, false),
        Ok(None) => match setup_config_wizard() {
            Ok(settings) => (settings, true),
            Err(e) => {
                eprintln!("❌ Error: {e:#}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("❌ Error: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(settings.log_level.as_deref());

    if let Err(e) = run(cli, settings, just_configured) {
        eprintln!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(level: Option<&str>) {
    // RUST_LOG wins over settings.toml
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("warn")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// `config` right after first-run setup has nothing left to ask.
fn wants_config_wizard(command: &Commands, just_configured: bool) -> bool {
    matches!(command, Commands::Config) && !just_configured
}

fn run(cli: Cli, settings: AppSettings, just_configured: bool) -> anyhow::Result<()> {
    let command = cli.command.unwrap_or(Commands::Edit);
    if let Commands::Config = command {
        if wants_config_wizard(&command, just_configured) {
            setup_config_wizard()?;
        }
        return Ok(());
    }

    let workspace = Workspace::open(settings).context("Failed to open data directory")?;
    let today = Local::now().date_naive();

    match command {
        Commands::Edit => {
            let data = match workspace.current_invoice(today) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "draft not restored");
                    println!("{}", Notice::error("Failed to load invoice", "Starting from a blank invoice."));
                    workspace.seed(today)
                }
            };
            editor::run(workspace, data)?;
        }
        Commands::Show => {
            let inv = load_draft(&workspace, today)?;
            print_invoice(&workspace, &inv);
        }
        Commands::New { yes } => {
            let mut inv = load_draft(&workspace, today)?;
            let confirmed = yes
                || Confirm::new("Are you sure you want to create a new invoice? All current data will be cleared.")
                    .with_default(false)
                    .prompt()?;
            if !confirmed {
                println!("Cancelled");
                return Ok(());
            }
            inv.reset_invoice(today, workspace.settings.due_days)?;
            save_draft(&workspace, &inv)?;
            println!("{}", Notice::success("New invoice created", format!("Invoice number: {}", inv.invoice_number)));
        }
        Commands::Details => {
            let mut inv = load_draft(&workspace, today)?;
            edit_details_wizard(&mut inv)?;
            save_draft(&workspace, &inv)?;
            println!("✅ Invoice details updated.");
        }
        Commands::AddItem { description, details, quantity, rate } => {
            let mut inv = load_draft(&workspace, today)?;
            match description {
                Some(description) => {
                    let id = inv.add_item();
                    inv.update_item(&id, ItemUpdate::Description(description));
                    inv.update_item(&id, ItemUpdate::Details(details));
                    inv.update_item(&id, ItemUpdate::Quantity(quantity));
                    inv.update_item(&id, ItemUpdate::Rate(rate));
                    println!("✅ Added item {id}");
                }
                None => enter_invoice_items(&mut inv)?,
            }
            save_draft(&workspace, &inv)?;
        }
        Commands::RemoveItem { id } => {
            let mut inv = load_draft(&workspace, today)?;
            let id = match id {
                Some(id) => id,
                None => select_item(&inv, "Select Item to Remove:")?,
            };
            if inv.remove_item(&id)? {
                save_draft(&workspace, &inv)?;
                println!("✅ Removed item {id}");
            } else {
                println!("❌ No item with id {id}");
            }
        }
        Commands::UpdateItem { id, field, value } => {
            let mut inv = load_draft(&workspace, today)?;
            let update = ItemUpdate::parse(&field, &value)?;
            if inv.update_item(&id, update) {
                save_draft(&workspace, &inv)?;
                println!("✅ Updated {field} of item {id}");
            } else {
                println!("❌ No item with id {id}");
            }
        }
        Commands::Tax { rate } => {
            let mut inv = load_draft(&workspace, today)?;
            inv.tax_rate = rate;
            save_draft(&workspace, &inv)?;
            println!("✅ Tax rate set to {}%", format_amount(rate));
        }
        Commands::Export { format } => {
            let inv = load_draft(&workspace, today)?;
            let format = format.unwrap_or(workspace.exporter.options().format);
            println!("\n🔨 Compiling {}...", format.extension().to_uppercase());
            match workspace.exporter.export(&inv, &workspace.sender, format, today) {
                Ok(path) => {
                    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                    println!("{}", Notice::success("Document generated!", format!("Saved as {name}")));
                    if let Err(e) = reveal(&path) {
                        warn!(error = %e, "could not reveal export");
                    }
                }
                Err(e) => {
                    println!(
                        "{}",
                        Notice::error("Failed to generate PDF", "Please try `invoice-editor print` instead.")
                    );
                    return Err(e.into());
                }
            }
        }
        Commands::Print => {
            let inv = load_draft(&workspace, today)?;
            println!("\n🔨 Compiling PDF...");
            workspace
                .exporter
                .print(&inv, &workspace.sender, today)
                .context("Failed to open print view")?;
            println!(
                "{}",
                Notice::info("Print view opened", "Use the viewer's print settings to save as PDF or print to paper.")
            );
        }
        Commands::Open => {
            let output = workspace.exporter.output_root();
            std::fs::create_dir_all(&output).map_err(|e| InvoiceError::storage(&output, e))?;
            println!("🚀 Opening: {:?}", output);
            open_path(&output)?;
        }
        Commands::Config => unreachable!("handled before the workspace is opened"),
    }
    Ok(())
}

// ==========================================
// 1. Draft Access
// ==========================================

fn load_draft(workspace: &Workspace, today: NaiveDate) -> anyhow::Result<InvoiceData> {
    workspace.current_invoice(today).context("Failed to load invoice")
}

fn save_draft(workspace: &Workspace, inv: &InvoiceData) -> anyhow::Result<()> {
    workspace.commit(inv).context("Failed to save invoice, please try again")
}

// ==========================================
// 2. Data Entry Helpers
// ==========================================

fn edit_details_wizard(inv: &mut InvoiceData) -> anyhow::Result<()> {
    println!("\n--- Invoice Details ---");
    inv.invoice_number = Text::new("Invoice Number:").with_default(&inv.invoice_number).prompt()?;
    inv.date = DateSelect::new("Invoice Date:").with_default(inv.date).prompt()?;
    inv.due_date = DateSelect::new("Due Date:").with_default(inv.due_date).prompt()?;

    println!("\n--- Bill To ---");
    inv.client_name = Text::new("Client Name:").with_default(&inv.client_name).prompt()?;
    inv.client_type = Text::new("Client Type (Optional):").with_default(&inv.client_type).prompt()?;
    inv.client_location = Text::new("Client Location (Optional):").with_default(&inv.client_location).prompt()?;

    let rate_str = Text::new("Tax Rate %:").with_default(&format_amount(inv.tax_rate)).prompt()?;
    inv.tax_rate = parse_amount("tax rate", &rate_str)?;
    Ok(())
}

fn enter_invoice_items(inv: &mut InvoiceData) -> anyhow::Result<()> {
    println!("\n--- Enter Invoice Items ---");
    println!("(Leave Description empty to finish)");

    loop {
        let desc = Text::new("Description (leave empty to finish):").prompt()?;
        if desc.trim().is_empty() {
            break;
        }
        let details = Text::new("Details (Optional):").prompt()?;
        let quantity = parse_amount("quantity", &Text::new("Quantity:").with_default("1").prompt()?)?;
        let rate = parse_amount("rate", &Text::new("Rate:").prompt()?)?;

        let id = inv.add_item();
        inv.update_item(&id, ItemUpdate::Description(desc));
        inv.update_item(&id, ItemUpdate::Details(details));
        inv.update_item(&id, ItemUpdate::Quantity(quantity));
        inv.update_item(&id, ItemUpdate::Rate(rate));
        println!("✅ Added item {id}");
    }
    Ok(())
}

fn select_item(inv: &InvoiceData, prompt: &str) -> anyhow::Result<String> {
    let options: Vec<String> = inv
        .items
        .iter()
        .map(|i| {
            let desc = if i.description.is_empty() { "(no description)" } else { i.description.as_str() };
            format!("{} | {}", desc, i.id)
        })
        .collect();
    let choice = Select::new(prompt, options).prompt()?;
    let id = choice.rsplit(" | ").next().unwrap_or_default();
    Ok(id.to_string())
}

// ==========================================
// 3. Preview
// ==========================================

fn print_invoice(workspace: &Workspace, inv: &InvoiceData) {
    let currency = &workspace.settings.currency;
    println!("\n--- INVOICE {} ---", inv.invoice_number);
    println!("From:      {}", workspace.sender.name);
    println!("Bill To:   {}", if inv.client_name.is_empty() { "-" } else { &inv.client_name });
    if !inv.client_type.is_empty() {
        println!("           {}", inv.client_type);
    }
    if !inv.client_location.is_empty() {
        println!("           {}", inv.client_location);
    }
    println!("Date:      {}", inv.date.format("%Y-%m-%d"));
    println!("Due:       {}", inv.due_date.format("%Y-%m-%d"));
    println!("Draft:     {}", workspace.store.path().display());

    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("#"),
        Cell::new("ID"),
        Cell::new("Description"),
        Cell::new("Qty"),
        Cell::new("Rate"),
        Cell::new("Amount"),
    ]);

    for (idx, item) in inv.items.iter().enumerate() {
        let description = if item.details.is_empty() {
            item.description.clone()
        } else {
            format!("{}\n{}", item.description, item.details)
        };
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(&item.id).fg(Color::DarkGrey),
            Cell::new(description),
            Cell::new(format_amount(item.quantity)).set_alignment(CellAlignment::Right),
            Cell::new(format_currency(item.rate, currency)).set_alignment(CellAlignment::Right),
            Cell::new(format_currency(item.amount(), currency)).set_alignment(CellAlignment::Right),
        ]);
    }

    let totals = inv.totals();
    let total_row = |label: String, amount: f64, bold: bool| {
        let label_cell = Cell::new(label);
        let amount_cell = Cell::new(format_currency(amount, currency)).set_alignment(CellAlignment::Right);
        let (label_cell, amount_cell) = if bold {
            (label_cell.add_attribute(Attribute::Bold), amount_cell.add_attribute(Attribute::Bold))
        } else {
            (label_cell, amount_cell)
        };
        vec![Cell::new(""), Cell::new(""), Cell::new(""), Cell::new(""), label_cell, amount_cell]
    };
    table.add_row(total_row("Subtotal".to_string(), totals.subtotal, false));
    table.add_row(total_row(format!("Tax ({}%)", format_amount(inv.tax_rate)), totals.tax, false));
    table.add_row(total_row("Total".to_string(), totals.total, true));

    println!("{table}");
}

// ==========================================
// 4. Config
// ==========================================

fn setup_config_wizard() -> anyhow::Result<AppSettings> {
    println!("\n⚙️  --- Configuration Setup ---");
    let path = get_config_path();
    let mut settings = load_settings_from(&path)?.unwrap_or_default();

    println!("📂 Opening folder picker...");
    let picked_path = rfd::FileDialog::new()
        .set_title("Select Invoice Data Directory")
        .pick_folder();

    settings.data_root = if let Some(path) = picked_path {
        path.to_string_lossy().to_string()
    } else {
        println!("❌ No folder selected. Falling back to manual input.");
        Text::new("Enter Data Directory:").with_default(&settings.data_root).prompt()?
    };
    settings.currency = Text::new("Currency Code:").with_default(&settings.currency).prompt()?;
    settings.invoice_prefix = Text::new("Invoice Number Prefix:").with_default(&settings.invoice_prefix).prompt()?;

    save_settings_to(&path, &settings)?;
    println!("✅ Settings saved.");
    Ok(settings)
}

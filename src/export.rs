//! Document export: render the invoice to Typst source through the Tera
//! template, then compile it to PDF (or a raster preview) with `typst`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, LazyLock};

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::{debug, info};

use crate::error::{InvoiceError, Result};
use crate::model::{InvoiceData, format_amount, format_currency};
use crate::settings::SenderConfig;

// Embed template at compile time to ensure availability
const DEFAULT_TEMPLATE: &str = include_str!("../templates/invoice.tera");
const TEMPLATE_NAME: &str = "invoice.tera";

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-zA-Z0-9]").expect("filename pattern is valid"));
static UNSAFE_NUMBER_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-zA-Z0-9_-]").expect("number pattern is valid"));

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PaperSize {
    A4,
    UsLetter,
}

impl PaperSize {
    fn typst_name(self) -> &'static str {
        match self {
            PaperSize::A4 => "a4",
            PaperSize::UsLetter => "us-letter",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Pdf,
    Png,
    Svg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
        }
    }
}

/// Page and raster settings, stored under `[export]` in settings.toml.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExportOptions {
    pub margin_in: f64,
    pub paper: PaperSize,
    pub orientation: Orientation,
    /// Default format for `export` when none is given.
    pub format: OutputFormat,
    /// Raster outputs are rendered at 96 ppi times this factor.
    pub scale: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            margin_in: 0.5,
            paper: PaperSize::A4,
            orientation: Orientation::Portrait,
            format: OutputFormat::Pdf,
            scale: 2.0,
        }
    }
}

impl ExportOptions {
    pub fn ppi(&self) -> f32 {
        96.0 * self.scale.max(0.1)
    }
}

/// `Acme & Co!` -> `Acme___Co_`; an empty name becomes `Client`.
pub fn sanitize_client_name(name: &str) -> String {
    let name = if name.is_empty() { "Client" } else { name };
    UNSAFE_FILENAME_CHARS.replace_all(name, "_").into_owned()
}

/// Keeps the invoice number usable as a single path segment: separators,
/// dots and anything else outside `[a-zA-Z0-9_-]` become `_`.
pub fn sanitize_invoice_number(number: &str) -> String {
    let number = if number.is_empty() { "Invoice" } else { number };
    UNSAFE_NUMBER_CHARS.replace_all(number, "_").into_owned()
}

/// `{invoiceNumber}_Invoice_{client}_{isoDate}` without extension.
pub fn export_stem(data: &InvoiceData, today: NaiveDate) -> String {
    format!(
        "{}_Invoice_{}_{}",
        sanitize_invoice_number(&data.invoice_number),
        sanitize_client_name(&data.client_name),
        today.format("%Y-%m-%d")
    )
}

pub fn export_filename(data: &InvoiceData, today: NaiveDate, format: OutputFormat) -> String {
    format!("{}.{}", export_stem(data, today), format.extension())
}

// ==========================================
// Render Context
// ==========================================

#[derive(Serialize)]
struct ClientContext {
    name: String,
    kind: String,
    location: String,
}

#[derive(Serialize)]
struct LineContext {
    description: String,
    details: String,
    quantity: String,
    rate: String,
    amount: String,
}

#[derive(Serialize)]
struct PageContext {
    paper: &'static str,
    flipped: bool,
    margin_in: f64,
}

#[derive(Serialize)]
pub struct InvoiceContext {
    number: String,
    date: String,
    due_date: String,
    client: ClientContext,
    items: Vec<LineContext>,
    tax_rate: String,
    subtotal: String,
    tax: String,
    total: String,
    sender: SenderConfig,
    page: PageContext,
    generated_on: String,
}

impl InvoiceContext {
    pub fn build(
        data: &InvoiceData,
        sender: &SenderConfig,
        options: &ExportOptions,
        currency: &str,
        today: NaiveDate,
    ) -> Self {
        let totals = data.totals();
        InvoiceContext {
            number: data.invoice_number.clone(),
            date: long_date(data.date),
            due_date: long_date(data.due_date),
            client: ClientContext {
                name: data.client_name.clone(),
                kind: data.client_type.clone(),
                location: data.client_location.clone(),
            },
            items: data
                .items
                .iter()
                .map(|i| LineContext {
                    description: i.description.clone(),
                    details: i.details.clone(),
                    quantity: format_amount(i.quantity),
                    rate: format_currency(i.rate, currency),
                    amount: format_currency(i.amount(), currency),
                })
                .collect(),
            tax_rate: format_amount(data.tax_rate),
            subtotal: format_currency(totals.subtotal, currency),
            tax: format_currency(totals.tax, currency),
            total: format_currency(totals.total, currency),
            sender: sender.clone(),
            page: PageContext {
                paper: options.paper.typst_name(),
                flipped: options.orientation == Orientation::Landscape,
                margin_in: options.margin_in,
            },
            generated_on: long_date(today),
        }
    }
}

pub fn long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Escapes a value for use inside a Typst string literal.
fn typst_escape(
    value: &tera::Value,
    _: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let raw = match value {
        tera::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => {}
            c => out.push(c),
        }
    }
    Ok(tera::Value::String(out))
}

// ==========================================
// Compilation
// ==========================================

pub trait DocumentCompiler: Send + Sync {
    fn compile(&self, source: &Path, output: &Path, format: OutputFormat, ppi: f32) -> Result<()>;
}

/// Shells out to the `typst` CLI.
pub struct TypstCompiler;

impl DocumentCompiler for TypstCompiler {
    fn compile(&self, source: &Path, output: &Path, format: OutputFormat, ppi: f32) -> Result<()> {
        let mut cmd = Command::new("typst");
        cmd.arg("compile").arg("--format").arg(format.extension());
        if format == OutputFormat::Png {
            cmd.arg("--ppi").arg(format!("{ppi}"));
        }
        cmd.arg(source).arg(output);
        debug!(?cmd, "running typst");

        let out = cmd
            .output()
            .map_err(|source| InvoiceError::Launch { program: "typst".to_string(), source })?;
        if out.status.success() {
            Ok(())
        } else {
            Err(InvoiceError::Compile(String::from_utf8_lossy(&out.stderr).trim().to_string()))
        }
    }
}

/// Hands a finished document to whatever displays or prints it.
pub trait DocumentOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<()>;
}

/// The platform default application (`open`, `explorer`, `xdg-open`).
pub struct SystemOpener;

impl DocumentOpener for SystemOpener {
    fn open(&self, path: &Path) -> Result<()> {
        open_path(path)
    }
}

/// Everything needed to turn an invoice into a file. Cheap to clone so
/// it can move onto a worker thread.
#[derive(Clone)]
pub struct Exporter {
    root: PathBuf,
    options: ExportOptions,
    currency: String,
    compiler: Arc<dyn DocumentCompiler>,
    opener: Arc<dyn DocumentOpener>,
}

impl Exporter {
    pub fn new(root: PathBuf, options: ExportOptions, currency: String) -> Self {
        Self::with_compiler(root, options, currency, Arc::new(TypstCompiler))
    }

    pub fn with_compiler(
        root: PathBuf,
        options: ExportOptions,
        currency: String,
        compiler: Arc<dyn DocumentCompiler>,
    ) -> Self {
        Exporter { root, options, currency, compiler, opener: Arc::new(SystemOpener) }
    }

    pub fn with_opener(mut self, opener: Arc<dyn DocumentOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn output_root(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Loads `<root>/templates/*.tera`, seeding the built-in template on
    /// first use so it can be customised.
    fn load_templates(&self) -> Result<Tera> {
        let template_dir = self.root.join("templates");
        fs::create_dir_all(&template_dir).map_err(|e| InvoiceError::storage(&template_dir, e))?;
        let template_path = template_dir.join(TEMPLATE_NAME);
        if !template_path.exists() {
            info!(path = %template_path.display(), "seeding default template");
            fs::write(&template_path, DEFAULT_TEMPLATE)
                .map_err(|e| InvoiceError::storage(&template_path, e))?;
        }

        let pattern = template_dir.join("*.tera");
        let mut tera = Tera::new(&pattern.to_string_lossy())?;
        tera.register_filter("typst", typst_escape);
        Ok(tera)
    }

    pub fn render_source(
        &self,
        data: &InvoiceData,
        sender: &SenderConfig,
        today: NaiveDate,
    ) -> Result<String> {
        let tera = self.load_templates()?;
        let context_data = InvoiceContext::build(data, sender, &self.options, &self.currency, today);
        let context = Context::from_serialize(&context_data)?;
        Ok(tera.render(TEMPLATE_NAME, &context)?)
    }

    /// Writes `<stem>.typ` under `output/<year>/` and compiles it. Returns
    /// the produced file (the first page for raster formats).
    pub fn export(
        &self,
        data: &InvoiceData,
        sender: &SenderConfig,
        format: OutputFormat,
        today: NaiveDate,
    ) -> Result<PathBuf> {
        let rendered = self.render_source(data, sender, today)?;

        let output_dir = self.output_root().join(today.year().to_string());
        fs::create_dir_all(&output_dir).map_err(|e| InvoiceError::storage(&output_dir, e))?;

        let stem = export_stem(data, today);
        let typ_path = output_dir.join(format!("{stem}.typ"));
        fs::write(&typ_path, rendered).map_err(|e| InvoiceError::storage(&typ_path, e))?;

        let (target, produced) = match format {
            OutputFormat::Pdf => {
                let p = output_dir.join(export_filename(data, today, format));
                (p.clone(), p)
            }
            raster => {
                let ext = raster.extension();
                (
                    output_dir.join(format!("{stem}-{{p}}.{ext}")),
                    output_dir.join(format!("{stem}-1.{ext}")),
                )
            }
        };

        self.compiler.compile(&typ_path, &target, format, self.options.ppi())?;
        info!(path = %produced.display(), "invoice exported");
        Ok(produced)
    }

    /// The print path: compile a PDF and hand it to the platform viewer,
    /// whose print dialog takes over from there.
    pub fn print(
        &self,
        data: &InvoiceData,
        sender: &SenderConfig,
        today: NaiveDate,
    ) -> Result<PathBuf> {
        let pdf = self.export(data, sender, OutputFormat::Pdf, today)?;
        self.opener.open(&pdf)?;
        info!(path = %pdf.display(), "print view opened");
        Ok(pdf)
    }
}

// ==========================================
// Platform Helpers
// ==========================================

/// Opens a file or folder with the platform default application.
pub fn open_path(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    let (program, args) = ("open", vec![path.as_os_str().to_owned()]);
    #[cfg(target_os = "windows")]
    let (program, args) = ("explorer", vec![path.as_os_str().to_owned()]);
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let (program, args) = ("xdg-open", vec![path.as_os_str().to_owned()]);

    Command::new(program)
        .args(args)
        .spawn()
        .map(|_| ())
        .map_err(|source| InvoiceError::Launch { program: program.to_string(), source })
}

/// Opens the folder containing `path` with the file selected where the
/// platform supports it.
pub fn reveal(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    let spawned = Command::new("open").arg("-R").arg(path).spawn();
    #[cfg(target_os = "windows")]
    let spawned = Command::new("explorer").arg(format!("/select,{}", path.to_string_lossy())).spawn();
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let spawned = Command::new("xdg-open").arg(path.parent().unwrap_or(path)).spawn();

    spawned
        .map(|_| ())
        .map_err(|source| InvoiceError::Launch { program: "file manager".to_string(), source })
}

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{InvoiceError, Result};

pub const DEFAULT_DUE_DAYS: u64 = 30;

static NUMBER_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)-(\d+)$").expect("suffix pattern is valid"));

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InvoiceItem {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub details: String,
    pub quantity: f64,
    pub rate: f64,
}

impl InvoiceItem {
    pub fn blank() -> Self {
        InvoiceItem {
            id: Uuid::now_v7().to_string(),
            description: String::new(),
            details: String::new(),
            quantity: 1.0,
            rate: 0.0,
        }
    }

    pub fn amount(&self) -> f64 {
        self.quantity * self.rate
    }
}

/// One invoice as edited and saved. Field names follow the draft
/// snapshot format (camelCase keys, `YYYY-MM-DD` dates).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceData {
    pub invoice_number: String,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub client_type: String,
    #[serde(default)]
    pub client_location: String,
    pub items: Vec<InvoiceItem>,
    #[serde(default)]
    pub tax_rate: f64,
}

/// A single-field replacement for [`InvoiceData::update_item`].
#[derive(Debug, Clone, PartialEq)]
pub enum ItemUpdate {
    Description(String),
    Details(String),
    Quantity(f64),
    Rate(f64),
}

impl ItemUpdate {
    /// Builds an update from a field name and raw text, as typed on the
    /// command line. Numbers must be finite and non-negative.
    pub fn parse(field: &str, value: &str) -> Result<Self> {
        match field.to_ascii_lowercase().as_str() {
            "description" | "desc" => Ok(ItemUpdate::Description(value.to_string())),
            "details" | "note" => Ok(ItemUpdate::Details(value.to_string())),
            "quantity" | "qty" => parse_amount("quantity", value).map(ItemUpdate::Quantity),
            "rate" | "price" => parse_amount("rate", value).map(ItemUpdate::Rate),
            other => Err(InvoiceError::invalid_value(
                "field",
                format!("unknown item field '{other}' (expected description, details, quantity or rate)"),
            )),
        }
    }
}

pub fn parse_amount(field: &str, value: &str) -> Result<f64> {
    let n: f64 = value
        .trim()
        .replace(',', "")
        .parse()
        .map_err(|_| InvoiceError::invalid_value(field, format!("'{value}' is not a number")))?;
    if !n.is_finite() || n < 0.0 {
        return Err(InvoiceError::invalid_value(field, "must be a non-negative number"));
    }
    Ok(n)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

impl InvoiceData {
    /// A blank invoice: no client, one empty item, no tax.
    pub fn blank(invoice_number: impl Into<String>, today: NaiveDate, due_days: u64) -> Self {
        InvoiceData {
            invoice_number: invoice_number.into(),
            date: today,
            due_date: due_date_from(today, due_days),
            client_name: String::new(),
            client_type: String::new(),
            client_location: String::new(),
            items: vec![InvoiceItem::blank()],
            tax_rate: 0.0,
        }
    }

    /// The invoice a fresh installation starts with.
    pub fn seed(prefix: &str, today: NaiveDate, due_days: u64) -> Self {
        Self::blank(format!("{prefix}-001"), today, due_days)
    }

    pub fn add_item(&mut self) -> String {
        let item = InvoiceItem::blank();
        let id = item.id.clone();
        self.items.push(item);
        id
    }

    /// Removes the item with `id`. Returns `Ok(false)` when no item
    /// matches; refuses to remove the only remaining item.
    pub fn remove_item(&mut self, id: &str) -> Result<bool> {
        let Some(pos) = self.items.iter().position(|i| i.id == id) else {
            return Ok(false);
        };
        if self.items.len() == 1 {
            return Err(InvoiceError::InvalidOperation(
                "an invoice must keep at least one item".to_string(),
            ));
        }
        self.items.remove(pos);
        Ok(true)
    }

    /// Returns `false` (and changes nothing) when no item matches.
    pub fn update_item(&mut self, id: &str, update: ItemUpdate) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.id == id) else {
            return false;
        };
        match update {
            ItemUpdate::Description(v) => item.description = v,
            ItemUpdate::Details(v) => item.details = v,
            ItemUpdate::Quantity(v) => item.quantity = v,
            ItemUpdate::Rate(v) => item.rate = v,
        }
        true
    }

    pub fn subtotal(&self) -> f64 {
        self.items.iter().map(InvoiceItem::amount).sum()
    }

    pub fn tax(&self) -> f64 {
        self.subtotal() * self.tax_rate / 100.0
    }

    pub fn total(&self) -> f64 {
        self.subtotal() + self.tax()
    }

    pub fn totals(&self) -> Totals {
        Totals { subtotal: self.subtotal(), tax: self.tax(), total: self.total() }
    }

    /// Replaces the invoice with a blank one carrying the next number.
    /// On a malformed number the invoice is left untouched.
    pub fn reset_invoice(&mut self, today: NaiveDate, due_days: u64) -> Result<()> {
        let next = next_invoice_number(&self.invoice_number)?;
        *self = InvoiceData::blank(next, today, due_days);
        Ok(())
    }

    /// Worth autosaving: someone typed a client or described an item.
    pub fn has_content(&self) -> bool {
        !self.client_name.is_empty() || self.items.iter().any(|i| !i.description.is_empty())
    }

    /// Checks a snapshot restored from storage before it replaces the
    /// in-memory invoice.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(InvoiceError::InvalidDraft("an invoice needs at least one item".to_string()));
        }
        let mut seen = HashSet::new();
        for (idx, item) in self.items.iter().enumerate() {
            if item.id.is_empty() {
                return Err(InvoiceError::InvalidDraft(format!("item {} has an empty id", idx + 1)));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(InvoiceError::InvalidDraft(format!("duplicate item id '{}'", item.id)));
            }
            if !item.quantity.is_finite() || item.quantity < 0.0 {
                return Err(InvoiceError::InvalidDraft(format!("item '{}' has an invalid quantity", item.id)));
            }
            if !item.rate.is_finite() || item.rate < 0.0 {
                return Err(InvoiceError::InvalidDraft(format!("item '{}' has an invalid rate", item.id)));
            }
        }
        if !self.tax_rate.is_finite() {
            return Err(InvoiceError::InvalidDraft("tax rate is not a number".to_string()));
        }
        Ok(())
    }
}

pub fn due_date_from(today: NaiveDate, due_days: u64) -> NaiveDate {
    today.checked_add_days(Days::new(due_days)).unwrap_or(today)
}

/// `FWT-007` -> `FWT-008`. The prefix is everything before the last
/// hyphen; the suffix is zero-padded to at least three digits.
pub fn next_invoice_number(current: &str) -> Result<String> {
    let malformed = || InvoiceError::MalformedInvoiceNumber(current.to_string());
    let caps = NUMBER_SUFFIX.captures(current.trim()).ok_or_else(malformed)?;
    let n: u64 = caps[2].parse().map_err(|_| malformed())?;
    let next = n.checked_add(1).ok_or_else(malformed)?;
    Ok(format!("{}-{:03}", &caps[1], next))
}

/// Grouped thousands, up to three fraction digits, trailing zeros
/// dropped: `1234567.5` -> `1,234,567.5 TZS`.
pub fn format_currency(amount: f64, currency: &str) -> String {
    format!("{} {}", format_amount(amount), currency)
}

pub fn format_amount(amount: f64) -> String {
    let fixed = format!("{:.3}", amount.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac = frac_part.trim_end_matches('0');

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let negative = amount < 0.0 && (int_part != "0" || !frac.is_empty());
    let sign = if negative { "-" } else { "" };
    if frac.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{frac}")
    }
}

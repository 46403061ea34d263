// src/invoice.rs

use serde::{Serialize, Serializer};
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// `15.01.2024`, used for display, file names and command-line input.
pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[day].[month].[year]");

/// One decoded line of an invoice table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub item_name: String,
    pub unit: String,
    pub quantity: f64,
    pub price: f64,
    pub amount: f64,
}

/// An outgoing invoice assembled from the journal, its header and its lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub number: String,
    #[serde(serialize_with = "serialize_date")]
    pub date: Date,
    /// Contractor / order number used to keep related invoices together;
    /// empty when the header has none.
    pub grouping_key: String,
    pub kind: String,
    pub items: Vec<LineItem>,
}

impl Invoice {
    pub fn total_amount(&self) -> f64 {
        self.items.iter().map(|i| i.amount).sum()
    }
}

fn serialize_date<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
    let text = date.format(DATE_FORMAT).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&text)
}

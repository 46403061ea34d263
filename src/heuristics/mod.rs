// src/heuristics/mod.rs

mod catalog;
mod profile;
mod shape;

pub use catalog::{
    Catalog, CatalogEntry, CatalogPaths, discover_lookup_files, load_catalog, load_contractors,
    load_units, resolve_catalogs,
};
pub use profile::{KindProfile, counterparty_field, profile_for};

use crate::dbf::{DbfTable, Record};
use crate::error::{ExportError, Result};
use serde::Serialize;
use tracing::debug;

/// Physical field name chosen for each logical column of a line table.
///
/// A role left as `None` could not be resolved by any strategy; decoding
/// treats it as an empty code or a zero amount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    pub item: Option<String>,
    pub unit: Option<String>,
    pub quantity: Option<String>,
    pub price: Option<String>,
    pub amount: Option<String>,
}

impl FieldMapping {
    pub fn is_complete(&self) -> bool {
        self.item.is_some()
            && self.unit.is_some()
            && self.quantity.is_some()
            && self.price.is_some()
            && self.amount.is_some()
    }

    /// Fill the roles still unassigned with the ones `other` provides.
    fn fill_from(&mut self, other: FieldMapping) {
        self.item = self.item.take().or(other.item);
        self.unit = self.unit.take().or(other.unit);
        self.quantity = self.quantity.take().or(other.quantity);
        self.price = self.price.take().or(other.price);
        self.amount = self.amount.take().or(other.amount);
    }
}

/// What every strategy gets to look at.
pub struct Sample<'a> {
    pub kind: &'a str,
    pub fields: &'a [String],
    pub record: &'a Record,
}

type Strategy = fn(&Sample<'_>) -> FieldMapping;

/// Evaluated top to bottom; an earlier strategy's choice for a role is never
/// overridden by a later one.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("kind profile", profile::by_kind),
    ("well-known names", profile::well_known),
    ("value shape", shape::by_value_shape),
    ("positional", shape::positional),
];

/// Infer which fields of a line table hold item, unit, quantity, price and
/// amount, from the table's first record.
pub fn infer_field_roles(table: &DbfTable, kind: &str) -> Result<FieldMapping> {
    let Some(record) = table.first_record()? else {
        return Err(ExportError::SchemaInference {
            kind: kind.to_string(),
            reason: format!("line table {} is empty", table.path().display()),
        });
    };
    Ok(infer_from_sample(&Sample {
        kind,
        fields: table.field_names(),
        record: &record,
    }))
}

pub fn infer_from_sample(sample: &Sample<'_>) -> FieldMapping {
    let mut mapping = FieldMapping::default();
    for (name, strategy) in STRATEGIES {
        mapping.fill_from(strategy(sample));
        debug!(kind = sample.kind, strategy = name, mapping = ?mapping, "Field roles after strategy");
        if mapping.is_complete() {
            break;
        }
    }
    mapping
}

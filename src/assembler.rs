// src/assembler.rs

use crate::dbf::{DbfTable, Record, Value};
use crate::heuristics::counterparty_field;
use crate::invoice::{Invoice, LineItem};
use crate::session::{DISQUALIFYING_MARKER, KindSchema, Session};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use time::Date;
use tracing::{debug, info, info_span, warn};

const IDDOC_FIELD: &str = "IDDOC";

/// One row of the journal, reduced to what assembly needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub iddoc: String,
    pub kind: String,
    pub number: String,
    pub date: Option<Date>,
}

impl JournalEntry {
    pub fn from_record(record: &Record) -> Self {
        Self {
            iddoc: record.text_or_empty(IDDOC_FIELD).to_string(),
            kind: record.text_or_empty("IDDOCDEF").to_string(),
            number: record.text_or_empty("DOCNO").to_string(),
            date: record.date("DATE"),
        }
    }
}

/// Joins journal entries with their header and line records.
pub struct Assembler<'a> {
    session: &'a Session,
}

impl<'a> Assembler<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    fn accepts(&self, entry: &JournalEntry, start: Date, end: Date) -> bool {
        if !self.session.accepts_kind(&entry.kind) {
            return false;
        }
        if entry.number.to_uppercase().contains(DISQUALIFYING_MARKER) {
            debug!(number = %entry.number, "Warehouse invoice skipped");
            return false;
        }
        entry.date.is_some_and(|d| start <= d && d <= end)
    }

    /// Build one invoice per accepted journal entry dated within
    /// `[start, end]`. Entries without a header are skipped.
    pub fn assemble(&self, entries: &[JournalEntry], start: Date, end: Date) -> Vec<Invoice> {
        let matched: Vec<&JournalEntry> = entries
            .iter()
            .filter(|e| self.accepts(e, start, end))
            .collect();
        info!(matched = matched.len(), "Journal entries in range");
        if matched.is_empty() {
            return Vec::new();
        }

        let mut by_kind: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        for entry in &matched {
            by_kind
                .entry(entry.kind.as_str())
                .or_default()
                .insert(entry.iddoc.as_str());
        }

        let mut headers: HashMap<String, Record> = HashMap::new();
        let mut lines: HashMap<String, Vec<Record>> = HashMap::new();

        for (kind, ids) in &by_kind {
            let span = info_span!("kind", kind = %kind);
            let _guard = span.enter();

            let Some(schema) = self.session.schema(kind) else {
                warn!(documents = ids.len(), "No tables for kind, documents skipped");
                continue;
            };

            for record in load_matching(&schema.files.header, ids) {
                headers.insert(iddoc_of(&record), record);
            }
            for record in load_matching(&schema.files.lines, ids) {
                lines.entry(iddoc_of(&record)).or_default().push(record);
            }
        }
        info!(headers = headers.len(), with_lines = lines.len(), "Documents loaded");

        let mut invoices = Vec::with_capacity(matched.len());
        for entry in matched {
            let Some(header) = headers.get(&entry.iddoc) else {
                warn!(iddoc = %entry.iddoc, number = %entry.number, "Header not found, entry skipped");
                continue;
            };
            let (Some(schema), Some(date)) = (self.session.schema(&entry.kind), entry.date) else {
                continue;
            };

            let items = lines
                .get(&entry.iddoc)
                .map(|records| {
                    records
                        .iter()
                        .map(|r| decode_line(r, schema, &entry.number))
                        .collect()
                })
                .unwrap_or_default();

            invoices.push(Invoice {
                number: entry.number.clone(),
                date,
                grouping_key: self.grouping_key(header, &entry.kind),
                kind: entry.kind.clone(),
                items,
            });
        }

        invoices
    }

    /// Contractor display number referenced by the header, or empty.
    fn grouping_key(&self, header: &Record, kind: &str) -> String {
        let code = header.text_or_empty(counterparty_field(kind));
        if code.is_empty() {
            return String::new();
        }
        self.session
            .contractors()
            .name_of(code)
            .unwrap_or_default()
            .to_string()
    }
}

fn iddoc_of(record: &Record) -> String {
    record.text_or_empty(IDDOC_FIELD).to_string()
}

/// Rows of `path` whose `IDDOC` is in `ids`; a table that cannot be read
/// yields nothing.
fn load_matching(path: &Path, ids: &HashSet<&str>) -> Vec<Record> {
    let scan = match DbfTable::open(path).and_then(|t| t.records()) {
        Ok(scan) => scan,
        Err(e) => {
            warn!(table = %path.display(), error = %e, "Table unreadable, its documents are skipped");
            return Vec::new();
        }
    };
    let mut out = Vec::new();
    for record in scan {
        match record {
            Ok(record) if ids.contains(record.text_or_empty(IDDOC_FIELD)) => out.push(record),
            Ok(_) => {}
            Err(e) => warn!(table = %path.display(), error = %e, "Unreadable row skipped"),
        }
    }
    out
}

fn decode_line(record: &Record, schema: &KindSchema, number: &str) -> LineItem {
    let mapping = &schema.mapping;
    let code = |field: &Option<String>| {
        field
            .as_deref()
            .map(|f| record.text_or_empty(f))
            .unwrap_or_default()
    };

    let item_code = code(&mapping.item);
    let item_name = schema
        .items
        .name_of(item_code)
        .map_or_else(|| format!("[Товар {item_code}]"), str::to_string);

    let unit_code = code(&mapping.unit);
    let unit = schema.units.name_of(unit_code).unwrap_or(unit_code).to_string();

    let number_of = |field: &Option<String>, role: &str| {
        field
            .as_deref()
            .map_or(0.0, |f| read_number(record, f, role, number))
    };

    LineItem {
        item_name,
        unit,
        quantity: number_of(&mapping.quantity, "quantity"),
        price: number_of(&mapping.price, "price"),
        amount: number_of(&mapping.amount, "amount"),
    }
}

/// Numeric value of `field`; anything that is not a number decodes as 0.
fn read_number(record: &Record, field: &str, role: &str, number: &str) -> f64 {
    match record.get(field) {
        Some(Value::Number(n)) => *n,
        None | Some(Value::Null) => 0.0,
        Some(Value::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return 0.0;
            }
            text.replace(',', ".").parse().unwrap_or_else(|_| {
                warn!(document = number, field, role, value = text, "Malformed number, using 0");
                0.0
            })
        }
        Some(Value::Invalid(raw)) => {
            warn!(document = number, field, role, value = %raw, "Malformed number, using 0");
            0.0
        }
        Some(other) => {
            warn!(document = number, field, role, value = ?other, "Unexpected value type, using 0");
            0.0
        }
    }
}

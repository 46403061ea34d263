// src/session.rs

use crate::assembler::{Assembler, JournalEntry};
use crate::dbf::{DbfTable, Record};
use crate::error::{ExportError, Result};
use crate::heuristics::{
    self, Catalog, FieldMapping, discover_lookup_files, load_catalog, load_contractors,
    load_units, resolve_catalogs,
};
use crate::invoice::Invoice;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use time::Date;
use tracing::{debug, info, info_span, warn};

/// The journal indexes every document of the database.
pub const JOURNAL_FILE: &str = "1SJOURN.DBF";
pub const CONTRACTORS_FILE: &str = "SC174.DBF";
/// Kind code of the standard outgoing invoice when nothing else is found.
const DEFAULT_KIND: &str = "S3";
/// Warehouse invoices (СРН) share prefixes with outgoing ones but are a
/// different document.
pub const DISQUALIFYING_MARKER: &str = "СРН";

static INVOICE_DESCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)РНК|РАСХОДНАЯ|НАКЛАДНАЯ").expect("static pattern"));
static INVOICE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ДРН|МРН|РНК|РН-|НАКЛ").expect("static pattern"));

/// Header and line tables of one document kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindFiles {
    pub number: u64,
    pub header: PathBuf,
    pub lines: PathBuf,
}

/// Everything needed to decode the lines of one document kind.
#[derive(Debug)]
pub struct KindSchema {
    pub kind: String,
    pub files: KindFiles,
    pub mapping: FieldMapping,
    pub items: Catalog,
    pub units: Catalog,
}

/// Per-run context: the invoice kinds found in the database with their
/// inferred field mappings and catalogs. Built once by [`Session::open`],
/// read-only afterwards.
#[derive(Debug)]
pub struct Session {
    database_path: PathBuf,
    journal: DbfTable,
    accepted_kinds: BTreeSet<String>,
    schemas: BTreeMap<String, KindSchema>,
    contractors: Catalog,
}

/// Decode a base-36 kind code (`S3` → 1011). Characters outside `0-9A-Z`
/// are ignored.
pub fn decode_base36(code: &str) -> u64 {
    code.chars()
        .filter_map(|c| c.to_digit(36))
        .fold(0u64, |acc, d| acc.saturating_mul(36).saturating_add(d as u64))
}

/// `DH<n>.DBF` / `DT<n>.DBF` for a kind code.
pub fn kind_files(dir: &Path, kind: &str) -> KindFiles {
    let number = decode_base36(kind);
    KindFiles {
        number,
        header: find_table(dir, &format!("DH{number}.DBF")),
        lines: find_table(dir, &format!("DT{number}.DBF")),
    }
}

/// Path of `name` in `dir`, accepting a lower-case file on case-sensitive
/// file systems.
fn find_table(dir: &Path, name: &str) -> PathBuf {
    let exact = dir.join(name);
    if exact.is_file() {
        return exact;
    }
    let lower = dir.join(name.to_lowercase());
    if lower.is_file() { lower } else { exact }
}

impl Session {
    pub fn open(database_path: impl AsRef<Path>) -> Result<Self> {
        let database_path = database_path.as_ref();
        if !database_path.is_dir() {
            return Err(ExportError::storage_unavailable(database_path));
        }
        let journal = DbfTable::open(find_table(database_path, JOURNAL_FILE))?;
        info!(database = %database_path.display(), "Opening 1C database");

        let accepted_kinds = detect_invoice_kinds(&journal)?;
        info!(kinds = ?accepted_kinds, "Invoice document kinds");

        let lookup_files = discover_lookup_files(database_path)?;
        debug!(count = lookup_files.len(), "Lookup files found");

        let mut schemas = BTreeMap::new();
        let mut last_error = None;
        for kind in &accepted_kinds {
            let span = info_span!("kind", kind = %kind);
            let _guard = span.enter();

            let files = kind_files(database_path, kind);
            if !files.header.is_file() || !files.lines.is_file() {
                warn!(number = files.number, "Header or line table missing, kind skipped");
                continue;
            }
            match build_schema(kind, files, &lookup_files) {
                Ok(schema) => {
                    schemas.insert(kind.clone(), schema);
                }
                Err(e) => {
                    warn!(error = %e, "Kind skipped");
                    last_error = Some(e);
                }
            }
        }

        if schemas.is_empty() {
            // tables were there but none could be decoded
            if let Some(e) = last_error {
                return Err(e);
            }
            return Err(ExportError::storage_unavailable(
                database_path.join("DH*.DBF / DT*.DBF"),
            ));
        }

        let contractors = load_contractors(&find_table(database_path, CONTRACTORS_FILE));
        info!(contractors = contractors.len(), "Contractor catalog loaded");

        Ok(Self {
            database_path: database_path.to_path_buf(),
            journal,
            accepted_kinds,
            schemas,
            contractors,
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn accepts_kind(&self, kind: &str) -> bool {
        self.accepted_kinds.contains(kind)
    }

    pub fn schema(&self, kind: &str) -> Option<&KindSchema> {
        self.schemas.get(kind)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &KindSchema> {
        self.schemas.values()
    }

    pub fn contractors(&self) -> &Catalog {
        &self.contractors
    }

    /// Scan the journal; unreadable rows are skipped.
    pub fn read_journal(&self) -> Result<Vec<JournalEntry>> {
        let entries: Vec<JournalEntry> = journal_rows(&self.journal)?
            .map(|record| JournalEntry::from_record(&record))
            .collect();
        debug!(entries = entries.len(), "Journal read");
        Ok(entries)
    }

    /// Invoices dated within `[start, end]`, in journal order.
    pub fn extract(&self, start: Date, end: Date) -> Result<Vec<Invoice>> {
        info!(%start, %end, "Extracting invoices");
        if end < start {
            return Ok(Vec::new());
        }
        let entries = self.read_journal()?;
        let invoices = Assembler::new(self).assemble(&entries, start, end);
        info!(count = invoices.len(), "Invoices extracted");
        Ok(invoices)
    }
}

fn build_schema(kind: &str, files: KindFiles, lookup_files: &[PathBuf]) -> Result<KindSchema> {
    let lines = DbfTable::open(&files.lines)?;
    let mapping = heuristics::infer_field_roles(&lines, kind)?;
    info!(
        item = ?mapping.item,
        unit = ?mapping.unit,
        quantity = ?mapping.quantity,
        price = ?mapping.price,
        amount = ?mapping.amount,
        "Field roles"
    );

    let paths = resolve_catalogs(&lines, kind, &mapping, lookup_files)?;
    let items = paths.items.as_deref().map(load_catalog).unwrap_or_default();
    let units = paths.units.as_deref().map(load_units).unwrap_or_default();
    info!(items = items.len(), units = units.len(), "Catalogs loaded");

    Ok(KindSchema {
        kind: kind.to_string(),
        files,
        mapping,
        items,
        units,
    })
}

/// Readable journal rows; the others are logged and skipped.
fn journal_rows(journal: &DbfTable) -> Result<impl Iterator<Item = Record>> {
    Ok(journal.records()?.filter_map(|record| match record {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "Unreadable journal row skipped");
            None
        }
    }))
}

/// Kind codes of outgoing invoices: by journal description when the journal
/// has one, then by document number prefixes, then the standard code.
fn detect_invoice_kinds(journal: &DbfTable) -> Result<BTreeSet<String>> {
    let mut kinds = BTreeSet::new();

    if journal.has_field("DESCR") {
        for record in journal_rows(journal)? {
            let kind = record.text_or_empty("IDDOCDEF");
            if !kind.is_empty() && INVOICE_DESCRIPTION.is_match(record.text_or_empty("DESCR")) {
                kinds.insert(kind.to_string());
            }
        }
        if !kinds.is_empty() {
            info!(kinds = ?kinds, "Kinds found by journal description");
            return Ok(kinds);
        }
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in journal_rows(journal)? {
        let kind = record.text_or_empty("IDDOCDEF");
        let number = record.text_or_empty("DOCNO").to_uppercase();
        if kind.is_empty() || number.is_empty() {
            continue;
        }
        if INVOICE_NUMBER.is_match(&number) && !number.contains(DISQUALIFYING_MARKER) {
            *counts.entry(kind.to_string()).or_default() += 1;
        }
    }
    if !counts.is_empty() {
        info!(counts = ?counts, "Kinds found by document numbers");
        return Ok(counts.into_keys().collect());
    }

    warn!(kind = DEFAULT_KIND, "Could not detect invoice kinds, using the standard code");
    kinds.insert(DEFAULT_KIND.to_string());
    Ok(kinds)
}

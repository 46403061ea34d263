// src/heuristics/catalog.rs

use super::FieldMapping;
use crate::dbf::DbfTable;
use crate::error::{ExportError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Lookup tables are `SC<n>.DBF`.
const LOOKUP_PREFIX: &str = "SC";
const TABLE_EXT: &str = "DBF";

const ID_FIELD: &str = "ID";
const CODE_FIELD: &str = "CODE";
const DESCR_FIELD: &str = "DESCR";
/// Full item name; `DESCR` holds the shorter warehouse name.
const FULL_NAME_FIELD: &str = "SP149";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub code: String,
}

/// In-memory `ID` → entry lookup loaded from one `SC*.DBF` file.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    /// Non-empty name for `id`.
    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.get(id)
            .map(|e| e.name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, CatalogEntry)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (String, CatalogEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Lookup files chosen for a document kind's item and unit codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogPaths {
    pub items: Option<PathBuf>,
    pub units: Option<PathBuf>,
}

/// All `SC*.DBF` files in `dir`, sorted by file name.
pub fn discover_lookup_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let upper = name.to_uppercase();
        let is_lookup = upper.starts_with(LOOKUP_PREFIX)
            && Path::new(&upper)
                .extension()
                .is_some_and(|ext| ext == TABLE_EXT);
        if is_lookup && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by_key(|p| p.file_name().map(|n| n.to_ascii_uppercase()));
    Ok(files)
}

/// Find which lookup files hold the item and unit codes of `kind`, by
/// searching them for the codes of one sampled line record.
pub fn resolve_catalogs(
    table: &DbfTable,
    kind: &str,
    mapping: &FieldMapping,
    lookup_files: &[PathBuf],
) -> Result<CatalogPaths> {
    let Some(sample) = table.first_record()? else {
        return Err(ExportError::SchemaInference {
            kind: kind.to_string(),
            reason: format!("line table {} is empty", table.path().display()),
        });
    };

    let sampled = |field: &Option<String>| {
        field
            .as_deref()
            .and_then(|f| sample.text(f))
            .filter(|code| !code.is_empty())
            .map(str::to_string)
    };
    let item_code = sampled(&mapping.item);
    let unit_code = sampled(&mapping.unit);
    info!(kind, item_code = ?item_code, unit_code = ?unit_code, "Sampled catalog codes");

    let mut paths = CatalogPaths::default();

    'files: for file in lookup_files {
        let scan = match DbfTable::open(file).and_then(|t| t.records()) {
            Ok(scan) => scan,
            Err(e) => {
                debug!(file = %file.display(), error = %e, "Lookup file unreadable, skipped");
                continue;
            }
        };
        for record in scan {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Unreadable lookup row skipped");
                    continue;
                }
            };
            let id = record.text_or_empty(ID_FIELD);
            if paths.items.is_none() && item_code.as_deref() == Some(id) {
                debug!(kind, file = %file.display(), "Items catalog found");
                paths.items = Some(file.clone());
            }
            if paths.units.is_none() && unit_code.as_deref() == Some(id) {
                debug!(kind, file = %file.display(), "Units catalog found");
                paths.units = Some(file.clone());
            }
            if paths.items.is_some() && paths.units.is_some() {
                break 'files;
            }
        }
    }

    if let Some(first) = lookup_files.first() {
        if paths.items.is_none() {
            warn!(kind, fallback = %first.display(), "Items catalog not found by code, using first lookup file");
            paths.items = Some(first.clone());
        }
        if paths.units.is_none() {
            warn!(kind, fallback = %first.display(), "Units catalog not found by code, using first lookup file");
            paths.units = Some(first.clone());
        }
    }

    Ok(paths)
}

/// Load `ID` → {name, code}; the name prefers the full-name field over
/// `DESCR`. A missing or unreadable file gives an empty catalog.
pub fn load_catalog(path: &Path) -> Catalog {
    load_entries(path, &[FULL_NAME_FIELD, DESCR_FIELD])
}

/// Units are named by `DESCR` alone; a units code that fell back to the
/// items file must not pick up a full item name.
pub fn load_units(path: &Path) -> Catalog {
    load_entries(path, &[DESCR_FIELD])
}

/// Contractors keep their display number in `DESCR`.
pub fn load_contractors(path: &Path) -> Catalog {
    load_entries(path, &[DESCR_FIELD])
}

fn load_entries(path: &Path, name_fields: &[&str]) -> Catalog {
    let scan = match DbfTable::open(path).and_then(|t| t.records()) {
        Ok(scan) => scan,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Catalog unavailable, codes will be shown raw");
            return Catalog::default();
        }
    };

    let mut entries = HashMap::new();
    for record in scan {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Unreadable catalog row skipped");
                continue;
            }
        };
        let id = record.text_or_empty(ID_FIELD);
        if id.is_empty() {
            continue;
        }
        let name = name_fields
            .iter()
            .map(|f| record.text_or_empty(f))
            .find(|n| !n.is_empty())
            .unwrap_or_default();
        entries.insert(
            id.to_string(),
            CatalogEntry {
                name: name.to_string(),
                code: record.text_or_empty(CODE_FIELD).to_string(),
            },
        );
    }

    debug!(file = %path.display(), entries = entries.len(), "Catalog loaded");
    Catalog { entries }
}

// src/lib.rs
//
// Outgoing invoices from a 1C:Enterprise 7.7 DBF database, laid out three
// to a page and rendered to PDF.

pub mod assembler;
pub mod config;
pub mod dbf;
pub mod error;
pub mod heuristics;
pub mod invoice;
pub mod layout;
pub mod render;
pub mod session;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use error::{ExportError, Result};
pub use invoice::{Invoice, LineItem};
pub use layout::{AllocationTier, LayoutEngine, PageModel, Placement};
pub use session::Session;

use std::path::PathBuf;
use time::Date;
use tracing::info;

/// Invoices dated within `[start, end]` from the configured database.
pub fn extract(config: &Config, start: Date, end: Date) -> Result<Vec<Invoice>> {
    let session = Session::open(config.database_path()?)?;
    session.extract(start, end)
}

pub fn layout<'a>(invoices: &'a [Invoice], config: &Config) -> Vec<PageModel<'a>> {
    LayoutEngine::new(config).layout(invoices)
}

/// Extract, lay out and render one PDF. Returns `None` when no invoice
/// matched, in which case nothing is written.
pub fn export(config: &Config, start: Date, end: Date) -> Result<Option<PathBuf>> {
    let invoices = extract(config, start, end)?;
    if invoices.is_empty() {
        info!(%start, %end, "No invoices in range, nothing to render");
        return Ok(None);
    }
    let pages = layout(&invoices, config);
    let path = render::output_path(config, start, end)?;
    render::render_pdf(&pages, config, &path)?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn config_for(dir: &std::path::Path) -> Config {
        Config {
            database_path: dir.join("db").to_string_lossy().into_owned(),
            output_dir: dir.join("out").to_string_lossy().into_owned(),
            ..Config::default()
        }
    }

    #[test]
    fn test_export_writes_pdf_for_range() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("db")).unwrap();
        testutil::write_database(&dir.path().join("db"));
        let config = config_for(dir.path());

        let path = export(&config, date!(2024 - 01 - 01), date!(2024 - 01 - 31))
            .unwrap()
            .unwrap();
        assert!(path.ends_with("invoices_01.01.2024_-_31.01.2024.pdf"));
        let doc = lopdf::Document::load(&path).unwrap();
        // two third-size invoices share one page
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_export_without_matches_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("db")).unwrap();
        testutil::write_database(&dir.path().join("db"));
        let config = config_for(dir.path());

        let result = export(&config, date!(2020 - 01 - 01), date!(2020 - 01 - 01)).unwrap();
        assert!(result.is_none());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_extract_requires_database_path() {
        let err = extract(&Config::default(), date!(2024 - 01 - 01), date!(2024 - 01 - 31));
        assert!(matches!(err, Err(ExportError::Config(_))));
    }
}

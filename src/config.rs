// src/config.rs

use crate::error::{ExportError, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use toml_edit::{DocumentMut, value};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Points per millimetre.
pub const MM: f64 = 72.0 / 25.4;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Directory holding the 1C `.DBF` tables.
    #[serde(default)]
    pub database_path: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub design: DesignConfig,
}

fn default_output_dir() -> String {
    "output".to_string()
}

/// Page geometry. Sizes are in points, margins and spacing in millimetres.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageConfig {
    #[serde(default = "default_page_width")]
    pub width: f64,
    #[serde(default = "default_page_height")]
    pub height: f64,
    #[serde(default = "default_margin")]
    pub margin_top_mm: f64,
    #[serde(default = "default_margin")]
    pub margin_bottom_mm: f64,
    #[serde(default = "default_margin")]
    pub margin_left_mm: f64,
    #[serde(default = "default_margin")]
    pub margin_right_mm: f64,
    #[serde(default = "default_max_documents")]
    pub max_documents_per_page: usize,
    #[serde(default = "default_spacing")]
    pub document_spacing_mm: f64,
}

// A4
fn default_page_width() -> f64 {
    595.2756
}

fn default_page_height() -> f64 {
    841.8898
}

fn default_margin() -> f64 {
    10.0
}

fn default_max_documents() -> usize {
    3
}

fn default_spacing() -> f64 {
    1.0
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            width: default_page_width(),
            height: default_page_height(),
            margin_top_mm: default_margin(),
            margin_bottom_mm: default_margin(),
            margin_left_mm: default_margin(),
            margin_right_mm: default_margin(),
            max_documents_per_page: default_max_documents(),
            document_spacing_mm: default_spacing(),
        }
    }
}

impl PageConfig {
    pub fn margin_top(&self) -> f64 {
        self.margin_top_mm * MM
    }

    pub fn margin_left(&self) -> f64 {
        self.margin_left_mm * MM
    }

    pub fn margin_right(&self) -> f64 {
        self.margin_right_mm * MM
    }

    /// Vertical space between the top and bottom margins.
    pub fn available_height(&self) -> f64 {
        self.height - (self.margin_top_mm + self.margin_bottom_mm) * MM
    }

    pub fn content_width(&self) -> f64 {
        self.width - (self.margin_left_mm + self.margin_right_mm) * MM
    }

    pub fn spacing(&self) -> f64 {
        self.document_spacing_mm * MM
    }
}

/// Fixed heights (points) of the parts of a rendered invoice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DesignConfig {
    #[serde(default = "default_header_height")]
    pub header_height: f64,
    #[serde(default = "default_row_height")]
    pub table_row_height: f64,
    #[serde(default = "default_table_header_height")]
    pub table_header_height: f64,
    /// Totals and the written amount.
    #[serde(default = "default_footer_height")]
    pub footer_height: f64,
    #[serde(default = "default_spacing_internal")]
    pub spacing_internal: f64,
}

fn default_header_height() -> f64 {
    50.0
}

fn default_row_height() -> f64 {
    15.0
}

fn default_table_header_height() -> f64 {
    20.0
}

fn default_footer_height() -> f64 {
    60.0
}

fn default_spacing_internal() -> f64 {
    10.0
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            header_height: default_header_height(),
            table_row_height: default_row_height(),
            table_header_height: default_table_header_height(),
            footer_height: default_footer_height(),
            spacing_internal: default_spacing_internal(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: String::new(),
            output_dir: default_output_dir(),
            page: PageConfig::default(),
            design: DesignConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn database_path(&self) -> Result<&Path> {
        let path = self.database_path.trim();
        if path.is_empty() {
            return Err(ExportError::Config(
                "database_path is not set, use `set-database <path>`".to_string(),
            ));
        }
        Ok(Path::new(path))
    }

    pub fn output_dir(&self) -> &Path {
        Path::new(&self.output_dir)
    }

    /// Rewrite `database_path` in the file at `path`, keeping the rest of
    /// the document (comments included). A missing file is created.
    pub fn set_database_path(path: impl AsRef<Path>, new_path: &str) -> Result<()> {
        let path = path.as_ref();
        let content = if path.exists() {
            fs::read_to_string(path)?
        } else {
            String::new()
        };
        let mut doc = content.parse::<DocumentMut>()?;

        doc["database_path"] = value(new_path);

        fs::write(path, doc.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_a4_with_three_documents() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.output_dir, "output");
        assert_eq!(cfg.page.max_documents_per_page, 3);
        assert!((cfg.page.available_height() - (841.8898 - 20.0 * MM)).abs() < 1e-9);
        assert!((cfg.page.spacing() - 2.834_645_669).abs() < 1e-6);
        assert_eq!(cfg.design.table_row_height, 15.0);
    }

    #[test]
    fn test_parses_partial_sections() {
        let cfg: Config = toml::from_str(
            r#"
database_path = "C:/1C/Base"

[page]
max_documents_per_page = 2

[design]
footer_height = 40.0
"#,
        )
        .unwrap();
        assert_eq!(cfg.database_path().unwrap(), Path::new("C:/1C/Base"));
        assert_eq!(cfg.page.max_documents_per_page, 2);
        assert_eq!(cfg.page.margin_top_mm, 10.0);
        assert_eq!(cfg.design.footer_height, 40.0);
        assert_eq!(cfg.design.header_height, 50.0);
    }

    #[test]
    fn test_missing_database_path_is_config_error() {
        let cfg = Config::default();
        assert!(matches!(cfg.database_path(), Err(ExportError::Config(_))));
    }

    #[test]
    fn test_set_database_path_keeps_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "# 1C base\ndatabase_path = \"old\"\n\n[page]\nmax_documents_per_page = 2\n",
        )
        .unwrap();

        Config::set_database_path(&path, "D:/Base").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("# 1C base"));
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.database_path, "D:/Base");
        assert_eq!(cfg.page.max_documents_per_page, 2);
    }

    #[test]
    fn test_set_database_path_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.toml");
        Config::set_database_path(&path, "D:/Base").unwrap();
        assert_eq!(Config::load(&path).unwrap().database_path, "D:/Base");
    }
}

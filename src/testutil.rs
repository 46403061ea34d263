// src/testutil.rs
//
// Writers for small DBF fixtures used by the unit tests.

use encoding_rs::WINDOWS_1251;
use std::path::Path;

struct FieldSpec {
    name: String,
    kind: u8,
    length: u8,
    decimals: u8,
}

pub struct DbfBuilder {
    fields: Vec<FieldSpec>,
    rows: Vec<(bool, Vec<String>)>,
}

impl DbfBuilder {
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn field(mut self, name: &str, kind: u8, length: u8, decimals: u8) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            length,
            decimals,
        });
        self
    }

    pub fn char(self, name: &str, length: u8) -> Self {
        self.field(name, b'C', length, 0)
    }

    pub fn numeric(self, name: &str, length: u8, decimals: u8) -> Self {
        self.field(name, b'N', length, decimals)
    }

    pub fn date(self, name: &str) -> Self {
        self.field(name, b'D', 8, 0)
    }

    pub fn logical(self, name: &str) -> Self {
        self.field(name, b'L', 1, 0)
    }

    pub fn memo(self, name: &str) -> Self {
        self.field(name, b'M', 10, 0)
    }

    pub fn row(mut self, cells: &[&str]) -> Self {
        self.rows
            .push((false, cells.iter().map(|c| c.to_string()).collect()));
        self
    }

    pub fn deleted_row(mut self, cells: &[&str]) -> Self {
        self.rows
            .push((true, cells.iter().map(|c| c.to_string()).collect()));
        self
    }

    pub fn write(&self, path: &Path) {
        let header_len = 32 + 32 * self.fields.len() + 1;
        let record_len = 1 + self.fields.iter().map(|f| f.length as usize).sum::<usize>();

        let mut out = Vec::with_capacity(header_len + record_len * self.rows.len() + 1);
        out.push(0x03);
        out.extend_from_slice(&[124, 1, 15]);
        out.extend_from_slice(&(self.rows.len() as u32).to_le_bytes());
        out.extend_from_slice(&(header_len as u16).to_le_bytes());
        out.extend_from_slice(&(record_len as u16).to_le_bytes());
        out.extend_from_slice(&[0u8; 20]);

        for field in &self.fields {
            let mut desc = [0u8; 32];
            let name = field.name.as_bytes();
            desc[..name.len().min(10)].copy_from_slice(&name[..name.len().min(10)]);
            desc[11] = field.kind;
            desc[16] = field.length;
            desc[17] = field.decimals;
            out.extend_from_slice(&desc);
        }
        out.push(0x0D);

        for (deleted, cells) in &self.rows {
            out.push(if *deleted { b'*' } else { b' ' });
            for (field, cell) in self.fields.iter().zip(cells) {
                let (encoded, _, _) = WINDOWS_1251.encode(cell);
                let width = field.length as usize;
                let mut bytes = vec![b' '; width];
                let n = encoded.len().min(width);
                if field.kind == b'N' || field.kind == b'M' {
                    // numbers and memo pointers are right-aligned
                    bytes[width - n..].copy_from_slice(&encoded[..n]);
                } else {
                    bytes[..n].copy_from_slice(&encoded[..n]);
                }
                out.extend_from_slice(&bytes);
            }
        }
        out.push(0x1A);

        std::fs::write(path, out).unwrap();
    }
}

/// Write a dBASE III memo file whose block `i + 1` holds `texts[i]`.
pub fn write_memo(path: &Path, texts: &[&str]) {
    let mut out = vec![0u8; 512];
    let next_free = (texts.len() + 1) as u32;
    out[..4].copy_from_slice(&next_free.to_le_bytes());
    for text in texts {
        let (encoded, _, _) = WINDOWS_1251.encode(text);
        let mut block = vec![0u8; 512];
        block[..encoded.len()].copy_from_slice(&encoded);
        block[encoded.len()] = 0x1A;
        block[encoded.len() + 1] = 0x1A;
        out.extend_from_slice(&block);
    }
    std::fs::write(path, out).unwrap();
}

fn catalog(path: &Path, rows: &[[&str; 4]]) {
    let mut builder = DbfBuilder::new()
        .char("ID", 9)
        .char("CODE", 5)
        .char("DESCR", 25)
        .char("SP149", 50);
    for row in rows {
        builder = builder.row(row);
    }
    builder.write(path);
}

/// A small 1C database with one invoice kind (`S3`, tables `DH1011`/`DT1011`).
///
/// Journal: `1` and `2` dated 15.01.2024, `3` is a warehouse invoice (СРН),
/// `4` is dated 20.02.2024, `5` has no header, `6` is another kind.
/// Line 2 of invoice `1` has a non-numeric quantity; invoice `2` references
/// an item missing from the catalog.
pub fn write_database(dir: &Path) {
    DbfBuilder::new()
        .char("IDDOC", 9)
        .char("IDDOCDEF", 4)
        .char("DOCNO", 12)
        .date("DATE")
        .row(&["   1", "  S3", "ДРН-0001", "20240115"])
        .row(&["   2", "  S3", "ДРН-0002", "20240115"])
        .row(&["   3", "  S3", "СРН-0003", "20240115"])
        .row(&["   4", "  S3", "ДРН-0004", "20240220"])
        .row(&["   5", "  S3", "ДРН-0005", "20240116"])
        .row(&["   6", "  S4", "ПКО-0001", "20240115"])
        .write(&dir.join("1SJOURN.DBF"));

    DbfBuilder::new()
        .char("IDDOC", 9)
        .char("SP1012", 9)
        .row(&["   1", "     K1"])
        .row(&["   2", ""])
        .row(&["   3", "     K1"])
        .row(&["   4", "     K2"])
        .write(&dir.join("DH1011.DBF"));

    DbfBuilder::new()
        .char("IDDOC", 9)
        .numeric("LINENO", 4, 0)
        .char("SP1031", 9)
        .char("SP1032", 9)
        .numeric("SP1033", 10, 3)
        .numeric("SP1034", 10, 3)
        .numeric("SP4505", 12, 2)
        .numeric("SP1040", 12, 2)
        .row(&["   1", "1", "     I1", "     U1", "2", "1", "60", "120"])
        .row(&["   1", "2", "     I2", "     U1", "abc", "1", "10", "10"])
        .row(&["   2", "1", "    ZZ9", "     U1", "1", "1", "5", "5"])
        .row(&["   3", "1", "     I1", "     U1", "1", "1", "60", "60"])
        .row(&["   4", "1", "     I2", "     U1", "3", "1", "10", "30"])
        .write(&dir.join("DT1011.DBF"));

    catalog(
        &dir.join("SC84.DBF"),
        &[["     I1", "1", "Болт", "Болт М8"], ["     I2", "2", "Гайка", ""]],
    );
    catalog(&dir.join("SC11.DBF"), &[["     U1", "1", "шт", ""]]);
    catalog(&dir.join("SC174.DBF"), &[["     K1", "1", "265", ""]]);
}

// src/dbf.rs

use crate::error::{ExportError, Result};
use encoding_rs::WINDOWS_1251;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::{Date, Month};
use tracing::{debug, warn};

const HEADER_LEN: usize = 32;
const FIELD_DESCRIPTOR_LEN: usize = 32;
const FIELD_TERMINATOR: u8 = 0x0D;
const END_OF_FILE: u8 = 0x1A;
const DELETED_FLAG: u8 = b'*';
const MEMO_BLOCK_SIZE: u64 = 512;
/// Upper bound for a single memo value; 1C never stores more than this in a memo cell.
const MEMO_MAX_LEN: usize = 1 << 20;

/// One decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Date(Date),
    Bool(bool),
    Null,
    /// Raw text of a numeric or date cell that did not parse.
    Invalid(String),
}

impl Value {
    /// Trimmed text, only for `Text` cells.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.trim()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Character,
    Numeric,
    Float,
    Date,
    Logical,
    Memo,
    Other(u8),
}

impl From<u8> for FieldType {
    fn from(code: u8) -> Self {
        match code {
            b'C' => FieldType::Character,
            b'N' => FieldType::Numeric,
            b'F' => FieldType::Float,
            b'D' => FieldType::Date,
            b'L' => FieldType::Logical,
            b'M' => FieldType::Memo,
            other => FieldType::Other(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub length: usize,
    pub decimals: u8,
}

/// A row of a table: field name → value, with the table's declaration order.
#[derive(Debug, Clone)]
pub struct Record {
    names: Arc<[String]>,
    values: HashMap<String, Value>,
}

impl Record {
    /// Build a record from `(name, value)` pairs, keeping their order.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let mut names = Vec::new();
        let mut values = HashMap::new();
        for (name, value) in pairs {
            let name = name.into();
            names.push(name.clone());
            values.insert(name, value);
        }
        Self {
            names: names.into(),
            values,
        }
    }

    pub fn field_names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Trimmed text of a character field; `None` for other types.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_text)
    }

    /// Trimmed text, empty string when the field is absent or not text.
    pub fn text_or_empty(&self, field: &str) -> &str {
        self.text(field).unwrap_or("")
    }

    pub fn date(&self, field: &str) -> Option<Date> {
        self.get(field).and_then(Value::as_date)
    }
}

/// An opened `.DBF` table. Only the header is read here; rows are read by
/// [`DbfTable::records`].
#[derive(Debug, Clone)]
pub struct DbfTable {
    path: PathBuf,
    fields: Arc<[FieldDescriptor]>,
    names: Arc<[String]>,
    record_count: u32,
    header_len: u64,
    record_len: usize,
}

impl DbfTable {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ExportError::storage_unavailable(path));
        }

        let mut reader = BufReader::new(File::open(path)?);
        let mut header = [0u8; HEADER_LEN];
        reader
            .read_exact(&mut header)
            .map_err(|e| ExportError::invalid_table(path, format!("short header: {e}")))?;

        let record_count = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let header_len = u16::from_le_bytes([header[8], header[9]]) as usize;
        let record_len = u16::from_le_bytes([header[10], header[11]]) as usize;

        if header_len <= HEADER_LEN || record_len == 0 {
            return Err(ExportError::invalid_table(
                path,
                format!("bad header lengths (header={header_len}, record={record_len})"),
            ));
        }

        let mut descriptors = vec![0u8; header_len - HEADER_LEN];
        reader
            .read_exact(&mut descriptors)
            .map_err(|e| ExportError::invalid_table(path, format!("short field list: {e}")))?;

        let fields = parse_field_descriptors(&descriptors);
        if fields.is_empty() {
            return Err(ExportError::invalid_table(path, "no fields declared"));
        }

        let data_len: usize = fields.iter().map(|f| f.length).sum::<usize>() + 1;
        if data_len > record_len {
            return Err(ExportError::invalid_table(
                path,
                format!("fields need {data_len} bytes but records are {record_len}"),
            ));
        }

        let names: Arc<[String]> = fields.iter().map(|f| f.name.clone()).collect();
        debug!(
            table = %path.display(),
            fields = fields.len(),
            records = record_count,
            "Opened DBF table"
        );

        Ok(Self {
            path: path.to_path_buf(),
            fields: fields.into(),
            names,
            record_count,
            header_len: header_len as u64,
            record_len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Number of rows declared in the header, deleted ones included.
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    /// Start a fresh single-pass scan over the table's rows.
    pub fn records(&self) -> Result<Records> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(self.header_len))?;

        let memo = if self.fields.iter().any(|f| f.field_type == FieldType::Memo) {
            MemoFile::open_beside(&self.path)
        } else {
            None
        };

        Ok(Records {
            reader,
            path: self.path.clone(),
            fields: Arc::clone(&self.fields),
            names: Arc::clone(&self.names),
            remaining: self.record_count,
            buf: vec![0u8; self.record_len],
            memo,
            done: false,
        })
    }

    /// First readable, non-deleted row.
    pub fn first_record(&self) -> Result<Option<Record>> {
        for record in self.records()? {
            match record {
                Ok(record) => return Ok(Some(record)),
                Err(e) => warn!(table = %self.path.display(), error = %e, "Unreadable row skipped"),
            }
        }
        Ok(None)
    }
}

fn parse_field_descriptors(bytes: &[u8]) -> Vec<FieldDescriptor> {
    bytes
        .chunks(FIELD_DESCRIPTOR_LEN)
        .take_while(|chunk| chunk.len() == FIELD_DESCRIPTOR_LEN && chunk[0] != FIELD_TERMINATOR)
        .map(|chunk| {
            let name_end = chunk[..11].iter().position(|&b| b == 0).unwrap_or(11);
            FieldDescriptor {
                name: String::from_utf8_lossy(&chunk[..name_end]).trim().to_string(),
                field_type: FieldType::from(chunk[11]),
                length: chunk[16] as usize,
                decimals: chunk[17],
            }
        })
        .collect()
}

/// Finite, non-restartable iterator over the rows of one table.
pub struct Records {
    reader: BufReader<File>,
    path: PathBuf,
    fields: Arc<[FieldDescriptor]>,
    names: Arc<[String]>,
    remaining: u32,
    buf: Vec<u8>,
    memo: Option<MemoFile>,
    done: bool,
}

impl Iterator for Records {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.remaining > 0 {
            if let Err(e) = self.reader.read_exact(&mut self.buf) {
                self.done = true;
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    debug!(table = %self.path.display(), "Table ends before declared record count");
                    return None;
                }
                return Some(Err(e.into()));
            }
            self.remaining -= 1;

            match self.buf[0] {
                END_OF_FILE => {
                    self.done = true;
                    return None;
                }
                DELETED_FLAG => continue,
                _ => return Some(Ok(self.decode_row())),
            }
        }
        None
    }
}

impl Records {
    fn decode_row(&mut self) -> Record {
        let mut values = HashMap::with_capacity(self.fields.len());
        let mut offset = 1;
        for field in self.fields.iter() {
            let raw = &self.buf[offset..offset + field.length];
            offset += field.length;
            let value = decode_cell(field, raw, self.memo.as_mut(), &self.path);
            values.insert(field.name.clone(), value);
        }
        Record {
            names: Arc::clone(&self.names),
            values,
        }
    }
}

fn decode_cell(field: &FieldDescriptor, raw: &[u8], memo: Option<&mut MemoFile>, path: &Path) -> Value {
    match field.field_type {
        FieldType::Numeric | FieldType::Float => {
            let text = ascii_trimmed(raw);
            if text.is_empty() {
                Value::Null
            } else {
                text.parse::<f64>()
                    .map(Value::Number)
                    .unwrap_or_else(|_| Value::Invalid(text))
            }
        }
        FieldType::Date => decode_date(&ascii_trimmed(raw)),
        FieldType::Logical => match raw.first() {
            Some(b'T' | b't' | b'Y' | b'y') => Value::Bool(true),
            Some(b'F' | b'f' | b'N' | b'n') => Value::Bool(false),
            _ => Value::Null,
        },
        FieldType::Memo => {
            let block = ascii_trimmed(raw);
            let Ok(block) = block.parse::<u64>() else {
                return Value::Null;
            };
            if block == 0 {
                return Value::Null;
            }
            let Some(memo) = memo else {
                return Value::Null;
            };
            match memo.read_block(block) {
                Ok(text) => Value::Text(text),
                Err(e) => {
                    debug!(table = %path.display(), field = %field.name, block, error = %e, "Unreadable memo skipped");
                    Value::Null
                }
            }
        }
        FieldType::Character | FieldType::Other(_) => Value::Text(decode_text(raw)),
    }
}

fn decode_text(raw: &[u8]) -> String {
    let (text, _) = WINDOWS_1251.decode_without_bom_handling(raw);
    text.trim_end_matches([' ', '\0']).to_string()
}

fn ascii_trimmed(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches([' ', '\0'])
        .to_string()
}

fn decode_date(text: &str) -> Value {
    if text.is_empty() || text.bytes().all(|b| b == b'0') {
        return Value::Null;
    }
    parse_yyyymmdd(text)
        .map(Value::Date)
        .unwrap_or_else(|| Value::Invalid(text.to_string()))
}

fn parse_yyyymmdd(text: &str) -> Option<Date> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = text[0..4].parse().ok()?;
    let month: u8 = text[4..6].parse().ok()?;
    let day: u8 = text[6..8].parse().ok()?;
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

/// dBASE III memo file (`.DBT`) next to a table.
struct MemoFile {
    reader: BufReader<File>,
}

impl MemoFile {
    fn open_beside(table: &Path) -> Option<Self> {
        for ext in ["DBT", "dbt"] {
            let candidate = table.with_extension(ext);
            if let Ok(file) = File::open(&candidate) {
                return Some(Self {
                    reader: BufReader::new(file),
                });
            }
        }
        debug!(table = %table.display(), "Memo file missing, memo fields read as empty");
        None
    }

    fn read_block(&mut self, block: u64) -> io::Result<String> {
        self.reader.seek(SeekFrom::Start(block * MEMO_BLOCK_SIZE))?;
        let mut out = Vec::new();
        let mut chunk = [0u8; MEMO_BLOCK_SIZE as usize];
        loop {
            let n = self.reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            if let Some(end) = chunk[..n].iter().position(|&b| b == END_OF_FILE) {
                out.extend_from_slice(&chunk[..end]);
                break;
            }
            out.extend_from_slice(&chunk[..n]);
            if out.len() > MEMO_MAX_LEN {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "unterminated memo"));
            }
        }
        Ok(decode_text(&out))
    }
}

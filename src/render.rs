// src/render.rs
//
// Draws packed pages into a PDF. Text uses the base-14 Helvetica fonts
// re-encoded for Windows-1251 so Cyrillic needs no embedded font file.

use crate::config::{Config, PageConfig};
use crate::error::{ExportError, Result};
use crate::invoice::{DATE_FORMAT, Invoice};
use crate::layout::PageModel;
use encoding_rs::WINDOWS_1251;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::fs;
use std::path::{Path, PathBuf};
use time::{Date, Month};
use tracing::{debug, info};

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

const ORDER_SIZE: f64 = 12.0;
const TITLE_SIZE: f64 = 10.0;
const DATE_SIZE: f64 = 9.0;
const TABLE_HEADER_SIZE: f64 = 9.0;
const TABLE_BODY_SIZE: f64 = 8.0;

const HEADERS: [&str; 6] = ["№", "Товар", "Ед.", "Количество", "Цена с НДС", "Сумма с НДС"];
/// Relative column widths, scaled to the content width.
const COLUMN_WEIGHTS: [f64; 6] = [25.0, 200.0, 40.0, 70.0, 80.0, 80.0];
const CELL_PADDING: f64 = 4.0;

const HEADER_FILL: (f64, f64, f64) = (68.0 / 255.0, 114.0 / 255.0, 196.0 / 255.0);
const ALT_ROW_FILL: (f64, f64, f64) = (242.0 / 255.0, 242.0 / 255.0, 242.0 / 255.0);
const GRID: (f64, f64, f64) = (217.0 / 255.0, 217.0 / 255.0, 217.0 / 255.0);

/// Average Helvetica advance as a fraction of the font size.
const AVG_GLYPH_WIDTH: f64 = 0.55;

const MONTHS_GENITIVE: [&str; 12] = [
    "января", "февраля", "марта", "апреля", "мая", "июня", "июля", "августа", "сентября",
    "октября", "ноября", "декабря",
];

/// `invoices_15.01.2024.pdf` for one day, `invoices_<start>_-_<end>.pdf`
/// for a range.
pub fn output_file_name(start: Date, end: Date) -> Result<String> {
    let format = |d: Date| {
        d.format(DATE_FORMAT)
            .map_err(|e| ExportError::Render(e.to_string()))
    };
    if start == end {
        Ok(format!("invoices_{}.pdf", format(start)?))
    } else {
        Ok(format!("invoices_{}_-_{}.pdf", format(start)?, format(end)?))
    }
}

/// Full output path; the output directory is created when missing.
pub fn output_path(config: &Config, start: Date, end: Date) -> Result<PathBuf> {
    let dir = config.output_dir();
    fs::create_dir_all(dir)?;
    Ok(dir.join(output_file_name(start, end)?))
}

/// `от 15 января 2024 г.`
pub fn format_date(date: Date) -> String {
    let month = MONTHS_GENITIVE[month_index(date.month())];
    format!("от {} {} {} г.", date.day(), month, date.year())
}

fn month_index(month: Month) -> usize {
    u8::from(month) as usize - 1
}

pub fn render_pdf(pages: &[PageModel<'_>], config: &Config, path: &Path) -> Result<()> {
    info!(path = %path.display(), pages = pages.len(), "Rendering PDF");
    let geometry = &config.page;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let encoding_id = doc.add_object(cyrillic_encoding());
    let regular_id = doc.add_object(font("Helvetica", encoding_id));
    let bold_id = doc.add_object(font("Helvetica-Bold", encoding_id));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR => regular_id,
            BOLD => bold_id,
        },
    });

    let mut kids = Vec::with_capacity(pages.len());
    for (n, page) in pages.iter().enumerate() {
        let mut painter = Painter::default();
        let mut top = geometry.height - geometry.margin_top();
        for placement in &page.placements {
            debug!(
                page = n + 1,
                number = %placement.invoice.number,
                top,
                allocated = placement.allocated,
                actual = placement.actual,
                "Drawing invoice"
            );
            painter.invoice(placement.invoice, geometry, config.design.table_row_height, top);
            top -= placement.allocated + geometry.spacing();
        }

        let content = Content {
            operations: painter.ops,
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                real(geometry.width),
                real(geometry.height),
            ],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    doc.save(path)?;
    info!(path = %path.display(), "PDF written");
    Ok(())
}

fn font(base: &str, encoding_id: ObjectId) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => encoding_id,
    }
}

/// WinAnsi with the upper half remapped to the Windows-1251 Cyrillic
/// glyph names.
fn cyrillic_encoding() -> lopdf::Dictionary {
    let name = |glyph: u32| Object::Name(format!("afii{glyph}").into_bytes());
    let mut differences = vec![
        Object::Integer(0xA8),
        name(10023), // Ё
        Object::Integer(0xB8),
        name(10071), // ё
        name(61352), // №
        Object::Integer(0xC0),
    ];
    // Ё and ё sit between Е and Ж in the glyph list but not in the code page
    let skip = |i: u32| if i >= 6 { 1 } else { 0 };
    differences.extend((0..32).map(|i| name(10017 + i + skip(i))));
    differences.extend((0..32).map(|i| name(10065 + i + skip(i))));

    dictionary! {
        "Type" => "Encoding",
        "BaseEncoding" => "WinAnsiEncoding",
        "Differences" => differences,
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn encode_text(text: &str) -> Vec<u8> {
    WINDOWS_1251.encode(text).0.into_owned()
}

fn text_width(text: &str, size: f64) -> f64 {
    text.chars().count() as f64 * size * AVG_GLYPH_WIDTH
}

/// Cut `text` with `...` so it fits `width` at `size`.
fn truncate(text: &str, width: f64, size: f64) -> String {
    if text_width(text, size) <= width {
        return text.to_string();
    }
    let room = ((width / (size * AVG_GLYPH_WIDTH)).floor() as usize).saturating_sub(3);
    let mut cut: String = text.chars().take(room).collect();
    cut.push_str("...");
    cut
}

fn format_quantity(value: f64) -> String {
    format!("{value:.3}")
}

fn format_money(value: f64) -> String {
    format!("{value:.2}")
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
}

#[derive(Default)]
struct Painter {
    ops: Vec<Operation>,
}

impl Painter {
    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.ops.push(Operation::new(operator, operands));
    }

    fn fill_color(&mut self, (r, g, b): (f64, f64, f64)) {
        self.op("rg", vec![real(r), real(g), real(b)]);
    }

    fn stroke_color(&mut self, (r, g, b): (f64, f64, f64)) {
        self.op("RG", vec![real(r), real(g), real(b)]);
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, operator: &str) {
        self.op("re", vec![real(x), real(y), real(w), real(h)]);
        self.op(operator, vec![]);
    }

    fn text(&mut self, font: &str, size: f64, x: f64, y: f64, text: &str) {
        self.op("BT", vec![]);
        self.op("Tf", vec![Object::Name(font.as_bytes().to_vec()), real(size)]);
        self.op("Td", vec![real(x), real(y)]);
        self.op(
            "Tj",
            vec![Object::String(encode_text(text), StringFormat::Literal)],
        );
        self.op("ET", vec![]);
    }

    /// One invoice block whose top edge is at `top`.
    fn invoice(&mut self, invoice: &Invoice, page: &PageConfig, row_height: f64, top: f64) {
        let left = page.margin_left();
        let right = page.width - page.margin_right();
        let mut y = top;

        self.fill_color((0.0, 0.0, 0.0));
        if !invoice.grouping_key.is_empty() {
            y -= ORDER_SIZE;
            let order = format!("Номер заказа {}", invoice.grouping_key);
            self.text(BOLD, ORDER_SIZE, left, y, &order);
            y -= 3.0;
        }

        y -= TITLE_SIZE;
        let title = format!("Расходная накладная № {}", invoice.number);
        self.text(BOLD, TITLE_SIZE, left, y, &title);
        let date = format_date(invoice.date);
        let date_x = right - text_width(&date, DATE_SIZE);
        self.text(REGULAR, DATE_SIZE, date_x, y, &date);
        y -= 10.0;

        let total = page.content_width();
        let weight: f64 = COLUMN_WEIGHTS.iter().sum();
        let widths: Vec<f64> = COLUMN_WEIGHTS.iter().map(|w| w / weight * total).collect();

        // header
        y -= row_height;
        self.fill_color(HEADER_FILL);
        self.rect(left, y, total, row_height, "f");
        self.fill_color((1.0, 1.0, 1.0));
        let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        self.row(BOLD, TABLE_HEADER_SIZE, left, y, row_height, &widths, &header);

        self.fill_color((0.0, 0.0, 0.0));
        let mut total_quantity = 0.0;
        for (n, item) in invoice.items.iter().enumerate() {
            y -= row_height;
            if n % 2 == 1 {
                self.fill_color(ALT_ROW_FILL);
                self.rect(left, y, total, row_height, "f");
                self.fill_color((0.0, 0.0, 0.0));
            }
            total_quantity += item.quantity;
            let name_width = widths[1] - 2.0 * CELL_PADDING;
            let cells = [
                (n + 1).to_string(),
                truncate(&item.item_name, name_width, TABLE_BODY_SIZE),
                item.unit.clone(),
                format_quantity(item.quantity),
                format_money(item.price),
                format_money(item.amount),
            ];
            self.row(REGULAR, TABLE_BODY_SIZE, left, y, row_height, &widths, &cells);
        }

        y -= row_height;
        let totals = [
            String::new(),
            String::new(),
            String::new(),
            format_quantity(total_quantity),
            "Итого:".to_string(),
            format_money(invoice.total_amount()),
        ];
        self.row(BOLD, TABLE_BODY_SIZE, left, y, row_height, &widths, &totals);

        // grid over header, lines and totals
        let rows = invoice.items.len() + 2;
        let table_top = y + rows as f64 * row_height;
        self.stroke_color(GRID);
        self.op("w", vec![real(0.5)]);
        for r in 0..=rows {
            let ly = table_top - r as f64 * row_height;
            self.line(left, ly, left + total, ly);
        }
        let mut x = left;
        self.line(x, table_top, x, y);
        for w in &widths {
            x += w;
            self.line(x, table_top, x, y);
        }
        self.stroke_color((0.0, 0.0, 0.0));
        self.op("w", vec![real(1.0)]);
        self.rect(left, y, total, table_top - y, "S");
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        self.op("m", vec![real(x1), real(y1)]);
        self.op("l", vec![real(x2), real(y2)]);
        self.op("S", vec![]);
    }

    #[allow(clippy::too_many_arguments)]
    fn row(
        &mut self,
        font: &str,
        size: f64,
        left: f64,
        bottom: f64,
        height: f64,
        widths: &[f64],
        cells: &[String],
    ) {
        let baseline = bottom + (height - size) / 2.0 + 1.0;
        let mut x = left;
        for (column, (cell, width)) in cells.iter().zip(widths).enumerate() {
            let align = if column >= 3 { Align::Right } else { Align::Left };
            let tx = match align {
                Align::Left => x + CELL_PADDING,
                Align::Right => x + width - CELL_PADDING - text_width(cell, size),
            };
            if !cell.is_empty() {
                self.text(font, size, tx, baseline, cell);
            }
            x += width;
        }
    }
}

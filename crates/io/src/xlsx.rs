// XLSX report writer

use std::path::Path;

use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{
    Color, DocProperties, ExcelDateTime, Format, FormatAlign, FormatPattern, Workbook, Worksheet,
};
use taxgrid_vat::report::{Report, ReportBlock, ReportCell, ReportSheet};
use taxgrid_vat::TransformError;
use tracing::debug;

use crate::write_atomic;

const HEADER_FILL: u32 = 0x4F81BD;
const HEADER_FONT: u32 = 0xFFFFFF;
const TOTAL_FILL: u32 = 0xFFFF00;
const AMOUNT_FORMAT: &str = "#,##0.00";

/// Blank rows left between two blocks.
const BLOCK_GAP: u32 = 2;

const MIN_COLUMN_WIDTH: usize = 12;
const MAX_COLUMN_WIDTH: usize = 60;

/// Fixed creation date so identical input yields an identical file.
const CREATED: (u16, u8, u8) = (2024, 1, 1);

struct Styles {
    title: Format,
    column: Format,
    text: Format,
    amount: Format,
    total_text: Format,
    total_amount: Format,
}

impl Styles {
    fn new() -> Self {
        let total = Format::new()
            .set_bold()
            .set_background_color(Color::RGB(TOTAL_FILL))
            .set_pattern(FormatPattern::Solid);
        Self {
            title: Format::new()
                .set_bold()
                .set_font_color(Color::RGB(HEADER_FONT))
                .set_background_color(Color::RGB(HEADER_FILL))
                .set_pattern(FormatPattern::Solid)
                .set_align(FormatAlign::Left),
            column: Format::new().set_bold(),
            text: Format::new(),
            amount: Format::new().set_num_format(AMOUNT_FORMAT),
            total_amount: total.clone().set_num_format(AMOUNT_FORMAT),
            total_text: total,
        }
    }
}

fn report_error(e: rust_xlsxwriter::XlsxError) -> TransformError {
    TransformError::Report(e.to_string())
}

/// Lay the report out as an in-memory workbook, one worksheet per sheet.
pub fn render_workbook(report: &Report) -> Result<Workbook, TransformError> {
    let mut workbook = Workbook::new();
    let created = ExcelDateTime::from_ymd(CREATED.0, CREATED.1, CREATED.2).map_err(report_error)?;
    workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));

    let styles = Styles::new();
    for sheet in &report.sheets {
        let worksheet = workbook
            .add_worksheet()
            .set_name(&sheet.name)
            .map_err(report_error)?;
        write_sheet(worksheet, sheet, &styles)?;
        debug!(sheet = %sheet.name, blocks = sheet.blocks.len(), "sheet written");
    }
    Ok(workbook)
}

/// Render and save the report to `path`. Nothing is left at `path` on failure.
pub fn write_report(report: &Report, path: &Path) -> Result<(), TransformError> {
    let mut workbook = render_workbook(report)?;
    let bytes = workbook.save_to_buffer().map_err(report_error)?;
    write_atomic(path, &bytes)
}

fn write_sheet(
    worksheet: &mut Worksheet,
    sheet: &ReportSheet,
    styles: &Styles,
) -> Result<(), TransformError> {
    let mut row = 0u32;
    for block in &sheet.blocks {
        row = write_block(worksheet, row, block, styles)? + BLOCK_GAP + 1;
    }
    for (col, width) in column_widths(sheet).into_iter().enumerate() {
        worksheet
            .set_column_width(col as u16, width as f64)
            .map_err(report_error)?;
    }
    Ok(())
}

/// Write one block starting at `start`; returns the row of its total line.
fn write_block(
    worksheet: &mut Worksheet,
    start: u32,
    block: &ReportBlock,
    styles: &Styles,
) -> Result<u32, TransformError> {
    let last_col = block.width().saturating_sub(1) as u16;
    if last_col > 0 {
        worksheet
            .merge_range(start, 0, start, last_col, &block.title, &styles.title)
            .map_err(report_error)?;
    } else {
        worksheet
            .write_string_with_format(start, 0, &block.title, &styles.title)
            .map_err(report_error)?;
    }

    let mut row = start + 1;
    for (col, name) in block.columns.iter().enumerate() {
        worksheet
            .write_string_with_format(row, col as u16, name, &styles.column)
            .map_err(report_error)?;
    }

    for cells in &block.rows {
        row += 1;
        write_cells(worksheet, row, cells, &styles.text, &styles.amount)?;
    }

    row += 1;
    write_cells(worksheet, row, &block.total, &styles.total_text, &styles.total_amount)?;
    Ok(row)
}

fn write_cells(
    worksheet: &mut Worksheet,
    row: u32,
    cells: &[ReportCell],
    text: &Format,
    amount: &Format,
) -> Result<(), TransformError> {
    for (col, cell) in cells.iter().enumerate() {
        let col = col as u16;
        match cell {
            ReportCell::Amount(d) => {
                let n = d.to_f64().unwrap_or_default();
                worksheet.write_number_with_format(row, col, n, amount)
            }
            ReportCell::Text(s) if s.is_empty() => worksheet.write_blank(row, col, text),
            ReportCell::Text(s) => worksheet.write_string_with_format(row, col, s, text),
        }
        .map_err(report_error)?;
    }
    Ok(())
}

fn column_widths(sheet: &ReportSheet) -> Vec<usize> {
    let mut widths: Vec<usize> = Vec::new();
    let mut widen = |col: usize, len: usize| {
        if widths.len() <= col {
            widths.resize(col + 1, MIN_COLUMN_WIDTH);
        }
        widths[col] = widths[col].max((len + 2).min(MAX_COLUMN_WIDTH));
    };
    for block in &sheet.blocks {
        for (col, name) in block.columns.iter().enumerate() {
            widen(col, name.chars().count());
        }
        for cells in &block.rows {
            for (col, cell) in cells.iter().enumerate() {
                if let ReportCell::Text(s) = cell {
                    widen(col, s.chars().count());
                }
            }
        }
    }
    widths
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn block(title: &str, names: &[&str]) -> ReportBlock {
        let rows = names
            .iter()
            .map(|n| {
                vec![
                    ReportCell::text(*n),
                    ReportCell::Amount(dec!(1.5)),
                    ReportCell::Amount(dec!(0)),
                    ReportCell::Amount(dec!(1.5)),
                ]
            })
            .collect();
        ReportBlock::new(title, &["País", "Base (€)", "IVA (€)", "Total (€)"], rows)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn widths_follow_longest_text() {
        let sheet = ReportSheet {
            name: "S".into(),
            blocks: vec![block("A", &["FR", "a very long buyer name indeed, longer than twenty"])],
        };
        let widths = column_widths(&sheet);
        assert_eq!(widths.len(), 4);
        assert_eq!(widths[0], 51);
        assert_eq!(widths[1], MIN_COLUMN_WIDTH);
    }

    #[test]
    fn total_row_follows_data() {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        let styles = Styles::new();
        let last = write_block(worksheet, 0, &block("A", &["FR", "DE"]), &styles).unwrap();
        // title, column names, two rows, total
        assert_eq!(last, 4);
    }

    #[test]
    fn renders_to_buffer() {
        let report = Report {
            sheets: vec![ReportSheet {
                name: "INTERNATIONAL".into(),
                blocks: vec![block("A", &["FR"]), block("B", &["DE"])],
            }],
        };
        let mut workbook = render_workbook(&report).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}

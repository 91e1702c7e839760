use std::collections::HashSet;
use std::io::Cursor;

use bytes::Bytes;
use tracing::{debug, warn};
use umya_spreadsheet::Spreadsheet;

use super::{Extracted, InsertOptions, SegmentFormat};
use crate::document::Document;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Cells { col1: u32, row1: u32, col2: u32, row2: u32 },
    Columns(u32, u32),
    Rows(u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ref {
    Cell(u32, u32),
    Column(u32),
    Row(u32),
}

fn column_number(letters: &str) -> Option<u32> {
    letters.chars().try_fold(0u32, |acc, c| {
        let digit = u32::from(c.to_ascii_uppercase()) - u32::from('A') + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
}

fn parse_ref(text: &str) -> Option<Ref> {
    let text = text.trim().replace('$', "");
    let split = text.find(|c: char| c.is_ascii_digit()).unwrap_or(text.len());
    let (letters, digits) = text.split_at(split);

    if !letters.chars().all(|c| c.is_ascii_alphabetic()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let col = if letters.is_empty() { None } else { column_number(letters) };
    let row = if digits.is_empty() { None } else { digits.parse::<u32>().ok() };

    match (col, row) {
        (Some(c), Some(r)) if c > 0 && r > 0 => Some(Ref::Cell(c, r)),
        (Some(c), None) if c > 0 => Some(Ref::Column(c)),
        (None, Some(r)) if r > 0 => Some(Ref::Row(r)),
        _ => None,
    }
}

/// One entry of the region allow-list: `Sheet1!A1:B10`, `C:D`, `3:5`, `E5`.
/// Without a sheet prefix the region applies to every sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRegion {
    sheet: Option<String>,
    span: Span,
}

impl CellRegion {
    pub fn parse(region: &str) -> Option<Self> {
        let (sheet, range) = match region.split_once('!') {
            Some((sheet, range)) => (Some(sheet.trim().trim_matches('\'').to_string()), range),
            None => (None, region),
        };

        let (first, second) = match range.split_once(':') {
            Some((a, b)) => (parse_ref(a)?, parse_ref(b)?),
            None => {
                let only = parse_ref(range)?;
                (only, only)
            }
        };

        let span = match (first, second) {
            (Ref::Cell(c1, r1), Ref::Cell(c2, r2)) => Span::Cells {
                col1: c1.min(c2),
                row1: r1.min(r2),
                col2: c1.max(c2),
                row2: r1.max(r2),
            },
            (Ref::Column(a), Ref::Column(b)) => Span::Columns(a.min(b), a.max(b)),
            (Ref::Row(a), Ref::Row(b)) => Span::Rows(a.min(b), a.max(b)),
            _ => return None,
        };
        Some(Self { sheet, span })
    }

    pub fn applies_to(&self, sheet: &str) -> bool {
        self.sheet.as_deref().is_none_or(|s| s == sheet)
    }

    /// `(col, row)` pairs of this region, clipped to the used area of a sheet
    fn coordinates(&self, max_col: u32, max_row: u32) -> Vec<(u32, u32)> {
        let (col1, row1, col2, row2) = match self.span {
            Span::Cells { col1, row1, col2, row2 } => (col1, row1, col2, row2),
            Span::Columns(a, b) => (a, 1, b, max_row),
            Span::Rows(a, b) => (1, a, max_col, b),
        };
        let mut coordinates = Vec::new();
        for row in row1..=row2.min(max_row) {
            for col in col1..=col2.min(max_col) {
                coordinates.push((col, row));
            }
        }
        coordinates
    }
}

/// Excel workbooks: string cells, optionally restricted to a region allow-list
pub struct XlsxFormat {
    regions: Vec<CellRegion>,
    restricted: bool,
}

pub struct XlsxCells {
    book: Spreadsheet,
    /// `(sheet, col, row)` of each extracted cell
    cells: Vec<(String, u32, u32)>,
}

impl XlsxFormat {
    /// Invalid regions are logged and skipped
    pub fn new(regions: &[String]) -> Self {
        let parsed = regions
            .iter()
            .filter_map(|region| {
                let parsed = CellRegion::parse(region);
                if parsed.is_none() {
                    warn!("Skipping invalid region '{}'", region);
                }
                parsed
            })
            .collect();
        Self {
            regions: parsed,
            restricted: !regions.is_empty(),
        }
    }
}

pub(crate) fn read_workbook(content: &[u8]) -> Result<Spreadsheet> {
    umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(content.to_vec()), true)
        .map_err(|e| Error::Xlsx(format!("failed to read workbook: {e}")))
}

pub(crate) fn write_workbook(book: &Spreadsheet) -> Result<Bytes> {
    let mut buf = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(book, &mut buf)
        .map_err(|e| Error::Xlsx(format!("failed to write workbook: {e}")))?;
    Ok(Bytes::from(buf.into_inner()))
}

impl SegmentFormat for XlsxFormat {
    type Refs = XlsxCells;

    fn name(&self) -> &'static str {
        "xlsx"
    }

    fn pre_translate(&self, document: &Document) -> Result<Extracted<XlsxCells>> {
        let book = read_workbook(document.content())?;
        let mut cells = Vec::new();
        let mut segments = Vec::new();

        for sheet in book.get_sheet_collection() {
            let name = sheet.get_name().to_string();
            let (max_col, max_row) = sheet.get_highest_column_and_row();

            let coordinates: Vec<(u32, u32)> = if self.restricted {
                let mut seen = HashSet::new();
                self.regions
                    .iter()
                    .filter(|region| region.applies_to(&name))
                    .flat_map(|region| region.coordinates(max_col, max_row))
                    .filter(|coordinate| seen.insert(*coordinate))
                    .collect()
            } else {
                (1..=max_row)
                    .flat_map(|row| (1..=max_col).map(move |col| (col, row)))
                    .collect()
            };

            for (col, row) in coordinates {
                let Some(cell) = sheet.get_cell((col, row)) else {
                    continue;
                };
                if cell.get_data_type() != "s" {
                    continue;
                }
                let value = cell.get_value().to_string();
                if value.is_empty() {
                    continue;
                }
                cells.push((name.clone(), col, row));
                segments.push(value);
            }
        }
        debug!("Collected {} string cells", segments.len());

        Ok(Extracted::new(XlsxCells { book, cells }, segments))
    }

    fn post_translate(
        &self,
        refs: XlsxCells,
        originals: &[String],
        translated: &[String],
        options: &InsertOptions,
    ) -> Result<Bytes> {
        let XlsxCells { mut book, cells } = refs;
        for (((sheet, col, row), original), translation) in cells.iter().zip(originals).zip(translated) {
            let Some(ws) = book.get_sheet_by_name_mut(sheet) else {
                warn!("Sheet '{}' disappeared; skipping write-back", sheet);
                continue;
            };
            ws.get_cell_mut((*col, *row))
                .set_value_string(options.apply(original, translation));
        }
        write_workbook(&book)
    }
}

//! Document conversion seam.
//!
//! Formats without a native translator are first converted to markdown. The
//! real conversion engines live outside this crate; they plug in through
//! [`Converter`]. Two small built-in converters cover text (identity) and
//! CSV (to a single-sheet workbook).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::formats::{read_workbook, write_workbook};

/// A converted document plus any side artifacts the engine produced
#[derive(Debug, Clone)]
pub struct Conversion {
    pub document: Document,
    pub attachments: Vec<(String, Document)>,
}

impl Conversion {
    pub const fn new(document: Document) -> Self {
        Self {
            document,
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, id: impl Into<String>, document: Document) -> Self {
        self.attachments.push((id.into(), document));
        self
    }
}

#[async_trait]
pub trait Converter: Send + Sync {
    /// Engine identifier, part of the conversion cache key
    fn engine(&self) -> &str;

    /// Hash of engine settings that change the output, part of the cache key
    fn config_hash(&self) -> String {
        String::new()
    }

    async fn convert(&self, document: &Document) -> Result<Conversion>;
}

/// Treats the input as markdown already: UTF-8 text re-tagged as `.md`
pub struct IdentityConverter;

#[async_trait]
impl Converter for IdentityConverter {
    fn engine(&self) -> &str {
        "identity"
    }

    async fn convert(&self, document: &Document) -> Result<Conversion> {
        let text = document.text()?;
        Ok(Conversion::new(document.with_content(text.into_bytes()).with_suffix(".md")))
    }
}

/// Turns CSV into a workbook with one sheet, so it can be translated as xlsx
pub struct CsvToXlsxConverter;

#[async_trait]
impl Converter for CsvToXlsxConverter {
    fn engine(&self) -> &str {
        "csv2xlsx"
    }

    async fn convert(&self, document: &Document) -> Result<Conversion> {
        let text = document.text()?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut book = umya_spreadsheet::new_file();
        let sheet = book
            .get_sheet_mut(&0)
            .ok_or_else(|| Error::Convert("new workbook has no sheet".to_string()))?;

        let mut rows = 0u32;
        for record in reader.records() {
            let record = record.map_err(|e| Error::Csv(e.to_string()))?;
            rows += 1;
            for (col, field) in (1u32..).zip(record.iter()) {
                if !field.is_empty() {
                    sheet.get_cell_mut((col, rows)).set_value(field);
                }
            }
        }
        debug!("Converted {} CSV rows into a workbook", rows);

        let content = write_workbook(&book)?;
        Ok(Conversion::new(document.with_content(content).with_suffix(".xlsx")))
    }
}

/// First sheet of a workbook as CSV text
pub fn xlsx_to_csv(document: &Document) -> Result<String> {
    let book = read_workbook(document.content())?;
    let sheet = book
        .get_sheet_collection()
        .first()
        .ok_or_else(|| Error::Xlsx("workbook has no sheets".to_string()))?;
    let (max_col, max_row) = sheet.get_highest_column_and_row();

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in 1..=max_row {
        let record: Vec<String> = (1..=max_col)
            .map(|col| sheet.get_cell((col, row)).map(|c| c.get_value().to_string()).unwrap_or_default())
            .collect();
        writer.write_record(&record).map_err(|e| Error::Csv(e.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| Error::Csv(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Converter registered under `engine`
pub fn converter_for(engine: &str) -> Result<Arc<dyn Converter>> {
    match engine.to_lowercase().as_str() {
        "identity" => Ok(Arc::new(IdentityConverter)),
        other => Err(Error::Convert(format!("unknown converter engine '{other}'"))),
    }
}

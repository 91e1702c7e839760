//! Zip container helpers shared by docx and epub.

use std::io::{Cursor, Read, Write};

use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::error::{Error, Result};

/// One archive member, kept with its original compression method
pub struct Entry {
    pub name: String,
    pub method: CompressionMethod,
    pub data: Vec<u8>,
}

/// Read every member in archive order; `wrap` builds the format's error
pub fn read_entries(content: &[u8], wrap: fn(String) -> Error) -> Result<Vec<Entry>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(content)).map_err(|e| wrap(format!("bad archive: {e}")))?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(|e| wrap(e.to_string()))?;
        let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or_default());
        file.read_to_end(&mut data)?;
        entries.push(Entry {
            name: file.name().to_string(),
            method: file.compression(),
            data,
        });
    }
    Ok(entries)
}

/// Write members in the given order
pub fn write_entries(entries: &[Entry], wrap: fn(String) -> Error) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        let method = match entry.method {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let options = FileOptions::default().compression_method(method);
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|e| wrap(e.to_string()))?;
        writer.write_all(&entry.data)?;
    }
    let cursor = writer.finish().map_err(|e| wrap(e.to_string()))?;
    Ok(cursor.into_inner())
}

pub fn find<'a>(entries: &'a [Entry], name: &str) -> Option<&'a Entry> {
    entries.iter().find(|e| e.name == name)
}

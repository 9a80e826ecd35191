//! CSV decoding for uploaded files.
//!
//! Decoding is tolerant. Blank and whitespace-only lines are skipped. Rows the
//! tokenizer rejects and rows whose column count differs from the header are
//! dropped and counted, never surfaced as errors. Only content that cannot be read at all (bad encoding, unreadable
//! header) fails with [`DecodeError`].

use super::error::DecodeError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;
use tracing::{debug, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decoder switches. The first line is always the header and blank lines are
/// always skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Trim surrounding whitespace from header names and cell values.
    pub trim: bool,
    /// Strip a leading UTF-8 byte-order mark.
    pub strip_bom: bool,
    /// Drop rows whose column count differs from the header instead of failing.
    pub tolerate_ragged_rows: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            trim: true,
            strip_bom: true,
            tolerate_ragged_rows: true,
        }
    }
}

/// One data row: an ordered mapping from column name to raw cell value.
///
/// Column names are shared by every record of a file, so a record's key set
/// is always the file's header set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<String>,
}

impl Record {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| self.values[idx].as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// A fully decoded file.
#[derive(Debug, Clone)]
pub struct DecodedCsv {
    headers: Arc<[String]>,
    records: Vec<Record>,
    dropped_rows: usize,
}

impl DecodedCsv {
    /// Unique header names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Rows discarded because they were malformed.
    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decode raw upload bytes into records.
pub fn decode_csv(content: &[u8], options: &DecodeOptions) -> Result<DecodedCsv, DecodeError> {
    let content = if options.strip_bom {
        content.strip_prefix(UTF8_BOM).unwrap_or(content)
    } else {
        content
    };

    std::str::from_utf8(content).map_err(|e| DecodeError::Encoding {
        offset: e.valid_up_to(),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(if options.trim {
            csv::Trim::All
        } else {
            csv::Trim::None
        })
        .from_reader(content);

    let raw_headers = reader
        .headers()
        .map_err(|e| DecodeError::Header(e.to_string()))?
        .clone();

    // Duplicate names collapse into the first occurrence's slot; the last
    // occurrence's value wins.
    let mut headers: Vec<String> = Vec::with_capacity(raw_headers.len());
    let mut slots: Vec<usize> = Vec::with_capacity(raw_headers.len());
    for name in raw_headers.iter() {
        match headers.iter().position(|h| h == name) {
            Some(slot) => {
                debug!(column = %name, "Merging duplicate CSV column");
                slots.push(slot);
            }
            None => {
                slots.push(headers.len());
                headers.push(name.to_string());
            }
        }
    }
    let headers: Arc<[String]> = headers.into();

    let mut records = Vec::new();
    let mut dropped_rows = 0usize;

    for (idx, row) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                debug!(line, error = %e, "Dropping unreadable CSV row");
                dropped_rows += 1;
                continue;
            }
        };

        // Whitespace-only lines are blank, not ragged.
        if row.len() <= 1 && row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        if row.len() != raw_headers.len() {
            if !options.tolerate_ragged_rows {
                return Err(DecodeError::RaggedRow {
                    line,
                    expected: raw_headers.len(),
                    found: row.len(),
                });
            }
            debug!(
                line,
                expected = raw_headers.len(),
                found = row.len(),
                "Dropping ragged CSV row"
            );
            dropped_rows += 1;
            continue;
        }

        let mut values = vec![String::new(); headers.len()];
        for (raw_idx, value) in row.iter().enumerate() {
            values[slots[raw_idx]] = value.to_string();
        }

        records.push(Record {
            columns: Arc::clone(&headers),
            values,
        });
    }

    if dropped_rows > 0 {
        warn!(
            dropped_rows,
            kept_rows = records.len(),
            "Dropped malformed rows while decoding CSV"
        );
    }

    Ok(DecodedCsv {
        headers,
        records,
        dropped_rows,
    })
}

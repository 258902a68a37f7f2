//! Record decoder
//!
//! Splits a file into lines, slices each line at the declared byte offsets and
//! decodes every slice on its own. Lines that cannot be sliced or decoded are
//! logged and skipped; the rest of the file still goes through.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use jrdb_common::text;

use crate::error::{DecodeError, IngestError, Result};
use crate::schema::{FieldKind, FieldSchema, SchemaSet};

/// Decoded text of one field, padding still attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawCell {
    Scalar(String),
    /// One entry per repeated sub-cell
    List(Vec<String>),
    /// Placeholder for derived fields, which read no bytes
    Computed,
}

impl RawCell {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            RawCell::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/// One decoded line. Cells are aligned with the fields of the schema set
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based line number in the source file
    pub line: usize,
    cells: Vec<(&'static str, RawCell)>,
}

impl Record {
    pub fn new(line: usize, cells: Vec<(&'static str, RawCell)>) -> Self {
        Self { line, cells }
    }

    pub fn get(&self, label: &str) -> Option<&RawCell> {
        self.cells.iter().find(|(l, _)| *l == label).map(|(_, c)| c)
    }

    /// Cell of the field at `index` in the schema set
    pub fn cell(&self, index: usize) -> Option<&RawCell> {
        self.cells.get(index).map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Non-blank lines seen
    pub lines_read: usize,
    pub blank_lines: usize,
    pub decode_errors: usize,
}

#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub format: &'static str,
    pub records: Vec<Record>,
    pub stats: ParseStats,
}

/// Decode a single line without its terminator
pub fn decode_line(
    schema: &SchemaSet,
    line_no: usize,
    line: &[u8],
) -> std::result::Result<Record, DecodeError> {
    if line.len() < schema.line_width() {
        return Err(DecodeError::TooShort {
            actual: line.len(),
            required: schema.line_width(),
        });
    }

    let cells = schema
        .fields()
        .iter()
        .map(|field| decode_field(field, line).map(|cell| (field.label, cell)))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Record::new(line_no, cells))
}

fn decode_field(field: &FieldSchema, line: &[u8]) -> std::result::Result<RawCell, DecodeError> {
    let decode = |bytes: &[u8]| {
        text::decode_cell(bytes).map_err(|source| DecodeError::Undecodable {
            label: field.label,
            source,
        })
    };

    match field.kind {
        FieldKind::Derived { .. } => Ok(RawCell::Computed),
        FieldKind::Array {
            element_width,
            count,
            ..
        } => {
            let bytes = &line[field.byte_start..field.end()];
            let items = (0..count)
                .map(|i| decode(&bytes[i * element_width..(i + 1) * element_width]))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(RawCell::List(items))
        }
        _ => decode(&line[field.byte_start..field.end()]).map(RawCell::Scalar),
    }
}

/// Decode a whole file already in memory
pub fn decode_bytes(schema: &SchemaSet, source: &str, bytes: &[u8]) -> (Vec<Record>, ParseStats) {
    let mut records = Vec::new();
    let mut stats = ParseStats::default();

    for (idx, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let line_no = idx + 1;
        let line = raw.strip_suffix(b"\r").unwrap_or(raw);

        if line.is_empty() {
            stats.blank_lines += 1;
            continue;
        }
        stats.lines_read += 1;

        match decode_line(schema, line_no, line) {
            Ok(record) => records.push(record),
            Err(e) => {
                stats.decode_errors += 1;
                warn!(
                    source = source,
                    format = schema.code(),
                    line = line_no,
                    error = %e,
                    content = %text::decode_lossy(line),
                    "Skipping undecodable line"
                );
            }
        }
    }

    debug!(
        source = source,
        format = schema.code(),
        records = records.len(),
        lines_read = stats.lines_read,
        decode_errors = stats.decode_errors,
        "Decoded file"
    );

    (records, stats)
}

/// Read and decode one file with the given layout
pub fn parse_file(path: &Path, schema: &SchemaSet) -> Result<ParsedFile> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (records, stats) = decode_bytes(schema, &path.display().to_string(), &bytes);

    Ok(ParsedFile {
        path: path.to_path_buf(),
        format: schema.code(),
        records,
        stats,
    })
}

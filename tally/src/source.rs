//! Data source handling.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{StringRecord, StringRecordsIntoIter};

use crate::Error;

/// One row produced by a data source: ordered `(field, raw text)` pairs.
pub type Row = Vec<(String, String)>;

/// A source of rows for one destination table, parsed from the layout's
/// `kind:locator` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A CSV file whose first record is the header.
    Csv(PathBuf),
    /// A selector matching element nodes of externally supplied XML
    /// documents.
    Xml(String),
}

impl Source {
    /// Parse a `kind:locator` descriptor.
    pub fn parse(descriptor: &str) -> Result<Self, Error> {
        let (kind, locator) = descriptor
            .split_once(':')
            .ok_or_else(|| Error::InvalidDataSource(descriptor.to_string()))?;
        match kind {
            "csv" => Ok(Self::Csv(PathBuf::from(locator))),
            "xml" => Ok(Self::Xml(locator.to_string())),
            other => Err(Error::UnknownSourceKind(other.to_string())),
        }
    }
}

/// An iterator producing elements of type `Result<Row, Error>` read from a
/// CSV file, keyed by its header record. Finite, single-pass, not
/// restartable without reopening.
pub struct CsvRows {
    header: StringRecord,
    records: StringRecordsIntoIter<File>,
}

impl CsvRows {
    /// Open the given CSV file and read its header record.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut reader = csv::Reader::from_path(path)?;
        let header = reader.headers()?.clone();
        Ok(Self {
            header,
            records: reader.into_records(),
        })
    }
}

impl Iterator for CsvRows {
    type Item = Result<Row, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };
        Some(Ok(self
            .header
            .iter()
            .zip(record.iter())
            .map(|(field, value)| (field.to_string(), value.to_string()))
            .collect()))
    }
}

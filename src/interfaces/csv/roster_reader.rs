use crate::error::{Result, SantaError};
use serde::Deserialize;
use std::io::Read;

/// One participant row of an import file.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct RosterRow {
    pub name: String,
    pub email: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub language: Option<String>,
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Reads participants from a CSV source with a `name,email[,language]` header.
///
/// This reader wraps `csv::Reader`, trims whitespace and tolerates a missing
/// language column.
pub struct RosterReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RosterReader<R> {
    /// Creates a new `RosterReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes rows.
    pub fn rows(self) -> impl Iterator<Item = Result<RosterRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(SantaError::from))
    }
}

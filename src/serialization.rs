//! Serialization of service requests and run summaries.
//!
//! The exporter service writes every request it receives as NDJSON, one JSON
//! object per line, so a load can be dry-run, diffed or replayed later.

use serde::Serialize;
use std::io::Write;

/// Error type for serialization operations
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// NDJSON (Newline Delimited JSON) writer
///
/// Writes records as NDJSON, one JSON object per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    lines: usize,
}

impl<W: Write> NdjsonWriter<W> {
    /// Create a new NDJSON writer
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    /// Write a single record as an NDJSON line
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        let json = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", json)?;
        self.lines += 1;
        Ok(())
    }

    /// Write multiple records
    pub fn write_all<T: Serialize>(&mut self, records: &[T]) -> Result<(), SerializationError> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    /// Number of lines written so far
    pub fn lines_written(&self) -> usize {
        self.lines
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(mut self) -> Result<W, SerializationError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Pretty-printed JSON for a single document, e.g. a run summary
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, SerializationError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, ComponentType, Topology};

    #[derive(Serialize)]
    #[serde(tag = "op")]
    enum Request<'a> {
        CreateAction { action: &'a Action },
        CreateTopology { topology: &'a Topology },
    }

    #[test]
    fn test_ndjson_writer() {
        let action = Action::named("visits");
        let topology = Topology::from_components(&[ComponentType::Who, ComponentType::Where]);

        let mut writer = NdjsonWriter::new(Vec::new());
        writer.write(&Request::CreateAction { action: &action }).unwrap();
        writer
            .write(&Request::CreateTopology {
                topology: &topology,
            })
            .unwrap();
        assert_eq!(writer.lines_written(), 2);

        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"op\":\"CreateAction\""));
        assert!(lines[0].contains("visits"));
        assert!(lines[1].contains("\"where\""));
    }

    #[test]
    fn test_write_all_and_pretty() {
        let actions = vec![Action::named("a"), Action::with_id(7)];
        let mut buf = Vec::new();
        {
            let mut writer = NdjsonWriter::new(&mut buf);
            writer.write_all(&actions).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 2);

        let pretty = to_pretty_json(&actions[1]).unwrap();
        assert!(pretty.contains('\n'));
        assert!(pretty.contains("7"));
    }
}

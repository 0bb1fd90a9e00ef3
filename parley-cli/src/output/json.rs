//! JSON output formatter

use super::{DetectionRecord, OutputFormatter};
use anyhow::Result;
use std::io::Write;

/// JSON formatter - outputs detections as a JSON array
pub struct JsonFormatter<W: Write> {
    writer: W,
    records: Vec<DetectionRecord>,
}

impl<W: Write> JsonFormatter<W> {
    /// Create a new JSON formatter
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records: Vec::new(),
        }
    }
}

impl<W: Write> OutputFormatter for JsonFormatter<W> {
    fn format_record(&mut self, record: &DetectionRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, &self.records)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

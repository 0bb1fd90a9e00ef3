//! Plain text output formatter

use super::{DetectionRecord, OutputFormatter};
use anyhow::Result;
use std::io::{self, Write};

/// Plain text formatter - outputs one detection per line
pub struct TextFormatter<W: Write> {
    writer: W,
}

impl<W: Write> TextFormatter<W> {
    /// Create a new text formatter
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl TextFormatter<io::Stdout> {
    /// Create a formatter that writes to stdout
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> OutputFormatter for TextFormatter<W> {
    fn format_record(&mut self, record: &DetectionRecord) -> Result<()> {
        write!(
            self.writer,
            "{}\t{:.2}\t{}\t{}",
            record.language,
            record.confidence,
            record.reason,
            record.text.trim()
        )?;
        if let Some(analysis) = record.code_switch.as_ref().filter(|a| a.is_mixed) {
            let spans: Vec<String> = analysis
                .spans
                .iter()
                .map(|span| format!("{}: {}", span.language, span.text))
                .collect();
            write!(self.writer, "\t[{}]", spans.join(" | "))?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

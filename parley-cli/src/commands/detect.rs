//! Detect command implementation

use crate::config::DetectorArgs;
use crate::error::CliError;
use crate::output::{create_formatter, DetectionRecord};
use anyhow::Result;
use clap::Args;
use parley_core::DetectOptions;
use std::io;

/// Arguments for the detect command
#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Texts to identify, each on its own
    #[arg(value_name = "TEXT", required = true)]
    pub texts: Vec<String>,

    /// Also split each text into same-language spans
    #[arg(long)]
    pub code_switch: bool,

    #[command(flatten)]
    pub detector: DetectorArgs,
}

impl DetectArgs {
    /// Execute the detect command
    pub fn execute(&self) -> Result<()> {
        self.detector.init_logging();
        log::debug!("Arguments: {:?}", self);

        let detector = self.detector.build_detector()?;
        let options = DetectOptions::new().mode(self.detector.mode());
        let mut formatter = create_formatter(self.detector.format, io::stdout().lock());

        for text in &self.texts {
            let result = detector
                .detect_with(text, &options)
                .map_err(CliError::from)?;
            log::info!("{text:?}: {result}");
            let mut record = DetectionRecord::new(text, &result);
            if self.code_switch {
                record = record.with_code_switch(detector.detect_code_switching(text));
            }
            formatter.format_record(&record)?;
        }
        formatter.finish()
    }
}

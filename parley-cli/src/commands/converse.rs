//! Converse command implementation

use crate::config::DetectorArgs;
use crate::error::CliError;
use crate::output::{create_formatter, DetectionRecord};
use crate::store::FileContextStore;
use anyhow::Result;
use clap::Args;
use parley_core::context::ContextStore;
use parley_core::{ConversationContext, DetectOptions};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Arguments for the converse command
#[derive(Debug, Args)]
pub struct ConverseArgs {
    /// File with one message per line (default: stdin)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Continue and persist the conversation stored under this id
    #[arg(short, long, value_name = "ID")]
    pub session: Option<String>,

    /// Directory holding session files
    #[arg(
        long,
        value_name = "DIR",
        env = "PARLEY_SESSION_DIR",
        default_value = ".parley/sessions"
    )]
    pub session_dir: PathBuf,

    /// Discard the stored session before reading messages
    #[arg(long, requires = "session")]
    pub reset: bool,

    /// Also split each message into same-language spans
    #[arg(long)]
    pub code_switch: bool,

    #[command(flatten)]
    pub detector: DetectorArgs,
}

impl ConverseArgs {
    /// Execute the converse command
    pub fn execute(&self) -> Result<()> {
        self.detector.init_logging();
        log::debug!("Arguments: {:?}", self);

        let detector = self.detector.build_detector()?;
        let store = FileContextStore::new(&self.session_dir);
        let context = self.open_context(&store)?;
        let input = self.read_input()?;

        let options = DetectOptions::new()
            .context(&context)
            .mode(self.detector.mode());
        let mut formatter = create_formatter(self.detector.format, io::stdout().lock());

        for line in input.lines().filter(|l| !l.trim().is_empty()) {
            let result = detector
                .detect_with(line, &options)
                .map_err(CliError::from)?;
            log::info!("turn {}: {result}", context.len());
            let mut record = DetectionRecord::new(line, &result);
            if self.code_switch {
                record = record.with_code_switch(detector.detect_code_switching(line));
            }
            formatter.format_record(&record)?;
        }
        formatter.finish()?;

        if let Some(session) = &self.session {
            store
                .save(session, &context)
                .map_err(|e| CliError::SessionError(e.to_string()))?;
            log::info!("session '{session}' now has {} turns", context.len());
        }
        Ok(())
    }

    fn open_context(&self, store: &FileContextStore) -> Result<ConversationContext> {
        let Some(session) = &self.session else {
            return Ok(ConversationContext::new());
        };
        let session_error = |e: parley_core::Error| CliError::SessionError(e.to_string());
        if self.reset {
            store.delete(session).map_err(session_error)?;
        }
        let context = store.load(session).map_err(session_error)?;
        Ok(context.unwrap_or_default())
    }

    fn read_input(&self) -> Result<String> {
        match &self.input {
            Some(path) => Ok(fs::read_to_string(path)
                .map_err(|e| CliError::InputNotFound(format!("{}: {e}", path.display())))?),
            None => Ok(io::read_to_string(io::stdin())?),
        }
    }
}

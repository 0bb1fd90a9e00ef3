//! Ensemble language identification for short conversational text
//!
//! Several language identifiers ("backends") are consulted and their
//! answers combined by a voting strategy. Scripts that belong to a single
//! language are decided without any backend, known confusable pairs
//! (Spanish/Portuguese, Norwegian/Danish, ...) are corrected with
//! discriminating features, and a conversation context tilts ambiguous
//! one-word messages towards the language of the preceding turns.
//!
//! ```no_run
//! use parley_core::{ConversationContext, LanguageDetector};
//!
//! let detector = LanguageDetector::new()?;
//! let context = ConversationContext::new();
//! let first = detector.detect_in_context("Bonjour!", &context)?;
//! let second = detector.detect_in_context("Bien", &context)?;
//! assert_eq!(first.language, second.language);
//! # Ok::<(), parley_core::Error>(())
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod cache;
pub mod codeswitch;
pub mod config;
pub mod confusion;
pub mod context;
pub mod detector;
pub mod ensemble;
pub mod error;
pub mod executor;
pub mod hints;
pub mod normalize;
pub mod preprocess;
pub mod script;
pub mod types;
pub mod voting;

// Re-export key types
pub use backend::{Backend, BackendDescriptor, BackendRegistry, LatencyClass};
pub use cache::CacheStats;
pub use codeswitch::{CodeSwitchDetector, CodeSwitchResult, CodeSwitchSpan};
pub use config::DetectorConfig;
pub use confusion::ConfusionResolver;
pub use context::{ContextSnapshot, ContextStore, ConversationContext, MemoryContextStore, Turn};
pub use detector::{default_detector, detect, detect_with, DetectOptions, DetectorBuilder, LanguageDetector};
pub use error::{Error, Result};
pub use hints::HintDictionary;
pub use preprocess::{ProperNounFilter, ProperNounStrategy};
pub use script::Script;
pub use types::{BackendResult, Candidate, DetectionMode, DetectionResult, Reason, UNDETERMINED};
pub use voting::{Ballot, ScoreTable, VotingStrategy};

//! Log tailing, traceback reconstruction and error diagnosis for ComfyUI.
//!
//! The pipeline reads the host's log incrementally, rebuilds multi-line
//! Python tracebacks into structured records, keeps a bounded history and
//! matches errors against an ordered catalog of diagnostic rules.

pub mod error;
pub mod extractor;
pub mod file_changes;
pub mod history;
pub mod log_buffer;
pub mod matcher;
pub mod patterns;
pub mod pipeline;
pub mod record;
pub mod tailer;
pub mod traceback;
pub mod workflow_health;

pub use error::{BridgeError, Result};
pub use extractor::ErrorExtractor;
pub use file_changes::{ChangeKind, FileChange, FileChangeLog};
pub use history::{ErrorHistory, KindCount};
pub use log_buffer::LogBuffer;
pub use matcher::{match_pattern, PatternMatch, PatternMatcher};
pub use patterns::{DiagnosticRule, PatternCatalog, RuleSource, RuleSpec};
pub use pipeline::{LogPipeline, PipelineLimits, PollSummary};
pub use record::{ErrorOrigin, StructuredError};
pub use tailer::{FileIdentity, LogPosition, LogTailer};
pub use traceback::TracebackReconstructor;
pub use workflow_health::{check_workflow_health, HealthReport};

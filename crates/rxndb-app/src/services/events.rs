//! Progress stream emitted by the rebuild and offline build pipelines.
//!
//! Every event renders as a single bracketed status line (`[SKIP] ...`,
//! `[PROGRESS] ...`) so CLIs, schedulers and UIs can display the same text.

use std::fmt;
use std::path::PathBuf;

use crate::ingestion::CollectorIssue;

/// Short status tag carried by every event line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    Start,
    Info,
    Skip,
    Warn,
    Miss,
    Err,
    Progress,
    Done,
}

impl EventTag {
    pub fn as_str(self) -> &'static str {
        match self {
            EventTag::Start => "START",
            EventTag::Info => "INFO",
            EventTag::Skip => "SKIP",
            EventTag::Warn => "WARN",
            EventTag::Miss => "MISS",
            EventTag::Err => "ERR",
            EventTag::Progress => "PROGRESS",
            EventTag::Done => "DONE",
        }
    }
}

/// Pipeline stage that produced a per-task error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    Import,
    Validate,
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStage::Import => f.write_str("IMPORT"),
            TaskStage::Validate => f.write_str("VALIDATE"),
        }
    }
}

/// Structured status events.
#[derive(Debug, Clone, PartialEq)]
pub enum RebuildEvent {
    /// A collection, ledger entry or ledger file was passed over.
    Collector(CollectorIssue),
    /// The live store failed integrity checks and is being recreated.
    StoreCorrupted { path: PathBuf, reason: String },
    /// No build tasks were collected; nothing to import.
    NothingToImport,
    Started {
        total: usize,
        batches: usize,
        batch_size: usize,
    },
    TaskFailed {
        stage: TaskStage,
        collection: u32,
        source: PathBuf,
        message: String,
    },
    /// A validated entry did not touch any store row.
    NoRowsValidated { collection: u32, source: PathBuf },
    BatchCompleted {
        processed: usize,
        total: usize,
        imported: usize,
        validation_updates: usize,
    },
    IndexRebuilt,
    IndexRebuildFailed { message: String },
    Finished { reactions: u64, measurements: u64 },
}

impl RebuildEvent {
    pub fn tag(&self) -> EventTag {
        match self {
            RebuildEvent::Collector(issue) => issue.tag(),
            RebuildEvent::StoreCorrupted { .. } => EventTag::Warn,
            RebuildEvent::NothingToImport => EventTag::Info,
            RebuildEvent::Started { .. } => EventTag::Start,
            RebuildEvent::TaskFailed { .. } => EventTag::Err,
            RebuildEvent::NoRowsValidated { .. } => EventTag::Warn,
            RebuildEvent::BatchCompleted { .. } => EventTag::Progress,
            RebuildEvent::IndexRebuilt => EventTag::Info,
            RebuildEvent::IndexRebuildFailed { .. } => EventTag::Warn,
            RebuildEvent::Finished { .. } => EventTag::Done,
        }
    }

    /// Percentage of tasks processed, for progress events.
    pub fn percent(&self) -> Option<f64> {
        match self {
            RebuildEvent::BatchCompleted {
                processed, total, ..
            } if *total > 0 => Some(*processed as f64 * 100.0 / *total as f64),
            _ => None,
        }
    }
}

impl fmt::Display for RebuildEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.tag().as_str())?;
        match self {
            RebuildEvent::Collector(issue) => write!(f, " {issue}"),
            RebuildEvent::StoreCorrupted { path, reason } => write!(
                f,
                " store {} appears corrupted ({reason}); recreating",
                path.display()
            ),
            RebuildEvent::NothingToImport => {
                f.write_str(" no sources discovered from validation ledgers; nothing to import")
            }
            RebuildEvent::Started {
                total,
                batches,
                batch_size,
            } => write!(
                f,
                " importing {total} sources in {batches} batches (batch_size={batch_size})"
            ),
            RebuildEvent::TaskFailed {
                stage,
                collection,
                source,
                message,
            } => write!(
                f,
                "[{stage}] table={collection} source={}: {message}",
                source.display()
            ),
            RebuildEvent::NoRowsValidated { collection, source } => write!(
                f,
                " table={collection} source={}: no rows updated for validated source",
                source.display()
            ),
            RebuildEvent::BatchCompleted {
                processed,
                total,
                imported,
                validation_updates,
            } => write!(
                f,
                " {processed}/{total} ({:.1}%) | batch_imported={imported} batch_validated_updates={validation_updates}",
                self.percent().unwrap_or(100.0)
            ),
            RebuildEvent::IndexRebuilt => write!(f, " rebuilt full-text index"),
            RebuildEvent::IndexRebuildFailed { message } => {
                write!(f, " failed to rebuild full-text index: {message}")
            }
            RebuildEvent::Finished {
                reactions,
                measurements,
            } => write!(
                f,
                " store ready. reactions={reactions}, measurements={measurements}"
            ),
        }
    }
}

/// Consumer of pipeline events.
pub trait ProgressSink {
    fn emit(&mut self, event: RebuildEvent);
}

/// Default sink: forwards each event to `tracing` at a level matching its tag.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&mut self, event: RebuildEvent) {
        log_event(&event);
    }
}

/// Collecting sink; useful for callers that render events after the run.
impl ProgressSink for Vec<RebuildEvent> {
    fn emit(&mut self, event: RebuildEvent) {
        self.push(event);
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn emit(&mut self, event: RebuildEvent) {
        (**self).emit(event);
    }
}

/// Log an event through `tracing`.
pub fn log_event(event: &RebuildEvent) {
    let tag = event.tag().as_str();
    match event.tag() {
        EventTag::Err => tracing::error!(tag, "{event}"),
        EventTag::Warn | EventTag::Miss => tracing::warn!(tag, "{event}"),
        EventTag::Skip | EventTag::Info => tracing::info!(tag, "{event}"),
        EventTag::Start | EventTag::Progress | EventTag::Done => tracing::info!(tag, "{event}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_reports_percentage_and_counts() {
        let event = RebuildEvent::BatchCompleted {
            processed: 2,
            total: 5,
            imported: 7,
            validation_updates: 3,
        };
        assert_eq!(
            event.to_string(),
            "[PROGRESS] 2/5 (40.0%) | batch_imported=7 batch_validated_updates=3"
        );
    }

    #[test]
    fn task_failure_names_collection_and_source() {
        let event = RebuildEvent::TaskFailed {
            stage: TaskStage::Import,
            collection: 7,
            source: PathBuf::from("/data/a.csv"),
            message: "bad row".to_string(),
        };
        let line = event.to_string();
        assert!(line.starts_with("[ERR][IMPORT]"));
        assert!(line.contains("table=7"));
        assert!(line.contains("/data/a.csv"));
    }

    #[test]
    fn summary_uses_done_tag() {
        let event = RebuildEvent::Finished {
            reactions: 3,
            measurements: 4,
        };
        assert_eq!(event.tag(), EventTag::Done);
        assert!(event.to_string().starts_with("[DONE]"));
    }

    #[test]
    fn vec_sink_collects_in_order() {
        let mut sink: Vec<RebuildEvent> = Vec::new();
        sink.emit(RebuildEvent::NothingToImport);
        sink.emit(RebuildEvent::IndexRebuilt);
        assert_eq!(
            sink,
            vec![RebuildEvent::NothingToImport, RebuildEvent::IndexRebuilt]
        );
    }
}

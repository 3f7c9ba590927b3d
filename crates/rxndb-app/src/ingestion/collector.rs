//! Source collector: turns validation ledgers into build tasks.
//!
//! Collections are visited in configured order and ledger entries in file
//! order. A missing or corrupt ledger only affects its own collection; an
//! entry without a source file only affects itself. Every pass-over is
//! reported as a [`CollectorIssue`].

use std::fmt;
use std::path::{Path, PathBuf};

use crate::constants::{FALLBACK_SOURCE_EXT, PRIMARY_SOURCE_EXT};
use crate::ingestion::ledger::{self, ValidationRecord};
use crate::paths::{AppPaths, CollectionPaths, collection_id};
use crate::services::events::EventTag;

/// One unit of import work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTask {
    pub collection: u32,
    pub source: PathBuf,
    pub record: ValidationRecord,
}

/// Reason a collection or ledger entry produced no build task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorIssue {
    /// The collection has no ledger file.
    MissingLedger { collection: String, ledger: PathBuf },
    /// The ledger exists but could not be read or parsed.
    LedgerUnreadable {
        collection: String,
        ledger: PathBuf,
        message: String,
    },
    /// Neither the primary nor the fallback source file exists.
    MissingSource {
        collection: String,
        image: String,
        candidates: [PathBuf; 2],
    },
}

impl CollectorIssue {
    pub fn tag(&self) -> EventTag {
        match self {
            CollectorIssue::MissingLedger { .. } => EventTag::Skip,
            CollectorIssue::LedgerUnreadable { .. } => EventTag::Warn,
            CollectorIssue::MissingSource { .. } => EventTag::Miss,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            CollectorIssue::MissingLedger { collection, .. }
            | CollectorIssue::LedgerUnreadable { collection, .. }
            | CollectorIssue::MissingSource { collection, .. } => collection,
        }
    }
}

impl fmt::Display for CollectorIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorIssue::MissingLedger { collection, ledger } => write!(
                f,
                "{collection} has no validation ledger at {}",
                ledger.display()
            ),
            CollectorIssue::LedgerUnreadable {
                collection,
                ledger,
                message,
            } => write!(
                f,
                "{collection}: failed to load {}: {message}",
                ledger.display()
            ),
            CollectorIssue::MissingSource {
                collection,
                image,
                candidates,
            } => write!(
                f,
                "{collection} image {image}: no source file at {} or {}",
                candidates[0].display(),
                candidates[1].display()
            ),
        }
    }
}

/// Result of scanning all collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    pub tasks: Vec<BuildTask>,
    pub issues: Vec<CollectorIssue>,
}

/// Scan `collections` under `paths` and resolve every ledger entry to a source
/// file. Names that do not map to a numeric collection id are ignored.
pub fn collect_sources<S: AsRef<str>>(paths: &AppPaths, collections: &[S]) -> Collection {
    let mut out = Collection::default();

    for name in collections {
        let name = name.as_ref();
        let Some(id) = collection_id(name) else {
            tracing::debug!(collection = name, "not a managed collection; ignoring");
            continue;
        };
        let layout = paths.collection(name);
        collect_collection(name, id, &layout, &mut out);
    }

    out
}

fn collect_collection(name: &str, id: u32, layout: &CollectionPaths, out: &mut Collection) {
    if !layout.ledger.exists() {
        out.issues.push(CollectorIssue::MissingLedger {
            collection: name.to_string(),
            ledger: layout.ledger.clone(),
        });
        return;
    }

    let entries = match ledger::load(&layout.ledger) {
        Ok(entries) => entries,
        Err(err) => {
            out.issues.push(CollectorIssue::LedgerUnreadable {
                collection: name.to_string(),
                ledger: layout.ledger.clone(),
                message: err.to_string(),
            });
            return;
        }
    };

    for entry in entries {
        match resolve_source(&layout.source_dir, &entry.image) {
            Ok(source) => out.tasks.push(BuildTask {
                collection: id,
                source,
                record: entry.record,
            }),
            Err(candidates) => out.issues.push(CollectorIssue::MissingSource {
                collection: name.to_string(),
                image: entry.image,
                candidates,
            }),
        }
    }
}

/// Resolve an image identifier to its tabular source file.
///
/// The base name is the image's file stem. The primary extension wins when
/// both candidates exist. On failure the two probed paths are returned.
pub fn resolve_source(source_dir: &Path, image: &str) -> Result<PathBuf, [PathBuf; 2]> {
    let stem = Path::new(image)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| image.to_string());
    let primary = source_dir.join(format!("{stem}.{PRIMARY_SOURCE_EXT}"));
    let fallback = source_dir.join(format!("{stem}.{FALLBACK_SOURCE_EXT}"));

    if primary.is_file() {
        Ok(primary)
    } else if fallback.is_file() {
        Ok(fallback)
    } else {
        Err([primary, fallback])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_ledger(paths: &AppPaths, collection: &str, body: &str) -> CollectionPaths {
        let layout = paths.collection(collection);
        fs::create_dir_all(&layout.source_dir).expect("source dir");
        fs::write(&layout.ledger, body).expect("ledger");
        layout
    }

    #[test]
    fn primary_extension_wins_when_both_exist() {
        // Precedence is current behaviour, not a guarantee of the ledger format.
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("img.csv"), "a").expect("csv");
        fs::write(temp.path().join("img.tsv"), "b").expect("tsv");
        let resolved = resolve_source(temp.path(), "img.png").expect("resolves");
        assert_eq!(resolved, temp.path().join("img.csv"));
    }

    #[test]
    fn fallback_extension_used_when_primary_absent() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("img.tsv"), "b").expect("tsv");
        let resolved = resolve_source(temp.path(), "img.png").expect("resolves");
        assert_eq!(resolved, temp.path().join("img.tsv"));
    }

    #[test]
    fn unresolved_entry_reports_both_candidates() {
        let temp = TempDir::new().expect("temp dir");
        let err = resolve_source(temp.path(), "gone.png").expect_err("nothing on disk");
        assert_eq!(err[0], temp.path().join("gone.csv"));
        assert_eq!(err[1], temp.path().join("gone.tsv"));
    }

    #[test]
    fn unmanaged_collection_names_are_silently_ignored() {
        let temp = TempDir::new().expect("temp dir");
        let paths = AppPaths::new(temp.path()).expect("paths");
        let result = collect_sources(&paths, &["uploads", "scratch"]);
        assert!(result.tasks.is_empty());
        assert!(result.issues.is_empty());
    }

    #[test]
    fn corrupt_ledger_does_not_stop_other_collections() {
        let temp = TempDir::new().expect("temp dir");
        let paths = AppPaths::new(temp.path()).expect("paths");
        write_ledger(&paths, "table5", "{broken");
        let good = write_ledger(&paths, "table6", r#"{"x.png": true}"#);
        fs::write(good.source_dir.join("x.csv"), "1\tn\tA -> B\n").expect("source");

        let result = collect_sources(&paths, &["table5", "table6"]);
        assert_eq!(result.tasks.len(), 1);
        assert_eq!(result.tasks[0].collection, 6);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].tag(), EventTag::Warn);
        assert_eq!(result.issues[0].collection(), "table5");
    }

    #[test]
    fn missing_source_skips_only_that_entry() {
        let temp = TempDir::new().expect("temp dir");
        let paths = AppPaths::new(temp.path()).expect("paths");
        let layout = write_ledger(
            &paths,
            "table7",
            r#"{"a.png": true, "b.png": {"validated": false}, "c.png": true}"#,
        );
        fs::write(layout.source_dir.join("a.csv"), "").expect("a");
        fs::write(layout.source_dir.join("c.tsv"), "").expect("c");

        let result = collect_sources(&paths, &["table7"]);
        let sources: Vec<_> = result.tasks.iter().map(|t| t.source.clone()).collect();
        assert_eq!(
            sources,
            vec![layout.source_dir.join("a.csv"), layout.source_dir.join("c.tsv")]
        );
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].tag(), EventTag::Miss);
    }
}

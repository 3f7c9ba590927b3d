use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

use rxndb_app::ingestion::collect_sources;
use rxndb_app::paths::{AppPaths, CollectionPaths};
use rxndb_app::services::{
    EventTag, RebuildEvent, RebuildOptions, Rebuilder, RetryPolicy, TaskStage,
};
use rxndb_app::store::{count_rows, open_or_create};
use tempfile::TempDir;

fn options(store: &Path, batch_size: usize) -> RebuildOptions {
    RebuildOptions::builder()
        .store_path(store)
        .batch_size(batch_size)
        .busy_timeout(Duration::from_millis(50))
        .clear_retry(RetryPolicy::new(3, Duration::from_millis(1)))
        .delete_retry(RetryPolicy::new(3, Duration::from_millis(1)))
        .build()
}

fn collection_dir(paths: &AppPaths, name: &str) -> CollectionPaths {
    let layout = paths.collection(name);
    fs::create_dir_all(&layout.source_dir).expect("create source dir");
    layout
}

fn rows(prefix: &str, n: usize) -> String {
    (0..n)
        .map(|i| format!("{i}\t{prefix} reaction {i}\t{prefix}{i} + OH -> P{i}\t7\t1.0 x10^9\t\tR{i}\n"))
        .collect()
}

#[test]
fn missing_ledger_is_skipped_and_other_collection_imports() {
    let temp = TempDir::new().expect("temp dir");
    let paths = AppPaths::new(temp.path().join("data")).expect("paths");
    let t5 = collection_dir(&paths, "table5");
    fs::write(&t5.ledger, r#"{"imgA.png": true}"#).expect("ledger");
    fs::write(t5.source_dir.join("imgA.csv"), rows("a", 2)).expect("source");

    let collection = collect_sources(&paths, &["table5", "table6"]);
    assert_eq!(collection.tasks.len(), 1);
    assert_eq!(collection.tasks[0].collection, 5);
    assert_eq!(collection.tasks[0].source, t5.source_dir.join("imgA.csv"));
    assert!(collection.tasks[0].record.validated);
    assert!(collection.tasks[0].record.by.is_none());

    let store = temp.path().join("reactions.db");
    let mut events = Vec::new();
    let summary = Rebuilder::new(options(&store, 50))
        .rebuild(collection, &mut events)
        .expect("rebuild");

    let skips: Vec<_> = events
        .iter()
        .filter(|e| e.tag() == EventTag::Skip)
        .collect();
    assert_eq!(skips.len(), 1);
    assert!(skips[0].to_string().contains("table6"));

    assert_eq!(summary.counts.reactions, 2);
    assert_eq!(summary.counts.validated, 2);
    let conn = open_or_create(&store).expect("open store");
    let other_tables: i64 = conn
        .query_row("SELECT COUNT(*) FROM reactions WHERE table_no <> 5", [], |r| r.get(0))
        .expect("count");
    assert_eq!(other_tables, 0);
}

#[test]
fn failing_task_does_not_abort_its_batch() {
    let temp = TempDir::new().expect("temp dir");
    let paths = AppPaths::new(temp.path().join("data")).expect("paths");
    let t7 = collection_dir(&paths, "table7");

    let mut ledger = String::from("{");
    for k in 1..=5 {
        if k > 1 {
            ledger.push(',');
        }
        ledger.push_str(&format!(r#""img{k}.png": true"#));
        let source = t7.source_dir.join(format!("img{k}.csv"));
        if k == 3 {
            // Not UTF-8: the importer cannot read it.
            fs::write(&source, [0xff_u8, 0xfe, 0x00, 0x9f]).expect("bad source");
        } else {
            fs::write(&source, rows(&format!("t{k}x"), k)).expect("source");
        }
    }
    ledger.push('}');
    fs::write(&t7.ledger, ledger).expect("ledger");

    let collection = collect_sources(&paths, &["table7"]);
    assert_eq!(collection.tasks.len(), 5);

    let store = temp.path().join("reactions.db");
    let mut events = Vec::new();
    let summary = Rebuilder::new(options(&store, 2))
        .rebuild(collection, &mut events)
        .expect("rebuild completes");

    let progress: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RebuildEvent::BatchCompleted {
                processed,
                total,
                imported,
                ..
            } => Some((*processed, *total, *imported)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(2, 5, 1 + 2), (4, 5, 4), (5, 5, 5)]);

    let failures: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RebuildEvent::TaskFailed { stage, source, .. } => Some((*stage, source.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        failures,
        vec![(TaskStage::Import, t7.source_dir.join("img3.csv"))]
    );

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.rows_imported, 1 + 2 + 4 + 5);
    assert_eq!(summary.counts.reactions, 12);
    assert_eq!(summary.counts.measurements, 12);
    assert!(matches!(
        events.last(),
        Some(RebuildEvent::Finished {
            reactions: 12,
            measurements: 12
        })
    ));
}

#[test]
fn corrupted_store_is_recreated_and_import_completes() {
    let temp = TempDir::new().expect("temp dir");
    let paths = AppPaths::new(temp.path().join("data")).expect("paths");
    let t8 = collection_dir(&paths, "table8");
    fs::write(&t8.ledger, r#"{"p1.png": {"validated": true, "by": "eve", "at": "2024-03-04"}}"#)
        .expect("ledger");
    fs::write(t8.source_dir.join("p1.tsv"), rows("c", 3)).expect("source");

    let store = temp.path().join("reactions.db");
    fs::write(&store, vec![0x5a_u8; 16 * 1024]).expect("garbage store");

    let mut events = Vec::new();
    let summary = Rebuilder::new(options(&store, 50))
        .rebuild(collect_sources(&paths, &["table8"]), &mut events)
        .expect("recovers");

    assert!(summary.recreated);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, RebuildEvent::StoreCorrupted { .. }))
    );
    assert_eq!(summary.counts.reactions, 3);
    assert_eq!(summary.counts.validated, 3);

    let conn = open_or_create(&store).expect("store is usable");
    let by: String = conn
        .query_row("SELECT DISTINCT validated_by FROM reactions", [], |r| r.get(0))
        .expect("validated_by");
    assert_eq!(by, "eve");
}

fn seed_store(store: &Path, temp: &Path, n: usize) {
    let seed = temp.join("seed.csv");
    fs::write(&seed, rows("s", n)).expect("seed source");
    Rebuilder::new(options(store, 50))
        .run(
            &[rxndb_app::ingestion::BuildTask {
                collection: 5,
                source: seed,
                record: Default::default(),
            }],
            &mut Vec::new(),
        )
        .expect("seed run");
}

/// Overwrite the root page of `table` with garbage, leaving page 1 intact.
fn damage_table(store: &Path, table: &str) {
    let (root, page_size): (i64, i64) = {
        let conn = open_or_create(store).expect("open seeded store");
        let root = conn
            .query_row(
                "SELECT rootpage FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |r| r.get(0),
            )
            .expect("root page");
        let page_size = conn
            .query_row("PRAGMA page_size", [], |r| r.get(0))
            .expect("page size");
        (root, page_size)
    };
    assert!(root > 1);
    let mut file = OpenOptions::new().write(true).open(store).expect("open file");
    file.seek(SeekFrom::Start(((root - 1) * page_size) as u64))
        .expect("seek");
    file.write_all(&vec![0x5a_u8; page_size as usize])
        .expect("garbage page");
}

#[test]
fn corruption_found_while_clearing_recreates_store() {
    let temp = TempDir::new().expect("temp dir");
    let paths = AppPaths::new(temp.path().join("data")).expect("paths");
    let t8 = collection_dir(&paths, "table8");
    fs::write(&t8.ledger, r#"{"p1.png": true}"#).expect("ledger");
    fs::write(t8.source_dir.join("p1.csv"), rows("c", 3)).expect("source");

    let store = temp.path().join("reactions.db");
    seed_store(&store, temp.path(), 200);
    damage_table(&store, "measurements");
    // The header and schema still read, so the damage only shows up on delete.
    drop(open_or_create(&store).expect("damaged store still opens"));

    let mut events = Vec::new();
    let summary = Rebuilder::new(options(&store, 50))
        .rebuild(collect_sources(&paths, &["table8"]), &mut events)
        .expect("recovers");

    assert!(summary.recreated);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, RebuildEvent::StoreCorrupted { .. }))
    );
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.counts.reactions, 3);
    assert_eq!(summary.counts.measurements, 3);
    assert!(matches!(
        events.last(),
        Some(RebuildEvent::Finished {
            reactions: 3,
            measurements: 3
        })
    ));
}

#[test]
fn repeated_rebuild_converges_to_same_rows() {
    let temp = TempDir::new().expect("temp dir");
    let paths = AppPaths::new(temp.path().join("data")).expect("paths");
    let t9 = collection_dir(&paths, "table9");
    fs::write(&t9.ledger, r#"{"x.png": true, "y.png": false}"#).expect("ledger");
    fs::write(t9.source_dir.join("x.csv"), rows("x", 3)).expect("x");
    fs::write(t9.source_dir.join("y.csv"), rows("x", 3)).expect("y shares formulas");

    let store = temp.path().join("reactions.db");
    let rebuilder = Rebuilder::new(options(&store, 1));
    let first = rebuilder
        .rebuild(collect_sources(&paths, &["table9"]), &mut Vec::new())
        .expect("first");
    let second = rebuilder
        .rebuild(collect_sources(&paths, &["table9"]), &mut Vec::new())
        .expect("second");
    assert_eq!(first.counts, second.counts);
    assert_eq!(second.counts.reactions, 3);
    assert_eq!(second.counts.measurements, 6);

    let conn = open_or_create(&store).expect("open");
    assert_eq!(count_rows(&conn, "references_map").expect("refs"), 3);
}

#[test]
fn no_tasks_leaves_store_untouched() {
    let temp = TempDir::new().expect("temp dir");
    let paths = AppPaths::new(temp.path().join("data")).expect("paths");
    let store = temp.path().join("reactions.db");

    seed_store(&store, temp.path(), 2);
    let seeded = open_or_create(&store).expect("seeded store");
    assert_eq!(count_rows(&seeded, "reactions").expect("reactions"), 2);
    drop(seeded);

    let mut events = Vec::new();
    let summary = Rebuilder::new(options(&store, 50))
        .rebuild(collect_sources(&paths, &["table5"]), &mut events)
        .expect("no-op");
    assert_eq!(summary.counts.reactions, 2);
    assert!(events.contains(&RebuildEvent::NothingToImport));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, RebuildEvent::Started { .. }))
    );
}

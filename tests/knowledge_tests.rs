//! Linearizability of versioned knowledge-base writes.

use std::sync::Arc;

use wayfarer::knowledge::{KnowledgeStore, WriteOutcome};

#[test]
fn racing_writers_never_both_commit_the_same_version() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(KnowledgeStore::open(dir.path()).unwrap());
    store.write("persona", "seed", 0).unwrap();

    // Both racers read version 1 before either is allowed to write, then
    // CAS on the same expected version.
    let barrier = Arc::new(std::sync::Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|i| {
            let store = store.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let doc = store.read("persona").unwrap();
                assert_eq!(doc.version, 1);
                barrier.wait();
                store
                    .write("persona", format!("update from racer {}", i), doc.version)
                    .unwrap()
            })
        })
        .collect();

    let outcomes: Vec<WriteOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let commits = outcomes.iter().filter(|o| o.is_committed()).count();
    assert_eq!(commits, 1, "exactly one racer may win the CAS");
    assert_eq!(store.read("persona").unwrap().version, 2);
}

#[test]
fn conflicted_writer_converges_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = KnowledgeStore::open(dir.path()).unwrap();
    store.write("persona", "first", 0).unwrap();

    // Stale expectation loses, reload-and-recompute wins.
    match store.write("persona", "stale", 0).unwrap() {
        WriteOutcome::Conflict { actual_version } => {
            let current = store.read("persona").unwrap();
            assert_eq!(current.version, actual_version);
            let merged = format!("{}\nsecond", current.content);
            assert!(store.write("persona", merged, current.version).unwrap().is_committed());
        }
        WriteOutcome::Committed(_) => panic!("stale write must conflict"),
    }

    let doc = store.read("persona").unwrap();
    assert_eq!(doc.version, 2);
    assert!(doc.content.contains("first"));
    assert!(doc.content.contains("second"));
}

#[test]
fn every_superseded_version_is_auditable() {
    let dir = tempfile::tempdir().unwrap();
    let store = KnowledgeStore::open(dir.path()).unwrap();

    for i in 0..3u64 {
        store
            .write("persona", format!("revision {}", i + 1), i)
            .unwrap();
    }

    let history = store.document_history("persona").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "revision 1");
    assert_eq!(history[1].content, "revision 2");
    assert_eq!(store.read("persona").unwrap().content, "revision 3");
}

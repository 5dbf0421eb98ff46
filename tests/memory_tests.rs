//! Append-only guarantees of episodic memory on a real database file.

use std::sync::Arc;

use wayfarer::memory::{EpisodicMemory, RecordCategory, ReflexionRecord};

fn record(task_id: &str, attempt: u32, text: &str) -> ReflexionRecord {
    ReflexionRecord::new(
        task_id,
        attempt,
        "shell",
        text,
        RecordCategory::Attempt,
        5.0,
        format!("lesson from: {}", text),
    )
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.db");

    {
        let memory = EpisodicMemory::open(&path).unwrap();
        memory.append(record("t-001", 0, "first attempt")).unwrap();
        memory.append(record("t-001", 1, "second attempt")).unwrap();
    }

    let memory = EpisodicMemory::open(&path).unwrap();
    assert_eq!(memory.count().unwrap(), 2);
    let history = memory.history("t-001").unwrap();
    assert_eq!(history[0].observation, "first attempt");
}

#[test]
fn existing_records_never_change_as_the_log_grows() {
    let memory = EpisodicMemory::in_memory().unwrap();
    let first = memory.append(record("t-001", 0, "original content")).unwrap();

    let before = memory.history("t-001").unwrap();
    for i in 0..10 {
        memory.append(record("t-002", i, "later noise")).unwrap();
    }
    let after = memory.history("t-001").unwrap();

    assert_eq!(before.len(), after.len());
    assert_eq!(after[0].id, first.id);
    assert_eq!(after[0].observation, "original content");
    assert_eq!(after[0].reflection_text, before[0].reflection_text);
    assert_eq!(after[0].timestamp, before[0].timestamp);
}

#[test]
fn count_only_grows_under_concurrent_appends() {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(EpisodicMemory::open(dir.path().join("memory.db")).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let memory = memory.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    memory
                        .append(record(&format!("t-{:03}", worker + 1), i, "concurrent append"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(memory.count().unwrap(), 100);
    // Per-task order is strictly chronological by append.
    let history = memory.history("t-001").unwrap();
    assert_eq!(history.len(), 25);
    assert!(history.windows(2).all(|w| w[0].id < w[1].id));
}

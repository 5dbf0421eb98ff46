//! Versioned, file-backed knowledge base documents ("personas").
//!
//! Documents are mutated exclusively by the Meta-Cognition tier through
//! [`KnowledgeStore::write`], an optimistic-concurrency compare-and-swap on
//! the document version. Superseded versions are retained under a history
//! directory; nothing is ever deleted in place.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseDocument {
    pub name: String,
    pub version: u64,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeBaseDocument {
    /// A document that has never been written starts at version 0 with
    /// empty content; the first committed write produces version 1.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            content: String::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Outcome of a versioned write attempt.
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    Committed(KnowledgeBaseDocument),
    /// The document version moved since it was read. The caller must reload
    /// and recompute its change against the latest content.
    Conflict { actual_version: u64 },
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

pub struct KnowledgeStore {
    root: PathBuf,
    /// Serializes the read-check-write window so writes are linearizable
    /// per store; the version check handles cross-process racers.
    write_lock: Mutex<()>,
}

impl KnowledgeStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("history"))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn read(&self, name: &str) -> Result<KnowledgeBaseDocument> {
        let path = self.document_path(name);
        if !path.exists() {
            return Ok(KnowledgeBaseDocument::empty(name));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Compare-and-swap write. Succeeds only if the stored version still
    /// equals `expected_version`; the committed document carries
    /// `expected_version + 1`. The superseded version is copied into the
    /// history directory before the swap.
    pub fn write(
        &self,
        name: &str,
        new_content: impl Into<String>,
        expected_version: u64,
    ) -> Result<WriteOutcome> {
        let _guard = self.write_lock.lock();

        let current = self.read(name)?;
        if current.version != expected_version {
            debug!(
                document = name,
                expected = expected_version,
                actual = current.version,
                "Versioned write rejected"
            );
            return Ok(WriteOutcome::Conflict {
                actual_version: current.version,
            });
        }

        if current.version > 0 {
            let history_path = self
                .root
                .join("history")
                .join(format!("{}.v{}.json", name, current.version));
            std::fs::write(&history_path, serde_json::to_string_pretty(&current)?)?;
        }

        let doc = KnowledgeBaseDocument {
            name: name.to_string(),
            version: expected_version + 1,
            content: new_content.into(),
            updated_at: Utc::now(),
        };
        self.write_atomic(&self.document_path(name), &serde_json::to_string_pretty(&doc)?)?;

        info!(document = name, version = doc.version, "Knowledge base document committed");
        Ok(WriteOutcome::Committed(doc))
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// All superseded versions of a document, oldest first.
    pub fn document_history(&self, name: &str) -> Result<Vec<KnowledgeBaseDocument>> {
        let prefix = format!("{}.v", name);
        let mut docs = Vec::new();
        for entry in std::fs::read_dir(self.root.join("history"))? {
            let path = entry?.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
            {
                let content = std::fs::read_to_string(&path)?;
                docs.push(serde_json::from_str::<KnowledgeBaseDocument>(&content)?);
            }
        }
        docs.sort_by_key(|d| d.version);
        Ok(docs)
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }

    // tmp-write + rename, so a crash mid-write never leaves a torn document
    fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        if let Ok(file) = std::fs::File::open(&tmp_path) {
            let _ = file.sync_all();
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_document_starts_at_version_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path()).unwrap();
        let doc = store.read("shell-heuristics").unwrap();
        assert_eq!(doc.version, 0);
        assert!(doc.content.is_empty());
    }

    #[test]
    fn committed_write_increments_version_by_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path()).unwrap();

        let outcome = store.write("persona", "prefer apt over source builds", 0).unwrap();
        let WriteOutcome::Committed(doc) = outcome else {
            panic!("expected commit");
        };
        assert_eq!(doc.version, 1);
        assert_eq!(store.read("persona").unwrap().version, 1);
    }

    #[test]
    fn stale_version_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path()).unwrap();

        store.write("persona", "v1 content", 0).unwrap();
        let outcome = store.write("persona", "racing write", 0).unwrap();
        match outcome {
            WriteOutcome::Conflict { actual_version } => assert_eq!(actual_version, 1),
            WriteOutcome::Committed(_) => panic!("stale write must not commit"),
        }
    }

    #[test]
    fn superseded_versions_are_retained() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path()).unwrap();

        store.write("persona", "first", 0).unwrap();
        store.write("persona", "second", 1).unwrap();

        let history = store.document_history("persona").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 1);
        assert_eq!(history[0].content, "first");
    }
}

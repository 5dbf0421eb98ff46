//! The agent's self-model of available tools.
//!
//! Confidence scores grow on successful reflections and decay on failures.
//! Lookup is the hard precondition for dispatch; a missing entry is how a
//! capability gap is recognized, as opposed to a known tool failing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::memory::relevance::{overlap_score, signature};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityManifestEntry {
    pub tool_name: String,
    pub description: String,
    pub invocation_schema: serde_json::Value,
    pub confidence_score: f64,
    pub verified_at: Option<DateTime<Utc>>,
}

impl CapabilityManifestEntry {
    pub fn new(
        tool_name: impl Into<String>,
        description: impl Into<String>,
        confidence_score: f64,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            description: description.into(),
            invocation_schema: serde_json::json!({ "type": "object" }),
            confidence_score: confidence_score.clamp(0.0, 1.0),
            verified_at: None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.invocation_schema = schema;
        self
    }
}

#[derive(Default)]
pub struct CapabilityRegistry {
    entries: RwLock<HashMap<String, CapabilityManifestEntry>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: CapabilityManifestEntry) {
        debug!(tool = %entry.tool_name, confidence = entry.confidence_score, "Capability registered");
        self.entries
            .write()
            .insert(entry.tool_name.clone(), entry);
    }

    pub fn register_tool(
        &self,
        name: &str,
        description: &str,
        schema: serde_json::Value,
        confidence: f64,
    ) {
        self.register(CapabilityManifestEntry::new(name, description, confidence).with_schema(schema));
    }

    pub fn get(&self, name: &str) -> Option<CapabilityManifestEntry> {
        self.entries.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Entries plausibly relevant to a capability hint, ranked by token
    /// overlap against name and description. An exact name match always
    /// ranks first.
    pub fn lookup(&self, hint: &str) -> Vec<CapabilityManifestEntry> {
        let hint_sig = signature(hint);
        let entries = self.entries.read();

        let mut scored: Vec<(f64, CapabilityManifestEntry)> = entries
            .values()
            .filter_map(|entry| {
                if entry.tool_name == hint {
                    return Some((f64::MAX, entry.clone()));
                }
                let text = format!("{} {}", entry.tool_name, entry.description);
                let score = overlap_score(&hint_sig, &signature(&text));
                (score > 0.0).then(|| (score, entry.clone()))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, e)| e).collect()
    }

    /// Entries at or above a minimum confidence, for the Tier-2 trigger
    /// check: a hint with no sufficiently-confident entry is a gap.
    pub fn lookup_confident(&self, hint: &str, min_confidence: f64) -> Vec<CapabilityManifestEntry> {
        self.lookup(hint)
            .into_iter()
            .filter(|e| e.confidence_score >= min_confidence)
            .collect()
    }

    pub fn adjust_confidence(&self, tool_name: &str, delta: f64) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(tool_name) {
            let old = entry.confidence_score;
            entry.confidence_score = (entry.confidence_score + delta).clamp(0.0, 1.0);
            debug!(
                tool = tool_name,
                from = old,
                to = entry.confidence_score,
                "Confidence adjusted"
            );
        }
    }

    pub fn mark_verified(&self, tool_name: &str) {
        if let Some(entry) = self.entries.write().get_mut(tool_name) {
            entry.verified_at = Some(Utc::now());
        }
    }

    pub fn snapshot(&self) -> Vec<CapabilityManifestEntry> {
        let mut all: Vec<_> = self.entries.read().values().cloned().collect();
        all.sort_by(|a, b| a.tool_name.cmp(&b.tool_name));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[(&str, &str)]) -> CapabilityRegistry {
        let reg = CapabilityRegistry::new();
        for (name, desc) in names {
            reg.register(CapabilityManifestEntry::new(*name, *desc, 0.8));
        }
        reg
    }

    #[test]
    fn exact_name_ranks_first() {
        let reg = registry_with(&[
            ("shell", "execute a shell command"),
            ("read_file", "read a file from disk"),
        ]);
        let hits = reg.lookup("shell");
        assert_eq!(hits[0].tool_name, "shell");
    }

    #[test]
    fn confidence_is_clamped() {
        let reg = registry_with(&[("shell", "execute a shell command")]);
        reg.adjust_confidence("shell", 5.0);
        assert!((reg.get("shell").unwrap().confidence_score - 1.0).abs() < f64::EPSILON);
        reg.adjust_confidence("shell", -5.0);
        assert!(reg.get("shell").unwrap().confidence_score.abs() < f64::EPSILON);
    }

    #[test]
    fn low_confidence_entries_are_filtered() {
        let reg = registry_with(&[("http_call", "make an http request")]);
        reg.adjust_confidence("http_call", -0.7);
        assert!(reg.lookup_confident("http request", 0.25).is_empty());
        assert!(!reg.lookup("http request").is_empty());
    }

    #[test]
    fn description_overlap_matches() {
        let reg = registry_with(&[("shell", "execute a shell command and capture output")]);
        let hits = reg.lookup("execute the build command");
        assert_eq!(hits.len(), 1);
    }
}

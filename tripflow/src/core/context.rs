//! Accumulated outputs of prior stages.

use serde::{Deserialize, Serialize};

/// One stage's contribution to the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Stage name.
    pub stage: String,
    /// The stage's text output.
    pub output: String,
}

/// Ordered mapping from stage name to output.
///
/// Stages receive `&Context` and cannot change it. Only the controller appends,
/// and only after a stage succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    entries: Vec<ContextEntry>,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage output. Returns false if the stage is already present.
    pub(crate) fn append(&mut self, stage: impl Into<String>, output: impl Into<String>) -> bool {
        let stage = stage.into();
        if self.get(&stage).is_some() {
            return false;
        }
        self.entries.push(ContextEntry {
            stage,
            output: output.into(),
        });
        true
    }

    /// Returns the output of a stage.
    #[must_use]
    pub fn get(&self, stage: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.stage == stage)
            .map(|e| e.output.as_str())
    }

    /// Iterates entries in stage order.
    pub fn iter(&self) -> impl Iterator<Item = &ContextEntry> {
        self.entries.iter()
    }

    /// The most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&ContextEntry> {
        self.entries.last()
    }

    /// Stage names in order.
    #[must_use]
    pub fn stages(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.stage.as_str()).collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no stage has contributed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Incremental State
//
// Tracks the fingerprint every file was last emitted from.

use super::api::IncrementalBuild;
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Clone, Default)]
pub struct IncrementalState {
    emitted: HashMap<String, String>,
}

impl IncrementalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_emitted(&self, file: &str) -> bool {
        self.emitted.contains_key(file)
    }

    pub fn len(&self) -> usize {
        self.emitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.is_empty()
    }

    /// Forgets every file `keep` rejects, e.g. files removed from the program.
    pub fn retain<F: Fn(&str) -> bool>(&mut self, keep: F) {
        self.emitted.retain(|file, _| keep(file));
    }
}

impl IncrementalBuild for IncrementalState {
    fn safe_to_skip(&self, file: &str, fingerprint: &str) -> bool {
        self.emitted
            .get(file)
            .is_some_and(|recorded| recorded == fingerprint)
    }

    fn record_successful_emit(&mut self, file: &str, fingerprint: &str) {
        trace!(file = %file, fingerprint = %fingerprint, "recorded successful emit");
        self.emitted
            .insert(file.to_string(), fingerprint.to_string());
    }

    fn forget(&mut self, file: &str) {
        self.emitted.remove(file);
    }
}

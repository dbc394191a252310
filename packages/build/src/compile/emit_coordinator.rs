// Emit Coordinator
//
// Decides which files a pass must emit, and which downstream consumers have
// to be rebuilt because the emitted text actually changed.

use super::EmitFileResult;
use crate::ngtsc::file_system::FileSystem;
use crate::ngtsc::incremental::{
    compute_fingerprint, CacheError, EmitHistory, EmitRecord, EMIT_HISTORY_FILE,
};
use crate::ngtsc::shims::is_shim;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use ts::{join_paths, BuilderProgram};

/// Whoever caches modules built from emitted files, e.g. a bundler's module
/// cache.
pub trait RebuildConsumers {
    fn mark_for_rebuild(&mut self, file: &str);
}

impl RebuildConsumers for BTreeSet<String> {
    fn mark_for_rebuild(&mut self, file: &str) {
        self.insert(file.to_string());
    }
}

/// Fingerprint `file` is emitted from: its version, the signatures of its
/// imports and the content hashes of its compiled resources.
pub fn emit_fingerprint(program: &BuilderProgram, file: &str, resource_hashes: &[String]) -> String {
    let version = program
        .get_source_file(file)
        .map(|source_file| source_file.version.as_str())
        .unwrap_or_default();
    compute_fingerprint(
        version,
        program.dependency_signatures(file),
        resource_hashes.iter().map(String::as_str),
    )
}

/// Files that must be emitted this pass, in program order: files with
/// pending emit, affected files, and files `safe_to_skip` rejects. A file is
/// emitted when any one of them asks for it.
pub fn required_files<F>(program: &BuilderProgram, affected: &BTreeSet<String>, safe_to_skip: Option<F>) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    let pending = program.pending_emit();
    program
        .source_files()
        .filter(|file| !file.is_declaration_file && !is_shim(&file.file_name))
        .map(|file| file.file_name.as_str())
        .filter(|file_name| {
            pending.contains(*file_name)
                || affected.contains(*file_name)
                || safe_to_skip.as_ref().is_some_and(|safe| !safe(file_name))
        })
        .map(str::to_string)
        .collect()
}

pub struct EmitCoordinator {
    history: EmitHistory,
    history_path: Option<String>,
}

impl EmitCoordinator {
    /// History kept for the life of the process only.
    pub fn in_memory() -> Self {
        EmitCoordinator {
            history: EmitHistory::new(),
            history_path: None,
        }
    }

    /// History persisted under `cache_path`. An unreadable history is
    /// replaced by an empty one.
    pub fn load(fs: &dyn FileSystem, cache_path: &str) -> Self {
        let path = join_paths(cache_path, EMIT_HISTORY_FILE);
        let history = EmitHistory::load(fs, &path).unwrap_or_else(|e| {
            warn!(error = %e, "discarding emit history");
            EmitHistory::new()
        });
        EmitCoordinator {
            history,
            history_path: Some(path),
        }
    }

    /// Compares every emitted file with its last record and marks the
    /// consumer of each changed file for rebuild. Returns the marked files.
    pub fn rebuild_required_files<C>(&mut self, consumers: &mut C, emitted: &[EmitFileResult]) -> BTreeSet<String>
    where
        C: RebuildConsumers + ?Sized,
    {
        let mut marked = BTreeSet::new();
        for result in emitted {
            if self.history.update(&result.filename, EmitRecord::of(&result.contents)) {
                consumers.mark_for_rebuild(&result.filename);
                marked.insert(result.filename.clone());
            }
        }
        debug!(
            emitted = emitted.len(),
            rebuilt = marked.len(),
            "compared emit history"
        );
        marked
    }

    /// Drops the record of a deleted file.
    pub fn forget(&mut self, file: &str) -> bool {
        self.history.remove(file).is_some()
    }

    pub fn history(&self) -> &EmitHistory {
        &self.history
    }

    /// Persists the history when it has a cache location.
    pub fn save(&self, fs: &dyn FileSystem) -> Result<(), CacheError> {
        match &self.history_path {
            Some(path) => self.history.save(fs, path),
            None => Ok(()),
        }
    }
}

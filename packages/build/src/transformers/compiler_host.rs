// Compiler Host
//
// The host the compiler reads through. Layers file replacements, text
// substitutions and a parsed source-file cache over a file system, and serves
// the generated type-check shims as if they were files on disk.

use super::api::{HostOptions, ResourceHost};
use crate::ngtsc::file_system::FileSystem;
use crate::ngtsc::shims::{is_shim, ShimFile};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use ts::{dirname, join_paths, normalize_path, CompilerHost, SourceFile};

/// Parsed source files shared between passes.
#[derive(Debug, Default)]
pub struct SourceFileCache {
    files: Mutex<HashMap<String, Arc<SourceFile>>>,
}

impl SourceFileCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, HashMap<String, Arc<SourceFile>>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, file_name: &str) -> Option<Arc<SourceFile>> {
        self.files().get(file_name).cloned()
    }

    pub fn insert(&self, source_file: Arc<SourceFile>) {
        self.files().insert(source_file.file_name.clone(), source_file);
    }

    /// Drops the entries of `files`. Returns how many were cached.
    pub fn invalidate<'a, I>(&self, files: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut cache = self.files();
        files
            .into_iter()
            .filter(|file| cache.remove(&normalize_path(file)).is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files().is_empty()
    }
}

pub struct AngularCompilerHost {
    fs: Arc<dyn FileSystem>,
    options: HostOptions,
    cache: Arc<SourceFileCache>,
    shims: HashMap<String, ShimFile>,
}

impl AngularCompilerHost {
    /// Creates a host for one pass. Cached parses of the modified files, and
    /// of every file replaced by one of them, are dropped.
    pub fn new(fs: Arc<dyn FileSystem>, options: HostOptions, cache: Arc<SourceFileCache>) -> Self {
        if !options.modified_files.is_empty() {
            let modified: Vec<String> = options
                .modified_files
                .iter()
                .map(|file| normalize_path(file))
                .collect();
            let replaced = options
                .file_replacements
                .iter()
                .filter(|(_, with)| modified.contains(&normalize_path(with)))
                .map(|(from, _)| from.as_str());
            let dropped = cache.invalidate(modified.iter().map(String::as_str).chain(replaced));
            debug!(modified = modified.len(), dropped, "invalidated cached source files");
        }
        AngularCompilerHost {
            fs,
            options,
            cache,
            shims: HashMap::new(),
        }
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn set_shims<I>(&mut self, shims: I)
    where
        I: IntoIterator<Item = ShimFile>,
    {
        self.shims = shims
            .into_iter()
            .map(|shim| (shim.file_name.clone(), shim))
            .collect();
    }

    pub fn shim_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shims.keys().cloned().collect();
        names.sort();
        names
    }

    /// The file actually read for `file_name`.
    pub fn resolve_replacement(&self, file_name: &str) -> String {
        let file_name = normalize_path(file_name);
        match self.options.file_replacements.get(&file_name) {
            Some(with) => normalize_path(with),
            None => file_name,
        }
    }

    fn substitute(&self, mut text: String) -> String {
        for (from, to) in &self.options.substitutions {
            if text.contains(from.as_str()) {
                text = text.replace(from.as_str(), to);
            }
        }
        text
    }
}

impl CompilerHost for AngularCompilerHost {
    fn file_exists(&self, file_name: &str) -> bool {
        self.shims.contains_key(file_name) || self.fs.is_file(&self.resolve_replacement(file_name))
    }

    fn read_file(&self, file_name: &str) -> Option<String> {
        if let Some(shim) = self.shims.get(file_name) {
            return Some(shim.content.clone());
        }
        let text = self.fs.read_file(&self.resolve_replacement(file_name)).ok()?;
        Some(self.substitute(text))
    }

    fn get_current_directory(&self) -> String {
        self.fs.pwd()
    }

    fn get_source_file(&self, file_name: &str) -> Option<Arc<SourceFile>> {
        // Shims are regenerated every pass; parse them fresh.
        if is_shim(file_name) {
            let shim = self.shims.get(file_name)?;
            return Some(Arc::new(SourceFile::parse(file_name, shim.content.as_str())));
        }
        if let Some(cached) = self.cache.get(file_name) {
            return Some(cached);
        }
        let text = self.read_file(file_name)?;
        let source_file = Arc::new(SourceFile::parse(file_name, text));
        self.cache.insert(Arc::clone(&source_file));
        Some(source_file)
    }
}

impl ResourceHost for AngularCompilerHost {
    fn resource_name_to_file_name(&self, name: &str, containing_file: &str) -> Option<String> {
        let path = self.resolve_replacement(&join_paths(dirname(containing_file), name));
        self.fs.is_file(&path).then_some(path)
    }
}

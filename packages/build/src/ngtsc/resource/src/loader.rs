// Resource Loader
//
// Compiles external resources (templates, styles) through isolated sub-builds
// and caches the results. Two explicitly owned maps track dependencies:
// resource key -> entry (with its dependency files) and file -> resource keys.

use super::bundler::{ResourceBundler, ResourceSource, SubBuildMessage, SubBuildOutput, SubBuildRequest};
use super::sandbox::evaluate_library_output;
use crate::compile::parallel::WorkerPool;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use ts::normalize_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Template,
    Style,
}

impl ResourceKind {
    /// Infers the kind of a resource file from its extension.
    pub fn from_path(path: &str) -> Self {
        match crate::ngtsc::file_system::extname(path) {
            ".css" | ".scss" | ".sass" | ".less" => ResourceKind::Style,
            _ => ResourceKind::Template,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Template => "template",
            ResourceKind::Style => "style",
        })
    }
}

/// Resource load error. Only raised for host misconfiguration; ordinary
/// sub-build failures are reported through [`CompiledResource::errors`].
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Unable to locate compiled content for resource '{key}'")]
    MissingContent { key: String },
}

/// A cached sub-build result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub key: String,
    pub compiled_content: String,
    pub dependency_files: Vec<String>,
    /// Component files that requested this resource.
    pub origins: BTreeSet<String>,
    pub errors: Vec<SubBuildMessage>,
    pub warnings: Vec<SubBuildMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledResource {
    pub key: String,
    pub content: String,
    pub errors: Vec<SubBuildMessage>,
    pub warnings: Vec<SubBuildMessage>,
}

impl From<&ResourceEntry> for CompiledResource {
    fn from(entry: &ResourceEntry) -> Self {
        CompiledResource {
            key: entry.key.clone(),
            content: entry.compiled_content.clone(),
            errors: entry.errors.clone(),
            warnings: entry.warnings.clone(),
        }
    }
}

/// One resource to load on behalf of `origin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub request: SubBuildRequest,
    pub origin: Option<String>,
}

impl ResourceRequest {
    pub fn file(path: &str, origin: Option<&str>) -> Self {
        let path = normalize_path(path);
        ResourceRequest {
            request: SubBuildRequest {
                kind: ResourceKind::from_path(&path),
                source: ResourceSource::File(path),
            },
            origin: origin.map(normalize_path),
        }
    }

    pub fn inline(data: &str, extension: &str, kind: ResourceKind, containing_file: &str) -> Self {
        ResourceRequest {
            request: SubBuildRequest {
                kind,
                source: ResourceSource::Inline {
                    data: data.to_string(),
                    extension: extension.to_string(),
                    containing_file: normalize_path(containing_file),
                },
            },
            origin: Some(normalize_path(containing_file)),
        }
    }

    /// Cache key: the file path, or a content-derived key for inline data.
    pub fn key(&self) -> String {
        match &self.request.source {
            ResourceSource::File(path) => path.clone(),
            ResourceSource::Inline {
                data,
                containing_file,
                ..
            } => format!(
                "inline;{};{};{:016x}",
                containing_file,
                self.request.kind,
                xxhash_rust::xxh3::xxh3_64(data.as_bytes())
            ),
        }
    }
}

pub struct ResourceLoader {
    bundler: Arc<dyn ResourceBundler>,
    pool: Option<Arc<WorkerPool>>,
    cache: HashMap<String, ResourceEntry>,
    file_to_resources: HashMap<String, HashSet<String>>,
}

impl ResourceLoader {
    pub fn new(bundler: Arc<dyn ResourceBundler>) -> Self {
        Self {
            bundler,
            pool: None,
            cache: HashMap::new(),
            file_to_resources: HashMap::new(),
        }
    }

    /// Fans sub-builds of cache misses out to `pool`.
    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Compiled content of a resource file.
    pub fn get(&mut self, path: &str) -> Result<CompiledResource, ResourceError> {
        self.load(ResourceRequest::file(path, None))
    }

    /// Compiles inline resource data declared in `containing_file`.
    pub fn process(
        &mut self,
        data: &str,
        extension_hint: &str,
        kind: ResourceKind,
        containing_file: &str,
    ) -> Result<CompiledResource, ResourceError> {
        self.load(ResourceRequest::inline(data, extension_hint, kind, containing_file))
    }

    pub fn load(&mut self, request: ResourceRequest) -> Result<CompiledResource, ResourceError> {
        let mut results = self.load_all(vec![request]);
        results.pop().unwrap_or_else(|| {
            Err(ResourceError::MissingContent {
                key: String::new(),
            })
        })
    }

    /// Loads every request, compiling cache misses (in parallel when a pool is
    /// attached). Results are returned in request order.
    pub fn load_all(
        &mut self,
        requests: Vec<ResourceRequest>,
    ) -> Vec<Result<CompiledResource, ResourceError>> {
        let keys: Vec<String> = requests.iter().map(ResourceRequest::key).collect();

        let mut seen = HashSet::new();
        let misses: Vec<(String, SubBuildRequest)> = requests
            .iter()
            .zip(&keys)
            .filter(|(_, key)| !self.cache.contains_key(*key) && seen.insert((*key).clone()))
            .map(|(request, key)| (key.clone(), request.request.clone()))
            .collect();

        if !misses.is_empty() {
            debug!(count = misses.len(), "compiling resources");
            let bundler = Arc::clone(&self.bundler);
            let outputs: Vec<SubBuildOutput> = match &self.pool {
                Some(pool) => pool.map(&misses, |(_, request)| bundler.bundle(request)),
                None => misses
                    .iter()
                    .map(|(_, request)| bundler.bundle(request))
                    .collect(),
            };
            for ((key, _), output) in misses.into_iter().zip(outputs) {
                self.store(key, output);
            }
        }

        requests
            .into_iter()
            .zip(keys)
            .map(|(request, key)| {
                let entry = self
                    .cache
                    .get_mut(&key)
                    .ok_or(ResourceError::MissingContent { key: key.clone() })?;
                if let Some(origin) = request.origin {
                    entry.origins.insert(origin);
                }
                Ok(CompiledResource::from(&*entry))
            })
            .collect()
    }

    fn store(&mut self, key: String, output: SubBuildOutput) {
        let compiled_content = match &output.output {
            Some(code) => match evaluate_library_output(code) {
                Some(content) => content,
                None => {
                    warn!(resource = %key, "sub-build output has no extractable content");
                    return;
                }
            },
            // Failed builds are cached with their errors so that a repeated
            // request reports the same diagnostics until a dependency changes.
            None if !output.errors.is_empty() => String::new(),
            None => {
                warn!(resource = %key, "sub-build produced no output");
                return;
            }
        };

        for file in &output.dependency_files() {
            self.file_to_resources
                .entry(file.clone())
                .or_default()
                .insert(key.clone());
        }
        self.cache.insert(
            key.clone(),
            ResourceEntry {
                key,
                compiled_content,
                dependency_files: output.dependency_files(),
                origins: BTreeSet::new(),
                errors: output.errors,
                warnings: output.warnings,
            },
        );
    }

    /// Evicts every entry that depends on one of `changed` (one hop).
    /// Returns the evicted keys.
    pub fn invalidate<'a, I>(&mut self, changed: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut evicted = BTreeSet::new();
        for file in changed {
            let Some(keys) = self.file_to_resources.remove(&normalize_path(file)) else {
                continue;
            };
            for key in keys {
                self.evict(&key);
                evicted.insert(key);
            }
        }
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "invalidated resources");
        }
        evicted
    }

    /// Drops `origin` as an owner; entries left without owners are evicted.
    pub fn remove_origin(&mut self, origin: &str) -> BTreeSet<String> {
        let origin = normalize_path(origin);
        let mut orphaned = BTreeSet::new();
        for (key, entry) in self.cache.iter_mut() {
            if entry.origins.remove(&origin) && entry.origins.is_empty() {
                orphaned.insert(key.clone());
            }
        }
        for key in &orphaned {
            self.evict(key);
        }
        orphaned
    }

    /// Drops `origin` as an owner of every entry outside `keys`, the exact
    /// set it requested this pass. Entries left without owners are evicted.
    pub fn retain_origin(&mut self, origin: &str, keys: &BTreeSet<String>) -> BTreeSet<String> {
        let origin = normalize_path(origin);
        let mut orphaned = BTreeSet::new();
        for (key, entry) in self.cache.iter_mut() {
            if keys.contains(key) {
                continue;
            }
            if entry.origins.remove(&origin) && entry.origins.is_empty() {
                orphaned.insert(key.clone());
            }
        }
        for key in &orphaned {
            self.evict(key);
        }
        if !orphaned.is_empty() {
            debug!(origin = %origin, evicted = orphaned.len(), "released stale resources");
        }
        orphaned
    }

    fn evict(&mut self, key: &str) {
        let Some(entry) = self.cache.remove(key) else {
            return;
        };
        for file in &entry.dependency_files {
            if let Some(keys) = self.file_to_resources.get_mut(file) {
                keys.remove(key);
                if keys.is_empty() {
                    self.file_to_resources.remove(file);
                }
            }
        }
    }

    pub fn entry(&self, key: &str) -> Option<&ResourceEntry> {
        self.cache.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Resource keys depending on `file`.
    pub fn dependents_of(&self, file: &str) -> BTreeSet<String> {
        self.file_to_resources
            .get(&normalize_path(file))
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl SubBuildOutput {
    fn dependency_files(&self) -> Vec<String> {
        self.dependencies.iter().map(|d| normalize_path(d)).collect()
    }
}

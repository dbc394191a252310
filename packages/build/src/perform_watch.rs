//! Perform Watch
//!
//! Watch mode: file-system events are coalesced into change batches and each
//! batch drives a new build pass seeded with the previous one. The set of
//! watched paths follows the files referenced by the latest result.

use crate::bundler::{AngularBuilder, BuildResult};
use crate::compile::{CompileError, WorkerPool};
use crate::ngtsc::file_system::FileSystem;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use ts::{dirname, join_paths, normalize_path};

/// Window over which successive events collapse into one batch.
pub const DEBOUNCE: Duration = Duration::from_millis(250);

/// Dependency manifests and lock files watched next to the project.
pub const DEPENDENCY_MANIFESTS: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lock",
    "bun.lockb",
];

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watcher failed: {0}")]
    Notify(#[from] notify::Error),
    #[error("watcher was already closed")]
    Closed,
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Files changed since the previous pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl ChangeSet {
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.removed.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    pub fn add(&mut self, path: String) {
        if self.removed.remove(&path) {
            self.modified.insert(path);
        } else if !self.modified.contains(&path) {
            self.added.insert(path);
        }
    }

    pub fn modify(&mut self, path: String) {
        if !self.added.contains(&path) {
            self.modified.insert(path);
        }
    }

    pub fn remove(&mut self, path: String) {
        let was_added = self.added.remove(&path);
        self.modified.remove(&path);
        if !was_added {
            self.removed.insert(path);
        }
    }

    /// Applies `later` on top of this batch. A file created and deleted
    /// within one batch disappears from it.
    pub fn merge(&mut self, later: ChangeSet) {
        for path in later.added {
            self.add(path);
        }
        for path in later.modified {
            self.modify(path);
        }
        for path in later.removed {
            self.remove(path);
        }
    }
}

/// Where change batches come from.
pub trait ChangeSource {
    /// Blocks until the next batch. `None` once the source is closed.
    fn next_batch(&mut self) -> Option<ChangeSet>;
    fn watch(&mut self, path: &str) -> Result<(), WatchError>;
    fn unwatch(&mut self, path: &str) -> Result<(), WatchError>;
    fn close(&mut self) -> Result<(), WatchError>;
}

/// Change source backed by the platform file watcher.
pub struct NotifyChangeSource {
    watcher: Option<RecommendedWatcher>,
    events: Receiver<notify::Result<notify::Event>>,
    ignored: Vec<String>,
    debounce: Duration,
}

impl NotifyChangeSource {
    /// Events below any of the `ignored` directories are dropped.
    pub fn new(ignored: Vec<String>) -> Result<Self, WatchError> {
        let (sender, events) = unbounded();
        let watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let _ = sender.send(event);
        })?;
        Ok(NotifyChangeSource {
            watcher: Some(watcher),
            events,
            ignored,
            debounce: DEBOUNCE,
        })
    }

    fn record(&self, event: notify::Event, changes: &mut ChangeSet) {
        for path in event.paths {
            let path = normalize_path(&path.to_string_lossy());
            if is_below_any(&path, &self.ignored) {
                continue;
            }
            match event.kind {
                EventKind::Create(_) => changes.add(path),
                EventKind::Remove(_) => changes.remove(path),
                EventKind::Modify(ModifyKind::Name(_)) | EventKind::Any => {
                    if Path::new(&path).exists() {
                        changes.add(path);
                    } else {
                        changes.remove(path);
                    }
                }
                EventKind::Modify(_) => changes.modify(path),
                EventKind::Access(_) | EventKind::Other => {}
            }
        }
    }
}

impl ChangeSource for NotifyChangeSource {
    fn next_batch(&mut self) -> Option<ChangeSet> {
        loop {
            let mut changes = ChangeSet::default();
            let first = self.events.recv().ok()?;
            let mut next = Some(first);
            while let Some(event) = next.take() {
                match event {
                    Ok(event) => self.record(event, &mut changes),
                    Err(e) => warn!(error = %e, "file watcher reported an error"),
                }
                next = match self.events.recv_timeout(self.debounce) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => None,
                };
            }
            if !changes.is_empty() {
                debug!(changes = changes.len(), "collected change batch");
                return Some(changes);
            }
        }
    }

    fn watch(&mut self, path: &str) -> Result<(), WatchError> {
        let watcher = self.watcher.as_mut().ok_or(WatchError::Closed)?;
        let target = Path::new(path);
        if !target.exists() {
            debug!(path = %path, "skipping watch of missing path");
            return Ok(());
        }
        let mode = if target.is_dir() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(target, mode)?;
        Ok(())
    }

    fn unwatch(&mut self, path: &str) -> Result<(), WatchError> {
        let watcher = self.watcher.as_mut().ok_or(WatchError::Closed)?;
        match watcher.unwatch(Path::new(path)) {
            Ok(()) => Ok(()),
            // Removed files have already dropped out of the watcher.
            Err(notify::Error {
                kind: notify::ErrorKind::WatchNotFound,
                ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) -> Result<(), WatchError> {
        match self.watcher.take() {
            Some(watcher) => {
                drop(watcher);
                Ok(())
            }
            None => Err(WatchError::Closed),
        }
    }
}

/// Change source fed by hand, one batch per message.
pub struct ChannelChangeSource {
    batches: Receiver<ChangeSet>,
    watched: BTreeSet<String>,
    closed: bool,
}

impl ChannelChangeSource {
    pub fn new() -> (Sender<ChangeSet>, Self) {
        let (sender, batches) = unbounded();
        let source = ChannelChangeSource {
            batches,
            watched: BTreeSet::new(),
            closed: false,
        };
        (sender, source)
    }

    pub fn watched(&self) -> &BTreeSet<String> {
        &self.watched
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ChangeSource for ChannelChangeSource {
    fn next_batch(&mut self) -> Option<ChangeSet> {
        if self.closed {
            return None;
        }
        self.batches.recv().ok()
    }

    fn watch(&mut self, path: &str) -> Result<(), WatchError> {
        self.watched.insert(path.to_string());
        Ok(())
    }

    fn unwatch(&mut self, path: &str) -> Result<(), WatchError> {
        self.watched.remove(path);
        Ok(())
    }

    fn close(&mut self) -> Result<(), WatchError> {
        if std::mem::replace(&mut self.closed, true) {
            return Err(WatchError::Closed);
        }
        Ok(())
    }
}

/// Paths a watch session observes.
#[derive(Debug, Clone, Default)]
pub struct WatchSet {
    fixed: BTreeSet<String>,
    ignored: Vec<String>,
    referenced: BTreeSet<String>,
}

impl WatchSet {
    /// The project root, the output path and the dependency manifests that
    /// exist. The cache path is never watched.
    pub fn new(
        fs: &dyn FileSystem,
        project: &str,
        output_path: Option<&str>,
        cache_path: Option<&str>,
    ) -> Self {
        let root = project_root(project);
        let mut fixed = BTreeSet::new();
        for manifest in DEPENDENCY_MANIFESTS {
            let path = join_paths(&root, manifest);
            if fs.exists(&path) {
                fixed.insert(path);
            }
        }
        if let Some(output_path) = output_path {
            fixed.insert(normalize_path(output_path));
        }
        fixed.insert(root);
        WatchSet {
            fixed,
            ignored: cache_path.map(normalize_path).into_iter().collect(),
            referenced: BTreeSet::new(),
        }
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    pub fn paths(&self) -> BTreeSet<String> {
        self.fixed.union(&self.referenced).cloned().collect()
    }

    pub fn is_watched(&self, path: &str) -> bool {
        self.fixed.contains(path) || self.referenced.contains(path)
    }

    /// Replaces the referenced files. Returns the paths that started and
    /// stopped being watched.
    pub fn update_referenced(&mut self, files: &BTreeSet<String>) -> (Vec<String>, Vec<String>) {
        let files: BTreeSet<String> = files
            .iter()
            .filter(|file| !is_below_any(file, &self.ignored))
            .cloned()
            .collect();
        let added = files
            .difference(&self.referenced)
            .filter(|file| !self.fixed.contains(*file))
            .cloned()
            .collect();
        let removed = self
            .referenced
            .difference(&files)
            .filter(|file| !self.fixed.contains(*file))
            .cloned()
            .collect();
        self.referenced = files;
        (added, removed)
    }
}

/// Drives build passes until the change source closes or a pass fails
/// fatally. Without a change source exactly one result is produced.
pub struct RebuildOrchestrator<S: ChangeSource> {
    builder: AngularBuilder,
    source: Option<S>,
    pool: Option<Arc<WorkerPool>>,
    watch_set: WatchSet,
    started: bool,
    finished: bool,
    torn_down: bool,
}

impl<S: ChangeSource> RebuildOrchestrator<S> {
    pub fn new(builder: AngularBuilder, source: Option<S>, pool: Option<Arc<WorkerPool>>, watch_set: WatchSet) -> Self {
        RebuildOrchestrator {
            builder,
            source,
            pool,
            watch_set,
            started: false,
            finished: false,
            torn_down: false,
        }
    }

    pub fn builder(&self) -> &AngularBuilder {
        &self.builder
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.watch_set
    }

    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    fn start_watching(&mut self) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        for path in self.watch_set.paths() {
            if let Err(e) = source.watch(&path) {
                warn!(path = %path, error = %e, "failed to watch path");
            }
        }
    }

    fn follow_references(&mut self, result: &BuildResult) {
        let (added, removed) = self.watch_set.update_referenced(&result.watch_files);
        let Some(source) = self.source.as_mut() else {
            return;
        };
        for path in &added {
            if let Err(e) = source.watch(path) {
                warn!(path = %path, error = %e, "failed to watch path");
            }
        }
        for path in &removed {
            if let Err(e) = source.unwatch(path) {
                warn!(path = %path, error = %e, "failed to unwatch path");
            }
        }
        if !added.is_empty() || !removed.is_empty() {
            debug!(added = added.len(), removed = removed.len(), "updated watched files");
        }
    }

    /// Stops the watcher and the worker pool. Both run even when the other
    /// fails; the first error is returned.
    pub fn teardown(&mut self) -> Result<(), WatchError> {
        if std::mem::replace(&mut self.torn_down, true) {
            return Ok(());
        }
        self.finished = true;
        let closed = match self.source.as_mut() {
            Some(source) => source.close(),
            None => Ok(()),
        };
        let shut_down = match &self.pool {
            Some(pool) => pool.shutdown().map_err(WatchError::from),
            None => Ok(()),
        };
        info!("watch session torn down");
        closed.and(shut_down)
    }
}

impl<S: ChangeSource> Iterator for RebuildOrchestrator<S> {
    type Item = BuildResult;

    fn next(&mut self) -> Option<BuildResult> {
        if self.finished {
            return None;
        }
        let changes = if self.started {
            let source = self.source.as_mut()?;
            match source.next_batch() {
                Some(changes) => changes,
                None => {
                    self.finished = true;
                    return None;
                }
            }
        } else {
            self.started = true;
            self.start_watching();
            ChangeSet::default()
        };
        if !changes.is_empty() {
            info!(
                added = changes.added.len(),
                modified = changes.modified.len(),
                removed = changes.removed.len(),
                "rebuilding"
            );
        }

        let result = self.builder.build(&changes);
        if !result.success || self.source.is_none() {
            self.finished = true;
        }
        if result.success {
            self.follow_references(&result);
        }
        Some(result)
    }
}

impl<S: ChangeSource> Drop for RebuildOrchestrator<S> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "teardown failed");
        }
    }
}

/// The directory of a tsconfig file, or the project directory itself.
pub fn project_root(project: &str) -> String {
    if project.ends_with(".json") {
        dirname(project).to_string()
    } else {
        normalize_path(project)
    }
}

fn is_below_any(path: &str, dirs: &[String]) -> bool {
    dirs.iter().any(|dir| {
        path == dir
            || path
                .strip_prefix(dir.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

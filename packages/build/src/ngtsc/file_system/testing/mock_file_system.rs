use crate::ngtsc::file_system::src::types::{is_skipped_directory, FileSystem};
use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};
use ts::normalize_path;

/// An in-memory file system. Clones share the same file tree, so a test can
/// keep a handle and edit files between passes.
#[derive(Clone, Debug)]
pub struct MockFileSystem {
    cwd: String,
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        MockFileSystem {
            cwd: "/".to_string(),
            files: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn with_cwd(mut self, cwd: &str) -> Self {
        self.cwd = normalize_path(cwd);
        self
    }

    pub fn init_with_files(&self, files: Vec<(&str, &str)>) {
        for (path, content) in files {
            self.set(path, content);
        }
    }

    pub fn set(&self, path: &str, content: &str) {
        self.tree()
            .insert(normalize_path(path), content.as_bytes().to_vec());
    }

    pub fn remove(&self, path: &str) {
        self.tree().remove(&normalize_path(path));
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.tree()
            .get(&normalize_path(path))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    fn tree(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path))
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &str) -> bool {
        let path = normalize_path(path);
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let tree = self.tree();
        tree.contains_key(&path) || tree.keys().any(|key| key.starts_with(&prefix))
    }

    fn is_file(&self, path: &str) -> bool {
        self.tree().contains_key(&normalize_path(path))
    }

    fn read_file(&self, path: &str) -> io::Result<String> {
        let bytes = self.read_file_buffer(path)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn read_file_buffer(&self, path: &str) -> io::Result<Vec<u8>> {
        self.tree()
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        self.tree().insert(normalize_path(path), data.to_vec());
        Ok(())
    }

    fn remove_file(&self, path: &str) -> io::Result<()> {
        self.tree()
            .remove(&normalize_path(path))
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn ensure_dir(&self, _path: &str) -> io::Result<()> {
        Ok(())
    }

    fn list_files(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", normalize_path(dir).trim_end_matches('/'));
        self.tree()
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .filter(|key| {
                let relative = &key[prefix.len()..];
                let mut segments: Vec<&str> = relative.split('/').collect();
                segments.pop();
                !segments.iter().any(|segment| is_skipped_directory(segment))
            })
            .cloned()
            .collect()
    }

    fn pwd(&self) -> String {
        self.cwd.clone()
    }
}

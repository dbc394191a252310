use std::io;

/// A basic interface to abstract the underlying file-system.
///
/// All paths are absolute and use `/` separators.
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &str) -> bool;
    fn is_file(&self, path: &str) -> bool;
    fn read_file(&self, path: &str) -> io::Result<String>;
    fn read_file_buffer(&self, path: &str) -> io::Result<Vec<u8>>;
    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()>;
    fn remove_file(&self, path: &str) -> io::Result<()>;
    fn ensure_dir(&self, path: &str) -> io::Result<()>;
    /// Every file below `dir`, recursively. Dependency and hidden directories are skipped.
    fn list_files(&self, dir: &str) -> Vec<String>;
    fn pwd(&self) -> String;
}

/// Directory names never descended into when listing files.
pub const SKIPPED_DIRECTORIES: &[&str] = &["node_modules"];

pub fn is_skipped_directory(name: &str) -> bool {
    name.starts_with('.') || SKIPPED_DIRECTORIES.contains(&name)
}

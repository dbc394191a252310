use super::types::{is_skipped_directory, FileSystem};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use ts::normalize_path;

/// The real file system of the machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        LocalFileSystem
    }

    fn collect(dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                let name = entry.file_name();
                if !is_skipped_directory(&name.to_string_lossy()) {
                    Self::collect(&path, out);
                }
            } else if file_type.is_file() {
                out.push(normalize_path(&path.to_string_lossy()));
            }
        }
    }
}

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn is_file(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }

    fn read_file(&self, path: &str) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn read_file_buffer(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)
    }

    fn remove_file(&self, path: &str) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn ensure_dir(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn list_files(&self, dir: &str) -> Vec<String> {
        let mut files = Vec::new();
        Self::collect(Path::new(dir), &mut files);
        files.sort();
        files
    }

    fn pwd(&self) -> String {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        normalize_path(&cwd.to_string_lossy())
    }
}

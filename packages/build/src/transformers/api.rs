// Transformers API
//
// Contracts between the compiler and the environment it reads from.

use std::collections::{BTreeMap, BTreeSet};

/// Resolves component resource URLs to files.
pub trait ResourceHost: Send + Sync {
    /// File a `templateUrl`/`styleUrl` of `containing_file` points to, or
    /// `None` when no such file exists.
    fn resource_name_to_file_name(&self, name: &str, containing_file: &str) -> Option<String>;
}

/// Options layered over the plain file system by the compiler host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOptions {
    /// Requested file -> file actually read.
    pub file_replacements: BTreeMap<String, String>,
    /// Text substitutions applied to every source file read, in order.
    pub substitutions: Vec<(String, String)>,
    /// Files changed since the previous pass. Cached parses of these are dropped.
    pub modified_files: BTreeSet<String>,
    /// Directory for persistent build state. In-memory only when unset.
    pub cache_path: Option<String>,
}

impl HostOptions {
    pub fn with_modified_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modified_files = files.into_iter().map(Into::into).collect();
        self
    }
}

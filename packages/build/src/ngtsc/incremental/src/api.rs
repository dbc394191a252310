// Incremental API
//
// Public API types for incremental compilation.

use xxhash_rust::xxh3::Xxh3;

/// Framework-level judgment of whether a previously emitted output can be
/// reused although the file is part of the current pass.
pub trait IncrementalBuild {
    /// True when the output recorded for `file` was produced from the same
    /// `fingerprint`.
    fn safe_to_skip(&self, file: &str, fingerprint: &str) -> bool;

    /// Records that `file` was emitted from `fingerprint`.
    fn record_successful_emit(&mut self, file: &str, fingerprint: &str);

    /// Drops everything known about `file`.
    fn forget(&mut self, file: &str);
}

/// Fingerprint of everything an emitted file depends on: its own version,
/// the externally visible shape of its imports and the content of its
/// compiled resources.
pub fn compute_fingerprint<'a, S, R>(version: &str, dependency_signatures: S, resources: R) -> String
where
    S: IntoIterator<Item = &'a str>,
    R: IntoIterator<Item = &'a str>,
{
    let mut hasher = Xxh3::new();
    hasher.update(version.as_bytes());
    hasher.update(b"\0deps");
    for signature in dependency_signatures {
        hasher.update(b"\0");
        hasher.update(signature.as_bytes());
    }
    hasher.update(b"\0resources");
    for content in resources {
        hasher.update(b"\0");
        hasher.update(content.as_bytes());
    }
    format!("{:016x}", hasher.digest())
}

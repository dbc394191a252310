//! Compiler Package
//!
//! Process-wide description of the loaded compiler: its version and the
//! global constants substituted into emitted code. Loaded on first use and
//! read-only afterwards.

use once_cell::sync::OnceCell;
use tracing::info;

/// Compiler version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static PACKAGE: OnceCell<CompilerPackage> = OnceCell::new();

const AOT_DEFINES: &[(&str, &str)] = &[
    ("ngDevMode", "false"),
    ("ngI18nClosureMode", "false"),
    ("ngJitMode", "false"),
];

// JIT output keeps the runtime compiler, so ngJitMode is left alone.
const JIT_DEFINES: &[(&str, &str)] = &[("ngDevMode", "false"), ("ngI18nClosureMode", "false")];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub prerelease: Option<String>,
}

impl Version {
    pub fn parse(version: &str) -> Option<Self> {
        let (numbers, prerelease) = match version.split_once('-') {
            Some((numbers, pre)) => (numbers, Some(pre.to_string())),
            None => (version, None),
        };
        let mut parts = numbers.split('.');
        let mut next = || parts.next()?.parse::<u32>().ok();
        Some(Version {
            major: next()?,
            minor: next()?,
            patch: next()?,
            prerelease,
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct CompilerPackage {
    pub version: Version,
}

impl CompilerPackage {
    /// Identifiers replaced with constants in the bundled output.
    pub fn global_defines(&self, jit: bool) -> &'static [(&'static str, &'static str)] {
        if jit {
            JIT_DEFINES
        } else {
            AOT_DEFINES
        }
    }
}

/// The compiler package of this process, loaded on the first call.
pub fn load_compiler_package() -> &'static CompilerPackage {
    PACKAGE.get_or_init(|| {
        let version = Version::parse(VERSION).unwrap_or(Version {
            major: 0,
            minor: 0,
            patch: 0,
            prerelease: Some("dev".to_string()),
        });
        info!(version = %version, "loaded compiler package");
        CompilerPackage { version }
    })
}

//! Compilation
//!
//! A compilation session wraps the incremental program of one project. Every
//! `initialize` builds a new pass seeded with the previous one; diagnostics
//! and emitted files are then pulled from that pass. Three strategies share
//! the contract: full (AOT: framework analysis, template diagnostics,
//! resources inlined), lightweight (JIT: resources turned into imports) and
//! pass-through (idle until another stage signals readiness).

pub mod affected;
pub mod aot;
pub mod emit_coordinator;
pub mod jit;
pub mod noop;
pub mod package;
pub mod parallel;
pub mod session;

pub use affected::collect_affected_files;
pub use aot::AotCompilation;
pub use emit_coordinator::{emit_fingerprint, required_files, EmitCoordinator, RebuildConsumers};
pub use jit::JitCompilation;
pub use noop::NoopCompilation;
pub use package::{load_compiler_package, CompilerPackage};
pub use parallel::WorkerPool;
pub use session::{Diagnostics, EmitAffectedFiles, SessionContext, BUILD_INFO_FILE};

use crate::ngtsc::incremental::CacheError;
use crate::ngtsc::resource::{ResourceError, ResourceLoader};
use crate::transformers::api::HostOptions;
use std::collections::BTreeSet;
use thiserror::Error;
use ts::{CompilerOptions, Diagnostic};

/// Failures that abort a pass. Problems in user code or configuration are
/// diagnostics and never end up here.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("worker pool was already shut down")]
    PoolShutDown,
    #[error("readiness signal closed before the compilation became ready")]
    ReadinessLost,
}

/// Lifecycle of a session. A new change batch returns a `Ready` session to
/// `Initializing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    /// Whole-program analysis of the full strategy.
    Analyzing,
    Ready,
    Emitting,
}

impl SessionPhase {
    fn assert_ready(self, operation: &str) {
        assert!(
            matches!(self, SessionPhase::Ready),
            "{} requested while the compilation is {:?}",
            operation,
            self
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitializeResult {
    /// Files needing new diagnostics or emit this pass.
    pub affected_files: BTreeSet<String>,
    pub compiler_options: CompilerOptions,
    /// Program files and every resource file they were built from.
    pub referenced_files: BTreeSet<String>,
    /// Configuration errors. When present the pass is degraded: nothing is
    /// affected and nothing is emitted.
    pub errors: Vec<Diagnostic>,
}

/// A file produced by `emit_affected_files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitFileResult {
    /// The source file the output was emitted from.
    pub filename: String,
    pub contents: String,
    /// Resource files whose content is part of `contents`.
    pub dependencies: Vec<String>,
}

/// Rewrites the compiler options after they have been normalized.
pub type OptionsTransform<'a> = &'a dyn Fn(CompilerOptions) -> CompilerOptions;

pub enum CompilationSession {
    Full(AotCompilation),
    Lightweight(JitCompilation),
    PassThrough(NoopCompilation),
}

impl CompilationSession {
    pub fn full(context: SessionContext) -> Self {
        CompilationSession::Full(AotCompilation::new(context))
    }

    pub fn lightweight(context: SessionContext) -> Self {
        CompilationSession::Lightweight(JitCompilation::new(context))
    }

    pub fn pass_through(noop: NoopCompilation) -> Self {
        CompilationSession::PassThrough(noop)
    }

    pub fn initialize(
        &mut self,
        project: &str,
        host_options: HostOptions,
        options_transform: Option<OptionsTransform<'_>>,
    ) -> Result<InitializeResult, CompileError> {
        match self {
            CompilationSession::Full(aot) => aot.initialize(project, host_options, options_transform),
            CompilationSession::Lightweight(jit) => {
                jit.initialize(project, host_options, options_transform)
            }
            CompilationSession::PassThrough(noop) => {
                noop.initialize(project, host_options, options_transform)
            }
        }
    }

    /// Diagnostics of the current pass, computed lazily: program-level first,
    /// then per file in program order (syntactic, semantic, template).
    ///
    /// Panics when called before `initialize` completed.
    pub fn collect_diagnostics(&mut self) -> Diagnostics<'_> {
        match self {
            CompilationSession::Full(aot) => aot.collect_diagnostics(),
            CompilationSession::Lightweight(jit) => jit.collect_diagnostics(),
            CompilationSession::PassThrough(noop) => noop.collect_diagnostics(),
        }
    }

    /// Emits every file that must be emitted this pass, one per `next()`.
    ///
    /// Panics when called before `initialize` completed.
    pub fn emit_affected_files(&mut self) -> EmitAffectedFiles<'_> {
        match self {
            CompilationSession::Full(aot) => aot.emit_affected_files(),
            CompilationSession::Lightweight(jit) => jit.emit_affected_files(),
            CompilationSession::PassThrough(noop) => noop.emit_affected_files(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self {
            CompilationSession::Full(aot) => aot.phase(),
            CompilationSession::Lightweight(jit) => jit.phase(),
            CompilationSession::PassThrough(noop) => noop.phase(),
        }
    }

    /// Writes the build-info snapshot of the current pass when the options
    /// name a build-info file.
    pub fn save_build_info(&self) -> Result<(), CompileError> {
        match self {
            CompilationSession::Full(aot) => aot.save_build_info(),
            CompilationSession::Lightweight(jit) => jit.save_build_info(),
            CompilationSession::PassThrough(_) => Ok(()),
        }
    }

    /// Compiled resources cached across passes.
    pub fn resource_loader(&self) -> Option<&ResourceLoader> {
        match self {
            CompilationSession::Full(aot) => Some(aot.resource_loader()),
            CompilationSession::Lightweight(jit) => Some(jit.resource_loader()),
            CompilationSession::PassThrough(_) => None,
        }
    }

    pub fn resource_loader_mut(&mut self) -> Option<&mut ResourceLoader> {
        match self {
            CompilationSession::Full(aot) => Some(aot.resource_loader_mut()),
            CompilationSession::Lightweight(jit) => Some(jit.resource_loader_mut()),
            CompilationSession::PassThrough(_) => None,
        }
    }

    pub fn is_lightweight(&self) -> bool {
        matches!(self, CompilationSession::Lightweight(_))
    }
}


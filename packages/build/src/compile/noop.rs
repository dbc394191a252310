// Pass-Through Compilation
//
// Used when another pipeline stage already produced the output. Waits for
// that stage to signal readiness, then reports nothing.

use super::session::{Diagnostics, EmitAffectedFiles};
use super::{CompileError, InitializeResult, OptionsTransform, SessionPhase};
use crate::ngtsc::file_system::FileSystem;
use crate::perform_compile::read_configuration;
use crate::transformers::api::HostOptions;
use crossbeam_channel::Receiver;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

pub struct NoopCompilation {
    fs: Arc<dyn FileSystem>,
    ready: Receiver<()>,
    phase: SessionPhase,
}

impl NoopCompilation {
    /// `ready` receives one message each time the other stage finished a
    /// pass.
    pub fn new(fs: Arc<dyn FileSystem>, ready: Receiver<()>) -> Self {
        NoopCompilation {
            fs,
            ready,
            phase: SessionPhase::Uninitialized,
        }
    }

    pub fn initialize(
        &mut self,
        project: &str,
        _host_options: HostOptions,
        options_transform: Option<OptionsTransform<'_>>,
    ) -> Result<InitializeResult, CompileError> {
        self.phase = SessionPhase::Initializing;
        if self.ready.recv().is_err() {
            self.phase = SessionPhase::Uninitialized;
            return Err(CompileError::ReadinessLost);
        }
        debug!(project = %project, "pass-through compilation is ready");

        let config = read_configuration(self.fs.as_ref(), project, None);
        let compiler_options = match options_transform {
            Some(transform) => transform(config.options),
            None => config.options,
        };
        self.phase = SessionPhase::Ready;
        Ok(InitializeResult {
            affected_files: BTreeSet::new(),
            compiler_options,
            referenced_files: BTreeSet::new(),
            errors: config.errors,
        })
    }

    pub fn collect_diagnostics(&mut self) -> Diagnostics<'_> {
        self.phase.assert_ready("collect_diagnostics");
        Diagnostics::empty()
    }

    pub fn emit_affected_files(&mut self) -> EmitAffectedFiles<'_> {
        self.phase.assert_ready("emit_affected_files");
        EmitAffectedFiles::empty(&mut self.phase)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }
}

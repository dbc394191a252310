// Session State
//
// What the compiling strategies share: the caches that outlive a pass, the
// state one `initialize` produces, and the lazy diagnostic and emit
// iterators handed out for it.

use super::emit_coordinator::emit_fingerprint;
use super::parallel::WorkerPool;
use super::{EmitFileResult, InitializeResult, OptionsTransform, SessionPhase};
use crate::ngtsc::core::{extract_components, replace_resources_with_imports, NgCompiler};
use crate::ngtsc::diagnostics::{DiagnosticPhase, DiagnosticRecord};
use crate::ngtsc::file_system::FileSystem;
use crate::ngtsc::incremental::{CacheError, IncrementalBuild, IncrementalState};
use crate::ngtsc::resource::{FileResourceBundler, ResourceLoader};
use crate::ngtsc::shims::is_shim;
use crate::perform_compile::{read_configuration, ParsedConfiguration};
use crate::transformers::api::HostOptions;
use crate::transformers::compiler_host::{AngularCompilerHost, SourceFileCache};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use ts::{
    emit_source_file, join_paths, BuildInfo, BuilderProgram, CompilerHost, CompilerOptions,
    Diagnostic, ProgramBaseline,
};

/// Name of the build-info snapshot inside the cache directory.
pub const BUILD_INFO_FILE: &str = "build-info.bin";

/// Caches kept warm across passes.
pub struct SessionContext {
    pub fs: Arc<dyn FileSystem>,
    pub source_files: Arc<SourceFileCache>,
    pub resources: ResourceLoader,
}

impl SessionContext {
    /// Resources are compiled with the default sub-build, fanned out to
    /// `pool` when one is given.
    pub fn new(fs: Arc<dyn FileSystem>, pool: Option<Arc<WorkerPool>>) -> Self {
        let mut resources = ResourceLoader::new(Arc::new(FileResourceBundler::new(Arc::clone(&fs))));
        if let Some(pool) = pool {
            resources = resources.with_pool(pool);
        }
        SessionContext {
            fs,
            source_files: Arc::new(SourceFileCache::new()),
            resources,
        }
    }
}

/// The program of one pass.
pub struct ProgramPass {
    pub host: AngularCompilerHost,
    pub program: BuilderProgram,
    pub affected_files: BTreeSet<String>,
}

impl ProgramPass {
    /// Program files in program order, shims excluded.
    pub fn user_files(&self) -> Vec<String> {
        self.program
            .source_files()
            .map(|file| file.file_name.clone())
            .filter(|file_name| !is_shim(file_name))
            .collect()
    }
}

/// Everything one `initialize` produces. Replaced as a whole at the end of
/// the next `initialize`.
#[derive(Default)]
pub struct SessionState {
    pub config_errors: Vec<Diagnostic>,
    pub compiler_options: CompilerOptions,
    /// `None` before the first pass and while the configuration is broken.
    pub pass: Option<ProgramPass>,
    /// Program of the last good pass, kept as baseline while the
    /// configuration is broken.
    retained: Option<BuilderProgram>,
}

impl SessionState {
    pub fn ready(compiler_options: CompilerOptions, config_errors: Vec<Diagnostic>, pass: ProgramPass) -> Self {
        SessionState {
            config_errors,
            compiler_options,
            pass: Some(pass),
            retained: None,
        }
    }

    /// Replaces the state with a pass that only reports `errors`.
    pub fn degrade(&mut self, compiler_options: CompilerOptions, errors: Vec<Diagnostic>) {
        let retained = self
            .pass
            .take()
            .map(|pass| pass.program)
            .or_else(|| self.retained.take());
        *self = SessionState {
            config_errors: errors,
            compiler_options,
            pass: None,
            retained,
        };
    }

    /// Baseline of the next pass: the program of the last good pass, else
    /// the build-info snapshot stored at `build_info_path`.
    pub fn take_baseline(&mut self, fs: &dyn FileSystem, build_info_path: Option<&str>) -> Option<ProgramBaseline> {
        if let Some(program) = self.pass.take().map(|pass| pass.program).or_else(|| self.retained.take()) {
            return Some(ProgramBaseline::Program(Box::new(program)));
        }
        let path = build_info_path?;
        match load_build_info(fs, path) {
            Ok(info) => info.map(ProgramBaseline::BuildInfo),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable build info");
                None
            }
        }
    }

    /// Puts back a baseline taken by a pass that failed, so the next pass
    /// still diffs against it.
    pub fn restore_baseline(&mut self, baseline: Option<ProgramBaseline>) {
        if let Some(ProgramBaseline::Program(program)) = baseline {
            self.retained = Some(*program);
        }
    }

    pub fn save_build_info(&self, fs: &dyn FileSystem) -> Result<(), CacheError> {
        let (Some(pass), Some(path)) = (&self.pass, &self.compiler_options.ts_build_info_file) else {
            return Ok(());
        };
        let info = pass.program.to_build_info();
        let bytes = bincode::serialize(&info).map_err(|source| CacheError::Encode {
            path: path.clone(),
            source,
        })?;
        fs.ensure_dir(ts::dirname(path))
            .and_then(|_| fs.write_file(path, &bytes))
            .map_err(|source| CacheError::Write {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path, files = info.files.len(), "saved build info");
        Ok(())
    }
}

/// Reads a build-info snapshot. Snapshots written by another version are
/// ignored.
pub fn load_build_info(fs: &dyn FileSystem, path: &str) -> Result<Option<BuildInfo>, CacheError> {
    if !fs.is_file(path) {
        return Ok(None);
    }
    let bytes = fs.read_file_buffer(path).map_err(|source| CacheError::Read {
        path: path.to_string(),
        source,
    })?;
    let info: BuildInfo = bincode::deserialize(&bytes).map_err(|source| CacheError::Decode {
        path: path.to_string(),
        source,
    })?;
    if !info.is_current() {
        debug!(path = %path, "ignoring build info of another version");
        return Ok(None);
    }
    Ok(Some(info))
}

/// Reads the project configuration for a pass and normalizes the options:
/// output stays in memory, errors never suppress emit, and a cache path
/// turns on incremental build info inside it.
pub fn configure(
    context: &mut SessionContext,
    project: &str,
    host_options: &HostOptions,
    options_transform: Option<OptionsTransform<'_>>,
) -> ParsedConfiguration {
    if !host_options.modified_files.is_empty() {
        context
            .resources
            .invalidate(host_options.modified_files.iter().map(String::as_str));
    }
    let mut config = read_configuration(context.fs.as_ref(), project, None);

    let options = &mut config.options;
    options.no_emit_on_error = Some(false);
    options.out_dir = None;
    if let Some(cache_path) = &host_options.cache_path {
        options.incremental = Some(true);
        options.ts_build_info_file = Some(join_paths(cache_path, BUILD_INFO_FILE));
    }
    if let Some(transform) = options_transform {
        config.options = transform(std::mem::take(&mut config.options));
    }
    config
}

/// Result of a pass whose configuration could not be read. The state keeps
/// the last good program as baseline and reports only `config.errors`.
pub fn degraded_result(state: &mut SessionState, config: ParsedConfiguration) -> InitializeResult {
    warn!(
        project = %config.project,
        errors = config.errors.len(),
        "configuration has errors; skipping compilation"
    );
    state.degrade(config.options.clone(), config.errors.clone());
    InitializeResult {
        affected_files: BTreeSet::new(),
        compiler_options: config.options,
        referenced_files: config.config_files.into_iter().collect(),
        errors: config.errors,
    }
}

/// Files referenced by a pass: program files except shims, plus `extra`.
pub fn referenced_files<I>(pass: &ProgramPass, extra: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = String>,
{
    pass.user_files().into_iter().chain(extra).collect()
}

/// Lazy diagnostics of one pass.
pub struct Diagnostics<'a> {
    pending: VecDeque<DiagnosticRecord>,
    pass: Option<&'a mut ProgramPass>,
    templates: Option<&'a NgCompiler>,
    files: std::vec::IntoIter<String>,
}

impl<'a> Diagnostics<'a> {
    pub(crate) fn new(state: &'a mut SessionState, templates: Option<&'a NgCompiler>) -> Self {
        let mut pending: VecDeque<DiagnosticRecord> =
            state.config_errors.iter().map(DiagnosticRecord::program).collect();
        let mut files = Vec::new();
        if let Some(pass) = &state.pass {
            pending.extend(
                pass.program
                    .get_options_diagnostics()
                    .iter()
                    .map(DiagnosticRecord::program),
            );
            if let Some(compiler) = templates {
                pending.extend(compiler.options_diagnostics().iter().map(DiagnosticRecord::program));
            }
            pending.extend(
                pass.program
                    .get_global_diagnostics()
                    .iter()
                    .map(DiagnosticRecord::program),
            );
            files = pass.user_files();
        }
        Diagnostics {
            pending,
            pass: state.pass.as_mut(),
            templates,
            files: files.into_iter(),
        }
    }

    pub(crate) fn empty() -> Self {
        Diagnostics {
            pending: VecDeque::new(),
            pass: None,
            templates: None,
            files: Vec::new().into_iter(),
        }
    }

    fn queue_file(&mut self, file_name: &str) {
        let Some(pass) = self.pass.as_deref_mut() else {
            return;
        };
        let semantic = pass.program.get_semantic_diagnostics(file_name);
        let program = &pass.program;
        let host = &pass.host;
        let lookup = |name: &str| -> Option<Arc<str>> {
            match program.get_source_file(name) {
                Some(source_file) => Some(Arc::clone(&source_file.text)),
                None => host.read_file(name).map(Arc::from),
            }
        };

        let syntactic = program.get_syntactic_diagnostics(file_name);
        let templates = self
            .templates
            .map(|compiler| compiler.template_diagnostics(file_name))
            .unwrap_or(&[]);
        for (phase, diagnostics) in [
            (DiagnosticPhase::Syntactic, syntactic),
            (DiagnosticPhase::Semantic, semantic.as_slice()),
            (DiagnosticPhase::Template, templates),
        ] {
            self.pending.extend(
                diagnostics
                    .iter()
                    .map(|diagnostic| DiagnosticRecord::from_diagnostic(diagnostic, phase, &lookup)),
            );
        }
    }
}

impl Iterator for Diagnostics<'_> {
    type Item = DiagnosticRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }
            let file_name = self.files.next()?;
            self.queue_file(&file_name);
        }
    }
}

/// How component files are rewritten before they are emitted.
pub(crate) enum EmitMode<'a> {
    /// Compiled resources are inlined; every emit is recorded.
    Inline {
        compiler: &'a NgCompiler,
        incremental: &'a mut IncrementalState,
    },
    /// Resource references become imports of resource modules. Emitted
    /// files are added to `emitted`.
    ResourceImports { emitted: Option<&'a mut BTreeSet<String>> },
}

/// Lazy emission of one pass. Dropping it returns the session to `Ready`.
pub struct EmitAffectedFiles<'a> {
    queue: VecDeque<String>,
    pass: Option<&'a mut ProgramPass>,
    mode: EmitMode<'a>,
    phase: &'a mut SessionPhase,
}

impl<'a> EmitAffectedFiles<'a> {
    /// Nothing to emit.
    pub(crate) fn empty(phase: &'a mut SessionPhase) -> Self {
        Self::new(Vec::new(), None, EmitMode::ResourceImports { emitted: None }, phase)
    }

    pub(crate) fn new(
        files: Vec<String>,
        pass: Option<&'a mut ProgramPass>,
        mode: EmitMode<'a>,
        phase: &'a mut SessionPhase,
    ) -> Self {
        *phase = SessionPhase::Emitting;
        EmitAffectedFiles {
            queue: files.into(),
            pass,
            mode,
            phase,
        }
    }

    fn emit(&mut self, file_name: &str) -> Option<EmitFileResult> {
        let pass = self.pass.as_deref_mut()?;
        let source_file = Arc::clone(pass.program.get_source_file(file_name)?);
        let rewritten = match &self.mode {
            EmitMode::Inline { compiler, .. } => {
                compiler.inline_resources_for_emit(file_name, &source_file.text)
            }
            EmitMode::ResourceImports { .. } => {
                let components = extract_components(file_name, &source_file.text);
                replace_resources_with_imports(&source_file.text, file_name, &components)
            }
        };
        let emitted = match emit_source_file(&source_file, rewritten.as_deref(), pass.program.options()) {
            Ok(emitted) => emitted,
            Err(errors) => {
                warn!(file = %file_name, errors = errors.len(), "skipping emit of file that does not parse");
                return None;
            }
        };
        assert_eq!(
            emitted.source_files.len(),
            1,
            "output '{}' must be produced from exactly one source file",
            emitted.file_name
        );
        pass.program.mark_emitted(file_name);

        let dependencies = match &mut self.mode {
            EmitMode::Inline {
                compiler,
                incremental,
            } => {
                let fingerprint =
                    emit_fingerprint(&pass.program, file_name, compiler.resource_hashes(file_name));
                incremental.record_successful_emit(file_name, &fingerprint);
                compiler
                    .analysis(file_name)
                    .map(|analysis| analysis.resource_files.iter().cloned().collect())
                    .unwrap_or_default()
            }
            EmitMode::ResourceImports { emitted } => {
                if let Some(emitted) = emitted {
                    emitted.insert(file_name.to_string());
                }
                Vec::new()
            }
        };
        Some(EmitFileResult {
            filename: file_name.to_string(),
            contents: emitted.text,
            dependencies,
        })
    }
}

impl Iterator for EmitAffectedFiles<'_> {
    type Item = EmitFileResult;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(file_name) = self.queue.pop_front() {
            if let Some(result) = self.emit(&file_name) {
                return Some(result);
            }
        }
        None
    }
}

impl Drop for EmitAffectedFiles<'_> {
    fn drop(&mut self) {
        *self.phase = SessionPhase::Ready;
    }
}

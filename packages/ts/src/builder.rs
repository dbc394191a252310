// Builder Program
//
// An incremental program. Every pass builds a new program from the previous
// one (or from a persisted build-info snapshot) and hands out the files whose
// diagnostics or emit must be recomputed through a pull protocol.

use crate::{CompilerHost, CompilerOptions, Diagnostic, SourceFile};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

pub const FILE_NOT_FOUND_CODE: i32 = 6053;
pub const CANNOT_FIND_MODULE_CODE: i32 = 2307;
pub const CONFLICTING_OPTIONS_CODE: i32 = 5053;

/// A module specifier of a file together with the file it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImport {
    pub specifier: String,
    pub start: usize,
    pub length: usize,
    /// `None` for bare (package) specifiers and for relative ones that did not resolve.
    pub resolved: Option<String>,
}

impl ResolvedImport {
    pub fn is_relative(&self) -> bool {
        self.specifier.starts_with('.')
    }
}

/// Per-file entry of a build-info snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildInfoFile {
    pub version: String,
    pub signature: String,
    pub imports: Vec<Option<String>>,
    pub semantic_diagnostics: Option<Vec<Diagnostic>>,
    pub pending_emit: bool,
}

/// Serializable snapshot of a builder program, written at the end of a pass
/// and used as the baseline of the next cold start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    pub options: CompilerOptions,
    pub files: IndexMap<String, BuildInfoFile>,
}

impl BuildInfo {
    /// Whether this snapshot was produced by the running version of the builder.
    pub fn is_current(&self) -> bool {
        self.version == env!("CARGO_PKG_VERSION")
    }
}

/// What a new program is diffed against.
#[derive(Debug)]
pub enum ProgramBaseline {
    /// The program of the previous pass in this process.
    Program(Box<BuilderProgram>),
    /// A snapshot loaded from storage. It carries no affected-file history.
    BuildInfo(BuildInfo),
}

struct PriorFile {
    version: String,
    signature: String,
    imports: Vec<Option<String>>,
    semantic_diagnostics: Option<Vec<Diagnostic>>,
    pending_emit: bool,
}

impl ProgramBaseline {
    fn into_prior(self) -> (CompilerOptions, HashMap<String, PriorFile>, bool) {
        match self {
            ProgramBaseline::Program(mut program) => {
                let mut prior = HashMap::with_capacity(program.files.len());
                for (name, source_file) in &program.files {
                    prior.insert(
                        name.clone(),
                        PriorFile {
                            version: source_file.version.clone(),
                            signature: source_file.export_signature.clone(),
                            imports: program.import_targets(name),
                            semantic_diagnostics: program.semantic_cache.remove(name),
                            pending_emit: program.pending_emit.contains(name),
                        },
                    );
                }
                (program.options.clone(), prior, true)
            }
            ProgramBaseline::BuildInfo(info) => {
                let prior = info
                    .files
                    .into_iter()
                    .map(|(name, file)| {
                        (
                            name,
                            PriorFile {
                                version: file.version,
                                signature: file.signature,
                                imports: file.imports,
                                semantic_diagnostics: file.semantic_diagnostics,
                                pending_emit: file.pending_emit,
                            },
                        )
                    })
                    .collect();
                (info.options, prior, false)
            }
        }
    }
}

/// A file handed out by the next-affected-file protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct AffectedFileResult {
    pub file_name: String,
    /// Empty when the caller asked for the file to be ignored.
    pub diagnostics: Vec<Diagnostic>,
}

struct ProgramWalk {
    files: IndexMap<String, Arc<SourceFile>>,
    imports: HashMap<String, Vec<ResolvedImport>>,
    missing_roots: Vec<String>,
}

/// Breadth-first walk from the roots through resolved imports.
fn walk(root_names: &[String], host: &dyn CompilerHost) -> ProgramWalk {
    let mut files = IndexMap::new();
    let mut imports = HashMap::new();
    let mut missing_roots = Vec::new();
    let mut queue: VecDeque<(String, bool)> =
        root_names.iter().map(|name| (name.clone(), true)).collect();

    while let Some((file_name, is_root)) = queue.pop_front() {
        if files.contains_key(&file_name) {
            continue;
        }
        let Some(source_file) = host.get_source_file(&file_name) else {
            if is_root {
                missing_roots.push(file_name);
            }
            continue;
        };
        let mut resolved_imports = Vec::with_capacity(source_file.module_specifiers.len());
        for specifier in &source_file.module_specifiers {
            let resolved = host
                .resolve_module_name(&specifier.text, &file_name)
                .map(|target| host.get_canonical_file_name(&target));
            if let Some(target) = &resolved {
                queue.push_back((target.clone(), false));
            }
            resolved_imports.push(ResolvedImport {
                specifier: specifier.text.clone(),
                start: specifier.start,
                length: specifier.length,
                resolved,
            });
        }
        imports.insert(file_name.clone(), resolved_imports);
        files.insert(file_name, source_file);
    }
    ProgramWalk {
        files,
        imports,
        missing_roots,
    }
}

/// Source files reachable from `root_names`, in program order. Lets callers
/// inspect the program before the builder program is created.
pub fn discover_source_files(root_names: &[String], host: &dyn CompilerHost) -> Vec<Arc<SourceFile>> {
    let root_names: Vec<String> = root_names
        .iter()
        .map(|name| host.get_canonical_file_name(name))
        .collect();
    walk(&root_names, host).files.into_values().collect()
}

#[derive(Debug)]
pub struct BuilderProgram {
    options: CompilerOptions,
    root_names: Vec<String>,
    /// Source files in program order.
    files: IndexMap<String, Arc<SourceFile>>,
    imports: HashMap<String, Vec<ResolvedImport>>,
    importers: HashMap<String, BTreeSet<String>>,
    options_diagnostics: Vec<Diagnostic>,
    global_diagnostics: Vec<Diagnostic>,
    semantic_cache: HashMap<String, Vec<Diagnostic>>,
    affected_queue: VecDeque<String>,
    pending_emit: IndexSet<String>,
    has_affected_history: bool,
}

impl BuilderProgram {
    /// Builds the program reachable from `root_names` through relative imports.
    pub fn create(
        root_names: &[String],
        options: CompilerOptions,
        host: &dyn CompilerHost,
        baseline: Option<ProgramBaseline>,
    ) -> Self {
        let root_names: Vec<String> = root_names
            .iter()
            .map(|name| host.get_canonical_file_name(name))
            .collect();
        let ProgramWalk {
            files,
            imports,
            missing_roots,
        } = walk(&root_names, host);
        let global_diagnostics = missing_roots
            .into_iter()
            .map(|file_name| {
                Diagnostic::error(FILE_NOT_FOUND_CODE, format!("File '{}' not found.", file_name))
            })
            .collect();

        let mut importers: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (file_name, resolved_imports) in &imports {
            for target in resolved_imports.iter().filter_map(|i| i.resolved.as_ref()) {
                importers
                    .entry(target.clone())
                    .or_default()
                    .insert(file_name.clone());
            }
        }

        let mut options_diagnostics = Vec::new();
        if options.source_map == Some(true) && options.inline_source_map == Some(true) {
            options_diagnostics.push(Diagnostic::error(
                CONFLICTING_OPTIONS_CODE,
                "Option 'sourceMap' cannot be specified with option 'inlineSourceMap'.",
            ));
        }

        let mut program = BuilderProgram {
            options,
            root_names,
            files,
            imports,
            importers,
            options_diagnostics,
            global_diagnostics,
            semantic_cache: HashMap::new(),
            affected_queue: VecDeque::new(),
            pending_emit: IndexSet::new(),
            has_affected_history: false,
        };
        program.diff_against(baseline);
        program
    }

    fn diff_against(&mut self, baseline: Option<ProgramBaseline>) {
        let prior = baseline.and_then(|baseline| {
            let (prior_options, prior, has_history) = baseline.into_prior();
            if prior_options == self.options {
                Some((prior, has_history))
            } else {
                debug!("compiler options changed; discarding incremental baseline");
                None
            }
        });

        let affected: HashSet<String> = match prior {
            None => {
                self.pending_emit = self.files.keys().cloned().collect();
                self.files.keys().cloned().collect()
            }
            Some((mut prior, has_history)) => {
                self.has_affected_history = has_history;
                let mut affected = HashSet::new();
                let mut changed_shape = HashSet::new();
                for (name, source_file) in &self.files {
                    let targets = self.import_targets(name);
                    match prior.get(name) {
                        Some(p) if p.version == source_file.version && p.imports == targets => {}
                        Some(p) => {
                            affected.insert(name.clone());
                            if p.signature != source_file.export_signature {
                                changed_shape.insert(name.clone());
                            }
                        }
                        None => {
                            affected.insert(name.clone());
                        }
                    }
                }
                for name in prior.keys() {
                    if !self.files.contains_key(name) {
                        changed_shape.insert(name.clone());
                    }
                }
                for name in &changed_shape {
                    if let Some(users) = self.importers.get(name) {
                        affected.extend(users.iter().cloned());
                    }
                }

                for (name, p) in prior.iter_mut() {
                    if !self.files.contains_key(name) || affected.contains(name) {
                        continue;
                    }
                    if let Some(diagnostics) = p.semantic_diagnostics.take() {
                        self.semantic_cache.insert(name.clone(), diagnostics);
                    }
                }
                self.pending_emit = self
                    .files
                    .keys()
                    .filter(|name| {
                        affected.contains(*name) || prior.get(*name).is_some_and(|p| p.pending_emit)
                    })
                    .cloned()
                    .collect();
                affected
            }
        };

        self.affected_queue = self
            .files
            .keys()
            .filter(|name| affected.contains(*name))
            .cloned()
            .collect();
        debug!(
            files = self.files.len(),
            affected = self.affected_queue.len(),
            "created builder program"
        );
    }

    fn import_targets(&self, file_name: &str) -> Vec<Option<String>> {
        self.imports
            .get(file_name)
            .map(|imports| imports.iter().map(|i| i.resolved.clone()).collect())
            .unwrap_or_default()
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn root_names(&self) -> &[String] {
        &self.root_names
    }

    /// Source files in program order.
    pub fn source_files(&self) -> impl Iterator<Item = &Arc<SourceFile>> {
        self.files.values()
    }

    pub fn get_source_file(&self, file_name: &str) -> Option<&Arc<SourceFile>> {
        self.files.get(file_name)
    }

    pub fn imports_of(&self, file_name: &str) -> &[ResolvedImport] {
        self.imports.get(file_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Export signatures of every file `file_name` imports, in import order.
    pub fn dependency_signatures(&self, file_name: &str) -> Vec<&str> {
        self.imports_of(file_name)
            .iter()
            .filter_map(|i| i.resolved.as_deref())
            .filter_map(|target| self.files.get(target))
            .map(|file| file.export_signature.as_str())
            .collect()
    }

    /// False when the program was created cold or from a persisted snapshot.
    pub fn has_affected_history(&self) -> bool {
        self.has_affected_history
    }

    pub fn get_options_diagnostics(&self) -> &[Diagnostic] {
        &self.options_diagnostics
    }

    pub fn get_global_diagnostics(&self) -> &[Diagnostic] {
        &self.global_diagnostics
    }

    pub fn get_syntactic_diagnostics(&self, file_name: &str) -> &[Diagnostic] {
        self.files
            .get(file_name)
            .map(|file| file.parse_diagnostics.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_cached_semantic_diagnostics(&self, file_name: &str) -> bool {
        self.semantic_cache.contains_key(file_name)
    }

    /// Semantic diagnostics of a file, computed at most once per program.
    pub fn get_semantic_diagnostics(&mut self, file_name: &str) -> Vec<Diagnostic> {
        if let Some(cached) = self.semantic_cache.get(file_name) {
            return cached.clone();
        }
        let Some(source_file) = self.files.get(file_name) else {
            return Vec::new();
        };
        let mut diagnostics = source_file.local_semantic_diagnostics.clone();
        for import in self.imports_of(file_name) {
            if import.resolved.is_none() && import.is_relative() {
                diagnostics.push(
                    Diagnostic::error(
                        CANNOT_FIND_MODULE_CODE,
                        format!(
                            "Cannot find module '{}' or its corresponding type declarations.",
                            import.specifier
                        ),
                    )
                    .with_file(file_name)
                    .with_span(import.start, import.length),
                );
            }
        }
        self.semantic_cache
            .insert(file_name.to_string(), diagnostics.clone());
        diagnostics
    }

    /// Hands out the next affected file, computing its semantic diagnostics
    /// unless `ignore_source_file` excludes it. Returns `None` once every
    /// affected file of this pass has been handed out.
    pub fn get_semantic_diagnostics_of_next_affected_file<F>(
        &mut self,
        ignore_source_file: F,
    ) -> Option<AffectedFileResult>
    where
        F: Fn(&str) -> bool,
    {
        let file_name = self.affected_queue.pop_front()?;
        if ignore_source_file(&file_name) {
            return Some(AffectedFileResult {
                file_name,
                diagnostics: Vec::new(),
            });
        }
        let diagnostics = self.get_semantic_diagnostics(&file_name);
        Some(AffectedFileResult {
            file_name,
            diagnostics,
        })
    }

    /// Files whose emitted output is out of date.
    pub fn pending_emit(&self) -> &IndexSet<String> {
        &self.pending_emit
    }

    pub fn mark_emitted(&mut self, file_name: &str) {
        self.pending_emit.shift_remove(file_name);
    }

    pub fn to_build_info(&self) -> BuildInfo {
        let files = self
            .files
            .iter()
            .map(|(name, file)| {
                (
                    name.clone(),
                    BuildInfoFile {
                        version: file.version.clone(),
                        signature: file.export_signature.clone(),
                        imports: self.import_targets(name),
                        semantic_diagnostics: self.semantic_cache.get(name).cloned(),
                        pending_emit: self.pending_emit.contains(name),
                    },
                )
            })
            .collect();
        BuildInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            options: self.options.clone(),
            files,
        }
    }
}

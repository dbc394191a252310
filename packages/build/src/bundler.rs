// Angular Builder
//
// Runs one compilation pass for a bundler back-end and turns it into a build
// result: the emitted modules, the resource modules a JIT build imports,
// the diagnostics and the files to watch.

use crate::compile::{
    load_compiler_package, CompilationSession, EmitCoordinator, EmitFileResult, RebuildConsumers,
    SessionContext, WorkerPool,
};
use crate::ngtsc::diagnostics::{make_diagnostic, DiagnosticPhase, DiagnosticRecord, ErrorCode};
use crate::ngtsc::file_system::{relative, FileSystem};
use crate::ngtsc::resource::{parse_jit_uri, JitOrigin, ResourceError, ResourceKind, ResourceRequest};
use crate::perform_watch::ChangeSet;
use crate::transformers::api::HostOptions;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use ts::{dirname, join_paths, output_file_name, Diagnostic};

static JIT_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:from|import)\s*["'](angular:jit:[^"']+)["']"#).unwrap()
});

#[derive(Debug, Clone, Default)]
pub struct BuilderOptions {
    /// tsconfig file, or the directory containing `tsconfig.json`.
    pub project: String,
    /// Build with the lightweight strategy.
    pub jit: bool,
    /// File replacements, substitutions and the persistent cache path.
    pub host_options: HostOptions,
    /// Directory output paths are placed under. Paths stay relative to the
    /// project when unset.
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    JavaScript,
    /// Compiled template or stylesheet served for an `angular:jit:` import.
    Resource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: String,
    pub contents: String,
    pub kind: OutputKind,
    /// Later stages may skip minifying.
    pub minimized: bool,
    /// Later stages may copy the file without processing it.
    pub copied_verbatim: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BuildResult {
    /// False only when the pass could not run at all.
    pub success: bool,
    pub fatal: Option<String>,
    pub output_files: Vec<OutputFile>,
    pub asset_files: Vec<OutputFile>,
    pub watch_files: BTreeSet<String>,
    pub diagnostics: Vec<DiagnosticRecord>,
    pub affected_files: BTreeSet<String>,
    /// Modules whose output changed since the previous pass.
    pub rebuilt_modules: BTreeSet<String>,
    /// Global constants the bundler substitutes into the output.
    pub defines: Vec<(&'static str, &'static str)>,
}

impl BuildResult {
    pub fn failure(message: impl Into<String>) -> Self {
        BuildResult {
            success: false,
            fatal: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        self.fatal.is_some() || self.diagnostics.iter().any(DiagnosticRecord::is_error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CachedModule {
    output_path: String,
    contents: String,
}

/// Emitted modules by source file, kept across passes so every result
/// carries the complete output.
#[derive(Debug, Default)]
struct ModuleCache {
    modules: BTreeMap<String, CachedModule>,
    stale: BTreeSet<String>,
}

impl RebuildConsumers for ModuleCache {
    fn mark_for_rebuild(&mut self, file: &str) {
        self.stale.insert(file.to_string());
    }
}

pub struct AngularBuilder {
    fs: Arc<dyn FileSystem>,
    options: BuilderOptions,
    session: CompilationSession,
    coordinator: EmitCoordinator,
    modules: ModuleCache,
    resources: BTreeMap<String, OutputFile>,
    /// Files the `angular:jit:` resources of the last pass were built from.
    resource_files: BTreeSet<String>,
}

impl AngularBuilder {
    pub fn new(fs: Arc<dyn FileSystem>, options: BuilderOptions, pool: Option<Arc<WorkerPool>>) -> Self {
        let context = SessionContext::new(Arc::clone(&fs), pool);
        let session = if options.jit {
            CompilationSession::lightweight(context)
        } else {
            CompilationSession::full(context)
        };
        Self::with_session(fs, options, session)
    }

    pub fn with_session(fs: Arc<dyn FileSystem>, options: BuilderOptions, session: CompilationSession) -> Self {
        let coordinator = match &options.host_options.cache_path {
            Some(cache_path) => EmitCoordinator::load(fs.as_ref(), cache_path),
            None => EmitCoordinator::in_memory(),
        };
        AngularBuilder {
            fs,
            options,
            session,
            coordinator,
            modules: ModuleCache::default(),
            resources: BTreeMap::new(),
            resource_files: BTreeSet::new(),
        }
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    pub fn session(&self) -> &CompilationSession {
        &self.session
    }

    /// Runs a pass over `changes`. The first pass gets an empty change set.
    pub fn build(&mut self, changes: &ChangeSet) -> BuildResult {
        let host_options = self
            .options
            .host_options
            .clone()
            .with_modified_files(changes.iter().cloned());
        let init = match self.session.initialize(&self.options.project, host_options, None) {
            Ok(init) => init,
            Err(e) => {
                error!(error = %e, "compilation failed");
                return BuildResult::failure(e.to_string());
            }
        };
        for removed in &changes.removed {
            self.coordinator.forget(removed);
        }

        let mut diagnostics: Vec<DiagnosticRecord> = self.session.collect_diagnostics().collect();
        let emitted: Vec<EmitFileResult> = self.session.emit_affected_files().collect();
        for result in &emitted {
            let module = CachedModule {
                output_path: self.output_path_of(&result.filename),
                contents: result.contents.clone(),
            };
            self.modules.modules.insert(result.filename.clone(), module);
        }
        self.coordinator
            .rebuild_required_files(&mut self.modules, &emitted);

        if !init.errors.iter().any(Diagnostic::is_error) {
            let dropped: Vec<String> = self
                .modules
                .modules
                .keys()
                .filter(|file| !init.referenced_files.contains(*file))
                .cloned()
                .collect();
            if let Some(loader) = self.session.resource_loader_mut() {
                for file in &dropped {
                    loader.remove_origin(file);
                }
            }
            self.modules
                .modules
                .retain(|file, _| init.referenced_files.contains(file));
        }
        if self.session.is_lightweight() {
            if let Err(e) = self.resolve_jit_resources(&mut diagnostics) {
                error!(error = %e, "resource compilation failed");
                return BuildResult::failure(e.to_string());
            }
        }
        self.persist();

        let mut watch_files = init.referenced_files;
        watch_files.extend(self.resource_files.iter().filter(|file| self.fs.exists(file)).cloned());
        let rebuilt_modules = std::mem::take(&mut self.modules.stale);
        info!(
            emitted = emitted.len(),
            rebuilt = rebuilt_modules.len(),
            diagnostics = diagnostics.len(),
            "build finished"
        );

        BuildResult {
            success: true,
            fatal: None,
            output_files: self.output_files(),
            asset_files: self.resources.values().cloned().collect(),
            watch_files,
            diagnostics,
            affected_files: init.affected_files,
            rebuilt_modules,
            defines: load_compiler_package().global_defines(self.options.jit).to_vec(),
        }
    }

    fn output_path_of(&self, file: &str) -> String {
        let project = &self.options.project;
        let base = if project.ends_with(".json") {
            dirname(project)
        } else {
            project.as_str()
        };
        let relative = relative(base, &output_file_name(file));
        match &self.options.output_path {
            Some(output_path) => join_paths(output_path, &relative),
            None => relative,
        }
    }

    fn output_files(&self) -> Vec<OutputFile> {
        self.modules
            .modules
            .values()
            .map(|module| OutputFile {
                path: module.output_path.clone(),
                contents: module.contents.clone(),
                kind: OutputKind::JavaScript,
                minimized: false,
                copied_verbatim: false,
            })
            .collect()
    }

    /// Compiles every resource the cached modules import through an
    /// `angular:jit:` specifier. Unchanged resources come from the loader
    /// cache.
    fn resolve_jit_resources(&mut self, diagnostics: &mut Vec<DiagnosticRecord>) -> Result<(), ResourceError> {
        let Some(loader) = self.session.resource_loader_mut() else {
            return Ok(());
        };
        let fs = Arc::clone(&self.fs);
        let lookup = |name: &str| -> Option<Arc<str>> { fs.read_file(name).ok().map(Arc::from) };

        let mut resources = BTreeMap::new();
        let mut resource_files = BTreeSet::new();
        let mut compiled_modules = Vec::new();
        for (file, module) in &self.modules.modules {
            let mut requested = BTreeSet::new();
            for captures in JIT_IMPORT.captures_iter(&module.contents) {
                let Some(uri) = captures.get(1).map(|m| m.as_str()) else {
                    continue;
                };
                let Some(resource) = parse_jit_uri(uri) else {
                    warn!(file = %file, specifier = %uri, "unrecognized resource import");
                    continue;
                };
                let (label, request) = match resource.origin {
                    JitOrigin::File(path) => {
                        let request = ResourceRequest::file(&join_paths(dirname(file), &path), Some(file));
                        (path, request)
                    }
                    JitOrigin::Inline {
                        containing_file,
                        data,
                    } => (
                        format!("inline {}", resource.kind),
                        ResourceRequest::inline(&data, inline_extension(resource.kind), resource.kind, &containing_file),
                    ),
                };
                requested.insert(request.key());
                if resources.contains_key(uri) {
                    continue;
                }
                let compiled = loader.load(request)?;
                if let Some(entry) = loader.entry(&compiled.key) {
                    resource_files.extend(entry.dependency_files.iter().cloned());
                }
                for error in &compiled.errors {
                    let diagnostic = make_diagnostic(
                        ErrorCode::ComponentResourceCompilationFailed,
                        file,
                        0,
                        0,
                        format!("Failed to compile '{}': {}", label, error.text),
                    );
                    diagnostics.push(DiagnosticRecord::from_diagnostic(
                        &diagnostic,
                        DiagnosticPhase::Template,
                        &lookup,
                    ));
                }
                compiled_modules.push(EmitFileResult {
                    filename: uri.to_string(),
                    contents: compiled.content.clone(),
                    dependencies: Vec::new(),
                });
                resources.insert(
                    uri.to_string(),
                    OutputFile {
                        path: uri.to_string(),
                        contents: compiled.content,
                        kind: OutputKind::Resource,
                        minimized: false,
                        copied_verbatim: true,
                    },
                );
            }
            loader.retain_origin(file, &requested);
        }

        for removed in self.resources.keys().filter(|uri| !resources.contains_key(*uri)) {
            self.coordinator.forget(removed);
        }
        self.coordinator
            .rebuild_required_files(&mut self.modules, &compiled_modules);
        self.resources = resources;
        self.resource_files = resource_files;
        Ok(())
    }

    fn persist(&self) {
        if self.options.host_options.cache_path.is_none() {
            return;
        }
        if let Err(e) = self.session.save_build_info() {
            warn!(error = %e, "failed to save build info");
        }
        if let Err(e) = self.coordinator.save(self.fs.as_ref()) {
            warn!(error = %e, "failed to save emit history");
        }
    }
}

fn inline_extension(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Template => ".html",
        ResourceKind::Style => ".css",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ngtsc::file_system::testing::MockFileSystem;

    const COMPONENT: &str = "import { Component } from '@angular/core';

@Component({
  selector: 'app-root',
  templateUrl: './app.component.html',
  styleUrl: './app.component.css',
})
export class AppComponent {
  title = 'app';
}
";

    fn project() -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.init_with_files(vec![
            ("/app/tsconfig.json", r#"{ "files": ["src/main.ts"] }"#),
            (
                "/app/src/main.ts",
                "import { AppComponent } from './app.component';\nconsole.log(AppComponent);\n",
            ),
            ("/app/src/app.component.ts", COMPONENT),
            ("/app/src/app.component.html", "<h1>{{ title }}</h1>"),
            ("/app/src/app.component.css", "h1 { color: red; }"),
        ]);
        fs
    }

    fn builder(fs: &MockFileSystem, jit: bool) -> AngularBuilder {
        let options = BuilderOptions {
            project: "/app/tsconfig.json".to_string(),
            jit,
            output_path: Some("/dist".to_string()),
            ..Default::default()
        };
        AngularBuilder::new(Arc::new(fs.clone()), options, None)
    }

    #[test]
    fn aot_build_outputs_every_module() {
        let fs = project();
        let mut builder = builder(&fs, false);
        let result = builder.build(&ChangeSet::default());

        assert!(result.success);
        assert!(!result.has_errors());
        let paths: Vec<&str> = result.output_files.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["/dist/src/app.component.js", "/dist/src/main.js"]);
        assert!(result.asset_files.is_empty());
        assert!(result.watch_files.contains("/app/src/app.component.css"));
        assert_eq!(result.rebuilt_modules.len(), 2);
    }

    #[test]
    fn jit_build_serves_resources_as_assets() {
        let fs = project();
        let mut builder = builder(&fs, true);
        let result = builder.build(&ChangeSet::default());

        assert!(result.success);
        let assets: Vec<(&str, &str)> = result
            .asset_files
            .iter()
            .map(|asset| (asset.path.as_str(), asset.contents.as_str()))
            .collect();
        assert_eq!(
            assets,
            vec![
                ("angular:jit:style:file;./app.component.css", "h1 { color: red; }"),
                ("angular:jit:template:file;./app.component.html", "<h1>{{ title }}</h1>"),
            ]
        );
        assert!(result.watch_files.contains("/app/src/app.component.html"));
        assert!(result.defines.iter().all(|(name, _)| *name != "ngJitMode"));
        assert!(result.defines.contains(&("ngDevMode", "false")));

        fs.set("/app/src/app.component.html", "<h2>{{ title }}</h2>");
        let changes = ChangeSet {
            modified: BTreeSet::from(["/app/src/app.component.html".to_string()]),
            ..Default::default()
        };
        let result = builder.build(&changes);
        assert_eq!(
            result.rebuilt_modules.into_iter().collect::<Vec<_>>(),
            vec!["angular:jit:template:file;./app.component.html"]
        );
    }

    fn inline_the_template(fs: &MockFileSystem) -> ChangeSet {
        fs.set(
            "/app/src/app.component.ts",
            &COMPONENT.replace("templateUrl: './app.component.html'", "template: '<h1>{{ title }}</h1>'"),
        );
        ChangeSet {
            modified: BTreeSet::from(["/app/src/app.component.ts".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn dropped_template_url_leaves_the_watch_set() {
        let fs = project();
        let mut builder = builder(&fs, false);
        let result = builder.build(&ChangeSet::default());
        assert!(result.watch_files.contains("/app/src/app.component.html"));

        let result = builder.build(&inline_the_template(&fs));
        assert!(!result.watch_files.contains("/app/src/app.component.html"));
        assert!(result.watch_files.contains("/app/src/app.component.css"));
        let loader = builder.session().resource_loader().unwrap();
        assert!(!loader.contains("/app/src/app.component.html"));
    }

    #[test]
    fn jit_build_releases_resources_no_longer_imported() {
        let fs = project();
        let mut builder = builder(&fs, true);
        builder.build(&ChangeSet::default());

        let result = builder.build(&inline_the_template(&fs));
        assert!(!result.watch_files.contains("/app/src/app.component.html"));
        assert!(result.watch_files.contains("/app/src/app.component.css"));
        assert!(!result
            .asset_files
            .iter()
            .any(|asset| asset.path.ends_with("app.component.html")));
        let loader = builder.session().resource_loader().unwrap();
        assert!(!loader.contains("/app/src/app.component.html"));
        assert!(loader.contains("/app/src/app.component.css"));
    }

    #[test]
    fn bad_configuration_is_not_fatal() {
        let fs = project();
        fs.set("/app/tsconfig.json", "{ \"files\": [");
        let mut builder = builder(&fs, false);
        let result = builder.build(&ChangeSet::default());
        assert!(result.success);
        assert!(result.has_errors());
        assert!(result.output_files.is_empty());
        assert!(result.watch_files.contains("/app/tsconfig.json"));
    }
}

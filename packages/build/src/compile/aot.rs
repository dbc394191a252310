// AOT Compilation
//
// The full strategy: every pass analyzes the components of the program
// before the program is built, so template diagnostics and type-check shims
// are part of it. Emit inlines compiled resources and records every emitted
// file with the incremental bookkeeping.

use super::affected::collect_affected_files;
use super::emit_coordinator::{emit_fingerprint, required_files};
use super::package::load_compiler_package;
use super::session::{
    configure, degraded_result, referenced_files, Diagnostics, EmitAffectedFiles, EmitMode,
    ProgramPass, SessionContext, SessionState,
};
use super::{CompileError, InitializeResult, OptionsTransform, SessionPhase};
use crate::ngtsc::core::NgCompiler;
use crate::ngtsc::incremental::{IncrementalBuild, IncrementalState};
use crate::ngtsc::resource::ResourceLoader;
use crate::transformers::api::HostOptions;
use crate::transformers::compiler_host::AngularCompilerHost;
use std::sync::Arc;
use tracing::info;
use ts::{discover_source_files, BuilderProgram};

pub struct AotCompilation {
    context: SessionContext,
    state: SessionState,
    compiler: Option<NgCompiler>,
    incremental: IncrementalState,
    phase: SessionPhase,
}

impl AotCompilation {
    pub fn new(context: SessionContext) -> Self {
        AotCompilation {
            context,
            state: SessionState::default(),
            compiler: None,
            incremental: IncrementalState::new(),
            phase: SessionPhase::Uninitialized,
        }
    }

    pub fn initialize(
        &mut self,
        project: &str,
        host_options: HostOptions,
        options_transform: Option<OptionsTransform<'_>>,
    ) -> Result<InitializeResult, CompileError> {
        let result = self.run_initialize(project, host_options, options_transform);
        if result.is_err() {
            self.phase = SessionPhase::Uninitialized;
        }
        result
    }

    fn run_initialize(
        &mut self,
        project: &str,
        host_options: HostOptions,
        options_transform: Option<OptionsTransform<'_>>,
    ) -> Result<InitializeResult, CompileError> {
        load_compiler_package();
        self.phase = SessionPhase::Initializing;

        let config = configure(&mut self.context, project, &host_options, options_transform);
        if config.has_errors() {
            let result = degraded_result(&mut self.state, config);
            self.phase = SessionPhase::Ready;
            return Ok(result);
        }

        let mut host = AngularCompilerHost::new(
            Arc::clone(&self.context.fs),
            host_options,
            Arc::clone(&self.context.source_files),
        );
        let baseline = self.state.take_baseline(
            self.context.fs.as_ref(),
            config.options.ts_build_info_file.as_deref(),
        );

        self.phase = SessionPhase::Analyzing;
        let files = discover_source_files(&config.root_names, &host);
        let mut compiler = NgCompiler::from_prior(config.ng_options.clone(), self.compiler.take());
        if let Err(e) = compiler.analyze(&files, &host, &mut self.context.resources) {
            self.compiler = Some(compiler);
            self.state.restore_baseline(baseline);
            return Err(e.into());
        }
        host.set_shims(compiler.shims().cloned());

        let mut root_names = config.root_names.clone();
        root_names.extend(host.shim_names());
        let mut program = BuilderProgram::create(&root_names, config.options.clone(), &host, baseline);
        let affected_files = collect_affected_files(&mut program);
        self.incremental
            .retain(|file| program.get_source_file(file).is_some());

        let pass = ProgramPass {
            host,
            program,
            affected_files: affected_files.clone(),
        };
        let referenced = referenced_files(
            &pass,
            compiler
                .resource_files()
                .into_iter()
                .chain(config.config_files.iter().cloned()),
        );
        info!(
            project = %config.project,
            files = referenced.len(),
            affected = affected_files.len(),
            "initialized AOT compilation"
        );

        self.state = SessionState::ready(config.options.clone(), config.errors.clone(), pass);
        self.compiler = Some(compiler);
        self.phase = SessionPhase::Ready;
        Ok(InitializeResult {
            affected_files,
            compiler_options: config.options,
            referenced_files: referenced,
            errors: config.errors,
        })
    }

    pub fn collect_diagnostics(&mut self) -> Diagnostics<'_> {
        self.phase.assert_ready("collect_diagnostics");
        Diagnostics::new(&mut self.state, self.compiler.as_ref())
    }

    pub fn emit_affected_files(&mut self) -> EmitAffectedFiles<'_> {
        self.phase.assert_ready("emit_affected_files");
        let (Some(pass), Some(compiler)) = (self.state.pass.as_mut(), self.compiler.as_ref()) else {
            return EmitAffectedFiles::empty(&mut self.phase);
        };
        let incremental = &self.incremental;
        let program = &pass.program;
        let files = required_files(
            program,
            &pass.affected_files,
            Some(|file: &str| {
                let fingerprint = emit_fingerprint(program, file, compiler.resource_hashes(file));
                incremental.safe_to_skip(file, &fingerprint)
            }),
        );
        EmitAffectedFiles::new(
            files,
            Some(pass),
            EmitMode::Inline {
                compiler,
                incremental: &mut self.incremental,
            },
            &mut self.phase,
        )
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn save_build_info(&self) -> Result<(), CompileError> {
        Ok(self.state.save_build_info(self.context.fs.as_ref())?)
    }

    pub fn resource_loader(&self) -> &ResourceLoader {
        &self.context.resources
    }

    pub fn resource_loader_mut(&mut self) -> &mut ResourceLoader {
        &mut self.context.resources
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ngtsc::core::PROPERTY_DOES_NOT_EXIST_CODE;
    use crate::ngtsc::diagnostics::DiagnosticPhase;
    use crate::ngtsc::file_system::testing::MockFileSystem;
    use crate::ngtsc::file_system::FileSystem;
    use crate::ngtsc::resource::{FileResourceBundler, ResourceBundler, SubBuildOutput, SubBuildRequest};
    use std::sync::atomic::{AtomicBool, Ordering};

    const COMPONENT: &str = "import { Component } from '@angular/core';

@Component({
  selector: 'app-root',
  templateUrl: './app.component.html',
})
export class AppComponent {
  title = 'app';
}
";

    fn project(template: &str) -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.init_with_files(vec![
            ("/app/tsconfig.json", r#"{ "files": ["src/main.ts"] }"#),
            (
                "/app/src/main.ts",
                "import { AppComponent } from './app.component';\nconsole.log(AppComponent);\n",
            ),
            ("/app/src/app.component.ts", COMPONENT),
            ("/app/src/app.component.html", template),
        ]);
        fs
    }

    fn compilation(fs: &MockFileSystem) -> AotCompilation {
        let fs: Arc<dyn FileSystem> = Arc::new(fs.clone());
        AotCompilation::new(SessionContext::new(fs, None))
    }

    #[test]
    fn analyzes_before_becoming_ready() {
        let fs = project("<h1>{{ title }}</h1>");
        let mut aot = compilation(&fs);
        assert_eq!(aot.phase(), SessionPhase::Uninitialized);

        let result = aot
            .initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();
        assert_eq!(aot.phase(), SessionPhase::Ready);
        assert!(result.errors.is_empty());
        assert_eq!(
            result.affected_files.iter().collect::<Vec<_>>(),
            vec!["/app/src/app.component.ts", "/app/src/main.ts"]
        );
        assert!(result.referenced_files.contains("/app/src/app.component.html"));
        assert!(result.referenced_files.contains("/app/tsconfig.json"));
        assert!(!result
            .referenced_files
            .iter()
            .any(|file| file.ends_with(".ngtypecheck.ts")));
        assert_eq!(result.compiler_options.no_emit_on_error, Some(false));
    }

    #[test]
    fn reports_template_diagnostics_after_semantic_ones() {
        let fs = project("<h1>{{ missing }}</h1>");
        let mut aot = compilation(&fs);
        aot.initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();

        let records: Vec<_> = aot.collect_diagnostics().collect();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.phase, DiagnosticPhase::Template);
        assert_eq!(record.file.as_deref(), Some("/app/src/app.component.html"));
        assert!(record.message.contains("Property 'missing' does not exist"));
    }

    #[test]
    fn emit_inlines_template_and_records_emits() {
        let fs = project("<h1>{{ title }}</h1>");
        let mut aot = compilation(&fs);
        aot.initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();

        let emitted: Vec<_> = aot.emit_affected_files().collect();
        assert_eq!(aot.phase(), SessionPhase::Ready);
        let names: Vec<&str> = emitted.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["/app/src/main.ts", "/app/src/app.component.ts"]);
        let component = &emitted[1];
        assert!(component.contents.contains("{{ title }}"));
        assert!(!component.contents.contains("templateUrl"));
        assert_eq!(component.dependencies, vec!["/app/src/app.component.html"]);

        aot.initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();
        assert_eq!(aot.emit_affected_files().count(), 0);
    }

    #[test]
    fn template_change_affects_only_its_component() {
        let fs = project("<h1>{{ title }}</h1>");
        let mut aot = compilation(&fs);
        aot.initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();
        aot.emit_affected_files().for_each(drop);

        fs.set("/app/src/app.component.html", "<h2>{{ title }}</h2>");
        let options = HostOptions::default().with_modified_files(["/app/src/app.component.html"]);
        let result = aot.initialize("/app/tsconfig.json", options, None).unwrap();
        assert_eq!(
            result.affected_files.into_iter().collect::<Vec<_>>(),
            vec!["/app/src/app.component.ts"]
        );
        let emitted: Vec<_> = aot.emit_affected_files().collect();
        assert_eq!(emitted.len(), 1);
        assert!(emitted[0].contents.contains("<h2>"));
    }

    #[test]
    fn orders_diagnostics_by_program_then_phase() {
        let fs = MockFileSystem::new();
        fs.init_with_files(vec![
            (
                "/app/tsconfig.json",
                r#"{
                    "files": ["src/main.ts"],
                    "angularCompilerOptions": { "strictTemplates": true, "fullTemplateTypeCheck": false }
                }"#,
            ),
            (
                "/app/src/main.ts",
                "import { AppComponent } from './app.component';\nconsole.log(AppComponent);\n",
            ),
            (
                "/app/src/app.component.ts",
                "import { Component } from '@angular/core';\nimport { helper } from './gone';\n\nconst code = '\\u{zz}';\n\n@Component({ selector: 'app-root', template: '<h1>{{ missing }}</h1>' })\nexport class AppComponent {\n  title = helper(code);\n}\n",
            ),
        ]);
        let mut aot = compilation(&fs);
        aot.initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();

        let records: Vec<_> = aot.collect_diagnostics().collect();
        let phases: Vec<DiagnosticPhase> = records.iter().map(|record| record.phase).collect();
        assert_eq!(
            phases,
            vec![
                DiagnosticPhase::Program,
                DiagnosticPhase::Syntactic,
                DiagnosticPhase::Semantic,
                DiagnosticPhase::Template,
            ]
        );
        assert!(records[0].file.is_none());
        assert!(records[0].code_text().starts_with("NG"));
        for record in &records[1..] {
            assert_eq!(record.file.as_deref(), Some("/app/src/app.component.ts"));
        }
        assert_eq!(records[2].code_text(), "TS2307");
        assert_eq!(records[3].code, PROPERTY_DOES_NOT_EXIST_CODE);
    }

    /// Sub-build that produces no content while `broken` is set.
    struct FlakyBundler {
        inner: FileResourceBundler,
        broken: Arc<AtomicBool>,
    }

    impl ResourceBundler for FlakyBundler {
        fn bundle(&self, request: &SubBuildRequest) -> SubBuildOutput {
            if self.broken.load(Ordering::SeqCst) {
                return SubBuildOutput::default();
            }
            self.inner.bundle(request)
        }
    }

    #[test]
    fn failed_pass_keeps_the_previous_program_as_baseline() {
        let fs = project("<h1>{{ title }}</h1>");
        let shared: Arc<dyn FileSystem> = Arc::new(fs.clone());
        let broken = Arc::new(AtomicBool::new(false));
        let mut context = SessionContext::new(Arc::clone(&shared), None);
        context.resources = ResourceLoader::new(Arc::new(FlakyBundler {
            inner: FileResourceBundler::new(shared),
            broken: Arc::clone(&broken),
        }));
        let mut aot = AotCompilation::new(context);
        aot.initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();
        aot.emit_affected_files().for_each(drop);

        broken.store(true, Ordering::SeqCst);
        fs.set("/app/src/app.component.html", "<h2>{{ title }}</h2>");
        let options = HostOptions::default().with_modified_files(["/app/src/app.component.html"]);
        let failed = aot.initialize("/app/tsconfig.json", options, None);
        assert!(matches!(failed, Err(CompileError::Resource(_))));
        assert_eq!(aot.phase(), SessionPhase::Uninitialized);

        broken.store(false, Ordering::SeqCst);
        let result = aot
            .initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();
        assert_eq!(
            result.affected_files.into_iter().collect::<Vec<_>>(),
            vec!["/app/src/app.component.ts"]
        );
    }

    #[test]
    #[should_panic(expected = "collect_diagnostics requested while the compilation is Uninitialized")]
    fn collecting_before_initialize_panics() {
        let fs = project("");
        let mut aot = compilation(&fs);
        let _ = aot.collect_diagnostics();
    }
}

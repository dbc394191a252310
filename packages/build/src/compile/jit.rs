// JIT Compilation
//
// The lightweight strategy: no component analysis and no template
// diagnostics. Component resources are rewritten into imports of
// `angular:jit:` modules that the bundler resolves through the resource
// loader.

use super::affected::collect_affected_files;
use super::emit_coordinator::required_files;
use super::package::load_compiler_package;
use super::session::{
    configure, degraded_result, referenced_files, Diagnostics, EmitAffectedFiles, EmitMode,
    ProgramPass, SessionContext, SessionState,
};
use super::{CompileError, InitializeResult, OptionsTransform, SessionPhase};
use crate::ngtsc::resource::ResourceLoader;
use crate::transformers::api::HostOptions;
use crate::transformers::compiler_host::AngularCompilerHost;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use ts::BuilderProgram;

pub struct JitCompilation {
    context: SessionContext,
    state: SessionState,
    /// Files emitted by an earlier pass of this session.
    emitted: BTreeSet<String>,
    phase: SessionPhase,
}

impl JitCompilation {
    pub fn new(context: SessionContext) -> Self {
        JitCompilation {
            context,
            state: SessionState::default(),
            emitted: BTreeSet::new(),
            phase: SessionPhase::Uninitialized,
        }
    }

    pub fn initialize(
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

        let host = AngularCompilerHost::new(
            Arc::clone(&self.context.fs),
            host_options,
            Arc::clone(&self.context.source_files),
        );
        let baseline = self.state.take_baseline(
            self.context.fs.as_ref(),
            config.options.ts_build_info_file.as_deref(),
        );
        let mut program =
            BuilderProgram::create(&config.root_names, config.options.clone(), &host, baseline);
        let affected_files = collect_affected_files(&mut program);
        self.emitted
            .retain(|file| program.get_source_file(file).is_some());

        let pass = ProgramPass {
            host,
            program,
            affected_files: affected_files.clone(),
        };
        let referenced = referenced_files(&pass, config.config_files.iter().cloned());
        info!(
            project = %config.project,
            files = referenced.len(),
            affected = affected_files.len(),
            "initialized JIT compilation"
        );

        self.state = SessionState::ready(config.options.clone(), config.errors.clone(), pass);
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
        Diagnostics::new(&mut self.state, None)
    }

    pub fn emit_affected_files(&mut self) -> EmitAffectedFiles<'_> {
        self.phase.assert_ready("emit_affected_files");
        let Some(pass) = self.state.pass.as_mut() else {
            return EmitAffectedFiles::empty(&mut self.phase);
        };
        let emitted = &self.emitted;
        let files = required_files(
            &pass.program,
            &pass.affected_files,
            Some(|file: &str| emitted.contains(file)),
        );
        EmitAffectedFiles::new(
            files,
            Some(pass),
            EmitMode::ResourceImports {
                emitted: Some(&mut self.emitted),
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
    use crate::ngtsc::file_system::testing::MockFileSystem;
    use crate::ngtsc::file_system::FileSystem;
    use crate::ngtsc::resource::{parse_jit_uri, JitOrigin, ResourceKind};

    fn project() -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.init_with_files(vec![
            ("/app/tsconfig.json", r#"{ "files": ["src/app.component.ts"] }"#),
            (
                "/app/src/app.component.ts",
                "import { Component } from '@angular/core';\n\n@Component({\n  selector: 'app-root',\n  templateUrl: './app.component.html',\n  styles: ['h1 { color: red; }'],\n})\nexport class AppComponent {\n  missing = 1;\n}\n",
            ),
            ("/app/src/app.component.html", "<h1>{{ nothing }}</h1>"),
        ]);
        fs
    }

    fn compilation(fs: &MockFileSystem) -> JitCompilation {
        let fs: Arc<dyn FileSystem> = Arc::new(fs.clone());
        JitCompilation::new(SessionContext::new(fs, None))
    }

    #[test]
    fn skips_analysis_and_template_checks() {
        let fs = project();
        let mut jit = compilation(&fs);
        let result = jit
            .initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();
        assert_eq!(jit.phase(), SessionPhase::Ready);
        assert_eq!(
            result.affected_files.into_iter().collect::<Vec<_>>(),
            vec!["/app/src/app.component.ts"]
        );
        assert!(!result.referenced_files.contains("/app/src/app.component.html"));
        assert_eq!(jit.collect_diagnostics().count(), 0);
    }

    #[test]
    fn emit_imports_resources() {
        let fs = project();
        let mut jit = compilation(&fs);
        jit.initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();

        let emitted: Vec<_> = jit.emit_affected_files().collect();
        assert_eq!(emitted.len(), 1);
        let contents = &emitted[0].contents;
        assert!(contents.contains("angular:jit:template:file;./app.component.html"));
        assert!(!contents.contains("templateUrl"));

        let style_uri = contents
            .split(['"', '\''])
            .find(|part| part.starts_with("angular:jit:style:inline;"))
            .unwrap();
        let resource = parse_jit_uri(style_uri).unwrap();
        assert_eq!(resource.kind, ResourceKind::Style);
        let JitOrigin::Inline { data, .. } = resource.origin else {
            panic!("expected inline style");
        };
        assert_eq!(data, "h1 { color: red; }");
    }

    #[test]
    fn unchanged_program_emits_nothing() {
        let fs = project();
        let mut jit = compilation(&fs);
        jit.initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();
        jit.emit_affected_files().for_each(drop);

        let result = jit
            .initialize("/app/tsconfig.json", HostOptions::default(), None)
            .unwrap();
        assert!(result.affected_files.is_empty());
        assert_eq!(jit.emit_affected_files().count(), 0);
    }
}

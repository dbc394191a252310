// NgCompiler
//
// Analyzes the components of a program: loads their resources, scans their
// templates, reports metadata and template diagnostics and generates the
// type-check shims. Analyses survive across passes and are reused while
// neither the component file nor any of its resources changed.

use super::component::{
    extract_components, literal_offsets, may_contain_components, ComponentDecl, ResourceDecl,
    TextSpan,
};
use super::options::NgCompilerOptions;
use super::template::{parse_template, ParsedTemplate};
use super::transform::{inline_resources, InlineResources};
use crate::ngtsc::diagnostics::{make_diagnostic, make_related_information, ng_error_code, ErrorCode};
use crate::ngtsc::resource::{ResourceError, ResourceKind, ResourceLoader, ResourceRequest};
use crate::ngtsc::shims::{generate_type_check_shim, is_shim, ShimFile, TypeCheckTarget};
use crate::transformers::api::ResourceHost;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use ts::{version_of, Diagnostic, DiagnosticCategory, SourceFile};

/// Code of the "property does not exist" error reported for template reads.
pub const PROPERTY_DOES_NOT_EXIST_CODE: i32 = 2339;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedTemplate {
    pub content: String,
    /// File diagnostics inside the template are reported against.
    pub file: String,
    /// Offset of the template text inside `file`.
    pub base_offset: usize,
    /// Source offset of each byte of `content`, relative to `base_offset`.
    /// Empty when `content` is the verbatim source text.
    pub offsets: Vec<usize>,
    pub external: bool,
    pub parsed: ParsedTemplate,
}

impl AnalyzedTemplate {
    /// Maps a span of `content` to `(start, length)` in `file`.
    pub fn source_span(&self, start: usize, length: usize) -> (usize, usize) {
        let Some(last) = self.offsets.len().checked_sub(1) else {
            return (self.base_offset + start, length);
        };
        let from = self.offsets[start.min(last)];
        let to = self.offsets[(start + length).min(last)];
        (self.base_offset + from, to - from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedComponent {
    pub decl: ComponentDecl,
    pub template: Option<AnalyzedTemplate>,
    /// Compiled content of every style, `None` for styles that failed.
    pub styles: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAnalysis {
    pub file_name: String,
    pub version: String,
    pub components: Vec<AnalyzedComponent>,
    pub diagnostics: Vec<Diagnostic>,
    /// Every file the component resources were built from.
    pub resource_files: BTreeSet<String>,
    pub resource_hashes: Vec<String>,
    pub shim: Option<ShimFile>,
}

struct LoadedTemplate {
    path: String,
    content: String,
}

#[derive(Default)]
struct LoadedResources {
    templates: Vec<Option<LoadedTemplate>>,
    styles: Vec<Vec<Option<String>>>,
    diagnostics: Vec<Diagnostic>,
    files: BTreeSet<String>,
    hashes: Vec<String>,
}

/// A resource request waiting for its sub-build, with the slot its result fills.
struct PendingResource<'a> {
    component: usize,
    style: Option<usize>,
    label: &'a str,
    span: TextSpan,
    path: Option<String>,
}

pub struct NgCompiler {
    options: NgCompilerOptions,
    analyses: IndexMap<String, FileAnalysis>,
}

impl NgCompiler {
    pub fn new(options: NgCompilerOptions) -> Self {
        NgCompiler {
            options,
            analyses: IndexMap::new(),
        }
    }

    /// Starts from the analyses of `prior` when it ran with the same options.
    pub fn from_prior(options: NgCompilerOptions, prior: Option<NgCompiler>) -> Self {
        match prior {
            Some(prior) if prior.options == options => NgCompiler {
                options,
                analyses: prior.analyses,
            },
            _ => Self::new(options),
        }
    }

    pub fn options(&self) -> &NgCompilerOptions {
        &self.options
    }

    /// Analyzes every component file among `files`. Only a host
    /// misconfiguration that leaves a resource without content is an error.
    pub fn analyze(
        &mut self,
        files: &[Arc<SourceFile>],
        host: &dyn ResourceHost,
        loader: &mut ResourceLoader,
    ) -> Result<(), ResourceError> {
        let mut previous = std::mem::take(&mut self.analyses);
        let mut reused = 0usize;
        let result = self.analyze_files(files, host, loader, &mut previous, &mut reused);
        if result.is_err() {
            // Analyses not reached stay valid for the next pass.
            for (file_name, analysis) in previous {
                self.analyses.entry(file_name).or_insert(analysis);
            }
            return result;
        }

        for removed in previous.keys() {
            let evicted = loader.remove_origin(removed);
            debug!(file = %removed, evicted = evicted.len(), "dropped analysis of removed file");
        }
        debug!(
            components = self.analyses.len(),
            reused, "analyzed component files"
        );
        Ok(())
    }

    fn analyze_files(
        &mut self,
        files: &[Arc<SourceFile>],
        host: &dyn ResourceHost,
        loader: &mut ResourceLoader,
        previous: &mut IndexMap<String, FileAnalysis>,
        reused: &mut usize,
    ) -> Result<(), ResourceError> {
        for file in files {
            if file.is_declaration_file || is_shim(&file.file_name) {
                continue;
            }
            if !may_contain_components(&file.text) {
                continue;
            }
            let prior = previous
                .shift_remove(&file.file_name)
                .filter(|prior| prior.version == file.version);

            let loaded = match &prior {
                Some(prior) => {
                    let decls: Vec<&ComponentDecl> =
                        prior.components.iter().map(|component| &component.decl).collect();
                    load_resources(&file.file_name, &decls, host, loader)
                }
                None => {
                    let decls = extract_components(&file.file_name, &file.text);
                    if decls.is_empty() {
                        continue;
                    }
                    let refs: Vec<&ComponentDecl> = decls.iter().collect();
                    let loaded = load_resources(&file.file_name, &refs, host, loader)?;
                    let analysis = self.analyze_file(file, decls, loaded);
                    self.analyses.insert(file.file_name.clone(), analysis);
                    continue;
                }
            };

            let loaded = match loaded {
                Ok(loaded) => loaded,
                Err(e) => {
                    if let Some(prior) = prior {
                        previous.insert(file.file_name.clone(), prior);
                    }
                    return Err(e);
                }
            };
            let Some(prior) = prior else { continue };
            if prior.resource_hashes == loaded.hashes {
                *reused += 1;
                self.analyses.insert(file.file_name.clone(), prior);
            } else {
                let decls = prior.components.into_iter().map(|component| component.decl).collect();
                let analysis = self.analyze_file(file, decls, loaded);
                self.analyses.insert(file.file_name.clone(), analysis);
            }
        }
        Ok(())
    }

    fn analyze_file(
        &self,
        file: &SourceFile,
        decls: Vec<ComponentDecl>,
        loaded: LoadedResources,
    ) -> FileAnalysis {
        let file_name = &file.file_name;
        let mut diagnostics = loaded.diagnostics;
        let mut components = Vec::with_capacity(decls.len());

        for ((decl, template), styles) in decls.into_iter().zip(loaded.templates).zip(loaded.styles) {
            for problem in &decl.problems {
                diagnostics.push(make_diagnostic(
                    problem.code,
                    file_name,
                    problem.span.start,
                    problem.span.len(),
                    problem.message.clone(),
                ));
            }
            if decl.is_missing_template() {
                diagnostics.push(make_diagnostic(
                    ErrorCode::ComponentMissingTemplate,
                    file_name,
                    decl.name_span.start,
                    decl.name_span.len(),
                    "component is missing a template",
                ));
            }

            let template = match (&decl.template, template) {
                (Some(ResourceDecl::Inline { text, span }), _) => Some(AnalyzedTemplate {
                    parsed: parse_template(text),
                    content: text.clone(),
                    file: file_name.clone(),
                    base_offset: span.start + 1,
                    offsets: literal_offsets(&file.text, *span, text).unwrap_or_default(),
                    external: false,
                }),
                (Some(ResourceDecl::External { .. }), Some(loaded)) => Some(AnalyzedTemplate {
                    parsed: parse_template(&loaded.content),
                    content: loaded.content,
                    file: loaded.path,
                    base_offset: 0,
                    offsets: Vec::new(),
                    external: true,
                }),
                _ => None,
            };
            if let Some(template) = &template {
                diagnostics.extend(self.check_template(file_name, &decl, template));
            }
            components.push(AnalyzedComponent {
                decl,
                template,
                styles,
            });
        }

        let targets: Vec<TypeCheckTarget> = components
            .iter()
            .filter_map(|component| {
                let template = component.template.as_ref()?;
                Some(TypeCheckTarget {
                    class_name: component.decl.class_name.clone(),
                    template_hash: version_of(&template.content),
                    bindings: template.parsed.binding_paths(),
                })
            })
            .collect();
        let shim = if targets.is_empty() {
            None
        } else {
            generate_type_check_shim(file_name, &targets)
        };

        FileAnalysis {
            file_name: file_name.clone(),
            version: file.version.clone(),
            components,
            diagnostics,
            resource_files: loaded.files,
            resource_hashes: loaded.hashes,
            shim,
        }
    }

    fn check_template(
        &self,
        component_file: &str,
        decl: &ComponentDecl,
        template: &AnalyzedTemplate,
    ) -> Vec<Diagnostic> {
        let note = match &decl.template {
            Some(ResourceDecl::External { span, .. }) if template.external => {
                Some(vec![make_related_information(
                    component_file,
                    span.start,
                    span.len(),
                    format!("Error occurs in the template of component {}.", decl.class_name),
                )])
            }
            _ => None,
        };

        let mut diagnostics = Vec::new();
        for error in &template.parsed.errors {
            let (start, length) = template.source_span(error.start, error.length);
            let mut diagnostic = make_diagnostic(
                ErrorCode::TemplateParseError,
                &template.file,
                start,
                length,
                error.message.clone(),
            );
            diagnostic.related_information = note.clone();
            diagnostics.push(diagnostic);
        }

        if !self.options.check_templates() {
            return diagnostics;
        }
        let category = if self.options.template_errors_as_warnings == Some(true) {
            DiagnosticCategory::Warning
        } else {
            DiagnosticCategory::Error
        };
        for binding in &template.parsed.bindings {
            if decl.members.contains(&binding.root) {
                continue;
            }
            let (start, length) = template.source_span(binding.start, binding.root.len());
            let mut diagnostic = Diagnostic::error(
                PROPERTY_DOES_NOT_EXIST_CODE,
                format!(
                    "Property '{}' does not exist on type '{}'.",
                    binding.root, decl.class_name
                ),
            )
            .with_file(&template.file)
            .with_span(start, length);
            diagnostic.category = category;
            diagnostic.related_information = note.clone();
            diagnostics.push(diagnostic);
        }
        diagnostics
    }

    pub fn analysis(&self, file: &str) -> Option<&FileAnalysis> {
        self.analyses.get(file)
    }

    /// Metadata, resource and template diagnostics of a component file.
    pub fn template_diagnostics(&self, file: &str) -> &[Diagnostic] {
        self.analyses
            .get(file)
            .map(|analysis| analysis.diagnostics.as_slice())
            .unwrap_or(&[])
    }

    pub fn options_diagnostics(&self) -> Vec<Diagnostic> {
        self.options.options_diagnostics()
    }

    pub fn shims(&self) -> impl Iterator<Item = &ShimFile> {
        self.analyses.values().filter_map(|analysis| analysis.shim.as_ref())
    }

    pub fn resource_hashes(&self, file: &str) -> &[String] {
        self.analyses
            .get(file)
            .map(|analysis| analysis.resource_hashes.as_slice())
            .unwrap_or(&[])
    }

    /// Every resource file referenced by an analyzed component.
    pub fn resource_files(&self) -> BTreeSet<String> {
        self.analyses
            .values()
            .flat_map(|analysis| analysis.resource_files.iter().cloned())
            .collect()
    }

    /// `text` of `file` with the compiled resources of its components
    /// inlined, or `None` when nothing needs rewriting.
    pub fn inline_resources_for_emit(&self, file: &str, text: &str) -> Option<String> {
        let analysis = self.analyses.get(file)?;
        let components: Vec<(&ComponentDecl, InlineResources<'_>)> = analysis
            .components
            .iter()
            .map(|component| {
                let template = component
                    .template
                    .as_ref()
                    .filter(|template| template.external)
                    .map(|template| template.content.as_str());
                (
                    &component.decl,
                    InlineResources {
                        template,
                        styles: &component.styles,
                    },
                )
            })
            .collect();
        inline_resources(text, &components)
    }
}

fn load_resources(
    file_name: &str,
    decls: &[&ComponentDecl],
    host: &dyn ResourceHost,
    loader: &mut ResourceLoader,
) -> Result<LoadedResources, ResourceError> {
    let mut loaded = LoadedResources::default();
    let mut pending = Vec::new();
    let mut requests = Vec::new();

    for (index, decl) in decls.iter().enumerate() {
        loaded.templates.push(None);
        loaded.styles.push(vec![None; decl.styles.len()]);

        if let Some(ResourceDecl::External { url, span }) = &decl.template {
            match host.resource_name_to_file_name(url, file_name) {
                Some(path) => {
                    requests.push(ResourceRequest::file(&path, Some(file_name)));
                    pending.push(PendingResource {
                        component: index,
                        style: None,
                        label: url,
                        span: *span,
                        path: Some(path),
                    });
                }
                None => missing_resource(&mut loaded, file_name, url, *span, ResourceKind::Template),
            }
        }
        for (style_index, style) in decl.styles.iter().enumerate() {
            match style {
                ResourceDecl::External { url, span } => {
                    match host.resource_name_to_file_name(url, file_name) {
                        Some(path) => {
                            requests.push(ResourceRequest::file(&path, Some(file_name)));
                            pending.push(PendingResource {
                                component: index,
                                style: Some(style_index),
                                label: url,
                                span: *span,
                                path: Some(path),
                            });
                        }
                        None => {
                            missing_resource(&mut loaded, file_name, url, *span, ResourceKind::Style)
                        }
                    }
                }
                ResourceDecl::Inline { text, span } => {
                    requests.push(ResourceRequest::inline(text, ".css", ResourceKind::Style, file_name));
                    pending.push(PendingResource {
                        component: index,
                        style: Some(style_index),
                        label: "inline style",
                        span: *span,
                        path: None,
                    });
                }
            }
        }
    }

    let keys: BTreeSet<String> = requests.iter().map(ResourceRequest::key).collect();
    let results = loader.load_all(requests);
    loader.retain_origin(file_name, &keys);
    for (pending, result) in pending.into_iter().zip(results) {
        let compiled = result?;
        if let Some(entry) = loader.entry(&compiled.key) {
            loaded.files.extend(entry.dependency_files.iter().cloned());
        }
        for error in &compiled.errors {
            loaded.diagnostics.push(make_diagnostic(
                ErrorCode::ComponentResourceCompilationFailed,
                file_name,
                pending.span.start,
                pending.span.len(),
                format!("Failed to compile '{}': {}", pending.label, error.text),
            ));
        }
        for warning in &compiled.warnings {
            loaded.diagnostics.push(
                Diagnostic::warning(
                    ng_error_code(ErrorCode::ComponentResourceCompilationFailed),
                    format!("'{}': {}", pending.label, warning.text),
                )
                .with_file(file_name)
                .with_span(pending.span.start, pending.span.len()),
            );
        }

        if compiled.errors.is_empty() {
            loaded.hashes.push(version_of(&compiled.content));
        } else {
            let errors: Vec<&str> = compiled.errors.iter().map(|e| e.text.as_str()).collect();
            loaded.hashes.push(format!("failed:{}", version_of(&errors.join("\n"))));
            continue;
        }
        match (pending.style, pending.path) {
            (Some(style), _) => loaded.styles[pending.component][style] = Some(compiled.content),
            (None, Some(path)) => {
                loaded.templates[pending.component] = Some(LoadedTemplate {
                    path,
                    content: compiled.content,
                })
            }
            (None, None) => {}
        }
    }
    Ok(loaded)
}

fn missing_resource(
    loaded: &mut LoadedResources,
    file_name: &str,
    url: &str,
    span: TextSpan,
    kind: ResourceKind,
) {
    let message = match kind {
        ResourceKind::Template => format!("Could not find template file '{}'.", url),
        ResourceKind::Style => format!("Could not find stylesheet file '{}'.", url),
    };
    loaded.diagnostics.push(make_diagnostic(
        ErrorCode::ComponentResourceNotFound,
        file_name,
        span.start,
        span.len(),
        message,
    ));
    loaded.hashes.push(format!("missing:{}", url));
}

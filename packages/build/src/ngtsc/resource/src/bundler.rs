// Resource Bundler
//
// The isolated sub-build that turns one template or stylesheet into a
// library-form module whose default export is the finished content.

use super::loader::ResourceKind;
use crate::ngtsc::file_system::{extname, FileSystem};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use ts::{dirname, join_paths};

static CSS_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?["']([^"']+)["']\s*\)?[^;]*;"#).unwrap()
});

/// The single synthetic entry point of a sub-build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSource {
    File(String),
    Inline {
        data: String,
        /// Extension hint for the inline content, e.g. `.css` or `.scss`.
        extension: String,
        containing_file: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubBuildRequest {
    pub kind: ResourceKind,
    pub source: ResourceSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubBuildMessage {
    pub text: String,
    pub file: Option<String>,
}

impl SubBuildMessage {
    pub fn new(text: impl Into<String>, file: Option<&str>) -> Self {
        Self {
            text: text.into(),
            file: file.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubBuildOutput {
    /// Library-form module text, `None` when the build failed.
    pub output: Option<String>,
    /// Every real file read while building.
    pub dependencies: Vec<String>,
    pub errors: Vec<SubBuildMessage>,
    pub warnings: Vec<SubBuildMessage>,
}

/// Compiles a single resource. Implementations hold no state across calls,
/// so one instance can serve a whole worker pool.
pub trait ResourceBundler: Send + Sync {
    fn bundle(&self, request: &SubBuildRequest) -> SubBuildOutput;
}

/// Default sub-build: templates are read verbatim, stylesheets get their
/// `@import` rules inlined recursively.
pub struct FileResourceBundler {
    fs: Arc<dyn FileSystem>,
}

impl FileResourceBundler {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    fn read(&self, path: &str, output: &mut SubBuildOutput) -> Option<String> {
        if !output.dependencies.iter().any(|dep| dep == path) {
            output.dependencies.push(path.to_string());
        }
        match self.fs.read_file(path) {
            Ok(text) => Some(text),
            Err(_) => {
                output
                    .errors
                    .push(SubBuildMessage::new(format!("Could not resolve \"{}\"", path), None));
                None
            }
        }
    }

    fn inline_imports(
        &self,
        css: &str,
        base_dir: &str,
        output: &mut SubBuildOutput,
        visiting: &mut HashSet<String>,
    ) -> String {
        let mut result = String::with_capacity(css.len());
        let mut last = 0;
        for captures in CSS_IMPORT.captures_iter(css) {
            let (Some(whole), Some(specifier)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            result.push_str(&css[last..whole.start()]);
            last = whole.end();

            let specifier = specifier.as_str();
            if specifier.contains("://") || specifier.starts_with("//") {
                // Remote stylesheets stay as runtime imports.
                result.push_str(whole.as_str());
                continue;
            }
            let path = join_paths(base_dir, specifier);
            if !visiting.insert(path.clone()) {
                output.warnings.push(SubBuildMessage::new(
                    format!("Circular stylesheet import of \"{}\" ignored", path),
                    None,
                ));
                continue;
            }
            if let Some(text) = self.read(&path, output) {
                let inlined = self.inline_imports(&text, dirname(&path), output, visiting);
                result.push_str(&inlined);
            }
            visiting.remove(&path);
        }
        result.push_str(&css[last..]);
        result
    }
}

impl ResourceBundler for FileResourceBundler {
    fn bundle(&self, request: &SubBuildRequest) -> SubBuildOutput {
        let mut output = SubBuildOutput::default();
        let (text, base_dir, extension, entry) = match &request.source {
            ResourceSource::File(path) => {
                let Some(text) = self.read(path, &mut output) else {
                    return output;
                };
                (text, dirname(path).to_string(), extname(path).to_string(), Some(path))
            }
            ResourceSource::Inline {
                data,
                extension,
                containing_file,
            } => (
                data.clone(),
                dirname(containing_file).to_string(),
                extension.clone(),
                None,
            ),
        };

        let content = match request.kind {
            ResourceKind::Template => text,
            ResourceKind::Style => {
                if !matches!(extension.as_str(), ".css" | "") {
                    output.warnings.push(SubBuildMessage::new(
                        format!(
                            "Stylesheet language '{}' is passed through without preprocessing",
                            extension.trim_start_matches('.')
                        ),
                        entry.map(String::as_str),
                    ));
                }
                let mut visiting: HashSet<String> = entry.cloned().into_iter().collect();
                self.inline_imports(&text, &base_dir, &mut output, &mut visiting)
            }
        };

        if output.errors.is_empty() {
            match serde_json::to_string(&content) {
                Ok(literal) => output.output = Some(format!("export default {};\n", literal)),
                Err(e) => output
                    .errors
                    .push(SubBuildMessage::new(e.to_string(), entry.map(String::as_str))),
            }
        }
        output
    }
}

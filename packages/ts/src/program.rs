use crate::SourceFile;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Compiler options understood by the host language layer.
///
/// Mirrors the `compilerOptions` block of a tsconfig. Unknown keys are ignored
/// when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerOptions {
    pub allow_js: Option<bool>,
    pub base_url: Option<String>,
    pub declaration: Option<bool>,
    pub experimental_decorators: Option<bool>,
    pub incremental: Option<bool>,
    pub inline_source_map: Option<bool>,
    pub inline_sources: Option<bool>,
    pub isolated_modules: Option<bool>,
    pub lib: Option<Vec<String>>,
    pub module: Option<String>,
    pub module_resolution: Option<String>,
    pub no_emit: Option<bool>,
    pub no_emit_on_error: Option<bool>,
    pub out_dir: Option<String>,
    pub preserve_symlinks: Option<bool>,
    pub root_dir: Option<String>,
    pub skip_lib_check: Option<bool>,
    pub source_map: Option<bool>,
    pub strict: Option<bool>,
    pub target: Option<String>,
    pub ts_build_info_file: Option<String>,
    pub use_define_for_class_fields: Option<bool>,
}

impl CompilerOptions {
    /// Applies every option set in `overrides` on top of `self`.
    pub fn merge(&mut self, overrides: &CompilerOptions) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if overrides.$field.is_some() {
                    self.$field = overrides.$field.clone();
                })*
            };
        }
        take!(
            allow_js,
            base_url,
            declaration,
            experimental_decorators,
            incremental,
            inline_source_map,
            inline_sources,
            isolated_modules,
            lib,
            module,
            module_resolution,
            no_emit,
            no_emit_on_error,
            out_dir,
            preserve_symlinks,
            root_dir,
            skip_lib_check,
            source_map,
            strict,
            target,
            ts_build_info_file,
            use_define_for_class_fields,
        );
    }
}

/// File extensions probed, in order, when resolving a relative module specifier.
pub const RESOLVABLE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".d.ts", ".mts", ".js", ".mjs"];

pub trait CompilerHost: Send + Sync {
    fn file_exists(&self, file_name: &str) -> bool;
    fn read_file(&self, file_name: &str) -> Option<String>;
    fn get_current_directory(&self) -> String;

    fn get_canonical_file_name(&self, file_name: &str) -> String {
        normalize_path(file_name)
    }

    /// Reads and parses a source file. Hosts that keep parsed files across
    /// passes override this to skip re-parsing unchanged text.
    fn get_source_file(&self, file_name: &str) -> Option<Arc<SourceFile>> {
        let text = self.read_file(file_name)?;
        Some(Arc::new(SourceFile::parse(file_name, text)))
    }

    /// Resolves a relative module specifier against the containing file.
    /// Bare specifiers (packages) are treated as external and never resolved.
    fn resolve_module_name(&self, module_name: &str, containing_file: &str) -> Option<String> {
        if !module_name.starts_with('.') {
            return None;
        }
        let base = join_paths(dirname(containing_file), module_name);
        if self.file_exists(&base) && RESOLVABLE_EXTENSIONS.iter().any(|e| base.ends_with(e)) {
            return Some(base);
        }
        RESOLVABLE_EXTENSIONS
            .iter()
            .map(|ext| format!("{}{}", base, ext))
            .chain(
                RESOLVABLE_EXTENSIONS
                    .iter()
                    .map(|ext| format!("{}/index{}", base, ext)),
            )
            .find(|candidate| self.file_exists(candidate))
    }
}

/// Normalizes separators to `/` and removes `.` and `..` segments.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(pos) => &path[..pos],
        None => ".",
    }
}

pub fn join_paths(base: &str, relative: &str) -> String {
    if relative.starts_with('/') {
        normalize_path(relative)
    } else {
        normalize_path(&format!("{}/{}", base, relative))
    }
}

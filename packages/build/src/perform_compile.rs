//! Perform Compile
//!
//! Configuration loading and diagnostic reporting. `read_configuration`
//! resolves a tsconfig (following `extends`) into root files and normalized
//! options. Malformed configuration is reported as diagnostics, never as a
//! failure.

use crate::ngtsc::core::NgCompilerOptions;
use crate::ngtsc::diagnostics::{DiagnosticRecord, Severity};
use crate::ngtsc::file_system::{extname, FileSystem};
use glob::{MatchOptions, Pattern};
use indexmap::IndexSet;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use ts::{dirname, join_paths, CompilerOptions, Diagnostic, FILE_NOT_FOUND_CODE};

pub const CANNOT_READ_FILE_CODE: i32 = 5083;
pub const FAILED_TO_PARSE_CODE: i32 = 5014;
pub const OPTION_TYPE_MISMATCH_CODE: i32 = 5024;
pub const CIRCULAR_EXTENDS_CODE: i32 = 18000;
pub const NO_INPUTS_CODE: i32 = 18003;

/// Extensions of the files picked up by `include` patterns.
const SOURCE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mts", ".cts"];

/// Options holding paths, resolved against the config file that sets them.
const PATH_OPTIONS: &[&str] = &["baseUrl", "outDir", "rootDir", "tsBuildInfoFile"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedConfiguration {
    /// The tsconfig file that was read.
    pub project: String,
    /// Directory of `project`.
    pub base_path: String,
    pub root_names: Vec<String>,
    pub options: CompilerOptions,
    pub ng_options: NgCompilerOptions,
    pub errors: Vec<Diagnostic>,
    /// `project` and every config file it extends.
    pub config_files: Vec<String>,
}

impl ParsedConfiguration {
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(Diagnostic::is_error)
    }
}

/// A list-valued setting together with the directory its entries are relative to.
#[derive(Debug, Clone)]
struct PathList {
    base: String,
    entries: Vec<String>,
}

#[derive(Debug, Default)]
struct RawConfig {
    compiler_options: Map<String, Value>,
    angular_compiler_options: Map<String, Value>,
    files: Option<PathList>,
    include: Option<PathList>,
    exclude: Option<PathList>,
}

impl RawConfig {
    /// Applies `child` over `self`: option keys are merged, file lists replaced.
    fn extend_with(&mut self, child: RawConfig) {
        self.compiler_options.extend(child.compiler_options);
        self.angular_compiler_options
            .extend(child.angular_compiler_options);
        for (slot, value) in [
            (&mut self.files, child.files),
            (&mut self.include, child.include),
            (&mut self.exclude, child.exclude),
        ] {
            if value.is_some() {
                *slot = value;
            }
        }
    }
}

/// Reads the project configuration at `project` (a tsconfig file or a
/// directory containing `tsconfig.json`). `existing_options` override the
/// file's `compilerOptions`.
pub fn read_configuration(
    fs: &dyn FileSystem,
    project: &str,
    existing_options: Option<&CompilerOptions>,
) -> ParsedConfiguration {
    let project = {
        let path = join_paths(&fs.pwd(), project);
        if fs.is_file(&path) {
            path
        } else {
            join_paths(&path, "tsconfig.json")
        }
    };
    let base_path = dirname(&project).to_string();
    let mut parsed = ParsedConfiguration {
        project: project.clone(),
        base_path: base_path.clone(),
        ..Default::default()
    };

    let mut chain = Vec::new();
    let raw = load_config_file(fs, &project, &mut chain, &mut parsed.errors);
    parsed.config_files = chain;
    let Some(raw) = raw else {
        // Keep the broken file watched so a fix triggers the next pass.
        if !parsed.config_files.contains(&project) {
            parsed.config_files.insert(0, project);
        }
        return parsed;
    };

    parsed.options = deserialize_options(raw.compiler_options, &project, &mut parsed.errors);
    parsed.ng_options =
        deserialize_options(raw.angular_compiler_options, &project, &mut parsed.errors);
    if let Some(overrides) = existing_options {
        parsed.options.merge(overrides);
    }

    let sources = RootSources {
        base_path: &parsed.base_path,
        out_dir: parsed.options.out_dir.as_deref(),
        files: &raw.files,
        include: &raw.include,
        exclude: &raw.exclude,
    };
    let (root_names, missing) = collect_root_names(fs, &sources);
    parsed.root_names = root_names;
    parsed.errors.extend(missing);
    if parsed.root_names.is_empty() && !parsed.has_errors() {
        let list = |paths: &Option<PathList>| {
            paths
                .as_ref()
                .map(|paths| format!("{:?}", paths.entries))
                .unwrap_or_else(|| "[]".to_string())
        };
        parsed.errors.push(Diagnostic::error(
            NO_INPUTS_CODE,
            format!(
                "No inputs were found in config file '{}'. Specified 'include' paths were '{}' and 'exclude' paths were '{}'.",
                project,
                list(&raw.include),
                list(&raw.exclude)
            ),
        ));
    }
    debug!(
        project = %parsed.project,
        roots = parsed.root_names.len(),
        errors = parsed.errors.len(),
        "read configuration"
    );
    parsed
}

/// Loads `path` and the configs it extends. `chain` holds the files being
/// loaded, outermost first.
fn load_config_file(
    fs: &dyn FileSystem,
    path: &str,
    chain: &mut Vec<String>,
    errors: &mut Vec<Diagnostic>,
) -> Option<RawConfig> {
    if chain.iter().any(|seen| seen == path) {
        let mut cycle = chain.clone();
        cycle.push(path.to_string());
        errors.push(Diagnostic::error(
            CIRCULAR_EXTENDS_CODE,
            format!(
                "Circularity detected while resolving configuration: {}",
                cycle.join(" -> ")
            ),
        ));
        return None;
    }

    let text = match fs.read_file(path) {
        Ok(text) => text,
        Err(_) => {
            errors.push(Diagnostic::error(
                CANNOT_READ_FILE_CODE,
                format!("Cannot read file '{}'.", path),
            ));
            return None;
        }
    };
    let json: Value = match serde_json::from_str(&strip_json_comments(&text)) {
        Ok(Value::Object(json)) => Value::Object(json),
        Ok(_) => {
            errors.push(parse_error(path, "expected an object"));
            return None;
        }
        Err(e) => {
            errors.push(parse_error(path, &e.to_string()));
            return None;
        }
    };
    chain.push(path.to_string());

    let dir = dirname(path).to_string();
    let mut config = RawConfig::default();
    if let Some(extends) = json.get("extends").and_then(Value::as_str) {
        let parent = resolve_extends(fs, &dir, extends);
        if let Some(base) = load_config_file(fs, &parent, chain, errors) {
            config = base;
        }
    }

    let mut own = RawConfig {
        compiler_options: object_at(&json, "compilerOptions"),
        angular_compiler_options: object_at(&json, "angularCompilerOptions"),
        files: path_list(&json, "files", &dir),
        include: path_list(&json, "include", &dir),
        exclude: path_list(&json, "exclude", &dir),
    };
    for key in PATH_OPTIONS {
        if let Some(Value::String(value)) = own.compiler_options.get_mut(*key) {
            *value = join_paths(&dir, value);
        }
    }
    config.extend_with(own);
    Some(config)
}

fn resolve_extends(fs: &dyn FileSystem, dir: &str, extends: &str) -> String {
    let candidate = if extends.starts_with('.') || extends.starts_with('/') {
        join_paths(dir, extends)
    } else {
        join_paths(dir, &format!("node_modules/{}", extends))
    };
    if fs.is_file(&candidate) {
        candidate
    } else if extname(&candidate) != ".json" && fs.is_file(&format!("{}.json", candidate)) {
        format!("{}.json", candidate)
    } else if fs.is_file(&join_paths(&candidate, "tsconfig.json")) {
        join_paths(&candidate, "tsconfig.json")
    } else {
        candidate
    }
}

fn parse_error(path: &str, reason: &str) -> Diagnostic {
    Diagnostic::error(
        FAILED_TO_PARSE_CODE,
        format!("Failed to parse file '{}': {}.", path, reason),
    )
}

fn object_at(json: &Value, key: &str) -> Map<String, Value> {
    json.get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn path_list(json: &Value, key: &str, base: &str) -> Option<PathList> {
    let entries = json.get(key)?.as_array()?;
    Some(PathList {
        base: base.to_string(),
        entries: entries
            .iter()
            .filter_map(|entry| entry.as_str().map(str::to_string))
            .collect(),
    })
}

/// Deserializes an options object. Entries of the wrong type are reported
/// and dropped; unknown entries are ignored.
fn deserialize_options<T>(options: Map<String, Value>, project: &str, errors: &mut Vec<Diagnostic>) -> T
where
    T: DeserializeOwned + Default,
{
    let accepts = |key: &str, value: Value| {
        let mut probe = Map::new();
        probe.insert(key.to_string(), value);
        serde_json::from_value::<T>(Value::Object(probe)).is_ok()
    };

    let mut valid = Map::new();
    for (key, value) in options {
        if accepts(&key, value.clone()) {
            valid.insert(key, value);
            continue;
        }
        let expected = if accepts(&key, Value::Bool(true)) {
            "boolean"
        } else if accepts(&key, Value::String(String::new())) {
            "string"
        } else {
            "list"
        };
        errors.push(
            Diagnostic::error(
                OPTION_TYPE_MISMATCH_CODE,
                format!("Compiler option '{}' requires a value of type {}.", key, expected),
            )
            .with_file(project),
        );
    }
    serde_json::from_value(Value::Object(valid)).unwrap_or_else(|e| {
        warn!(error = %e, "ignoring options that failed to deserialize");
        T::default()
    })
}

struct RootSources<'a> {
    base_path: &'a str,
    out_dir: Option<&'a str>,
    files: &'a Option<PathList>,
    include: &'a Option<PathList>,
    exclude: &'a Option<PathList>,
}

/// Root files in `files` order followed by `include` matches, and a
/// diagnostic for every listed file that does not exist.
fn collect_root_names(fs: &dyn FileSystem, sources: &RootSources<'_>) -> (Vec<String>, Vec<Diagnostic>) {
    let mut roots = IndexSet::new();
    let mut missing = Vec::new();
    if let Some(files) = sources.files {
        for file in &files.entries {
            let path = join_paths(&files.base, file);
            if fs.is_file(&path) {
                roots.insert(path);
            } else {
                missing.push(Diagnostic::error(
                    FILE_NOT_FOUND_CODE,
                    format!("File '{}' not found.", path),
                ));
            }
        }
    }

    let default_include;
    let include = match sources.include {
        Some(include) => include,
        None if sources.files.is_some() => return (roots.into_iter().collect(), missing),
        None => {
            default_include = PathList {
                base: sources.base_path.to_string(),
                entries: vec!["**/*".to_string()],
            };
            &default_include
        }
    };

    let mut excluded: Vec<Pattern> = match sources.exclude {
        Some(exclude) => exclude
            .entries
            .iter()
            .filter_map(|entry| directory_pattern(&exclude.base, entry))
            .collect(),
        None => ["node_modules", "bower_components", "jspm_packages"]
            .iter()
            .filter_map(|entry| directory_pattern(sources.base_path, entry))
            .collect(),
    };
    if sources.exclude.is_none() {
        if let Some(out_dir) = sources.out_dir {
            excluded.extend(directory_pattern(out_dir, "."));
        }
    }

    let options = MatchOptions {
        require_literal_separator: true,
        ..MatchOptions::new()
    };
    for entry in &include.entries {
        let Some(pattern) = directory_pattern(&include.base, entry) else {
            continue;
        };
        for file in fs.list_files(&include.base) {
            if !SOURCE_EXTENSIONS.iter().any(|ext| file.ends_with(ext)) {
                continue;
            }
            if pattern.matches_with(&file, options)
                && !excluded.iter().any(|p| p.matches_with(&file, options))
            {
                roots.insert(file);
            }
        }
    }
    (roots.into_iter().collect(), missing)
}

/// Glob pattern for an include/exclude entry. Entries naming a directory
/// match everything below it.
fn directory_pattern(base: &str, entry: &str) -> Option<Pattern> {
    let path = join_paths(base, entry);
    let last = path.rsplit('/').next().unwrap_or("");
    let pattern = if last.contains('*') || last.contains('.') {
        path
    } else {
        format!("{}/**/*", path.trim_end_matches('/'))
    };
    match Pattern::new(&pattern) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            warn!(pattern = %entry, error = %e, "invalid glob pattern");
            None
        }
    }
}

/// Removes `//` and `/* */` comments and trailing commas, leaving string
/// literals untouched.
pub fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            match ch {
                '\\' => out.extend(chars.next()),
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match (ch, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(ch);
            }
            ('/', Some('/')) => {
                while chars.next_if(|&next| next != '\n').is_some() {}
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            _ => out.push(ch),
        }
    }
    remove_trailing_commas(&out)
}

fn remove_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    for (index, ch) in input.char_indices() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let rest = input[index + 1..].trim_start();
            if rest.starts_with('}') || rest.starts_with(']') {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Renders diagnostics the way a terminal reporter prints them: the
/// headline, the offending source line with a marker, then related notes.
pub fn format_diagnostics(diagnostics: &[DiagnosticRecord]) -> String {
    let mut output = String::new();
    for diagnostic in diagnostics {
        output.push_str(&diagnostic.to_string());
        output.push('\n');
        if let Some(location) = &diagnostic.location {
            push_source_excerpt(&mut output, location.line, location.column, location.length, &location.line_text);
        }
        for note in &diagnostic.related_notes {
            match (&note.file, &note.location) {
                (Some(file), Some(location)) => {
                    output.push_str(&format!(
                        "  {}:{}:{}\n    {}\n",
                        file,
                        location.line + 1,
                        location.column + 1,
                        note.message
                    ));
                    push_source_excerpt(&mut output, location.line, location.column, location.length, &location.line_text);
                }
                _ => output.push_str(&format!("    {}\n", note.message)),
            }
        }
        output.push('\n');
    }
    output
}

fn push_source_excerpt(output: &mut String, line: usize, column: usize, length: usize, text: &str) {
    let gutter = (line + 1).to_string();
    output.push_str(&format!("{} {}\n", gutter, text));
    output.push_str(&format!(
        "{} {}{}\n",
        " ".repeat(gutter.len()),
        " ".repeat(column),
        "~".repeat(length.max(1))
    ));
}

/// Process exit code for a set of diagnostics: 1 when any is an error.
pub fn exit_code_from_result(diagnostics: &[DiagnosticRecord]) -> i32 {
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ngtsc::file_system::testing::MockFileSystem;

    fn fs_with(files: Vec<(&str, &str)>) -> MockFileSystem {
        let fs = MockFileSystem::new().with_cwd("/project");
        fs.init_with_files(files);
        fs
    }

    #[test]
    fn reads_directory_projects_with_comments() {
        let fs = fs_with(vec![
            (
                "/project/tsconfig.json",
                r#"{
                    // line comment
                    "compilerOptions": { "strict": true, /* block */ "outDir": "./dist", },
                    "angularCompilerOptions": { "strictTemplates": true },
                    "include": ["src"],
                }"#,
            ),
            ("/project/src/main.ts", ""),
            ("/project/src/app/app.component.ts", ""),
            ("/project/src/app/app.component.html", ""),
            ("/project/test/spec.ts", ""),
        ]);
        let parsed = read_configuration(&fs, ".", None);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.project, "/project/tsconfig.json");
        assert_eq!(
            parsed.root_names,
            vec!["/project/src/app/app.component.ts", "/project/src/main.ts"]
        );
        assert_eq!(parsed.options.strict, Some(true));
        assert_eq!(parsed.options.out_dir.as_deref(), Some("/project/dist"));
        assert_eq!(parsed.ng_options.strict_templates, Some(true));
    }

    #[test]
    fn keeps_comment_markers_inside_strings() {
        let stripped = strip_json_comments(r#"{ "a": "http://x/*y*/", }"#);
        assert_eq!(stripped, r#"{ "a": "http://x/*y*/" }"#);
    }

    #[test]
    fn follows_extends_with_child_overrides() {
        let fs = fs_with(vec![
            (
                "/project/tsconfig.base.json",
                r#"{ "compilerOptions": { "strict": true, "target": "es2020", "outDir": "out" }, "files": ["src/main.ts"] }"#,
            ),
            (
                "/project/app/tsconfig.json",
                r#"{ "extends": "../tsconfig.base.json", "compilerOptions": { "target": "es2022" } }"#,
            ),
            ("/project/src/main.ts", ""),
        ]);
        let parsed = read_configuration(&fs, "app/tsconfig.json", None);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.options.strict, Some(true));
        assert_eq!(parsed.options.target.as_deref(), Some("es2022"));
        assert_eq!(parsed.options.out_dir.as_deref(), Some("/project/out"));
        assert_eq!(parsed.root_names, vec!["/project/src/main.ts"]);
        assert_eq!(parsed.config_files.len(), 2);
    }

    #[test]
    fn reports_circular_extends() {
        let fs = fs_with(vec![
            ("/project/a.json", r#"{ "extends": "./b.json" }"#),
            ("/project/b.json", r#"{ "extends": "./a.json" }"#),
        ]);
        let parsed = read_configuration(&fs, "a.json", None);
        assert!(parsed.errors.iter().any(|e| e.code == CIRCULAR_EXTENDS_CODE));
    }

    #[test]
    fn reports_wrong_option_types_and_keeps_the_rest() {
        let fs = fs_with(vec![
            (
                "/project/tsconfig.json",
                r#"{ "compilerOptions": { "strict": "yes", "target": "es2022" }, "files": ["main.ts"] }"#,
            ),
            ("/project/main.ts", ""),
        ]);
        let parsed = read_configuration(&fs, ".", None);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].code, OPTION_TYPE_MISMATCH_CODE);
        assert_eq!(
            parsed.errors[0].message_text.to_string(),
            "Compiler option 'strict' requires a value of type boolean."
        );
        assert_eq!(parsed.options.target.as_deref(), Some("es2022"));
    }

    #[test]
    fn reports_unreadable_and_invalid_configs() {
        let fs = fs_with(vec![("/project/bad/tsconfig.json", "{ not json")]);
        let missing = read_configuration(&fs, "missing.json", None);
        assert_eq!(missing.errors[0].code, CANNOT_READ_FILE_CODE);

        let invalid = read_configuration(&fs, "bad", None);
        assert_eq!(invalid.errors[0].code, FAILED_TO_PARSE_CODE);
    }

    #[test]
    fn reports_empty_inputs() {
        let fs = fs_with(vec![("/project/tsconfig.json", r#"{ "include": ["src"] }"#)]);
        let parsed = read_configuration(&fs, ".", None);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].code, NO_INPUTS_CODE);
    }

    #[test]
    fn applies_existing_options_last() {
        let fs = fs_with(vec![
            ("/project/tsconfig.json", r#"{ "compilerOptions": { "sourceMap": true } }"#),
            ("/project/main.ts", ""),
        ]);
        let overrides = CompilerOptions {
            source_map: Some(false),
            ..Default::default()
        };
        let parsed = read_configuration(&fs, ".", Some(&overrides));
        assert_eq!(parsed.options.source_map, Some(false));
        assert_eq!(parsed.root_names, vec!["/project/main.ts"]);
    }

    #[test]
    fn formats_diagnostics_with_source_excerpt() {
        let diagnostic = Diagnostic::error(2307, "Cannot find module './x'.")
            .with_file("/src/a.ts")
            .with_span(15, 5);
        let record = DiagnosticRecord::from_diagnostic(
            &diagnostic,
            crate::ngtsc::diagnostics::DiagnosticPhase::Semantic,
            |_| Some(std::sync::Arc::from("import { a } from './x';")),
        );
        let text = format_diagnostics(std::slice::from_ref(&record));
        assert!(text.starts_with("/src/a.ts:1:16 - error TS2307: Cannot find module './x'.\n"));
        assert!(text.contains("1 import { a } from './x';\n"));
        assert!(text.contains("~~~~~"));
        assert_eq!(exit_code_from_result(&[record]), 1);
        assert_eq!(exit_code_from_result(&[]), 0);
    }
}

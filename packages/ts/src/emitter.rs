// Emitter
//
// Strips types from a source file and prints JavaScript:
// parse -> semantic -> transform -> codegen.

use crate::source_file::SYNTAX_ERROR_CODE;
use crate::{CompilerOptions, Diagnostic, SourceFile};
use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};
use std::path::Path;

/// A JavaScript file produced from exactly one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    pub file_name: String,
    pub text: String,
    /// Source files the output was produced from.
    pub source_files: Vec<String>,
}

/// Maps a source file name to the name of its JavaScript output.
pub fn output_file_name(file_name: &str) -> String {
    for (from, to) in [(".mts", ".mjs"), (".cts", ".cjs"), (".tsx", ".js"), (".ts", ".js")] {
        if let Some(stem) = file_name.strip_suffix(from) {
            return format!("{}{}", stem, to);
        }
    }
    file_name.to_string()
}

/// Emits `source_file`. When `text` is given it replaces the file's own text,
/// which lets callers run a text transform before emit.
pub fn emit_source_file(
    source_file: &SourceFile,
    text: Option<&str>,
    options: &CompilerOptions,
) -> Result<EmittedFile, Vec<Diagnostic>> {
    let text = text.unwrap_or(&*source_file.text);
    let code = transpile(&source_file.file_name, text, options)?;
    Ok(EmittedFile {
        file_name: output_file_name(&source_file.file_name),
        text: code,
        source_files: vec![source_file.file_name.clone()],
    })
}

pub fn transpile(
    file_name: &str,
    text: &str,
    options: &CompilerOptions,
) -> Result<String, Vec<Diagnostic>> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(Path::new(file_name)).unwrap_or_default();
    let mut ret = Parser::new(&allocator, text, source_type).parse();
    if !ret.errors.is_empty() {
        return Err(ret
            .errors
            .iter()
            .map(|error| {
                Diagnostic::error(SYNTAX_ERROR_CODE, error.message.to_string()).with_file(file_name)
            })
            .collect());
    }

    let semantic = SemanticBuilder::new()
        .with_excess_capacity(0.0)
        .build(&ret.program);

    let mut transform_options = TransformOptions::default();
    if options.experimental_decorators == Some(true) {
        transform_options.decorator.legacy = true;
    }
    let transformer = Transformer::new(&allocator, Path::new(file_name), &transform_options);
    let transformed = transformer.build_with_scoping(semantic.semantic.into_scoping(), &mut ret.program);
    if !transformed.errors.is_empty() {
        return Err(transformed
            .errors
            .iter()
            .map(|error| {
                Diagnostic::error(SYNTAX_ERROR_CODE, error.message.to_string()).with_file(file_name)
            })
            .collect());
    }

    Ok(Codegen::new().build(&ret.program).code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_output_names() {
        assert_eq!(output_file_name("/src/app.ts"), "/src/app.js");
        assert_eq!(output_file_name("/src/worker.mts"), "/src/worker.mjs");
        assert_eq!(output_file_name("/src/view.tsx"), "/src/view.js");
    }

    #[test]
    fn strips_type_annotations() {
        let file = SourceFile::parse("/src/a.ts", "export const count: number = 1;\n");
        let emitted = emit_source_file(&file, None, &CompilerOptions::default()).unwrap();
        assert_eq!(emitted.file_name, "/src/a.js");
        assert_eq!(emitted.source_files, vec!["/src/a.ts".to_string()]);
        assert!(emitted.text.contains("count"));
        assert!(!emitted.text.contains(": number"));
    }

    #[test]
    fn uses_replacement_text() {
        let file = SourceFile::parse("/src/a.ts", "export const a = 1;\n");
        let emitted = emit_source_file(
            &file,
            Some("export const b = 2;\n"),
            &CompilerOptions::default(),
        )
        .unwrap();
        assert!(emitted.text.contains("b = 2"));
    }

    #[test]
    fn reports_parse_errors() {
        let file = SourceFile::parse("/src/bad.ts", "const = ;");
        let errors = emit_source_file(&file, None, &CompilerOptions::default()).unwrap_err();
        assert!(!errors.is_empty());
    }
}

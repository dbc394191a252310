// Source File
//
// A parsed, versioned source file of the program.

use crate::{version_of, Diagnostic};
use oxc_allocator::Allocator;
use oxc_ast::ast::Statement;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::{GetSpan, SourceType};
use std::path::Path;
use std::sync::Arc;

/// Generic code used for parser errors that carry no code of their own.
pub const SYNTAX_ERROR_CODE: i32 = 1005;
/// Generic code used for binder/checker errors reported by the semantic pass.
pub const SEMANTIC_ERROR_CODE: i32 = 2300;

/// A module specifier found in an import or re-export statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpecifier {
    pub text: String,
    pub start: usize,
    pub length: usize,
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub file_name: String,
    pub text: Arc<str>,
    /// Content-derived version token; changes if and only if `text` changes.
    pub version: String,
    pub is_declaration_file: bool,
    pub module_specifiers: Vec<ModuleSpecifier>,
    /// Hash of the externally visible shape (export statements) of the file.
    pub export_signature: String,
    pub parse_diagnostics: Vec<Diagnostic>,
    /// Semantic errors that depend only on this file's own text.
    pub local_semantic_diagnostics: Vec<Diagnostic>,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn parse(file_name: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        let file_name = file_name.into();
        let text: Arc<str> = text.into();
        let version = version_of(&text);
        let is_declaration_file = file_name.ends_with(".d.ts");

        let (parse_diagnostics, module_specifiers, export_signature, local_semantic_diagnostics) =
            analyze(&file_name, &text);
        let line_starts = compute_line_starts(&text);

        SourceFile {
            file_name,
            text,
            version,
            is_declaration_file,
            module_specifiers,
            export_signature,
            parse_diagnostics,
            local_semantic_diagnostics,
            line_starts,
        }
    }

    /// Zero-based line and character of a byte offset.
    pub fn line_and_character_of_position(&self, position: usize) -> (usize, usize) {
        let position = position.min(self.text.len());
        let line = match self.line_starts.binary_search(&position) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        };
        let line_start = self.line_starts[line];
        let character = self.text[line_start..position].chars().count();
        (line, character)
    }

    /// Text of a zero-based line without its terminator.
    pub fn line_text(&self, line: usize) -> &str {
        let Some(&start) = self.line_starts.get(line) else {
            return "";
        };
        let end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.text.len());
        self.text[start..end].trim_end_matches(['\n', '\r'])
    }
}

/// Parses `text` once and extracts everything the builder needs from the AST.
fn analyze(
    file_name: &str,
    text: &str,
) -> (Vec<Diagnostic>, Vec<ModuleSpecifier>, String, Vec<Diagnostic>) {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(Path::new(file_name)).unwrap_or_default();
    let ret = Parser::new(&allocator, text, source_type).parse();

    let mut parse_diagnostics = Vec::new();
    for error in ret.errors.iter() {
        let mut diagnostic =
            Diagnostic::error(SYNTAX_ERROR_CODE, error.message.to_string()).with_file(file_name);
        if let Some(label) = error.labels.as_ref().and_then(|labels| labels.first()) {
            diagnostic = diagnostic.with_span(label.offset(), label.len());
        }
        parse_diagnostics.push(diagnostic);
    }

    let mut module_specifiers = Vec::new();
    let mut exported_shapes = Vec::new();
    for statement in &ret.program.body {
        let source = match statement {
            Statement::ImportDeclaration(decl) => Some(&decl.source),
            Statement::ExportNamedDeclaration(decl) => decl.source.as_ref(),
            Statement::ExportAllDeclaration(decl) => Some(&decl.source),
            _ => None,
        };
        if let Some(source) = source {
            module_specifiers.push(ModuleSpecifier {
                text: source.value.to_string(),
                start: source.span.start as usize,
                length: source.span.size() as usize,
            });
        }
        if matches!(
            statement,
            Statement::ExportNamedDeclaration(_)
                | Statement::ExportDefaultDeclaration(_)
                | Statement::ExportAllDeclaration(_)
        ) {
            let span = statement.span();
            exported_shapes.push(&text[span.start as usize..span.end as usize]);
        }
    }

    let mut local_semantic_diagnostics = Vec::new();
    if parse_diagnostics.is_empty() {
        let semantic = SemanticBuilder::new()
            .with_check_syntax_error(true)
            .build(&ret.program);
        for error in semantic.errors.iter() {
            let mut diagnostic = Diagnostic::error(SEMANTIC_ERROR_CODE, error.message.to_string())
                .with_file(file_name);
            if let Some(label) = error.labels.as_ref().and_then(|labels| labels.first()) {
                diagnostic = diagnostic.with_span(label.offset(), label.len());
            }
            local_semantic_diagnostics.push(diagnostic);
        }
    }

    let export_signature = version_of(&exported_shapes.join("\n"));
    (
        parse_diagnostics,
        module_specifiers,
        export_signature,
        local_semantic_diagnostics,
    )
}

pub fn compute_line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    starts.extend(
        text.char_indices()
            .filter(|(_, c)| *c == '\n')
            .map(|(i, _)| i + 1),
    );
    starts
}

use super::*;
use std::sync::Arc;

fn lookup(file: &str) -> Option<Arc<str>> {
    match file {
        "/src/app.ts" => Some(Arc::from("const a = 1;\nconst b = missing;\n")),
        "/src/app.html" => Some(Arc::from("<h1>{{ title }}</h1>\n<p>{{ nope }}</p>\n")),
        _ => None,
    }
}

#[test]
fn test_error_code_mapping() {
    assert_eq!(ng_error_code(ErrorCode::DecoratorArgNotLiteral), -991001);
    assert_eq!(ng_error_code(ErrorCode::ComponentMissingTemplate), -992001);
    assert_eq!(ng_error_code(ErrorCode::ComponentResourceNotFound), -992008);
}

#[test]
fn test_format_error_code_prefixes() {
    assert_eq!(format_error_code(ng_error_code(ErrorCode::TemplateParseError)), "NG5002");
    assert_eq!(format_error_code(2307), "TS2307");
    assert!(is_ng_error_code(-992008));
    assert!(!is_ng_error_code(2339));
}

#[test]
fn test_record_resolves_line_and_column() {
    let diagnostic = Diagnostic::error(2304, "Cannot find name 'missing'.")
        .with_file("/src/app.ts")
        .with_span(23, 7);
    let record = DiagnosticRecord::from_diagnostic(&diagnostic, DiagnosticPhase::Semantic, lookup);

    let location = record.location.clone().unwrap();
    assert_eq!((location.line, location.column), (1, 10));
    assert_eq!(location.line_text, "const b = missing;");
    assert_eq!(record.code_text(), "TS2304");
    assert_eq!(
        record.to_string(),
        "/src/app.ts:2:11 - error TS2304: Cannot find name 'missing'."
    );
}

#[test]
fn test_record_start_inside_a_character_snaps_back() {
    let lookup = |_: &str| Some(Arc::<str>::from("const s = 'é';\n"));
    let diagnostic = Diagnostic::error(1002, "Unterminated string literal.")
        .with_file("/src/accent.ts")
        .with_span(12, 1);
    let record = DiagnosticRecord::from_diagnostic(&diagnostic, DiagnosticPhase::Syntactic, lookup);

    let location = record.location.unwrap();
    assert_eq!(location.start, 11);
    assert_eq!((location.line, location.column), (0, 11));
}

#[test]
fn test_related_information_becomes_notes() {
    let mut diagnostic = make_diagnostic(
        ErrorCode::TemplateParseError,
        "/src/app.ts",
        0,
        5,
        "Unterminated interpolation.",
    );
    diagnostic.related_information = Some(vec![make_related_information(
        "/src/app.html",
        25,
        8,
        "Error occurs in the template.",
    )]);
    let record = DiagnosticRecord::from_diagnostic(&diagnostic, DiagnosticPhase::Template, lookup);

    assert_eq!(record.related_notes.len(), 1);
    let note = &record.related_notes[0];
    assert_eq!(note.file.as_deref(), Some("/src/app.html"));
    let location = note.location.clone().unwrap();
    assert_eq!(location.line, 1);
    assert_eq!(location.line_text, "<p>{{ nope }}</p>");
    assert!(record.is_error());
}

#[test]
fn test_program_record_has_no_location() {
    let record = DiagnosticRecord::program(&Diagnostic::error(5083, "Cannot read file."));
    assert_eq!(record.phase, DiagnosticPhase::Program);
    assert!(record.location.is_none());
    assert_eq!(record.to_string(), "error TS5083: Cannot read file.");
}

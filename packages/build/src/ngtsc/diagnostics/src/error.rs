use super::error_code::ErrorCode;
use super::util::{format_error_code, ng_error_code};
use std::fmt;
use std::sync::Arc;
use ts::{compute_line_starts, Diagnostic, DiagnosticCategory, DiagnosticRelatedInformation};

/// The stage of the pipeline that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticPhase {
    /// Configuration, options and global diagnostics.
    Program,
    Syntactic,
    Semantic,
    Template,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl From<DiagnosticCategory> for Severity {
    fn from(category: DiagnosticCategory) -> Self {
        match category {
            DiagnosticCategory::Error => Severity::Error,
            DiagnosticCategory::Warning => Severity::Warning,
            DiagnosticCategory::Suggestion | DiagnosticCategory::Message => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

/// Position of a diagnostic inside its file. `line` and `column` are zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub start: usize,
    pub length: usize,
    pub line: usize,
    pub column: usize,
    /// The source line the diagnostic points into.
    pub line_text: String,
}

/// Related context attached to a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticNote {
    pub file: Option<String>,
    pub message: String,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub file: Option<String>,
    pub phase: DiagnosticPhase,
    pub severity: Severity,
    /// Numeric code; framework codes are encoded by [`ng_error_code`].
    pub code: i32,
    pub message: String,
    pub related_notes: Vec<DiagnosticNote>,
    pub location: Option<Location>,
}

impl DiagnosticRecord {
    /// Converts a host diagnostic, resolving positions against the file texts
    /// returned by `lookup`.
    pub fn from_diagnostic<F>(diagnostic: &Diagnostic, phase: DiagnosticPhase, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<Arc<str>>,
    {
        let location = locate(
            diagnostic.file.as_deref(),
            diagnostic.start,
            diagnostic.length,
            &lookup,
        );
        let related_notes = diagnostic
            .related_information
            .iter()
            .flatten()
            .map(|info| note_from_related(info, &lookup))
            .collect();
        DiagnosticRecord {
            file: diagnostic.file.clone(),
            phase,
            severity: diagnostic.category.into(),
            code: diagnostic.code,
            message: diagnostic.message_text.flatten("\n"),
            related_notes,
            location,
        }
    }

    /// A configuration-level diagnostic without a file position.
    pub fn program(diagnostic: &Diagnostic) -> Self {
        Self::from_diagnostic(diagnostic, DiagnosticPhase::Program, |_| None)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// `NG2008` or `TS2307`.
    pub fn code_text(&self) -> String {
        format_error_code(self.code)
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            match &self.location {
                Some(location) => {
                    write!(f, "{}:{}:{} - ", file, location.line + 1, location.column + 1)?
                }
                None => write!(f, "{} - ", file)?,
            }
        }
        write!(f, "{} {}: {}", self.severity, self.code_text(), self.message)
    }
}

fn locate<F>(
    file: Option<&str>,
    start: Option<usize>,
    length: Option<usize>,
    lookup: &F,
) -> Option<Location>
where
    F: Fn(&str) -> Option<Arc<str>>,
{
    let text = lookup(file?)?;
    let mut start = start?.min(text.len());
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let line_starts = compute_line_starts(&text);
    let line = match line_starts.binary_search(&start) {
        Ok(line) => line,
        Err(next) => next.saturating_sub(1),
    };
    let line_start = line_starts[line];
    let line_end = line_starts.get(line + 1).copied().unwrap_or(text.len());
    Some(Location {
        start,
        length: length.unwrap_or(0),
        line,
        column: text[line_start..start].chars().count(),
        line_text: text[line_start..line_end]
            .trim_end_matches(['\n', '\r'])
            .to_string(),
    })
}

fn note_from_related<F>(info: &DiagnosticRelatedInformation, lookup: &F) -> DiagnosticNote
where
    F: Fn(&str) -> Option<Arc<str>>,
{
    DiagnosticNote {
        file: info.file.clone(),
        message: info.message_text.clone(),
        location: locate(info.file.as_deref(), info.start, info.length, lookup),
    }
}

/// Builds a framework diagnostic for a span of `file`.
pub fn make_diagnostic(
    code: ErrorCode,
    file: &str,
    start: usize,
    length: usize,
    message_text: impl Into<ts::DiagnosticMessageChain>,
) -> Diagnostic {
    Diagnostic::error(ng_error_code(code), message_text)
        .with_file(file)
        .with_span(start, length)
}

pub fn make_related_information(
    file: &str,
    start: usize,
    length: usize,
    message_text: impl Into<String>,
) -> DiagnosticRelatedInformation {
    DiagnosticRelatedInformation {
        category: DiagnosticCategory::Message,
        code: 0,
        file: Some(file.to_string()),
        start: Some(start),
        length: Some(length),
        message_text: message_text.into(),
    }
}

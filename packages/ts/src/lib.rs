//! TypeScript-compatible interfaces and types for the Angular build engine.
//! This crate serves as the host-language layer: diagnostics, compiler options,
//! the compiler host contract and the incremental builder program.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod builder;
pub mod emitter;
pub mod program;
pub mod source_file;

pub use builder::*;
pub use emitter::*;
pub use program::*;
pub use source_file::*;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCategory {
    Warning,
    Error,
    Suggestion,
    Message,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticCategory::Warning => "warning",
            DiagnosticCategory::Error => "error",
            DiagnosticCategory::Suggestion => "suggestion",
            DiagnosticCategory::Message => "message",
        };
        f.write_str(name)
    }
}

// --- Diagnostic Structures ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticMessageChain {
    String(String),
    Chain {
        message_text: String,
        category: DiagnosticCategory,
        code: i32,
        next: Option<Vec<DiagnosticMessageChain>>,
    },
}

impl DiagnosticMessageChain {
    pub fn new(message: impl Into<String>) -> Self {
        Self::String(message.into())
    }

    /// Flattens the chain into a single message, indenting nested entries.
    pub fn flatten(&self, new_line: &str) -> String {
        let mut out = String::new();
        self.flatten_into(&mut out, new_line, 0);
        out
    }

    fn flatten_into(&self, out: &mut String, new_line: &str, depth: usize) {
        if depth > 0 {
            out.push_str(new_line);
            out.push_str(&"  ".repeat(depth));
        }
        match self {
            DiagnosticMessageChain::String(s) => out.push_str(s),
            DiagnosticMessageChain::Chain {
                message_text, next, ..
            } => {
                out.push_str(message_text);
                for child in next.iter().flatten() {
                    child.flatten_into(out, new_line, depth + 1);
                }
            }
        }
    }
}

impl From<String> for DiagnosticMessageChain {
    fn from(s: String) -> Self {
        DiagnosticMessageChain::String(s)
    }
}

impl From<&str> for DiagnosticMessageChain {
    fn from(s: &str) -> Self {
        DiagnosticMessageChain::String(s.to_string())
    }
}

impl fmt::Display for DiagnosticMessageChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flatten("\n"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRelatedInformation {
    pub category: DiagnosticCategory,
    pub code: i32,
    pub file: Option<String>,
    pub start: Option<usize>,
    pub length: Option<usize>,
    pub message_text: String,
}

/// A diagnostic produced by the host language layer.
///
/// `file` is `None` for program level diagnostics (options, global).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub code: i32,
    pub file: Option<String>,
    pub start: Option<usize>,
    pub length: Option<usize>,
    pub message_text: DiagnosticMessageChain,
    pub related_information: Option<Vec<DiagnosticRelatedInformation>>,
}

impl Diagnostic {
    pub fn error(code: i32, message: impl Into<DiagnosticMessageChain>) -> Self {
        Self {
            category: DiagnosticCategory::Error,
            code,
            file: None,
            start: None,
            length: None,
            message_text: message.into(),
            related_information: None,
        }
    }

    pub fn warning(code: i32, message: impl Into<DiagnosticMessageChain>) -> Self {
        Self {
            category: DiagnosticCategory::Warning,
            ..Self::error(code, message)
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_span(mut self, start: usize, length: usize) -> Self {
        self.start = Some(start);
        self.length = Some(length);
        self
    }

    pub fn is_error(&self) -> bool {
        self.category == DiagnosticCategory::Error
    }
}

// --- Utilities ---

pub fn make_diagnostic_chain(
    message_text: String,
    next: Option<Vec<DiagnosticMessageChain>>,
) -> DiagnosticMessageChain {
    DiagnosticMessageChain::Chain {
        category: DiagnosticCategory::Message,
        code: 0,
        message_text,
        next,
    }
}

pub fn add_diagnostic_chain(
    message_text: DiagnosticMessageChain,
    add: Vec<DiagnosticMessageChain>,
) -> DiagnosticMessageChain {
    match message_text {
        DiagnosticMessageChain::String(s) => make_diagnostic_chain(s, Some(add)),
        DiagnosticMessageChain::Chain {
            message_text,
            category,
            code,
            next,
        } => {
            let mut next_vec = next.unwrap_or_default();
            next_vec.extend(add);
            DiagnosticMessageChain::Chain {
                message_text,
                category,
                code,
                next: Some(next_vec),
            }
        }
    }
}

/// Content-derived version token used for source files and build-info.
pub fn version_of(text: &str) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(text.as_bytes()))
}

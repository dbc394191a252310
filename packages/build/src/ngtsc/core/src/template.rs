//! Template scanning.
//!
//! A light-weight reader for component templates. It does not build a full
//! template AST; it finds the expressions a template evaluates against its
//! component (interpolations, bound attributes, control-flow blocks) and
//! the property paths they read.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static BOUND_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:\[\(?[\w.\-@]+\)?\]|\([\w.\-:]+\)|\*[\w]+|bind-[\w\-]+|on-[\w\-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .unwrap()
});

static CONTROL_FLOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(?:if|else\s+if|for|switch|case|defer)\s*\(").unwrap());

static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s#|\sref-|\slet-)([A-Za-z_$][\w$]*)").unwrap());

static PROPERTY_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_$][\w$]*(?:\s*\??\.\s*[A-Za-z_$][\w$]*)*").unwrap()
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap());

const KEYWORDS: &[&str] = &[
    "true", "false", "null", "undefined", "this", "typeof", "void", "in", "of", "as", "let",
    "track", "when", "on", "prefetch", "new",
];

/// A property path read by a template expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateBinding {
    /// First segment, the member read from the component.
    pub root: String,
    /// Dotted path without optional chaining, e.g. `user.name`.
    pub path: String,
    /// Offset of `root` in the template text.
    pub start: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParseError {
    pub start: usize,
    pub length: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTemplate {
    pub bindings: Vec<TemplateBinding>,
    /// Names declared by the template itself (`#ref`, `let x`, `@for` items).
    pub locals: BTreeSet<String>,
    pub errors: Vec<TemplateParseError>,
}

impl ParsedTemplate {
    /// Distinct binding paths in first-occurrence order.
    pub fn binding_paths(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.bindings
            .iter()
            .filter(|binding| seen.insert(binding.path.clone()))
            .map(|binding| binding.path.clone())
            .collect()
    }
}

/// An expression and its offset in the template.
struct ExpressionSource<'a> {
    text: &'a str,
    offset: usize,
    /// Structural directive or block parameters, which may declare names.
    microsyntax: bool,
}

pub fn parse_template(template: &str) -> ParsedTemplate {
    let mut parsed = ParsedTemplate::default();
    let mut sources = Vec::new();

    collect_interpolations(template, &mut sources, &mut parsed.errors);
    for captures in BOUND_ATTRIBUTE.captures_iter(template) {
        let structural = captures
            .get(0)
            .is_some_and(|attribute| attribute.as_str().starts_with('*'));
        if let Some(value) = captures.get(1).or_else(|| captures.get(2)) {
            sources.push(ExpressionSource {
                text: value.as_str(),
                offset: value.start(),
                microsyntax: structural,
            });
        }
    }
    for block in CONTROL_FLOW.find_iter(template) {
        let open = block.end();
        match matching_paren(template, open) {
            Some(close) => sources.push(ExpressionSource {
                text: &template[open..close],
                offset: open,
                microsyntax: true,
            }),
            None => parsed.errors.push(TemplateParseError {
                start: block.start(),
                length: block.len(),
                message: "Unterminated block parameters: missing ')'".to_string(),
            }),
        }
    }
    for captures in REFERENCE.captures_iter(template) {
        if let Some(name) = captures.get(1) {
            parsed.locals.insert(name.as_str().to_string());
        }
    }

    // Locals may be declared after their first use, so declarations are
    // gathered before any binding is read.
    let mut expressions = Vec::new();
    for source in &sources {
        if source.microsyntax {
            split_microsyntax(source, &mut parsed.locals, &mut expressions);
        } else {
            expressions.push((source.text, source.offset));
        }
    }
    for (text, offset) in expressions {
        read_property_paths(text, offset, &parsed.locals, &mut parsed.bindings);
    }
    parsed.bindings.sort_by_key(|binding| binding.start);
    parsed
}

fn collect_interpolations<'a>(
    template: &'a str,
    sources: &mut Vec<ExpressionSource<'a>>,
    errors: &mut Vec<TemplateParseError>,
) {
    let mut cursor = 0;
    while let Some(found) = template[cursor..].find("{{") {
        let open = cursor + found;
        let body = open + 2;
        match template[body..].find("}}") {
            Some(length) => {
                sources.push(ExpressionSource {
                    text: &template[body..body + length],
                    offset: body,
                    microsyntax: false,
                });
                cursor = body + length + 2;
            }
            None => {
                errors.push(TemplateParseError {
                    start: open,
                    length: 2,
                    message: "Unterminated interpolation: '{{' is never closed by '}}'".to_string(),
                });
                return;
            }
        }
    }
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (index, ch) in text[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits `let item of items; let i = index; track item.id` style
/// expressions into plain expressions, recording the names they declare.
fn split_microsyntax<'a>(
    source: &ExpressionSource<'a>,
    locals: &mut BTreeSet<String>,
    expressions: &mut Vec<(&'a str, usize)>,
) {
    let mut segment_start = 0;
    for (index, segment) in source.text.split(';').enumerate() {
        let offset = source.offset + segment_start;
        segment_start += segment.len() + 1;

        let trimmed_start = segment.len() - segment.trim_start().len();
        let mut rest = &segment[trimmed_start..];
        let mut rest_offset = offset + trimmed_start;

        if let Some(after) = strip_keyword(rest, "let") {
            let (name, tail) = split_identifier(after);
            if let Some(name) = name {
                locals.insert(name.to_string());
            }
            // `let i = index` aliases a context variable.
            if tail.trim_start().starts_with('=') {
                continue;
            }
            rest_offset += rest.len() - tail.len();
            rest = tail;
        } else if let Some(after) =
            strip_keyword(rest, "track").or_else(|| strip_keyword(rest, "when"))
        {
            rest_offset += rest.len() - after.len();
            rest = after;
        } else if strip_keyword(rest, "on").is_some() || strip_keyword(rest, "prefetch").is_some() {
            // `@defer` triggers name template elements, not component members.
            continue;
        } else if let (Some(name), tail) = split_identifier(rest) {
            let tail_trimmed = tail.trim_start();
            if tail_trimmed.starts_with('=') && !tail_trimmed.starts_with("==") {
                // `i = $index` inside `@for`.
                locals.insert(name.to_string());
                continue;
            }
            if strip_keyword(tail_trimmed, "of").is_some() {
                locals.insert(name.to_string());
                rest_offset += rest.len() - tail.len();
                rest = tail;
            }
        }

        if let Some(after) = strip_keyword(rest.trim_start(), "of") {
            rest_offset += rest.len() - after.len();
            rest = after;
        }

        // `cond as alias` / `cond; as alias`.
        if let Some(alias) = strip_keyword(rest.trim_start(), "as") {
            if let (Some(name), _) = split_identifier(alias) {
                locals.insert(name.to_string());
            }
            continue;
        }
        if let Some(position) = rest.rfind(" as ") {
            if let (Some(name), tail) = split_identifier(&rest[position + 4..]) {
                if tail.trim().is_empty() {
                    locals.insert(name.to_string());
                    // `index as i` after the first segment aliases a context variable.
                    if index > 0 {
                        continue;
                    }
                    rest = &rest[..position];
                }
            }
        }

        expressions.push((rest, rest_offset));
    }
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let text = text.trim_start();
    let rest = text.strip_prefix(keyword)?;
    match rest.chars().next() {
        Some(ch) if ch.is_whitespace() => Some(rest),
        _ => None,
    }
}

fn split_identifier(text: &str) -> (Option<&str>, &str) {
    let trimmed = text.trim_start();
    let end = trimmed
        .char_indices()
        .find(|(_, ch)| !(ch.is_alphanumeric() || *ch == '_' || *ch == '$'))
        .map(|(index, _)| index)
        .unwrap_or(trimmed.len());
    let candidate = &trimmed[..end];
    if IDENTIFIER.is_match(candidate) {
        (Some(candidate), &trimmed[end..])
    } else {
        (None, text)
    }
}

fn read_property_paths(
    expression: &str,
    offset: usize,
    locals: &BTreeSet<String>,
    bindings: &mut Vec<TemplateBinding>,
) {
    let code = blank_string_literals(expression);
    for found in PROPERTY_PATH.find_iter(&code) {
        let before = code[..found.start()].trim_end();
        let after = code[found.end()..].trim_start();
        if before.ends_with('.') || before.ends_with(|ch: char| ch.is_ascii_digit()) {
            continue;
        }
        // Pipe names: `value | date`.
        if before.ends_with('|') && !before.ends_with("||") {
            continue;
        }
        // Object literal keys: `{ active: isActive }`.
        if after.starts_with(':') && (before.ends_with('{') || before.ends_with(',')) {
            continue;
        }

        let path: String = found
            .as_str()
            .chars()
            .filter(|ch| !ch.is_whitespace() && *ch != '?')
            .collect();
        let root = path.split('.').next().unwrap_or(&path).to_string();
        if root.starts_with('$') || KEYWORDS.contains(&root.as_str()) || locals.contains(&root) {
            continue;
        }
        bindings.push(TemplateBinding {
            root,
            path,
            start: offset + found.start(),
        });
    }
}

/// Replaces the contents of string literals with spaces, keeping offsets.
fn blank_string_literals(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in expression.chars() {
        match quote {
            Some(open) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == open {
                    quote = None;
                    out.push(ch);
                    continue;
                }
                out.extend(std::iter::repeat(' ').take(ch.len_utf8()));
            }
            None => {
                if matches!(ch, '\'' | '"' | '`') {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

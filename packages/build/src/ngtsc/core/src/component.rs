//! Component metadata extraction.
//!
//! Reads the `@Component` decorators of a source file with oxc and records
//! where every resource reference sits, so that later stages can load the
//! resources and rewrite the decorator text.

use crate::ngtsc::diagnostics::ErrorCode;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Class, ClassElement, Declaration, ExportDefaultDeclarationKind,
    Expression, MethodDefinitionKind, ObjectExpression, ObjectPropertyKind, Statement,
};
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::collections::BTreeSet;
use std::path::Path;

/// Byte range `[start, end)` in a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        TextSpan { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl From<oxc_span::Span> for TextSpan {
    fn from(span: oxc_span::Span) -> Self {
        TextSpan::new(span.start as usize, span.end as usize)
    }
}

/// A resource declared by a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceDecl {
    /// `templateUrl` / `styleUrl(s)` entry. `span` covers the string literal.
    External { url: String, span: TextSpan },
    /// `template` / `styles` literal. `span` covers the literal including quotes.
    Inline { text: String, span: TextSpan },
}

impl ResourceDecl {
    pub fn span(&self) -> TextSpan {
        match self {
            ResourceDecl::External { span, .. } | ResourceDecl::Inline { span, .. } => *span,
        }
    }
}

/// Malformed decorator metadata, reported as a diagnostic on the component file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataProblem {
    pub code: ErrorCode,
    pub span: TextSpan,
    pub message: String,
}

impl MetadataProblem {
    fn new(code: ErrorCode, span: impl Into<TextSpan>, message: impl Into<String>) -> Self {
        MetadataProblem {
            code,
            span: span.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDecl {
    pub class_name: String,
    pub name_span: TextSpan,
    pub template: Option<ResourceDecl>,
    /// The whole `template`/`templateUrl` property.
    pub template_property: Option<TextSpan>,
    pub styles: Vec<ResourceDecl>,
    /// Every `styleUrl`, `styleUrls` and `styles` property, in source order.
    pub style_properties: Vec<TextSpan>,
    /// Instance members visible to the template.
    pub members: BTreeSet<String>,
    pub problems: Vec<MetadataProblem>,
}

impl ComponentDecl {
    /// Whether the component declares neither `template` nor `templateUrl`.
    /// False when the metadata was too malformed to tell.
    pub fn is_missing_template(&self) -> bool {
        self.template.is_none()
            && !self.problems.iter().any(|problem| {
                matches!(
                    problem.code,
                    ErrorCode::DecoratorArityWrong | ErrorCode::DecoratorArgNotLiteral
                ) || problem.message.starts_with("template")
            })
    }

    pub fn external_resources(&self) -> impl Iterator<Item = &str> {
        self.template
            .iter()
            .chain(&self.styles)
            .filter_map(|resource| match resource {
                ResourceDecl::External { url, .. } => Some(url.as_str()),
                ResourceDecl::Inline { .. } => None,
            })
    }
}

/// Quick textual pre-check that avoids parsing files without components.
pub fn may_contain_components(text: &str) -> bool {
    text.contains("@Component")
}

/// Every `@Component`-decorated class of a file, in source order.
pub fn extract_components(file_name: &str, text: &str) -> Vec<ComponentDecl> {
    if !may_contain_components(text) {
        return Vec::new();
    }
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(Path::new(file_name)).unwrap_or_default();
    let ret = Parser::new(&allocator, text, source_type).parse();

    let mut components = Vec::new();
    for statement in &ret.program.body {
        let class = match statement {
            Statement::ClassDeclaration(class) => Some(&**class),
            Statement::ExportNamedDeclaration(export) => match &export.declaration {
                Some(Declaration::ClassDeclaration(class)) => Some(&**class),
                _ => None,
            },
            Statement::ExportDefaultDeclaration(export) => match &export.declaration {
                ExportDefaultDeclarationKind::ClassDeclaration(class) => Some(&**class),
                _ => None,
            },
            _ => None,
        };
        if let Some(component) = class.and_then(extract_component) {
            components.push(component);
        }
    }
    components
}

fn extract_component(class: &Class) -> Option<ComponentDecl> {
    let call = class.decorators.iter().find_map(|decorator| match &decorator.expression {
        Expression::CallExpression(call) => match &call.callee {
            Expression::Identifier(ident) if ident.name == "Component" => Some(&**call),
            _ => None,
        },
        _ => None,
    })?;
    let id = class.id.as_ref()?;

    let mut component = ComponentDecl {
        class_name: id.name.to_string(),
        name_span: id.span.into(),
        template: None,
        template_property: None,
        styles: Vec::new(),
        style_properties: Vec::new(),
        members: collect_members(class),
        problems: Vec::new(),
    };
    if call.arguments.len() != 1 {
        component.problems.push(MetadataProblem::new(
            ErrorCode::DecoratorArityWrong,
            call.span,
            "@Component must have exactly one argument",
        ));
        return Some(component);
    }
    match call.arguments[0].as_expression() {
        Some(Expression::ObjectExpression(metadata)) => read_metadata(metadata, &mut component),
        _ => component.problems.push(MetadataProblem::new(
            ErrorCode::DecoratorArgNotLiteral,
            call.span,
            "@Component argument must be an object literal",
        )),
    }
    Some(component)
}

fn read_metadata(metadata: &ObjectExpression, component: &mut ComponentDecl) {
    let mut style_url_property = None;
    let mut style_urls_property = None;
    for property in &metadata.properties {
        let ObjectPropertyKind::ObjectProperty(property) = property else {
            continue;
        };
        let Some(key) = property.key.static_name() else {
            continue;
        };
        let key = key.as_ref();
        match key {
            "templateUrl" | "template" => match string_value(&property.value) {
                Some((text, span)) => {
                    component.template = Some(if key == "templateUrl" {
                        ResourceDecl::External { url: text, span }
                    } else {
                        ResourceDecl::Inline { text, span }
                    });
                    component.template_property = Some(property.span.into());
                }
                None => component.problems.push(MetadataProblem::new(
                    ErrorCode::ValueHasWrongType,
                    property.span,
                    format!("{} must be a string", key),
                )),
            },
            "styleUrl" => {
                match string_value(&property.value) {
                    Some((url, span)) => component.styles.push(ResourceDecl::External { url, span }),
                    None => component.problems.push(MetadataProblem::new(
                        ErrorCode::ValueHasWrongType,
                        property.span,
                        "styleUrl must be a string",
                    )),
                }
                style_url_property = Some(TextSpan::from(property.span));
                component.style_properties.push(property.span.into());
            }
            "styleUrls" => {
                match string_elements(&property.value) {
                    Some(urls) => component.styles.extend(
                        urls.into_iter()
                            .map(|(url, span)| ResourceDecl::External { url, span }),
                    ),
                    None => component.problems.push(MetadataProblem::new(
                        ErrorCode::ValueHasWrongType,
                        property.span,
                        "styleUrls must be an array of strings",
                    )),
                }
                style_urls_property = Some(TextSpan::from(property.span));
                component.style_properties.push(property.span.into());
            }
            "styles" => {
                let styles = match &property.value {
                    Expression::ArrayExpression(_) => string_elements(&property.value),
                    value => string_value(value).map(|style| vec![style]),
                };
                match styles {
                    Some(styles) => component.styles.extend(
                        styles
                            .into_iter()
                            .map(|(text, span)| ResourceDecl::Inline { text, span }),
                    ),
                    None => component.problems.push(MetadataProblem::new(
                        ErrorCode::ValueHasWrongType,
                        property.span,
                        "styles must be a string or an array of strings",
                    )),
                }
                component.style_properties.push(property.span.into());
            }
            _ => {}
        }
    }
    if let (Some(_), Some(span)) = (style_url_property, style_urls_property) {
        component.problems.push(MetadataProblem::new(
            ErrorCode::ComponentInvalidStyleUrls,
            span,
            "@Component cannot define both `styleUrl` and `styleUrls`. \
             Use `styleUrl` if the component has one stylesheet, or `styleUrls` if it has multiple",
        ));
    }
}

fn string_value(expression: &Expression) -> Option<(String, TextSpan)> {
    match expression {
        Expression::StringLiteral(literal) => Some((literal.value.to_string(), literal.span.into())),
        Expression::TemplateLiteral(template) if template.expressions.is_empty() => {
            let cooked = template.quasis.first()?.value.cooked.as_ref()?;
            Some((cooked.to_string(), template.span.into()))
        }
        _ => None,
    }
}

/// Maps byte offsets of the decoded value of an inline literal back to the
/// source text. `span` covers the literal including its quotes.
///
/// Returns one raw offset (relative to the literal's content) per decoded
/// byte plus one for the end, or `None` when the literal has no escapes and
/// the offsets are identical.
pub fn literal_offsets(source: &str, span: TextSpan, decoded: &str) -> Option<Vec<usize>> {
    let raw = source.get(span.start + 1..span.end.saturating_sub(1))?;
    if !raw.contains(['\\', '\r']) {
        return None;
    }

    let mut offsets = Vec::with_capacity(decoded.len() + 1);
    let mut rebuilt = String::with_capacity(decoded.len());
    let mut chars = raw.char_indices().peekable();
    while let Some((at, c)) = chars.next() {
        let produced = match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => decode_escape(escaped, &mut chars),
                None => None,
            },
            '\r' => {
                chars.next_if(|&(_, next)| next == '\n');
                Some('\n')
            }
            c => Some(c),
        };
        if let Some(produced) = produced {
            offsets.extend(std::iter::repeat_n(at, produced.len_utf8()));
            rebuilt.push(produced);
        }
    }
    offsets.push(raw.len());

    // Surrogate pair escapes are not modeled; those literals keep identity offsets.
    (rebuilt == decoded).then_some(offsets)
}

fn decode_escape(
    escaped: char,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Option<char> {
    match escaped {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'b' => Some('\u{8}'),
        'f' => Some('\u{c}'),
        'v' => Some('\u{b}'),
        '0' => Some('\0'),
        'x' => hex_char(chars, 2),
        'u' => {
            if chars.next_if(|&(_, c)| c == '{').is_some() {
                let digits: String = chars
                    .by_ref()
                    .map(|(_, c)| c)
                    .take_while(|&c| c != '}')
                    .collect();
                u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
            } else {
                hex_char(chars, 4)
            }
        }
        // Line continuations produce nothing.
        '\r' => {
            chars.next_if(|&(_, c)| c == '\n');
            None
        }
        '\n' | '\u{2028}' | '\u{2029}' => None,
        other => Some(other),
    }
}

fn hex_char(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, count: usize) -> Option<char> {
    let digits: String = (0..count).filter_map(|_| chars.next().map(|(_, c)| c)).collect();
    u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
}

/// String elements of an array literal, `None` when any element is not a string.
fn string_elements(expression: &Expression) -> Option<Vec<(String, TextSpan)>> {
    let Expression::ArrayExpression(array) = expression else {
        return None;
    };
    array
        .elements
        .iter()
        .map(|element| element.as_expression().and_then(string_value))
        .collect()
}

fn collect_members(class: &Class) -> BTreeSet<String> {
    let mut members = BTreeSet::new();
    for element in &class.body.body {
        match element {
            ClassElement::PropertyDefinition(property) if !property.r#static => {
                members.extend(property.key.static_name().map(|name| name.to_string()));
            }
            ClassElement::AccessorProperty(accessor) if !accessor.r#static => {
                members.extend(accessor.key.static_name().map(|name| name.to_string()));
            }
            ClassElement::MethodDefinition(method) if !method.r#static => {
                if method.kind == MethodDefinitionKind::Constructor {
                    // Parameter properties: `constructor(private service: Service)`.
                    for param in &method.value.params.items {
                        if param.accessibility.is_some() || param.readonly {
                            members.extend(
                                param
                                    .pattern
                                    .get_binding_identifier()
                                    .map(|id| id.name.to_string()),
                            );
                        }
                    }
                } else {
                    members.extend(method.key.static_name().map(|name| name.to_string()));
                }
            }
            _ => {}
        }
    }
    members
}

// Resource Transforms
//
// Text rewrites of `@Component` metadata applied before a component file is
// emitted. Full builds inline the compiled resources; lightweight builds turn
// every resource reference into an import of a synthetic resource module.

use super::component::{ComponentDecl, ResourceDecl, TextSpan};
use crate::ngtsc::resource::{generate_jit_file_uri, generate_jit_inline_uri, ResourceKind};

/// Prefix of the identifiers bound to imported resource modules.
pub const RESOURCE_IMPORT_PREFIX: &str = "__NG_CLI_RESOURCE__";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Replacement {
    span: TextSpan,
    text: String,
}

/// Compiled resources of one component, in declaration order.
#[derive(Debug, Clone, Copy)]
pub struct InlineResources<'a> {
    /// Compiled template when it came from `templateUrl`.
    pub template: Option<&'a str>,
    /// Compiled content of every entry of `ComponentDecl::styles`; `None`
    /// for styles that failed to load.
    pub styles: &'a [Option<String>],
}

/// Rewrites `text` so that every component carries its compiled resources
/// inline. Returns `None` when nothing changed.
pub fn inline_resources(
    text: &str,
    components: &[(&ComponentDecl, InlineResources<'_>)],
) -> Option<String> {
    let mut replacements = Vec::new();
    for (component, resources) in components {
        if let (Some(ResourceDecl::External { .. }), Some(property), Some(template)) =
            (&component.template, component.template_property, resources.template)
        {
            replacements.push(Replacement {
                span: property,
                text: format!("template: {}", js_string(template)),
            });
        }

        // A style that failed to load keeps the original properties so the
        // reported diagnostic stays accurate.
        if component.style_properties.is_empty()
            || resources.styles.len() != component.styles.len()
            || resources.styles.iter().any(Option::is_none)
        {
            continue;
        }
        let styles: Vec<String> = resources.styles.iter().flatten().map(|s| js_string(s)).collect();
        push_style_replacements(
            text,
            component,
            format!("styles: [{}]", styles.join(", ")),
            &mut replacements,
        );
    }
    if replacements.is_empty() {
        return None;
    }
    Some(apply_replacements(text, replacements))
}

/// Rewrites `templateUrl`, `styleUrl(s)` and inline `styles` into imports of
/// `angular:jit:` resource modules. Returns `None` when nothing changed.
pub fn replace_resources_with_imports(
    text: &str,
    file_name: &str,
    components: &[ComponentDecl],
) -> Option<String> {
    let mut imports = Vec::new();
    let mut replacements = Vec::new();
    let mut import_for = |uri: String| {
        let name = format!("{}{}", RESOURCE_IMPORT_PREFIX, imports.len());
        imports.push(format!("import {} from {};\n", name, js_string(&uri)));
        name
    };

    for component in components {
        if let (Some(ResourceDecl::External { url, .. }), Some(property)) =
            (&component.template, component.template_property)
        {
            let name = import_for(generate_jit_file_uri(url, ResourceKind::Template));
            replacements.push(Replacement {
                span: property,
                text: format!("template: {}", name),
            });
        }

        if component.style_properties.is_empty() || component.styles.is_empty() {
            continue;
        }
        let names: Vec<String> = component
            .styles
            .iter()
            .map(|style| match style {
                ResourceDecl::External { url, .. } => {
                    import_for(generate_jit_file_uri(url, ResourceKind::Style))
                }
                ResourceDecl::Inline { text, .. } => {
                    import_for(generate_jit_inline_uri(text, ResourceKind::Style, file_name))
                }
            })
            .collect();
        push_style_replacements(
            text,
            component,
            format!("styles: [{}]", names.join(", ")),
            &mut replacements,
        );
    }

    if imports.is_empty() {
        return None;
    }
    let mut out = imports.concat();
    out.push_str(&apply_replacements(text, replacements));
    Some(out)
}

/// Replaces the first style property with `styles` and removes the others.
fn push_style_replacements(
    text: &str,
    component: &ComponentDecl,
    styles: String,
    replacements: &mut Vec<Replacement>,
) {
    let mut properties = component.style_properties.iter();
    if let Some(first) = properties.next() {
        replacements.push(Replacement {
            span: *first,
            text: styles,
        });
    }
    for property in properties {
        replacements.push(Replacement {
            span: removal_span(text, *property),
            text: String::new(),
        });
    }
}

/// Extends a property span over its trailing comma.
fn removal_span(text: &str, span: TextSpan) -> TextSpan {
    let rest = &text[span.end..];
    let trimmed = rest.trim_start();
    match trimmed.strip_prefix(',') {
        Some(_) => TextSpan::new(span.start, span.end + (rest.len() - trimmed.len()) + 1),
        None => span,
    }
}

fn apply_replacements(text: &str, mut replacements: Vec<Replacement>) -> String {
    replacements.sort_by_key(|replacement| replacement.span.start);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for replacement in replacements {
        if replacement.span.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..replacement.span.start]);
        out.push_str(&replacement.text);
        cursor = replacement.span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

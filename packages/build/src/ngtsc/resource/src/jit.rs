// JIT Resource URIs
//
// Synthetic module specifiers that route component resources through the
// bundler's resolution pipeline in lightweight (JIT) builds.

use super::loader::ResourceKind;
use base64::prelude::{Engine as _, BASE64_STANDARD};

/// Marker shared by every resource URI; stripped by the resolution layer.
pub const JIT_NAMESPACE: &str = "angular:jit:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JitOrigin {
    /// Path of a resource file, relative to the importing file.
    File(String),
    /// Literal resource content declared inside `containing_file`.
    Inline { containing_file: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitResource {
    pub kind: ResourceKind,
    pub origin: JitOrigin,
}

pub fn generate_jit_file_uri(file: &str, kind: ResourceKind) -> String {
    format!("{}{}:file;{}", JIT_NAMESPACE, kind, file)
}

pub fn generate_jit_inline_uri(data: &str, kind: ResourceKind, containing_file: &str) -> String {
    format!(
        "{}{}:inline;{};{}",
        JIT_NAMESPACE,
        kind,
        containing_file,
        BASE64_STANDARD.encode(data)
    )
}

pub fn is_jit_uri(specifier: &str) -> bool {
    specifier.starts_with(JIT_NAMESPACE)
}

pub fn strip_jit_marker(specifier: &str) -> Option<&str> {
    specifier.strip_prefix(JIT_NAMESPACE)
}

pub fn parse_jit_uri(specifier: &str) -> Option<JitResource> {
    let rest = strip_jit_marker(specifier)?;
    let (kind, rest) = rest.split_once(':')?;
    let kind = match kind {
        "template" => ResourceKind::Template,
        "style" => ResourceKind::Style,
        _ => return None,
    };
    let (origin, payload) = rest.split_once(';')?;
    let origin = match origin {
        "file" => JitOrigin::File(payload.to_string()),
        "inline" => {
            let (containing_file, encoded) = payload.rsplit_once(';')?;
            let bytes = BASE64_STANDARD.decode(encoded).ok()?;
            JitOrigin::Inline {
                containing_file: containing_file.to_string(),
                data: String::from_utf8(bytes).ok()?,
            }
        }
        _ => return None,
    };
    Some(JitResource { kind, origin })
}

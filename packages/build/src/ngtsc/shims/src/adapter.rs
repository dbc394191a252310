// Shim Adapter
//
// Names and generates the type-check shim of a component file.

/// Suffix of the type-check shim generated next to each component file.
pub const TYPE_CHECK_SHIM_SUFFIX: &str = ".ngtypecheck.ts";

pub fn is_shim(file_name: &str) -> bool {
    file_name.ends_with(TYPE_CHECK_SHIM_SUFFIX)
}

/// Name of the shim for `origin`, or `None` for files that never get one.
pub fn shim_file_for(origin: &str) -> Option<String> {
    if is_shim(origin) || origin.ends_with(".d.ts") {
        return None;
    }
    let stem = origin.strip_suffix(".ts")?;
    Some(format!("{}{}", stem, TYPE_CHECK_SHIM_SUFFIX))
}

/// Name of the user file a shim was generated for.
pub fn origin_of_shim(shim: &str) -> Option<String> {
    let stem = shim.strip_suffix(TYPE_CHECK_SHIM_SUFFIX)?;
    Some(format!("{}.ts", stem))
}

/// A component class whose template gets type-checked through a shim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCheckTarget {
    pub class_name: String,
    /// Fingerprint of the template text the bindings were read from.
    pub template_hash: String,
    /// Property paths the template reads from the component, e.g. `user.name`.
    pub bindings: Vec<String>,
}

/// Generated shim file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimFile {
    pub file_name: String,
    pub origin: String,
    pub content: String,
}

/// Generates the type-check shim of `origin`: one type-check block per component.
pub fn generate_type_check_shim(origin: &str, targets: &[TypeCheckTarget]) -> Option<ShimFile> {
    let file_name = shim_file_for(origin)?;
    let module = origin
        .rsplit('/')
        .next()
        .and_then(|name| name.strip_suffix(".ts"))
        .unwrap_or(origin);

    let mut content = format!("import * as i0 from \"./{}\";\n", module);
    for target in targets {
        content.push_str(&format!(
            "\n/*T:{}*/\nfunction _tcb_{}(ctx: i0.{}) {{\n",
            target.template_hash, target.class_name, target.class_name
        ));
        for binding in &target.bindings {
            content.push_str(&format!("  ctx.{};\n", binding));
        }
        content.push_str("}\n");
    }
    if targets.is_empty() {
        content.push_str("export const USED_FOR_NG_TYPE_CHECKING = true;\n");
    }

    Some(ShimFile {
        file_name,
        origin: origin.to_string(),
        content,
    })
}

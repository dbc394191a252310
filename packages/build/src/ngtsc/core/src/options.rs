use crate::ngtsc::diagnostics::{ng_error_code, ErrorCode};
use serde::{Deserialize, Serialize};
use ts::Diagnostic;

/// The `angularCompilerOptions` block of a tsconfig.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NgCompilerOptions {
    pub strict_templates: Option<bool>,
    pub full_template_type_check: Option<bool>,
    /// Report unknown template members as warnings instead of errors.
    pub template_errors_as_warnings: Option<bool>,
}

impl NgCompilerOptions {
    /// Whether template expressions are checked against their component.
    pub fn check_templates(&self) -> bool {
        self.strict_templates == Some(true) || self.full_template_type_check != Some(false)
    }

    pub fn options_diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if self.strict_templates == Some(true) && self.full_template_type_check == Some(false) {
            diagnostics.push(Diagnostic::error(
                ng_error_code(ErrorCode::ConfigStrictTemplatesImpliesFullTemplateTypecheck),
                "Angular compiler option \"strictTemplates\" is enabled, however \
                 \"fullTemplateTypeCheck\" is disabled.\n\n\
                 Having the \"strictTemplates\" flag enabled implies that \
                 \"fullTemplateTypeCheck\" is also enabled, so the latter can not be explicitly \
                 disabled.\n\n\
                 One of the following actions is required:\n\
                 1. Remove the \"fullTemplateTypeCheck\" option.\n\
                 2. Remove \"strictTemplates\" or set it to 'false'.",
            ));
        }
        diagnostics
    }
}

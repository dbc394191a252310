/// Framework error codes. Rendered with an `NG` prefix, see [`super::util::ng_error_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    DecoratorArgNotLiteral = 1001,
    DecoratorArityWrong = 1002,

    ValueHasWrongType = 1010,

    ComponentMissingTemplate = 2001,

    /// Raised when an component cannot resolve an external resource, such as a template or a style
    /// sheet.
    ComponentResourceNotFound = 2008,

    /// Raised when a component has both `styleUrls` and `styleUrl`.
    ComponentInvalidStyleUrls = 2021,

    /// Raised when the isolated sub-build of a template or stylesheet reports an error.
    ComponentResourceCompilationFailed = 2028,

    ConfigStrictTemplatesImpliesFullTemplateTypecheck = 4002,

    /// Raised when the compiler cannot parse a component's template.
    TemplateParseError = 5002,
}

// Sandbox
//
// Extracts the compiled string from the library-form output of a resource
// sub-build without executing it. Supported conventions:
//   export default "<content>";
//   module.exports = "<content>";
//   "<content>";

use oxc_allocator::Allocator;
use oxc_ast::ast::{AssignmentTarget, Expression, Statement};
use oxc_parser::Parser;
use oxc_span::SourceType;

pub fn evaluate_library_output(code: &str) -> Option<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
    if !ret.errors.is_empty() {
        return None;
    }

    for statement in &ret.program.body {
        match statement {
            Statement::ExportDefaultDeclaration(decl) => {
                if let Some(value) = decl.declaration.as_expression().and_then(literal_value) {
                    return Some(value);
                }
            }
            Statement::ExpressionStatement(stmt) => match &stmt.expression {
                Expression::AssignmentExpression(assign) if is_module_exports(&assign.left) => {
                    return literal_value(&assign.right);
                }
                other => {
                    if let Some(value) = literal_value(other) {
                        return Some(value);
                    }
                }
            },
            _ => {}
        }
    }

    // A lone string literal at the top of a module parses as a directive.
    if ret.program.body.is_empty() {
        return ret
            .program
            .directives
            .last()
            .map(|directive| directive.expression.value.to_string());
    }
    None
}

fn literal_value(expression: &Expression) -> Option<String> {
    match expression.without_parentheses() {
        Expression::StringLiteral(literal) => Some(literal.value.to_string()),
        Expression::TemplateLiteral(template) if template.expressions.is_empty() => template
            .quasis
            .first()
            .and_then(|quasi| quasi.value.cooked.as_ref())
            .map(|cooked| cooked.to_string()),
        _ => None,
    }
}

fn is_module_exports(target: &AssignmentTarget) -> bool {
    match target {
        AssignmentTarget::StaticMemberExpression(member) => {
            matches!(&member.object, Expression::Identifier(id) if id.name.as_str() == "module")
                && member.property.name.as_str() == "exports"
        }
        _ => false,
    }
}

use super::error_code::ErrorCode;

/// Offset applied to framework codes so they never collide with language codes.
const NG_CODE_OFFSET: i32 = 990_000;

/// Numeric diagnostic code of a framework error: `-99` followed by the code.
pub fn ng_error_code(code: ErrorCode) -> i32 {
    -(NG_CODE_OFFSET + code as i32)
}

pub fn is_ng_error_code(code: i32) -> bool {
    code <= -NG_CODE_OFFSET
}

/// Renders a numeric diagnostic code with its origin prefix, e.g. `NG2008` or `TS2307`.
pub fn format_error_code(code: i32) -> String {
    if is_ng_error_code(code) {
        format!("NG{}", -code - NG_CODE_OFFSET)
    } else {
        format!("TS{}", code)
    }
}

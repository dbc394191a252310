use ts::{dirname, normalize_path};

/// Resolves `path` against `base` unless it is already absolute.
pub fn resolve(base: &str, path: &str) -> String {
    ts::join_paths(base, path)
}

/// Relative path from the directory `from` to `to`, always starting with `./` or `../`.
pub fn relative(from: &str, to: &str) -> String {
    let from = normalize_path(from);
    let to = normalize_path(to);
    let from_segments: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();
    let to_segments: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();
    let common = from_segments
        .iter()
        .zip(&to_segments)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; from_segments.len() - common];
    parts.extend(&to_segments[common..]);
    let joined = parts.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    }
}

/// Relative path of `file` from the directory containing `containing_file`.
pub fn relative_to_file(containing_file: &str, file: &str) -> String {
    relative(dirname(containing_file), file)
}

pub fn extname(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(pos) => &name[pos..],
    }
}

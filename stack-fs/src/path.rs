//! Path helpers for tools working with absolute paths.

/// Parent of `path` with `//`, `.` and `..` resolved; `/` when nothing is
/// left.
pub fn dirname(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }
    parts.pop();

    if parts.is_empty() {
        return "/".to_owned();
    }
    parts.iter().fold(String::new(), |mut out, part| {
        out.push('/');
        out.push_str(part);
        out
    })
}

/// Text after the last `/`.
pub fn basename(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

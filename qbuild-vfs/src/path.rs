//! Helpers for `/`-separated logical and real path strings

/// Normalize a path: collapse repeated separators, resolve `.` and `..`
/// and drop any trailing separator. `..` never climbs above the root of an
/// absolute path; leading `..` of a relative path is kept.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

pub fn is_relative(path: &str) -> bool {
    !path.starts_with('/')
}

/// Everything before the last separator; `/` for top-level entries.
pub fn dir_name(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

/// Everything after the last separator.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join `base` and `sub` with exactly one separator.
pub fn join(base: &str, sub: &str) -> String {
    match (base.ends_with('/'), sub.starts_with('/')) {
        (true, true) => format!("{}{}", base, &sub[1..]),
        (false, false) => format!("{base}/{sub}"),
        _ => format!("{base}{sub}"),
    }
}

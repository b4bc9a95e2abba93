//! File name permission filter.
//!
//! Every ingestion path runs candidate names through [`is_permitted_file`]
//! before a file may enter an [`Archive`](super::Archive).

/// Longest accepted file name, in characters.
pub const MAX_NAME_LEN: usize = 200;

/// Bare file names accepted regardless of extension.
const PERMITTED_NAMES: &[&str] = &["LICENSE", "go.sum"];

/// Lowercased extensions accepted for every other name.
const PERMITTED_EXTENSIONS: &[&str] = &[
    "go", "mod", "html", "gohtml", "md", "txt", "json", "yml", "yaml", "tmpl", "css",
];

/// Decide whether a file name may enter an archive.
///
/// The name must be a clean, forward-slash relative path no longer than
/// [`MAX_NAME_LEN`] characters whose final segment is not hidden and is
/// either a permitted bare name or carries a permitted extension.
pub fn is_permitted_file(name: &str) -> bool {
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return false;
    }
    if !is_clean_relative_path(name) {
        return false;
    }
    let base = base_name(name);
    if base.starts_with('.') {
        return false;
    }
    if PERMITTED_NAMES.contains(&base) {
        return true;
    }
    match extension(base) {
        Some(ext) => PERMITTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Final path segment of a forward-slash path.
pub fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Extension of a base name, without the dot.
pub fn extension(base: &str) -> Option<&str> {
    base.rfind('.').map(|idx| &base[idx + 1..])
}

/// Check that a name is relative, uses `/` separators, and has no empty,
/// `.` or `..` segments.
pub fn is_clean_relative_path(name: &str) -> bool {
    if name.starts_with('/') || name.contains('\\') || name.contains('\0') {
        return false;
    }
    name.split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Lexically clean an archive entry path.
///
/// Collapses duplicate separators and `.` segments and resolves `..`
/// against preceding segments. Returns `None` for absolute paths, paths
/// that climb above the archive root, and paths that clean to nothing.
pub fn normalize_path(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    if path.starts_with('/') {
        return None;
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permitted_source_and_manifest_files() {
        for name in [
            "main.go",
            "go.mod",
            "go.sum",
            "LICENSE",
            "README.md",
            "notes.txt",
            "data.json",
            "cmd/server/main.go",
            "templates/index.gohtml",
            "static/site.CSS",
            "config.yaml",
        ] {
            assert!(is_permitted_file(name), "{name} should be permitted");
        }
    }

    #[test]
    fn test_rejected_names() {
        for name in [
            "",
            ".env",
            "config/.env",
            ".gitignore",
            "main.rs",
            "script.sh",
            "Makefile",
            "binary",
            "/etc/passwd.txt",
            "../escape.go",
            "a/../b.go",
            "a//b.go",
            "./main.go",
            "dir\\main.go",
        ] {
            assert!(!is_permitted_file(name), "{name:?} should be rejected");
        }
    }

    #[test]
    fn test_name_length_limit() {
        let at_limit = format!("{}.go", "a".repeat(MAX_NAME_LEN - 3));
        assert!(is_permitted_file(&at_limit));

        let over_limit = format!("{}.go", "a".repeat(MAX_NAME_LEN - 2));
        assert!(!is_permitted_file(&over_limit));
    }

    #[test]
    fn test_hidden_directories_do_not_hide_files() {
        assert!(is_permitted_file(".github/workflows/ci.yml"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("main.go").as_deref(), Some("main.go"));
        assert_eq!(normalize_path("./a//b/./c.go").as_deref(), Some("a/b/c.go"));
        assert_eq!(normalize_path("a/x/../b.go").as_deref(), Some("a/b.go"));
        assert_eq!(normalize_path("a\\b.go").as_deref(), Some("a/b.go"));
        assert_eq!(normalize_path("../b.go"), None);
        assert_eq!(normalize_path("/abs/b.go"), None);
        assert_eq!(normalize_path("./"), None);
    }
}

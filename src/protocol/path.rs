//! Platform-independent path normalization for extracted paths.

/// Normalize a path taken from a tag attribute.
///
/// Backslashes become forward slashes, empty and `.` segments are dropped
/// and `..` folds into its parent where one exists. A leading `/` is kept.
pub fn normalize_path(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_backslashes() {
        assert_eq!(normalize_path(r"src\components\App.tsx"), "src/components/App.tsx");
    }

    #[test]
    fn strips_leading_dot_slash_and_redundant_segments() {
        assert_eq!(normalize_path("./src//lib/./util.ts"), "src/lib/util.ts");
        assert_eq!(normalize_path("src/lib/../main.ts"), "src/main.ts");
    }

    #[test]
    fn keeps_unresolvable_parent_segments_on_relative_paths() {
        assert_eq!(normalize_path("../shared/a.ts"), "../shared/a.ts");
        assert_eq!(normalize_path("/../etc/hosts"), "/etc/hosts");
    }

    #[test]
    fn is_idempotent() {
        let once = normalize_path(r".\a\..\b\.\c.ts");
        assert_eq!(normalize_path(&once), once);
        assert_eq!(once, "b/c.ts");
    }
}

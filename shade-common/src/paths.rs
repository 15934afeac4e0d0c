//! Centralized Path Definitions
//!
//! Default file names and directory conventions used by the packager.
//! Keeping them here prevents hardcoded strings scattered across the codebase.

/// Build file naming
pub mod build {
    /// Name of the declarative build file
    pub const CONFIG_FILE: &str = "shade.toml";

    /// Default directory holding compiled classes
    pub const CLASSES_DIR: &str = "build/classes";

    /// Default directory the artifact is written to
    pub const OUTPUT_DIR: &str = "build/libs";

    /// Default artifact name template
    pub const ARCHIVE_NAME: &str = "${name}-${version}-all.${ext}";

    /// Extension of the merged artifact
    pub const ARCHIVE_EXT: &str = "jar";
}

/// Local dependency caches
pub mod repository {
    use std::path::PathBuf;

    /// Default local Maven repository, relative to the home directory
    pub const MAVEN_LOCAL: &str = ".m2/repository";

    /// Expand a leading `~/` to the home directory
    pub fn expand_home(path: &str) -> PathBuf {
        match path.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(path)),
            None => PathBuf::from(path),
        }
    }
}

/// Entry path conventions inside JVM archives
pub mod entry {
    /// Directory holding service provider descriptors
    pub const SERVICES_DIR: &str = "META-INF/services/";

    /// Root of the per-release class trees in a multi-release jar
    pub const VERSIONS_DIR: &str = "META-INF/versions/";

    /// Class file extension
    pub const CLASS_EXT: &str = ".class";

    /// Extensions treated as text when rewriting references
    pub const TEXT_EXTS: &[&str] = &[
        ".properties",
        ".yml",
        ".yaml",
        ".json",
        ".xml",
        ".txt",
        ".MF",
        ".kts",
        ".conf",
    ];

    /// Whether an entry is a service provider descriptor
    pub fn is_service(path: &str) -> bool {
        path.len() > SERVICES_DIR.len() && path.starts_with(SERVICES_DIR) && !path.ends_with('/')
    }

    /// Whether an entry is a compiled class
    pub fn is_class(path: &str) -> bool {
        path.ends_with(CLASS_EXT)
    }

    /// Whether an entry's content is rewritten as text
    pub fn is_text(path: &str) -> bool {
        is_service(path) || TEXT_EXTS.iter().any(|ext| path.ends_with(ext))
    }

    /// Split `META-INF/versions/<n>/` off a multi-release entry.
    ///
    /// Returns the prefix (empty for ordinary entries) and the path below it.
    pub fn split_versioned(path: &str) -> (&str, &str) {
        let Some(rest) = path.strip_prefix(VERSIONS_DIR) else {
            return ("", path);
        };
        match rest.split_once('/') {
            Some((release, name))
                if !release.is_empty() && release.bytes().all(|b| b.is_ascii_digit()) =>
            {
                path.split_at(path.len() - name.len())
            }
            _ => ("", path),
        }
    }

    /// Normalize a filesystem-relative path into an archive entry path
    pub fn normalize(path: &str) -> String {
        let forward = path.replace('\\', "/");
        forward.trim_start_matches("./").trim_start_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_detection() {
        assert!(entry::is_service("META-INF/services/org.example.Api"));
        assert!(!entry::is_service("META-INF/services/"));
        assert!(!entry::is_service("META-INF/MANIFEST.MF"));
    }

    #[test]
    fn test_text_detection() {
        assert!(entry::is_text("plugin.yml"));
        assert!(entry::is_text("META-INF/MANIFEST.MF"));
        assert!(entry::is_text("META-INF/services/a.b.Api"));
        assert!(!entry::is_text("a/b/C.class"));
        assert!(!entry::is_text("icon.png"));
    }

    #[test]
    fn test_split_versioned() {
        assert_eq!(
            entry::split_versioned("META-INF/versions/11/a/b/C.class"),
            ("META-INF/versions/11/", "a/b/C.class")
        );
        assert_eq!(entry::split_versioned("a/b/C.class"), ("", "a/b/C.class"));
        assert_eq!(
            entry::split_versioned("META-INF/versions/latest/a.txt"),
            ("", "META-INF/versions/latest/a.txt")
        );
        assert_eq!(
            entry::split_versioned("META-INF/versions/9"),
            ("", "META-INF/versions/9")
        );
    }

    #[test]
    fn test_normalize_entry_paths() {
        assert_eq!(entry::normalize("./a/b/C.class"), "a/b/C.class");
        assert_eq!(entry::normalize("a\\b\\C.class"), "a/b/C.class");
        assert_eq!(entry::normalize("/plugin.yml"), "plugin.yml");
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(
            repository::expand_home("libs/repo"),
            std::path::PathBuf::from("libs/repo")
        );
    }
}

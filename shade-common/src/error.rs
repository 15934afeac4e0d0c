//! Error types for the packaging pipeline
//!
//! Every failure the packager can report is a variant here, so callers can
//! tell a stale config from a broken archive without string matching.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShadeError>;

#[derive(Error, Debug)]
pub enum ShadeError {
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    ConfigInvalid(String),

    #[error("Invalid dependency coordinate '{coordinate}': {reason}")]
    InvalidCoordinate { coordinate: String, reason: String },

    #[error(
        "Unresolvable dependency {coordinate}\n\
         Searched:\n{searched}"
    )]
    UnresolvedDependency { coordinate: String, searched: String },

    #[error("Invalid relocation rule '{from}' -> '{to}': {reason}")]
    InvalidRelocation {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("Input not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Unsupported archive format: {0}")]
    UnsupportedArchive(PathBuf),

    #[error("Failed to read archive {path}: {reason}")]
    ArchiveRead { path: PathBuf, reason: String },

    #[error("Failed to write archive {path}: {reason}")]
    ArchiveWrite { path: PathBuf, reason: String },

    #[error("Malformed class file {entry}: {reason}")]
    MalformedClass { entry: String, reason: String },

    #[error(
        "Duplicate entry '{entry}' in {first} and {second}\n\
         Set a duplicate policy (last-wins or first-wins) to resolve it"
    )]
    DuplicateEntry {
        entry: String,
        first: String,
        second: String,
    },

    #[error("Dangling reference after relocation: {entry} references {reference}, which is not in the artifact")]
    DanglingReference { entry: String, reference: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ShadeError {
    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn archive_read(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::ArchiveRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn archive_write(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::ArchiveWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangling_reference_message_names_both_sides() {
        let err = ShadeError::DanglingReference {
            entry: "x/y/C.class".to_string(),
            reference: "x/y/D".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("x/y/C.class"));
        assert!(msg.contains("x/y/D"));
    }

    #[test]
    fn test_duplicate_entry_message_suggests_policy() {
        let err = ShadeError::DuplicateEntry {
            entry: "a/b/C.class".to_string(),
            first: "one.jar".to_string(),
            second: "two.jar".to_string(),
        };
        assert!(err.to_string().contains("last-wins"));
    }
}

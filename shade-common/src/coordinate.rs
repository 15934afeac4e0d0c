//! Dependency coordinates and scopes

use crate::error::{Result, ShadeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A library identified as `group:artifact:version[:classifier]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
}

impl Coordinate {
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
            classifier: None,
        }
    }

    /// File name of the archive in a Maven-layout repository
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!("{}-{}-{}.jar", self.artifact, self.version, classifier),
            None => format!("{}-{}.jar", self.artifact, self.version),
        }
    }

    /// Path of the archive relative to a Maven-layout repository root
    pub fn repository_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for part in self.group.split('.') {
            path.push(part);
        }
        path.push(&self.artifact);
        path.push(&self.version);
        path.push(self.file_name());
        path
    }
}

impl FromStr for Coordinate {
    type Err = ShadeError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| ShadeError::InvalidCoordinate {
            coordinate: s.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() < 3 {
            return Err(invalid("expected group:artifact:version"));
        }
        if parts.len() > 4 {
            return Err(invalid("too many ':' separated parts"));
        }
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid("empty part"));
        }

        Ok(Self {
            group: parts[0].to_string(),
            artifact: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier: parts.get(3).map(|c| c.to_string()),
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        Ok(())
    }
}

/// How a dependency takes part in the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Needed to compile, provided by the host at runtime. Never packaged.
    CompileOnly,
    /// Merged into the artifact
    #[default]
    #[serde(alias = "bundled")]
    Implementation,
}

impl Scope {
    pub fn is_bundled(self) -> bool {
        matches!(self, Scope::Implementation)
    }
}

/// A declared dependency, parsed and ready to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub coordinate: Coordinate,
    pub scope: Scope,
    /// Explicit archive location, bypassing repository lookup
    pub path: Option<PathBuf>,
}

impl Dependency {
    pub fn new(coordinate: Coordinate, scope: Scope) -> Self {
        Self {
            coordinate,
            scope,
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinate() {
        let coord: Coordinate = "org.bstats:bstats-bukkit:3.1.0".parse().unwrap();
        assert_eq!(coord.group, "org.bstats");
        assert_eq!(coord.artifact, "bstats-bukkit");
        assert_eq!(coord.version, "3.1.0");
        assert!(coord.classifier.is_none());
        assert_eq!(coord.to_string(), "org.bstats:bstats-bukkit:3.1.0");
    }

    #[test]
    fn test_parse_coordinate_with_classifier() {
        let coord: Coordinate = "com.example:lib:1.0:all".parse().unwrap();
        assert_eq!(coord.classifier.as_deref(), Some("all"));
        assert_eq!(coord.file_name(), "lib-1.0-all.jar");
    }

    #[test]
    fn test_reject_missing_version() {
        let err = "org.bstats:bstats-bukkit".parse::<Coordinate>().unwrap_err();
        assert!(matches!(err, ShadeError::InvalidCoordinate { .. }));
        assert!("a::1.0".parse::<Coordinate>().is_err());
    }

    #[test]
    fn test_repository_path() {
        let coord = Coordinate::new("org.java-websocket", "Java-WebSocket", "1.6.0");
        assert_eq!(
            coord.repository_path(),
            PathBuf::from("org/java-websocket/Java-WebSocket/1.6.0/Java-WebSocket-1.6.0.jar")
        );
    }

    #[test]
    fn test_scope_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            scope: Scope,
        }
        let w: Wrapper = toml::from_str("scope = \"compile-only\"").unwrap();
        assert_eq!(w.scope, Scope::CompileOnly);
        let w: Wrapper = toml::from_str("scope = \"bundled\"").unwrap();
        assert!(w.scope.is_bundled());
    }
}

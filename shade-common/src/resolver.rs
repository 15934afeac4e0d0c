//! Dependency resolution against local repositories
//!
//! Only bundled dependencies are resolved. Every one of them must resolve
//! before packaging starts; compile-only dependencies are never looked up.

use crate::coordinate::{Coordinate, Dependency};
use crate::error::{Result, ShadeError};
use std::path::PathBuf;

/// A bundled dependency with its archive on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub coordinate: Coordinate,
    pub path: PathBuf,
}

/// Looks up coordinates in Maven-layout directories
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    repositories: Vec<PathBuf>,
}

impl Resolver {
    pub fn new(repositories: Vec<PathBuf>) -> Self {
        Self { repositories }
    }

    /// Locate the archive for one dependency
    pub fn resolve(&self, dependency: &Dependency) -> Result<PathBuf> {
        let candidates: Vec<PathBuf> = match &dependency.path {
            Some(path) => vec![path.clone()],
            None => {
                let relative = dependency.coordinate.repository_path();
                self.repositories.iter().map(|repo| repo.join(&relative)).collect()
            }
        };

        if let Some(found) = candidates.iter().find(|p| p.is_file()) {
            tracing::debug!("Resolved {} -> {}", dependency.coordinate, found.display());
            return Ok(found.clone());
        }

        let searched = if candidates.is_empty() {
            "  (no repositories configured)".to_string()
        } else {
            candidates
                .iter()
                .map(|p| format!("  - {}", p.display()))
                .collect::<Vec<_>>()
                .join("\n")
        };
        Err(ShadeError::UnresolvedDependency {
            coordinate: dependency.coordinate.to_string(),
            searched,
        })
    }

    /// Resolve every bundled dependency, in declaration order
    pub fn resolve_bundled(&self, dependencies: &[Dependency]) -> Result<Vec<ResolvedDependency>> {
        let mut resolved = Vec::new();
        for dependency in dependencies {
            if !dependency.scope.is_bundled() {
                tracing::debug!("Skipping compile-only dependency {}", dependency.coordinate);
                continue;
            }
            resolved.push(ResolvedDependency {
                coordinate: dependency.coordinate.clone(),
                path: self.resolve(dependency)?,
            });
        }
        Ok(resolved)
    }
}

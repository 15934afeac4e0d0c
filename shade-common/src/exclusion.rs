//! Exclusion rules - glob patterns whose matching entries are dropped

use crate::error::{Result, ShadeError};
use wax::{CandidatePath, Glob, Pattern};

/// Compile a glob pattern for matching archive entry paths
pub fn compile_glob(pattern: &str) -> Result<Glob<'static>> {
    Glob::new(pattern)
        .map(Glob::into_owned)
        .map_err(|e| ShadeError::InvalidGlob {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Whether a compiled glob matches an entry path
pub fn glob_matches(glob: &Glob<'static>, path: &str) -> bool {
    glob.is_match(CandidatePath::from(path))
}

/// A single exclusion pattern
#[derive(Debug, Clone)]
pub struct ExclusionRule {
    pattern: String,
    glob: Glob<'static>,
}

impl ExclusionRule {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: pattern.to_string(),
            glob: compile_glob(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, path: &str) -> bool {
        glob_matches(&self.glob, path)
    }
}

/// Ordered set of exclusion rules
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    rules: Vec<ExclusionRule>,
}

impl ExclusionSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let rules = patterns
            .iter()
            .map(|p| ExclusionRule::new(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    /// Index of the first rule matching `path`, if any
    pub fn find(&self, path: &str) -> Option<usize> {
        self.rules.iter().position(|rule| rule.matches(path))
    }
}

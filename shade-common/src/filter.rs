//! Resource filtering - `${name}` placeholder expansion
//!
//! Used for plain-text resources (plugin descriptors) and for the artifact
//! name template. Unknown placeholders are left as they are.

use crate::error::Result;
use crate::exclusion::{compile_glob, glob_matches};
use std::borrow::Cow;
use std::collections::BTreeMap;
use wax::Glob;

/// Placeholder name to value
pub type Properties = BTreeMap<String, String>;

/// Replace every `${name}` whose name is in `props`
pub fn expand(input: &str, props: &Properties) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match props.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        tracing::debug!("Leaving unknown placeholder ${{{}}}", name);
                        out.push_str(&rest[start..start + 2 + end + 1]);
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Applies placeholder expansion to resources matching a set of globs
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    globs: Vec<Glob<'static>>,
    props: Properties,
}

impl ResourceFilter {
    pub fn new(patterns: &[String], props: Properties) -> Result<Self> {
        let globs = patterns
            .iter()
            .map(|p| compile_glob(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { globs, props })
    }

    pub fn applies_to(&self, path: &str) -> bool {
        if self.globs.iter().any(|g| glob_matches(g, path)) {
            return true;
        }
        // Patterns without a directory match by file name, like processResources
        let file_name = path.rsplit('/').next().unwrap_or(path);
        file_name != path && self.globs.iter().any(|g| glob_matches(g, file_name))
    }

    /// Filter one resource. Non UTF-8 content is passed through unchanged.
    pub fn apply<'a>(&self, path: &str, data: &'a [u8]) -> Cow<'a, [u8]> {
        if !self.applies_to(path) {
            return Cow::Borrowed(data);
        }
        match std::str::from_utf8(data) {
            Ok(text) => Cow::Owned(expand(text, &self.props).into_bytes()),
            Err(_) => {
                tracing::warn!("Skipping filtering of {}: not valid UTF-8", path);
                Cow::Borrowed(data)
            }
        }
    }
}

//! Relocation rules and the namespace rewriter
//!
//! A rule maps a dotted source prefix (`org.bstats`) to a destination prefix
//! (`org.crashvibe.libs.bstats`). Both spellings of a name are rewritten:
//! the dotted form used in strings and text resources, and the internal
//! slash form (`org/bstats/Metrics`) used in class files and entry paths.
//!
//! Prefixes match on package boundaries only: `org.bstats` relocates
//! `org.bstats.Metrics` but never `org.bstatsx.Metrics`.

use crate::error::{Result, ShadeError};
use crate::exclusion::{compile_glob, glob_matches};
use crate::paths::entry;
use serde::{Deserialize, Serialize};
use wax::Glob;

/// A relocation rule as written in the build file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationSpec {
    pub from: String,
    pub to: String,
    /// Dotted class-name globs left untouched (`org.bstats.Keep*`)
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl RelocationSpec {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            excludes: Vec::new(),
        }
    }

    /// Parse the `from=to` form used on the command line
    pub fn parse_pair(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((from, to)) => Ok(Self::new(from.trim(), to.trim())),
            None => Err(ShadeError::InvalidRelocation {
                from: s.to_string(),
                to: String::new(),
                reason: "expected from=to".to_string(),
            }),
        }
    }
}

/// Which spelling of a name a match was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Dotted,
    Slashed,
}

impl Form {
    fn separator(self) -> u8 {
        match self {
            Form::Dotted => b'.',
            Form::Slashed => b'/',
        }
    }
}

/// A validated rule with both spellings precomputed
#[derive(Debug, Clone)]
pub struct RelocationRule {
    from: String,
    to: String,
    from_path: String,
    to_path: String,
    excludes: Vec<Glob<'static>>,
}

impl RelocationRule {
    pub fn new(spec: &RelocationSpec) -> Result<Self> {
        let from = spec.from.trim().trim_end_matches('.').to_string();
        let to = spec.to.trim().trim_end_matches('.').to_string();
        let invalid = |reason: &str| ShadeError::InvalidRelocation {
            from: spec.from.clone(),
            to: spec.to.clone(),
            reason: reason.to_string(),
        };

        if !is_package_name(&from) {
            return Err(invalid("source is not a dotted package name"));
        }
        if !is_package_name(&to) {
            return Err(invalid("destination is not a dotted package name"));
        }
        if from == to {
            return Err(invalid("source and destination are the same"));
        }
        if to.starts_with(&format!("{}.", from)) {
            return Err(invalid("destination is inside the source namespace"));
        }

        let excludes = spec
            .excludes
            .iter()
            .map(|pattern| compile_glob(&pattern.replace('.', "/")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            from_path: from.replace('.', "/"),
            to_path: to.replace('.', "/"),
            from,
            to,
            excludes,
        })
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    /// Destination prefix in internal (slash) form
    pub fn to_path(&self) -> &str {
        &self.to_path
    }

    fn source(&self, form: Form) -> &str {
        match form {
            Form::Dotted => &self.from,
            Form::Slashed => &self.from_path,
        }
    }

    fn target(&self, form: Form) -> &str {
        match form {
            Form::Dotted => &self.to,
            Form::Slashed => &self.to_path,
        }
    }

    fn is_excluded(&self, internal_name: &str) -> bool {
        self.excludes.iter().any(|g| glob_matches(g, internal_name))
    }
}

/// One occurrence of a source prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub rule: usize,
    pub start: usize,
    pub len: usize,
    pub form: Form,
}

/// Applies a set of relocation rules
#[derive(Debug, Clone, Default)]
pub struct Relocator {
    rules: Vec<RelocationRule>,
    /// Rule indices, longest source prefix first
    order: Vec<usize>,
}

impl Relocator {
    pub fn new(specs: &[RelocationSpec]) -> Result<Self> {
        let rules = specs
            .iter()
            .map(RelocationRule::new)
            .collect::<Result<Vec<_>>>()?;

        let mut order: Vec<usize> = (0..rules.len()).collect();
        order.sort_by(|&a, &b| rules[b].from.len().cmp(&rules[a].from.len()).then(a.cmp(&b)));

        Ok(Self { rules, order })
    }

    /// Rules that only find source prefixes, for checking finished artifacts
    pub fn detector(prefixes: &[String]) -> Result<Self> {
        let mut rules = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            let from = prefix.trim().trim_end_matches('.').to_string();
            if !is_package_name(&from) {
                return Err(ShadeError::InvalidRelocation {
                    from: prefix.clone(),
                    to: String::new(),
                    reason: "source is not a dotted package name".to_string(),
                });
            }
            rules.push(RelocationRule {
                from_path: from.replace('.', "/"),
                to_path: from.replace('.', "/"),
                to: from.clone(),
                from,
                excludes: Vec::new(),
            });
        }

        let mut order: Vec<usize> = (0..rules.len()).collect();
        order.sort_by(|&a, &b| rules[b].from.len().cmp(&rules[a].from.len()).then(a.cmp(&b)));
        Ok(Self { rules, order })
    }

    pub fn rules(&self) -> &[RelocationRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the next source-prefix occurrence at or after `offset`
    pub fn next_match(&self, data: &[u8], offset: usize, forms: &[Form]) -> Option<Match> {
        (offset..data.len()).find_map(|i| self.match_at(data, i, forms))
    }

    fn match_at(&self, data: &[u8], i: usize, forms: &[Form]) -> Option<Match> {
        let boundary = at_boundary(data, i);
        let rooted = at_resource_root(data, i);
        if !boundary && !rooted {
            return None;
        }
        for &rule_idx in &self.order {
            let rule = &self.rules[rule_idx];
            for &form in forms {
                if !boundary && form != Form::Slashed {
                    continue;
                }
                let source = rule.source(form).as_bytes();
                if !data[i..].starts_with(source) {
                    continue;
                }
                let end = i + source.len();
                if end < data.len() && data[end] != form.separator() {
                    continue;
                }
                if !rule.excludes.is_empty() {
                    let name = name_at(data, i, form);
                    if rule.is_excluded(&name) {
                        continue;
                    }
                }
                return Some(Match {
                    rule: rule_idx,
                    start: i,
                    len: source.len(),
                    form,
                });
            }
        }
        None
    }

    /// Rewrite every occurrence in `data`. Returns `None` when nothing matched.
    ///
    /// `hits[rule]` is incremented once per rewritten occurrence.
    pub fn rewrite(&self, data: &[u8], forms: &[Form], hits: &mut [usize]) -> Option<Vec<u8>> {
        let mut out: Option<Vec<u8>> = None;
        let mut copied = 0;
        let mut cursor = 0;

        while let Some(m) = self.next_match(data, cursor, forms) {
            let buf = out.get_or_insert_with(|| Vec::with_capacity(data.len() + 32));
            buf.extend_from_slice(&data[copied..m.start]);
            buf.extend_from_slice(self.rules[m.rule].target(m.form).as_bytes());
            if let Some(count) = hits.get_mut(m.rule) {
                *count += 1;
            }
            copied = m.start + m.len;
            cursor = copied;
        }

        out.map(|mut buf| {
            buf.extend_from_slice(&data[copied..]);
            buf
        })
    }

    /// Relocate an archive entry path. Returns `None` when the path is unaffected.
    ///
    /// Service descriptors are renamed by their dotted file name, and
    /// multi-release entries by the path below `META-INF/versions/<n>/`.
    pub fn relocate_path(&self, path: &str, hits: &mut [usize]) -> Option<String> {
        let (dir, name, form) = path_parts(path);
        self.rewrite(name.as_bytes(), &[form], hits)
            .and_then(|name| String::from_utf8(name).ok())
            .map(|name| format!("{}{}", dir, name))
    }

    /// Source-prefix names in an entry path, read the way `relocate_path` reads it
    pub fn find_path_references(&self, path: &str) -> Vec<String> {
        let (_, name, form) = path_parts(path);
        self.find_references(name.as_bytes(), &[form])
    }

    /// Relocate a dotted or internal class name
    pub fn relocate_class_name(&self, name: &str) -> String {
        let mut hits = vec![0; self.rules.len()];
        self.rewrite(name.as_bytes(), &[Form::Dotted, Form::Slashed], &mut hits)
            .and_then(|n| String::from_utf8(n).ok())
            .unwrap_or_else(|| name.to_string())
    }

    /// Whether an internal class name lives under any destination prefix
    pub fn is_relocated_name(&self, internal_name: &str) -> bool {
        self.rules.iter().any(|rule| {
            internal_name
                .strip_prefix(rule.to_path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Every occurrence of a source prefix left in `data`, as readable names
    pub fn find_source_references(&self, data: &[u8]) -> Vec<String> {
        self.find_references(data, &[Form::Dotted, Form::Slashed])
    }

    fn find_references(&self, data: &[u8], forms: &[Form]) -> Vec<String> {
        let mut found = Vec::new();
        let mut cursor = 0;
        while let Some(m) = self.next_match(data, cursor, forms) {
            found.push(name_at(data, m.start, m.form));
            cursor = m.start + m.len;
        }
        found
    }
}

/// Split an entry path into the untouched prefix, the relocatable name and its form
fn path_parts(path: &str) -> (&str, &str, Form) {
    let (versions, rest) = entry::split_versioned(path);
    if entry::is_service(rest) {
        let (dir, name) = path.split_at(versions.len() + entry::SERVICES_DIR.len());
        return (dir, name, Form::Dotted);
    }
    (versions, rest, Form::Slashed)
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_delimiter(b: u8) -> bool {
    !is_ident_byte(b) && b != b'.' && b != b'/'
}

/// A name may start at `i` if nothing name-like precedes it.
///
/// Descriptors put an `L` (optionally after primitive type letters) right
/// before an internal name, as in `(ILorg/bstats/Metrics;)V`.
fn at_boundary(data: &[u8], i: usize) -> bool {
    if i == 0 {
        return true;
    }
    let prev = data[i - 1];
    if is_delimiter(prev) {
        return true;
    }
    if prev == b'L' {
        let mut j = i - 1;
        while j > 0 && b"BCDFIJSZV".contains(&data[j - 1]) {
            j -= 1;
        }
        return j == 0 || is_delimiter(data[j - 1]);
    }
    false
}

/// An absolute resource path (`/org/bstats/config.yml`) names a package
/// directory right after its single leading `/`.
fn at_resource_root(data: &[u8], i: usize) -> bool {
    match i {
        0 => false,
        1 => data[0] == b'/',
        _ => data[i - 1] == b'/' && is_delimiter(data[i - 2]),
    }
}

/// The full class name starting at `start`, in internal form
fn name_at(data: &[u8], start: usize, form: Form) -> String {
    let sep = form.separator();
    let end = data[start..]
        .iter()
        .position(|&b| !(is_ident_byte(b) || b == sep))
        .map(|n| start + n)
        .unwrap_or(data.len());
    let name = String::from_utf8_lossy(&data[start..end]).into_owned();
    let name = name.trim_end_matches(sep as char);
    match form {
        Form::Dotted => name.replace('.', "/"),
        Form::Slashed => name.to_string(),
    }
}

fn is_package_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        })
}

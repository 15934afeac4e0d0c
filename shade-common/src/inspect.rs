//! Reading finished artifacts back: entry listings and leftover checks

use crate::archive::ArchiveSource;
use crate::classfile::ClassFile;
use crate::error::Result;
use crate::packager::calculate_sha256;
use crate::paths::entry;
use crate::relocation::Relocator;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub path: String,
    pub size: u64,
    /// Class file major version, for `.class` entries that parse
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_version: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
    pub entries: Vec<EntryInfo>,
}

impl ArtifactSummary {
    pub fn classes(&self) -> usize {
        self.entries.iter().filter(|e| entry::is_class(&e.path)).count()
    }

    /// Highest class file major version in the artifact
    pub fn newest_class_version(&self) -> Option<u16> {
        self.entries.iter().filter_map(|e| e.class_version).max()
    }
}

/// List every entry of an artifact, in stored order
pub fn inspect(artifact: &Path) -> Result<ArtifactSummary> {
    let bytes = std::fs::read(artifact).map_err(|e| crate::error::ShadeError::io(artifact, e))?;
    let source = ArchiveSource::open(artifact.display().to_string(), artifact)?;

    let entries = source
        .read_entries()?
        .into_iter()
        .map(|e| EntryInfo {
            class_version: entry::is_class(&e.path)
                .then(|| ClassFile::parse(&e.path, &e.data).ok().map(|c| c.major_version()))
                .flatten(),
            size: e.data.len() as u64,
            path: e.path,
        })
        .collect();

    Ok(ArtifactSummary {
        path: artifact.to_path_buf(),
        size: bytes.len() as u64,
        sha256: calculate_sha256(&bytes),
        entries,
    })
}

/// A source-prefix name still present in a relocated artifact
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Leftover {
    pub entry: String,
    /// Internal form, e.g. `org/bstats/Metrics`
    pub reference: String,
}

/// Find every entry path or reference that still lives under a source prefix.
///
/// Classes are checked constant by constant, text entries byte by byte;
/// other binary content is only checked by path.
pub fn find_leftovers(artifact: &Path, relocator: &Relocator) -> Result<Vec<Leftover>> {
    let source = ArchiveSource::open(artifact.display().to_string(), artifact)?;
    let mut found = BTreeSet::new();

    for e in source.read_entries()? {
        for reference in relocator.find_path_references(&e.path) {
            found.insert(Leftover {
                entry: e.path.clone(),
                reference,
            });
        }

        let references = if entry::is_class(&e.path) {
            let class = ClassFile::parse(&e.path, &e.data)?;
            class
                .utf8_constants()
                .flat_map(|constant| relocator.find_source_references(constant))
                .collect()
        } else if entry::is_text(&e.path) {
            relocator.find_source_references(&e.data)
        } else {
            Vec::new()
        };

        for reference in references {
            found.insert(Leftover {
                entry: e.path.clone(),
                reference,
            });
        }
    }

    Ok(found.into_iter().collect())
}

//! Relocating Packager - merges ordered inputs into one shaded jar
//!
//! Single pass over the inputs, in order:
//! 1. drop entries matching an exclusion rule
//! 2. relocate the entry path
//! 3. filter resources, then rewrite class and text content
//! 4. merge into the output set under the duplicate policy
//!
//! After the pass every relocated class reference is checked against the
//! merged entry set, then the jar is written in first-seen entry order.

use crate::archive::{self, ArchiveSource, Entry};
use crate::classfile::{self, ClassFile};
use crate::error::{Result, ShadeError};
use crate::exclusion::ExclusionSet;
use crate::filter::{self, Properties, ResourceFilter};
use crate::paths::{build, entry};
use crate::relocation::{Form, RelocationSpec, Relocator};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What to do when two inputs carry different content for the same path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    #[default]
    Fail,
    LastWins,
    FirstWins,
}

impl FromStr for DuplicatePolicy {
    type Err = ShadeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fail" => Ok(Self::Fail),
            "last-wins" => Ok(Self::LastWins),
            "first-wins" => Ok(Self::FirstWins),
            other => Err(ShadeError::ConfigInvalid(format!(
                "Unknown duplicate policy '{}' (expected fail, last-wins or first-wins)",
                other
            ))),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fail => "fail",
            Self::LastWins => "last-wins",
            Self::FirstWins => "first-wins",
        })
    }
}

/// Everything the packager needs besides its inputs
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    pub relocations: Vec<RelocationSpec>,
    pub exclusions: Vec<String>,
    pub duplicates: DuplicatePolicy,
    /// Resource globs to run placeholder expansion on
    pub expand: Vec<String>,
    pub properties: Properties,
    /// Java release the artifact targets; newer classes are reported
    pub target_java: Option<u16>,
}

/// A fully resolved build: ordered inputs, options, and the artifact path
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub sources: Vec<ArchiveSource>,
    pub options: PackOptions,
    pub output: PathBuf,
}

impl BuildPlan {
    /// Run the packager for this plan
    pub fn execute(&self) -> Result<PackReport> {
        Packager::new(&self.options)?.package(&self.sources, &self.output)
    }
}

/// Resolve the artifact path from a name template like `${name}-${version}.${ext}`
pub fn artifact_path(output_dir: &Path, template: &str, props: &Properties) -> PathBuf {
    let mut props = props.clone();
    props
        .entry("ext".to_string())
        .or_insert_with(|| build::ARCHIVE_EXT.to_string());
    output_dir.join(filter::expand(template, &props))
}

/// Per-input contribution
#[derive(Debug, Clone, Serialize)]
pub struct InputSummary {
    pub label: String,
    pub path: PathBuf,
    pub entries_read: usize,
    pub entries_excluded: usize,
}

/// Per-rule match counts
#[derive(Debug, Clone, Serialize)]
pub struct RelocationSummary {
    pub from: String,
    pub to: String,
    /// Entries whose path was relocated
    pub entries: usize,
    /// References rewritten inside entry content
    pub references: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExclusionSummary {
    pub pattern: String,
    pub matched: usize,
}

/// Outcome of a successful packaging run
#[derive(Debug, Clone, Serialize)]
pub struct PackReport {
    pub output: PathBuf,
    pub entries: usize,
    pub size: u64,
    pub sha256: String,
    pub inputs: Vec<InputSummary>,
    pub relocations: Vec<RelocationSummary>,
    pub exclusions: Vec<ExclusionSummary>,
    pub duplicates_resolved: usize,
    pub services_merged: usize,
    pub warnings: Vec<String>,
}

impl PackReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Entries merged in memory, ready to be written
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub entries: Vec<Entry>,
    pub inputs: Vec<InputSummary>,
    pub relocations: Vec<RelocationSummary>,
    pub exclusions: Vec<ExclusionSummary>,
    pub duplicates_resolved: usize,
    pub services_merged: usize,
    pub warnings: Vec<String>,
}

struct Merged {
    entry: Entry,
    origin: usize,
}

/// Tracks the newest class file version seen per input
#[derive(Default)]
struct VersionCheck {
    newest: u16,
    offending: usize,
    example: Option<String>,
}

pub struct Packager {
    relocator: Relocator,
    exclusions: ExclusionSet,
    filter: ResourceFilter,
    duplicates: DuplicatePolicy,
    target_java: Option<u16>,
}

impl Packager {
    pub fn new(options: &PackOptions) -> Result<Self> {
        Ok(Self {
            relocator: Relocator::new(&options.relocations)?,
            exclusions: ExclusionSet::new(&options.exclusions)?,
            filter: ResourceFilter::new(&options.expand, options.properties.clone())?,
            duplicates: options.duplicates,
            target_java: options.target_java,
        })
    }

    /// Merge and write the artifact to `output`, replacing any previous one
    pub fn package(&self, sources: &[ArchiveSource], output: &Path) -> Result<PackReport> {
        let merged = self.merge(sources)?;

        tracing::info!("Writing {} entries to {}", merged.entries.len(), output.display());
        archive::write_jar(output, &merged.entries)?;

        let bytes = std::fs::read(output).map_err(|e| ShadeError::io(output, e))?;
        let sha256 = calculate_sha256(&bytes);

        Ok(PackReport {
            output: output.to_path_buf(),
            entries: merged.entries.len(),
            size: bytes.len() as u64,
            sha256,
            inputs: merged.inputs,
            relocations: merged.relocations,
            exclusions: merged.exclusions,
            duplicates_resolved: merged.duplicates_resolved,
            services_merged: merged.services_merged,
            warnings: merged.warnings,
        })
    }

    /// Merge all inputs in memory without writing anything
    pub fn merge(&self, sources: &[ArchiveSource]) -> Result<MergeResult> {
        let rule_count = self.relocator.rules().len();
        let mut path_hits = vec![0usize; rule_count];
        let mut ref_hits = vec![0usize; rule_count];
        let mut exclusion_hits = vec![0usize; self.exclusions.rules().len()];

        let mut merged: Vec<Merged> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut inputs = Vec::with_capacity(sources.len());
        let mut warnings = Vec::new();
        let mut duplicates_resolved = 0;
        let mut services_merged = 0;

        for (origin, source) in sources.iter().enumerate() {
            tracing::info!("Merging {} ({})", source.label, source.path.display());
            let entries = source.read_entries()?;
            let mut summary = InputSummary {
                label: source.label.clone(),
                path: source.path.clone(),
                entries_read: entries.len(),
                entries_excluded: 0,
            };
            let mut versions = VersionCheck::default();

            for Entry { path, data } in entries {
                if let Some(rule) = self.exclusions.find(&path) {
                    tracing::debug!("Excluding {} from {}", path, source.label);
                    exclusion_hits[rule] += 1;
                    summary.entries_excluded += 1;
                    continue;
                }

                let data = if source.filtered {
                    self.filter.apply(&path, &data).into_owned()
                } else {
                    data
                };

                let path = match self.relocator.relocate_path(&path, &mut path_hits) {
                    Some(relocated) => {
                        if let Some(rule) = self.exclusions.find(&relocated) {
                            exclusion_hits[rule] += 1;
                            summary.entries_excluded += 1;
                            continue;
                        }
                        relocated
                    }
                    None => path,
                };

                let data = self.rewrite_content(&path, data, &mut ref_hits, &mut versions)?;
                let incoming = Entry { path, data };

                match index.get(&incoming.path) {
                    None => {
                        index.insert(incoming.path.clone(), merged.len());
                        merged.push(Merged {
                            entry: incoming,
                            origin,
                        });
                    }
                    Some(&i) => {
                        let existing = &mut merged[i];
                        if existing.entry.data == incoming.data {
                            tracing::debug!("Identical duplicate {} skipped", incoming.path);
                            continue;
                        }
                        if entry::is_service(&incoming.path) {
                            existing.entry.data = merge_service_lines(&existing.entry.data, &incoming.data);
                            services_merged += 1;
                            continue;
                        }

                        let first = &sources[existing.origin].label;
                        match self.duplicates {
                            DuplicatePolicy::Fail => {
                                return Err(ShadeError::DuplicateEntry {
                                    entry: incoming.path,
                                    first: first.clone(),
                                    second: source.label.clone(),
                                });
                            }
                            DuplicatePolicy::LastWins => {
                                let msg = format!(
                                    "Duplicate {}: {} replaces {}",
                                    incoming.path, source.label, first
                                );
                                tracing::warn!("{}", msg);
                                warnings.push(msg);
                                existing.entry.data = incoming.data;
                                existing.origin = origin;
                            }
                            DuplicatePolicy::FirstWins => {
                                let msg = format!(
                                    "Duplicate {}: keeping {}, ignoring {}",
                                    incoming.path, first, source.label
                                );
                                tracing::warn!("{}", msg);
                                warnings.push(msg);
                            }
                        }
                        duplicates_resolved += 1;
                    }
                }
            }

            if let (Some(target), Some(example)) = (self.target_java, versions.example) {
                let msg = format!(
                    "{} has {} class(es) newer than Java {} (class version {}, e.g. {})",
                    source.label,
                    versions.offending,
                    target,
                    versions.newest,
                    example
                );
                tracing::warn!("{}", msg);
                warnings.push(msg);
            }
            inputs.push(summary);
        }

        let entries: Vec<Entry> = merged.into_iter().map(|m| m.entry).collect();
        self.check_dangling_references(&entries)?;

        let relocations: Vec<RelocationSummary> = self
            .relocator
            .rules()
            .iter()
            .enumerate()
            .map(|(i, rule)| RelocationSummary {
                from: rule.from().to_string(),
                to: rule.to().to_string(),
                entries: path_hits[i],
                references: ref_hits[i],
            })
            .collect();
        for summary in relocations.iter().filter(|s| s.entries == 0) {
            let msg = format!(
                "Relocation rule '{}' -> '{}' matched no entries",
                summary.from, summary.to
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
        }

        let exclusions: Vec<ExclusionSummary> = self
            .exclusions
            .rules()
            .iter()
            .zip(&exclusion_hits)
            .map(|(rule, &matched)| ExclusionSummary {
                pattern: rule.pattern().to_string(),
                matched,
            })
            .collect();
        for summary in exclusions.iter().filter(|s| s.matched == 0) {
            let msg = format!("Exclusion pattern '{}' matched no entries", summary.pattern);
            tracing::warn!("{}", msg);
            warnings.push(msg);
        }

        Ok(MergeResult {
            entries,
            inputs,
            relocations,
            exclusions,
            duplicates_resolved,
            services_merged,
            warnings,
        })
    }

    fn rewrite_content(
        &self,
        path: &str,
        data: Vec<u8>,
        hits: &mut [usize],
        versions: &mut VersionCheck,
    ) -> Result<Vec<u8>> {
        if entry::is_class(path) {
            if self.relocator.is_empty() && self.target_java.is_none() {
                return Ok(data);
            }
            let class = ClassFile::parse(path, &data)?;

            if let Some(target) = self.target_java {
                let major = class.major_version();
                if major > classfile::major_for_java(target) {
                    versions.offending += 1;
                    versions.newest = versions.newest.max(major);
                    versions.example.get_or_insert_with(|| path.to_string());
                }
            }

            return Ok(class.relocate(path, &self.relocator, hits)?.unwrap_or(data));
        }

        if entry::is_text(path) {
            if let Some(rewritten) = self
                .relocator
                .rewrite(&data, &[Form::Dotted, Form::Slashed], hits)
            {
                return Ok(rewritten);
            }
        }

        Ok(data)
    }

    /// Every relocated class a class refers to must be in the artifact
    fn check_dangling_references(&self, entries: &[Entry]) -> Result<()> {
        if self.relocator.is_empty() {
            return Ok(());
        }

        let classes: HashSet<&str> = entries
            .iter()
            .filter_map(|e| entry::split_versioned(&e.path).1.strip_suffix(entry::CLASS_EXT))
            .collect();

        for e in entries.iter().filter(|e| entry::is_class(&e.path)) {
            let class = ClassFile::parse(&e.path, &e.data)?;
            if let Some(reference) = class
                .class_references()
                .into_iter()
                .find(|r| self.relocator.is_relocated_name(r) && !classes.contains(r.as_str()))
            {
                return Err(ShadeError::DanglingReference {
                    entry: e.path.clone(),
                    reference,
                });
            }
        }
        Ok(())
    }
}

/// Concatenate service descriptors, dropping repeated providers
fn merge_service_lines(existing: &[u8], incoming: &[u8]) -> Vec<u8> {
    let existing = String::from_utf8_lossy(existing);
    let incoming = String::from_utf8_lossy(incoming);

    let mut seen = HashSet::new();
    let mut out = String::new();
    for line in existing.lines().chain(incoming.lines()) {
        let line = line.trim();
        if line.is_empty() || !seen.insert(line.to_string()) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.into_bytes()
}

/// Calculate SHA256 checksum
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

//! Shade Configuration Parser
//!
//! Parses shade.toml files for declarative builds.

use crate::archive::ArchiveSource;
use crate::coordinate::{Dependency, Scope};
use crate::error::{Result, ShadeError};
use crate::exclusion::ExclusionSet;
use crate::filter::{self, Properties};
use crate::packager::{self, BuildPlan, DuplicatePolicy, PackOptions};
use crate::paths::{build, repository};
use crate::relocation::{RelocationSpec, Relocator};
use crate::resolver::Resolver;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The main configuration structure matching shade.toml
#[derive(Debug, Deserialize)]
pub struct ShadeConfig {
    pub project: ProjectConfig,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub repositories: RepositoriesConfig,
    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<DependencyConfig>,
    #[serde(default)]
    pub shadow: ShadowConfig,
}

/// Project identity, also exposed as filter properties
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    pub name: String,

    /// Group id (e.g., "org.crashvibe")
    #[serde(default)]
    pub group: String,

    pub version: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ToolchainConfig {
    /// Java release the artifact targets (e.g., 21)
    #[serde(default)]
    pub java: Option<u16>,
}

/// Build configuration
#[derive(Debug, Deserialize)]
pub struct BuildConfig {
    /// Compiled classes: a directory or a jar
    #[serde(default = "default_classes")]
    pub classes: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Artifact name template (default: ${name}-${version}-all.${ext})
    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    #[serde(default)]
    pub duplicates: DuplicatePolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            classes: default_classes(),
            output_dir: default_output_dir(),
            archive_name: default_archive_name(),
            duplicates: DuplicatePolicy::default(),
        }
    }
}

/// Resources copied into the artifact, optionally with `${...}` expansion
#[derive(Debug, Deserialize, Default)]
pub struct ResourcesConfig {
    #[serde(default)]
    pub dir: Option<String>,

    /// Globs of resources to expand
    #[serde(default)]
    pub expand: Vec<String>,

    /// Extra properties on top of name, group and version
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Deserialize)]
pub struct RepositoriesConfig {
    /// Maven-layout directories, searched in order
    #[serde(default = "default_local_repositories")]
    pub local: Vec<String>,
}

impl Default for RepositoriesConfig {
    fn default() -> Self {
        Self {
            local: default_local_repositories(),
        }
    }
}

/// One `[[dependency]]` table
#[derive(Debug, Deserialize)]
pub struct DependencyConfig {
    pub coordinate: String,
    #[serde(default)]
    pub scope: Scope,
    /// Use this archive instead of looking the coordinate up
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ShadowConfig {
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub relocate: Vec<RelocationSpec>,
}

fn default_classes() -> String {
    build::CLASSES_DIR.to_string()
}

fn default_output_dir() -> String {
    build::OUTPUT_DIR.to_string()
}

fn default_archive_name() -> String {
    build::ARCHIVE_NAME.to_string()
}

fn default_local_repositories() -> Vec<String> {
    vec![format!("~/{}", repository::MAVEN_LOCAL)]
}

impl ShadeConfig {
    /// Load configuration from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ShadeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Properties available to resource filtering and name templates
    pub fn properties(&self) -> Properties {
        let mut props = self.resources.properties.clone();
        props.insert("name".to_string(), self.project.name.clone());
        props.insert("group".to_string(), self.project.group.clone());
        props.insert("version".to_string(), self.project.version.clone());
        props
    }

    /// Relocation rules with `${...}` placeholders expanded
    pub fn relocations(&self) -> Vec<RelocationSpec> {
        let props = self.properties();
        self.shadow
            .relocate
            .iter()
            .map(|spec| RelocationSpec {
                from: filter::expand(&spec.from, &props),
                to: filter::expand(&spec.to, &props),
                excludes: spec.excludes.clone(),
            })
            .collect()
    }

    /// Parsed dependency declarations, in declaration order
    pub fn dependencies(&self, base_dir: &Path) -> Result<Vec<Dependency>> {
        self.dependencies
            .iter()
            .map(|dep| {
                Ok(Dependency {
                    coordinate: dep.coordinate.parse()?,
                    scope: dep.scope,
                    path: dep.path.as_ref().map(|p| base_dir.join(p)),
                })
            })
            .collect()
    }

    /// Get the resolved local repository paths
    pub fn repository_paths(&self, base_dir: &Path) -> Vec<PathBuf> {
        self.repositories
            .local
            .iter()
            .map(|r| base_dir.join(repository::expand_home(r)))
            .collect()
    }

    /// Get the resolved classes path
    pub fn classes_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.build.classes)
    }

    /// Get the resolved artifact path
    pub fn output_path(&self, base_dir: &Path) -> PathBuf {
        packager::artifact_path(
            &base_dir.join(&self.build.output_dir),
            &self.build.archive_name,
            &self.properties(),
        )
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.project.name.trim().is_empty() {
            return Err(ShadeError::ConfigInvalid("[project] name must not be empty".to_string()));
        }
        if self.project.version.trim().is_empty() {
            return Err(ShadeError::ConfigInvalid(
                "[project] version must not be empty".to_string(),
            ));
        }
        if self.build.archive_name.trim().is_empty() {
            return Err(ShadeError::ConfigInvalid(
                "[build] archive_name must not be empty".to_string(),
            ));
        }
        if self.toolchain.java == Some(0) {
            return Err(ShadeError::ConfigInvalid("[toolchain] java must be a release number".to_string()));
        }

        Relocator::new(&self.relocations())?;
        ExclusionSet::new(&self.shadow.exclude)?;
        for dep in &self.dependencies {
            dep.coordinate.parse::<crate::coordinate::Coordinate>()?;
        }

        Ok(())
    }

    /// Validate, resolve every bundled dependency, and lay out the inputs.
    ///
    /// Nothing is read or written here beyond existence checks, so an
    /// unresolvable dependency fails the build before packaging starts.
    pub fn plan(&self, base_dir: &Path) -> Result<BuildPlan> {
        self.validate()?;

        let resolver = Resolver::new(self.repository_paths(base_dir));
        let resolved = resolver.resolve_bundled(&self.dependencies(base_dir)?)?;

        let mut sources = vec![ArchiveSource::open("classes", self.classes_path(base_dir))?];
        if let Some(ref dir) = self.resources.dir {
            sources.push(ArchiveSource::open("resources", base_dir.join(dir))?.filtered());
        }
        for dep in resolved {
            sources.push(ArchiveSource::open(dep.coordinate.to_string(), dep.path)?);
        }

        Ok(BuildPlan {
            sources,
            options: PackOptions {
                relocations: self.relocations(),
                exclusions: self.shadow.exclude.clone(),
                duplicates: self.build.duplicates,
                expand: self.resources.expand.clone(),
                properties: self.properties(),
                target_java: self.toolchain.java,
            },
            output: self.output_path(base_dir),
        })
    }
}

/// Values filled into a generated shade.toml
#[derive(Debug, Clone)]
pub struct Template<'a> {
    pub name: &'a str,
    pub group: &'a str,
    pub version: &'a str,
    pub java: u16,
    pub classes: &'a str,
    pub resources: Option<&'a str>,
}

/// Generate a template shade.toml file
pub fn generate_template(t: &Template) -> String {
    let resources = match t.resources {
        Some(dir) => format!("dir = \"{}\"", dir),
        None => "# dir = \"src/main/resources\"".to_string(),
    };

    format!(
        r#"# Shade Build Configuration

[project]
name = "{name}"
group = "{group}"
version = "{version}"

[toolchain]
java = {java}

[build]
# Compiled classes (directory or jar)
classes = "{classes}"
output_dir = "build/libs"
archive_name = "${{name}}-${{version}}-all.${{ext}}"

# What to do when two inputs ship the same file: fail, last-wins, first-wins
duplicates = "fail"

[resources]
{resources}
# Resources whose ${{...}} placeholders are expanded
expand = []

[repositories]
local = ["~/.m2/repository"]

# Dependencies. Only the default "implementation" scope is bundled.
# [[dependency]]
# coordinate = "org.bstats:bstats-bukkit:3.1.0"
#
# [[dependency]]
# coordinate = "io.papermc.paper:paper-api:1.21.4-R0.1-SNAPSHOT"
# scope = "compile-only"

[shadow]
exclude = ["META-INF/*.SF", "META-INF/*.DSA", "META-INF/*.RSA"]

# [[shadow.relocate]]
# from = "org.bstats"
# to = "${{group}}.libs.bstats"
"#,
        name = t.name,
        group = t.group,
        version = t.version,
        java = t.java,
        classes = t.classes,
        resources = resources,
    )
}

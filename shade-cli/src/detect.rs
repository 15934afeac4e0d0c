//! Project Detection Module
//!
//! Auto-detects project metadata for `shade init` from existing JVM build files.
//! Supports: Gradle (Kotlin and Groovy DSL), Maven

use std::fs;
use std::path::Path;

/// Detected project information
#[derive(Debug, Default, Clone)]
pub struct DetectedProject {
    pub name: Option<String>,
    pub group: Option<String>,
    pub version: Option<String>,
    pub java: Option<u16>,
    pub classes: Option<String>,
    pub resources: Option<String>,
}

impl DetectedProject {
    /// Detect project info from a project directory
    pub fn detect(dir: &Path) -> Self {
        let mut detected = Self::default();

        // settings.gradle carries the real project name
        if let Some(info) = detect_from_gradle_settings(dir) {
            detected.merge(info);
        }
        if let Some(info) = detect_from_gradle_build(dir) {
            detected.merge(info);
        }
        if let Some(info) = detect_from_pom(dir) {
            detected.merge(info);
        }

        // Fallback to folder name
        if detected.name.is_none() {
            detected.name = dir
                .file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string());
        }

        if detected.classes.is_none() {
            detected.classes = ["build/classes/java/main", "build/classes/kotlin/main", "target/classes"]
                .iter()
                .find(|c| dir.join(c).is_dir())
                .map(|c| c.to_string());
        }
        if dir.join("src/main/resources").is_dir() {
            detected.resources = Some("src/main/resources".to_string());
        }

        detected
    }

    /// Merge another detection result (doesn't overwrite existing values)
    fn merge(&mut self, other: DetectedProject) {
        if self.name.is_none() { self.name = other.name; }
        if self.group.is_none() { self.group = other.group; }
        if self.version.is_none() { self.version = other.version; }
        if self.java.is_none() { self.java = other.java; }
        if self.classes.is_none() { self.classes = other.classes; }
        if self.resources.is_none() { self.resources = other.resources; }
    }
}

fn read_first(dir: &Path, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| fs::read_to_string(dir.join(name)).ok())
}

fn detect_from_gradle_settings(dir: &Path) -> Option<DetectedProject> {
    let content = read_first(dir, &["settings.gradle.kts", "settings.gradle"])?;
    let name = content
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("rootProject.name"))
        .and_then(extract_string_value)?;

    Some(DetectedProject {
        name: Some(name),
        ..Default::default()
    })
}

fn detect_from_gradle_build(dir: &Path) -> Option<DetectedProject> {
    let content = read_first(dir, &["build.gradle.kts", "build.gradle"])?;
    let mut detected = DetectedProject::default();

    for line in content.lines().map(str::trim) {
        if line.starts_with("group") && line.contains('=') {
            detected.group = detected.group.or_else(|| extract_string_value(line));
        } else if line.starts_with("version") && line.contains('=') {
            detected.version = detected.version.or_else(|| extract_string_value(line));
        } else if line.starts_with("val targetJavaVersion") || line.starts_with("def targetJavaVersion") {
            detected.java = detected.java.or_else(|| extract_string_value(line)?.parse().ok());
        } else if let Some(rest) = line.strip_prefix("jvmToolchain(") {
            detected.java = detected.java.or_else(|| rest.trim_end_matches(')').trim().parse().ok());
        }
    }

    Some(detected)
}

fn detect_from_pom(dir: &Path) -> Option<DetectedProject> {
    let content = fs::read_to_string(dir.join("pom.xml")).ok()?;

    // Project coordinates come before <parent>/<dependencies> in most poms;
    // skip the parent block so its coordinates aren't picked up.
    let body = match (content.find("<parent>"), content.find("</parent>")) {
        (Some(start), Some(end)) if start < end => {
            format!("{}{}", &content[..start], &content[end..])
        }
        _ => content.clone(),
    };

    Some(DetectedProject {
        name: xml_tag(&body, "artifactId"),
        group: xml_tag(&body, "groupId"),
        version: xml_tag(&body, "version"),
        java: xml_tag(&body, "maven.compiler.release")
            .or_else(|| xml_tag(&body, "maven.compiler.target"))
            .and_then(|v| v.parse().ok()),
        classes: dir
            .join("target/classes")
            .is_dir()
            .then(|| "target/classes".to_string()),
        resources: None,
    })
}

/// Text of the first `<tag>...</tag>`
fn xml_tag(content: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = content.find(&open)? + open.len();
    let end = content[start..].find(&close)? + start;
    let value = content[start..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Extract string value from a Gradle-style assignment
fn extract_string_value(line: &str) -> Option<String> {
    // Find the value part after =
    let (_, value) = line.split_once('=')?;
    let value = value.trim();

    // Handle quoted strings
    if value.starts_with('"') || value.starts_with('\'') {
        let quote = value.chars().next()?;
        let end = value[1..].find(quote)?;
        return Some(value[1..=end].to_string());
    }

    // Unquoted literals only, no expressions
    if !value.is_empty() && value.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '_') {
        return Some(value.to_string());
    }

    None
}

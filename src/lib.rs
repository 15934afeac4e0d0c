//! Shade Library - Relocating packager for JVM archives
//!
//! This library provides:
//! - Build configuration (shade.toml) and dependency resolution
//! - Namespace relocation of class files, resources and entry paths
//! - Deterministic jar merging with exclusion and duplicate policies
//! - Artifact inspection and leftover checks

pub use shade_common::{
    archive, classfile, config, coordinate, error, exclusion, filter, inspect, packager, paths,
    relocation, resolver,
};
pub use shade_common::{Result, ShadeError};

//! Shade Common Library
//!
//! The relocating packager and everything it needs: build configuration,
//! dependency resolution, relocation, class file rewriting and jar I/O.
//! Shared by the `shade` CLI and the flag-driven `shade-pack` binary.

pub mod archive;
pub mod classfile;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod exclusion;
pub mod filter;
pub mod inspect;
pub mod packager;
pub mod paths;
pub mod relocation;
pub mod resolver;

pub use error::{Result, ShadeError};

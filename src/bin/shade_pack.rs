//! Shade Packer - Merge archives into one relocated jar without a shade.toml
//!
//! Every input (directory, jar, or tarball) is merged in the order given:
//! ```bash
//! shade-pack --input build/classes --input libs/bstats-bukkit-3.1.0.jar \
//!     --relocate org.bstats=org.crashvibe.libs.bstats \
//!     --exclude 'META-INF/**' \
//!     --name FGateClient --version 0.0.1
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use shade::archive::ArchiveSource;
use shade::filter::Properties;
use shade::packager::{self, BuildPlan, DuplicatePolicy, PackOptions};
use shade::paths::build;
use shade::relocation::RelocationSpec;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Shade Packer - Merge and relocate JVM archives
#[derive(Parser, Debug)]
#[command(name = "shade-pack")]
#[command(about = "Merge directories and jars into one shaded jar")]
struct Args {
    /// Input directory, jar, or tarball; merged in the order given
    #[arg(long, short, required = true)]
    input: Vec<PathBuf>,

    /// Relocation rule as from=to (e.g., org.bstats=com.example.libs.bstats)
    #[arg(long, value_parser = RelocationSpec::parse_pair)]
    relocate: Vec<RelocationSpec>,

    /// Glob of entries to leave out (e.g., 'META-INF/**')
    #[arg(long)]
    exclude: Vec<String>,

    /// Directory the artifact is written to
    #[arg(long, default_value = build::OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Project name, available as ${name}
    #[arg(long)]
    name: String,

    /// Project version, available as ${version}
    #[arg(long)]
    version: String,

    /// Project group, available as ${group}
    #[arg(long, default_value = "")]
    group: String,

    /// Artifact name template
    #[arg(long, default_value = build::ARCHIVE_NAME)]
    archive_name: String,

    /// What to do with conflicting entries: fail, last-wins, first-wins
    #[arg(long, default_value_t = DuplicatePolicy::Fail)]
    duplicates: DuplicatePolicy,

    /// Warn about classes newer than this Java release
    #[arg(long)]
    java: Option<u16>,

    /// Print the build report as JSON
    #[arg(long)]
    json: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    silent: bool,

    /// Log every entry
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging - only if not in silent mode
    if !args.silent {
        let level = if args.verbose { Level::DEBUG } else { Level::INFO };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .try_init();
    }

    let mut properties = Properties::new();
    properties.insert("name".to_string(), args.name.clone());
    properties.insert("version".to_string(), args.version.clone());
    properties.insert("group".to_string(), args.group.clone());

    let sources = args
        .input
        .iter()
        .map(|path| ArchiveSource::open(path.display().to_string(), path))
        .collect::<shade::Result<Vec<_>>>()
        .context("Failed to open inputs")?;

    let plan = BuildPlan {
        sources,
        output: packager::artifact_path(&args.output_dir, &args.archive_name, &properties),
        options: PackOptions {
            relocations: args.relocate,
            exclusions: args.exclude,
            duplicates: args.duplicates,
            expand: Vec::new(),
            properties,
            target_java: args.java,
        },
    };

    let report = plan.execute().context("Packaging failed")?;

    if args.json {
        println!("{}", report.to_json()?);
    } else if !args.silent {
        // Warnings were already logged
        println!("✅ Created: {}", report.output.display());
        println!("   Entries: {}", report.entries);
        println!("   Size: {} bytes", report.size);
        println!("   SHA256: {}", report.sha256);
    }

    Ok(())
}

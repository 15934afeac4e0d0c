//! Shade CLI - Declarative relocating packager
//!
//! Usage:
//!   shade build                Build the shaded jar from shade.toml in current directory
//!   shade init                 Create a template shade.toml
//!   shade inspect <file.jar>   List the entries of an artifact
//!   shade verify <file.jar>    Check that no relocated source names remain

mod detect;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use shade_common::config::{self, ShadeConfig};
use shade_common::inspect;
use shade_common::packager::DuplicatePolicy;
use shade_common::paths::build::CONFIG_FILE;
use shade_common::relocation::Relocator;

#[derive(Parser)]
#[command(name = "shade")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Shade - merge and relocate JVM dependencies into one jar")]
#[command(author = "Shade Project")]
struct Cli {
    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    silent: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the shaded artifact from shade.toml
    Build {
        /// Path to shade.toml (default: ./shade.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the duplicate policy: fail, last-wins, first-wins
        #[arg(long)]
        duplicates: Option<DuplicatePolicy>,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a template shade.toml in current directory (interactive)
    Init {
        /// Accept all detected defaults without prompts
        #[arg(short, long)]
        yes: bool,
    },

    /// List the entries of an artifact
    Inspect {
        /// Path to a jar
        artifact: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Fail if anything under a relocated source package remains in an artifact
    Verify {
        /// Path to a jar
        artifact: PathBuf,

        /// Take the relocation rules from this shade.toml (default: ./shade.toml)
        #[arg(short, long, conflicts_with = "prefix")]
        config: Option<PathBuf>,

        /// Source package that must not appear (repeatable)
        #[arg(long)]
        prefix: Vec<String>,

        #[arg(long)]
        json: bool,
    },
}

// Console helper for output control
struct Console {
    silent: bool,
    verbose: bool,
}

impl Console {
    fn new(silent: bool, verbose: bool) -> Self {
        Self { silent, verbose }
    }

    fn log(&self, msg: impl std::fmt::Display) {
        if !self.silent {
            println!("{}", msg);
        }
    }

    fn verbose(&self, msg: impl std::fmt::Display) {
        if self.verbose && !self.silent {
            println!("  {}", msg);
        }
    }

    fn success(&self, msg: impl std::fmt::Display) {
        if !self.silent {
            println!("✅ {}", msg);
        }
    }

    fn warn(&self, msg: impl std::fmt::Display) {
        if !self.silent {
            eprintln!("⚠️  {}", msg);
        }
    }

    fn error(&self, msg: impl std::fmt::Display) {
        eprintln!("❌ {}", msg); // Always print errors
    }

    fn spinner(&self, msg: &str) -> Option<ProgressBar> {
        if self.silent {
            None
        } else {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message(msg.to_string());
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            Some(pb)
        }
    }
}

/// Library warnings are shown through the console, so tracing stays quiet
/// unless asked for with --verbose or RUST_LOG.
fn init_logging(silent: bool, verbose: bool) {
    if silent {
        return;
    }
    let default = if verbose { "debug" } else { "error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();

    // JSON goes to stdout alone
    let json = match &cli.command {
        Commands::Build { json, .. }
        | Commands::Inspect { json, .. }
        | Commands::Verify { json, .. } => *json,
        Commands::Init { .. } => false,
    };
    init_logging(cli.silent, cli.verbose);
    let console = Console::new(cli.silent || json, cli.verbose);

    let result = match cli.command {
        Commands::Build {
            config,
            duplicates,
            json,
        } => cmd_build(config, duplicates, json, &console),
        Commands::Init { yes } => cmd_init(yes, &console),
        Commands::Inspect { artifact, json } => cmd_inspect(&artifact, json, &console),
        Commands::Verify {
            artifact,
            config,
            prefix,
            json,
        } => cmd_verify(&artifact, config, prefix, json, &console),
    };

    if let Err(e) = result {
        console.error(format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Locate shade.toml and the directory its paths are relative to
fn load_config(config_path: Option<PathBuf>) -> Result<(ShadeConfig, PathBuf)> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            let path = std::env::current_dir()?.join(CONFIG_FILE);
            if !path.exists() {
                anyhow::bail!(
                    "No {} found in current directory.\n\
                     Run 'shade init' to create one, or specify a path with --config",
                    CONFIG_FILE
                );
            }
            path
        }
    };

    let config = ShadeConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let base_dir = match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((config, base_dir))
}

/// Build the shaded artifact
fn cmd_build(
    config_path: Option<PathBuf>,
    duplicates: Option<DuplicatePolicy>,
    json: bool,
    console: &Console,
) -> Result<()> {
    console.log(format!("🔧 Shade v{}\n", env!("CARGO_PKG_VERSION")));

    let (mut config, base_dir) = load_config(config_path)?;
    if let Some(policy) = duplicates {
        config.build.duplicates = policy;
    }

    console.log(format!("📦 Project: {} v{}", config.project.name, config.project.version));
    if let Some(java) = config.toolchain.java {
        console.verbose(format!("Toolchain: Java {}", java));
    }

    // Resolution happens here, before anything is packaged
    let plan = config.plan(&base_dir).context("Failed to prepare build")?;

    console.log("\n📁 Inputs:");
    for source in &plan.sources {
        console.log(format!("   {} ({})", source.label, source.path.display()));
    }
    let skipped = config
        .dependencies
        .iter()
        .filter(|d| !d.scope.is_bundled())
        .count();
    if skipped > 0 {
        console.verbose(format!("{} compile-only dependencies not bundled", skipped));
    }
    for rule in &plan.options.relocations {
        console.verbose(format!("Relocate {} -> {}", rule.from, rule.to));
    }
    console.log(format!("📄 Output: {}\n", plan.output.display()));

    let spinner = console.spinner("Merging and relocating...");
    let start = std::time::Instant::now();
    let result = plan.execute();
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let report = result.context("Build failed")?;

    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    for warning in &report.warnings {
        console.warn(warning);
    }

    for input in &report.inputs {
        console.verbose(format!(
            "{}: {} entries, {} excluded",
            input.label, input.entries_read, input.entries_excluded
        ));
    }
    for rule in &report.relocations {
        console.verbose(format!(
            "{} -> {}: {} entries, {} references",
            rule.from, rule.to, rule.entries, rule.references
        ));
    }
    console.verbose(format!("SHA256: {}", report.sha256));

    console.log("");
    console.success(format!(
        "Built {} ({} entries, {:.1} KB) in {:.1}s",
        report.output.display(),
        report.entries,
        report.size as f64 / 1024.0,
        start.elapsed().as_secs_f64()
    ));
    if report.duplicates_resolved > 0 {
        console.log(format!(
            "   {} duplicate entries resolved ({})",
            report.duplicates_resolved, config.build.duplicates
        ));
    }

    Ok(())
}

/// Create a shade.toml in the current directory
fn cmd_init(accept_defaults: bool, console: &Console) -> Result<()> {
    let current_dir = std::env::current_dir()?;
    let config_path = current_dir.join(CONFIG_FILE);

    if config_path.exists() {
        anyhow::bail!("{} already exists in this directory", CONFIG_FILE);
    }

    console.log("🔧 Shade Initializer\n");

    // Detect project info
    let detected = detect::DetectedProject::detect(&current_dir);

    let name: String = if accept_defaults {
        detected.name.unwrap_or_else(|| "MyPlugin".to_string())
    } else {
        Input::new()
            .with_prompt("name")
            .default(detected.name.unwrap_or_else(|| "MyPlugin".to_string()))
            .interact_text()?
    };

    let group: String = if accept_defaults {
        detected.group.unwrap_or_else(|| "com.example".to_string())
    } else {
        Input::new()
            .with_prompt("group")
            .default(detected.group.unwrap_or_else(|| "com.example".to_string()))
            .interact_text()?
    };

    let version: String = if accept_defaults {
        detected.version.unwrap_or_else(|| "1.0.0".to_string())
    } else {
        Input::new()
            .with_prompt("version")
            .default(detected.version.unwrap_or_else(|| "1.0.0".to_string()))
            .interact_text()?
    };

    let java: u16 = if accept_defaults {
        detected.java.unwrap_or(21)
    } else {
        Input::new()
            .with_prompt("java release")
            .default(detected.java.unwrap_or(21))
            .interact_text()?
    };

    let classes: String = if accept_defaults {
        detected.classes.unwrap_or_else(|| "build/classes".to_string())
    } else {
        let default_classes = detected.classes.unwrap_or_else(|| "build/classes".to_string());
        let hint = if current_dir.join(&default_classes).exists() { "" } else { " (not found yet)" };
        Input::new()
            .with_prompt(format!("classes{}", hint))
            .default(default_classes)
            .interact_text()?
    };

    let resources = match detected.resources {
        Some(dir) if accept_defaults => Some(dir),
        Some(dir) => Confirm::new()
            .with_prompt(format!("Bundle resources from {}?", dir))
            .default(true)
            .interact()?
            .then_some(dir),
        None => None,
    };

    let template = config::generate_template(&config::Template {
        name: &name,
        group: &group,
        version: &version,
        java,
        classes: &classes,
        resources: resources.as_deref(),
    });
    fs::write(&config_path, template)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    console.success(format!("Created {}", CONFIG_FILE));
    console.log("\nNext steps:");
    console.log("  1. Add your [[dependency]] and [[shadow.relocate]] entries");
    console.log("  2. Run: shade build");
    Ok(())
}

/// List the entries of an artifact
fn cmd_inspect(artifact: &Path, json: bool, console: &Console) -> Result<()> {
    let summary = inspect::inspect(artifact)
        .with_context(|| format!("Failed to read {}", artifact.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    console.log(format!("🔍 {}\n", artifact.display()));
    for entry in &summary.entries {
        console.log(format!("{:>10}  {}", entry.size, entry.path));
    }
    console.log("");
    console.log(format!(
        "{} entries ({} classes), {} bytes",
        summary.entries.len(),
        summary.classes(),
        summary.size
    ));
    if let Some(major) = summary.newest_class_version() {
        // Class file major 52 is Java 8
        console.log(format!("Newest class version: {} (Java {})", major, major.saturating_sub(44)));
    }
    console.verbose(format!("SHA256: {}", summary.sha256));
    Ok(())
}

/// Check an artifact for names that should have been relocated
fn cmd_verify(
    artifact: &Path,
    config_path: Option<PathBuf>,
    prefixes: Vec<String>,
    json: bool,
    console: &Console,
) -> Result<()> {
    let relocator = if prefixes.is_empty() {
        let (config, _) = load_config(config_path)?;
        Relocator::new(&config.relocations()).context("Invalid relocation rules")?
    } else {
        Relocator::detector(&prefixes)?
    };

    if relocator.is_empty() {
        anyhow::bail!("Nothing to verify: no relocation rules in config and no --prefix given");
    }

    console.log(format!("🔍 Verifying: {}\n", artifact.display()));
    for rule in relocator.rules() {
        console.verbose(format!("Checking for {}", rule.from()));
    }

    let leftovers = inspect::find_leftovers(artifact, &relocator)
        .with_context(|| format!("Failed to read {}", artifact.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&leftovers)?);
    } else {
        for leftover in &leftovers {
            console.log(format!("   {} -> {}", leftover.entry, leftover.reference));
        }
    }

    if !leftovers.is_empty() {
        anyhow::bail!(
            "{} reference(s) to relocated packages remain in {}",
            leftovers.len(),
            artifact.display()
        );
    }

    console.success("No references to relocated packages remain");
    Ok(())
}

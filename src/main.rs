use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use kelda_fetch::config::Config;
use kelda_fetch::{Installer, Outcome};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kelda-fetch")]
#[command(
    about = "Download the Kelda release matching the version required in package.json",
    long_about = None,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    overrides: Overrides,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args)]
struct Overrides {
    /// Config file [default: ~/.config/kelda-fetch/config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Manifest declaring the dependency
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Dependency name to look up in the manifest
    #[arg(long, global = true)]
    dependency: Option<String>,

    /// Release index root URL
    #[arg(long, global = true)]
    index_url: Option<String>,

    /// Path of the binary inside the release archive
    #[arg(long, global = true)]
    member: Option<String>,

    /// File name to install the binary as
    #[arg(long, global = true)]
    output: Option<String>,

    /// Directory to install into [default: current directory]
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the best matching release (default)
    Install,
    /// Print the release that would be installed
    Resolve,
    /// List releases available in the index
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kelda_fetch={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (config, install_dir) = build_config(cli.overrides)?;
    let installer = Installer::new(config, install_dir)?;

    match cli.command.unwrap_or(Commands::Install) {
        Commands::Install => report(&installer.run().await?),
        Commands::Resolve => report(&installer.resolve().await?),
        Commands::List => {
            let index = installer.available().await?;
            if index.is_empty() {
                println!("No releases available at {}", installer.config().release.index_url);
            }
            for release in index.iter().rev() {
                println!("{}\t{}", release.version, release.url);
            }
        }
    }

    Ok(())
}

fn report(outcome: &Outcome) {
    match outcome {
        Outcome::NothingToDo(reason) => println!("{reason}"),
        Outcome::Resolved(release) => println!("{}\t{}", release.version, release.url),
        Outcome::Installed { release, path } => {
            println!("✓ Installed {} as {}", release.version, path.display());
        }
    }
}

/// Config file values with command-line overrides applied
fn build_config(overrides: Overrides) -> anyhow::Result<(Config, PathBuf)> {
    let mut config = match &overrides.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(manifest) = overrides.manifest {
        config.manifest.path = manifest;
    }
    if let Some(dependency) = overrides.dependency {
        config.manifest.dependency = dependency;
    }
    if let Some(index_url) = overrides.index_url {
        config.release.index_url = index_url;
    }
    if let Some(member) = overrides.member {
        config.release.archive_member = member;
    }
    if let Some(output) = overrides.output {
        config.release.install_name = output;
    }

    let install_dir = match overrides.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to determine working directory")?,
    };

    Ok((config, install_dir))
}

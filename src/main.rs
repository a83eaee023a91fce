use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;

use hwpm::catalog::Catalog;
use hwpm::cleanup;
use hwpm::download::{Downloader, HttpDownloader};
use hwpm::installer::Installer;
use hwpm::platform::PlatformId;
use hwpm::runtime::{RealRuntime, Runtime};
use hwpm::version::InstallModifiers;

/// hwpm - hardware toolchain package manager
///
/// Downloads and installs the versioned, platform-specific toolchain
/// packages (compilers, synthesizers, programmers) that the build, upload
/// and verify commands expect to find locally.
///
/// Examples:
///   hwpm install examples      # Install one package
///   hwpm install --all         # Install every catalog package
///   hwpm install --all -f      # Force the re/installation of all packages
///   hwpm uninstall examples    # Remove a package
///   hwpm list                  # Show installed and available versions
#[derive(Parser, Debug)]
#[command(author, version = env!("HWPM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root directory (overrides defaults; also via HWPM_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "HWPM_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,

    /// Package catalog file (defaults to <root>/catalog.json; also via HWPM_CATALOG)
    #[arg(long = "catalog", env = "HWPM_CATALOG", value_name = "PATH", global = true)]
    pub catalog: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install packages from the catalog
    Install(InstallArgs),

    /// Uninstall packages and remove their install directories
    Uninstall(UninstallArgs),

    /// List catalog packages with installed and available versions
    List(ListArgs),
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Package names to install
    #[arg(value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Install every package in the catalog
    #[arg(long, short = 'a', conflicts_with = "packages")]
    pub all: bool,

    /// Reinstall even when the requirement is already satisfied
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Target platform id (advanced; defaults to the host platform)
    #[arg(long, value_name = "PLATFORM")]
    pub platform: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct UninstallArgs {
    /// Package names to uninstall
    #[arg(value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Uninstall every package in the catalog
    #[arg(long, short = 'a', conflicts_with = "packages")]
    pub all: bool,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Target platform id (advanced; defaults to the host platform)
    #[arg(long, value_name = "PLATFORM")]
    pub platform: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;

    let root = resolve_root(&runtime, cli.install_root)?;
    let catalog_path = cli.catalog.unwrap_or_else(|| root.join("catalog.json"));
    let catalog = Catalog::load(&runtime, &catalog_path)
        .with_context(|| format!("Failed to load package catalog from {:?}", catalog_path))?;

    // On Ctrl-C the in-flight scratch paths are removed; final package
    // directories are safe either way by the staging-then-rename contract
    let cleanup_ctx = cleanup::new_shared();
    let cleanup_for_signal = cleanup_ctx.clone();
    let ctrl_c_handler = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cleaning up...");
            cleanup_for_signal.lock().unwrap().cleanup();
            std::process::exit(130); // Standard exit code for Ctrl-C
        }
    });

    let downloader = HttpDownloader::new(reqwest::Client::new());
    let installer = Installer::new(&runtime, &catalog, downloader, root, cleanup_ctx)?;

    let result = match cli.command {
        Commands::Install(args) => run_install(&installer, &catalog, args).await,
        Commands::Uninstall(args) => run_uninstall(&runtime, &installer, &catalog, args).await,
        Commands::List(args) => run_list(&installer, args).await,
    };

    ctrl_c_handler.abort();
    result
}

fn resolve_root<R: Runtime>(runtime: &R, cli_root: Option<PathBuf>) -> Result<PathBuf> {
    match cli_root {
        Some(path) => Ok(path),
        None => runtime
            .home_dir()
            .map(|home| home.join(".hwpm"))
            .context("Could not find home directory"),
    }
}

fn requested_names(packages: Vec<String>, all: bool, catalog: &Catalog) -> Result<Vec<String>> {
    if all {
        Ok(catalog.all_names().map(String::from).collect())
    } else if packages.is_empty() {
        bail!("no packages requested; name packages or pass --all")
    } else {
        Ok(packages)
    }
}

async fn run_install<R: Runtime + 'static, D: Downloader>(
    installer: &Installer<'_, R, D>,
    catalog: &Catalog,
    args: InstallArgs,
) -> Result<()> {
    let platform = PlatformId::resolve(args.platform.as_deref())?;
    let names = requested_names(args.packages, args.all, catalog)?;
    let modifiers = InstallModifiers {
        force: args.force,
        checkversion: true,
    };

    let outcomes = installer.install(&names, platform, modifiers).await;

    let mut failed = 0;
    for outcome in &outcomes {
        println!("{} ... {}", outcome.name, outcome.status);
        if outcome.is_failed() {
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{} of {} package(s) failed", failed, outcomes.len());
    }
    println!("{} package(s) ok", outcomes.len());
    Ok(())
}

async fn run_uninstall<R: Runtime + 'static, D: Downloader>(
    runtime: &R,
    installer: &Installer<'_, R, D>,
    catalog: &Catalog,
    args: UninstallArgs,
) -> Result<()> {
    let names = requested_names(args.packages, args.all, catalog)?;

    if !args.yes {
        let prompt = format!("Uninstall {}?", names.join(", "));
        if !runtime.confirm(&prompt)? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let outcomes = installer.uninstall(&names).await;

    let mut failed = 0;
    for outcome in &outcomes {
        println!("{} ... {}", outcome.name, outcome.status);
        if outcome.is_failed() {
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{} of {} package(s) failed", failed, outcomes.len());
    }
    println!("{} package(s) ok", outcomes.len());
    Ok(())
}

async fn run_list<R: Runtime + 'static, D: Downloader>(
    installer: &Installer<'_, R, D>,
    args: ListArgs,
) -> Result<()> {
    let platform = PlatformId::resolve(args.platform.as_deref())?;
    let statuses = installer.list_installed(platform).await;

    println!(
        "{:<20} {:<12} {:<12} {}",
        "PACKAGE", "INSTALLED", "AVAILABLE", "DESCRIPTION"
    );
    for status in statuses {
        let installed = match &status.installed {
            Some(version) if version.is_empty() => "unknown",
            Some(version) => version,
            None => "-",
        };
        let mut description = status.description.unwrap_or_default();
        if !status.supported {
            description = format!("{} (no {} artifact)", description, platform)
                .trim_start()
                .to_string();
        }
        println!(
            "{:<20} {:<12} {:<12} {}",
            status.name, installed, status.available, description
        );
    }
    Ok(())
}

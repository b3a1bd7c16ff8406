// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use runepkg::transaction::sibling;
use runepkg::{Config, Engine, InstallOptions, InstallOutcome, PackageRecord};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runepkg")]
#[command(author, version, about = "Minimal Debian-style package manager", long_about = None)]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of searching the default locations
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install .deb packages
    Install {
        /// Archive paths or name prefixes ("-" reads targets from stdin)
        targets: Vec<String>,
        /// Read targets from a list file
        #[arg(long, value_name = "FILE")]
        from_file: Option<PathBuf>,
        /// Reinstall or upgrade, and install despite unsatisfied dependencies
        #[arg(short, long)]
        force: bool,
    },
    /// Remove installed packages
    Remove {
        /// Package names or name-version identifiers ("-" reads stdin)
        packages: Vec<String>,
        /// Read package names from a list file
        #[arg(long, value_name = "FILE")]
        from_file: Option<PathBuf>,
    },
    /// List installed packages
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show details of an installed package
    Status {
        /// Package name or name-version identifier
        package: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Search installed packages by name
    Search {
        /// Substring to look for
        query: String,
    },
    /// Print the loaded configuration
    PrintConfig,
    /// Print the path of the configuration file in use
    PrintConfigFile,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Split a target list into tokens, skipping `#` comment lines
fn parse_target_list(text: &str, deb_only: bool) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .flat_map(str::split_whitespace)
        .filter(|token| !deb_only || token.contains(".deb"))
        .map(str::to_string)
        .collect()
}

/// Expand `-` and `--from-file` into the full target list
fn collect_targets(args: Vec<String>, from_file: Option<PathBuf>, deb_only: bool) -> Result<Vec<String>> {
    let mut targets = Vec::new();
    for arg in args {
        if arg == "-" {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read targets from stdin")?;
            targets.extend(parse_target_list(&text, deb_only));
        } else {
            targets.push(arg);
        }
    }
    if let Some(path) = from_file {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read list file {}", path.display()))?;
        targets.extend(parse_target_list(&text, deb_only));
    }
    if targets.is_empty() {
        anyhow::bail!("No targets given");
    }
    Ok(targets)
}

fn report_install(outcome: &InstallOutcome, top_level: bool) {
    match outcome {
        InstallOutcome::Installed(summary) => {
            for dep in &summary.pulled_in {
                report_install(dep, false);
            }
            match &summary.previous_version {
                None => println!("Selecting previously unselected package {}.", summary.name),
                Some(prev) if *prev != summary.version => println!(
                    "Upgrading {} from {} to {} (force)",
                    summary.name, prev, summary.version
                ),
                Some(_) => println!(
                    "Reinstalling {} ({}) due to --force",
                    summary.name, summary.version
                ),
            }
            println!("Unpacking {} ({}) ...", summary.name, summary.version);
            println!("Setting up {} ({}) ...", summary.name, summary.version);
            if !summary.forced_dependencies.is_empty() {
                eprintln!(
                    "Warning: {} installed with unsatisfied dependencies: {}",
                    summary.name,
                    summary.forced_dependencies.join(", ")
                );
            }
            if summary.file_errors > 0 {
                eprintln!(
                    "Warning: {} files of {} failed to install",
                    summary.file_errors, summary.name
                );
            }
            println!(
                "Installed {} files to {}",
                summary.files_installed,
                summary.destination.display()
            );
        }
        InstallOutcome::AlreadyInstalled {
            name,
            installed_version,
            candidate_version,
        } if top_level => {
            if installed_version == candidate_version {
                println!(
                    "Package {} is already installed ({}), skipping. Use -f/--force to reinstall.",
                    name, installed_version
                );
            } else {
                println!(
                    "Package {} is already installed (version {}). Use -f/--force to reinstall or upgrade.",
                    name, installed_version
                );
            }
        }
        _ => {}
    }
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<runepkg::Error>() {
        Some(runepkg::Error::UnsatisfiedDependencies(deps)) => {
            eprintln!("Error: The following dependencies are not satisfied:");
            for dep in deps {
                eprintln!("  - {}", dep);
            }
            eprintln!("Use -f or --force to install anyway.");
        }
        Some(runepkg::Error::NotFound { suggestions, .. }) => {
            eprintln!("Error: {}", err);
            if !suggestions.is_empty() {
                eprintln!("Did you mean: {}", suggestions.join(", "));
            }
        }
        _ => eprintln!("Error: {:#}", err),
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<runepkg::Error>()
        .and_then(|e| u8::try_from(-e.code()).ok())
        .unwrap_or(1)
}

fn print_status(record: &PackageRecord) {
    println!("Package: {}", record.name);
    println!("Version: {}", record.version);
    let fields = [
        ("Architecture", &record.architecture),
        ("Maintainer", &record.maintainer),
        ("Description", &record.description),
        ("Depends", &record.depends),
        ("Installed-Size", &record.installed_size),
        ("Section", &record.section),
        ("Priority", &record.priority),
        ("Homepage", &record.homepage),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("{}: {}", label, value);
        }
    }
    println!("Files installed: {}", record.files.len());
}

fn print_config(config: &Config) {
    if let Some(source) = &config.source {
        println!("Configuration file: {}", source.display());
    }
    if let Some(dir) = &config.runepkg_dir {
        println!("runepkg_dir:  {}", dir.display());
    }
    println!("control_dir:  {}", config.control_dir.display());
    println!("runepkg_db:   {}", config.runepkg_db.display());
    println!("install_dir:  {}", config.install_dir.display());
    println!("install_root: {}", config.install_root.display());
    println!("max_workers:  {}", config.install.max_workers);
    println!("max_depth:    {}", config.install.max_depth);
    println!("keep_extracted: {}", config.install.keep_extracted);
}

fn run(cli: Cli) -> Result<ExitCode> {
    let Some(command) = cli.command else {
        println!("runepkg v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'runepkg --help' for usage information");
        return Ok(ExitCode::SUCCESS);
    };

    if let Commands::Completions { shell } = command {
        clap_complete::generate(shell, &mut Cli::command(), "runepkg", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::discover(cli.config.as_deref())?;

    match command {
        Commands::Install {
            targets,
            from_file,
            force,
        } => {
            let targets = collect_targets(targets, from_file, true)?;
            let mut engine = Engine::open(config)?;
            let options = InstallOptions { force };
            let mut failed = None;

            for target in &targets {
                info!("Installing {}", target);
                let result = sibling::resolve_target(target)
                    .and_then(|archive| engine.install(&archive, options));
                match result {
                    Ok(outcome) => report_install(&outcome, true),
                    Err(e) => {
                        let err = anyhow::Error::from(e);
                        report_error(&err);
                        failed = Some(exit_code(&err));
                    }
                }
            }
            Ok(failed.map_or(ExitCode::SUCCESS, ExitCode::from))
        }
        Commands::Remove {
            packages,
            from_file,
        } => {
            let packages = collect_targets(packages, from_file, false)?;
            let mut engine = Engine::open(config)?;
            let mut failed = None;

            for package in &packages {
                info!("Removing {}", package);
                match engine.remove(package) {
                    Ok(outcome) => {
                        if outcome.files.errors > 0 {
                            eprintln!(
                                "Warning: {} files of {} could not be removed",
                                outcome.files.errors, outcome.identifier
                            );
                        }
                        println!("Removed package: {}", outcome.identifier);
                    }
                    Err(e) => {
                        let err = anyhow::Error::from(e);
                        report_error(&err);
                        failed = Some(exit_code(&err));
                    }
                }
            }
            Ok(failed.map_or(ExitCode::SUCCESS, ExitCode::from))
        }
        Commands::List { json } => {
            let engine = Engine::open(config)?;
            let ids = engine.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ids)?);
            } else if ids.is_empty() {
                println!("No packages installed.");
            } else {
                println!("Installed packages:");
                for id in &ids {
                    println!("  {}", id);
                }
                println!("\nTotal: {} package(s)", ids.len());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { package, json } => {
            let engine = Engine::open(config)?;
            let record = engine.status(&package)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_status(&record);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Search { query } => {
            let engine = Engine::open(config)?;
            let result = engine.search(&query);
            if result.matches.is_empty() {
                println!("No installed packages match '{}'.", query);
                if !result.suggestions.is_empty() {
                    println!("Did you mean: {}", result.suggestions.join(", "));
                }
            } else {
                for record in &result.matches {
                    println!("  {} {}", record.name, record.version);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::PrintConfig => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
        Commands::PrintConfigFile => {
            if let Some(path) = &config.source {
                println!("{}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            ExitCode::from(exit_code(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install_flags() {
        let cli = Cli::try_parse_from(["runepkg", "-v", "install", "-f", "a.deb", "b.deb"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Install { targets, force, .. }) => {
                assert!(force);
                assert_eq!(targets, vec!["a.deb", "b.deb"]);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_target_list_parsing() {
        let text = "# comment line\nhello_1.0_all.deb world_2.0_all.deb\n\nREADME\n  libfoo.deb\n";
        assert_eq!(
            parse_target_list(text, true),
            vec!["hello_1.0_all.deb", "world_2.0_all.deb", "libfoo.deb"]
        );
        assert_eq!(parse_target_list("hello\n# x\nworld\n", false), vec!["hello", "world"]);
    }

    #[test]
    fn test_exit_code_from_error() {
        let err = anyhow::Error::from(runepkg::Error::RecursionLimit(64));
        assert_eq!(exit_code(&err), 16);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }
}

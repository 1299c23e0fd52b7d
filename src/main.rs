use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use grove::config::{CliOverrides, Configuration};
use grove::manager::{CreateRequest, WorktreeManager};
use grove::process::SystemRunner;

#[derive(Parser)]
#[command(name = "grove")]
#[command(
    about = "Issue-driven git worktree automation",
    long_about = "Grove turns a GitHub issue into a ready-to-work worktree.\n\n\
                  GETTING STARTED:\n  \
                  1. Run 'grove config init' to create the base configuration\n  \
                  2. Run 'grove create <issue-url>' inside a repository\n  \
                  3. Inspect worktrees with 'grove list'\n  \
                  4. Remove stale worktrees with 'grove clean'"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a worktree from a GitHub issue
    Create {
        /// Issue URL, e.g. https://github.com/owner/repo/issues/42
        issue_url: String,

        /// Branch name, bypassing heuristic and AI naming
        #[arg(long)]
        branch: Option<String>,

        /// Base directory for the new worktree
        #[arg(long)]
        output: Option<PathBuf>,

        /// Configuration profile to overlay
        #[arg(long)]
        profile: Option<String>,

        /// Terminal app to open (terminal, iterm, warp, wezterm)
        #[arg(long)]
        terminal: Option<String>,

        /// Skip dependency installation
        #[arg(long)]
        no_deps: bool,

        /// Skip opening a terminal
        #[arg(long)]
        no_terminal: bool,
    },

    /// List worktrees known to git
    List {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove prunable worktrees and prune stale registry entries
    Clean {
        /// Remove all non-primary worktrees, not just prunable ones
        #[arg(long)]
        force: bool,
    },

    /// Manage the grove configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default base configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration as JSON
    Show {
        /// Configuration profile to overlay
        #[arg(long)]
        profile: Option<String>,
    },
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "grove=debug" } else { "grove=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn resolve_config(overrides: &CliOverrides) -> Configuration {
    match Configuration::resolve(overrides) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {}", style("✗").red().bold(), err);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let workspace_dir = std::env::current_dir()?;
    let runner = Arc::new(SystemRunner);

    match cli.command {
        Commands::Create {
            issue_url,
            branch,
            output,
            profile,
            terminal,
            no_deps,
            no_terminal,
        } => {
            let overrides = CliOverrides {
                output,
                profile,
                terminal,
                no_deps,
                no_terminal,
                debug: cli.debug,
            };
            let config = resolve_config(&overrides);
            let manager = WorktreeManager::new(config, runner, workspace_dir);

            let result = manager
                .create(CreateRequest {
                    issue_url,
                    branch_override: branch,
                })
                .await;

            match result.error {
                None => {
                    println!(
                        "{} Worktree ready at {}",
                        style("✓").green().bold(),
                        style(
                            result
                                .path
                                .as_deref()
                                .unwrap_or_else(|| std::path::Path::new("?"))
                                .display()
                        )
                        .cyan()
                        .bold()
                    );
                }
                Some(error) => {
                    eprintln!("{} {}", style("✗").red().bold(), error);
                    std::process::exit(1);
                }
            }
        }

        Commands::List { json } => {
            let overrides = CliOverrides {
                debug: cli.debug,
                ..Default::default()
            };
            let config = resolve_config(&overrides);
            let manager = WorktreeManager::new(config, runner, workspace_dir);
            let records = manager.list().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No worktrees found.");
            } else {
                for record in &records {
                    let head: String = record.head.chars().take(7).collect();
                    let mut flags = Vec::new();
                    if record.locked {
                        flags.push("locked");
                    }
                    if record.prunable {
                        flags.push("prunable");
                    }
                    let flag_note = if flags.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", flags.join(", "))
                    };

                    println!(
                        "{} {} {}{}",
                        style(format!("{:<30}", record.branch)).cyan(),
                        style(&head).dim(),
                        record.path.display(),
                        style(flag_note).yellow()
                    );
                    if let Some(issue_url) = &record.issue_url {
                        println!("  {} {}", style("↳").dim(), style(issue_url).dim());
                    }
                }
            }
        }

        Commands::Clean { force } => {
            let overrides = CliOverrides {
                debug: cli.debug,
                ..Default::default()
            };
            let config = resolve_config(&overrides);
            let manager = WorktreeManager::new(config, runner, workspace_dir);
            let result = manager.clean(force).await;

            for path in &result.removed {
                println!("  {} removed {}", "✓".green(), path.display());
            }
            for error in &result.errors {
                println!("  {} {}", "✗".red(), error);
            }
            println!(
                "Cleaned {} worktree(s), {} error(s)",
                result.cleaned,
                result.errors.len()
            );

            if !result.success {
                std::process::exit(1);
            }
        }

        Commands::Config { command } => match command {
            ConfigCommands::Init { force } => {
                let path = Configuration::base_file();
                Configuration::write_default_file(&path, force)?;
                println!(
                    "{} Wrote default configuration to {}",
                    style("✓").green().bold(),
                    style(path.display()).cyan()
                );
            }
            ConfigCommands::Show { profile } => {
                let overrides = CliOverrides {
                    profile,
                    debug: cli.debug,
                    ..Default::default()
                };
                let config = resolve_config(&overrides);
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}

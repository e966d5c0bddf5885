//! `mcl` – Monte Carlo localization command line.
//!
//! ```text
//! mcl [--config <path>] replay <session.jsonl>
//! mcl [--config <path>] config [--write]
//! mcl --help
//! ```
//!
//! `replay` feeds a recorded session through a localizer node and prints
//! each pose estimate.  `config` shows the effective configuration
//! (file, then `MCL_*` overrides); `--write` persists it.  **Ctrl-C** stops a
//! replay after the record in progress.

mod config;
mod replay;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

#[derive(Parser, Debug)]
#[command(name = "mcl")]
#[command(about = "Monte Carlo localization against a known occupancy map")]
struct Cli {
    /// Config file (default `~/.mcl/config.toml`)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Replay a recorded JSON-lines session and print pose estimates
    Replay {
        /// Session file
        session: PathBuf,
    },
    /// Print the effective configuration
    Config {
        /// Also save it to the config path
        #[arg(long)]
        write: bool,
    },
}

fn main() -> ExitCode {
    // Held until exit so pending spans are flushed.
    let _telemetry = mcl_runtime::init_tracing("mcl");

    let cli = Cli::parse();

    let cfg = match config::load_effective(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Config { write } => show_config(&cfg, cli.config, write),
        Command::Replay { session } => run_replay(&cfg, &session),
    }
}

fn show_config(cfg: &config::Config, path: Option<PathBuf>, write: bool) -> ExitCode {
    match config::to_toml(cfg) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    }
    if !write {
        return ExitCode::SUCCESS;
    }
    let path = path.unwrap_or_else(config::config_path);
    match config::save_to(cfg, &path) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error saving config".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run_replay(cfg: &config::Config, session: &std::path::Path) -> ExitCode {
    print_banner();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping replay …".yellow().bold());
        stop_handler.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "  Replaying {} with {} particles\n",
        session.display().to_string().bold(),
        cfg.filter.particle_count
    );
    match runtime.block_on(replay::run(cfg, session, stop)) {
        Ok(summary) => {
            println!();
            println!(
                "  {} {} records, {} scans, {} updates, {} skipped{}",
                "✓".green().bold(),
                summary.records,
                summary.scans,
                summary.updates,
                summary.skipped,
                if summary.interrupted { " (interrupted)" } else { "" }
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Replay failed".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  ____ ___  _____ / /"#.bold().cyan());
    println!("{}", r#" / __ `__ \/ ___// / "#.bold().cyan());
    println!("{}", r#"/ / / / / / /__ / /  "#.bold().cyan());
    println!("{}", r#"/_/ /_/ /_/\___//_/   "#.bold().cyan());
    println!("  {}", "Monte Carlo localization".dimmed());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("mcl").chain(args.iter().copied()))
    }

    #[test]
    fn replay_takes_a_session_and_optional_config() {
        let cli = parse(&["--config", "lab.toml", "replay", "run.jsonl"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("lab.toml")));
        assert_eq!(
            cli.command,
            Command::Replay {
                session: PathBuf::from("run.jsonl")
            }
        );
    }

    #[test]
    fn config_flag_is_accepted_after_the_subcommand() {
        let cli = parse(&["replay", "run.jsonl", "-c", "lab.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("lab.toml")));
    }

    #[test]
    fn config_write_flag() {
        let cli = parse(&["config", "--write"]).unwrap();
        assert_eq!(cli.command, Command::Config { write: true });
        assert_eq!(cli.config, None);
        let cli = parse(&["config"]).unwrap();
        assert_eq!(cli.command, Command::Config { write: false });
    }

    #[test]
    fn bad_invocations_are_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["replay"]).is_err());
        assert!(parse(&["teleport"]).is_err());
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["config", "--verbose"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

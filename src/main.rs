//! prodmap - learned EFOR to PROD parameter translation
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use prodmap::cli::init_logging;
use prodmap::config::{prodmap_home, Config};
use prodmap::error::exit_codes;
use prodmap::gateway::build_gateway_or_disabled;
use prodmap::pipeline::Engine;
use prodmap::storage::FileMappingStore;

// =============================================================================
// CLI Definition
// =============================================================================

/// prodmap - learned EFOR to PROD order parameter translation
#[derive(Parser)]
#[command(name = "prodmap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn mapping definitions from a corpus of paired examples
    Learn {
        /// Corpus file: JSON array of {category, input, output} rows
        corpus: PathBuf,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Translate an order document using the stored mappings
    Translate {
        /// Order file: {"items": [{department, product_description, parameters}]}
        order: PathBuf,
        /// Write the output table (columns, rows, review keys) to this file
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// List stored mappings, or show one in full
    Mappings {
        /// Category to show
        category: Option<String>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("prodmap error: {}", e);
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}

/// Set up the global panic handler.
///
/// On panic, logs to ~/.prodmap/crash.log and exits with code 3.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("prodmap panic: {}", info);

        if let Some(home) = prodmap_home() {
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cwd = std::env::current_dir()?;
    let config = Config::load_from_cwd(&cwd);
    config.validate()?;

    match cli.command {
        Commands::Learn {
            corpus,
            json,
            quiet,
        } => run_learn(config, &corpus, json, quiet),
        Commands::Translate {
            order,
            out,
            json,
            quiet,
        } => run_translate(config, &order, out, json, quiet),
        Commands::Mappings {
            category,
            json,
            quiet,
        } => run_mappings(config, category, json, quiet),
    }
}

/// Map a command outcome to an exit code.
fn outcome_to_exit_code(success: bool, partial: bool) -> ExitCode {
    let code = if !success {
        exit_codes::ERROR
    } else if partial {
        exit_codes::PARTIAL
    } else {
        exit_codes::SUCCESS
    };
    ExitCode::from(code as u8)
}

fn print_formatted(formatted: &str) {
    if !formatted.is_empty() {
        println!("{}", formatted);
    }
}

fn engine(config: Config) -> Result<Engine<FileMappingStore>, Box<dyn std::error::Error>> {
    let store = FileMappingStore::new(&config)?;
    let gateway = build_gateway_or_disabled(&config.gateway);
    Ok(Engine::new(config, store, gateway))
}

fn run_learn(
    config: Config,
    corpus: &Path,
    json: bool,
    quiet: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use prodmap::cli::learn::{LearnCommand, LearnOptions};

    let cmd = LearnCommand::new(engine(config)?);
    let options = LearnOptions { json, quiet };

    let output = cmd.run(corpus, &options);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(outcome_to_exit_code(output.success, output.is_partial()))
}

fn run_translate(
    config: Config,
    order: &Path,
    out: Option<PathBuf>,
    json: bool,
    quiet: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use prodmap::cli::translate::{TranslateCommand, TranslateOptions};

    let cmd = TranslateCommand::new(engine(config)?);
    let options = TranslateOptions { json, quiet, out };

    let output = cmd.run(order, &options);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(outcome_to_exit_code(output.success, output.is_partial()))
}

fn run_mappings(
    config: Config,
    category: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use prodmap::cli::mappings::{MappingsCommand, MappingsOptions};

    let cmd = MappingsCommand::new(FileMappingStore::new(&config)?);
    let options = MappingsOptions {
        json,
        quiet,
        category,
    };

    let output = cmd.run(&options);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(outcome_to_exit_code(output.success, false))
}

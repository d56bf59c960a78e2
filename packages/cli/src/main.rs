mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, format, init, suggest, tree, CheckArgs, FormatArgs, InitArgs, SuggestArgs, TreeArgs};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Flowtree CLI - inspect, check and format pipeline flows
#[derive(Parser, Debug)]
#[command(name = "flowtree")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a config file and a starter flow
    Init(InitArgs),

    /// Check flow files against the component catalogue
    Check(CheckArgs),

    /// Rewrite a flow file in canonical form
    Format(FormatArgs),

    /// Print the component tree of a flow file
    Tree(TreeArgs),

    /// List suggested components for an insert position
    Suggest(SuggestArgs),
}

fn init_tracing(verbose: bool) {
    // RUST_LOG wins unless -v asks for everything
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| match cli.command {
            Command::Init(args) => init(args, &cwd),
            Command::Check(args) => check(args, &cwd),
            Command::Format(args) => format(args, &cwd),
            Command::Tree(args) => tree(args, &cwd),
            Command::Suggest(args) => suggest(args, &cwd),
        });

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}

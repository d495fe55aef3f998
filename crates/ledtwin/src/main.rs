//! LedTwin CLI — run the LED strip device against an in-process hub, or
//! inspect the twin key scheme and method dispatch offline.

use std::path::PathBuf;

use clap::Parser;
use ledtwin_lib::shutdown::ShutdownToken;

mod cli;
mod display;

#[derive(Parser)]
#[command(
    name = "ledtwin",
    version,
    about = "8-LED status strip kept in sync with an IoT hub device twin"
)]
struct Args {
    /// Output as JSON (for config, keys, method, patch)
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use this config file instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: cli::Command,
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level(args.verbose)),
    )
    .format_timestamp(None)
    .format_target(false)
    .init();

    // Ctrl+C cancels every session thread.
    let token = ShutdownToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        log::warn!("could not install Ctrl+C handler: {e}");
    }

    let ctx = cli::Context {
        json: args.json,
        config_path: args.config,
        token,
    };
    if let Err(e) = cli::run(args.command, &ctx) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

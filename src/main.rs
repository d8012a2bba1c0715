// SealedPrefs — Application Entry Point
//
// Parses CLI arguments, initializes structured logging (with a filter that
// never emits keys or values), and dispatches to the command handler.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sealed_prefs::cli::{execute, Cli};

fn main() {
    // Initialize tracing with env filter (RUST_LOG=sealed_prefs=debug for verbose output).
    // Logs go to stderr so command output stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sealed_prefs=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shiftsync", version, about = "Keep Homebase shifts on Google Calendar")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass (default)
    Sync,
    /// Print the configured person's shifts as JSON
    Shifts,
    /// Print the stored event fingerprints as JSON
    Fingerprints {
        /// Only show events created for shifts
        #[arg(long)]
        shifts_only: bool,
    },
}

/// Logs go to stderr so JSON on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("shiftsync=info,shiftsync_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => commands::sync::run(),
        Commands::Shifts => commands::shifts::run(),
        Commands::Fingerprints { shifts_only } => commands::fingerprints::run(shifts_only),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

//! Tablebook CLI: the reservation book, capacity settings and Google
//! Calendar sync from the terminal.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "tablebook-cli", version, about = "Tablebook CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reservation management: create, list, show, update, delete
    Reservation {
        #[command(subcommand)]
        action: commands::reservation::ReservationAction,
    },
    /// Remaining seat capacity for a date
    Availability(commands::availability::AvailabilityArgs),
    /// Admin settings: time slots, daily capacity, auto-sync
    Settings {
        #[command(subcommand)]
        action: commands::settings::SettingsAction,
    },
    /// Configuration management (config.toml)
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Authentication: Google account connection
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Google Calendar synchronization
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Reservation { action } => commands::reservation::run(action),
        Commands::Availability(args) => commands::availability::run(args),
        Commands::Settings { action } => commands::settings::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Auth { action } => commands::auth::run(action),
        Commands::Sync { action } => commands::sync::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

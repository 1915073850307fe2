//! Biblio CLI
//!
//! Maintenance commands for the publication and dataset store

use biblio_core::logging_facility::{init, Profile};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "biblio")]
#[command(about = "Biblio - versioned publication and dataset store", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: commands::GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Migrate,
    /// Print the current version of a record
    Get(commands::records::RecordArgs),
    /// Print every version of a record, oldest first
    History(commands::records::RecordArgs),
    /// Print the version of a record that was current at a point in time
    AsOf(commands::records::AsOfArgs),
    /// Delete every version of a record
    Purge(commands::records::RecordArgs),
    /// Delete every record of one type
    PurgeAll(commands::records::PurgeAllArgs),
    /// Apply JSON-lines mutations from stdin, one result line per input line
    Mutate(commands::mutate::MutateArgs),
    /// Print change events as they are committed
    Listen(commands::listen::ListenArgs),
    /// Re-point a person's contributions to another person, in every version
    Transfer(commands::maintenance::TransferArgs),
    /// Open datasets whose embargo has ended
    LiftEmbargoes(commands::maintenance::LiftEmbargoesArgs),
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init(if cli.global.json_logs {
        Profile::Production
    } else {
        Profile::Development
    });

    let result = match cli.command {
        Commands::Migrate => commands::migrate::execute(&cli.global),
        Commands::Get(args) => commands::records::get(&cli.global, args),
        Commands::History(args) => commands::records::history(&cli.global, args),
        Commands::AsOf(args) => commands::records::as_of(&cli.global, args),
        Commands::Purge(args) => commands::records::purge(&cli.global, args),
        Commands::PurgeAll(args) => commands::records::purge_all(&cli.global, args),
        Commands::Mutate(args) => commands::mutate::execute(&cli.global, args),
        Commands::Listen(args) => commands::listen::execute(&cli.global, args),
        Commands::Transfer(args) => commands::maintenance::transfer(&cli.global, args),
        Commands::LiftEmbargoes(args) => commands::maintenance::lift_embargoes(&cli.global, args),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

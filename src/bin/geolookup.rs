mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use commands::{cmd_inspect, cmd_query};

#[derive(Parser)]
#[command(name = "geolookup")]
#[command(
    about = "Look up IP addresses in MaxMind DB (MMDB) GeoIP databases",
    long_about = "geolookup - GeoIP lookups over MaxMind DB (.mmdb) files\n\n\
    Reads GeoLite2/GeoIP2 style databases (country, city, ASN) and flat\n\
    third-party layouts. Files ending in .gz are decompressed on open.\n\n\
    Examples:\n\
      geolookup query GeoLite2-City.mmdb 81.2.69.142\n\
      geolookup query GeoLite2-ASN.mmdb 1.1.1.1 --field asn\n\
      geolookup query GeoLite2-Country.mmdb 2001:db8::1 --field country --quiet\n\
      geolookup inspect GeoLite2-City.mmdb --json\n\n\
    Set RUST_LOG (e.g. RUST_LOG=geolookup=debug) for diagnostics on stderr."
)]
#[command(version)]
struct Cli {
    /// Enable debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Memory-map the database instead of reading it into memory
    #[arg(long, global = true)]
    mmap: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which view of the record `query` prints
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Field {
    /// Full decoded record plus the matched network
    Raw,
    /// ISO country code
    Country,
    /// AS number and organization
    Asn,
    /// City, region, postal code, coordinates and time zone
    City,
    /// Registered organization and network block
    Whois,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up an IP address
    Query {
        /// Path to the MMDB database (.mmdb or .mmdb.gz)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// IPv4 or IPv6 address to look up
        #[arg(value_name = "IP")]
        ip: String,

        /// Output view
        #[arg(short, long, value_enum, default_value = "raw")]
        field: Field,

        /// Quiet mode - no output, only exit code (0 = found, 1 = not found)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Inspect database metadata
    Inspect {
        /// Path to the MMDB database (.mmdb or .mmdb.gz)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output metadata as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Query {
            database,
            ip,
            field,
            quiet,
        } => cmd_query(database, ip, field, quiet, cli.mmap),
        Commands::Inspect { database, json } => cmd_inspect(database, json, cli.mmap),
    }
}

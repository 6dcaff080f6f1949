//! CLI argument definitions for propdata.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `property` | Aggregate everything known about one address |
//! | `neighborhood` | Aggregate market and demographic data for an area |
//! | `comparables` | Nearby sales and listings, deduplicated across sources |
//! | `sources` | Availability, circuit state and rate-limit slack per service |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--offline` | `false` | Serve every service from deterministic fixtures |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat provider errors as failure (exit code 5) |
//! | `--deadline-ms` | `30000` | Aggregate deadline for one query |
//! | `--timeout-ms` | `10000` | Per-request HTTP timeout |
//!
//! # Examples
//!
//! ```bash
//! propdata --offline property "1 Main St, Springfield" --comparables --history
//! propdata neighborhood "Noe Valley" --fallback --pretty
//! propdata comparables "1 Main St, Springfield" --radius 0.5
//! propdata sources
//! ```

use clap::{Args, Parser, Subcommand};

/// Resilient multi-source property data CLI.
///
/// API keys and base URLs are read from `PROPDATA_<SERVICE>_API_KEY` and
/// `PROPDATA_<SERVICE>_BASE_URL`. Set `RUST_LOG` to see resilience logs on
/// stderr.
#[derive(Debug, Parser)]
#[command(
    name = "propdata",
    author,
    version,
    about = "Resilient multi-source property data aggregator"
)]
pub struct Cli {
    /// Serve every service from deterministic offline fixtures.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat provider errors as a failure (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Aggregate deadline for one query in milliseconds.
    #[arg(
        long,
        global = true,
        default_value_t = 30_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub deadline_ms: u64,

    /// Per-request HTTP timeout in milliseconds.
    #[arg(
        long,
        global = true,
        default_value_t = 10_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Aggregate property details, valuation and public records for an address.
    ///
    /// # Examples
    ///
    ///   propdata property "1 Main St, Springfield"
    ///   propdata property "1 Main St, Springfield" --comparables --radius 0.5
    Property(PropertyArgs),

    /// Aggregate market statistics and demographics for a neighborhood.
    Neighborhood(NeighborhoodArgs),

    /// Search comparable sales and listings around an address.
    Comparables(ComparablesArgs),

    /// List per-service availability, circuit state and rate-limit slack.
    Sources,
}

#[derive(Debug, Args)]
pub struct PropertyArgs {
    /// Street address of the subject property.
    pub address: String,

    /// Substitute placeholder values for every service that fails.
    #[arg(long, default_value_t = false)]
    pub fallback: bool,

    /// Include comparable sales and listings.
    #[arg(long, default_value_t = false)]
    pub comparables: bool,

    /// Include recorded sales and permit history.
    #[arg(long, default_value_t = false)]
    pub history: bool,

    /// Comparables search radius in miles.
    #[arg(long, default_value_t = 1.0)]
    pub radius: f64,
}

#[derive(Debug, Args)]
pub struct NeighborhoodArgs {
    /// Neighborhood, city or ZIP code.
    pub region: String,

    /// Substitute placeholder values for every service that fails.
    #[arg(long, default_value_t = false)]
    pub fallback: bool,
}

#[derive(Debug, Args)]
pub struct ComparablesArgs {
    /// Street address of the subject property.
    pub address: String,

    /// Search radius in miles.
    #[arg(long, default_value_t = 1.0)]
    pub radius: f64,
}

// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments, set up logging, hand off to `cli::run`.
// - Returns `anyhow::Result` so any failure exits non-zero with its context.

use clap::Parser;
use storefront_publisher::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::init_logging(cli.verbose);
    cli::run(cli)
}

use anyhow::Result;
use clap::Parser;

use scrutiny::cli::commands::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run()
}

use clap::Parser;
use ledger_cli::cli::Cli;

fn main() -> anyhow::Result<()> {
    Cli::parse().run()
}

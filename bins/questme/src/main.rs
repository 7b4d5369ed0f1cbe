use clap::Parser;
use eyre::Result;
use questme::{cmd::Cli, telemetry};
use tracing::Level;

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json, Level::WARN);

    cli.cmd.run()?;

    Ok(())
}

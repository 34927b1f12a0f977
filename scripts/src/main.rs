use clap::Parser;
use mira_deploy::cli::Cli;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let Cli {
        network,
        chain,
        log_level,
        command,
    } = Cli::parse();

    tracing_subscriber::fmt().pretty().with_max_level(log_level).init();

    // On failure the report carries the error and the partially deployed module
    command.run(network, chain).await?;
    Ok(())
}

mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = cli::Cli::parse();
    cli::init_tracing(cli.log_json);
    cli::run(cli).await
}

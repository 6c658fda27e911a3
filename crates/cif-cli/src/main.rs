//! # cif CLI Entry Point

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cif_cli::Cli::parse();
    let mut stdout = std::io::stdout();
    cif_cli::run(cli, &mut stdout).await
}

use clap::Parser;
use marquee_api::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SMTP_HOST, etc.
    let _ = dotenvy::dotenv();

    cli::init_tracing();

    let cli = Cli::parse();

    if let Err(e) = cli::run(cli).await {
        tracing::error!(error = ?e, "server exited with error");
        std::process::exit(1);
    }

    Ok(())
}

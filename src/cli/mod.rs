use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, CliOverrides, Environment};
use crate::database::{DatabaseManager, Repositories};
use crate::mailer::Mailer;
use crate::server::{self, AppState};

const DEFAULT_LOG_FILTER: &str = "marquee_api=info,tower_http=info";

fn parse_environment(value: &str) -> Result<Environment, String> {
    Environment::parse(value).ok_or_else(|| format!("unknown environment '{}' (development|staging|production)", value))
}

#[derive(Debug, Parser)]
#[command(name = "marquee-api")]
#[command(about = "Marquee movie catalogue JSON API")]
#[command(version)]
pub struct Cli {
    #[arg(long, help = "API server port")]
    pub port: Option<u16>,

    #[arg(long, value_parser = parse_environment, help = "Environment (development|staging|production)")]
    pub env: Option<Environment>,

    #[arg(long, help = "Enable the per-client rate limiter")]
    pub limiter_enabled: Option<bool>,

    #[arg(long, help = "Rate limiter refill rate in requests per second")]
    pub limiter_rps: Option<f64>,

    #[arg(long, help = "Rate limiter bucket capacity")]
    pub limiter_burst: Option<u32>,
}

impl From<&Cli> for CliOverrides {
    fn from(cli: &Cli) -> Self {
        CliOverrides {
            port: cli.port,
            environment: cli.env,
            limiter_enabled: cli.limiter_enabled,
            limiter_rps: cli.limiter_rps,
            limiter_burst: cli.limiter_burst,
        }
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = crate::config::config().clone().with_cli_overrides(&CliOverrides::from(&cli));
    tracing::info!(env = config.environment.as_str(), "loaded configuration");

    let (repos, pool) = match &config.database.url {
        Some(_) => {
            let pool = DatabaseManager::connect(&config.database)
                .await
                .context("failed to connect to database")?;
            DatabaseManager::migrate(&pool).await.context("failed to apply migrations")?;
            (Repositories::postgres(pool.clone(), config.database.query_timeout()), Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            (Repositories::memory(), None)
        }
    };

    let mailer = Mailer::from_config(&config.mail).context("failed to build mailer")?;

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    let state = AppState::new(config, repos, mailer, pool);
    server::serve(listener, state, server::shutdown_signal()).await?;
    Ok(())
}

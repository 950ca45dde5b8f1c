use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub port: u16,
    pub database: DatabaseConfig,
    pub limiter: LimiterConfig,
    pub mail: MailConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "production" | "prod" => Some(Environment::Production),
            "staging" | "stage" => Some(Environment::Staging),
            "development" | "dev" => Some(Environment::Development),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Empty means the in-memory store is used.
    pub url: Option<String>,
    pub max_connections: u32,
    pub query_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub enabled: bool,
    /// Tokens added back to a client's bucket per second
    pub rps: f64,
    /// Bucket capacity
    pub burst: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// None logs messages instead of sending them
    pub smtp: Option<SmtpConfig>,
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub const DEFAULT_SMTP_PORT: u16 = 25;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_trusted_origins: Vec<String>,
    pub shutdown_grace_secs: u64,
}

/// Values from the command line win over both presets and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub environment: Option<Environment>,
    pub limiter_enabled: Option<bool>,
    pub limiter_rps: Option<f64>,
    pub limiter_burst: Option<u32>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = env::var("APP_ENV")
            .ok()
            .and_then(|v| Environment::parse(&v))
            .unwrap_or(Environment::Development);

        Self::preset(environment).with_env_overrides()
    }

    pub fn preset(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("PORT") {
            self.port = v.parse().unwrap_or(self.port);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_QUERY_TIMEOUT_SECS") {
            self.database.query_timeout_secs = v.parse().unwrap_or(self.database.query_timeout_secs);
        }

        // Limiter overrides
        if let Ok(v) = env::var("LIMITER_ENABLED") {
            self.limiter.enabled = v.parse().unwrap_or(self.limiter.enabled);
        }
        if let Ok(v) = env::var("LIMITER_RPS") {
            self.limiter.rps = v.parse().unwrap_or(self.limiter.rps);
        }
        if let Ok(v) = env::var("LIMITER_BURST") {
            self.limiter.burst = v.parse().unwrap_or(self.limiter.burst);
        }

        // Mail overrides
        if let Ok(v) = env::var("SMTP_HOST") {
            self.mail.smtp = non_empty(v).map(|host| SmtpConfig {
                host,
                port: DEFAULT_SMTP_PORT,
                username: None,
                password: None,
            });
        }
        if let Some(smtp) = self.mail.smtp.as_mut() {
            if let Ok(v) = env::var("SMTP_PORT") {
                smtp.port = v.parse().unwrap_or(smtp.port);
            }
            if let Ok(v) = env::var("SMTP_USERNAME") {
                smtp.username = non_empty(v);
            }
            if let Ok(v) = env::var("SMTP_PASSWORD") {
                smtp.password = non_empty(v);
            }
        }
        if let Ok(v) = env::var("MAIL_SENDER") {
            self.mail.sender = v;
        }

        // Security overrides
        if let Ok(v) = env::var("CORS_TRUSTED_ORIGINS") {
            self.security.cors_trusted_origins = split_origins(&v);
        }
        if let Ok(v) = env::var("SHUTDOWN_GRACE_SECS") {
            self.security.shutdown_grace_secs = v.parse().unwrap_or(self.security.shutdown_grace_secs);
        }

        self
    }

    pub fn with_cli_overrides(mut self, cli: &CliOverrides) -> Self {
        // An explicit environment re-selects the preset before anything else applies
        if let Some(environment) = cli.environment {
            if environment != self.environment {
                self = Self::preset(environment).with_env_overrides();
            }
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(enabled) = cli.limiter_enabled {
            self.limiter.enabled = enabled;
        }
        if let Some(rps) = cli.limiter_rps {
            self.limiter.rps = rps;
        }
        if let Some(burst) = cli.limiter_burst {
            self.limiter.burst = burst;
        }
        self
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.security.shutdown_grace_secs)
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            port: 4000,
            database: DatabaseConfig {
                url: None,
                max_connections: 25,
                query_timeout_secs: 3,
            },
            limiter: LimiterConfig {
                enabled: true,
                rps: 2.0,
                burst: 4,
            },
            mail: MailConfig {
                smtp: None,
                sender: "Marquee <no-reply@marquee.local>".to_string(),
            },
            security: SecurityConfig {
                cors_trusted_origins: vec!["http://localhost:9000".to_string()],
                shutdown_grace_secs: 30,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            port: 4000,
            database: DatabaseConfig {
                url: None,
                max_connections: 25,
                query_timeout_secs: 3,
            },
            limiter: LimiterConfig {
                enabled: true,
                rps: 4.0,
                burst: 8,
            },
            mail: MailConfig {
                smtp: None,
                sender: "Marquee <no-reply@staging.marquee.example>".to_string(),
            },
            security: SecurityConfig {
                cors_trusted_origins: vec![],
                shutdown_grace_secs: 30,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            port: 4000,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                query_timeout_secs: 3,
            },
            limiter: LimiterConfig {
                enabled: true,
                rps: 4.0,
                burst: 8,
            },
            mail: MailConfig {
                smtp: None,
                sender: "Marquee <no-reply@marquee.example>".to_string(),
            },
            security: SecurityConfig {
                cors_trusted_origins: vec![],
                shutdown_grace_secs: 30,
            },
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    Some(value).filter(|s| !s.trim().is_empty())
}

fn split_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

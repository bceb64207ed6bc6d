use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub vapid: VapidConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub service_auth: ServiceAuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VapidConfig {
    pub public_key: String,
    pub private_key: String,
    /// Contact URI placed in the VAPID JWT `sub` claim, e.g. `mailto:ops@example.com`.
    pub subject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub tick_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub poll_interval_seconds: u64,
    pub concurrency: u32,
    pub max_attempts: u32,
    pub initial_backoff_seconds: u64,
    pub max_backoff_seconds: u64,
    pub push_gateway_timeout_seconds: u64,
    pub service_call_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAuthConfig {
    /// Bearer credential the notification worker uses to call `/tasks/{id}/reminder-sent`.
    pub service_token: String,
    /// Bearer credential an external cron binding uses to call `/reminders/binding`.
    pub internal_token: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/app.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            vapid: VapidConfig {
                public_key: env::var("VAPID_PUBLIC_KEY")
                    .map_err(|_| ConfigError::MissingEnv("VAPID_PUBLIC_KEY".to_string()))?,
                private_key: env::var("VAPID_PRIVATE_KEY")
                    .map_err(|_| ConfigError::MissingEnv("VAPID_PRIVATE_KEY".to_string()))?,
                subject: env::var("VAPID_SUBJECT")
                    .unwrap_or_else(|_| "mailto:ops@example.com".to_string()),
            },
            scheduler: SchedulerConfig {
                enabled: parse_bool(env::var("SCHEDULER_ENABLED").ok(), true),
                tick_interval_seconds: env::var("SCHEDULER_TICK_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            },
            worker: WorkerConfig {
                enabled: parse_bool(env::var("WORKER_ENABLED").ok(), true),
                poll_interval_seconds: env::var("WORKER_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                concurrency: env::var("WORKER_CONCURRENCY")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                max_attempts: env::var("WORKER_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                initial_backoff_seconds: env::var("WORKER_INITIAL_BACKOFF_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                max_backoff_seconds: env::var("WORKER_MAX_BACKOFF_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
                push_gateway_timeout_seconds: env::var("PUSH_GATEWAY_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                service_call_timeout_seconds: env::var("SERVICE_CALL_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            service_auth: ServiceAuthConfig {
                service_token: env::var("SERVICE_AUTH_TOKEN")
                    .unwrap_or_else(|_| "dev-service-token".to_string()),
                internal_token: env::var("INTERNAL_AUTH_TOKEN")
                    .unwrap_or_else(|_| "dev-internal-token".to_string()),
            },
        })
    }
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        None => default,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 5,
            },
            vapid: VapidConfig {
                public_key: String::new(),
                private_key: String::new(),
                subject: "mailto:ops@example.com".to_string(),
            },
            scheduler: SchedulerConfig {
                enabled: true,
                tick_interval_seconds: 60,
            },
            worker: WorkerConfig {
                enabled: true,
                poll_interval_seconds: 5,
                concurrency: 10,
                max_attempts: 5,
                initial_backoff_seconds: 30,
                max_backoff_seconds: 3600,
                push_gateway_timeout_seconds: 30,
                service_call_timeout_seconds: 10,
            },
            service_auth: ServiceAuthConfig {
                service_token: "dev-service-token".to_string(),
                internal_token: "dev-internal-token".to_string(),
            },
        }
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub queue: QueueConfig,
}

/// Broker endpoint the metadata queuer publishes to.
#[derive(Clone)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub username: String,
    pub password: String,
    /// Queue declared on connect; also the routing key.
    pub queue: String,
    /// Exchange to publish through; empty means the default exchange.
    pub exchange: String,
    /// Upper bound for connecting and for each publish.
    pub publish_timeout: Duration,
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("vhost", &self.vhost)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("queue", &self.queue)
            .field("exchange", &self.exchange)
            .field("publish_timeout", &self.publish_timeout)
            .finish()
    }
}

const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 2000;

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5672,
            vhost: "/".into(),
            username: "guest".into(),
            password: "guest".into(),
            queue: "metadata_index".into(),
            exchange: String::new(),
            publish_timeout: Duration::from_millis(DEFAULT_PUBLISH_TIMEOUT_MS),
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Object store proxy that queues object metadata for indexing")]
pub struct Args {
    /// Host to bind to (overrides QUEUER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides QUEUER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides QUEUER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides QUEUER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Broker host (overrides QUEUER_QUEUE_HOST)
    #[arg(long)]
    pub queue_host: Option<String>,

    /// Broker port (overrides QUEUER_QUEUE_PORT)
    #[arg(long)]
    pub queue_port: Option<u16>,

    /// Broker virtual host (overrides QUEUER_QUEUE_VHOST)
    #[arg(long)]
    pub queue_vhost: Option<String>,

    /// Broker user (overrides QUEUER_QUEUE_USERNAME)
    #[arg(long)]
    pub queue_username: Option<String>,

    /// Queue receiving metadata envelopes (overrides QUEUER_QUEUE_NAME)
    #[arg(long)]
    pub queue_name: Option<String>,

    /// Exchange to publish through (overrides QUEUER_QUEUE_EXCHANGE)
    #[arg(long)]
    pub queue_exchange: Option<String>,

    /// Connect/publish timeout in milliseconds (overrides QUEUER_PUBLISH_TIMEOUT_MS)
    #[arg(long)]
    pub publish_timeout_ms: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("QUEUER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("QUEUER_PORT", 3000u16)?;
        let env_storage =
            env::var("QUEUER_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("QUEUER_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/queuer.db".into());

        let defaults = QueueConfig::default();
        let queue = QueueConfig {
            host: args
                .queue_host
                .unwrap_or(env_or("QUEUER_QUEUE_HOST", defaults.host)),
            port: match args.queue_port {
                Some(port) => port,
                None => env_parse("QUEUER_QUEUE_PORT", defaults.port)?,
            },
            vhost: args
                .queue_vhost
                .unwrap_or(env_or("QUEUER_QUEUE_VHOST", defaults.vhost)),
            username: args
                .queue_username
                .unwrap_or(env_or("QUEUER_QUEUE_USERNAME", defaults.username)),
            // password comes from the environment only, never argv
            password: env_or("QUEUER_QUEUE_PASSWORD", defaults.password),
            queue: args
                .queue_name
                .unwrap_or(env_or("QUEUER_QUEUE_NAME", defaults.queue)),
            exchange: args
                .queue_exchange
                .unwrap_or(env_or("QUEUER_QUEUE_EXCHANGE", defaults.exchange)),
            publish_timeout: match args.publish_timeout_ms {
                Some(ms) => Duration::from_millis(ms),
                None => Duration::from_millis(env_parse(
                    "QUEUER_PUBLISH_TIMEOUT_MS",
                    DEFAULT_PUBLISH_TIMEOUT_MS,
                )?),
            },
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            queue,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(name: &str, default: String) -> String {
    env::var(name).unwrap_or(default)
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

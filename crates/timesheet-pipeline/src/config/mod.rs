use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the pipeline service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub identity: IdentityConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let identity = IdentityConfig {
            client_id: env::var("IDENTITY_CLIENT_ID").unwrap_or_else(|_| "trial-app".to_string()),
            default_report_type: env::var("DEFAULT_REPORT_TYPE")
                .unwrap_or_else(|_| "TIMESHEET_REPORT".to_string()),
        };

        let pipeline = PipelineConfig {
            workers: positive_var("PIPELINE_WORKERS", 4)?,
            default_chunk_size: positive_var("PIPELINE_DEFAULT_CHUNK_SIZE", 500)?,
            max_chunk_size: positive_var("PIPELINE_MAX_CHUNK_SIZE", 5000)?,
            fetch_default_limit: positive_var("FETCH_DEFAULT_LIMIT", 500)?,
            fetch_max_limit: positive_var("FETCH_MAX_LIMIT", 5000)?,
            job_max_records: positive_var("JOB_MAX_RECORDS", 50_000)?,
            seed_csv: env::var("TIMESHEET_SEED_CSV")
                .ok()
                .filter(|value| !value.trim().is_empty()),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            identity,
            pipeline,
        })
    }
}

fn positive_var(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidNumber { key })?,
        Err(_) => default,
    };

    if value == 0 {
        return Err(ConfigError::ZeroValue { key });
    }
    Ok(value)
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// How bearer tokens are interpreted.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Key under `resource_access` holding the client-scoped roles.
    pub client_id: String,
    pub default_report_type: String,
}

/// Worker pool sizing and fetch bounds.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
    pub default_chunk_size: usize,
    pub max_chunk_size: usize,
    pub fetch_default_limit: usize,
    pub fetch_max_limit: usize,
    pub job_max_records: usize,
    pub seed_csv: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            default_chunk_size: 500,
            max_chunk_size: 5000,
            fetch_default_limit: 500,
            fetch_max_limit: 5000,
            job_max_records: 50_000,
            seed_csv: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    ZeroValue { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative integer")
            }
            ConfigError::ZeroValue { key } => write!(f, "{key} must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::ZeroValue { .. } => None,
        }
    }
}

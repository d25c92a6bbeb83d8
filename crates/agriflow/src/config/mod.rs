use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

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

/// Top-level configuration for the lending desk.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub gemini: GeminiConfig,
    pub payments: PaymentSimulationConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            gemini: GeminiConfig::from_env()?,
            payments: PaymentSimulationConfig::from_env()?,
        })
    }
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Connection settings for the generative-AI collaborator.
///
/// A missing API key is not a configuration error: the service still starts,
/// and every assessment or verification fails until a key is provided.
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("API_KEY"))
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        let model = env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());
        let base_url =
            env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string());
        let timeout = Duration::from_secs(parse_env_number("GEMINI_TIMEOUT_SECS", 30)?);

        Ok(Self {
            api_key,
            model,
            base_url,
            timeout,
        })
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Knobs for the simulated M-PESA gateway.
#[derive(Debug, Clone)]
pub struct PaymentSimulationConfig {
    pub disbursement_delay: Duration,
    pub repayment_delay: Duration,
    pub disbursement_success_rate: f64,
    pub seed: Option<u64>,
}

impl PaymentSimulationConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let disbursement_delay =
            Duration::from_millis(parse_env_number("MPESA_DISBURSE_DELAY_MS", 2_500)?);
        let repayment_delay = Duration::from_millis(parse_env_number("MPESA_REPAY_DELAY_MS", 3_000)?);

        let disbursement_success_rate = match env::var("MPESA_DISBURSE_SUCCESS_RATE") {
            Ok(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|_| ConfigError::InvalidNumber {
                    variable: "MPESA_DISBURSE_SUCCESS_RATE",
                })?,
            Err(_) => 0.9,
        };
        if !(0.0..=1.0).contains(&disbursement_success_rate) {
            return Err(ConfigError::InvalidProbability {
                variable: "MPESA_DISBURSE_SUCCESS_RATE",
            });
        }

        let seed = match env::var("MPESA_SIM_SEED") {
            Ok(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidNumber {
                    variable: "MPESA_SIM_SEED",
                }
            })?),
            Err(_) => None,
        };

        Ok(Self {
            disbursement_delay,
            repayment_delay,
            disbursement_success_rate,
            seed,
        })
    }

    /// Zero-latency settings for tests and fast demos.
    pub fn instant(seed: u64) -> Self {
        Self {
            disbursement_delay: Duration::ZERO,
            repayment_delay: Duration::ZERO,
            seed: Some(seed),
            ..Self::default()
        }
    }
}

impl Default for PaymentSimulationConfig {
    fn default() -> Self {
        Self {
            disbursement_delay: Duration::from_millis(2_500),
            repayment_delay: Duration::from_millis(3_000),
            disbursement_success_rate: 0.9,
            seed: None,
        }
    }
}

fn parse_env_number(variable: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { variable }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    InvalidProbability { variable: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a non-negative integer")
            }
            ConfigError::InvalidProbability { variable } => {
                write!(f, "{variable} must be a number between 0 and 1")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidProbability { .. } => None,
        }
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use std::str::FromStr;

/// Grocy Gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8010")]
    pub port: u16,

    /// Grocy API base URL as exposed through Home Assistant ingress
    #[arg(long, env = "GROCY_API_URL", default_value = "http://homeassistant.local:9192/api")]
    pub grocy_api_url: String,

    /// Grocy API key attached to every upstream call
    #[arg(short = 'k', long, env = "GROCY_API_KEY")]
    pub grocy_api_key: Option<String>,

    /// Long-lived Home Assistant access token for the control channel
    #[arg(short = 't', long, env = "HA_TOKEN")]
    pub ha_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP timeout per upstream attempt in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Total attempt budget per upstream call
    #[arg(long, env = "HTTP_MAX_ATTEMPTS", default_value = "3")]
    pub http_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Upstream
    pub grocy_api_url: String,
    pub grocy_api_key: String,

    // Ingress session
    pub ha_token: String,
    pub session_max_age: u64,
    pub handshake_timeout: u64,

    // HTTP client
    pub http_request_timeout: u64,
    pub http_max_attempts: u32,
    pub retry_base_delay_ms: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        // Parse CLI arguments
        let args = CliArgs::parse();

        let config = Config {
            server_host: args.host,
            server_port: args.port,

            grocy_api_url: args.grocy_api_url,

            // Required secrets (CLI > ENV)
            grocy_api_key: args
                .grocy_api_key
                .or_else(|| std::env::var("GROCY_API_KEY").ok())
                .context("GROCY_API_KEY is required (use -k or set GROCY_API_KEY env var)")?,

            ha_token: args
                .ha_token
                .or_else(|| std::env::var("HA_TOKEN").ok())
                .context("HA_TOKEN is required (use -t or set HA_TOKEN env var)")?,

            session_max_age: env_or("SESSION_TOKEN_MAX_AGE", 60),
            handshake_timeout: env_or("HANDSHAKE_TIMEOUT", 15),

            http_request_timeout: args.http_timeout,
            http_max_attempts: args.http_attempts,
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", 0),

            log_level: args.log_level,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.grocy_api_url.starts_with("http://") && !self.grocy_api_url.starts_with("https://")
        {
            anyhow::bail!(
                "GROCY_API_URL must start with http:// or https://: {}",
                self.grocy_api_url
            );
        }

        if self.http_max_attempts == 0 {
            anyhow::bail!("HTTP_MAX_ATTEMPTS must be at least 1");
        }

        if self.session_max_age == 0 {
            anyhow::bail!("SESSION_TOKEN_MAX_AGE must be at least 1 second");
        }

        Ok(())
    }
}

/// Read an env var with a parsed fallback default
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

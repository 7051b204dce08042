use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;

/// Largest page the backend frame endpoint accepts in one request.
pub const MAX_FRAME_BATCH: usize = 1200;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub secure_cookies: bool,
    pub frame_batch_size: usize,
    pub frame_cache_ttl: Duration,
    pub upload_timeout: Duration,
    pub request_timeout: Duration,
    pub users_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let api_base_url = env::var("API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string())
            .trim_end_matches('/')
            .to_string();

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| "JWT_SECRET is required")?;
        if jwt_secret.trim().is_empty() {
            return Err("JWT_SECRET must not be empty".to_string());
        }

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|_| "BIND_ADDR must be a socket address such as 0.0.0.0:3000")?;

        let secure_cookies = match env::var("SECURE_COOKIES") {
            Ok(raw) => parse_bool(&raw)
                .ok_or_else(|| format!("Invalid SECURE_COOKIES: {}", raw))?,
            Err(_) => false,
        };

        let frame_batch_size = read_number("FRAME_BATCH_SIZE", MAX_FRAME_BATCH as u64)?
            .clamp(1, MAX_FRAME_BATCH as u64) as usize;

        let frame_cache_ttl =
            Duration::from_secs(read_number("FRAME_CACHE_TTL_SECONDS", 600)?);
        let upload_timeout =
            Duration::from_secs(read_number("UPLOAD_TIMEOUT_SECONDS", 1800)?);
        let request_timeout =
            Duration::from_secs(read_number("REQUEST_TIMEOUT_SECONDS", 600)?);

        let users_file = env::var("USERS_FILE").ok().map(PathBuf::from);

        Ok(Self {
            api_base_url,
            jwt_secret,
            bind_addr,
            secure_cookies,
            frame_batch_size,
            frame_cache_ttl,
            upload_timeout,
            request_timeout,
            users_file,
        })
    }

    /// Command-line flags win over the environment.
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(url) = &cli.api_base_url {
            self.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(addr) = cli.bind {
            self.bind_addr = addr;
        }
        if let Some(batch) = cli.frame_batch_size {
            self.frame_batch_size = batch.clamp(1, MAX_FRAME_BATCH);
        }
        if cli.secure_cookies {
            self.secure_cookies = true;
        }
        if let Some(path) = &cli.users_file {
            self.users_file = Some(path.clone());
        }
        self
    }
}

fn read_number(name: &str, default: u64) -> Result<u64, String> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("{} must be a valid number", name)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" on "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn cli_overrides_clamp_batch_size() {
        let config = Config {
            api_base_url: "http://backend".into(),
            jwt_secret: "secret".into(),
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            secure_cookies: false,
            frame_batch_size: 100,
            frame_cache_ttl: Duration::from_secs(1),
            upload_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(1),
            users_file: None,
        };
        let cli = Cli {
            api_base_url: Some("http://other/".into()),
            bind: None,
            frame_batch_size: Some(5000),
            secure_cookies: true,
            users_file: None,
        };

        let merged = config.apply_cli(&cli);
        assert_eq!(merged.api_base_url, "http://other");
        assert_eq!(merged.frame_batch_size, MAX_FRAME_BATCH);
        assert!(merged.secure_cookies);
    }
}

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address (0.0.0.0 for LAN, 127.0.0.1 for localhost)
    pub bind_addr: String,
    /// Directory for stored recording files
    pub storage_directory: PathBuf,
    /// Every Nth sample of a window is transmitted
    pub downsample_stride: usize,
    /// Optional delay between streamed windows (None = no pacing,
    /// transport flow control is the only backpressure)
    pub stream_delay: Option<Duration>,
    /// Maximum upload file size in bytes (default 500MB)
    pub max_upload_size: u64,
    /// CORS allowed origins (comma-separated in env var)
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let downsample_stride = env::var("EEGSTREAM_DOWNSAMPLE_STRIDE")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::InvalidValue("EEGSTREAM_DOWNSAMPLE_STRIDE must be an integer".into())
            })?;
        if downsample_stride == 0 {
            return Err(ConfigError::InvalidValue(
                "EEGSTREAM_DOWNSAMPLE_STRIDE must be positive".into(),
            ));
        }

        let stream_delay = match env::var("EEGSTREAM_STREAM_DELAY_MS") {
            Ok(v) => {
                let ms = v.parse::<u64>().map_err(|_| {
                    ConfigError::InvalidValue("EEGSTREAM_STREAM_DELAY_MS must be an integer".into())
                })?;
                (ms > 0).then(|| Duration::from_millis(ms))
            }
            Err(_) => None,
        };

        Ok(Self {
            port: env::var("EEGSTREAM_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            bind_addr: env::var("EEGSTREAM_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string()),
            storage_directory: env::var("EEGSTREAM_STORAGE_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("storage")),
            downsample_stride,
            stream_delay,
            max_upload_size: env::var("EEGSTREAM_MAX_UPLOAD_SIZE")
                .unwrap_or_else(|_| "524288000".to_string()) // 500MB default
                .parse()
                .unwrap_or(524288000),
            cors_origins: env::var("EEGSTREAM_CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| {
                    vec![
                        "http://localhost:3000".to_string(),
                        "http://127.0.0.1:3000".to_string(),
                    ]
                }),
        })
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_addr: "127.0.0.1".to_string(),
            storage_directory: PathBuf::from("storage"),
            downsample_stride: 10,
            stream_delay: None,
            max_upload_size: 524288000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.downsample_stride, 10);
        assert!(config.stream_delay.is_none());
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
    }
}

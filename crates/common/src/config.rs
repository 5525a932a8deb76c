use serde::Deserialize;

/// Global addon configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Public web host of the CI service, used for build links (default: https://travis-ci.org)
    pub http_host: String,

    /// Product name shown as the sender of chat messages (default: "Travis CI")
    pub product_name: String,

    /// Public HipChat API host. Targets resolving to this host are skipped.
    pub hipchat_default_host: String,

    /// GitHub API base URL for commit statuses
    pub github_api_url: String,

    /// Timeout for every outgoing request, in seconds (default: 10)
    pub request_timeout_secs: u64,

    /// Number of targets delivered concurrently within one task (default: 1 = sequential)
    pub max_concurrency: usize,

    /// Sender address for build emails
    pub email_from: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            http_host: std::env::var("HERALD_HTTP_HOST").unwrap_or(defaults.http_host),
            product_name: std::env::var("HERALD_PRODUCT_NAME").unwrap_or(defaults.product_name),
            hipchat_default_host: std::env::var("HERALD_HIPCHAT_DEFAULT_HOST")
                .unwrap_or(defaults.hipchat_default_host),
            github_api_url: std::env::var("HERALD_GITHUB_API_URL")
                .unwrap_or(defaults.github_api_url),
            request_timeout_secs: match std::env::var("HERALD_REQUEST_TIMEOUT_SECS") {
                Ok(value) => value.parse().map_err(|_| {
                    anyhow::anyhow!("HERALD_REQUEST_TIMEOUT_SECS must be a valid u64")
                })?,
                Err(_) => defaults.request_timeout_secs,
            },
            max_concurrency: match std::env::var("HERALD_MAX_CONCURRENCY") {
                Ok(value) => value.parse().map_err(|_| {
                    anyhow::anyhow!("HERALD_MAX_CONCURRENCY must be a valid usize")
                })?,
                Err(_) => defaults.max_concurrency,
            },
            email_from: std::env::var("HERALD_EMAIL_FROM").ok(),
        };

        config.validate()?;

        tracing::debug!(
            http_host = %config.http_host,
            request_timeout_secs = config.request_timeout_secs,
            max_concurrency = config.max_concurrency,
            "Addon configuration loaded"
        );

        Ok(config)
    }

    /// Reject values that would make every delivery fail or stall.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_secs == 0 {
            anyhow::bail!("HERALD_REQUEST_TIMEOUT_SECS must be at least 1");
        }
        if self.max_concurrency == 0 {
            anyhow::bail!("HERALD_MAX_CONCURRENCY must be at least 1");
        }
        Ok(())
    }

    /// Host part of `http_host`, used for fallback sender addresses.
    pub fn host(&self) -> &str {
        let host = self
            .http_host
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.http_host);
        host.split('/').next().unwrap_or(host)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_host: "https://travis-ci.org".to_string(),
            product_name: "Travis CI".to_string(),
            hipchat_default_host: "api.hipchat.com".to_string(),
            github_api_url: "https://api.github.com".to_string(),
            request_timeout_secs: 10,
            max_concurrency: 1,
            email_from: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.hipchat_default_host, "api.hipchat.com");
        assert_eq!(config.max_concurrency, 1);
        assert!(config.email_from.is_none());
    }

    #[test]
    fn test_host_strips_scheme_and_path() {
        let config = AppConfig {
            http_host: "https://ci.example.com/app".to_string(),
            ..Default::default()
        };
        assert_eq!(config.host(), "ci.example.com");

        let bare = AppConfig {
            http_host: "ci.example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.host(), "ci.example.com");
    }

    #[test]
    fn test_validate_rejects_zero_timeout_and_concurrency() {
        assert!(AppConfig::default().validate().is_ok());

        let no_timeout = AppConfig {
            request_timeout_secs: 0,
            ..Default::default()
        };
        let err = no_timeout.validate().unwrap_err();
        assert!(err.to_string().contains("HERALD_REQUEST_TIMEOUT_SECS"));

        let no_workers = AppConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        let err = no_workers.validate().unwrap_err();
        assert!(err.to_string().contains("HERALD_MAX_CONCURRENCY"));
    }
}

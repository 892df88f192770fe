use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the GitHub-backed object store.
///
/// `client_id`/`client_secret` form the shared service credential used when a
/// request carries no per-user token; anonymous operation without either is
/// allowed but runs on the unauthenticated quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            user_agent: "refsync".to_string(),
            timeout: Duration::from_secs(30),
            client_id: None,
            client_secret: None,
        }
    }
}

impl GithubConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into();
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_service_credential(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_url.is_empty() {
            return Err("API URL cannot be empty".to_string());
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err("API URL must start with http:// or https://".to_string());
        }

        if self.user_agent.is_empty() {
            return Err("User agent cannot be empty".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.client_id.is_some() != self.client_secret.is_some() {
            return Err("Service credential requires both client id and secret".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GithubConfig::default();
        assert_eq!(config.api_url, "https://api.github.com");
        assert_eq!(config.user_agent, "refsync");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = GithubConfig::new()
            .with_api_url("https://ghe.example.com/api/v3/")
            .with_user_agent("refsync-test")
            .with_timeout(Duration::from_secs(5))
            .with_service_credential("id", "secret");

        assert_eq!(config.api_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.user_agent, "refsync-test");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = GithubConfig::default();

        config.api_url = "".to_string();
        assert!(config.validate().is_err());

        config.api_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        config.api_url = "https://api.github.com".to_string();
        config.timeout = Duration::from_secs(0);
        assert!(config.validate().is_err());

        config.timeout = Duration::from_secs(30);
        config.client_id = Some("id".to_string());
        assert!(config.validate().is_err());

        config.client_secret = Some("secret".to_string());
        assert!(config.validate().is_ok());
    }
}

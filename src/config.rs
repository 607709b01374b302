use url::Url;

use crate::error::Error;

/// Default service location when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
/// Storage key the session token is kept under.
pub const DEFAULT_TOKEN_KEY: &str = "token";

/// Smart Notes client configuration.
///
/// ```rust,ignore
/// use smartnotes_client::ClientConfig;
///
/// let config = ClientConfig::new("https://notes.example.com/api".parse()?)
///     .with_token_key("smartnotes_token");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) base_url: Url,
    pub(crate) token_key: String,
}

impl ClientConfig {
    /// Create a configuration for the service rooted at `base_url`.
    ///
    /// A trailing `/` is added to the path so endpoints resolve beneath it.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url: normalize(base_url),
            token_key: DEFAULT_TOKEN_KEY.into(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Optional env vars
    /// - `SMARTNOTES_API_URL`: service base URL (default [`DEFAULT_API_URL`])
    /// - `SMARTNOTES_TOKEN_KEY`: storage key for the session token (default `"token"`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `SMARTNOTES_API_URL` is not a valid URL.
    pub fn from_env() -> Result<Self, Error> {
        let url_str =
            std::env::var("SMARTNOTES_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let base_url: Url = url_str
            .parse()
            .map_err(|e| Error::Config(format!("SMARTNOTES_API_URL: {e}")))?;

        let mut config = Self::new(base_url);
        if let Ok(key) = std::env::var("SMARTNOTES_TOKEN_KEY") {
            if key.trim().is_empty() {
                return Err(Error::Config("SMARTNOTES_TOKEN_KEY must not be empty".into()));
            }
            config = config.with_token_key(key);
        }
        Ok(config)
    }

    /// Override the storage key for the session token.
    #[must_use]
    pub fn with_token_key(mut self, key: impl Into<String>) -> Self {
        self.token_key = key.into();
        self
    }

    /// Service base URL, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn token_key(&self) -> &str {
        &self.token_key
    }

    /// Resolve an endpoint path (without leading `/`) against the base URL.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid endpoint '{path}': {e}")))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL.parse().expect("valid default URL"))
    }
}

fn normalize(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_localhost() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url().as_str(), "http://localhost:8000/");
        assert_eq!(config.token_key(), "token");
    }

    #[test]
    fn endpoints_resolve_under_base_path() {
        let config = ClientConfig::new("https://example.com/api".parse().unwrap());
        assert_eq!(config.base_url().as_str(), "https://example.com/api/");
        assert_eq!(
            config.endpoint("notes/3/analyze").unwrap().as_str(),
            "https://example.com/api/notes/3/analyze"
        );
    }

    #[test]
    fn with_overrides() {
        let config = ClientConfig::new("http://127.0.0.1:9000/".parse().unwrap())
            .with_token_key("smartnotes");
        assert_eq!(config.token_key(), "smartnotes");
        assert_eq!(
            config.endpoint("users/me").unwrap().as_str(),
            "http://127.0.0.1:9000/users/me"
        );
    }
}

//! Loads source images from a remote origin over HTTP

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{LoadError, Loader};
use crate::artifact::{ImageArtifact, MagicBytesGuesser, MimeTypeGuesser};
use crate::constants::DEFAULT_HTTP_LOADER_TIMEOUT_SECS;

/// GETs `{base_url}/{source_id}`; any non-2xx response is a miss
pub struct HttpLoader {
    base_url: String,
    http_client: reqwest::Client,
    guesser: Arc<dyn MimeTypeGuesser>,
}

impl HttpLoader {
    /// Returns `LoadError::Http` if the HTTP client cannot be created
    /// (e.g., TLS configuration issues).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LoadError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            http_client,
            guesser: Arc::new(MagicBytesGuesser),
        })
    }

    pub fn with_default_timeout(base_url: impl Into<String>) -> Result<Self, LoadError> {
        Self::new(
            base_url,
            Duration::from_secs(DEFAULT_HTTP_LOADER_TIMEOUT_SECS),
        )
    }

    pub fn url_for(&self, source_id: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            source_id.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for HttpLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLoader")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl Loader for HttpLoader {
    async fn find(&self, source_id: &str) -> Result<ImageArtifact, LoadError> {
        let url = self.url_for(source_id);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| LoadError::Http(format!("HTTP fetch failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LoadError::NotFound(source_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(LoadError::Http(format!(
                "HTTP request failed with status: {}",
                response.status()
            )));
        }

        let declared = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| value.starts_with("image/"))
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LoadError::Http(format!("Failed to read HTTP body: {e}")))?;

        let mime_type = declared.or_else(|| self.guesser.guess(&bytes));
        Ok(ImageArtifact::new(bytes, mime_type, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let loader = HttpLoader::with_default_timeout("https://origin.test/images/").unwrap();
        assert_eq!(
            loader.url_for("/cats/a.jpg"),
            "https://origin.test/images/cats/a.jpg"
        );
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_an_http_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let loader = HttpLoader::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            loader.find("a.jpg").await,
            Err(LoadError::Http(_))
        ));
    }
}

//! HTTP text fetching.
//!
//! [`Fetch`] is the only transport capability the pipeline needs: turn a URL
//! into a response body or a [`ScrapeError::Network`] naming that URL.
//! [`HttpFetcher`] implements it with a single `reqwest` client carrying the
//! provider's browser-like headers and a fixed per-request deadline.

use std::future::Future;
use std::time::Duration;

use crate::ScrapeError;
use crate::provider::ProviderConfig;

/// Capability to fetch a URL as text.
pub trait Fetch: Send + Sync {
    /// Fetches `url` and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Network`] on timeout, connection failure, or a
    /// non-2xx status.
    fn fetch_text(&self, url: &str) -> impl Future<Output = Result<String, ScrapeError>> + Send;
}

/// [`Fetch`] implementation backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a fetcher with the provider's default headers and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::InvalidData`] if a configured header is not a
    /// valid HTTP header, or [`ScrapeError::Network`] if the client cannot
    /// be constructed.
    pub fn new(provider: &ProviderConfig) -> Result<Self, ScrapeError> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in &provider.headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                ScrapeError::InvalidData {
                    field: "headers".to_owned(),
                    value: key.clone(),
                    reason: format!("Invalid header name ({e})"),
                }
            })?;
            let val = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
                ScrapeError::InvalidData {
                    field: "headers".to_owned(),
                    value: value.clone(),
                    reason: format!("Invalid header value ({e})"),
                }
            })?;
            header_map.insert(name, val);
        }

        let client = reqwest::Client::builder()
            .default_headers(header_map)
            .timeout(Duration::from_secs(provider.timeout_secs))
            .build()
            .map_err(|e| ScrapeError::Network {
                url: provider.base_url.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
        let network = |e: reqwest::Error| {
            log::error!("Failed to fetch data from {url}: {e}");
            ScrapeError::Network {
                url: url.to_owned(),
                message: e.to_string(),
            }
        };

        log::debug!("Fetching {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(network)?;
        let body = response.text().await.map_err(network)?;
        log::debug!("Fetched {} bytes from {url}", body.len());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn provider_with_headers(headers: &[(&str, &str)]) -> ProviderConfig {
        let mut provider = crate::provider::utah().clone();
        provider.headers = headers
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<BTreeMap<_, _>>();
        provider
    }

    #[test]
    fn builds_client_from_embedded_provider() {
        assert!(HttpFetcher::new(crate::provider::utah()).is_ok());
    }

    #[test]
    fn rejects_invalid_header_name() {
        let provider = provider_with_headers(&[("Bad Header", "x")]);
        let err = HttpFetcher::new(&provider).unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::InvalidData { ref field, ref value, .. }
                if field == "headers" && value == "Bad Header"
        ));
    }
}

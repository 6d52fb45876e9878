//! HTTP probing seam used by the HTTP scanner.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names lowercased; repeated headers joined with `, `
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// A GET whose failure (refused, timed out, bad TLS) is an `Err`; any HTTP
    /// status, 404 included, is an `Ok`.
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse>;
}

/// Redirects are not followed: a redirect's own headers are the evidence.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .user_agent(concat!("obsinject/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let mut headers: HashMap<String, String> = HashMap::new();
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            headers
                .entry(name.as_str().to_lowercase())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        Ok(HttpResponse {
            status: response.status().as_u16(),
            headers,
        })
    }
}

/// Canned HTTP responses. A base URL registered with [`MockHttpClient::serve`]
/// answers its root with the given response and every other path with a bare 404;
/// unregistered hosts are unreachable.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    routes: RwLock<HashMap<String, HttpResponse>>,
    hosts: RwLock<HashMap<String, HttpResponse>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, base_url: &str, root: HttpResponse) -> &Self {
        let base = base_url.trim_end_matches('/').to_string();
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(format!("{}/", base), root);
        self.hosts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(base, HttpResponse::new(404));
        self
    }

    /// Overrides the fallback for every unrouted path under `base_url`.
    pub fn fallback(&self, base_url: &str, response: HttpResponse) -> &Self {
        self.hosts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(base_url.trim_end_matches('/').to_string(), response);
        self
    }

    pub fn route(&self, url: &str, response: HttpResponse) -> &Self {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), response);
        self
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse> {
        if let Some(response) = self
            .routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
        {
            return Ok(response.clone());
        }

        let hosts = self.hosts.read().unwrap_or_else(|e| e.into_inner());
        hosts
            .iter()
            .filter(|(base, _)| url.starts_with(base.as_str()))
            .max_by_key(|(base, _)| base.len())
            .map(|(_, response)| response.clone())
            .ok_or_else(|| anyhow!("connection refused: {}", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_root_and_404s_elsewhere() {
        let client = MockHttpClient::new();
        client.serve(
            "http://10.0.0.2:5000",
            HttpResponse::new(200).with_header("Server", "Werkzeug/2.3.0"),
        );

        let timeout = Duration::from_secs(1);
        let root = client.get("http://10.0.0.2:5000/", timeout).await.unwrap();
        assert_eq!(root.header("server"), Some("Werkzeug/2.3.0"));

        let other = client
            .get("http://10.0.0.2:5000/docs", timeout)
            .await
            .unwrap();
        assert_eq!(other.status, 404);

        assert!(client.get("http://10.0.0.3:5000/", timeout).await.is_err());
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(ReqwestHttpClient::new().is_ok());
    }
}

use super::{Indicator, Scanner};
use crate::detection::{Evidence, EvidenceCategory};
use crate::runtime::{HttpClient, HttpResponse, Target};
use crate::stack::SignatureRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use uuid::Uuid;

const HEADER_WEIGHT: f64 = 0.6;
const ENDPOINT_WEIGHT: f64 = 0.4;

/// Tried on the container address after the target's own exposed ports.
const CANDIDATE_PORTS: &[u16] = &[5000, 8000, 3000, 8080];

const HOST_ADDRESS: &str = "127.0.0.1";

/// Header fingerprints, one hit per framework per response.
pub fn classify_headers(response: &HttpResponse) -> Evidence {
    let mut evidence = Evidence::new();
    for sig in SignatureRegistry::global().all() {
        let hit = sig.http_headers.iter().any(|pattern| {
            response
                .header(pattern.name)
                .map(|value| {
                    value
                        .to_lowercase()
                        .contains(&pattern.contains.to_lowercase())
                })
                .unwrap_or(false)
        });
        if hit {
            evidence.add(sig.framework, HEADER_WEIGHT);
        }
    }
    evidence
}

pub struct HttpScanner {
    client: Arc<dyn HttpClient>,
}

impl HttpScanner {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    /// One probe round against `base`. `None` when nothing answers at all.
    async fn probe(&self, base: &str, timeout: Duration) -> Option<Evidence> {
        let root = match self.client.get(&format!("{}/", base), timeout).await {
            Ok(response) => response,
            Err(e) => {
                trace!(base, error = %e, "unreachable");
                return None;
            }
        };
        let mut evidence = classify_headers(&root);

        // A server that answers a random path is useless for endpoint probing.
        let canary = format!("{}/{}", base, Uuid::new_v4().simple());
        let discriminates_404 = matches!(
            self.client.get(&canary, timeout).await,
            Ok(response) if response.status == 404
        );
        if !discriminates_404 {
            trace!(base, "no 404 for unknown path, skipping endpoint probes");
            return Some(evidence);
        }

        for sig in SignatureRegistry::global().all() {
            for endpoint in sig.endpoints {
                let url = format!("{}{}", base, endpoint);
                if let Ok(response) = self.client.get(&url, timeout).await {
                    if response.status != 404 {
                        evidence.add(sig.framework, ENDPOINT_WEIGHT);
                        break;
                    }
                }
            }
        }

        Some(evidence)
    }
}

#[async_trait]
impl Scanner for HttpScanner {
    fn category(&self) -> EvidenceCategory {
        EvidenceCategory::Http
    }

    async fn try_scan(&self, target: &Target) -> anyhow::Result<Evidence> {
        let info = target.info();
        let timeout = target.probe_timeout();

        if let Some(ip) = &info.ip_address {
            let mut ports: Vec<u16> = info
                .ports
                .iter()
                .filter(|p| p.protocol == "tcp")
                .map(|p| p.container_port)
                .collect();
            ports.extend_from_slice(CANDIDATE_PORTS);
            let mut seen = Vec::new();
            ports.retain(|p| {
                let fresh = !seen.contains(p);
                seen.push(*p);
                fresh
            });

            for port in ports {
                if let Some(evidence) = self.probe(&format!("http://{}:{}", ip, port), timeout).await {
                    if !evidence.is_empty() {
                        return Ok(evidence);
                    }
                }
            }
        }

        for host_port in info.ports.iter().filter_map(|p| p.host_port) {
            if let Some(evidence) = self
                .probe(&format!("http://{}:{}", HOST_ADDRESS, host_port), timeout)
                .await
            {
                if !evidence.is_empty() {
                    return Ok(evidence);
                }
            }
        }

        Ok(Evidence::new())
    }

    fn indicators(&self) -> Vec<Indicator> {
        let mut indicators = Vec::new();
        for sig in SignatureRegistry::global().all() {
            for header in sig.http_headers {
                indicators.push(Indicator::new(
                    self.category(),
                    sig.framework,
                    format!("{}: *{}*", header.name, header.contains),
                    HEADER_WEIGHT,
                ));
            }
            for endpoint in sig.endpoints {
                indicators.push(Indicator::new(
                    self.category(),
                    sig.framework,
                    format!("GET {} != 404", endpoint),
                    ENDPOINT_WEIGHT,
                ));
            }
        }
        indicators
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockHttpClient, MockRuntime, MockTarget};
    use crate::stack::Framework;

    async fn scan(target: MockTarget, http: MockHttpClient) -> Evidence {
        let runtime = MockRuntime::new();
        runtime.add_target(target);
        let target = Target::open(Arc::new(runtime), "t", Duration::from_secs(1))
            .await
            .unwrap();
        HttpScanner::new(Arc::new(http)).scan(&target).await
    }

    #[test]
    fn test_header_matching_is_case_insensitive() {
        let response = HttpResponse::new(200).with_header("X-Powered-By", "EXPRESS");
        assert_eq!(classify_headers(&response).score(Framework::Express), 0.6);
    }

    #[tokio::test]
    async fn test_server_header_on_container_address() {
        let http = MockHttpClient::new();
        http.serve(
            "http://172.18.0.4:5000",
            HttpResponse::new(200).with_header("Server", "Werkzeug/2.3.7 Python/3.11"),
        );
        let evidence = scan(MockTarget::new("t").with_ip("172.18.0.4"), http).await;
        assert_eq!(evidence.score(Framework::Flask), 0.6);
    }

    #[tokio::test]
    async fn test_endpoint_probe() {
        let http = MockHttpClient::new();
        http.serve("http://172.18.0.5:8000", HttpResponse::new(200));
        http.route("http://172.18.0.5:8000/admin/", HttpResponse::new(302));
        let evidence = scan(MockTarget::new("t").with_ip("172.18.0.5"), http).await;
        assert_eq!(evidence.score(Framework::Django), 0.4);
        assert_eq!(evidence.scores.len(), 1);
    }

    #[tokio::test]
    async fn test_catch_all_server_skips_endpoints() {
        let http = MockHttpClient::new();
        http.serve("http://172.18.0.6:3000", HttpResponse::new(200));
        http.fallback("http://172.18.0.6:3000", HttpResponse::new(200));
        let evidence = scan(MockTarget::new("t").with_ip("172.18.0.6"), http).await;
        assert!(evidence.is_empty());
    }

    #[tokio::test]
    async fn test_host_port_fallback() {
        let http = MockHttpClient::new();
        http.serve(
            "http://127.0.0.1:13000",
            HttpResponse::new(200).with_header("X-Powered-By", "Express"),
        );
        let evidence = scan(
            MockTarget::new("t")
                .with_ip("10.9.9.9")
                .with_port(3000, Some(13000)),
            http,
        )
        .await;
        assert_eq!(evidence.score(Framework::Express), 0.6);
    }
}

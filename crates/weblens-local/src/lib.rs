use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::time::Duration;
use weblens_core::{Error, FetchBackend, FetchRequest, FetchResponse, Result};

pub mod arxiv;
pub mod extract;
pub mod openai_compat;
pub mod search;
pub mod wikipedia;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; weblens/0.1; +https://github.com/weblens)";

/// HTTP client for a lookup adapter family (search, wikipedia, arxiv).
///
/// Callers build one per family; page extraction has its own client in
/// [`LocalFetcher`], which may run with relaxed TLS.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| Error::Fetch(e.to_string()))
}

/// Send a request, retrying once on transport-level failure (connect/timeout).
///
/// HTTP status errors are not retried: the backend answered.
pub(crate) async fn send_with_retry(rb: reqwest::RequestBuilder) -> reqwest::Result<reqwest::Response> {
    let retry = rb.try_clone();
    match rb.send().await {
        Err(e) if e.is_connect() || e.is_timeout() => match retry {
            Some(rb2) => {
                tracing::debug!(error = %e, "transport error, retrying once");
                rb2.send().await
            }
            None => Err(e),
        },
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Skip TLS certificate verification. Off unless explicitly requested.
    pub insecure_tls: bool,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            insecure_tls: false,
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
}

impl LocalFetcher {
    pub fn new(cfg: FetcherConfig) -> Result<Self> {
        if cfg.insecure_tls {
            tracing::warn!("TLS certificate verification is disabled for page fetches");
        }
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            // Per-request timeouts (FetchRequest.timeout_ms) can still override this.
            .connect_timeout(cfg.connect_timeout)
            .timeout(cfg.timeout)
            .danger_accept_invalid_certs(cfg.insecure_tls)
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl FetchBackend for LocalFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let mut timings_ms = BTreeMap::new();
        let t_req = std::time::Instant::now();
        let url = url::Url::parse(&req.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let mut rb = self.client.get(url);
        if let Some(to) = req.timeout() {
            rb = rb.timeout(to);
        }
        let resp = rb.send().await.map_err(|e| Error::Fetch(e.to_string()))?;
        let final_url = resp.url().to_string();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let max_bytes = req.max_bytes.unwrap_or(u64::MAX) as usize;
        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        timings_ms.insert("network_fetch".to_string(), t_req.elapsed().as_millis());
        tracing::debug!(url = %req.url, status, bytes = bytes.len(), truncated, "fetched");

        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status,
            content_type,
            bytes,
            truncated,
            timings_ms,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::serve;
    use axum::{http::header, http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn local_fetcher_reads_body_and_content_type() {
        let app = Router::new().route(
            "/",
            get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "hello") }),
        );
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new(FetcherConfig::default()).unwrap();

        let req = FetchRequest {
            url: format!("http://{addr}/"),
            timeout_ms: Some(2_000),
            max_bytes: Some(1_000_000),
        };
        let r = fetcher.fetch(&req).await.unwrap();
        assert_eq!(r.status, 200);
        assert!(r.is_success());
        assert_eq!(r.text_lossy(), "hello");
        assert_eq!(r.content_type.as_deref(), Some("text/plain"));
        assert!(!r.truncated);
    }

    #[tokio::test]
    async fn local_fetcher_truncates_at_max_bytes() {
        let app = Router::new().route("/", get(|| async { "x".repeat(10_000) }));
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new(FetcherConfig::default()).unwrap();

        let mut req = FetchRequest::new(format!("http://{addr}/"));
        req.max_bytes = Some(100);
        let r = fetcher.fetch(&req).await.unwrap();
        assert_eq!(r.bytes.len(), 100);
        assert!(r.truncated);
    }

    #[tokio::test]
    async fn local_fetcher_reports_status_without_failing() {
        let app = Router::new().route("/", get(|| async { (StatusCode::NOT_FOUND, "nope") }));
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new(FetcherConfig::default()).unwrap();

        let r = fetcher
            .fetch(&FetchRequest::new(format!("http://{addr}/")))
            .await
            .unwrap();
        assert_eq!(r.status, 404);
        assert!(!r.is_success());
    }

    #[tokio::test]
    async fn local_fetcher_rejects_unparseable_urls() {
        let fetcher = LocalFetcher::new(FetcherConfig::default()).unwrap();
        let err = fetcher
            .fetch(&FetchRequest::new("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    /// Handler that sleeps past the client timeout on the first `slow_hits` requests.
    async fn flaky_server(slow_hits: usize) -> (SocketAddr, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let app = Router::new().route(
            "/",
            get(move || {
                let h = h.clone();
                async move {
                    if h.fetch_add(1, Ordering::SeqCst) < slow_hits {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                    "ok"
                }
            }),
        );
        (serve(app).await, hits)
    }

    #[tokio::test]
    async fn send_with_retry_recovers_from_one_timeout() {
        let (addr, hits) = flaky_server(1).await;
        let client = http_client().unwrap();
        let rb = client
            .get(format!("http://{addr}/"))
            .timeout(Duration::from_millis(300));
        let resp = send_with_retry(rb).await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn send_with_retry_makes_at_most_two_attempts() {
        let (addr, hits) = flaky_server(usize::MAX).await;
        let client = http_client().unwrap();
        let rb = client
            .get(format!("http://{addr}/"))
            .timeout(Duration::from_millis(300));
        let err = send_with_retry(rb).await.unwrap_err();
        assert!(err.is_timeout());
        // Give a hypothetical third attempt time to land before counting.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn send_with_retry_does_not_retry_http_errors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let app = Router::new().route(
            "/",
            get(move || {
                let h = h.clone();
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::SERVICE_UNAVAILABLE, "down")
                }
            }),
        );
        let addr = serve(app).await;
        let resp = send_with_retry(http_client().unwrap().get(format!("http://{addr}/")))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 503);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_with_retry_gives_up_after_second_connect_failure() {
        let client = http_client().unwrap();
        // Port 1 is reserved and refuses connections on loopback.
        let err = send_with_retry(client.get("http://127.0.0.1:1/"))
            .await
            .unwrap_err();
        assert!(err.is_connect());
    }
}

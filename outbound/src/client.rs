use crate::pool::ProxyPool;
use crate::OutboundError;
use reqwest::{Method, Response};
use std::sync::Arc;

/// HTTP client that routes requests through the proxy pool when enabled.
///
/// A transport-level failure through a proxy marks that endpoint failed
/// and triggers one retry: directly when direct fallback is configured,
/// otherwise through the pool again with a retry budget equal to the pool
/// size. Proxy failures never surface to callers unless every configured
/// avenue is exhausted.
#[derive(Clone)]
pub struct OutboundClient {
    pool: Arc<ProxyPool>,
    direct: reqwest::Client,
}

impl OutboundClient {
    pub fn new(pool: Arc<ProxyPool>) -> Result<Self, OutboundError> {
        let direct = reqwest::Client::builder()
            .timeout(pool.timeout())
            .build()
            .map_err(OutboundError::ClientBuild)?;
        Ok(Self { pool, direct })
    }

    pub async fn get(&self, url: &str) -> Result<Response, OutboundError> {
        self.execute(Method::GET, url, None).await
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<Response, OutboundError> {
        self.execute(Method::POST, url, Some(body)).await
    }

    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, OutboundError> {
        if !self.pool.enabled() {
            return self.send(&self.direct, &method, url, body).await;
        }

        // Bounds the retry loop when the whole pool is failing.
        let mut budget = self.pool.len().max(1);

        loop {
            let Some(proxy) = self.pool.select() else {
                tracing::debug!(%method, url, "no proxy available, making direct request");
                return self.send(&self.direct, &method, url, body).await;
            };

            match self.send(&proxy.client, &method, url, body).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    tracing::warn!(proxy = %proxy.url, error = %err, "proxy request failed");
                    self.pool.record_failure(&proxy.url);

                    if self.pool.direct_fallback() {
                        tracing::info!("falling back to direct connection");
                        return self.send(&self.direct, &method, url, body).await;
                    }

                    budget -= 1;
                    if budget == 0 {
                        return Err(err);
                    }
                }
            }
        }
    }

    async fn send(
        &self,
        client: &reqwest::Client,
        method: &Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, OutboundError> {
        let mut request = client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolSettings;
    use axum::{routing::get, Router};
    use std::time::Duration;

    async fn start_test_server() -> String {
        let app = Router::new().route("/ping", get(|| async { "pong" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/ping")
    }

    fn test_settings(enabled: bool, direct_fallback: bool) -> PoolSettings {
        PoolSettings {
            enabled,
            max_failures: 1,
            direct_fallback,
            timeout: Duration::from_secs(2),
            ..PoolSettings::default()
        }
    }

    #[tokio::test]
    async fn disabled_pool_makes_direct_requests() {
        let url = start_test_server().await;
        let pool = Arc::new(ProxyPool::new(test_settings(false, true)));
        let client = OutboundClient::new(pool).unwrap();

        let response = client.get(&url).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn failing_proxy_falls_back_to_direct() {
        let url = start_test_server().await;
        let pool = Arc::new(ProxyPool::new(test_settings(true, true)));
        // Nothing listens on port 9, so the proxy attempt fails fast.
        pool.add_endpoint("http://127.0.0.1:9").unwrap();
        let client = OutboundClient::new(pool.clone()).unwrap();

        let response = client.get(&url).await.unwrap();
        assert_eq!(response.status(), 200);

        // The failure was recorded: with max_failures = 1 the endpoint is
        // blacklisted, and with direct fallback configured selection now
        // yields nothing.
        assert!(pool.select().is_none());
    }

    #[tokio::test]
    async fn exhausted_pool_without_fallback_surfaces_transport_error() {
        let pool = Arc::new(ProxyPool::new(test_settings(true, false)));
        pool.add_endpoint("http://127.0.0.1:9").unwrap();
        let client = OutboundClient::new(pool).unwrap();

        let result = client.get("http://127.0.0.1:9/unreachable").await;
        assert!(matches!(result, Err(OutboundError::Transport(_))));
    }

    #[tokio::test]
    async fn empty_enabled_pool_makes_direct_requests() {
        let url = start_test_server().await;
        let pool = Arc::new(ProxyPool::new(test_settings(true, true)));
        let client = OutboundClient::new(pool).unwrap();

        let response = client.get(&url).await.unwrap();
        assert_eq!(response.status(), 200);
    }
}

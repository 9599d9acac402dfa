use crate::OutboundError;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

/// Configuration for the proxy pool, fixed at construction.
#[derive(Clone, Debug)]
pub struct PoolSettings {
    /// Whether outbound calls are routed through the pool at all.
    pub enabled: bool,
    /// Consecutive failures before an endpoint is blacklisted.
    pub max_failures: u32,
    /// How long a blacklisted endpoint is skipped by selection.
    pub blacklist_window: Duration,
    /// On proxy failure, retry directly (true) or through the pool (false).
    pub direct_fallback: bool,
    /// Bound on every outbound request/response cycle.
    pub timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_failures: 3,
            blacklist_window: Duration::from_secs(300),
            direct_fallback: true,
            timeout: Duration::from_secs(10),
        }
    }
}

/// A proxy endpoint handed out by [`ProxyPool::select`], carrying a client
/// preconfigured to tunnel through it.
#[derive(Clone)]
pub struct SelectedProxy {
    pub url: Url,
    pub client: reqwest::Client,
}

struct PoolEntry {
    url: Url,
    client: reqwest::Client,
    failures: u32,
    last_failure: Option<Instant>,
}

impl PoolEntry {
    /// Blacklisted iff the failure count has reached the threshold and the
    /// most recent failure is still inside the blacklist window.
    fn is_blacklisted(&self, max_failures: u32, window: Duration, now: Instant) -> bool {
        match self.last_failure {
            Some(at) => self.failures >= max_failures && now.duration_since(at) < window,
            None => false,
        }
    }

    fn rehabilitate(&mut self) {
        self.failures = 0;
        self.last_failure = None;
    }
}

struct PoolState {
    entries: Vec<PoolEntry>,
    cursor: usize,
}

/// Rotating pool of outbound proxy endpoints with failure-based
/// blacklisting.
///
/// The entry table and the rotation cursor are shared across concurrent
/// requests and guarded by a single mutex. A successful call through an
/// endpoint never resets its failure count; only expiry of the blacklist
/// window rehabilitates an entry.
pub struct ProxyPool {
    settings: PoolSettings,
    state: Mutex<PoolState>,
}

impl ProxyPool {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(PoolState {
                entries: Vec::new(),
                cursor: 0,
            }),
        }
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn direct_fallback(&self) -> bool {
        self.settings.direct_fallback
    }

    pub fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds an endpoint to the pool. Entries without a scheme default to
    /// `http://`; duplicates are skipped.
    pub fn add_endpoint(&self, raw: &str) -> Result<(), OutboundError> {
        let raw = raw.trim();
        let normalized = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };

        let url = Url::parse(&normalized)
            .map_err(|e| OutboundError::InvalidEndpoint(format!("{normalized}: {e}")))?;

        let proxy = reqwest::Proxy::all(url.clone())
            .map_err(|e| OutboundError::InvalidEndpoint(format!("{url}: {e}")))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.settings.timeout)
            .build()
            .map_err(OutboundError::ClientBuild)?;

        let mut state = self.state.lock().unwrap();
        if state.entries.iter().any(|e| e.url == url) {
            tracing::debug!(proxy = %url, "endpoint already in pool");
            return Ok(());
        }

        tracing::debug!(proxy = %url, "added proxy endpoint");
        state.entries.push(PoolEntry {
            url,
            client,
            failures: 0,
            last_failure: None,
        });
        Ok(())
    }

    /// Picks the next usable endpoint, round-robin from a persistent
    /// cursor, skipping blacklisted entries.
    ///
    /// Entries whose blacklist window has expired are rehabilitated during
    /// the scan. When every entry is blacklisted: with direct fallback the
    /// caller gets `None` and should issue a direct call; without it the
    /// first entry is forcibly rehabilitated so the pool always makes
    /// forward progress.
    pub fn select(&self) -> Option<SelectedProxy> {
        self.select_at(Instant::now())
    }

    fn select_at(&self, now: Instant) -> Option<SelectedProxy> {
        if !self.settings.enabled {
            return None;
        }

        let mut state = self.state.lock().unwrap();
        let len = state.entries.len();
        if len == 0 {
            return None;
        }

        for i in 0..len {
            let idx = (state.cursor + i) % len;
            let entry = &mut state.entries[idx];

            if let Some(at) = entry.last_failure
                && now.duration_since(at) >= self.settings.blacklist_window
            {
                entry.rehabilitate();
            }

            if entry.is_blacklisted(self.settings.max_failures, self.settings.blacklist_window, now)
            {
                continue;
            }

            let selected = SelectedProxy {
                url: entry.url.clone(),
                client: entry.client.clone(),
            };
            state.cursor = (idx + 1) % len;
            return Some(selected);
        }

        if self.settings.direct_fallback {
            tracing::warn!("all proxies are currently blacklisted, falling back to direct connection");
            return None;
        }

        // No fallback configured: force the first entry back into service.
        let entry = &mut state.entries[0];
        entry.rehabilitate();
        tracing::warn!(proxy = %entry.url, "using previously blacklisted proxy");
        let selected = SelectedProxy {
            url: entry.url.clone(),
            client: entry.client.clone(),
        };
        state.cursor = 1 % len;
        Some(selected)
    }

    /// Records a failure against an endpoint. The exact count under
    /// concurrent increments is not safety-critical; the timestamp is
    /// last-writer-wins.
    pub fn record_failure(&self, url: &Url) {
        self.record_failure_at(url, Instant::now());
    }

    fn record_failure_at(&self, url: &Url, now: Instant) {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.entries.iter_mut().find(|e| e.url == *url) else {
            return;
        };

        entry.failures += 1;
        entry.last_failure = Some(now);
        metrics::counter!("outbound.proxy.failure").increment(1);

        if entry.failures >= self.settings.max_failures {
            metrics::counter!("outbound.proxy.blacklisted").increment(1);
            tracing::warn!(
                proxy = %entry.url,
                failures = entry.failures,
                "proxy temporarily blacklisted"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(enabled: bool, max_failures: u32, direct_fallback: bool) -> ProxyPool {
        ProxyPool::new(PoolSettings {
            enabled,
            max_failures,
            blacklist_window: Duration::from_secs(300),
            direct_fallback,
            ..PoolSettings::default()
        })
    }

    fn three_endpoint_pool(max_failures: u32, direct_fallback: bool) -> ProxyPool {
        let pool = pool(true, max_failures, direct_fallback);
        pool.add_endpoint("http://10.0.0.1:8080").unwrap();
        pool.add_endpoint("http://10.0.0.2:8080").unwrap();
        pool.add_endpoint("http://10.0.0.3:8080").unwrap();
        pool
    }

    fn host(selected: &SelectedProxy) -> String {
        selected.url.host_str().unwrap().to_string()
    }

    #[test]
    fn selection_is_round_robin() {
        let pool = three_endpoint_pool(3, true);
        let now = Instant::now();

        let hosts: Vec<String> = (0..4)
            .map(|_| host(&pool.select_at(now).unwrap()))
            .collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1"]);
    }

    #[test]
    fn disabled_or_empty_pool_selects_nothing() {
        let disabled = pool(false, 3, true);
        disabled.add_endpoint("http://10.0.0.1:8080").unwrap();
        assert!(disabled.select().is_none());

        let empty = pool(true, 3, true);
        assert!(empty.select().is_none());
    }

    #[test]
    fn schemeless_endpoints_default_to_http() {
        let pool = pool(true, 3, true);
        pool.add_endpoint("10.0.0.1:8080").unwrap();

        let selected = pool.select().unwrap();
        assert_eq!(selected.url.scheme(), "http");
        assert_eq!(selected.url.host_str(), Some("10.0.0.1"));
    }

    #[test]
    fn duplicate_endpoints_are_skipped() {
        let pool = pool(true, 3, true);
        pool.add_endpoint("http://10.0.0.1:8080").unwrap();
        pool.add_endpoint("10.0.0.1:8080").unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let pool = pool(true, 3, true);
        let err = pool.add_endpoint("http://").unwrap_err();
        assert!(matches!(err, OutboundError::InvalidEndpoint(_)));
        assert!(pool.is_empty());
    }

    #[test]
    fn blacklisted_endpoint_is_skipped_until_window_expires() {
        let pool = three_endpoint_pool(1, true);
        let now = Instant::now();

        let first = pool.select_at(now).unwrap();
        assert_eq!(host(&first), "10.0.0.1");
        pool.record_failure_at(&first.url, now);

        // 10.0.0.1 is skipped while its blacklist window is active.
        let hosts: Vec<String> = (0..4)
            .map(|_| host(&pool.select_at(now).unwrap()))
            .collect();
        assert_eq!(hosts, vec!["10.0.0.2", "10.0.0.3", "10.0.0.2", "10.0.0.3"]);

        // After the window it rejoins the rotation.
        let later = now + Duration::from_secs(301);
        let hosts: Vec<String> = (0..3)
            .map(|_| host(&pool.select_at(later).unwrap()))
            .collect();
        assert!(hosts.contains(&"10.0.0.1".to_string()));
    }

    #[test]
    fn failures_below_threshold_keep_endpoint_selectable() {
        let pool = three_endpoint_pool(3, true);
        let now = Instant::now();

        let first = pool.select_at(now).unwrap();
        pool.record_failure_at(&first.url, now);
        pool.record_failure_at(&first.url, now);

        let hosts: Vec<String> = (0..3)
            .map(|_| host(&pool.select_at(now).unwrap()))
            .collect();
        assert!(hosts.contains(&"10.0.0.1".to_string()));
    }

    #[test]
    fn exhausted_pool_with_direct_fallback_selects_nothing() {
        let pool = three_endpoint_pool(1, true);
        let now = Instant::now();

        for _ in 0..3 {
            let selected = pool.select_at(now).unwrap();
            pool.record_failure_at(&selected.url, now);
        }
        assert!(pool.select_at(now).is_none());
    }

    #[test]
    fn exhausted_pool_without_fallback_rehabilitates_first_entry() {
        let pool = three_endpoint_pool(1, false);
        let now = Instant::now();

        for _ in 0..3 {
            let selected = pool.select_at(now).unwrap();
            pool.record_failure_at(&selected.url, now);
        }

        let forced = pool.select_at(now).unwrap();
        assert_eq!(host(&forced), "10.0.0.1");

        // The forced entry was rehabilitated and stays selectable.
        let again = pool.select_at(now).unwrap();
        assert_eq!(host(&again), "10.0.0.1");
    }

    #[test]
    fn unknown_endpoint_failure_is_ignored() {
        let pool = three_endpoint_pool(1, true);
        let unknown = Url::parse("http://192.168.1.1:1").unwrap();
        pool.record_failure(&unknown);
        assert!(pool.select().is_some());
    }
}

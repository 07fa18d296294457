//! The endpoint pool: health-tracked round-robin rotation over a fixed set
//! of base URLs, plus a background prober that flips endpoints between up
//! and down.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AllServersDownSnafu, Result};
use crate::metrics_sink::MetricsSink;
use crate::transport::Transport;

/// One configured server URL and its liveness flag.
#[derive(Debug)]
pub struct Endpoint {
    url: String,
    down: AtomicBool,
}

impl Endpoint {
    fn new(url: String) -> Self {
        Self {
            url,
            down: AtomicBool::new(false),
        }
    }

    /// The base URL, e.g. `http://localhost:8086`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether this endpoint is currently marked down.
    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::Acquire)
    }

    fn mark_down(&self) {
        self.down.store(true, Ordering::Release);
    }

    fn mark_up(&self) {
        self.down.store(false, Ordering::Release);
    }
}

/// A round-robin pool of [`Endpoint`]s with a background health checker.
///
/// Construction never touches the network; the checker task is started
/// separately via [`EndpointPool::spawn_health_check`] so a caller can
/// decide whether periodic probing runs at all.
pub struct EndpointPool {
    endpoints: Vec<Arc<Endpoint>>,
    cursor: AtomicUsize,
}

impl EndpointPool {
    /// Build a pool from a non-empty list of base URLs. Each URL has its
    /// trailing slash trimmed so concatenation with `/write` and `/query`
    /// never double-slashes.
    pub fn new(urls: impl IntoIterator<Item = String>) -> Result<Self> {
        let endpoints: Vec<Arc<Endpoint>> = urls
            .into_iter()
            .map(|u| Arc::new(Endpoint::new(u.trim_end_matches('/').to_string())))
            .collect();

        if endpoints.is_empty() {
            return crate::error::ConfigSnafu {
                message: "at least one server URL is required".to_string(),
            }
            .fail();
        }

        Ok(Self {
            endpoints,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Number of configured endpoints (up or down).
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// `true` if this pool has no endpoints (never true after [`Self::new`]
    /// succeeds; kept for symmetry with `len`).
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// All configured endpoints, in configuration order.
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Pick the next live endpoint in round-robin order. Fails with
    /// [`crate::error::Error::AllServersDown`] if every endpoint is marked
    /// down.
    pub fn next(&self) -> Result<Arc<Endpoint>> {
        let n = self.endpoints.len();
        for _ in 0..n {
            let i = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
            let candidate = &self.endpoints[i];
            if !candidate.is_down() {
                return Ok(candidate.clone());
            }
        }
        AllServersDownSnafu.fail()
    }

    /// Spawn the background health-check loop: every `interval`, probe each
    /// endpoint via `transport.ping` and flip its flag accordingly. The task
    /// exits when `cancel` is cancelled.
    ///
    /// A panic inside a single ping future is caught so one misbehaving
    /// endpoint cannot take down the whole prober.
    pub fn spawn_health_check(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
        metrics: Arc<dyn MetricsSink>,
        interval: Duration,
        connect_timeout: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("endpoint health checker stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        pool.probe_all(&*transport, &*metrics, connect_timeout).await;
                    }
                }
            }
        })
    }

    async fn probe_all(&self, transport: &dyn Transport, metrics: &dyn MetricsSink, timeout: Duration) {
        for endpoint in &self.endpoints {
            let probe = std::panic::AssertUnwindSafe(transport.ping(endpoint.url(), timeout));
            let outcome = match probe.catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    warn!(url = endpoint.url(), "health probe panicked, treating as down");
                    Ok(false)
                }
            };

            match outcome {
                Ok(true) => {
                    if endpoint.is_down() {
                        endpoint.mark_up();
                        metrics.endpoint_marked_up(endpoint.url());
                        debug!(url = endpoint.url(), "endpoint back up");
                    }
                }
                Ok(false) | Err(_) => {
                    if !endpoint.is_down() {
                        endpoint.mark_down();
                        metrics.endpoint_marked_down(endpoint.url());
                        warn!(url = endpoint.url(), "endpoint marked down");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics_sink::NoopMetricsSink;
    use crate::transport::{QueryRequest, RawResponse, WriteRequest};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct ScriptedTransport {
        up: Arc<AtomicBool>,
        pings: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn ping(&self, _base_url: &str, _timeout: Duration) -> Result<bool> {
            self.pings.fetch_add(1, Ordering::Relaxed);
            Ok(self.up.load(Ordering::Relaxed))
        }
        async fn write(
            &self,
            _base_url: &str,
            _auth: Option<&str>,
            _req: &WriteRequest,
            _timeout: Duration,
        ) -> Result<RawResponse> {
            unimplemented!()
        }
        async fn query(
            &self,
            _base_url: &str,
            _auth: Option<&str>,
            _req: &QueryRequest,
            _timeout: Duration,
        ) -> Result<RawResponse> {
            unimplemented!()
        }
    }

    #[test]
    fn rejects_empty_url_list() {
        let err = EndpointPool::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Config { .. }));
    }

    #[test]
    fn round_robins_across_up_endpoints() {
        let pool = EndpointPool::new(vec![
            "http://a:8086".to_string(),
            "http://b:8086".to_string(),
            "http://c:8086".to_string(),
        ])
        .unwrap();

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(pool.next().unwrap().url().to_string());
        }
        assert_eq!(
            seen,
            vec![
                "http://a:8086",
                "http://b:8086",
                "http://c:8086",
                "http://a:8086",
                "http://b:8086",
                "http://c:8086",
            ]
        );
    }

    #[test]
    fn skips_down_endpoints() {
        let pool = EndpointPool::new(vec!["http://a:8086".to_string(), "http://b:8086".to_string()])
            .unwrap();
        pool.endpoints()[0].mark_down();
        for _ in 0..4 {
            assert_eq!(pool.next().unwrap().url(), "http://b:8086");
        }
    }

    #[test]
    fn all_down_fails_with_all_servers_down() {
        let pool = EndpointPool::new(vec!["http://a:8086".to_string()]).unwrap();
        pool.endpoints()[0].mark_down();
        let err = pool.next().unwrap_err();
        assert!(matches!(err, crate::error::Error::AllServersDown));
    }

    #[tokio::test]
    async fn health_check_flips_flags_on_tick() {
        let pool = Arc::new(
            EndpointPool::new(vec!["http://a:8086".to_string()]).unwrap(),
        );
        pool.endpoints()[0].mark_down();

        let up = Arc::new(AtomicBool::new(true));
        let pings = Arc::new(AtomicU32::new(0));
        let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport {
            up: up.clone(),
            pings: pings.clone(),
        });
        let cancel = CancellationToken::new();

        let handle = pool.spawn_health_check(
            transport,
            Arc::new(NoopMetricsSink),
            Duration::from_millis(5),
            Duration::from_millis(50),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!pool.endpoints()[0].is_down());
        assert!(pings.load(Ordering::Relaxed) > 0);

        cancel.cancel();
        let _ = handle.await;
    }
}

//! The top-level [`Client`]: a single fluent [`ClientConfigBuilder`] wires an
//! [`EndpointPool`], a [`Dispatcher`], and a [`BatchWriter`] together and
//! starts the background health checker.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::auth::AuthConfig;
use crate::batch::{BatchConfig, BatchWriter};
use crate::binder::bind;
use crate::classify::{classify, strip_insert_keyword, StatementType};
use crate::dispatcher::{Dispatcher, Interceptor};
use crate::endpoint::EndpointPool;
use crate::error::{ConfigSnafu, Result, SharedError};
use crate::metrics_sink::{MetricsSink, NoopMetricsSink};
use crate::parser::parse_insert_body;
use crate::point::{Point, Precision};
use crate::statement::{ExecuteResult, Statement};
use crate::transport::{ContentType, QueryRequest, QueryResult, ReqwestTransport, Transport};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_MAX_CONNS_PER_HOST: usize = 32;
const DEFAULT_MAX_IDLE_CONNS_PER_HOST: usize = 8;

/// Builds a [`Client`].
pub struct ClientConfigBuilder {
    addresses: Vec<String>,
    auth: AuthConfig,
    batch: BatchConfig,
    timeout: Duration,
    connect_timeout: Duration,
    max_conns_per_host: usize,
    max_idle_conns_per_host: usize,
    content_type: ContentType,
    precision: Precision,
    health_check_interval: Duration,
    interceptors: Vec<Arc<dyn Interceptor>>,
    metrics: Arc<dyn MetricsSink>,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            auth: AuthConfig::None,
            batch: BatchConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_conns_per_host: DEFAULT_MAX_CONNS_PER_HOST,
            max_idle_conns_per_host: DEFAULT_MAX_IDLE_CONNS_PER_HOST,
            content_type: ContentType::Json,
            precision: Precision::Nanoseconds,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            interceptors: Vec::new(),
            metrics: Arc::new(NoopMetricsSink),
            transport: None,
        }
    }
}

impl ClientConfigBuilder {
    /// Start a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one server base URL. At least one is required.
    pub fn address(mut self, url: impl Into<String>) -> Self {
        self.addresses.push(url.into());
        self
    }

    /// Set every server base URL at once, replacing any already added.
    pub fn addresses(mut self, urls: impl IntoIterator<Item = String>) -> Self {
        self.addresses = urls.into_iter().collect();
        self
    }

    /// Set the authentication credential.
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Enable coalescing batching with the given size/interval.
    pub fn batch(mut self, batch_size: usize, batch_interval: Duration) -> Self {
        self.batch.batch_size = batch_size;
        self.batch.batch_interval = batch_interval;
        self
    }

    /// Set the write-body compression method.
    pub fn compress(mut self, compress: crate::transport::CompressMethod) -> Self {
        self.batch.compress = compress;
        self
    }

    /// Overall per-request timeout (default 30s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// TCP connect timeout, also used for health-check probes (default 10s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound the HTTP connection pool.
    pub fn max_conns_per_host(mut self, max_conns: usize, max_idle: usize) -> Self {
        self.max_conns_per_host = max_conns;
        self.max_idle_conns_per_host = max_idle;
        self
    }

    /// `Accept` header for query responses.
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Timestamp precision used for writes and the `epoch` query parameter.
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// How often the endpoint pool probes `/ping` on every endpoint.
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Register an observability hook. Hooks fire in registration order.
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Install a [`MetricsSink`] (default: [`NoopMetricsSink`]).
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Override the default `reqwest`-based [`Transport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate configuration and construct the running [`Client`],
    /// starting its background health checker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<Client> {
        if self.addresses.is_empty() {
            return ConfigSnafu {
                message: "at least one server address is required".to_string(),
            }
            .fail();
        }
        if let AuthConfig::Basic { username, password } = &self.auth {
            if username.is_empty() || password.is_empty() {
                return ConfigSnafu {
                    message: "basic auth requires both a username and a password".to_string(),
                }
                .fail();
            }
        }
        if let AuthConfig::Token { token } = &self.auth {
            if token.is_empty() {
                return ConfigSnafu {
                    message: "token auth requires a non-empty token".to_string(),
                }
                .fail();
            }
        }

        let pool = Arc::new(EndpointPool::new(self.addresses)?);
        let transport = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(
                self.max_conns_per_host,
                self.max_idle_conns_per_host,
            )?),
        };

        let cancel = CancellationToken::new();
        let health_handle = pool.spawn_health_check(
            Arc::clone(&transport),
            Arc::clone(&self.metrics),
            self.health_check_interval,
            self.connect_timeout,
            cancel.clone(),
        );

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&pool),
            transport,
            self.auth,
            self.interceptors,
            self.timeout,
            self.content_type,
        ));

        let batch_writer = Arc::new(BatchWriter::new(
            Arc::clone(&dispatcher),
            self.batch,
            Arc::clone(&self.metrics),
            cancel.clone(),
        ));

        Ok(Client {
            pool,
            dispatcher,
            batch_writer,
            precision: self.precision,
            content_type: self.content_type,
            connect_timeout: self.connect_timeout,
            cancel,
            health_handle: tokio::sync::Mutex::new(Some(health_handle)),
        })
    }
}

/// The running client. Construct one via [`ClientConfigBuilder`].
pub struct Client {
    pool: Arc<EndpointPool>,
    dispatcher: Arc<Dispatcher>,
    batch_writer: Arc<BatchWriter>,
    precision: Precision,
    content_type: ContentType,
    connect_timeout: Duration,
    cancel: CancellationToken,
    health_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Client {
    /// Start building a client.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// The number of configured endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.pool.len()
    }

    /// Enqueue (or directly send, if batching is disabled) a single point.
    pub async fn write_point(
        &self,
        database: &str,
        retention_policy: Option<&str>,
        point: Point,
    ) -> std::result::Result<(), SharedError> {
        self.batch_writer
            .write_point(database, retention_policy, point)
            .await
    }

    /// Write a whole batch of points synchronously, regardless of whether
    /// batching is configured.
    pub async fn write_batch_points(
        &self,
        database: &str,
        retention_policy: Option<&str>,
        points: &[Point],
    ) -> std::result::Result<(), SharedError> {
        self.batch_writer
            .write_batch_points(database, retention_policy, points)
            .await
    }

    /// Run a raw query (bypassing the statement router).
    pub async fn query(
        &self,
        database: &str,
        query: &str,
        retention_policy: Option<&str>,
    ) -> Result<QueryResult> {
        let request = QueryRequest {
            database: database.to_string(),
            query: query.to_string(),
            retention_policy: retention_policy.map(str::to_string),
            epoch: self.precision.epoch(),
            accept: self.content_type,
        };
        self.dispatcher.dispatch_query(request).await
    }

    /// Best-effort liveness check against the next endpoint the pool hands
    /// out. Does not affect the pool's `isDown` state, which is only
    /// touched by the background health checker.
    pub async fn ping(&self) -> Result<bool> {
        self.dispatcher.ping(self.connect_timeout).await
    }

    /// Route a [`Statement`] to the query path, the write path, or reject it.
    pub async fn execute(&self, stmt: Statement) -> Result<ExecuteResult> {
        if stmt.database.is_empty() {
            return crate::error::ValidationSnafu {
                message: "database must not be empty".to_string(),
            }
            .fail();
        }
        if stmt.command.is_empty() {
            return crate::error::ValidationSnafu {
                message: "command must not be empty".to_string(),
            }
            .fail();
        }

        let statement_type = classify(&stmt.command);

        match statement_type {
            StatementType::Query | StatementType::Command => {
                let request = QueryRequest {
                    database: stmt.database.clone(),
                    query: stmt.command.clone(),
                    retention_policy: stmt.retention_policy.clone(),
                    epoch: self.precision.epoch(),
                    accept: self.content_type,
                };
                let query_result = self.dispatcher.dispatch_query(request).await?;
                let affected_rows = if statement_type == StatementType::Command {
                    1
                } else {
                    0
                };
                Ok(ExecuteResult {
                    statement_type: Some(statement_type),
                    affected_rows,
                    query_result: Some(query_result),
                })
            }
            StatementType::Insert => {
                let body = strip_insert_keyword(&stmt.command);
                let parsed = parse_insert_body(body)?;
                let mut bound = Vec::with_capacity(parsed.len());
                for point in &parsed {
                    bound.push(bind(point, &stmt.params)?);
                }

                self.batch_writer
                    .write_batch_points(&stmt.database, stmt.retention_policy.as_deref(), &bound)
                    .await
                    .map_err(|shared| {
                        std::sync::Arc::try_unwrap(shared).unwrap_or_else(|arc| {
                            crate::error::Error::Codec {
                                message: arc.to_string(),
                            }
                        })
                    })?;

                Ok(ExecuteResult {
                    statement_type: Some(StatementType::Insert),
                    affected_rows: bound.len(),
                    query_result: None,
                })
            }
            StatementType::Unknown => crate::error::ValidationSnafu {
                message: "unsupported statement type".to_string(),
            }
            .fail(),
        }
    }

    /// Cancel all background work and join the health checker and every
    /// batch worker. Idempotent-ish: a second call joins an already-empty
    /// worker set and a `None` health handle without error.
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.health_handle.lock().await.take() {
            let _ = handle.await;
        }
        self.batch_writer.join_workers().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_empty_addresses() {
        let err = ClientConfigBuilder::new().build().unwrap_err();
        assert!(matches!(err, crate::error::Error::Config { .. }));
    }

    #[test]
    fn builder_rejects_incomplete_basic_auth() {
        let err = ClientConfigBuilder::new()
            .address("http://localhost:8086")
            .auth(AuthConfig::Basic {
                username: String::new(),
                password: "pw".to_string(),
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Config { .. }));
    }

    #[tokio::test]
    async fn builder_succeeds_with_one_address() {
        let client = ClientConfigBuilder::new()
            .address("http://localhost:8086")
            .build()
            .unwrap();
        assert_eq!(client.endpoint_count(), 1);
        client.close().await;
    }

    #[tokio::test]
    async fn execute_rejects_empty_database() {
        let client = ClientConfigBuilder::new()
            .address("http://localhost:8086")
            .build()
            .unwrap();
        let stmt = Statement::new("", "SELECT 1");
        let err = client.execute(stmt).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Validation { .. }));
        client.close().await;
    }

    #[tokio::test]
    async fn execute_rejects_unknown_statement_type() {
        let client = ClientConfigBuilder::new()
            .address("http://localhost:8086")
            .build()
            .unwrap();
        let stmt = Statement::new("db0", "FROBNICATE everything");
        let err = client.execute(stmt).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Validation { .. }));
        client.close().await;
    }
}

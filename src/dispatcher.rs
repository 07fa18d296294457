//! The request dispatcher: wires authentication, endpoint selection, and
//! `Interceptor` hook firing around a single [`Transport`] exchange.
//!
//! This is the only place in the crate that decides *which* endpoint to use
//! for a given call and stamps the `Authorization` header; [`Transport`]
//! itself is endpoint-agnostic.

use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, trace};

use crate::auth::{is_auth_exempt, AuthConfig};
use crate::endpoint::EndpointPool;
use crate::error::{InterceptorSnafu, Result};
use crate::transport::{
    decode_query_response, ContentType, QueryRequest, QueryResult, RawResponse, Transport,
    WriteRequest,
};

/// Context passed to [`Interceptor::before_write`]/[`Interceptor::after_write`].
#[derive(Debug, Clone)]
pub struct WriteContext {
    /// Target database.
    pub database: String,
    /// Optional retention policy.
    pub retention_policy: Option<String>,
    /// The exact line-protocol body about to be (or that was) sent.
    pub body: String,
}

/// Context passed to [`Interceptor::before_query`]/[`Interceptor::after_query`].
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Target database.
    pub database: String,
    /// The query text.
    pub query: String,
    /// Optional retention policy.
    pub retention_policy: Option<String>,
}

/// An observability hook pair invoked around write and query calls. Default
/// bodies are no-ops so implementors only override what they need.
pub trait Interceptor: Send + Sync {
    /// Runs before a write is dispatched. Returning `Err` aborts the call.
    fn before_write(&self, ctx: &WriteContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Runs after a write completes, even on a non-2xx response. Returning
    /// `Err` aborts (propagates as) the call's result.
    fn after_write(&self, ctx: &WriteContext, response: &RawResponse) -> Result<()> {
        let _ = (ctx, response);
        Ok(())
    }

    /// Runs before a query is dispatched. Returning `Err` aborts the call.
    fn before_query(&self, ctx: &QueryContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Runs after a query completes, even on a non-2xx response. Returning
    /// `Err` aborts (propagates as) the call's result.
    fn after_query(&self, ctx: &QueryContext, response: &RawResponse) -> Result<()> {
        let _ = (ctx, response);
        Ok(())
    }
}

fn interceptor_err(message: impl Into<String>) -> crate::error::Error {
    InterceptorSnafu {
        message: message.into(),
    }
    .build()
}

/// Builds requests, fires `Interceptor` hooks in registration order, and
/// executes them against the endpoint the pool currently hands out.
pub struct Dispatcher {
    pool: Arc<EndpointPool>,
    transport: Arc<dyn Transport>,
    auth: AuthConfig,
    interceptors: Vec<Arc<dyn Interceptor>>,
    timeout: Duration,
    accept: ContentType,
}

impl Dispatcher {
    /// Build a dispatcher over an already-constructed endpoint pool and
    /// transport.
    pub fn new(
        pool: Arc<EndpointPool>,
        transport: Arc<dyn Transport>,
        auth: AuthConfig,
        interceptors: Vec<Arc<dyn Interceptor>>,
        timeout: Duration,
        accept: ContentType,
    ) -> Self {
        Self {
            pool,
            transport,
            auth,
            interceptors,
            timeout,
            accept,
        }
    }

    fn auth_header(&self, path: &str, method: &str) -> Option<String> {
        if is_auth_exempt(path, method) {
            return None;
        }
        self.auth.header_value()
    }

    /// Dispatch a single write request: pick an endpoint, stamp auth, fire
    /// before/after hooks, and translate the raw response into a [`Result`].
    #[instrument(skip(self, request), fields(db = %request.database))]
    pub async fn dispatch_write(&self, request: WriteRequest) -> Result<()> {
        let endpoint = self.pool.next()?;
        let auth = self.auth_header("/write", "POST");

        let ctx = WriteContext {
            database: request.database.clone(),
            retention_policy: request.retention_policy.clone(),
            body: request.body.clone(),
        };

        for hook in &self.interceptors {
            hook.before_write(&ctx)
                .map_err(|e| interceptor_err(format!("before_write: {e}")))?;
        }

        trace!(url = endpoint.url(), "dispatching write");
        let raw = self
            .transport
            .write(endpoint.url(), auth.as_deref(), &request, self.timeout)
            .await?;

        for hook in &self.interceptors {
            hook.after_write(&ctx, &raw)
                .map_err(|e| interceptor_err(format!("after_write: {e}")))?;
        }

        raw.check_status()
    }

    /// Dispatch a single query request, decoding the response on success.
    #[instrument(skip(self, request), fields(db = %request.database))]
    pub async fn dispatch_query(&self, request: QueryRequest) -> Result<QueryResult> {
        let endpoint = self.pool.next()?;
        let auth = self.auth_header("/query", "GET");

        let ctx = QueryContext {
            database: request.database.clone(),
            query: request.query.clone(),
            retention_policy: request.retention_policy.clone(),
        };

        for hook in &self.interceptors {
            hook.before_query(&ctx)
                .map_err(|e| interceptor_err(format!("before_query: {e}")))?;
        }

        trace!(url = endpoint.url(), "dispatching query");
        let raw = self
            .transport
            .query(endpoint.url(), auth.as_deref(), &request, self.timeout)
            .await?;

        for hook in &self.interceptors {
            hook.after_query(&ctx, &raw)
                .map_err(|e| interceptor_err(format!("after_query: {e}")))?;
        }

        decode_query_response(&raw, self.accept)
    }

    /// Ping one endpoint the pool currently hands out. Does not affect the
    /// pool's liveness accounting; that is the background health checker's
    /// job alone.
    pub async fn ping(&self, connect_timeout: Duration) -> Result<bool> {
        let endpoint = self.pool.next()?;
        self.transport.ping(endpoint.url(), connect_timeout).await
    }
}

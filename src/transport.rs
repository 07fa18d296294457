//! The `Transport` capability: HTTP verbs, body compression, and response
//! deserialization are deliberately pluggable. This module defines the
//! trait contract plus one concrete implementation (`ReqwestTransport`)
//! built on `reqwest`, so the crate is runnable without requiring callers
//! to write their own transport.

use std::io::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;
use snafu::ResultExt;

use crate::error::{CodecSnafu, HttpSnafu, Result, ServerSnafu, TransportSnafu};

/// How (if at all) a write body is compressed before it is sent, and what
/// `Accept-Encoding` a query advertises for the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressMethod {
    /// No compression.
    #[default]
    None,
    /// gzip, implemented against `flate2` by [`ReqwestTransport`].
    Gzip,
    /// zstd. Forwarded to the configured `Transport` as a configuration
    /// value; the default transport does not implement a zstd codec.
    Zstd,
    /// Snappy. Same caveat as `Zstd`.
    Snappy,
}

/// `application/x-msgpack` or `application/json` for the `Accept` header on
/// query requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    /// `application/json`.
    #[default]
    Json,
    /// `application/x-msgpack`.
    MsgPack,
}

impl ContentType {
    pub(crate) fn accept_header(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::MsgPack => "application/x-msgpack",
        }
    }
}

/// A fully prepared write, ready to be handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Target database.
    pub database: String,
    /// Optional retention policy.
    pub retention_policy: Option<String>,
    /// Line-protocol encoded body.
    pub body: String,
    /// Compression to apply to the body.
    pub compress: CompressMethod,
}

/// A fully prepared query, ready to be handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Target database.
    pub database: String,
    /// The query text (forwarded verbatim; server-side bound parameters are
    /// not substituted client-side).
    pub query: String,
    /// Optional retention policy.
    pub retention_policy: Option<String>,
    /// `Precision::epoch()` string for the `epoch` query parameter.
    pub epoch: &'static str,
    /// Desired response content type.
    pub accept: ContentType,
}

/// The deserialized shape of a query response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResult {
    /// Per-statement results.
    #[serde(default)]
    pub results: Vec<StatementResult>,
    /// A top-level error, if the whole request failed logically.
    #[serde(default)]
    pub error: Option<String>,
}

/// One statement's worth of series data within a [`QueryResult`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementResult {
    /// Series returned by this statement.
    #[serde(default)]
    pub series: Vec<Series>,
    /// A per-statement error.
    #[serde(default)]
    pub error: Option<String>,
}

/// A single named, tagged table of rows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Series {
    /// Measurement name.
    #[serde(default)]
    pub name: String,
    /// Tags identifying this series.
    #[serde(default)]
    pub tags: std::collections::BTreeMap<String, String>,
    /// Column names, in the order values appear.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Row values, each aligned with `columns`.
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// The raw HTTP exchange, kept around (status + body) so an `after_*`
/// `Interceptor` hook can inspect it even when the status is not 2xx.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The raw response body.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Fail with [`crate::error::Error::Http`] if the status is not 2xx.
    pub fn check_status(&self) -> Result<()> {
        if (200..300).contains(&self.status) {
            return Ok(());
        }
        HttpSnafu {
            status: self.status,
            text: String::from_utf8_lossy(&self.body).into_owned(),
        }
        .fail()
    }
}

/// Decode a query [`RawResponse`] into a [`QueryResult`], checking both the
/// HTTP status and the InfluxDB-level `error` fields.
pub fn decode_query_response(raw: &RawResponse, accept: ContentType) -> Result<QueryResult> {
    raw.check_status()?;

    let result: QueryResult = match accept {
        ContentType::Json => {
            serde_json::from_slice(&raw.body).with_context(|_| CodecSnafu {
                message: "failed to deserialize JSON query response".to_string(),
            })?
        }
        ContentType::MsgPack => {
            // No msgpack deserializer ships by default; a pluggable
            // `Transport` may decode it. The default transport treats
            // this as a codec error rather than silently mis-parsing.
            return CodecSnafu {
                message: "msgpack response decoding requires a custom Transport".to_string(),
            }
            .fail();
        }
    };

    result.check_server_errors()?;
    Ok(result)
}

impl QueryResult {
    /// Fail with [`crate::error::Error::Server`] if either the top-level or
    /// any per-statement `error` field is non-empty.
    pub fn check_server_errors(&self) -> Result<()> {
        if let Some(message) = &self.error {
            if !message.is_empty() {
                return ServerSnafu {
                    message: message.clone(),
                }
                .fail();
            }
        }
        for statement in &self.results {
            if let Some(message) = &statement.error {
                if !message.is_empty() {
                    return ServerSnafu {
                        message: message.clone(),
                    }
                    .fail();
                }
            }
        }
        Ok(())
    }
}

/// The pluggable HTTP capability. The core calls this trait's methods only
/// through [`crate::endpoint::EndpointPool`]-selected base URLs; it never
/// constructs requests itself.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET the ping path. Returns `true` iff the server answered `204 No
    /// Content`, the only status this crate treats as authoritative "up".
    async fn ping(&self, base_url: &str, connect_timeout: Duration) -> Result<bool>;

    /// POST line protocol to `/write`. Returns the raw response regardless
    /// of status code; callers decide how to interpret non-2xx (see
    /// [`RawResponse::check_status`]). Only genuine transport-level
    /// failures (connect refused, TLS failure, timeout) return `Err`.
    async fn write(
        &self,
        base_url: &str,
        auth_header: Option<&str>,
        request: &WriteRequest,
        timeout: Duration,
    ) -> Result<RawResponse>;

    /// GET `/query`. Same raw-response contract as [`Transport::write`].
    async fn query(
        &self,
        base_url: &str,
        auth_header: Option<&str>,
        request: &QueryRequest,
        timeout: Duration,
    ) -> Result<RawResponse>;
}

/// The default [`Transport`], built on `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport whose connection pool is bounded by
    /// `max_conns_per_host`/`max_idle_conns_per_host`.
    pub fn new(max_conns_per_host: usize, max_idle_conns_per_host: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(max_idle_conns_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            // reqwest has no direct "max total conns per host" knob; the
            // idle pool bound is the closest first-class equivalent, and
            // concurrency is otherwise limited by `MaxConnsPerHost`'s
            // logical intent being enforced by callers' own fan-out.
            .tcp_nodelay(true)
            .build()
            .map_err(|e| TransportSnafu { source: Box::new(e) as _ }.build())?;
        let _ = max_conns_per_host;
        Ok(Self { client })
    }
}

fn gzip_compress(body: &str) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(body.as_bytes())
        .and_then(|_| encoder.finish())
        .map_err(|e| {
            CodecSnafu {
                message: format!("gzip compression failed: {e}"),
            }
            .build()
        })
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn ping(&self, base_url: &str, connect_timeout: Duration) -> Result<bool> {
        let url = format!("{base_url}/ping");
        let response = self
            .client
            .get(&url)
            .timeout(connect_timeout)
            .send()
            .await;

        match response {
            Ok(resp) => Ok(resp.status().as_u16() == 204),
            Err(_) => Ok(false),
        }
    }

    async fn write(
        &self,
        base_url: &str,
        auth_header: Option<&str>,
        request: &WriteRequest,
        timeout: Duration,
    ) -> Result<RawResponse> {
        let url = format!("{base_url}/write");
        let mut query = vec![("db".to_string(), request.database.clone())];
        if let Some(rp) = &request.retention_policy {
            query.push(("rp".to_string(), rp.clone()));
        }

        let mut builder = self.client.post(&url).query(&query).timeout(timeout);
        if let Some(auth) = auth_header {
            builder = builder.header("Authorization", auth);
        }

        builder = match request.compress {
            CompressMethod::Gzip => {
                let compressed = gzip_compress(&request.body)?;
                builder.header("Content-Encoding", "gzip").body(compressed)
            }
            CompressMethod::Zstd | CompressMethod::Snappy => {
                // Pass-through configuration only; a pluggable `Transport`
                // may implement these codecs, the default one does not.
                builder.body(request.body.clone())
            }
            CompressMethod::None => builder.body(request.body.clone()),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportSnafu { source: Box::new(e) as _ }.build())?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportSnafu { source: Box::new(e) as _ }.build())?
            .to_vec();

        Ok(RawResponse { status, body })
    }

    async fn query(
        &self,
        base_url: &str,
        auth_header: Option<&str>,
        request: &QueryRequest,
        timeout: Duration,
    ) -> Result<RawResponse> {
        let url = format!("{base_url}/query");
        let mut query = vec![
            ("db".to_string(), request.database.clone()),
            ("q".to_string(), request.query.clone()),
            ("epoch".to_string(), request.epoch.to_string()),
        ];
        if let Some(rp) = &request.retention_policy {
            query.push(("rp".to_string(), rp.clone()));
        }

        let mut builder = self
            .client
            .get(&url)
            .query(&query)
            .header("Accept", request.accept.accept_header())
            .timeout(timeout);
        if let Some(auth) = auth_header {
            builder = builder.header("Authorization", auth);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportSnafu { source: Box::new(e) as _ }.build())?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportSnafu { source: Box::new(e) as _ }.build())?
            .to_vec();

        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_result_surfaces_top_level_error() {
        let qr = QueryResult {
            results: vec![],
            error: Some("database not found".to_string()),
        };
        assert!(qr.check_server_errors().is_err());
    }

    #[test]
    fn query_result_surfaces_statement_error() {
        let qr = QueryResult {
            results: vec![StatementResult {
                series: vec![],
                error: Some("boom".to_string()),
            }],
            error: None,
        };
        assert!(qr.check_server_errors().is_err());
    }

    #[test]
    fn query_result_empty_errors_are_ok() {
        let qr = QueryResult {
            results: vec![StatementResult {
                series: vec![],
                error: Some(String::new()),
            }],
            error: Some(String::new()),
        };
        assert!(qr.check_server_errors().is_ok());
    }

    #[test]
    fn raw_response_check_status_rejects_non_2xx() {
        let raw = RawResponse {
            status: 500,
            body: b"boom".to_vec(),
        };
        let err = raw.check_status().unwrap_err();
        assert!(matches!(err, crate::error::Error::Http { status: 500, .. }));
    }

    #[test]
    fn decode_query_response_rejects_non_2xx_before_parsing() {
        let raw = RawResponse {
            status: 503,
            body: b"not even json".to_vec(),
        };
        let err = decode_query_response(&raw, ContentType::Json).unwrap_err();
        assert!(matches!(err, crate::error::Error::Http { status: 503, .. }));
    }

    #[test]
    fn decode_query_response_parses_json_body() {
        let raw = RawResponse {
            status: 200,
            body: br#"{"results":[{"series":[]}]}"#.to_vec(),
        };
        let result = decode_query_response(&raw, ContentType::Json).unwrap();
        assert_eq!(result.results.len(), 1);
    }

    #[test]
    fn gzip_round_trips() {
        let compressed = gzip_compress("m0 f=1i").unwrap();
        assert_ne!(compressed, b"m0 f=1i");
        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut out = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut out).unwrap();
        assert_eq!(out, "m0 f=1i");
    }
}

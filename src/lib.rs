//! A client for InfluxDB 1.x-compatible time-series HTTP APIs.
//!
//! The crate is organized around the pieces of a single write/query round
//! trip: [`point`] and [`line_protocol`] are the data model and wire codec,
//! [`classify`] and [`parser`] turn a free-form statement into structured
//! data, [`binder`] resolves `$name` placeholders against it, [`endpoint`]
//! and [`dispatcher`] pick a server and fire the HTTP exchange, and
//! [`batch`] coalesces many writes into fewer round trips. [`client`] wires
//! all of it together behind a single [`Client`].
//!
//! ```no_run
//! use influxdb_client::{AuthConfig, Client, Point};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::builder()
//!     .address("http://localhost:8086")
//!     .auth(AuthConfig::Token { token: "my-token".to_string() })
//!     .batch(500, std::time::Duration::from_secs(1))
//!     .build()?;
//!
//! let point = Point::builder("weather")
//!     .tag("location", "beijing")
//!     .field("temperature", 25.5)
//!     .now();
//! client.write_point("telemetry", None, point.build()?).await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod batch;
pub mod binder;
pub mod classify;
pub mod client;
pub mod commands;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod line_protocol;
pub mod metrics_sink;
pub mod parser;
pub mod point;
pub mod statement;
pub mod transport;

pub use auth::AuthConfig;
pub use batch::BatchConfig;
pub use binder::Params;
pub use classify::StatementType;
pub use client::{Client, ClientConfigBuilder};
pub use dispatcher::Interceptor;
pub use error::{Error, Result, SharedError};
pub use metrics_sink::{MetricsSink, NoopMetricsSink};
pub use point::{FieldValue, Point, PointBuilder, Precision};
pub use statement::{ExecuteResult, Statement};
pub use transport::{CompressMethod, ContentType, QueryResult, Series, StatementResult, Transport};

#[cfg(feature = "metrics-prometheus")]
pub use metrics_sink::PrometheusMetricsSink;

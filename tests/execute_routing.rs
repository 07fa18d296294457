//! End-to-end coverage of `Client::execute` routing against a scripted
//! `Transport`, without any real network I/O.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use influxdb_client::{Client, Statement};

use influxdb_client::transport::{QueryRequest, RawResponse, Transport, WriteRequest};

struct ScriptedTransport {
    writes_seen: Arc<AtomicUsize>,
    last_write_body: Arc<std::sync::Mutex<Option<String>>>,
    query_body: &'static [u8],
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn ping(
        &self,
        _base_url: &str,
        _timeout: Duration,
    ) -> influxdb_client::Result<bool> {
        Ok(true)
    }

    async fn write(
        &self,
        _base_url: &str,
        _auth: Option<&str>,
        request: &WriteRequest,
        _timeout: Duration,
    ) -> influxdb_client::Result<RawResponse> {
        self.writes_seen.fetch_add(1, Ordering::Relaxed);
        *self.last_write_body.lock().unwrap() = Some(request.body.clone());
        Ok(RawResponse {
            status: 204,
            body: Vec::new(),
        })
    }

    async fn query(
        &self,
        _base_url: &str,
        _auth: Option<&str>,
        _request: &QueryRequest,
        _timeout: Duration,
    ) -> influxdb_client::Result<RawResponse> {
        Ok(RawResponse {
            status: 200,
            body: self.query_body.to_vec(),
        })
    }
}

fn build_client(transport: Arc<dyn Transport>) -> Client {
    Client::builder()
        .address("http://localhost:8086")
        .transport(transport)
        .build()
        .unwrap()
}

#[tokio::test]
async fn query_like_statement_reaches_query_path() {
    let transport = Arc::new(ScriptedTransport {
        writes_seen: Arc::new(AtomicUsize::new(0)),
        last_write_body: Arc::new(std::sync::Mutex::new(None)),
        query_body: br#"{"results":[{"series":[{"name":"m0","columns":["time","v"],"values":[[0,1]]}]}]}"#,
    });
    let client = build_client(transport);

    let stmt = Statement::new("telemetry", "SELECT * FROM m0");
    let result = client.execute(stmt).await.unwrap();

    assert_eq!(result.affected_rows, 0);
    let query_result = result.query_result.unwrap();
    assert_eq!(query_result.results.len(), 1);
    assert_eq!(query_result.results[0].series[0].name, "m0");

    client.close().await;
}

#[tokio::test]
async fn command_statement_reports_one_affected_row() {
    let transport = Arc::new(ScriptedTransport {
        writes_seen: Arc::new(AtomicUsize::new(0)),
        last_write_body: Arc::new(std::sync::Mutex::new(None)),
        query_body: br#"{"results":[{}]}"#,
    });
    let client = build_client(transport);

    let stmt = Statement::new("telemetry", "CREATE DATABASE telemetry");
    let result = client.execute(stmt).await.unwrap();

    assert_eq!(result.affected_rows, 1);
    client.close().await;
}

#[tokio::test]
async fn insert_statement_parses_binds_and_writes() {
    let writes_seen = Arc::new(AtomicUsize::new(0));
    let last_write_body = Arc::new(std::sync::Mutex::new(None));
    let transport = Arc::new(ScriptedTransport {
        writes_seen: writes_seen.clone(),
        last_write_body: last_write_body.clone(),
        query_body: b"{}",
    });
    let client = build_client(transport);

    let mut params = influxdb_client::Params::new();
    params.insert(
        "loc".to_string(),
        influxdb_client::FieldValue::String("beijing,fake=evil".to_string()),
    );
    params.insert(
        "temp".to_string(),
        influxdb_client::FieldValue::F64(25.5),
    );

    let stmt = Statement::new(
        "telemetry",
        "INSERT weather,location=$loc temperature=$temp",
    )
    .with_params(params);

    let result = client.execute(stmt).await.unwrap();
    assert_eq!(result.affected_rows, 1);
    assert_eq!(writes_seen.load(Ordering::Relaxed), 1);

    let body = last_write_body.lock().unwrap().clone().unwrap();
    assert!(body.starts_with(r#"weather,location=beijing\,fake\=evil temperature=25.5"#));
    assert!(!body.contains("fake=evil,"));

    client.close().await;
}

#[tokio::test]
async fn unknown_statement_is_rejected() {
    let transport = Arc::new(ScriptedTransport {
        writes_seen: Arc::new(AtomicUsize::new(0)),
        last_write_body: Arc::new(std::sync::Mutex::new(None)),
        query_body: b"{}",
    });
    let client = build_client(transport);

    let stmt = Statement::new("telemetry", "FROBNICATE x");
    let err = client.execute(stmt).await.unwrap_err();
    assert!(matches!(err, influxdb_client::Error::Validation { .. }));

    client.close().await;
}

#[tokio::test]
async fn batched_writes_coalesce_into_fewer_transport_calls() {
    let writes_seen = Arc::new(AtomicUsize::new(0));
    let transport = Arc::new(ScriptedTransport {
        writes_seen: writes_seen.clone(),
        last_write_body: Arc::new(std::sync::Mutex::new(None)),
        query_body: b"{}",
    });

    let client = Client::builder()
        .address("http://localhost:8086")
        .transport(transport)
        .batch(5, Duration::from_secs(60))
        .build()
        .unwrap();

    let client = Arc::new(client);
    let mut handles = Vec::new();
    for i in 0..5 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let point = influxdb_client::Point::builder("m0")
                .field("v", i as i64)
                .build()
                .unwrap();
            client.write_point("telemetry", None, point).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(writes_seen.load(Ordering::Relaxed), 1);
    client.close().await;
}

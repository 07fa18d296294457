//! The telemetry surface: a small trait the client calls into at
//! well-defined points, with a no-op default so metrics are entirely
//! opt-in.

use std::time::Duration;

/// Observability hook invoked by the batch writer and the endpoint pool.
///
/// All methods take `&self` with default no-op bodies so implementors only
/// override the events they care about.
pub trait MetricsSink: Send + Sync {
    /// A write attempt (batched or direct) is about to be issued for
    /// `(db, rp)`.
    fn write_attempted(&self, db: &str, rp: &str) {
        let _ = (db, rp);
    }

    /// A write for `(db, rp)` succeeded, covering `points` points and
    /// taking `elapsed` end to end.
    fn write_succeeded(&self, db: &str, rp: &str, points: usize, elapsed: Duration) {
        let _ = (db, rp, points, elapsed);
    }

    /// A write for `(db, rp)` failed.
    fn write_failed(&self, db: &str, rp: &str) {
        let _ = (db, rp);
    }

    /// The health checker flipped `url` from up to down.
    fn endpoint_marked_down(&self, url: &str) {
        let _ = url;
    }

    /// The health checker flipped `url` from down back to up.
    fn endpoint_marked_up(&self, url: &str) {
        let _ = url;
    }
}

/// The default [`MetricsSink`]: every event is discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {}

#[cfg(feature = "metrics-prometheus")]
mod prometheus {
    use super::MetricsSink;
    use std::time::Duration;

    /// A [`MetricsSink`] that records events through the `metrics` facade,
    /// intended to be paired with `metrics_exporter_prometheus`'s recorder
    /// installed by the binary embedding this crate.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PrometheusMetricsSink;

    impl MetricsSink for PrometheusMetricsSink {
        fn write_attempted(&self, db: &str, rp: &str) {
            metrics::counter!(
                "influxdb_client_writes_attempted_total",
                "db" => db.to_string(),
                "rp" => rp.to_string()
            )
            .increment(1);
        }

        fn write_succeeded(&self, db: &str, rp: &str, points: usize, elapsed: Duration) {
            let labels = [("db", db.to_string()), ("rp", rp.to_string())];
            metrics::counter!("influxdb_client_writes_succeeded_total", &labels).increment(1);
            metrics::counter!("influxdb_client_points_written_total", &labels)
                .increment(points as u64);
            metrics::histogram!("influxdb_client_write_duration_seconds", &labels)
                .record(elapsed.as_secs_f64());
        }

        fn write_failed(&self, db: &str, rp: &str) {
            metrics::counter!(
                "influxdb_client_writes_failed_total",
                "db" => db.to_string(),
                "rp" => rp.to_string()
            )
            .increment(1);
        }

        fn endpoint_marked_down(&self, url: &str) {
            metrics::counter!("influxdb_client_endpoint_marked_down_total", "url" => url.to_string())
                .increment(1);
        }

        fn endpoint_marked_up(&self, url: &str) {
            metrics::counter!("influxdb_client_endpoint_marked_up_total", "url" => url.to_string())
                .increment(1);
        }
    }
}

#[cfg(feature = "metrics-prometheus")]
pub use prometheus::PrometheusMetricsSink;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_accepts_all_events_without_panicking() {
        let sink = NoopMetricsSink;
        sink.write_attempted("db", "rp");
        sink.write_succeeded("db", "rp", 10, Duration::from_millis(5));
        sink.write_failed("db", "rp");
        sink.endpoint_marked_down("http://a");
        sink.endpoint_marked_up("http://a");
    }
}

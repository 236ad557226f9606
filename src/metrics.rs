//! Prometheus metrics (feature `metrics`) and tracing spans (feature `tracing`).

#[cfg(feature = "metrics")]
pub use prometheus_metrics::{CashdeskMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
        KeyValue,
    };
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<CashdeskMetrics> = Lazy::new(CashdeskMetrics::init);

    pub struct CashdeskMetrics {
        registry: Registry,
        _provider: Option<SdkMeterProvider>,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub pool_wait_duration: Histogram<f64>,
        pub pool_exhausted_total: Counter<u64>,
        pub login_attempts_total: Counter<u64>,
        pub operations_saved_total: Counter<u64>,
        pub audit_records_total: Counter<u64>,
    }

    impl CashdeskMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => {
                    let provider = SdkMeterProvider::builder().with_reader(exporter).build();
                    global::set_meter_provider(provider.clone());
                    Some(provider)
                }
                Err(e) => {
                    log::warn!("prometheus exporter unavailable, metrics disabled: {}", e);
                    None
                }
            };
            let meter = global::meter("cashdesk");

            let queries_total = meter
                .u64_counter("cashdesk_queries_total")
                .with_description("Total statements executed")
                .build();

            let query_errors_total = meter
                .u64_counter("cashdesk_query_errors_total")
                .with_description("Statements that returned an error")
                .build();

            let query_duration = meter
                .f64_histogram("cashdesk_query_duration_seconds")
                .with_description("Duration of statements")
                .build();

            let pool_wait_duration = meter
                .f64_histogram("cashdesk_pool_wait_seconds")
                .with_description("Time spent waiting for a pooled connection")
                .build();

            let pool_exhausted_total = meter
                .u64_counter("cashdesk_pool_exhausted_total")
                .with_description("Acquisitions that gave up after the pool timeout")
                .build();

            let login_attempts_total = meter
                .u64_counter("cashdesk_login_attempts_total")
                .with_description("Login attempts by outcome")
                .build();

            let operations_saved_total = meter
                .u64_counter("cashdesk_operations_saved_total")
                .with_description("Daily snapshots saved, by whether a row was created")
                .build();

            let audit_records_total = meter
                .u64_counter("cashdesk_audit_records_total")
                .with_description("Audit records appended")
                .build();

            Self {
                registry,
                _provider: provider,
                queries_total,
                query_errors_total,
                query_duration,
                pool_wait_duration,
                pool_exhausted_total,
                login_attempts_total,
                operations_saved_total,
                audit_records_total,
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_pool_wait(&self, elapsed: Duration) {
            self.pool_wait_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_pool_exhausted(&self) {
            self.pool_exhausted_total.add(1, &[]);
        }

        pub fn record_login(&self, outcome: &'static str) {
            self.login_attempts_total
                .add(1, &[KeyValue::new("outcome", outcome)]);
        }

        pub fn record_operation_saved(&self, created: bool) {
            self.operations_saved_total
                .add(1, &[KeyValue::new("created", created)]);
        }

        pub fn record_audit_append(&self) {
            self.audit_records_total.add(1, &[]);
        }

        /// Render the registry in the Prometheus text exposition format.
        pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
            let encoder = TextEncoder::new();
            let mut buffer = Vec::new();
            encoder.encode(&self.registry.gather(), &mut buffer)?;
            Ok(buffer)
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{debug_span, info_span, Span};

    pub fn open_connection_span() -> Span {
        info_span!("cashdesk.connection.open")
    }

    pub fn acquire_connection_span() -> Span {
        debug_span!("cashdesk.pool.acquire")
    }

    pub fn begin_transaction_span() -> Span {
        debug_span!("cashdesk.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        debug_span!("cashdesk.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        debug_span!("cashdesk.transaction.rollback")
    }

    pub fn execute_query_span(query: &str) -> Span {
        debug_span!("cashdesk.query", db.statement = query)
    }

    pub fn request_span(method: &str, path: &str) -> Span {
        info_span!("cashdesk.request", http.method = method, http.path = path)
    }
}

//! Gateway: parses operations against the schema and executes them over HTTP.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::operation::{ExecutionResult, GraphqlRequest, Operation, OperationKind, SourceLocation};
use crate::schema::Schema;
use crate::transport::{ApiContext, Transport};

/// Process-wide gateway set by [`Gateway::install`].
static GLOBAL: OnceLock<Gateway> = OnceLock::new();

/// Gateway request counters.
#[derive(Debug, Default)]
#[allow(clippy::struct_field_names)]
pub struct GatewayMetrics {
    requests_total: AtomicU64,
    requests_success: AtomicU64,
    requests_graphql_error: AtomicU64,
    requests_throttled: AtomicU64,
    requests_failed: AtomicU64,
}

impl GatewayMetrics {
    /// Snapshot current metrics.
    #[must_use]
    pub fn snapshot(&self) -> GatewayMetricsSnapshot {
        GatewayMetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success: self.requests_success.load(Ordering::Relaxed),
            requests_graphql_error: self.requests_graphql_error.load(Ordering::Relaxed),
            requests_throttled: self.requests_throttled.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &GatewayResult<ExecutionResult>) {
        let counter = match outcome {
            Ok(_) => &self.requests_success,
            Err(GatewayError::Throttled { .. }) => &self.requests_throttled,
            Err(GatewayError::Graphql { .. }) => &self.requests_graphql_error,
            Err(_) => &self.requests_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_field_names)]
pub struct GatewayMetricsSnapshot {
    /// Requests sent.
    pub requests_total: u64,
    /// Requests that returned no GraphQL errors.
    pub requests_success: u64,
    /// Requests that returned standard GraphQL errors.
    pub requests_graphql_error: u64,
    /// Requests rejected by rate limiting.
    pub requests_throttled: u64,
    /// Transport, status and decoding failures.
    pub requests_failed: u64,
}

#[derive(Debug, Clone)]
enum SchemaSource {
    Shared,
    Path(PathBuf),
    Loaded(Arc<Schema>),
}

/// Gateway builder.
#[derive(Debug, Clone)]
pub struct GatewayBuilder {
    context: Arc<dyn ApiContext>,
    schema: SchemaSource,
    config: GatewayConfig,
}

impl GatewayBuilder {
    /// Create a builder that reads site and headers from `context`.
    #[must_use]
    pub fn new(context: Arc<dyn ApiContext>) -> Self {
        Self {
            context,
            schema: SchemaSource::Shared,
            config: GatewayConfig::default(),
        }
    }

    /// Use an already loaded schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = SchemaSource::Loaded(schema);
        self
    }

    /// Load the schema from `path` instead of the bundled one.
    #[must_use]
    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema = SchemaSource::Path(path.into());
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the service name used in logs.
    #[must_use]
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.config.service_name = service_name.into();
        self
    }

    /// Set timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Build the gateway. Fails when the schema cannot be loaded.
    pub fn build(self) -> GatewayResult<Gateway> {
        let schema = match self.schema {
            SchemaSource::Shared => Schema::shared()?,
            SchemaSource::Path(path) => Arc::new(Schema::load(path)?),
            SchemaSource::Loaded(schema) => schema,
        };
        let http = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .user_agent(self.config.user_agent.clone())
            .build()?;

        Ok(Gateway {
            http,
            schema,
            transport: Transport::new(self.context),
            config: self.config,
            metrics: Arc::new(GatewayMetrics::default()),
        })
    }
}

/// Shopify Admin GraphQL gateway.
#[derive(Debug, Clone)]
pub struct Gateway {
    http: reqwest::Client,
    schema: Arc<Schema>,
    transport: Transport,
    config: GatewayConfig,
    metrics: Arc<GatewayMetrics>,
}

impl Gateway {
    /// Start building a gateway.
    #[must_use]
    pub fn builder(context: Arc<dyn ApiContext>) -> GatewayBuilder {
        GatewayBuilder::new(context)
    }

    /// Make this gateway the process-wide instance.
    ///
    /// Only the first installed gateway is kept; later calls return it unchanged.
    pub fn install(self) -> &'static Self {
        GLOBAL.get_or_init(|| self)
    }

    /// The process-wide gateway.
    pub fn global() -> GatewayResult<&'static Self> {
        GLOBAL.get().ok_or_else(|| GatewayError::Configuration {
            message: "no gateway has been installed".to_string(),
        })
    }

    /// Schema used for validation.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Endpoint the next request would go to.
    pub fn endpoint_url(&self) -> GatewayResult<Url> {
        self.transport.endpoint_url()
    }

    /// Return gateway metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> GatewayMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Parse and validate query text, recording the caller's location.
    #[track_caller]
    pub fn parse(&self, text: &str) -> GatewayResult<Operation> {
        self.parse_at(text, None, None)
    }

    /// Parse and validate query text with explicit location metadata.
    ///
    /// When both `file` and `line` are `None` the caller's location is used.
    #[track_caller]
    pub fn parse_at(
        &self,
        text: &str,
        file: Option<&str>,
        line: Option<u32>,
    ) -> GatewayResult<Operation> {
        let source = match SourceLocation::explicit(file, line) {
            Some(source) => source,
            None => SourceLocation::caller(),
        };
        let operation = Operation::parse(text, Some(source))?;
        self.schema.validate(&operation)?;
        Ok(operation)
    }

    /// Execute an operation.
    ///
    /// Any GraphQL error in the response is returned as a single
    /// [`GatewayError::Throttled`] or [`GatewayError::Graphql`]; no retries
    /// are attempted.
    #[instrument(
        skip_all,
        fields(
            service = %self.config.service_name,
            operation = operation.name().unwrap_or("anonymous")
        )
    )]
    pub async fn query(
        &self,
        operation: &Operation,
        variables: Option<serde_json::Value>,
    ) -> GatewayResult<ExecutionResult> {
        if operation.kind() == OperationKind::Subscription {
            return Err(GatewayError::Validation {
                message: "subscriptions cannot be executed over HTTP".to_string(),
                location: operation.source().cloned(),
            });
        }

        self.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
        let outcome = self.send(operation, variables).await;
        self.metrics.record(&outcome);

        if let Err(err) = &outcome {
            if err.is_throttled() {
                warn!(retry_after = ?err.retry_after(), "GraphQL request throttled");
            } else {
                warn!(error = %err, "GraphQL request failed");
            }
        }
        outcome
    }

    async fn send(
        &self,
        operation: &Operation,
        variables: Option<serde_json::Value>,
    ) -> GatewayResult<ExecutionResult> {
        let url = self.transport.endpoint_url()?;
        let body = serde_json::to_vec(&GraphqlRequest::new(operation, variables))?;
        debug!(%url, bytes = body.len(), "Sending GraphQL request");

        let response = self
            .http
            .post(url)
            .headers(self.transport.headers())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let bytes = response.bytes().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::Throttled {
                message: format!("HTTP {status}: {}", truncate_body(&bytes)),
                retry_after,
                errors: Vec::new(),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::HttpStatus {
                status,
                body: truncate_body(&bytes),
            });
        }

        let result: ExecutionResult = serde_json::from_slice(&bytes)?;
        result.check()
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let seconds = value.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

fn truncate_body(bytes: &[u8]) -> String {
    const MAX_LEN: usize = 4096;
    let mut body = String::from_utf8_lossy(bytes).to_string();
    if body.len() > MAX_LEN {
        let mut end = MAX_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push('…');
    }
    body
}

//! Prometheus client for request-flow telemetry.
//!
//! Queries a Prometheus-compatible backend for the request-flow series of a
//! set of source workloads and returns one [`EdgeSample`] per observed label
//! set. With a [`TimeWindow`] a ranged query is issued and folded down to
//! distinct label sets; without one a single instant query is issued.

mod response;

use std::time::Duration;

use meshctx_shared::{
    EdgeSample, MeshCtxError, PrometheusInstance, Result, TimeWindow, UpstreamError, Workload,
};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, info, instrument};

use response::QueryResponse;

/// Client-side timeout for every backend round trip.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default sampling step for range queries.
pub const DEFAULT_STEP: &str = "15s";

/// Default request-flow series.
pub const DEFAULT_METRIC: &str = "istio_requests_total";

/// Longest error body echoed back in [`UpstreamError::HttpStatus`].
const MAX_ERROR_BODY: usize = 512;

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("meshctx/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Build the shared HTTP client for a Prometheus instance.
///
/// Carries the fixed request timeout, the instance's extra headers, and
/// disables certificate verification when `disable_ssl` is set. Build it
/// once at startup and hand it to [`PrometheusClient::new`].
pub fn build_http_client(instance: &PrometheusInstance) -> Result<Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in &instance.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            MeshCtxError::config(format!("invalid header name '{name}': {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            MeshCtxError::config(format!("invalid value for header '{name}': {e}"))
        })?;
        headers.insert(name, value);
    }

    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .default_headers(headers)
        .danger_accept_invalid_certs(instance.disable_ssl)
        .build()
        .map_err(|e| MeshCtxError::config(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// PrometheusClient
// ---------------------------------------------------------------------------

/// Issues edge queries against one Prometheus base URL.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    base_url: String,
    http: Client,
    metric: String,
    step: String,
}

impl PrometheusClient {
    /// Create a client for `base_url` using an injected HTTP client.
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http,
            metric: DEFAULT_METRIC.to_string(),
            step: DEFAULT_STEP.to_string(),
        }
    }

    /// Query `metric` instead of [`DEFAULT_METRIC`].
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }

    /// Use `step` for range queries instead of [`DEFAULT_STEP`].
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = step.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the request-flow samples emitted by `sources`.
    ///
    /// Fails with `InvalidInput` before any network call when `sources` is
    /// empty. Transport failures, non-2xx answers, undecodable bodies and
    /// non-"success" statuses all surface as [`MeshCtxError::Upstream`].
    #[instrument(skip_all, fields(sources = sources.len(), ranged = window.is_some()))]
    pub async fn fetch_edges(
        &self,
        sources: &[Workload],
        window: Option<&TimeWindow>,
    ) -> Result<Vec<EdgeSample>> {
        if sources.is_empty() {
            return Err(MeshCtxError::invalid_input("no source workloads provided"));
        }

        let query = edge_query(&self.metric, sources);
        match window {
            Some(window) => self.query_range(&query, window).await,
            None => self.query_instant(&query).await,
        }
    }

    /// Run an instant query and return every series.
    pub async fn query_instant(&self, query: &str) -> Result<Vec<EdgeSample>> {
        let url = format!("{}/api/v1/query", self.base_url);
        info!(%query, "querying Prometheus (instant)");

        let data = self.get(&url, &[("query", query.to_string())]).await?;
        let samples = data.into_samples();

        info!(results = samples.len(), "retrieved results from Prometheus");
        Ok(samples)
    }

    /// Run a range query over `window` and fold it to distinct label sets.
    pub async fn query_range(&self, query: &str, window: &TimeWindow) -> Result<Vec<EdgeSample>> {
        let url = format!("{}/api/v1/query_range", self.base_url);
        info!(
            %query,
            from = %window.from().to_rfc3339(),
            to = %window.to().to_rfc3339(),
            step = %self.step,
            "querying Prometheus (range)"
        );

        let params = [
            ("query", query.to_string()),
            ("start", window.from().timestamp().to_string()),
            ("end", window.to().timestamp().to_string()),
            ("step", self.step.clone()),
        ];
        let data = self.get(&url, &params).await?;
        let samples = data.fold_to_instant();

        info!(
            unique = samples.len(),
            "retrieved unique series from Prometheus range query"
        );
        Ok(samples)
    }

    /// GET `url` and unwrap the API envelope.
    async fn get(&self, url: &str, params: &[(&str, String)]) -> Result<response::QueryData> {
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(url, &e))?;

        if !status.is_success() {
            // Prometheus reports rejected queries as 4xx/5xx with a JSON
            // envelope; prefer that over a bare status code.
            if let Ok(envelope) = QueryResponse::parse(url, &body) {
                debug!(%status, "backend returned error envelope");
                envelope.into_data()?;
            }
            return Err(UpstreamError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            }
            .into());
        }

        QueryResponse::parse(url, &body)?.into_data()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build the PromQL selector matching series emitted by any of `sources`.
///
/// Names are regex-escaped so the alternation only matches exact names, then
/// escaped again for the PromQL double-quoted string literal.
pub fn edge_query(metric: &str, sources: &[Workload]) -> String {
    let alternation = sources
        .iter()
        .map(|w| regex::escape(w.as_str()))
        .collect::<Vec<_>>()
        .join("|");
    let literal = alternation.replace('\\', "\\\\").replace('"', "\\\"");
    format!(r#"{metric}{{source_workload=~"{literal}"}}"#)
}

fn transport_error(url: &str, err: &reqwest::Error) -> MeshCtxError {
    let message = if err.is_timeout() {
        format!("timed out: {err}")
    } else {
        err.to_string()
    };
    UpstreamError::Transport {
        url: url.to_string(),
        message,
    }
    .into()
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fixture(name: &str) -> String {
        let path = format!("../../../fixtures/prometheus/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn sources() -> Vec<Workload> {
        vec![Workload::from("productpage-v1"), Workload::from("reviews-v2")]
    }

    fn client(server: &MockServer) -> PrometheusClient {
        PrometheusClient::new(server.uri(), Client::new())
    }

    #[test]
    fn edge_query_escapes_names() {
        let query = edge_query(
            "istio_requests_total",
            &[Workload::from("api.v1"), Workload::from("web")],
        );
        assert_eq!(query, r#"istio_requests_total{source_workload=~"api\\.v1|web"}"#);

        let quoted = edge_query("m", &[Workload::from("a\"b")]);
        assert_eq!(quoted, r#"m{source_workload=~"a\"b"}"#);
    }

    #[test]
    fn truncate_limits_long_bodies() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefgh", 3), "abc...");
    }

    #[tokio::test]
    async fn empty_sources_fail_without_network() {
        // No server: any request would fail with a transport error instead.
        let client = PrometheusClient::new("http://127.0.0.1:9", Client::new());
        let err = client.fetch_edges(&[], None).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn instant_query_without_window() {
        let server = MockServer::start().await;
        let expected_query = edge_query(DEFAULT_METRIC, &sources());

        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .and(query_param("query", expected_query.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("instant.json")))
            .expect(1)
            .mount(&server)
            .await;

        let samples = client(&server).fetch_edges(&sources(), None).await.unwrap();
        assert_eq!(samples.len(), 5);
    }

    #[tokio::test]
    async fn range_query_with_window() {
        let server = MockServer::start().await;
        let from = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        let window = TimeWindow::new(from, to).unwrap();

        Mock::given(method("GET"))
            .and(path("/api/v1/query_range"))
            .and(query_param("start", from.timestamp().to_string().as_str()))
            .and(query_param("end", to.timestamp().to_string().as_str()))
            .and(query_param("step", "30s"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("range.json")))
            .expect(1)
            .mount(&server)
            .await;

        let samples = client(&server)
            .with_step("30s")
            .fetch_edges(&sources(), Some(&window))
            .await
            .unwrap();
        assert_eq!(samples.len(), 3);
    }

    #[tokio::test]
    async fn custom_metric_is_queried() {
        let server = MockServer::start().await;
        let expected_query = edge_query("mesh_requests", &sources());

        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .and(query_param("query", expected_query.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let samples = client(&server)
            .with_metric("mesh_requests")
            .fetch_edges(&sources(), None)
            .await
            .unwrap();
        assert!(samples.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_query_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"status":"error","errorType":"timeout","error":"query timed out"}"#,
            ))
            .mount(&server)
            .await;

        let err = client(&server).fetch_edges(&sources(), None).await.unwrap_err();
        match err {
            MeshCtxError::Upstream(e) => assert!(e.is_query_failure()),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_query_envelope_on_400_is_query_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(400).set_body_string(fixture("error.json")))
            .mount(&server)
            .await;

        let err = client(&server).fetch_edges(&sources(), None).await.unwrap_err();
        match err {
            MeshCtxError::Upstream(UpstreamError::QueryFailed { error_type, .. }) => {
                assert_eq!(error_type.as_deref(), Some("bad_data"));
            }
            other => panic!("expected QueryFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_error_without_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client(&server).fetch_edges(&sources(), None).await.unwrap_err();
        match err {
            MeshCtxError::Upstream(UpstreamError::HttpStatus { status, body, .. }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"status\":"))
            .mount(&server)
            .await;

        let err = client(&server).fetch_edges(&sources(), None).await.unwrap_err();
        assert!(matches!(
            err,
            MeshCtxError::Upstream(UpstreamError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_backend_is_transport_error() {
        // Port 1 is reserved and refuses connections.
        let err = PrometheusClient::new("http://127.0.0.1:1", Client::new())
            .fetch_edges(&sources(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MeshCtxError::Upstream(UpstreamError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn slow_backend_times_out_as_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(fixture("instant.json"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let http = Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("build client");
        let err = PrometheusClient::new(server.uri(), http)
            .fetch_edges(&sources(), None)
            .await
            .unwrap_err();

        match err {
            MeshCtxError::Upstream(UpstreamError::Transport { message, .. }) => {
                assert!(message.starts_with("timed out"), "message: {message}");
                assert!(!message.contains("30s"));
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn instance_headers_are_sent() {
        let server = MockServer::start().await;
        let instance = PrometheusInstance {
            name: "tenant".into(),
            base_url: server.uri(),
            headers: [("X-Scope-OrgID".to_string(), "mesh".to_string())].into(),
            disable_ssl: false,
        };

        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .and(header("X-Scope-OrgID", "mesh"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("instant.json")))
            .expect(1)
            .mount(&server)
            .await;

        let http = build_http_client(&instance).expect("build client");
        let samples = PrometheusClient::new(instance.base_url.clone(), http)
            .fetch_edges(&sources(), None)
            .await
            .unwrap();
        assert_eq!(samples.len(), 5);
    }

    #[test]
    fn invalid_header_name_is_config_error() {
        let instance = PrometheusInstance {
            name: "bad".into(),
            base_url: "http://localhost:9090".into(),
            headers: [("bad header".to_string(), "x".to_string())].into(),
            disable_ssl: false,
        };
        let err = build_http_client(&instance).unwrap_err();
        assert!(matches!(err, MeshCtxError::Config { .. }));
    }
}

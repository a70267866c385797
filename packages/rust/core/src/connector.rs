//! Topology connectors: where adjacency lists come from.

use async_trait::async_trait;
use tracing::instrument;

use meshctx_metrics::{PrometheusClient, build_http_client};
use meshctx_shared::{AdjacencyList, AppConfig, Result, TimeWindow, Workload};

use crate::extractor::build_adjacency_list;

/// A source of service-to-service call edges.
#[async_trait]
pub trait TopologyConnector: Send + Sync {
    /// Short name reported by collection responses and health checks.
    fn name(&self) -> &str;

    /// Adjacency list of the calls made by `sources`, over `window` when
    /// given or at the current instant otherwise.
    async fn fetch_topology(
        &self,
        sources: &[Workload],
        window: Option<&TimeWindow>,
    ) -> Result<AdjacencyList>;
}

/// Istio request telemetry read from Prometheus.
#[derive(Debug, Clone)]
pub struct IstioConnector {
    client: PrometheusClient,
}

impl IstioConnector {
    pub fn new(client: PrometheusClient) -> Self {
        Self { client }
    }

    /// Build a connector for the named Prometheus instance (or the first one).
    pub fn from_config(config: &AppConfig, instance: Option<&str>) -> Result<Self> {
        let instance = config.prometheus_instance(instance)?;
        let http = build_http_client(instance)?;
        let client = PrometheusClient::new(instance.base_url.clone(), http)
            .with_metric(config.topology.metric.clone())
            .with_step(config.topology.step.clone());
        Ok(Self::new(client))
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }
}

#[async_trait]
impl TopologyConnector for IstioConnector {
    fn name(&self) -> &str {
        "istio"
    }

    #[instrument(skip_all, fields(connector = "istio", base_url = %self.client.base_url()))]
    async fn fetch_topology(
        &self,
        sources: &[Workload],
        window: Option<&TimeWindow>,
    ) -> Result<AdjacencyList> {
        let samples = self.client.fetch_edges(sources, window).await?;
        Ok(build_adjacency_list(&samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshctx_shared::{MeshCtxError, PrometheusInstance};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fixture(name: &str) -> String {
        let path = format!("../../../fixtures/prometheus/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn config_for(base_url: String) -> AppConfig {
        let mut config = AppConfig::default();
        config.topology.workloads = vec!["productpage-v1".into(), "reviews-v2".into()];
        config.topology.metric = "mesh_requests_total".into();
        config.prometheus_instances = vec![PrometheusInstance {
            name: "default".into(),
            base_url,
            headers: Default::default(),
            disable_ssl: false,
        }];
        config
    }

    #[tokio::test]
    async fn instant_fixture_becomes_adjacency_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("instant.json")))
            .mount(&server)
            .await;

        let config = config_for(server.uri());
        let connector = IstioConnector::from_config(&config, None).unwrap();
        let list = connector
            .fetch_topology(&config.topology.workloads, None)
            .await
            .unwrap();

        // Duplicate response codes collapse, the empty destination is dropped.
        assert_eq!(list.edge_count(), 3);
        let dests: Vec<&str> = list
            .destinations("productpage-v1")
            .unwrap()
            .iter()
            .map(Workload::as_str)
            .collect();
        assert_eq!(dests, vec!["details-v1", "reviews-v2"]);
        assert_eq!(
            list.destinations("reviews-v2").map(|d| d.len()),
            Some(1)
        );
    }

    #[tokio::test]
    async fn configured_metric_is_queried() {
        let server = MockServer::start().await;
        let config = config_for(server.uri());
        let expected = meshctx_metrics::edge_query("mesh_requests_total", &config.topology.workloads);

        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .and(query_param("query", expected.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let connector = IstioConnector::from_config(&config, Some("default")).unwrap();
        assert_eq!(connector.name(), "istio");
        let list = connector
            .fetch_topology(&config.topology.workloads, None)
            .await
            .unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn unknown_instance_is_config_error() {
        let config = config_for("http://localhost:9090".into());
        let err = IstioConnector::from_config(&config, Some("missing")).unwrap_err();
        assert!(matches!(err, MeshCtxError::Config { .. }));
    }
}

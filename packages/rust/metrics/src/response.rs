//! Prometheus HTTP API response envelope.
//!
//! Only the parts needed for edge discovery are decoded:
//! - `status` / `errorType` / `error` at the top level
//! - `data.resultType` and each series' `metric` label set
//!
//! Sample values (`value` for vectors, `values` for matrices) are ignored.

use std::collections::{BTreeMap, BTreeSet};

use meshctx_shared::{EdgeSample, Result, UpstreamError};
use serde::Deserialize;

/// Status string the API uses for successful queries.
const STATUS_SUCCESS: &str = "success";

/// Top-level response of `/api/v1/query` and `/api/v1/query_range`.
#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<QueryData>,
    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `data` member of a query response.
#[derive(Debug, Deserialize)]
pub(crate) struct QueryData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<Series>,
}

/// One returned series. Values are not decoded.
#[derive(Debug, Deserialize)]
pub(crate) struct Series {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
}

impl QueryResponse {
    /// Decode a response body.
    pub(crate) fn parse(url: &str, body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| {
            UpstreamError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Fail with [`UpstreamError::QueryFailed`] unless the status is "success".
    pub(crate) fn into_data(self) -> Result<QueryData> {
        if self.status != STATUS_SUCCESS {
            return Err(UpstreamError::QueryFailed {
                status: self.status,
                error_type: self.error_type,
                error: self.error,
            }
            .into());
        }
        Ok(self.data.unwrap_or(QueryData {
            result_type: String::new(),
            result: Vec::new(),
        }))
    }
}

impl QueryData {
    /// Every series as an edge sample, in response order.
    pub(crate) fn into_samples(self) -> Vec<EdgeSample> {
        self.result
            .into_iter()
            .map(|series| EdgeSample::new(series.metric))
            .collect()
    }

    /// One sample per distinct label set.
    ///
    /// A range query returns each series once with many values; only whether
    /// the series exists matters, so values are dropped and label sets are
    /// deduplicated. Output is ordered by label set.
    pub(crate) fn fold_to_instant(self) -> Vec<EdgeSample> {
        self.result
            .into_iter()
            .map(|series| EdgeSample::new(series.metric))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshctx_shared::MeshCtxError;

    const URL: &str = "http://prometheus:9090/api/v1/query";

    fn fixture(name: &str) -> String {
        let path = format!("../../../fixtures/prometheus/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    #[test]
    fn parses_vector_fixture() {
        let data = QueryResponse::parse(URL, &fixture("instant.json"))
            .expect("parse")
            .into_data()
            .expect("success");
        assert_eq!(data.result_type, "vector");

        let samples = data.into_samples();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0].source_workload(), "productpage-v1");
        assert_eq!(samples[0].destination_workload(), "details-v1");
    }

    #[test]
    fn range_fold_keeps_one_sample_per_label_set() {
        let data = QueryResponse::parse(URL, &fixture("range.json"))
            .expect("parse")
            .into_data()
            .expect("success");
        assert_eq!(data.result_type, "matrix");
        assert_eq!(data.result.len(), 4);

        let samples = data.fold_to_instant();
        assert_eq!(samples.len(), 3);
        let edges: Vec<(&str, &str)> = samples
            .iter()
            .map(|s| (s.source_workload(), s.destination_workload()))
            .collect();
        assert!(edges.contains(&("productpage-v1", "reviews-v2")));
        assert!(edges.contains(&("reviews-v2", "ratings-v1")));
    }

    #[test]
    fn error_status_is_query_failure() {
        let err = QueryResponse::parse(URL, &fixture("error.json"))
            .expect("parse")
            .into_data()
            .unwrap_err();
        match err {
            MeshCtxError::Upstream(UpstreamError::QueryFailed {
                status,
                error_type,
                error,
            }) => {
                assert_eq!(status, "error");
                assert_eq!(error_type.as_deref(), Some("bad_data"));
                assert!(error.unwrap_or_default().contains("parse error"));
            }
            other => panic!("expected QueryFailed, got {other:?}"),
        }
    }

    #[test]
    fn garbage_body_is_decode_error() {
        let err = QueryResponse::parse(URL, "<html>proxy error</html>").unwrap_err();
        assert!(matches!(
            err,
            MeshCtxError::Upstream(UpstreamError::Decode { .. })
        ));
    }

    #[test]
    fn success_without_data_is_empty() {
        let data = QueryResponse::parse(URL, r#"{"status":"success"}"#)
            .expect("parse")
            .into_data()
            .expect("success");
        assert!(data.into_samples().is_empty());
    }
}

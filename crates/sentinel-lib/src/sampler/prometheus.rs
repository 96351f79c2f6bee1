//! Prometheus HTTP query API source

use super::{async_trait, TelemetrySource};
use crate::error::TelemetryError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Pulls the CPU-busy percentage with an instant query
pub struct PrometheusSource {
    client: Client,
    endpoint: Url,
    query: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    /// `[unix_time, "value"]`
    value: (f64, String),
}

impl PrometheusSource {
    /// Create a source for the server at `base_url`
    pub fn new(base_url: &str, query: &str, timeout: Duration) -> Result<Self, TelemetryError> {
        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = Url::parse(base_url)?.join("api/v1/query")?;

        Ok(Self {
            client,
            endpoint,
            query: query.to_string(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TelemetrySource for PrometheusSource {
    fn name(&self) -> &'static str {
        "prometheus"
    }

    async fn current_load(&self) -> Result<f64, TelemetryError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("query", self.query.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TelemetryError::Status(response.status().as_u16()));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| TelemetryError::Malformed(e.to_string()))?;

        if body.status != "success" {
            return Err(TelemetryError::Malformed(
                body.error.unwrap_or_else(|| format!("status '{}'", body.status)),
            ));
        }

        let first = body
            .data
            .and_then(|d| d.result.into_iter().next())
            .ok_or(TelemetryError::EmptyResult)?;

        let value: f64 = first
            .value
            .1
            .parse()
            .map_err(|_| TelemetryError::Malformed(format!("non-numeric value '{}'", first.value.1)))?;

        if !value.is_finite() {
            return Err(TelemetryError::Malformed(format!("non-finite value {}", value)));
        }

        Ok(value)
    }
}

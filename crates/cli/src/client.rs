//! API client for the Rightsizer reporting API

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the reporting API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Resolve a path against the base URL, dropping empty query values
    fn url(&self, path: &str, query: &[(&str, Option<String>)]) -> Result<Url> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        let pairs: Vec<_> = query
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (*k, v.as_str())))
            .collect();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_query(path, &[]).await
    }

    /// Make a GET request with query parameters
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, Option<String>)],
    ) -> Result<T> {
        let url = self.url(path, query)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Make a GET request and return the raw body
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.url(path, &[])?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .text()
            .await
            .context("Failed to read response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path, &[])?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    anyhow::bail!("API error ({}): {}", status, message);
}

// API response types

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Latest analysis of one sub-unit, as listed by `/api/pods`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodView {
    pub namespace: String,
    pub unit_name: String,
    pub sub_unit_name: String,
    pub status: String,
    pub cpu_waste_percent: f64,
    pub memory_waste_percent: f64,
    pub monthly_savings: f64,
    pub current_cpu: f64,
    pub current_memory: i64,
    pub recommended_cpu: f64,
    pub recommended_memory: i64,
    pub confidence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodList {
    pub pods: Vec<PodView>,
    pub total: usize,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub analyzed_at: String,
    pub window_start: String,
    pub window_end: String,
    pub avg_cpu: f64,
    pub max_cpu: f64,
    pub p95_cpu: f64,
    pub p99_cpu: f64,
    pub avg_memory: i64,
    pub max_memory: i64,
    pub p95_memory: i64,
    pub p99_memory: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsagePoint {
    pub timestamp: String,
    pub cpu: f64,
    pub memory: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodDetail {
    pub pod: PodView,
    pub analysis: AnalysisRecord,
    pub usage_history: Vec<UsagePoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: i64,
    pub namespace: String,
    pub unit_name: String,
    pub sub_unit_name: String,
    pub current_cpu: f64,
    pub current_memory: i64,
    pub recommended_cpu: f64,
    pub recommended_memory: i64,
    pub monthly_savings: f64,
    pub confidence: String,
    pub status: String,
    pub reason: String,
    pub applied: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationList {
    pub total_count: usize,
    pub total_savings: f64,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_units: i64,
    pub over_provisioned: i64,
    pub under_provisioned: i64,
    pub optimal: i64,
    pub total_monthly_savings: f64,
    pub total_cpu_waste_cores: f64,
    pub total_memory_waste_gib: f64,
    pub last_analysis: Option<String>,
    pub last_collection: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceList {
    pub namespaces: Vec<String>,
}

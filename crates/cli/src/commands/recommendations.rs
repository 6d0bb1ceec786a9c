//! Recommendation-related CLI commands

use anyhow::{Context, Result};
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, ApplyRequest, ApplyResponse, RecommendationList};
use crate::output::{
    color_confidence, color_status, format_bytes, format_cpu, format_currency, print_json,
    print_success, print_table, OutputFormat,
};

/// Filters for `rsz recommendations`
#[derive(Debug, Clone, Default)]
pub struct RecommendationQuery {
    pub confidence: Option<String>,
    pub min_savings: Option<f64>,
    pub limit: Option<usize>,
}

/// Row for recommendations table
#[derive(Tabled)]
struct RecommendationRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Savings/mo")]
    savings: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Applied")]
    applied: String,
}

/// List recommendations with optional filters
pub async fn list_recommendations(
    client: &ApiClient,
    query: &RecommendationQuery,
    format: OutputFormat,
) -> Result<RecommendationList> {
    let params = [
        ("confidence", query.confidence.clone()),
        ("min_savings", query.min_savings.map(|s| s.to_string())),
        ("limit", query.limit.map(|l| l.to_string())),
    ];
    let result: RecommendationList = client.get_with_query("api/recommendations", &params).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let rows: Vec<RecommendationRow> = result
                .recommendations
                .iter()
                .map(|r| RecommendationRow {
                    id: r.id,
                    namespace: r.namespace.clone(),
                    pod: r.unit_name.clone(),
                    container: r.sub_unit_name.clone(),
                    cpu: format!(
                        "{} → {}",
                        format_cpu(r.current_cpu),
                        format_cpu(r.recommended_cpu)
                    ),
                    memory: format!(
                        "{} → {}",
                        format_bytes(r.current_memory),
                        format_bytes(r.recommended_memory)
                    ),
                    savings: format_currency(r.monthly_savings),
                    confidence: color_confidence(&r.confidence),
                    status: color_status(&r.status),
                    applied: if r.applied {
                        "✓".to_string()
                    } else {
                        "".to_string()
                    },
                })
                .collect();

            let empty = rows.is_empty();
            print_table(rows, "No recommendations found");
            if !empty {
                println!(
                    "\nTotal: {} recommendations, {}/month potential savings",
                    result.total_count,
                    format_currency(result.total_savings)
                );
            }
        }
    }

    Ok(result)
}

/// Download the resource patch of a recommendation, to a file or stdout
pub async fn download_yaml(client: &ApiClient, id: i64, output: Option<&Path>) -> Result<String> {
    let path = format!("api/recommendations/{}/yaml", id);
    let yaml = client.get_text(&path).await?;

    match output {
        Some(file) => {
            std::fs::write(file, &yaml)
                .with_context(|| format!("Failed to write {}", file.display()))?;
            print_success(&format!("Patch written to {}", file.display()));
        }
        None => print!("{}", yaml),
    }

    Ok(yaml)
}

/// Mark a recommendation as applied, or revert the mark
pub async fn apply_recommendation(
    client: &ApiClient,
    id: i64,
    revert: bool,
    format: OutputFormat,
) -> Result<ApplyResponse> {
    let path = format!("api/recommendations/{}/apply", id);
    let request = ApplyRequest { applied: !revert };

    let response: ApplyResponse = client.post(&path, &request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            if revert {
                print_success(&format!("Recommendation {} marked as not applied", id));
            } else {
                print_success(&format!("Recommendation {} marked as applied", id));
            }
        }
    }

    Ok(response)
}

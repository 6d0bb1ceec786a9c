//! Pod listing and detail commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, PodDetail, PodList};
use crate::output::{
    color_confidence, color_status, format_bytes, format_cpu, format_currency, format_timestamp,
    print_info, print_json, print_table, OutputFormat,
};

/// Filters for `rsz pods`
#[derive(Debug, Clone, Default)]
pub struct PodQuery {
    pub namespace: Option<String>,
    pub status: Option<String>,
    pub sort_by: Option<String>,
    pub limit: Option<usize>,
    pub search: Option<String>,
}

impl PodQuery {
    fn params(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("namespace", self.namespace.clone()),
            ("status", self.status.clone()),
            ("sort_by", self.sort_by.clone()),
            ("limit", self.limit.map(|l| l.to_string())),
            ("search", self.search.clone()),
        ]
    }
}

/// Row for pods table
#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Waste")]
    waste: String,
    #[tabled(rename = "Savings/mo")]
    savings: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
}

/// Row for the usage history of a pod
#[derive(Tabled)]
struct UsageRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

/// List analysed pods
pub async fn list_pods(client: &ApiClient, query: &PodQuery, format: OutputFormat) -> Result<PodList> {
    let result: PodList = client.get_with_query("api/pods", &query.params()).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let rows: Vec<PodRow> = result
                .pods
                .iter()
                .map(|p| PodRow {
                    namespace: p.namespace.clone(),
                    pod: p.unit_name.clone(),
                    container: p.sub_unit_name.clone(),
                    status: color_status(&p.status),
                    cpu: format!(
                        "{} → {}",
                        format_cpu(p.current_cpu),
                        format_cpu(p.recommended_cpu)
                    ),
                    memory: format!(
                        "{} → {}",
                        format_bytes(p.current_memory),
                        format_bytes(p.recommended_memory)
                    ),
                    waste: format!(
                        "{:.0}% / {:.0}%",
                        p.cpu_waste_percent, p.memory_waste_percent
                    ),
                    savings: format_currency(p.monthly_savings),
                    confidence: color_confidence(&p.confidence),
                })
                .collect();

            let empty = rows.is_empty();
            print_table(rows, "No pods found");
            if !empty {
                println!("\nTotal: {} containers", result.total);
            }
        }
    }

    Ok(result)
}

/// Show the latest analysis and usage history of one pod
pub async fn show_pod(
    client: &ApiClient,
    namespace: &str,
    name: &str,
    format: OutputFormat,
) -> Result<PodDetail> {
    let path = format!("api/pod/{}/{}", namespace, name);
    let detail: PodDetail = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&detail)?,
        OutputFormat::Table => {
            let pod = &detail.pod;
            let analysis = &detail.analysis;

            print_info(&format!("{}/{} ({})", pod.namespace, pod.unit_name, pod.sub_unit_name));
            println!("Status:      {}", color_status(&pod.status));
            println!("Confidence:  {}", color_confidence(&pod.confidence));
            println!(
                "Window:      {} to {}",
                format_timestamp(&analysis.window_start),
                format_timestamp(&analysis.window_end)
            );
            println!();
            println!(
                "CPU:     avg {}  p95 {}  p99 {}  max {}",
                format_cpu(analysis.avg_cpu),
                format_cpu(analysis.p95_cpu),
                format_cpu(analysis.p99_cpu),
                format_cpu(analysis.max_cpu)
            );
            println!(
                "Memory:  avg {}  p95 {}  p99 {}  max {}",
                format_bytes(analysis.avg_memory),
                format_bytes(analysis.p95_memory),
                format_bytes(analysis.p99_memory),
                format_bytes(analysis.max_memory)
            );
            println!();
            println!(
                "Request: {} / {} → {} / {}",
                format_cpu(pod.current_cpu),
                format_bytes(pod.current_memory),
                format_cpu(pod.recommended_cpu),
                format_bytes(pod.recommended_memory)
            );
            println!("Savings: {}/month", format_currency(pod.monthly_savings));

            if !detail.usage_history.is_empty() {
                println!("\nRecent usage:");
                let rows: Vec<UsageRow> = detail
                    .usage_history
                    .iter()
                    .map(|u| UsageRow {
                        time: format_timestamp(&u.timestamp),
                        cpu: format_cpu(u.cpu),
                        memory: format_bytes(u.memory),
                    })
                    .collect();
                print_table(rows, "No usage recorded");
            }
        }
    }

    Ok(detail)
}

/// List namespaces with recorded units
pub async fn list_namespaces(client: &ApiClient, format: OutputFormat) -> Result<Vec<String>> {
    let result: crate::client::NamespaceList = client.get("api/namespaces").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            for ns in &result.namespaces {
                println!("{}", ns);
            }
        }
    }

    Ok(result.namespaces)
}

//! Cluster-wide statistics

use anyhow::Result;

use crate::client::{ApiClient, Statistics};
use crate::output::{format_currency, format_timestamp, print_info, print_json, OutputFormat};

/// Show aggregate statistics
pub async fn show_stats(client: &ApiClient, format: OutputFormat) -> Result<Statistics> {
    let stats: Statistics = client.get("api/stats").await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            print_info("Rightsizing summary");
            println!("Containers analysed:  {}", stats.total_units);
            println!("  Over-provisioned:   {}", stats.over_provisioned);
            println!("  Under-provisioned:  {}", stats.under_provisioned);
            println!("  Optimal:            {}", stats.optimal);
            println!();
            println!("CPU waste:            {:.2} cores", stats.total_cpu_waste_cores);
            println!("Memory waste:         {:.2} GiB", stats.total_memory_waste_gib);
            println!(
                "Potential savings:    {}/month",
                format_currency(stats.total_monthly_savings)
            );
            println!();
            println!(
                "Last analysis:        {}",
                stats
                    .last_analysis
                    .as_deref()
                    .map(format_timestamp)
                    .unwrap_or_else(|| "never".to_string())
            );
            println!(
                "Last collection:      {}",
                stats
                    .last_collection
                    .as_deref()
                    .map(format_timestamp)
                    .unwrap_or_else(|| "never".to_string())
            );
        }
    }

    Ok(stats)
}

//! Rightsizer CLI
//!
//! A command-line tool for browsing analysed pods, recommendations and
//! cluster statistics from the Rightsizer reporting API.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{pods, recommendations, stats};
use std::path::PathBuf;

/// Rightsizer CLI
#[derive(Parser)]
#[command(name = "rsz")]
#[command(author, version, about = "CLI for the Rightsizer reporting API", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via RSZ_API_URL env var)
    #[arg(long, env = "RSZ_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List analysed pods
    Pods {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Filter by status (over-provisioned, under-provisioned, optimal)
        #[arg(long)]
        status: Option<String>,

        /// Sort order (savings, waste, name)
        #[arg(long)]
        sort_by: Option<String>,

        /// Maximum number of rows
        #[arg(long)]
        limit: Option<usize>,

        /// Search pod and namespace names
        #[arg(long)]
        search: Option<String>,
    },

    /// Show the latest analysis of a pod
    Pod {
        /// Namespace of the pod
        namespace: String,

        /// Pod name
        name: String,
    },

    /// List recommendations
    Recommendations {
        /// Filter by confidence (high, medium, low)
        #[arg(long)]
        confidence: Option<String>,

        /// Minimum monthly savings
        #[arg(long)]
        min_savings: Option<f64>,

        /// Maximum number of rows
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Download the resource patch of a recommendation
    Yaml {
        /// Recommendation ID
        id: i64,

        /// Write the patch to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Mark a recommendation as applied
    Apply {
        /// Recommendation ID
        id: i64,

        /// Clear the applied mark instead
        #[arg(long)]
        revert: bool,
    },

    /// Show cluster-wide statistics
    Stats,

    /// List namespaces with analysed pods
    Namespaces,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let client = client::ApiClient::new(&config.api_url(cli.api_url.as_deref()))?;

    match cli.command {
        Commands::Pods {
            namespace,
            status,
            sort_by,
            limit,
            search,
        } => {
            let query = pods::PodQuery {
                namespace: namespace.or(config.default_namespace),
                status,
                sort_by,
                limit,
                search,
            };
            pods::list_pods(&client, &query, cli.format).await?;
        }
        Commands::Pod { namespace, name } => {
            pods::show_pod(&client, &namespace, &name, cli.format).await?;
        }
        Commands::Recommendations {
            confidence,
            min_savings,
            limit,
        } => {
            let query = recommendations::RecommendationQuery {
                confidence,
                min_savings,
                limit,
            };
            recommendations::list_recommendations(&client, &query, cli.format).await?;
        }
        Commands::Yaml { id, output } => {
            recommendations::download_yaml(&client, id, output.as_deref()).await?;
        }
        Commands::Apply { id, revert } => {
            recommendations::apply_recommendation(&client, id, revert, cli.format).await?;
        }
        Commands::Stats => {
            stats::show_stats(&client, cli.format).await?;
        }
        Commands::Namespaces => {
            pods::list_namespaces(&client, cli.format).await?;
        }
    }

    Ok(())
}

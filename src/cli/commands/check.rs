//! Check command - verify the internal API is reachable

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::api::{ApiClient, INTERNAL_API_PREFIX};
use crate::cli::ExitCode;
use crate::config::ResolvedConfig;

/// Reply of the health check endpoint
#[derive(Debug, Deserialize)]
pub struct HealthCheck {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub gitlab_version: Option<String>,
    #[serde(default)]
    pub gitlab_rev: Option<String>,
    #[serde(default)]
    pub redis: Option<bool>,
}

/// Execute the check command
pub async fn execute(config: ResolvedConfig) -> Result<ExitCode> {
    let client = ApiClient::new(&config).context("Failed to set up internal API client")?;

    println!("Checking internal API at {} ...", config.gitlab_url);
    let path = format!("{}/check", INTERNAL_API_PREFIX);
    match client.get::<HealthCheck>(&path).await {
        Ok(health) => {
            println!("Internal API available: OK");
            print_field("API version", health.api_version.as_deref());
            print_field("GitLab version", health.gitlab_version.as_deref());
            print_field("GitLab revision", health.gitlab_rev.as_deref());
            if let Some(redis) = health.redis {
                println!("  Redis:           {}", if redis { "OK" } else { "FAILED" });
            }
            Ok(ExitCode::Success)
        }
        Err(e) => {
            eprintln!("Internal API available: FAILED - {}", e);
            Ok(ExitCode::Failure)
        }
    }
}

fn print_field(label: &str, value: Option<&str>) {
    if let Some(value) = value {
        println!("  {:<16} {}", format!("{}:", label), value);
    }
}

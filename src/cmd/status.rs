//! One-shot job status query: `streamwatch status`.

use anyhow::{Context, Result};

use streamwatch::api::StreamApi;
use streamwatch::config::Config;

use super::build_api;

pub async fn cmd_status(config: &Config, job_id: &str) -> Result<()> {
    let api = build_api(config)?;
    let progress = api
        .job_status(job_id)
        .await
        .with_context(|| format!("Failed to fetch status for job {}", job_id))?;
    println!("{}", serde_json::to_string_pretty(&progress)?);
    Ok(())
}

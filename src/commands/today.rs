use anyhow::Result;
use chrono::Local;

use crate::aggregator::stats;
use crate::client::QuotaClient;
use crate::report::render_today;

pub async fn show_today(client: &QuotaClient, json: bool) -> Result<String> {
    let usage = client.fetch_usage_stats().await?;
    let today = stats::today(&usage, &Local::now())?;

    if json {
        return Ok(serde_json::to_string_pretty(&today)?);
    }
    Ok(render_today(&today))
}

use anyhow::Result;
use tracing::info;

use crate::aggregator::quota::aggregate_all;
use crate::client::QuotaClient;
use crate::config::MaxRender;
use crate::report::render_quota;

pub async fn show_quota(client: &QuotaClient, max_render: &MaxRender, json: bool) -> Result<String> {
    let payloads = client.fetch_credentials_quota().await?;
    let reports = aggregate_all(&payloads)?;
    info!("Quota: {} credentials", reports.len());

    if json {
        return Ok(serde_json::to_string_pretty(&reports)?);
    }
    Ok(render_quota(&reports, max_render))
}

use anyhow::Result;
use tracing::info;

use crate::aggregator::{quota, stats};
use crate::client::QuotaClient;
use crate::report::render_overview;

pub async fn show_overview(client: &QuotaClient, json: bool, with_credentials: bool) -> Result<String> {
    // Both fetches are independent; the first failure aborts the report.
    let (usage, payloads) = if with_credentials {
        let (usage, payloads) =
            tokio::try_join!(client.fetch_usage_stats(), client.fetch_credentials_quota())?;
        (usage, Some(payloads))
    } else {
        (client.fetch_usage_stats().await?, None)
    };

    let credentials = payloads
        .as_deref()
        .map(quota::aggregate_all)
        .transpose()?;
    let overview = stats::overview(&usage, credentials.as_deref())?;
    info!(
        "Overview: {} requests across {} models",
        overview.totals.total_requests,
        overview.per_model.len()
    );

    if json {
        return Ok(serde_json::to_string_pretty(&overview)?);
    }
    Ok(render_overview(&overview))
}

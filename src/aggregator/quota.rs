use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{Fetch, QueryError};
use crate::models::{
    classify, CredentialPayload, CredentialQuotaReport, CredentialType, GroupQuota, ModelGroup,
    QuotaEntry, QuotaFetch,
};

fn malformed(detail: impl Into<String>) -> QueryError {
    QueryError::format(Fetch::Quota, detail)
}

/// Builds one credential's grouped quota report.
pub fn aggregate(payload: &CredentialPayload) -> Result<CredentialQuotaReport, QueryError> {
    let mut report = CredentialQuotaReport {
        id: payload.id.clone(),
        kind: payload.kind,
        label: payload.label.clone(),
        enabled: payload.enabled,
        entry_count: 0,
        groups: Vec::new(),
        note: None,
    };

    match &payload.quota {
        QuotaFetch::Failed(reason) | QuotaFetch::Skipped(reason) => {
            report.note = Some(reason.clone());
        }
        QuotaFetch::Body(body) => {
            let entries = match payload.kind {
                CredentialType::Antigravity => parse_antigravity(body)?,
                CredentialType::GeminiCli => parse_gemini_cli(body)?,
            };
            report.entry_count = entries.len();
            report.groups = group_entries(&entries);

            if entries.is_empty() {
                report.note = Some("no quota information".to_string());
            } else if report.groups.is_empty() {
                report.note = Some("no recognised models".to_string());
            }
        }
    }

    Ok(report)
}

/// Aggregates every credential, Antigravity first, keeping fetch order within a type.
pub fn aggregate_all(
    payloads: &[CredentialPayload],
) -> Result<Vec<CredentialQuotaReport>, QueryError> {
    let mut reports = payloads
        .iter()
        .map(aggregate)
        .collect::<Result<Vec<_>, _>>()?;
    reports.sort_by_key(|r| r.kind);
    Ok(reports)
}

/// Merges entries into canonical groups; unknown models are dropped.
pub fn group_entries(entries: &[QuotaEntry]) -> Vec<GroupQuota> {
    let mut groups: BTreeMap<ModelGroup, GroupQuota> = BTreeMap::new();

    for entry in entries {
        let Some(group) = classify(&entry.model) else {
            debug!("Unclassified quota model: {}", entry.model);
            continue;
        };
        groups
            .entry(group)
            .and_modify(|g| g.absorb(entry))
            .or_insert_with(|| GroupQuota::from_entry(group, entry));
    }

    groups.into_values().collect()
}

/// `{"models": {"<id>": {"quotaInfo": {"remainingFraction": f, "resetTime": t}}}}`
fn parse_antigravity(body: &Value) -> Result<Vec<QuotaEntry>, QueryError> {
    let models = body
        .get("models")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("Antigravity response has no models object"))?;

    let mut entries = Vec::new();
    for (model, info) in models {
        let Some(quota) = field(info, "quotaInfo", "quota_info").and_then(Value::as_object) else {
            continue;
        };
        if let Some(entry) = parse_entry(model, quota)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// `{"buckets": [{"modelId": id, "remainingFraction": f, "resetTime": t}]}`
///
/// A reply without `buckets` means the account has no quota buckets yet.
fn parse_gemini_cli(body: &Value) -> Result<Vec<QuotaEntry>, QueryError> {
    if !body.is_object() {
        return Err(malformed("GeminiCLI response is not an object"));
    }
    let buckets = match body.get("buckets") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(buckets)) => buckets,
        Some(_) => return Err(malformed("GeminiCLI buckets is not an array")),
    };

    let mut entries = Vec::new();
    for bucket in buckets {
        let Some(bucket) = bucket.as_object() else {
            return Err(malformed("GeminiCLI bucket is not an object"));
        };
        let Some(model) = bucket
            .get("modelId")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
        else {
            continue;
        };
        if let Some(entry) = parse_entry(model, bucket)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn field<'a>(value: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    value.get(camel).or_else(|| value.get(snake))
}

/// `None` when the entry carries no remaining fraction.
fn parse_entry(model: &str, quota: &Map<String, Value>) -> Result<Option<QuotaEntry>, QueryError> {
    let remaining = quota
        .get("remainingFraction")
        .or_else(|| quota.get("remaining_fraction"))
        .filter(|v| !v.is_null());
    let Some(remaining) = remaining else {
        return Ok(None);
    };
    let fraction = remaining
        .as_f64()
        .ok_or_else(|| malformed(format!("{}: remaining fraction is not a number", model)))?;

    let reset = quota
        .get("resetTime")
        .or_else(|| quota.get("reset_time"))
        .filter(|v| !v.is_null());
    let refresh_at = match reset {
        None => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(parse_timestamp(model, s)?),
        Some(_) => return Err(malformed(format!("{}: reset time is not a string", model))),
    };

    Ok(Some(QuotaEntry {
        model: model.to_string(),
        percentage: to_percentage(model, fraction)?,
        refresh_at,
    }))
}

fn to_percentage(model: &str, fraction: f64) -> Result<u8, QueryError> {
    if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
        return Err(malformed(format!(
            "{}: remaining fraction {} outside 0..1",
            model, fraction
        )));
    }
    Ok((fraction * 100.0).round() as u8)
}

fn parse_timestamp(model: &str, s: &str) -> Result<DateTime<Utc>, QueryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| malformed(format!("{}: invalid reset time {:?}: {}", model, s, e)))
}

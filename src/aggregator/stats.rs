use chrono::{DateTime, Timelike, TimeZone};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{Fetch, QueryError};
use crate::models::{
    Availability, CredentialQuotaReport, CredentialType, CredentialUsage, HourBucket, ModelStats,
    Overview, RawUsage, TodaySummary, TokenBreakdown, UsageCounter, UsageResponse,
};

fn parse_usage(usage: &Value) -> Result<RawUsage, QueryError> {
    let response = UsageResponse::deserialize(usage)
        .map_err(|e| QueryError::format(Fetch::Usage, e.to_string()))?;
    let raw = response.usage;

    let recorded = raw.success_count.checked_add(raw.failure_count);
    if recorded.map_or(true, |n| n > raw.total_requests) {
        return Err(QueryError::format(
            Fetch::Usage,
            format!(
                "success ({}) + failure ({}) exceeds total requests ({})",
                raw.success_count, raw.failure_count, raw.total_requests
            ),
        ));
    }
    Ok(raw)
}

/// Lifetime totals plus per-model and per-API breakdowns.
///
/// `credentials` feeds the availability section; without it the section is absent.
pub fn overview(
    usage: &Value,
    credentials: Option<&[CredentialQuotaReport]>,
) -> Result<Overview, QueryError> {
    let raw = parse_usage(usage)?;

    let totals = UsageCounter {
        total_requests: raw.total_requests,
        success_count: raw.success_count,
        failure_count: raw.failure_count,
        total_tokens: raw.total_tokens,
    };

    let mut per_model = ModelStats::new();
    let mut per_api = BTreeMap::new();
    for (api_name, api) in &raw.apis {
        let mut api_failures = 0;
        for (model_name, model) in &api.models {
            let failures = model.details.iter().filter(|d| d.failed).count() as u64;
            api_failures += failures;
            per_model
                .entry(model_name.clone())
                .or_insert_with(UsageCounter::default)
                .add(&UsageCounter::from_failures(
                    model.total_requests,
                    model.total_tokens,
                    failures,
                ));
        }
        per_api.insert(
            api_name.clone(),
            UsageCounter::from_failures(api.total_requests, api.total_tokens, api_failures),
        );
    }

    let credential_availability = credentials.map(availability);

    Ok(Overview {
        totals,
        per_model,
        per_api,
        credential_availability,
    })
}

/// Counts available credentials per type.
pub fn availability(
    credentials: &[CredentialQuotaReport],
) -> BTreeMap<CredentialType, Availability> {
    let mut counts: BTreeMap<CredentialType, Availability> = BTreeMap::new();
    for credential in credentials {
        let entry = counts.entry(credential.kind).or_default();
        entry.total += 1;
        if credential.is_available() {
            entry.available += 1;
        }
    }
    counts
}

/// Usage for the calendar day of `now`, in `now`'s timezone.
pub fn today<Tz: TimeZone>(usage: &Value, now: &DateTime<Tz>) -> Result<TodaySummary, QueryError> {
    let raw = parse_usage(usage)?;
    let date = now.date_naive();
    let day_key = date.format("%Y-%m-%d").to_string();
    let tz = now.timezone();

    let mut per_model = ModelStats::new();
    let mut per_credential: BTreeMap<String, CredentialUsage> = BTreeMap::new();
    let mut hour_distribution: BTreeMap<HourBucket, u64> =
        HourBucket::ALL.iter().map(|b| (*b, 0)).collect();
    let mut tokens = TokenBreakdown::default();
    let mut dated = UsageCounter::default();

    for api in raw.apis.values() {
        for (model_name, model) in &api.models {
            for detail in &model.details {
                let Some(timestamp) = detail.timestamp.as_deref() else {
                    continue;
                };
                let local = match DateTime::parse_from_rfc3339(timestamp) {
                    Ok(ts) => ts.with_timezone(&tz),
                    Err(e) => {
                        debug!("Skipping request with timestamp {:?}: {}", timestamp, e);
                        continue;
                    }
                };
                if local.date_naive() != date {
                    continue;
                }

                let total_tokens = detail.tokens.total_tokens;
                dated.record(total_tokens, detail.failed);
                per_model
                    .entry(model_name.clone())
                    .or_default()
                    .record(total_tokens, detail.failed);
                tokens.add(&detail.tokens);
                *hour_distribution
                    .entry(HourBucket::from_hour(local.hour()))
                    .or_default() += 1;

                let auth = detail.auth_index.clone().unwrap_or_else(|| "unknown".to_string());
                let credential = per_credential.entry(auth).or_default();
                credential.requests += 1;
                credential.tokens = credential.tokens.saturating_add(total_tokens);
                if detail.failed {
                    credential.failed += 1;
                }
            }
        }
    }

    // Day counters also cover requests whose details were not kept.
    let requests = raw
        .requests_by_day
        .get(&day_key)
        .copied()
        .unwrap_or(0)
        .max(dated.total_requests);
    let day_tokens = raw
        .tokens_by_day
        .get(&day_key)
        .copied()
        .unwrap_or(0)
        .max(dated.total_tokens);

    Ok(TodaySummary {
        date,
        totals: UsageCounter::from_failures(requests, day_tokens, dated.failure_count),
        per_model,
        hour_distribution,
        tokens,
        per_credential,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GroupQuota;
    use chrono::{FixedOffset, NaiveDate, Utc};
    use serde_json::json;

    fn sample_usage() -> Value {
        json!({
            "failed_requests": 34,
            "usage": {
                "total_requests": 1234,
                "success_count": 1200,
                "failure_count": 34,
                "total_tokens": 5_000_000,
                "requests_by_day": {"2026-10-18": 1000, "2026-10-19": 7},
                "tokens_by_day": {"2026-10-19": 9000},
                "apis": {
                    "key-a": {
                        "total_requests": 800,
                        "total_tokens": 4_000_000,
                        "models": {
                            "gemini-2.5-flash": {
                                "total_requests": 500,
                                "total_tokens": 1_000_000,
                                "details": [
                                    {"timestamp": "2026-10-19T01:30:00Z", "auth_index": "a1",
                                     "tokens": {"input_tokens": 100, "output_tokens": 50, "total_tokens": 150}},
                                    {"timestamp": "2026-10-19T07:00:00Z", "auth_index": "a1", "failed": true,
                                     "tokens": {"total_tokens": 10}},
                                    {"timestamp": "2026-10-18T23:59:59Z", "tokens": {"total_tokens": 99}}
                                ]
                            },
                            "claude-sonnet-4-5": {
                                "total_requests": 300,
                                "total_tokens": 3_000_000,
                                "details": [
                                    {"timestamp": "2026-10-19T13:00:00Z", "auth_index": 2,
                                     "tokens": {"input_tokens": 1000, "output_tokens": 200,
                                                "reasoning_tokens": 300, "cached_tokens": 400,
                                                "total_tokens": 1900}},
                                    {"timestamp": "2026-10-19T23:10:00Z", "auth_index": 2,
                                     "tokens": {"total_tokens": 40}},
                                    {"auth_index": 2, "tokens": {"total_tokens": 5}},
                                    {"timestamp": "garbage", "tokens": {"total_tokens": 5}}
                                ]
                            }
                        }
                    },
                    "key-b": {
                        "total_requests": 434,
                        "total_tokens": 1_000_000,
                        "models": {
                            "gemini-2.5-flash": {"total_requests": 434, "total_tokens": 1_000_000}
                        }
                    }
                }
            }
        })
    }

    fn now_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 23, 30, 0).unwrap()
    }

    #[test]
    fn overview_totals_and_success_rate() {
        let overview = overview(&sample_usage(), None).unwrap();
        assert_eq!(overview.totals.total_requests, 1234);
        assert_eq!(overview.totals.success_count, 1200);
        assert_eq!(overview.totals.failure_count, 34);
        assert_eq!(format!("{:.1}", overview.totals.success_rate() * 100.0), "97.2");
        assert!(overview.credential_availability.is_none());
    }

    #[test]
    fn overview_merges_models_across_apis() {
        let overview = overview(&sample_usage(), None).unwrap();
        let flash = overview.per_model["gemini-2.5-flash"];
        assert_eq!(flash.total_requests, 934);
        assert_eq!(flash.total_tokens, 2_000_000);
        assert_eq!(flash.failure_count, 1);
        assert_eq!(flash.success_count, 933);

        assert_eq!(overview.per_api["key-a"].total_requests, 800);
        assert_eq!(overview.per_api["key-a"].failure_count, 1);
        assert_eq!(overview.per_api["key-b"].failure_count, 0);
    }

    #[test]
    fn huge_per_api_counters_saturate_when_merged() {
        let usage = json!({"usage": {
            "total_requests": u64::MAX, "success_count": 0, "failure_count": 0, "total_tokens": u64::MAX,
            "apis": {
                "a": {"models": {"m": {"total_requests": u64::MAX - 1, "total_tokens": u64::MAX}}},
                "b": {"models": {"m": {"total_requests": 10, "total_tokens": 10}}}
            }
        }});
        let overview = overview(&usage, None).unwrap();
        assert_eq!(overview.per_model["m"].total_requests, u64::MAX);
        assert_eq!(overview.per_model["m"].total_tokens, u64::MAX);
        assert_eq!(overview.per_api["b"].total_requests, 10);
    }

    #[test]
    fn availability_requires_enabled_with_entries() {
        let report = |kind, enabled, entry_count| CredentialQuotaReport {
            id: "x".into(),
            kind,
            label: "x".into(),
            enabled,
            entry_count,
            groups: Vec::<GroupQuota>::new(),
            note: None,
        };
        let reports = [
            report(CredentialType::Antigravity, true, 3),
            report(CredentialType::Antigravity, false, 0),
            report(CredentialType::Antigravity, true, 0),
            report(CredentialType::GeminiCli, true, 1),
        ];

        let overview = overview(&sample_usage(), Some(&reports[..])).unwrap();
        let counts = overview.credential_availability.unwrap();
        assert_eq!(counts[&CredentialType::Antigravity], Availability { available: 1, total: 3 });
        assert_eq!(counts[&CredentialType::GeminiCli], Availability { available: 1, total: 1 });
    }

    #[test]
    fn malformed_counters_are_format_errors() {
        let cases = [
            json!({}),
            json!({"usage": {"total_requests": 1, "success_count": 1, "failure_count": 0}}),
            json!({"usage": {"total_requests": -1, "success_count": 0, "failure_count": 0, "total_tokens": 0}}),
            json!({"usage": {"total_requests": "12", "success_count": 0, "failure_count": 0, "total_tokens": 0}}),
            json!({"usage": {"total_requests": 10, "success_count": 8, "failure_count": 3, "total_tokens": 0}}),
            json!({"usage": {"total_requests": 1, "success_count": 1, "failure_count": 0, "total_tokens": 0,
                             "requests_by_day": {"2026-10-19": -4}}}),
        ];
        for case in &cases {
            let err = overview(case, None).unwrap_err();
            assert!(matches!(err, QueryError::Format { fetch: Fetch::Usage, .. }), "{}", case);
        }
    }

    #[test]
    fn today_restricts_to_current_date() {
        let today = today(&sample_usage(), &now_utc()).unwrap();
        assert_eq!(today.date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());

        // Day counter says 7; undated and unparsable details still count there.
        assert_eq!(today.totals.total_requests, 7);
        assert_eq!(today.totals.failure_count, 1);
        assert_eq!(today.totals.success_count, 6);
        assert_eq!(today.totals.total_tokens, 9000);

        assert_eq!(today.per_model["gemini-2.5-flash"].total_requests, 2);
        assert_eq!(today.per_model["gemini-2.5-flash"].failure_count, 1);
        assert_eq!(today.per_model["claude-sonnet-4-5"].total_requests, 2);
        assert_eq!(today.per_model["claude-sonnet-4-5"].total_tokens, 1940);

        assert_eq!(
            today.tokens,
            TokenBreakdown {
                input: 1100,
                output: 250,
                reasoning: 300,
                cached: 400
            }
        );
        assert_eq!(today.per_credential["a1"].requests, 2);
        assert_eq!(today.per_credential["a1"].failed, 1);
        assert_eq!(today.per_credential["2"].tokens, 1940);
    }

    #[test]
    fn hour_buckets_sum_to_timestamped_requests() {
        let today = today(&sample_usage(), &now_utc()).unwrap();
        let buckets: Vec<u64> = HourBucket::ALL
            .iter()
            .map(|b| today.hour_distribution[b])
            .collect();
        assert_eq!(buckets, vec![1, 1, 1, 1]);

        let timestamped: u64 = today.per_model.values().map(|c| c.total_requests).sum();
        assert_eq!(buckets.iter().sum::<u64>(), timestamped);
    }

    #[test]
    fn local_timezone_shifts_date_and_hour() {
        // UTC+8: 2026-10-18T23:59:59Z is 07:59 on the 19th; 13:00Z and 23:10Z fall on the 19th and 20th.
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let today = today(&sample_usage(), &now).unwrap();

        assert_eq!(today.hour_distribution[&HourBucket::Dawn], 0);
        assert_eq!(today.hour_distribution[&HourBucket::Morning], 2);
        assert_eq!(today.hour_distribution[&HourBucket::Afternoon], 1);
        assert_eq!(today.hour_distribution[&HourBucket::Evening], 1);
        assert_eq!(today.totals.total_requests, 7);
    }

    #[test]
    fn today_falls_back_to_details_without_day_counter() {
        let usage = json!({"usage": {
            "total_requests": 1, "success_count": 1, "failure_count": 0, "total_tokens": 3,
            "apis": {"k": {"models": {"m": {"details": [
                {"timestamp": "2026-10-19T10:00:00Z", "tokens": {"total_tokens": 3}}
            ]}}}}
        }});
        let today = today(&usage, &now_utc()).unwrap();
        assert_eq!(today.totals.total_requests, 1);
        assert_eq!(today.totals.total_tokens, 3);
        assert_eq!(today.per_credential["unknown"].requests, 1);
    }

    #[test]
    fn empty_usage_has_zero_buckets() {
        let usage = json!({"usage": {"total_requests": 0, "success_count": 0, "failure_count": 0, "total_tokens": 0}});
        let today = today(&usage, &now_utc()).unwrap();
        assert_eq!(today.hour_distribution.len(), 4);
        assert!(today.hour_distribution.values().all(|c| *c == 0));
        assert_eq!(today.totals.success_rate(), 0.0);
        assert!(today.per_model.is_empty());
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use super::quota::CredentialType;

/// Body of `GET /v0/management/usage`.
#[derive(Debug, Clone, Deserialize)]
pub struct UsageResponse {
    pub usage: RawUsage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUsage {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_tokens: u64,
    #[serde(default)]
    pub requests_by_day: BTreeMap<String, u64>,
    #[serde(default)]
    pub tokens_by_day: BTreeMap<String, u64>,
    #[serde(default)]
    pub apis: BTreeMap<String, RawApiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawApiUsage {
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub models: BTreeMap<String, RawModelUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawModelUsage {
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub details: Vec<RequestDetail>,
}

/// One recorded request.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestDetail {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "deserialize_id")]
    pub auth_index: Option<String>,
    #[serde(default)]
    pub tokens: DetailTokens,
    #[serde(default)]
    pub failed: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DetailTokens {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Accepts an identifier sent either as a JSON string or a number.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Option::<Id>::deserialize(deserializer)? {
        Some(Id::Text(s)) if !s.is_empty() => Some(s),
        Some(Id::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageCounter {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_tokens: u64,
}

impl UsageCounter {
    /// Counter whose successes are whatever was not recorded as a failure.
    pub fn from_failures(total_requests: u64, total_tokens: u64, failures: u64) -> Self {
        let failure_count = failures.min(total_requests);
        Self {
            total_requests,
            success_count: total_requests - failure_count,
            failure_count,
            total_tokens,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_requests as f64
    }

    // Remote counters are untrusted; sums saturate instead of wrapping.
    pub fn record(&mut self, tokens: u64, failed: bool) {
        self.total_requests = self.total_requests.saturating_add(1);
        self.total_tokens = self.total_tokens.saturating_add(tokens);
        if failed {
            self.failure_count = self.failure_count.saturating_add(1);
        } else {
            self.success_count = self.success_count.saturating_add(1);
        }
    }

    pub fn add(&mut self, other: &UsageCounter) {
        self.total_requests = self.total_requests.saturating_add(other.total_requests);
        self.success_count = self.success_count.saturating_add(other.success_count);
        self.failure_count = self.failure_count.saturating_add(other.failure_count);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Counters keyed by raw model identifier.
pub type ModelStats = BTreeMap<String, UsageCounter>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HourBucket {
    Dawn,
    Morning,
    Afternoon,
    Evening,
}

impl HourBucket {
    pub const ALL: [HourBucket; 4] = [
        HourBucket::Dawn,
        HourBucket::Morning,
        HourBucket::Afternoon,
        HourBucket::Evening,
    ];

    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=5 => HourBucket::Dawn,
            6..=11 => HourBucket::Morning,
            12..=17 => HourBucket::Afternoon,
            _ => HourBucket::Evening,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HourBucket::Dawn => "Dawn      00-06",
            HourBucket::Morning => "Morning   06-12",
            HourBucket::Afternoon => "Afternoon 12-18",
            HourBucket::Evening => "Evening   18-24",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenBreakdown {
    pub input: u64,
    pub output: u64,
    pub reasoning: u64,
    pub cached: u64,
}

impl TokenBreakdown {
    pub fn add(&mut self, tokens: &DetailTokens) {
        self.input = self.input.saturating_add(tokens.input_tokens);
        self.output = self.output.saturating_add(tokens.output_tokens);
        self.reasoning = self.reasoning.saturating_add(tokens.reasoning_tokens);
        self.cached = self.cached.saturating_add(tokens.cached_tokens);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CredentialUsage {
    pub requests: u64,
    pub tokens: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub available: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub totals: UsageCounter,
    pub per_model: ModelStats,
    pub per_api: BTreeMap<String, UsageCounter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_availability: Option<BTreeMap<CredentialType, Availability>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodaySummary {
    pub date: NaiveDate,
    pub totals: UsageCounter,
    pub per_model: ModelStats,
    pub hour_distribution: BTreeMap<HourBucket, u64>,
    pub tokens: TokenBreakdown,
    pub per_credential: BTreeMap<String, CredentialUsage>,
}

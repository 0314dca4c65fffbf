use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::groups::ModelGroup;
use super::usage::deserialize_id;

/// OAuth credential types that expose quota data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CredentialType {
    Antigravity,
    #[serde(rename = "GeminiCLI")]
    GeminiCli,
}

impl CredentialType {
    /// Maps the gateway's provider string; other providers carry no quota.
    pub fn from_provider(provider: &str) -> Option<Self> {
        match provider.to_ascii_lowercase().as_str() {
            "antigravity" => Some(CredentialType::Antigravity),
            "gemini" | "gemini-cli" => Some(CredentialType::GeminiCli),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CredentialType::Antigravity => "Antigravity",
            CredentialType::GeminiCli => "GeminiCLI",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            CredentialType::Antigravity => "🚀",
            CredentialType::GeminiCli => "💎",
        }
    }
}

/// Body of `GET /v0/management/auth-files`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthFilesResponse {
    #[serde(default)]
    pub files: Vec<AuthFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthFile {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub auth_index: Option<String>,
    pub provider: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub unavailable: bool,
}

impl AuthFile {
    pub fn provider(&self) -> &str {
        self.provider
            .as_deref()
            .or(self.kind.as_deref())
            .unwrap_or("unknown")
    }

    pub fn credential_type(&self) -> Option<CredentialType> {
        CredentialType::from_provider(self.provider())
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled && !self.unavailable
    }

    /// File name as stored by the gateway; falls back to the id.
    pub fn file_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .filter(|n| !n.is_empty())
    }

    pub fn label(&self) -> String {
        self.email
            .as_deref()
            .filter(|e| !e.is_empty())
            .or(self.file_name())
            .unwrap_or("unknown")
            .to_string()
    }
}

/// Outcome of asking the upstream provider for one credential's quota.
#[derive(Debug, Clone)]
pub enum QuotaFetch {
    /// Successful upstream reply, still in the provider's own shape.
    Body(serde_json::Value),
    /// Upstream answered with an error.
    Failed(String),
    /// No upstream call was made.
    Skipped(String),
}

/// A credential together with its raw quota payload, valid for one invocation.
#[derive(Debug, Clone)]
pub struct CredentialPayload {
    pub id: String,
    pub kind: CredentialType,
    pub label: String,
    pub enabled: bool,
    pub quota: QuotaFetch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaEntry {
    pub model: String,
    pub percentage: u8,
    pub refresh_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Abundant,
    Normal,
    Low,
    Critical,
}

impl Tier {
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            80..=u8::MAX => Tier::Abundant,
            50..=79 => Tier::Normal,
            20..=49 => Tier::Low,
            _ => Tier::Critical,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Tier::Abundant => "🟢",
            Tier::Normal => "🟡",
            Tier::Low => "🟠",
            Tier::Critical => "🔴",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupQuota {
    pub group: ModelGroup,
    pub percentage: u8,
    pub refresh_at: Option<DateTime<Utc>>,
    pub tier: Tier,
    pub models: Vec<String>,
}

impl GroupQuota {
    pub fn from_entry(group: ModelGroup, entry: &QuotaEntry) -> Self {
        Self {
            group,
            percentage: entry.percentage,
            refresh_at: entry.refresh_at,
            tier: Tier::from_percentage(entry.percentage),
            models: vec![entry.model.clone()],
        }
    }

    /// Folds another constituent in: weakest percentage, soonest refresh.
    pub fn absorb(&mut self, entry: &QuotaEntry) {
        self.percentage = self.percentage.min(entry.percentage);
        self.refresh_at = match (self.refresh_at, entry.refresh_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.tier = Tier::from_percentage(self.percentage);
        self.models.push(entry.model.clone());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialQuotaReport {
    pub id: String,
    pub kind: CredentialType,
    pub label: String,
    pub enabled: bool,
    /// Quota entries the upstream returned, classified or not.
    pub entry_count: usize,
    pub groups: Vec<GroupQuota>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CredentialQuotaReport {
    /// Enabled and returned at least one quota entry on this fetch.
    pub fn is_available(&self) -> bool {
        self.enabled && self.entry_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_boundary_inclusive() {
        assert_eq!(Tier::from_percentage(100), Tier::Abundant);
        assert_eq!(Tier::from_percentage(80), Tier::Abundant);
        assert_eq!(Tier::from_percentage(79), Tier::Normal);
        assert_eq!(Tier::from_percentage(50), Tier::Normal);
        assert_eq!(Tier::from_percentage(49), Tier::Low);
        assert_eq!(Tier::from_percentage(20), Tier::Low);
        assert_eq!(Tier::from_percentage(19), Tier::Critical);
        assert_eq!(Tier::from_percentage(0), Tier::Critical);
    }

    #[test]
    fn tiers_are_monotonic() {
        let mut previous = Tier::from_percentage(100);
        for pct in (0..=100u8).rev() {
            let tier = Tier::from_percentage(pct);
            assert!(tier >= previous, "tier improved when dropping to {pct}");
            previous = tier;
        }
    }

    #[test]
    fn provider_names_map_to_types() {
        assert_eq!(
            CredentialType::from_provider("Antigravity"),
            Some(CredentialType::Antigravity)
        );
        assert_eq!(
            CredentialType::from_provider("gemini-cli"),
            Some(CredentialType::GeminiCli)
        );
        assert_eq!(
            CredentialType::from_provider("gemini"),
            Some(CredentialType::GeminiCli)
        );
        assert_eq!(CredentialType::from_provider("codex"), None);
    }

    #[test]
    fn auth_file_label_prefers_email() {
        let file: AuthFile = serde_json::from_str(
            r#"{"auth_index": 3, "type": "antigravity", "email": "", "name": "antigravity-a.json"}"#,
        )
        .unwrap();
        assert_eq!(file.label(), "antigravity-a.json");
        assert_eq!(file.credential_type(), Some(CredentialType::Antigravity));
        assert_eq!(file.auth_index.as_deref(), Some("3"));
        assert!(file.is_enabled());
    }

    #[test]
    fn absorb_keeps_weakest_and_soonest() {
        let later = "2026-10-20T00:00:00Z".parse().unwrap();
        let sooner = "2026-10-19T12:00:00Z".parse().unwrap();
        let mut group = GroupQuota::from_entry(
            ModelGroup::Gemini3Pro,
            &QuotaEntry {
                model: "gemini-3-pro-high".into(),
                percentage: 100,
                refresh_at: Some(later),
            },
        );
        group.absorb(&QuotaEntry {
            model: "gemini-3-pro-low".into(),
            percentage: 42,
            refresh_at: Some(sooner),
        });
        assert_eq!(group.percentage, 42);
        assert_eq!(group.tier, Tier::Low);
        assert_eq!(group.refresh_at, Some(sooner));
        assert_eq!(group.models.len(), 2);
    }
}

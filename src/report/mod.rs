//! Plain-text rendering of aggregated reports.
//!
//! Rendering never changes a number or a tier; it only orders, truncates and
//! formats what the aggregators computed.

use chrono::{DateTime, Local, Utc};
use std::fmt::Write;

use crate::config::MaxRender;
use crate::models::{
    CredentialQuotaReport, CredentialType, HourBucket, Overview, TodaySummary, UsageCounter,
};

const RULE: &str = "═══════════════════════════════════════════";
const NONE_LINE: &str = "   none";
const TOP_APIS: usize = 8;
const TOP_MODELS_OVERVIEW: usize = 10;
const TOP_MODELS_TODAY: usize = 15;
const TOP_CREDENTIALS_TODAY: usize = 10;
const MAX_LABEL_CHARS: usize = 30;

pub fn render_overview(overview: &Overview) -> String {
    let mut out = String::new();
    let totals = &overview.totals;

    let _ = writeln!(out, "📊 CLIProxyAPI Usage Overview");
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "📈 Totals:");
    let _ = writeln!(out, "   Requests:     {}", format_number(totals.total_requests));
    let _ = writeln!(out, "   Success rate: {}", format_rate(totals));
    let _ = writeln!(
        out,
        "   Success/Fail: {} / {}",
        format_number(totals.success_count),
        format_number(totals.failure_count)
    );
    let _ = writeln!(out, "   Tokens:       {}", format_tokens(totals.total_tokens));
    let _ = writeln!(out);

    let _ = writeln!(out, "🔌 APIs:");
    let apis = top_by_requests(overview.per_api.iter(), TOP_APIS);
    if apis.is_empty() {
        let _ = writeln!(out, "{}", NONE_LINE);
    }
    for (name, counter) in apis {
        let _ = writeln!(
            out,
            "   {}: {} requests / {} tokens",
            name,
            format_number(counter.total_requests),
            format_tokens(counter.total_tokens)
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "🧠 Models:");
    let models = top_by_requests(overview.per_model.iter(), TOP_MODELS_OVERVIEW);
    if models.is_empty() {
        let _ = writeln!(out, "{}", NONE_LINE);
    }
    for (name, counter) in models {
        let _ = writeln!(
            out,
            "   {}: {} requests / {} ok / {} tokens",
            name,
            format_number(counter.total_requests),
            format_rate(counter),
            format_tokens(counter.total_tokens)
        );
    }

    if let Some(availability) = &overview.credential_availability {
        let available: usize = availability.values().map(|a| a.available).sum();
        let total: usize = availability.values().map(|a| a.total).sum();
        let _ = writeln!(out);
        let _ = writeln!(out, "🔑 OAuth Credentials: {}/{} available", available, total);
        if availability.is_empty() {
            let _ = writeln!(out, "{}", NONE_LINE);
        }
        for (kind, counts) in availability {
            let _ = writeln!(
                out,
                "   {} {}: {}/{}",
                kind.icon(),
                kind.name(),
                counts.available,
                counts.total
            );
        }
    }

    let _ = write!(out, "{}", RULE);
    out
}

pub fn render_today(today: &TodaySummary) -> String {
    let mut out = String::new();
    let totals = &today.totals;

    let _ = writeln!(out, "📅 Today's Usage ({})", today.date.format("%Y-%m-%d"));
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "📈 Totals:");
    let _ = writeln!(out, "   Requests:     {}", format_number(totals.total_requests));
    let _ = writeln!(out, "   Success rate: {}", format_rate(totals));
    let _ = writeln!(out, "   Failed:       {}", format_number(totals.failure_count));
    let _ = writeln!(out, "   Tokens:       {}", format_tokens(totals.total_tokens));
    let _ = writeln!(
        out,
        "   Breakdown:    {} in / {} out / {} reasoning / {} cached",
        format_tokens(today.tokens.input),
        format_tokens(today.tokens.output),
        format_tokens(today.tokens.reasoning),
        format_tokens(today.tokens.cached)
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "🧠 Models:");
    let models = top_by_requests(today.per_model.iter(), TOP_MODELS_TODAY);
    if models.is_empty() {
        let _ = writeln!(out, "{}", NONE_LINE);
    }
    for (name, counter) in models {
        let failed = if counter.failure_count > 0 {
            format!(" ({} failed)", format_number(counter.failure_count))
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "   {}: {} requests{} / {} tokens",
            name,
            format_number(counter.total_requests),
            failed,
            format_tokens(counter.total_tokens)
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "🕒 Time of Day:");
    if today.hour_distribution.values().all(|count| *count == 0) {
        let _ = writeln!(out, "{}", NONE_LINE);
    } else {
        for bucket in HourBucket::ALL {
            let count = today.hour_distribution.get(&bucket).copied().unwrap_or(0);
            let _ = writeln!(out, "   {}: {}", bucket.label(), format_number(count));
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "🔑 Credentials:");
    let mut credentials: Vec<_> = today.per_credential.iter().collect();
    credentials.sort_by(|a, b| b.1.requests.cmp(&a.1.requests).then_with(|| a.0.cmp(b.0)));
    if credentials.is_empty() {
        let _ = writeln!(out, "{}", NONE_LINE);
    }
    for (auth_index, usage) in credentials.into_iter().take(TOP_CREDENTIALS_TODAY) {
        let failed = if usage.failed > 0 {
            format!(" ({} failed)", format_number(usage.failed))
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "   #{}: {} requests{} / {} tokens",
            auth_index,
            format_number(usage.requests),
            failed,
            format_tokens(usage.tokens)
        );
    }

    let _ = write!(out, "{}", RULE);
    out
}

pub fn render_quota(reports: &[CredentialQuotaReport], max_render: &MaxRender) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "📊 OAuth Quota Status");
    let _ = writeln!(out, "{}", RULE);

    if reports.is_empty() {
        let _ = writeln!(out, "{}", NONE_LINE);
    }

    for kind in [CredentialType::Antigravity, CredentialType::GeminiCli] {
        let of_kind: Vec<_> = reports.iter().filter(|r| r.kind == kind).collect();
        if of_kind.is_empty() {
            continue;
        }

        let _ = writeln!(
            out,
            "━━━ {} {} ({}) ━━━",
            kind.icon(),
            kind.name(),
            of_kind.len()
        );

        let limit = match max_render.for_type(kind) {
            0 => of_kind.len(),
            n => n.min(of_kind.len()),
        };
        for report in &of_kind[..limit] {
            render_credential(&mut out, report);
        }

        let hidden = of_kind.len() - limit;
        if hidden > 0 {
            let _ = writeln!(out, "   ⋯ {} more {} credentials not shown", hidden, kind.name());
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "💡 Quota refreshes automatically; percentages show remaining allowance.");
    let _ = write!(out, "{}", RULE);
    out
}

fn render_credential(out: &mut String, report: &CredentialQuotaReport) {
    let icon = if report.enabled { "✅" } else { "❌" };
    let _ = writeln!(out, "{} {}", icon, truncate_label(&report.label));

    if report.groups.is_empty() {
        let note = report.note.as_deref().unwrap_or("no quota information");
        let _ = writeln!(out, "   ⚠️ {}", note);
        return;
    }

    for group in &report.groups {
        let _ = writeln!(
            out,
            "   {} {}: {}% | refresh: {}",
            group.tier.icon(),
            group.group.label(),
            group.percentage,
            format_refresh(group.refresh_at)
        );
    }
}

fn top_by_requests<'a, I>(items: I, limit: usize) -> Vec<(&'a String, &'a UsageCounter)>
where
    I: Iterator<Item = (&'a String, &'a UsageCounter)>,
{
    let mut items: Vec<_> = items.collect();
    items.sort_by(|a, b| {
        b.1.total_requests
            .cmp(&a.1.total_requests)
            .then_with(|| a.0.cmp(b.0))
    });
    items.truncate(limit);
    items
}

fn format_rate(counter: &UsageCounter) -> String {
    format!("{:.1}%", counter.success_rate() * 100.0)
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

fn format_tokens(tokens: u64) -> String {
    if tokens >= 1_000_000 {
        format!("{:.2}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.2}K", tokens as f64 / 1_000.0)
    } else {
        tokens.to_string()
    }
}

fn format_refresh(refresh_at: Option<DateTime<Utc>>) -> String {
    match refresh_at {
        Some(ts) => ts.with_timezone(&Local).format("%m/%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

fn truncate_label(label: &str) -> String {
    if label.chars().count() > MAX_LABEL_CHARS {
        let head: String = label.chars().take(MAX_LABEL_CHARS - 3).collect();
        format!("{}...", head)
    } else {
        label.to_string()
    }
}

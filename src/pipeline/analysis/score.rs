//! Score stage: validate the analyzer's raw output into a `Snapshot`.
//!
//! The analyzer's JSON is untrusted. It is parsed against a lenient schema
//! (every field optional, numbers may arrive as strings), then required
//! fields are enforced. No partial snapshot ever leaves this module.

use serde::Deserialize;
use serde_json::Value;

use super::PipelineError;
use crate::models::{
    AskTag, DealQuality, RevenueTag, Snapshot, SnapshotTags, MAX_KEY_POINTS,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSnapshot {
    #[serde(alias = "company_name")]
    company_name: Option<String>,
    tagline: Option<String>,
    #[serde(alias = "deal_quality")]
    deal_quality: Option<RawDealQuality>,
    tags: Option<RawTags>,
    debrief: Option<Value>,
    #[serde(alias = "key_strengths")]
    key_strengths: Option<Vec<String>>,
    #[serde(alias = "key_risks")]
    key_risks: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDealQuality {
    score: Option<Value>,
    verdict: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTags {
    stage: Option<String>,
    sector: Option<String>,
    geography: Option<String>,
    revenue: Option<RawRevenue>,
    ask: Option<RawAsk>,
    #[serde(alias = "traction_tags")]
    traction_tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRevenue {
    amount: Option<Value>,
    currency: Option<String>,
    #[serde(alias = "is_pre_revenue")]
    is_pre_revenue: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawAsk {
    amount: Option<Value>,
    currency: Option<String>,
    #[serde(alias = "round_type")]
    round_type: Option<String>,
}

/// Validate and normalize a raw analyzer response.
///
/// Accepts a JSON object, or a string holding one (optionally inside a
/// ```json fence). Fails with `MalformedResponse` when the payload cannot be
/// parsed or lacks `companyName` or `dealQuality.score`.
pub fn score(raw: Value) -> Result<Snapshot, PipelineError> {
    let raw = match raw {
        Value::String(text) => parse_text_payload(&text)?,
        other => other,
    };
    if !raw.is_object() {
        return Err(PipelineError::MalformedResponse(
            "Expected a JSON object".into(),
        ));
    }

    let parsed: RawSnapshot = serde_json::from_value(raw)
        .map_err(|e| PipelineError::MalformedResponse(format!("Schema mismatch: {e}")))?;

    let company_name = clean(parsed.company_name)
        .ok_or_else(|| PipelineError::MalformedResponse("Missing companyName".into()))?;

    let quality = parsed
        .deal_quality
        .ok_or_else(|| PipelineError::MalformedResponse("Missing dealQuality".into()))?;
    let score = quality
        .score
        .as_ref()
        .and_then(score_value)
        .ok_or_else(|| PipelineError::MalformedResponse("Missing or non-numeric dealQuality.score".into()))?;

    let tags = parsed.tags.unwrap_or_default();
    let revenue = tags.revenue.unwrap_or_default();
    let ask = tags.ask.unwrap_or_default();

    Ok(Snapshot {
        company_name,
        tagline: clean(parsed.tagline).unwrap_or_default(),
        deal_quality: DealQuality {
            score: score.clamp(0.0, 100.0).round() as u8,
            verdict: clean(quality.verdict).unwrap_or_default(),
        },
        tags: SnapshotTags {
            stage: clean(tags.stage),
            sector: clean(tags.sector),
            geography: clean(tags.geography),
            revenue: RevenueTag {
                amount: revenue.amount.as_ref().and_then(amount_value),
                currency: clean(revenue.currency),
                is_pre_revenue: revenue.is_pre_revenue.unwrap_or(false),
            },
            ask: AskTag {
                amount: ask.amount.as_ref().and_then(amount_value),
                currency: clean(ask.currency),
                round_type: clean(ask.round_type),
            },
            traction_tags: clean_list(tags.traction_tags, usize::MAX),
        },
        debrief: normalize_debrief(parsed.debrief),
        key_strengths: clean_list(parsed.key_strengths, MAX_KEY_POINTS),
        key_risks: clean_list(parsed.key_risks, MAX_KEY_POINTS),
    })
}

/// Text payloads: a fenced ```json block if present, else the whole text.
fn parse_text_payload(text: &str) -> Result<Value, PipelineError> {
    let json_str = match text.find("```json") {
        Some(start) => {
            let content_start = start + 7;
            let end = text[content_start..].find("```").ok_or_else(|| {
                PipelineError::MalformedResponse("Unclosed JSON block".into())
            })?;
            &text[content_start..content_start + end]
        }
        None => text,
    };
    serde_json::from_str(json_str.trim())
        .map_err(|e| PipelineError::MalformedResponse(format!("Invalid JSON: {e}")))
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn clean_list(values: Option<Vec<String>>, limit: usize) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| clean(Some(s)))
        .take(limit)
        .collect()
}

/// Deal score: a plain number, or a string holding one ("82", "82/100",
/// "7.5 out of 10"). Ratios are rescaled to 0-100. Anything else is `None`.
fn score_value(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let (value, rest) = split_number(s)?;
            if rest.is_empty() {
                Some(value)
            } else {
                let denominator = rest
                    .strip_prefix('/')
                    .or_else(|| rest.strip_prefix("out of"))?;
                match split_number(denominator)? {
                    (d, "") if d > 0.0 => Some(value / d * 100.0),
                    _ => None,
                }
            }
        }
        _ => None,
    };
    score.filter(|n| n.is_finite())
}

/// Money amount: a plain number, or a string such as "1,200,000", "$2.5M"
/// or "€800k". Unknown suffixes make the amount unreadable.
fn amount_value(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim().trim_start_matches(&['$', '€', '£', '¥'][..]);
            let (value, rest) = split_number(s)?;
            let multiplier = match rest.to_ascii_lowercase().as_str() {
                "" => 1.0,
                "k" | "thousand" => 1e3,
                "m" | "mm" | "million" => 1e6,
                "b" | "bn" | "billion" => 1e9,
                _ => return None,
            };
            Some(value * multiplier)
        }
        _ => None,
    };
    amount.filter(|n| n.is_finite())
}

/// Split one leading decimal (optional sign, thousands commas) off `text`,
/// returning it with the trimmed remainder.
fn split_number(text: &str) -> Option<(f64, &str)> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|&(i, c)| {
            !(c.is_ascii_digit() || matches!(c, '.' | ',') || (i == 0 && matches!(c, '-' | '+')))
        })
        .map_or(text.len(), |(i, _)| i);
    let (head, rest) = text.split_at(end);
    let head = head.trim_end_matches(',');
    if !head.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let value = head.replace(',', "").parse::<f64>().ok()?;
    Some((value, rest.trim()))
}

/// Paragraphs separated by exactly one blank line. Arrays of paragraphs are
/// accepted too.
fn normalize_debrief(value: Option<Value>) -> String {
    let paragraphs: Vec<String> = match value {
        Some(Value::String(text)) => text
            .replace("\r\n", "\n")
            .split("\n\n")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => clean(Some(s)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    paragraphs.join("\n\n")
}

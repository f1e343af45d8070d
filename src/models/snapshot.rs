//! The structured deal summary produced by the analysis pipeline.
//!
//! Field names serialize in camelCase: this is the shape downstream
//! consumers (deal store, review screens) read.

use serde::{Deserialize, Serialize};

/// Upper bound on `key_strengths` and `key_risks`.
pub const MAX_KEY_POINTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub company_name: String,
    pub tagline: String,
    pub deal_quality: DealQuality,
    pub tags: SnapshotTags,
    /// Paragraphs separated by a blank line.
    pub debrief: String,
    pub key_strengths: Vec<String>,
    pub key_risks: Vec<String>,
}

impl Snapshot {
    pub fn debrief_paragraphs(&self) -> impl Iterator<Item = &str> {
        self.debrief
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealQuality {
    /// 0..=100
    pub score: u8,
    pub verdict: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTags {
    pub stage: Option<String>,
    pub sector: Option<String>,
    pub geography: Option<String>,
    pub revenue: RevenueTag,
    pub ask: AskTag,
    pub traction_tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueTag {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub is_pre_revenue: bool,
}

impl RevenueTag {
    /// Short human label: "Pre-revenue", "USD 1.2M", or "Undisclosed".
    pub fn label(&self) -> String {
        if self.is_pre_revenue {
            return "Pre-revenue".to_string();
        }
        match self.amount {
            Some(amount) => {
                let currency = self.currency.as_deref().unwrap_or("USD");
                format!("{currency} {}", compact_amount(amount))
            }
            None => "Undisclosed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskTag {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub round_type: Option<String>,
}

fn compact_amount(amount: f64) -> String {
    let abs = amount.abs();
    if abs >= 1_000_000_000.0 {
        format!("{:.1}B", amount / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("{:.1}M", amount / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{:.0}K", amount / 1_000.0)
    } else {
        format!("{amount:.0}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_revenue_label_wins_over_amount() {
        let tag = RevenueTag {
            amount: Some(0.0),
            currency: Some("EUR".into()),
            is_pre_revenue: true,
        };
        assert_eq!(tag.label(), "Pre-revenue");
    }

    #[test]
    fn revenue_label_is_compact() {
        let tag = RevenueTag {
            amount: Some(1_200_000.0),
            currency: Some("EUR".into()),
            is_pre_revenue: false,
        };
        assert_eq!(tag.label(), "EUR 1.2M");
        assert_eq!(RevenueTag::default().label(), "Undisclosed");
    }

    #[test]
    fn debrief_splits_on_blank_lines() {
        let snapshot = Snapshot {
            company_name: "Acme".into(),
            tagline: String::new(),
            deal_quality: DealQuality {
                score: 50,
                verdict: "Watch".into(),
            },
            tags: SnapshotTags::default(),
            debrief: "First.\n\n\nSecond.\n\n".into(),
            key_strengths: vec![],
            key_risks: vec![],
        };
        let paragraphs: Vec<&str> = snapshot.debrief_paragraphs().collect();
        assert_eq!(paragraphs, vec!["First.", "Second."]);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(RevenueTag {
            amount: None,
            currency: None,
            is_pre_revenue: true,
        })
        .unwrap();
        assert_eq!(json["isPreRevenue"], true);
    }
}

use crate::utils::error::{AppraisalError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sequence number of an opened round, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// 參與者（經紀人）名稱，已去除前後空白
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppraisalError::InvalidParticipant {
                reason: "participant id cannot be empty".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Property types an item can be registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Casa,
    Apartamento,
    Terreno,
    #[serde(rename = "Chácara")]
    Chacara,
    Rancho,
    #[serde(rename = "Sítio")]
    Sitio,
    #[serde(rename = "Galpão")]
    Galpao,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Casa,
        Category::Apartamento,
        Category::Terreno,
        Category::Chacara,
        Category::Rancho,
        Category::Sitio,
        Category::Galpao,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Casa => "Casa",
            Category::Apartamento => "Apartamento",
            Category::Terreno => "Terreno",
            Category::Chacara => "Chácara",
            Category::Rancho => "Rancho",
            Category::Sitio => "Sítio",
            Category::Galpao => "Galpão",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = AppraisalError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AppraisalError::InvalidItem {
                reason: format!(
                    "unknown category '{}'; expected one of {}",
                    wanted,
                    Category::ALL
                        .iter()
                        .map(|c| c.label())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn new(name: &str, category: Category) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppraisalError::InvalidItem {
                reason: "item name cannot be empty".to_string(),
            });
        }
        Ok(Self {
            id: ItemId::new(),
            name: name.to_string(),
            category,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub participant_id: ParticipantId,
    pub value: f64,
    /// Time of the first submission in the round; fixes the ledger order.
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpsertOutcome {
    Created,
    Replaced,
}

/// 驗證估價：必須是有限的正數
pub fn validate_estimate(value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(AppraisalError::InvalidValue {
            value: value.to_string(),
        })
    }
}

/// Arithmetic mean of the submitted values, 0 when there are none.
///
/// Running mean: stays finite for any finite estimates.
pub fn average_of(submissions: &[Submission]) -> f64 {
    submissions
        .iter()
        .enumerate()
        .fold(0.0, |mean, (i, s)| mean + (s.value - mean) / (i + 1) as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedRoundSummary {
    pub round_id: RoundId,
    pub item_id: ItemId,
    pub item_name: String,
    pub category: Category,
    pub average: f64,
    pub submissions: Vec<Submission>,
    pub closed_at: DateTime<Utc>,
    /// Local calendar day the round was closed on; used by daily reporting.
    pub session_date: NaiveDate,
}

/// Revealed result of a closed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub item: Item,
    pub submissions: Vec<Submission>,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub active_item: Option<Item>,
    pub round_open: bool,
    pub submissions: Vec<Submission>,
    pub daily_counter: u32,
    pub history: Vec<ArchivedRoundSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(participant: &str, value: f64) -> Submission {
        let now = Utc::now();
        Submission {
            participant_id: ParticipantId::parse(participant).unwrap(),
            value,
            submitted_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_category_parsing_accepts_accents_and_case() {
        assert_eq!("Casa".parse::<Category>().unwrap(), Category::Casa);
        assert_eq!("galpão".parse::<Category>().unwrap(), Category::Galpao);
        assert_eq!(" Sítio ".parse::<Category>().unwrap(), Category::Sitio);
        let err = "Castelo".parse::<Category>().unwrap_err();
        assert_eq!(err.kind(), "InvalidItem");
    }

    #[test]
    fn test_category_serializes_with_label() {
        let json = serde_json::to_string(&Category::Chacara).unwrap();
        assert_eq!(json, "\"Chácara\"");
        let back: Category = serde_json::from_str("\"Chácara\"").unwrap();
        assert_eq!(back, Category::Chacara);
    }

    #[test]
    fn test_item_requires_name() {
        assert!(Item::new("   ", Category::Casa).is_err());
        let item = Item::new("  Casa A ", Category::Casa).unwrap();
        assert_eq!(item.name, "Casa A");
    }

    #[test]
    fn test_validate_estimate() {
        assert_eq!(validate_estimate(100000.0).unwrap(), 100000.0);
        assert!(validate_estimate(0.0).is_err());
        assert!(validate_estimate(-50.0).is_err());
        assert!(validate_estimate(f64::NAN).is_err());
        assert!(validate_estimate(f64::INFINITY).is_err());
    }

    #[test]
    fn test_average_of() {
        assert_eq!(average_of(&[]), 0.0);
        let subs = vec![submission("p1", 110000.0), submission("p2", 120000.0)];
        assert_eq!(average_of(&subs), 115000.0);
    }

    #[test]
    fn test_average_of_huge_estimates_stays_finite() {
        let subs = vec![submission("p1", 1e308), submission("p2", 1e308)];
        let average = average_of(&subs);
        assert!(average.is_finite());
        assert_eq!(average, 1e308);

        let subs = vec![submission("p1", f64::MAX), submission("p2", 1.0)];
        assert!(average_of(&subs).is_finite());
    }

    #[test]
    fn test_participant_id_is_trimmed() {
        assert_eq!(ParticipantId::parse(" Ana ").unwrap().as_str(), "Ana");
        assert!(ParticipantId::parse("").is_err());
    }
}

//! The trip request and its enumerations.

use crate::errors::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Interests assumed when the traveller gives none.
const DEFAULT_INTERESTS: [&str; 3] = ["sightseeing", "local culture", "food"];

/// Spending level for the trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetTier {
    /// Hostels, street food, public transport.
    Budget,
    /// Comfortable mid-range hotels and restaurants.
    #[default]
    MidRange,
    /// Premium hotels and experiences.
    Luxury,
}

impl fmt::Display for BudgetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Budget => write!(f, "budget"),
            Self::MidRange => write!(f, "mid-range"),
            Self::Luxury => write!(f, "luxury"),
        }
    }
}

impl FromStr for BudgetTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "budget" => Ok(Self::Budget),
            "mid-range" | "midrange" | "mid" => Ok(Self::MidRange),
            "luxury" => Ok(Self::Luxury),
            other => Err(format!("unknown budget tier '{other}'")),
        }
    }
}

/// The overall character of the trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelStyle {
    /// Slow pace, rest and leisure.
    #[default]
    Relaxed,
    /// Outdoor and physical activities.
    Adventure,
    /// Museums, history, architecture.
    Cultural,
    /// Trips for couples.
    Romantic,
    /// Work travel with limited free time.
    Business,
}

impl fmt::Display for TravelStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relaxed => write!(f, "relaxed"),
            Self::Adventure => write!(f, "adventure"),
            Self::Cultural => write!(f, "cultural"),
            Self::Romantic => write!(f, "romantic"),
            Self::Business => write!(f, "business"),
        }
    }
}

impl FromStr for TravelStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relaxed" => Ok(Self::Relaxed),
            "adventure" => Ok(Self::Adventure),
            "cultural" => Ok(Self::Cultural),
            "romantic" => Ok(Self::Romantic),
            "business" => Ok(Self::Business),
            other => Err(format!("unknown travel style '{other}'")),
        }
    }
}

/// Who is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Travelers {
    /// Number of adults.
    pub adults: u32,
    /// Number of children.
    #[serde(default)]
    pub children: u32,
}

impl Default for Travelers {
    fn default() -> Self {
        Self {
            adults: 1,
            children: 0,
        }
    }
}

impl Travelers {
    /// Creates a group of adults only.
    #[must_use]
    pub fn adults(adults: u32) -> Self {
        Self { adults, children: 0 }
    }

    /// Total head count, saturating at `u32::MAX`.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.adults.saturating_add(self.children)
    }
}

impl fmt::Display for Travelers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = |n: u32, word: &str| {
            if n == 1 {
                format!("{n} {word}")
            } else {
                format!("{n} {word}s")
            }
        };
        if self.children == 0 {
            write!(f, "{}", plural(self.adults, "adult"))
        } else {
            let children = if self.children == 1 {
                "1 child".to_string()
            } else {
                format!("{} children", self.children)
            };
            write!(f, "{}, {children}", plural(self.adults, "adult"))
        }
    }
}

/// Optional free-text preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Things the travellers enjoy.
    #[serde(default)]
    pub interests: Vec<String>,
    /// Dietary restrictions.
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    /// Mobility or accessibility needs.
    #[serde(default)]
    pub mobility_needs: Option<String>,
    /// Places that must be part of the plan.
    #[serde(default)]
    pub must_see: Vec<String>,
    /// Things to keep out of the plan.
    #[serde(default)]
    pub avoid: Vec<String>,
}

/// A request to plan one trip.
///
/// The request is immutable once a run starts: the controller takes it by
/// value and only hands out shared references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripRequest {
    /// Where the travellers leave from.
    pub origin: String,
    /// Where they are going.
    pub destination: String,
    /// First day of the trip.
    pub start_date: NaiveDate,
    /// Last day of the trip.
    pub end_date: NaiveDate,
    /// Spending level.
    #[serde(default)]
    pub budget: BudgetTier,
    /// Trip character.
    #[serde(default)]
    pub style: TravelStyle,
    /// Group composition.
    #[serde(default)]
    pub travelers: Travelers,
    /// Free-text preferences.
    #[serde(default)]
    pub preferences: Preferences,
}

impl TripRequest {
    /// Creates a request with default budget, style, group and preferences.
    #[must_use]
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            start_date,
            end_date,
            budget: BudgetTier::default(),
            style: TravelStyle::default(),
            travelers: Travelers::default(),
            preferences: Preferences::default(),
        }
    }

    /// Sets the budget tier.
    #[must_use]
    pub fn with_budget(mut self, budget: BudgetTier) -> Self {
        self.budget = budget;
        self
    }

    /// Sets the travel style.
    #[must_use]
    pub fn with_style(mut self, style: TravelStyle) -> Self {
        self.style = style;
        self
    }

    /// Sets the group composition.
    #[must_use]
    pub fn with_travelers(mut self, travelers: Travelers) -> Self {
        self.travelers = travelers;
        self
    }

    /// Sets the preferences.
    #[must_use]
    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Checks the request before any stage runs.
    ///
    /// Every problem is reported, not just the first one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();

        if self.origin.trim().is_empty() {
            err.push("origin", "must not be empty");
        }
        if self.destination.trim().is_empty() {
            err.push("destination", "must not be empty");
        }
        if self.start_date > self.end_date {
            err.push(
                "dates",
                format!(
                    "start date {} is after end date {}",
                    self.start_date, self.end_date
                ),
            );
        }
        match self.travelers.adults.checked_add(self.travelers.children) {
            Some(0) => err.push("travelers", "at least one traveller is required"),
            None => err.push("travelers", "group size is too large"),
            Some(_) => {}
        }

        err.into_result()
    }

    /// Trip length in days: the date difference, never less than one.
    #[must_use]
    pub fn duration_days(&self) -> u32 {
        let days = (self.end_date - self.start_date).num_days().max(1);
        u32::try_from(days).unwrap_or(u32::MAX)
    }

    /// The interests to plan around, falling back to general sightseeing.
    #[must_use]
    pub fn interests(&self) -> Vec<String> {
        if self.preferences.interests.is_empty() {
            DEFAULT_INTERESTS.iter().map(|s| (*s).to_string()).collect()
        } else {
            self.preferences.interests.clone()
        }
    }

    /// One-line description used in logs and report metadata.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} to {}, {} to {} ({} days, {}, {}, {})",
            self.origin.trim(),
            self.destination.trim(),
            self.start_date,
            self.end_date,
            self.duration_days(),
            self.travelers,
            self.budget,
            self.style
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn barcelona() -> TripRequest {
        TripRequest::new("New York", "Barcelona", date(2024, 6, 15), date(2024, 6, 22))
            .with_budget(BudgetTier::MidRange)
            .with_style(TravelStyle::Cultural)
    }

    #[test]
    fn test_valid_request() {
        assert!(barcelona().validate().is_ok());
    }

    #[test]
    fn test_empty_places_rejected() {
        let mut req = barcelona();
        req.origin = "   ".into();
        req.destination = String::new();

        let err = req.validate().unwrap_err();
        assert!(err.has_field("origin"));
        assert!(err.has_field("destination"));
        assert_eq!(err.issues.len(), 2);
    }

    #[test]
    fn test_reversed_dates_rejected() {
        let req = TripRequest::new("A", "B", date(2024, 6, 22), date(2024, 6, 15));
        let err = req.validate().unwrap_err();
        assert!(err.has_field("dates"));
    }

    #[test]
    fn test_same_day_trip_is_valid_and_one_day_long() {
        let req = TripRequest::new("A", "B", date(2024, 6, 15), date(2024, 6, 15));
        assert!(req.validate().is_ok());
        assert_eq!(req.duration_days(), 1);
    }

    #[test]
    fn test_empty_group_rejected() {
        let req = barcelona().with_travelers(Travelers::adults(0));
        assert!(req.validate().unwrap_err().has_field("travelers"));
    }

    #[test]
    fn test_oversized_group_rejected() {
        let req = barcelona().with_travelers(Travelers {
            adults: u32::MAX,
            children: 1,
        });
        let err = req.validate().unwrap_err();
        assert!(err.has_field("travelers"));
        assert_eq!(req.travelers.total(), u32::MAX);
    }

    #[test]
    fn test_duration() {
        assert_eq!(barcelona().duration_days(), 7);
    }

    #[test]
    fn test_default_interests() {
        assert_eq!(barcelona().interests(), vec!["sightseeing", "local culture", "food"]);

        let req = barcelona().with_preferences(Preferences {
            interests: vec!["architecture".into()],
            ..Preferences::default()
        });
        assert_eq!(req.interests(), vec!["architecture"]);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("Mid-Range".parse::<BudgetTier>(), Ok(BudgetTier::MidRange));
        assert_eq!("mid_range".parse::<BudgetTier>(), Ok(BudgetTier::MidRange));
        assert_eq!("LUXURY".parse::<BudgetTier>(), Ok(BudgetTier::Luxury));
        assert!("cheap".parse::<BudgetTier>().is_err());
        assert_eq!("Cultural".parse::<TravelStyle>(), Ok(TravelStyle::Cultural));
        assert!("family".parse::<TravelStyle>().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::json!({
            "origin": "New York",
            "destination": "Barcelona",
            "start_date": "2024-06-15",
            "end_date": "2024-06-22",
            "budget": "mid-range",
            "style": "cultural",
            "travelers": {"adults": 2, "children": 1}
        });
        let req: TripRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.budget, BudgetTier::MidRange);
        assert_eq!(req.travelers.total(), 3);
        assert!(req.preferences.interests.is_empty());
    }

    #[test]
    fn test_missing_date_fails_to_deserialize() {
        let json = serde_json::json!({
            "origin": "New York",
            "destination": "Barcelona",
            "start_date": "2024-06-15"
        });
        assert!(serde_json::from_value::<TripRequest>(json).is_err());
    }

    #[test]
    fn test_summary() {
        let req = barcelona().with_travelers(Travelers { adults: 2, children: 1 });
        assert_eq!(
            req.summary(),
            "New York to Barcelona, 2024-06-15 to 2024-06-22 (7 days, 2 adults, 1 child, mid-range, cultural)"
        );
    }
}

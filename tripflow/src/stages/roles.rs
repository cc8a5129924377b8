//! The three planning roles: personas, search queries, prompts and output checks.

use crate::clients::GenerationParams;
use crate::core::sections::{find_section, parse_sections, Section};
use crate::core::TripRequest;
use crate::errors::ClientError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

/// A stage role. Each role is a prompt template plus an output validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// Weather, cost and safety assessment of the destination.
    DestinationAnalyst,
    /// Insider tips conditioned on the analysis.
    LocalExpert,
    /// Day-by-day itinerary, budget and packing list.
    TravelConcierge,
}

/// Who the reasoning backend is asked to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persona {
    /// Job title.
    pub role: &'static str,
    /// What the persona is trying to achieve.
    pub goal: &'static str,
    /// Background that shapes the answers.
    pub backstory: &'static str,
}

impl Persona {
    /// Renders the persona as a system message.
    #[must_use]
    pub fn system_message(&self) -> String {
        format!("You are a {}.\nGoal: {}\n\n{}", self.role, self.goal, self.backstory)
    }
}

impl StageRole {
    /// Roles in pipeline order.
    pub const ALL: [Self; 3] = [Self::DestinationAnalyst, Self::LocalExpert, Self::TravelConcierge];

    /// The stage name results and context entries are keyed by.
    #[must_use]
    pub fn stage_name(self) -> &'static str {
        match self {
            Self::DestinationAnalyst => "destination_analysis",
            Self::LocalExpert => "local_expertise",
            Self::TravelConcierge => "itinerary_concierge",
        }
    }

    /// Looks up a role by stage name.
    #[must_use]
    pub fn from_stage_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.stage_name() == name)
    }

    /// The role's persona.
    #[must_use]
    pub fn persona(self) -> Persona {
        match self {
            Self::DestinationAnalyst => Persona {
                role: "Travel Destination Analyst",
                goal: "Assess the destination for the requested dates on weather, cost and safety",
                backstory: "You are an expert travel analyst with extensive knowledge of global destinations. \
                    You compare places on weather patterns, costs and activities and match them to traveller \
                    preferences. You give data-driven assessments with clear reasoning.",
            },
            Self::LocalExpert => Persona {
                role: "Local Travel Expert",
                goal: "Provide insider knowledge and authentic local recommendations for the destination",
                backstory: "You are a seasoned local travel expert who has lived in cities around the world. \
                    You know the hidden gems, local customs, authentic restaurants and practical tips that help \
                    travellers experience a place like locals rather than tourists.",
            },
            Self::TravelConcierge => Persona {
                role: "Travel Concierge Specialist",
                goal: "Create a complete itinerary with detailed logistics, budget and packing",
                backstory: "You are a professional travel concierge who builds detailed, practical itineraries. \
                    You coordinate logistics, optimise timing, choose accommodation and restaurants and plan \
                    budgets so every part of the trip is organised.",
            },
        }
    }

    /// Generation parameters: cooler for analysis, warmer for the itinerary.
    #[must_use]
    pub fn params(self) -> GenerationParams {
        match self {
            Self::DestinationAnalyst => GenerationParams {
                temperature: 0.2,
                max_tokens: 2048,
            },
            Self::LocalExpert => GenerationParams {
                temperature: 0.5,
                max_tokens: 2048,
            },
            Self::TravelConcierge => GenerationParams {
                temperature: 0.7,
                max_tokens: 4096,
            },
        }
    }

    /// Search queries derived from the request, without duplicates.
    #[must_use]
    pub fn queries(self, request: &TripRequest) -> Vec<String> {
        let dest = request.destination.trim();
        let origin = request.origin.trim();
        let month = request.start_date.format("%B");
        let interests = request.interests();

        let candidates = match self {
            Self::DestinationAnalyst => vec![
                format!("{dest} weather in {month}"),
                format!("{dest} flight prices from {origin}"),
                format!("{dest} {} hotel prices per night", request.budget),
                format!("{dest} travel safety advice"),
            ],
            Self::LocalExpert => vec![
                format!("{dest} hidden gems locals love"),
                format!("{dest} authentic local restaurants"),
                format!("{dest} cultural etiquette tips"),
                format!("{dest} {}", interests.join(" ")),
            ],
            Self::TravelConcierge => vec![
                format!("{dest} best {} hotels for {} travel", request.budget, request.style),
                format!("{dest} top attractions {}", interests.join(" ")),
                format!("{dest} public transportation tips"),
                format!("what to pack for {dest} in {month}"),
            ],
        };

        let mut seen = BTreeSet::new();
        candidates
            .into_iter()
            .filter(|q| seen.insert(q.to_lowercase()))
            .collect()
    }

    /// The instructions placed after the context.
    #[must_use]
    pub fn task(self, request: &TripRequest) -> String {
        let days = request.duration_days();
        match self {
            Self::DestinationAnalyst => format!(
                "Assess {dest} for a trip from {origin} between {start} and {end}.\n\n\
                 Answer in markdown with these `## ` sections:\n\
                 - `## Weather`: expected conditions for the dates.\n\
                 - `## Cost Estimate`: flights from {origin} and accommodation per night for a {budget} budget.\n\
                 - `## Attractions`: the top 3-5 attractions for the interests.\n\
                 - `## Safety`: safety notes and seasonal considerations.\n\
                 Keep it to 300-500 words.",
                dest = request.destination.trim(),
                origin = request.origin.trim(),
                start = request.start_date,
                end = request.end_date,
                budget = request.budget,
            ),
            Self::LocalExpert => "Building on the destination analysis, give insider knowledge.\n\n\
                 Answer in markdown with these `## ` sections:\n\
                 - `## Insider Tips`: hidden gems and the best times to avoid crowds.\n\
                 - `## Cultural Etiquette`: customs, dos and don'ts.\n\
                 - `## Authentic Dining`: 3-5 local restaurants or food experiences.\n\
                 - `## Getting Around`: practical transport advice.\n\
                 Keep it to 400-600 words."
                .to_string(),
            Self::TravelConcierge => format!(
                "Using the analysis and local insights, create a {days}-day plan.\n\n\
                 Answer in markdown with these `## ` sections:\n\
                 - `## Itinerary`: one `### Day N` entry per day from Day 1 to Day {days}, each with \
                 morning, afternoon and evening activities and specific venue names.\n\
                 - `## Budget`: a fenced code block tagged `budget` with one `Category: amount` line per \
                 cost category for the whole group, for example:\n\
                 ```budget\nFlights: $1,200\nAccommodation: $980\nFood: $560\n```\n\
                 Do not include a total line; it is computed for you.\n\
                 - `## Packing`: a packing list suited to the weather and activities.\n\
                 Be specific and realistic."
            ),
        }
    }

    /// Checks that an output has the shape this role promises.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MalformedOutput`] naming what is missing.
    pub fn validate(self, output: &str, request: &TripRequest) -> Result<(), ClientError> {
        let sections = parse_sections(output);
        match self {
            Self::DestinationAnalyst => {
                require(&sections, &["weather"], "weather assessment")?;
                require(&sections, &["cost"], "cost estimate")?;
                require(&sections, &["safety"], "safety note")?;
            }
            Self::LocalExpert => {
                require(&sections, &["insider", "tips"], "insider tips")?;
            }
            Self::TravelConcierge => {
                let itinerary = require(&sections, &["itinerary"], "itinerary")?;
                let days = count_days(&itinerary.body);
                let max = request.duration_days() as usize;
                if days == 0 || days > max {
                    return Err(ClientError::MalformedOutput(format!(
                        "itinerary has {days} day entries, expected 1 to {max}"
                    )));
                }
                require(&sections, &["budget"], "budget breakdown")?;
                require(&sections, &["packing"], "packing list")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.persona().role)
    }
}

fn require<'a>(sections: &'a [Section], keywords: &[&str], what: &str) -> Result<&'a Section, ClientError> {
    match find_section(sections, keywords) {
        Some(section) if !section.is_empty() => Ok(section),
        Some(section) => Err(ClientError::MalformedOutput(format!(
            "section '{}' ({what}) is empty",
            section.title
        ))),
        None => Err(ClientError::MalformedOutput(format!("missing {what} section"))),
    }
}

fn day_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*(?:#{1,6}\s*|[-*]\s+)?(?:\*\*)?day\s+(\d+)\b").ok())
        .as_ref()
}

/// Counts distinct `Day N` entries in an itinerary body.
#[must_use]
pub fn count_days(body: &str) -> usize {
    let Some(re) = day_line() else {
        return 0;
    };
    re.captures_iter(body)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .collect::<BTreeSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_stage_names_round_trip() {
        for role in StageRole::ALL {
            assert_eq!(StageRole::from_stage_name(role.stage_name()), Some(role));
        }
        assert_eq!(StageRole::from_stage_name("unknown"), None);
    }

    #[test]
    fn test_temperatures_rise_towards_itinerary() {
        let temps: Vec<f32> = StageRole::ALL.iter().map(|r| r.params().temperature).collect();
        assert!(temps[0] < temps[1] && temps[1] < temps[2]);
        assert_eq!(StageRole::TravelConcierge.params().max_tokens, 4096);
    }

    #[test]
    fn test_queries_embed_request() {
        let request = fixtures::barcelona_request();
        let queries = StageRole::DestinationAnalyst.queries(&request);
        assert_eq!(queries.len(), 4);
        assert_eq!(queries[0], "Barcelona weather in June");
        assert_eq!(queries[1], "Barcelona flight prices from New York");
    }

    #[test]
    fn test_persona_system_message() {
        let msg = StageRole::LocalExpert.persona().system_message();
        assert!(msg.starts_with("You are a Local Travel Expert."));
        assert_eq!(StageRole::LocalExpert.to_string(), "Local Travel Expert");
    }

    #[test]
    fn test_analyst_validation() {
        let request = fixtures::barcelona_request();
        let role = StageRole::DestinationAnalyst;
        assert!(role.validate(&fixtures::analysis_output(), &request).is_ok());

        let err = role.validate("## Weather\nSunny\n## Cost\n$100", &request).unwrap_err();
        assert_eq!(err, ClientError::MalformedOutput("missing safety note section".into()));

        let err = role.validate("## Weather\n\n## Cost\n$1\n## Safety\nok", &request).unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[test]
    fn test_local_expert_validation() {
        let request = fixtures::barcelona_request();
        assert!(StageRole::LocalExpert.validate("## Local Tips\nGo early.", &request).is_ok());
        assert!(StageRole::LocalExpert.validate("Just prose.", &request).is_err());
    }

    #[test]
    fn test_itinerary_day_bounds() {
        let request = fixtures::barcelona_request();
        let role = StageRole::TravelConcierge;
        assert!(role.validate(&fixtures::itinerary_output(7), &request).is_ok());
        assert!(role.validate(&fixtures::itinerary_output(3), &request).is_ok());

        let err = role.validate(&fixtures::itinerary_output(9), &request).unwrap_err();
        assert!(err.to_string().contains("9 day entries"));

        let no_days = "## Itinerary\nWander around.\n## Budget\nx\n## Packing\ny";
        assert!(role.validate(no_days, &request).is_err());
    }

    #[test]
    fn test_count_days_formats() {
        let body = "### Day 1\nx\n**Day 2**: y\n- Day 3 - z\nDay 3 again\nToday is nice";
        assert_eq!(count_days(body), 3);
    }
}

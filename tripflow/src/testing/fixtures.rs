//! Request and output fixtures for the Barcelona scenario.

use crate::core::{PipelineRun, RunStatus, StageResult, Travelers, TravelStyle, TripRequest, BudgetTier};
use crate::stages::StageRole;
use crate::utils::RunId;
use chrono::NaiveDate;
use std::fmt::Write as _;

/// New York to Barcelona, 15 to 22 June 2024, mid-range, cultural, two adults.
#[must_use]
pub fn barcelona_request() -> TripRequest {
    let day = |d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap_or_default();
    TripRequest::new("New York", "Barcelona", day(15), day(22))
        .with_budget(BudgetTier::MidRange)
        .with_style(TravelStyle::Cultural)
        .with_travelers(Travelers::adults(2))
}

/// A destination analysis with weather, cost, attractions and safety sections.
#[must_use]
pub fn analysis_output() -> String {
    "## Weather\n\
     Mid June is hot and dry, 24-29°C with long sunny days.\n\n\
     ## Cost Estimate\n\
     Return flights from New York run $600-$900 per person. Mid-range hotels \
     in Eixample cost around $140 a night.\n\n\
     ## Attractions\n\
     - Sagrada Familia\n- Park Güell\n- Gothic Quarter\n\n\
     ## Safety\n\
     Generally safe. Watch for pickpockets on La Rambla and the metro."
        .to_string()
}

/// Local insights with an insider tips section.
#[must_use]
pub fn local_output() -> String {
    "## Insider Tips\n\
     Book Sagrada Familia tickets online and go at opening time.\n\n\
     ## Cultural Etiquette\n\
     Dinner starts after 9pm. A small tip is appreciated but not expected.\n\n\
     ## Authentic Dining\n\
     - Bar Cañete for tapas\n- La Boqueria market stalls for breakfast"
        .to_string()
}

/// An itinerary with `days` day entries, a budget block summing to $3,120
/// and a packing list.
#[must_use]
pub fn itinerary_output(days: u32) -> String {
    let mut out = String::from("## Itinerary\n");
    for day in 1..=days {
        let _ = write!(
            out,
            "### Day {day}\n- Morning: walk\n- Afternoon: museum\n- Evening: tapas\n\n"
        );
    }
    out.push_str(
        "## Budget\n\
         ```budget\n\
         Flights: $1,200\n\
         Accommodation: $980\n\
         Food: $560\n\
         Activities: $380\n\
         ```\n\n\
         ## Packing\n\
         - Sunscreen\n- Light linen clothes\n- Comfortable walking shoes",
    );
    out
}

/// The canned output for a role, sized to the Barcelona request.
#[must_use]
pub fn output_for(role: StageRole) -> String {
    match role {
        StageRole::DestinationAnalyst => analysis_output(),
        StageRole::LocalExpert => local_output(),
        StageRole::TravelConcierge => itinerary_output(7),
    }
}

/// A Barcelona run in which all three stages succeeded.
#[must_use]
pub fn completed_run() -> PipelineRun {
    let mut run = PipelineRun::new(RunId::new(), barcelona_request());
    for role in StageRole::ALL {
        run.push_result(StageResult::succeeded(role.stage_name(), output_for(role)));
    }
    run.status = RunStatus::Completed;
    run
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_outputs_pass_role_checks() {
        let request = barcelona_request();
        assert_eq!(request.duration_days(), 7);
        for role in StageRole::ALL {
            assert!(role.validate(&output_for(role), &request).is_ok(), "{role}");
        }
    }
}

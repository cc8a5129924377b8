//! Report assembly in canonical section order.

use super::budget::parse_budget;
use super::ReportStore;
use crate::core::sections::Section;
use crate::core::{PipelineRun, StageResult, TripRequest};
use crate::errors::StorageError;
use crate::stages::StageRole;
use crate::utils::timestamps::human_timestamp;
use crate::utils::{now_utc, slugify, sortable_stamp, RunId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

/// Canonical report section titles, in document order.
pub const SECTION_ORDER: [&str; 7] = [
    "Overview",
    "Destination Analysis",
    "Local Insights",
    "Itinerary",
    "Budget",
    "Packing",
    "Safety",
];

const DISCLAIMER: &str = "*All recommendations are AI-generated. Please verify details before booking.*";

/// Report metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Run that produced the report.
    pub run_id: RunId,
    /// When the report was assembled.
    pub generated_at: Timestamp,
    /// One-line request summary.
    pub request_summary: String,
    /// Reasoning model used.
    pub model: String,
}

/// The final trip plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Proposed store key, derived from the generation time and places.
    pub key: String,
    /// Metadata.
    pub metadata: ReportMetadata,
    /// Sections in canonical order. Sections without content are absent.
    pub sections: Vec<Section>,
    /// Full markdown document.
    pub markdown: String,
}

impl Report {
    /// Returns a section by canonical title.
    #[must_use]
    pub fn section(&self, title: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.title == title)
    }

    /// Section titles in document order.
    #[must_use]
    pub fn titles(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.title.as_str()).collect()
    }
}

/// Builds the store key: `travel_plan_<stamp>_<origin>-to-<destination>`.
#[must_use]
pub fn report_key(generated_at: &Timestamp, request: &TripRequest) -> String {
    format!(
        "travel_plan_{}_{}-to-{}",
        sortable_stamp(generated_at),
        slugify(&request.origin),
        slugify(&request.destination)
    )
}

/// Merges stage results into a report and publishes it.
#[derive(Clone)]
pub struct ReportAssembler {
    store: Arc<dyn ReportStore>,
    model: String,
}

impl ReportAssembler {
    /// Creates an assembler writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ReportStore>, model: impl Into<String>) -> Self {
        Self {
            store,
            model: model.into(),
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    /// Assembles a report stamped with the current time.
    #[must_use]
    pub fn assemble(&self, run: &PipelineRun) -> Report {
        assemble_at(run, &self.model, now_utc())
    }

    /// Assembles and stores the report of a run whose stages all succeeded.
    ///
    /// Returns the report and the key it was stored under.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store fails.
    pub async fn publish(&self, run: &PipelineRun) -> Result<(Report, String), StorageError> {
        let report = self.assemble(run);
        let key = self.store.store(&report).await?;
        info!(run_id = %run.id, key = %key, sections = report.sections.len(), "Report stored");
        Ok((report, key))
    }
}

impl std::fmt::Debug for ReportAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportAssembler").field("model", &self.model).finish_non_exhaustive()
    }
}

fn succeeded<'a>(run: &'a PipelineRun, role: StageRole) -> Option<&'a StageResult> {
    run.result(role.stage_name()).filter(|r| r.is_success())
}

fn overview(request: &TripRequest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "- **Origin:** {}", request.origin.trim());
    let _ = writeln!(out, "- **Destination:** {}", request.destination.trim());
    let _ = writeln!(out, "- **Travel Dates:** {} to {}", request.start_date, request.end_date);
    let _ = writeln!(out, "- **Duration:** {} days", request.duration_days());
    let _ = writeln!(out, "- **Travellers:** {}", request.travelers);
    let _ = writeln!(out, "- **Budget Range:** {}", request.budget);
    let _ = writeln!(out, "- **Travel Style:** {}", request.style);
    let _ = write!(out, "- **Interests:** {}", request.interests().join(", "));
    out
}

/// Renders sections one level deeper, untitled preambles first.
fn nest(sections: &[&Section]) -> String {
    sections
        .iter()
        .map(|s| s.render(3))
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn section_body(result: Option<&StageResult>, keywords: &[&str]) -> Option<String> {
    result
        .and_then(|r| r.section(keywords))
        .filter(|s| !s.is_empty())
        .map(|s| s.body.clone())
}

/// Assembles a report at a fixed time.
///
/// Results are looked up by stage name, so the order of `run.results` does not
/// affect the document.
#[must_use]
pub fn assemble_at(run: &PipelineRun, model: &str, generated_at: Timestamp) -> Report {
    let request = &run.request;
    let analysis = succeeded(run, StageRole::DestinationAnalyst);
    let local = succeeded(run, StageRole::LocalExpert);
    let concierge = succeeded(run, StageRole::TravelConcierge);

    let destination_analysis = analysis.map(|r| {
        let kept: Vec<&Section> = r.sections.iter().filter(|s| !s.matches(&["safety"])).collect();
        nest(&kept)
    });
    let local_insights = local.map(|r| nest(&r.sections.iter().collect::<Vec<_>>()));
    let itinerary = section_body(concierge, &["itinerary"]);
    let budget = section_body(concierge, &["budget"]).map(|body| match parse_budget(&body) {
        Some(breakdown) => format!("{body}\n\n{}", breakdown.total_line()),
        None => body,
    });
    let packing = section_body(concierge, &["packing"]);
    let safety = section_body(analysis, &["safety"]);

    let bodies = [
        Some(overview(request)),
        destination_analysis,
        local_insights,
        itinerary,
        budget,
        packing,
        safety,
    ];

    let sections: Vec<Section> = SECTION_ORDER
        .iter()
        .zip(bodies)
        .filter_map(|(title, body)| {
            body.filter(|b| !b.trim().is_empty())
                .map(|b| Section::new(*title, b))
        })
        .collect();

    let mut markdown = format!(
        "# Travel Plan: {} to {}\n\n**Generated:** {}\n**AI Model:** {}\n",
        request.origin.trim(),
        request.destination.trim(),
        human_timestamp(&generated_at),
        model
    );
    for section in &sections {
        let _ = write!(markdown, "\n{}\n", section.render(2));
    }
    let _ = write!(markdown, "\n---\n\n{DISCLAIMER}\n");

    Report {
        key: report_key(&generated_at, request),
        metadata: ReportMetadata {
            run_id: run.id,
            generated_at,
            request_summary: request.summary(),
            model: model.to_string(),
        },
        sections,
        markdown,
    }
}

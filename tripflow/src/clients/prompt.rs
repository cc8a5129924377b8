//! Structured prompts with size-aware truncation.

use std::fmt::Write as _;

const ELISION: &str = "\n\n[... context truncated ...]\n\n";

/// A prompt built from labelled segments.
///
/// When the rendered prompt is too large, [`fit`](Self::fit) sheds content
/// from the middle: the oldest prior outputs go first, then the search
/// grounding, and finally the middle of the text is cut. The request header,
/// the most recent prior output and the task are kept whenever they fit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    header: String,
    prior: Vec<(String, String)>,
    grounding: Option<String>,
    task: String,
}

impl Prompt {
    /// Creates a prompt with a request header.
    #[must_use]
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Self::default()
        }
    }

    /// Appends the output of a prior stage, oldest first.
    #[must_use]
    pub fn with_prior(mut self, stage: impl Into<String>, output: impl Into<String>) -> Self {
        self.prior.push((stage.into(), output.into()));
        self
    }

    /// Sets the search grounding block.
    #[must_use]
    pub fn with_grounding(mut self, grounding: impl Into<String>) -> Self {
        let grounding = grounding.into();
        self.grounding = (!grounding.trim().is_empty()).then_some(grounding);
        self
    }

    /// Sets the task instructions.
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    /// Number of prior outputs embedded.
    #[must_use]
    pub fn prior_count(&self) -> usize {
        self.prior.len()
    }

    /// Renders the full prompt.
    #[must_use]
    pub fn render(&self) -> String {
        self.render_with(0, true)
    }

    fn render_with(&self, skip_prior: usize, include_grounding: bool) -> String {
        let mut out = String::with_capacity(self.header.len() + self.task.len() + 256);
        out.push_str(self.header.trim_end());

        if skip_prior > 0 {
            let omitted: Vec<&str> = self.prior[..skip_prior].iter().map(|(s, _)| s.as_str()).collect();
            let _ = write!(out, "\n\n[Earlier output omitted: {}]", omitted.join(", "));
        }
        for (stage, output) in &self.prior[skip_prior..] {
            let _ = write!(out, "\n\n### Output of {stage}\n\n{}", output.trim());
        }
        if include_grounding {
            if let Some(grounding) = &self.grounding {
                let _ = write!(out, "\n\n### Search results\n\n{}", grounding.trim());
            }
        }
        if !self.task.is_empty() {
            let _ = write!(out, "\n\n{}", self.task.trim());
        }
        out
    }

    /// Renders the prompt within `max_chars` characters.
    #[must_use]
    pub fn fit(&self, max_chars: usize) -> String {
        let full = self.render();
        if full.chars().count() <= max_chars {
            return full;
        }

        let droppable = self.prior.len().saturating_sub(1);
        for skip in 1..=droppable {
            let candidate = self.render_with(skip, true);
            if candidate.chars().count() <= max_chars {
                return candidate;
            }
        }

        let candidate = self.render_with(droppable, false);
        if candidate.chars().count() <= max_chars {
            return candidate;
        }

        truncate_middle(&candidate, max_chars)
    }
}

/// Cuts the middle out of `text` so it fits in `max_chars` characters.
#[must_use]
pub fn truncate_middle(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let marker = ELISION.chars().count();
    if max_chars <= marker {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars - marker;
    let head = keep / 2;
    let tail = keep - head;

    let mut out: String = text.chars().take(head).collect();
    out.push_str(ELISION);
    out.extend(text.chars().skip(total - tail));
    out
}

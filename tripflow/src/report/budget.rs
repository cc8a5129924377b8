//! Parsing of the itinerary's budget block.
//!
//! The block is a fenced code block tagged `budget` with one
//! `Category: amount` line per cost category:
//!
//! ~~~text
//! ```budget
//! Flights: $1,200.50
//! Accommodation: EUR 980
//! Total: $2,180.50
//! ```
//! ~~~
//!
//! Lines whose category is `total` are ignored. If any other line cannot be
//! read, the lines name different currencies, or the sum does not fit, the
//! whole block is rejected, so no total is ever made up.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One cost category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetItem {
    /// Category name as written.
    pub category: String,
    /// Amount in hundredths of the currency unit.
    pub cents: u64,
}

/// A parsed budget block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetBreakdown {
    /// Categories in the order written.
    pub items: Vec<BudgetItem>,
    /// Currency marker shared by every item that has one, such as `$` or `EUR`.
    pub currency: Option<String>,
    total: u64,
}

impl BudgetBreakdown {
    /// Sum of all categories in hundredths.
    #[must_use]
    pub fn total_cents(&self) -> u64 {
        self.total
    }

    /// The injected total line, e.g. `**Total: $3,120.50**`.
    #[must_use]
    pub fn total_line(&self) -> String {
        format!("**Total: {}**", format_amount(self.total_cents(), self.currency.as_deref()))
    }
}

fn amount_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:([A-Z]{3})\s*)?([$€£¥])?\s*(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{1,2}))?\s*([A-Z]{3})?$").ok()
    })
    .as_ref()
}

/// Parses an amount such as `$1,200.50`, `EUR 980` or `450 USD` into
/// hundredths, returning the currency marker if present.
#[must_use]
pub fn parse_amount(text: &str) -> Option<(u64, Option<String>)> {
    let caps = amount_re()?.captures(text.trim())?;
    let whole: u64 = caps[3].replace(',', "").parse().ok()?;
    let cents = match caps.get(4).map(|m| m.as_str()) {
        Some(frac) if frac.len() == 1 => frac.parse::<u64>().ok()? * 10,
        Some(frac) => frac.parse::<u64>().ok()?,
        None => 0,
    };
    let currency = caps
        .get(2)
        .or_else(|| caps.get(1))
        .or_else(|| caps.get(5))
        .map(|m| m.as_str().to_string());
    Some((whole.checked_mul(100)?.checked_add(cents)?, currency))
}

/// Formats hundredths with thousands separators, dropping zero cents.
#[must_use]
pub fn format_amount(cents: u64, currency: Option<&str>) -> String {
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if cents % 100 != 0 {
        grouped = format!("{grouped}.{:02}", cents % 100);
    }
    match currency {
        Some(symbol) if symbol.chars().count() == 1 => format!("{symbol}{grouped}"),
        Some(code) => format!("{code} {grouped}"),
        None => grouped,
    }
}

/// Extracts the body of the first fenced block tagged `budget`.
fn budget_block(text: &str) -> Option<Vec<&str>> {
    let mut lines = text.lines();
    lines.find(|l| l.trim().eq_ignore_ascii_case("```budget"))?;
    let mut body = Vec::new();
    for line in lines {
        if line.trim().starts_with("```") {
            return Some(body);
        }
        body.push(line);
    }
    None
}

/// Parses the budget block in `text`.
///
/// Returns `None` if there is no block, it has no categories, any line is
/// unreadable, two lines carry different currency markers, or the total
/// overflows.
#[must_use]
pub fn parse_budget(text: &str) -> Option<BudgetBreakdown> {
    let mut items = Vec::new();
    let mut currency: Option<String> = None;
    let mut total: u64 = 0;

    for line in budget_block(text)? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (category, amount) = line.split_once(':')?;
        let category = category.trim().trim_start_matches(['-', '*']).trim();
        if category.is_empty() {
            return None;
        }
        if category.eq_ignore_ascii_case("total") {
            continue;
        }
        let (cents, marker) = parse_amount(amount)?;
        match (&currency, marker) {
            (Some(seen), Some(marker)) if *seen != marker => return None,
            (None, Some(marker)) => currency = Some(marker),
            _ => {}
        }
        total = total.checked_add(cents)?;
        items.push(BudgetItem {
            category: category.to_string(),
            cents,
        });
    }

    (!items.is_empty()).then_some(BudgetBreakdown { items, currency, total })
}

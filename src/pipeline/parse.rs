//! Strict parser for the model's event list.
//!
//! The system prompt asks for a bare JSON array of objects with the keys
//! `year`, `month`, `day_of_month`, `event`, `description` and `page`.
//! Anything that breaks that shape is rejected with
//! [`TimelineError::MalformedResponse`]; nothing is silently dropped except
//! events the model could not date, which are counted and skipped.
//!
//! ## Rules (applied in order)
//!
//! 1. Strip an outer ```` ``` ```` / ```` ```json ```` fence
//! 2. Parse JSON; the top level must be an array
//! 3. Every element must be an object with `year`, `month`, `day_of_month`
//!    and `event`
//! 4. `event` must be a non-empty string; `description` a string if present
//! 5. Multi-page batches need a `page` naming one of the batch's pages;
//!    single-page batches always use that page
//! 6. Blank, non-numeric or out-of-range years (outside 1–9999) mark the
//!    event undated (skipped)
//! 7. Month: 1–12, or an English month name / abbreviation; else unknown
//! 8. Day: 1–31, kept only when the month is known; else unknown

use crate::config::YEAR_RANGE;
use crate::error::{format_pages, TimelineError};
use crate::output::{Event, EventDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

/// Keys every element must carry, even when blank.
const REQUIRED_KEYS: [&str; 4] = ["year", "month", "day_of_month", "event"];

/// Events parsed from one reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBatch {
    pub events: Vec<Event>,
    /// Elements skipped because they carried no usable year.
    pub undated: usize,
}

/// Parse one completion for the batch carrying `batch_pages`.
pub fn parse_response(content: &str, batch_pages: &[usize]) -> Result<ParsedBatch, TimelineError> {
    let malformed = |detail: String| TimelineError::MalformedResponse {
        pages: format_pages(batch_pages),
        detail,
    };

    let body = strip_code_fences(content);
    let value: Value = serde_json::from_str(&body)
        .map_err(|e| malformed(format!("reply is not valid JSON ({e}): {}", preview(&body))))?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(malformed(format!(
                "expected a JSON array of events, got {}",
                json_type(&other)
            )))
        }
    };

    let mut parsed = ParsedBatch::default();

    for (i, item) in items.iter().enumerate() {
        let obj = item.as_object().ok_or_else(|| {
            malformed(format!(
                "element {i} is {}, expected an object",
                json_type(item)
            ))
        })?;

        if let Some(missing) = REQUIRED_KEYS.iter().find(|k| !obj.contains_key(**k)) {
            return Err(malformed(format!("element {i} is missing key \"{missing}\"")));
        }

        let label = match obj.get("event") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(malformed(format!("element {i} has an empty or non-text \"event\""))),
        };

        let description = match obj.get("description") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => {
                return Err(malformed(format!(
                    "element {i} has a {} \"description\", expected text",
                    json_type(other)
                )))
            }
        };

        let source_page = resolve_page(obj, batch_pages).map_err(|detail| {
            malformed(format!("element {i} ({label}): {detail}"))
        })?;

        let Some(year) = obj.get("year").and_then(parse_year) else {
            warn!(
                "Page {}: skipping undated event \"{}\"",
                source_page, label
            );
            parsed.undated += 1;
            continue;
        };

        let month = obj.get("month").and_then(parse_month);
        let day = month.and(obj.get("day_of_month").and_then(parse_day));

        parsed.events.push(Event {
            date: EventDate { year, month, day },
            label,
            description,
            source_page,
        });
    }

    Ok(parsed)
}

/// Work out which page an element belongs to.
fn resolve_page(obj: &Map<String, Value>, batch_pages: &[usize]) -> Result<usize, String> {
    if let [only] = batch_pages {
        return Ok(*only);
    }

    let raw = obj
        .get("page")
        .ok_or_else(|| "missing key \"page\" in a multi-page request".to_string())?;
    let page = parse_integer(raw)
        .filter(|p| *p > 0)
        .map(|p| p as usize)
        .ok_or_else(|| format!("\"page\" is not a page number: {raw}"))?;

    if batch_pages.contains(&page) {
        Ok(page)
    } else {
        Err(format!(
            "\"page\" {page} is not one of the pages sent ({})",
            format_pages(batch_pages)
        ))
    }
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Rules 6–8: Field normalisation ───────────────────────────────────────────

/// Integer from a JSON number or a numeric string. Blank → None.
fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            let digits = s.strip_prefix('-').unwrap_or(s);
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            s.parse().ok()
        }
        _ => None,
    }
}

fn parse_year(value: &Value) -> Option<i32> {
    parse_integer(value)
        .and_then(|y| i32::try_from(y).ok())
        .filter(|y| YEAR_RANGE.contains(y))
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

fn parse_month(value: &Value) -> Option<u32> {
    if let Some(n) = parse_integer(value) {
        return (1..=12).contains(&n).then_some(n as u32);
    }

    let name = value.as_str()?.trim().trim_end_matches('.').to_lowercase();
    if name.len() < 3 {
        return None;
    }
    if name == "sept" {
        return Some(9);
    }
    MONTHS
        .iter()
        .position(|m| *m == name || (name.len() == 3 && m.starts_with(name.as_str())))
        .map(|i| i as u32 + 1)
}

fn parse_day(value: &Value) -> Option<u32> {
    parse_integer(value)
        .filter(|d| (1..=31).contains(d))
        .map(|d| d as u32)
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First 80 characters of a reply, for error messages.
fn preview(body: &str) -> String {
    let mut out: String = body.chars().take(80).collect();
    if body.chars().count() > 80 {
        out.push('\u{2026}');
    }
    format!("{out:?}")
}

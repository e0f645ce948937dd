//! Data model shared by the pipeline stages and returned to callers.
//!
//! ```text
//! PageText ──▶ Event ──▶ EventSet ──▶ TimelineDocument ──▶ HTML
//! (extract)    (LLM)     (unfiltered)  (filtered, ordered)
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Text of one page (or one chunk of a plain-text document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number in the source document.
    pub page_number: usize,
    pub text: String,
}

/// Calendar position of an event.
///
/// Field order matters: the derived `Ord` compares year, then month, then
/// day, and `None` sorts before `Some`, so a year-level event comes before
/// the dated events of the same year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventDate {
    /// Calendar year in `1..=9999`.
    pub year: i32,
    /// 1–12 when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    /// 1–31 when known. Only meaningful together with `month`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

impl EventDate {
    pub fn year(year: i32) -> Self {
        Self {
            year,
            month: None,
            day: None,
        }
    }

    /// Timestamp in the `%Y/%-m/%-d` form the timeline library parses.
    /// Unknown month and day fall back to 1; a day without a month is ignored.
    pub fn timestamp(&self) -> String {
        match self.month {
            Some(m) => format!("{}/{}/{}", self.year, m, self.day.unwrap_or(1)),
            None => format!("{}/1/1", self.year),
        }
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.month, self.day) {
            (Some(m), Some(d)) => write!(f, "{}-{:02}-{:02}", self.year, m, d),
            (Some(m), None) => write!(f, "{}-{:02}", self.year, m),
            _ => write!(f, "{}", self.year),
        }
    }
}

/// A single dated occurrence extracted from the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub date: EventDate,
    /// Short headline shown on the timeline.
    pub label: String,
    /// Longer context shown in the tooltip. May be empty.
    #[serde(default)]
    pub description: String,
    /// 1-indexed page the event was read from.
    pub source_page: usize,
}

impl Event {
    pub fn year(&self) -> i32 {
        self.date.year
    }
}

/// Chronological order with source page as the tie-breaker.
fn chronological(a: &Event, b: &Event) -> Ordering {
    a.date
        .cmp(&b.date)
        .then_with(|| a.source_page.cmp(&b.source_page))
}

/// Every event extracted from one document, before any year filtering.
///
/// This is what `--save-events` writes and `--events` reads back, so a
/// timeline can be re-rendered for another year range without paying for
/// a second round of LLM calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSet {
    /// Path or URL of the source document, used as the link target.
    pub source: String,
    /// Total pages (or text chunks) of the source document.
    pub page_count: usize,
    /// Whether `source` is a PDF and can be linked with `#page=N`.
    #[serde(default = "default_true")]
    pub linkable: bool,
    pub events: Vec<Event>,
}

fn default_true() -> bool {
    true
}

/// Events selected for one rendered timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineDocument {
    pub title: String,
    pub start_year: i32,
    pub end_year: i32,
    /// In-range events in chronological order.
    pub events: Vec<Event>,
}

impl TimelineDocument {
    /// Keep events whose year lies in `[start_year, end_year]` (inclusive)
    /// and order them chronologically. The sort is stable, so events with
    /// the same date and page keep their extraction order.
    pub fn new(title: impl Into<String>, start_year: i32, end_year: i32, events: &[Event]) -> Self {
        let mut selected: Vec<Event> = events
            .iter()
            .filter(|e| e.year() >= start_year && e.year() <= end_year)
            .cloned()
            .collect();
        selected.sort_by(chronological);

        Self {
            title: title.into(),
            start_year,
            end_year,
            events: selected,
        }
    }
}

/// Document-level PDF metadata, available without any LLM call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    pub is_encrypted: bool,
}

/// Counters collected while extracting events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages (or chunks) in the source document.
    pub total_pages: usize,
    /// Selected pages that carried text and were sent to the model.
    pub processed_pages: usize,
    /// Completion requests issued.
    pub requests: usize,
    /// Events kept after parsing.
    pub events_extracted: usize,
    /// Events dropped because the model could not give them a year.
    pub undated_skipped: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub extract_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of a full [`crate::build_timeline`] run.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineOutput {
    /// All extracted events, unfiltered.
    pub events: EventSet,
    /// The filtered, ordered events that were rendered.
    pub document: TimelineDocument,
    /// The HTML written to the output file.
    #[serde(skip)]
    pub html: String,
    pub stats: ExtractionStats,
}

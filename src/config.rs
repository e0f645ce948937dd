//! Configuration types for timeline extraction and rendering.
//!
//! Two structs split the inputs:
//!
//! * [`TimelineRequest`] — *what* to build: source document, output file,
//!   title, year range, and the two prompt knobs (`useful_info`,
//!   `suppress_bracketed_dates`).
//! * [`TimelineConfig`] — *how* to build it: the injected completion client,
//!   sampling settings, page selection, rendering options. Built via
//!   [`TimelineConfigBuilder`].

use crate::client::CompletionClient;
use crate::error::TimelineError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;

/// One timeline to build.
///
/// # Example
/// ```rust
/// use edgequake_pdf2timeline::TimelineRequest;
///
/// let request = TimelineRequest::new("history.pdf", "history.html", "Industrial age", 1750, 1900)
///     .useful_info("The document is a survey of British railways.")
///     .suppress_bracketed_dates(true);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineRequest {
    /// Local path or HTTP/HTTPS URL of the source document.
    pub pdf_file: String,
    /// Where the HTML timeline is written.
    pub output_file: PathBuf,
    pub timeline_title: String,
    /// First year shown (inclusive).
    pub start_year: i32,
    /// Last year shown (inclusive).
    pub end_year: i32,
    /// Free text passed to the model to bias extraction.
    pub useful_info: Option<String>,
    /// Ignore "Name (1879-1955)" style life-span dates instead of turning
    /// them into birth and death events.
    pub suppress_bracketed_dates: bool,
}

impl TimelineRequest {
    pub fn new(
        pdf_file: impl Into<String>,
        output_file: impl Into<PathBuf>,
        timeline_title: impl Into<String>,
        start_year: i32,
        end_year: i32,
    ) -> Self {
        Self {
            pdf_file: pdf_file.into(),
            output_file: output_file.into(),
            timeline_title: timeline_title.into(),
            start_year,
            end_year,
            useful_info: None,
            suppress_bracketed_dates: false,
        }
    }

    pub fn useful_info(mut self, info: impl Into<String>) -> Self {
        let info = info.into();
        self.useful_info = if info.trim().is_empty() {
            None
        } else {
            Some(info)
        };
        self
    }

    pub fn suppress_bracketed_dates(mut self, v: bool) -> Self {
        self.suppress_bracketed_dates = v;
        self
    }

    /// Reject requests that cannot produce a timeline.
    pub fn validate(&self) -> Result<(), TimelineError> {
        validate_year_range(self.start_year, self.end_year)?;
        if self.pdf_file.trim().is_empty() {
            return Err(TimelineError::InvalidConfig("input path is empty".into()));
        }
        if self.output_file.as_os_str().is_empty() {
            return Err(TimelineError::InvalidConfig("output path is empty".into()));
        }
        Ok(())
    }
}

/// Years the rendered page can place: `d3-time-format` parses `%Y` as at
/// most four unsigned digits.
pub const YEAR_RANGE: RangeInclusive<i32> = 1..=9999;

pub(crate) fn validate_year_range(start_year: i32, end_year: i32) -> Result<(), TimelineError> {
    for year in [start_year, end_year] {
        if !YEAR_RANGE.contains(&year) {
            return Err(TimelineError::InvalidConfig(format!(
                "year {year} is outside the supported range {}–{}",
                YEAR_RANGE.start(),
                YEAR_RANGE.end()
            )));
        }
    }
    if start_year > end_year {
        return Err(TimelineError::InvalidConfig(format!(
            "start year {start_year} is after end year {end_year}"
        )));
    }
    Ok(())
}

/// Settings shared by every timeline built with the same client.
///
/// # Example
/// ```rust
/// use edgequake_pdf2timeline::{PageSelection, TimelineConfig};
///
/// let config = TimelineConfig::builder()
///     .pages(PageSelection::Range(1, 20))
///     .pages_per_request(2)
///     .width(2400)
///     .build()
///     .unwrap();
/// assert_eq!(config.pages_per_request, 2);
/// ```
#[derive(Clone)]
pub struct TimelineConfig {
    /// Completion client used for event extraction. Required by every
    /// operation that talks to the model.
    pub client: Option<Arc<dyn CompletionClient>>,

    /// Sampling temperature. Default: 0.0 (deterministic extraction).
    pub temperature: f32,

    /// Maximum tokens per completion. Default: 4096.
    pub max_tokens: usize,

    /// Pages sent in one request. Default: 1.
    ///
    /// With one page per request the source page of each event is known
    /// exactly. Larger batches save requests but rely on the model to
    /// attribute each event to the right `[Page N]` block.
    pub pages_per_request: usize,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Replaces the built-in system prompt.
    pub system_prompt: Option<String>,

    /// Characters per chunk when the input is plain text. Default: 1000.
    pub text_chunk_size: usize,

    /// Characters shared by consecutive text chunks. Default: 200.
    pub text_chunk_overlap: usize,

    /// Timeline width in pixels. Default: 3000.
    pub width: u32,

    /// Add "Start of timeline" / "End of timeline" markers. Default: true.
    pub boundary_markers: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-batch progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            client: None,
            temperature: 0.0,
            max_tokens: 4096,
            pages_per_request: 1,
            pages: PageSelection::default(),
            password: None,
            system_prompt: None,
            text_chunk_size: 1000,
            text_chunk_overlap: 200,
            width: 3000,
            boundary_markers: true,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TimelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineConfig")
            .field("client", &self.client.as_ref().map(|c| c.name().to_string()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("pages_per_request", &self.pages_per_request)
            .field("pages", &self.pages)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("system_prompt", &self.system_prompt.is_some())
            .field("text_chunk_size", &self.text_chunk_size)
            .field("text_chunk_overlap", &self.text_chunk_overlap)
            .field("width", &self.width)
            .field("boundary_markers", &self.boundary_markers)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl TimelineConfig {
    /// Create a new builder for `TimelineConfig`.
    pub fn builder() -> TimelineConfigBuilder {
        TimelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`TimelineConfig`].
pub struct TimelineConfigBuilder {
    config: TimelineConfig,
}

impl TimelineConfigBuilder {
    pub fn client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn pages_per_request(mut self, n: usize) -> Self {
        self.config.pages_per_request = n.max(1);
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn text_chunk_size(mut self, n: usize) -> Self {
        self.config.text_chunk_size = n;
        self
    }

    pub fn text_chunk_overlap(mut self, n: usize) -> Self {
        self.config.text_chunk_overlap = n;
        self
    }

    pub fn width(mut self, px: u32) -> Self {
        self.config.width = px;
        self
    }

    pub fn boundary_markers(mut self, v: bool) -> Self {
        self.config.boundary_markers = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TimelineConfig, TimelineError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(TimelineError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.text_chunk_size == 0 {
            return Err(TimelineError::InvalidConfig(
                "text chunk size must be ≥ 1".into(),
            ));
        }
        if c.text_chunk_overlap >= c.text_chunk_size {
            return Err(TimelineError::InvalidConfig(format!(
                "text chunk overlap ({}) must be smaller than the chunk size ({})",
                c.text_chunk_overlap, c.text_chunk_size
            )));
        }
        if c.width < 200 {
            return Err(TimelineError::InvalidConfig(format!(
                "timeline width must be ≥ 200 px, got {}",
                c.width
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the document are sent to the model.
///
/// Selection never renumbers pages: page 7 stays page 7 in links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 1-indexed
    /// page numbers that exist in a document of `total_pages` pages.
    pub fn to_page_numbers(&self, total_pages: usize) -> Vec<usize> {
        let mut pages: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![*p]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1);
                let e = (*end).min(total_pages);
                (s..=e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .copied()
                .filter(|&p| p >= 1 && p <= total_pages)
                .collect(),
        };
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    /// First page the selection asks for, for error reporting.
    pub(crate) fn first_requested(&self) -> usize {
        match self {
            PageSelection::All => 1,
            PageSelection::Single(p) => *p,
            PageSelection::Range(s, _) => *s,
            PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
        }
    }
}

//! Timeline entry points.
//!
//! [`build_timeline`] runs the whole pipeline: resolve the input, extract
//! page text, ask the model for dated events, render and write the HTML.
//! The two halves are also exposed on their own. [`extract_events`] stops
//! after the model calls and returns a serialisable [`EventSet`].
//! [`render_events`] turns such a set into a page without any network
//! access, so one extraction can be rendered for several year ranges.

use crate::config::{validate_year_range, TimelineConfig, TimelineRequest};
use crate::error::TimelineError;
use crate::output::{DocumentMetadata, EventSet, ExtractionStats, TimelineDocument, TimelineOutput};
use crate::pipeline::events::{self, PromptContext};
use crate::pipeline::extract;
use crate::pipeline::input::{self, DocumentKind};
use crate::pipeline::render::{self, RenderOptions};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Build a timeline from `request` and write it to `request.output_file`.
///
/// Fails without writing anything if the request is invalid, the input
/// cannot be read, no client is configured, or any model request fails.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2timeline::{build_timeline, ProviderClient, TimelineConfig, TimelineRequest};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ProviderClient::named("openai", "gpt-4.1-nano")?;
/// let config = TimelineConfig::builder().client(Arc::new(client)).build()?;
/// let request = TimelineRequest::new("history.pdf", "history.html", "Europe", 1800, 1900)
///     .useful_info("A survey of 19th century European politics");
/// let output = build_timeline(&request, &config).await?;
/// println!("{} events rendered", output.document.events.len());
/// # Ok(())
/// # }
/// ```
pub async fn build_timeline(
    request: &TimelineRequest,
    config: &TimelineConfig,
) -> Result<TimelineOutput, TimelineError> {
    let total_start = Instant::now();
    request.validate()?;
    info!(
        "Building timeline '{}' ({}–{}) from {}",
        request.timeline_title, request.start_year, request.end_year, request.pdf_file
    );

    let context = PromptContext {
        title: &request.timeline_title,
        useful_info: request.useful_info.as_deref(),
        suppress_bracketed_dates: request.suppress_bracketed_dates,
    };
    let (events, mut stats) = extract_events(&request.pdf_file, context, config).await?;

    let (document, html) = render_events(
        &events,
        &request.timeline_title,
        request.start_year,
        request.end_year,
        &request.output_file,
        config,
    )
    .await?;

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Timeline complete: {} of {} events in range, {}ms total",
        document.events.len(),
        events.events.len(),
        stats.total_duration_ms
    );

    Ok(TimelineOutput {
        events,
        document,
        html,
        stats,
    })
}

/// Synchronous wrapper around [`build_timeline`].
///
/// Creates a temporary tokio runtime internally.
pub fn build_timeline_sync(
    request: &TimelineRequest,
    config: &TimelineConfig,
) -> Result<TimelineOutput, TimelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TimelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(build_timeline(request, config))
}

/// Extract dated events from a document without rendering anything.
pub async fn extract_events(
    input_str: &str,
    context: PromptContext<'_>,
    config: &TimelineConfig,
) -> Result<(EventSet, ExtractionStats), TimelineError> {
    let total_start = Instant::now();

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let kind = resolved.kind();

    // ── Step 2: Require a client ─────────────────────────────────────────
    let client = config
        .client
        .as_ref()
        .ok_or_else(|| TimelineError::ClientNotConfigured {
            hint: "Inject one with TimelineConfig::builder().client(..), \
                   e.g. ProviderClient::named(\"openai\", \"gpt-4.1-nano\")."
                .to_string(),
        })?;

    // ── Step 3: Extract page text ────────────────────────────────────────
    let extract_start = Instant::now();
    let pages = extract::extract_pages(resolved.path(), kind, config).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    let total_pages = pages.len();
    info!("Extracted {} pages in {}ms", total_pages, extract_duration_ms);

    if total_pages == 0 {
        return Err(TimelineError::EmptyDocument {
            path: resolved.path().to_path_buf(),
        });
    }

    // ── Step 4: Apply page selection ─────────────────────────────────────
    let selected = config.pages.to_page_numbers(total_pages);
    if selected.is_empty() {
        return Err(TimelineError::PageOutOfRange {
            page: config.pages.first_requested(),
            total: total_pages,
        });
    }
    let pages: Vec<_> = pages
        .into_iter()
        .filter(|p| selected.binary_search(&p.page_number).is_ok())
        .collect();
    debug!("Selected {} of {} pages", pages.len(), total_pages);

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(TimelineError::EmptyDocument {
            path: resolved.path().to_path_buf(),
        });
    }

    // ── Step 5: Ask the model ────────────────────────────────────────────
    let extracted = events::extract_events(client, &pages, context, config).await?;

    let stats = ExtractionStats {
        total_pages,
        processed_pages: extracted.processed_pages,
        requests: extracted.requests,
        events_extracted: extracted.events.len(),
        undated_skipped: extracted.undated_skipped,
        total_input_tokens: extracted.input_tokens,
        total_output_tokens: extracted.output_tokens,
        extract_duration_ms,
        llm_duration_ms: extracted.duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    let set = EventSet {
        source: input_str.to_string(),
        page_count: total_pages,
        linkable: kind == DocumentKind::Pdf,
        events: extracted.events,
    };

    Ok((set, stats))
}

/// Render an [`EventSet`] for `start_year..=end_year` and write it to
/// `output`. Returns the rendered document and the HTML that was written.
pub async fn render_events(
    events: &EventSet,
    title: &str,
    start_year: i32,
    end_year: i32,
    output: &Path,
    config: &TimelineConfig,
) -> Result<(TimelineDocument, String), TimelineError> {
    validate_year_range(start_year, end_year)?;
    check_source_pages(events).map_err(TimelineError::InvalidConfig)?;

    let document = TimelineDocument::new(title, start_year, end_year, &events.events);
    info!(
        "Rendering {} of {} events between {} and {}",
        document.events.len(),
        events.events.len(),
        start_year,
        end_year
    );

    let link = events
        .linkable
        .then(|| render::link_target(&events.source, output));
    let options = RenderOptions {
        link_target: link.as_deref(),
        width: config.width,
        boundary_markers: config.boundary_markers,
    };
    let html = render::render_html(&document, &options)?;
    render::write_output(output, &html).await?;
    info!("Timeline written to {}", output.display());

    Ok((document, html))
}

/// Read an [`EventSet`] previously written by [`save_event_set`].
pub async fn load_event_set(path: &Path) -> Result<EventSet, TimelineError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TimelineError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => TimelineError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => TimelineError::EventsFileInvalid {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
    })?;

    let invalid = |detail: String| TimelineError::EventsFileInvalid {
        path: path.to_path_buf(),
        detail,
    };
    let set: EventSet = serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
    check_source_pages(&set).map_err(invalid)?;

    debug!("Loaded {} events from {}", set.events.len(), path.display());
    Ok(set)
}

/// Write an [`EventSet`] as pretty-printed JSON.
pub async fn save_event_set(path: &Path, set: &EventSet) -> Result<(), TimelineError> {
    let json = serde_json::to_string_pretty(set)
        .map_err(|e| TimelineError::Internal(format!("Failed to serialise events: {e}")))?;
    render::write_output(path, &json).await?;
    info!("Saved {} events to {}", set.events.len(), path.display());
    Ok(())
}

/// Read document metadata without calling the model.
///
/// Plain-text inputs report their chunk count as the page count.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &TimelineConfig,
) -> Result<DocumentMetadata, TimelineError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    match resolved.kind() {
        DocumentKind::Pdf => extract::extract_metadata(resolved.path(), config.password.as_deref()).await,
        DocumentKind::Text => {
            let pages = extract::extract_pages(resolved.path(), DocumentKind::Text, config).await?;
            Ok(DocumentMetadata {
                page_count: pages.len(),
                ..Default::default()
            })
        }
    }
}

/// Every event must cite a page of the document it came from.
fn check_source_pages(set: &EventSet) -> Result<(), String> {
    match set
        .events
        .iter()
        .find(|e| e.source_page == 0 || e.source_page > set.page_count)
    {
        Some(e) => Err(format!(
            "event '{}' cites page {} but the document has {} pages",
            e.label, e.source_page, set.page_count
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Event, EventDate};

    fn set(pages: &[usize], page_count: usize) -> EventSet {
        EventSet {
            source: "book.pdf".into(),
            page_count,
            linkable: true,
            events: pages
                .iter()
                .map(|&p| Event {
                    date: EventDate::year(1850),
                    label: format!("event on {p}"),
                    description: String::new(),
                    source_page: p,
                })
                .collect(),
        }
    }

    #[test]
    fn source_pages_must_exist() {
        assert!(check_source_pages(&set(&[1, 3], 3)).is_ok());
        assert!(check_source_pages(&set(&[0], 3)).is_err());
        assert!(check_source_pages(&set(&[4], 3)).unwrap_err().contains("page 4"));
    }

    #[tokio::test]
    async fn event_set_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let original = set(&[1, 2], 2);
        save_event_set(&path, &original).await.unwrap();
        assert_eq!(load_event_set(&path).await.unwrap(), original);
    }

    #[tokio::test]
    async fn load_rejects_out_of_range_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, serde_json::to_string(&set(&[9], 2)).unwrap()).unwrap();
        let err = load_event_set(&path).await.unwrap_err();
        assert!(matches!(err, TimelineError::EventsFileInvalid { .. }));
    }

    #[tokio::test]
    async fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, "not json").unwrap();
        let err = load_event_set(&path).await.unwrap_err();
        assert!(matches!(err, TimelineError::EventsFileInvalid { .. }));
    }

    #[tokio::test]
    async fn render_rejects_inverted_range_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("t.html");
        let err = render_events(&set(&[1], 1), "T", 1900, 1800, &out, &TimelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TimelineError::InvalidConfig(_)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn text_sources_render_without_links() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("t.html");
        let mut events = set(&[1], 1);
        events.linkable = false;
        let (_, html) = render_events(&events, "T", 1800, 1900, &out, &TimelineConfig::default())
            .await
            .unwrap();
        assert!(!html.contains("#page="));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), html);
    }
}

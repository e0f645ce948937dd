//! Event extraction: send page texts to the model and collect dated events.
//!
//! Pages are grouped into batches of
//! [`crate::config::TimelineConfig::pages_per_request`] and sent one request
//! at a time. Each request gets exactly one attempt; the first client or
//! parse failure aborts the whole extraction, so callers never see a
//! timeline built from half a document.

use crate::client::{CompletionClient, CompletionRequest};
use crate::config::TimelineConfig;
use crate::error::{format_pages, TimelineError};
use crate::output::{Event, PageText};
use crate::pipeline::parse::parse_response;
use crate::prompts::{build_system_prompt, build_user_prompt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Prompt inputs that vary per timeline.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub title: &'a str,
    pub useful_info: Option<&'a str>,
    pub suppress_bracketed_dates: bool,
}

/// Everything the extractor produced, plus counters for the stats.
#[derive(Debug, Clone, Default)]
pub struct ExtractedEvents {
    /// Events in batch order, then reply order.
    pub events: Vec<Event>,
    pub processed_pages: usize,
    pub requests: usize,
    pub undated_skipped: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

/// Split pages with text into request-sized batches. Blank pages are
/// never sent.
pub fn plan_batches(pages: &[PageText], pages_per_request: usize) -> Vec<Vec<PageText>> {
    let with_text: Vec<PageText> = pages
        .iter()
        .filter(|p| !p.text.trim().is_empty())
        .cloned()
        .collect();
    with_text
        .chunks(pages_per_request.max(1))
        .map(|c| c.to_vec())
        .collect()
}

/// Run the model over `pages` and return the parsed events.
pub async fn extract_events(
    client: &Arc<dyn CompletionClient>,
    pages: &[PageText],
    context: PromptContext<'_>,
    config: &TimelineConfig,
) -> Result<ExtractedEvents, TimelineError> {
    let start = Instant::now();
    let batches = plan_batches(pages, config.pages_per_request);
    let total = batches.len();
    let system = build_system_prompt(config.system_prompt.as_deref(), context.suppress_bracketed_dates);

    info!(
        "Extracting events from {} pages in {} requests via '{}'",
        batches.iter().map(Vec::len).sum::<usize>(),
        total,
        client.name()
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(total);
    }

    let mut out = ExtractedEvents::default();

    for (i, batch) in batches.iter().enumerate() {
        let batch_num = i + 1;
        let page_numbers: Vec<usize> = batch.iter().map(|p| p.page_number).collect();

        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_start(batch_num, total, &page_numbers);
        }

        let request = CompletionRequest {
            system: system.clone(),
            prompt: build_user_prompt(context.title, context.useful_info, batch),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let result = match client.complete(&request).await {
            Ok(completion) => {
                out.input_tokens += completion.input_tokens;
                out.output_tokens += completion.output_tokens;
                parse_response(&completion.content, &page_numbers)
            }
            Err(e) => Err(TimelineError::LlmApiError {
                provider: client.name().to_string(),
                pages: format_pages(&page_numbers),
                message: e.to_string(),
            }),
        };
        out.requests += 1;

        let parsed = match result {
            Ok(parsed) => parsed,
            Err(e) => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_batch_error(batch_num, total, &e.to_string());
                }
                return Err(e);
            }
        };

        debug!(
            "Batch {}/{} (pages {}): {} events, {} undated",
            batch_num,
            total,
            format_pages(&page_numbers),
            parsed.events.len(),
            parsed.undated
        );

        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_complete(batch_num, total, parsed.events.len());
        }

        out.processed_pages += batch.len();
        out.undated_skipped += parsed.undated;
        out.events.extend(parsed.events);
    }

    out.duration_ms = start.elapsed().as_millis() as u64;

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(total, out.events.len());
    }

    info!(
        "Extracted {} events ({} undated skipped) in {}ms",
        out.events.len(),
        out.undated_skipped,
        out.duration_ms
    );

    Ok(out)
}

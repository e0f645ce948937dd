//! # edgequake-pdf2timeline
//!
//! Turn a PDF (or plain-text) document into an interactive HTML timeline of
//! the dated events it mentions.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file or download from URL
//!  ├─ 2. Extract  one text entry per page via lopdf (spawn_blocking)
//!  ├─ 3. Events   one completion request per batch of pages, in order
//!  ├─ 4. Parse    strict JSON validation → dated events with source pages
//!  └─ 5. Render   year filter, chronological sort, d3-milestones HTML
//! ```
//!
//! Every event remembers the page it came from; the rendered timeline links
//! each event back to `<document>#page=N`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2timeline::{build_timeline, ProviderClient, TimelineConfig, TimelineRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials are never read by the pipeline itself; build a client
//!     // explicitly and hand it over.
//!     let client = ProviderClient::from_env(None)?;
//!     let config = TimelineConfig::builder().client(Arc::new(client)).build()?;
//!
//!     let request = TimelineRequest::new("history.pdf", "timeline.html", "Victorian Era", 1837, 1901);
//!     let output = build_timeline(&request, &config).await?;
//!     eprintln!(
//!         "{} events, tokens: {} in / {} out",
//!         output.document.events.len(),
//!         output.stats.total_input_tokens,
//!         output.stats.total_output_tokens
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2timeline` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2timeline = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod timeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{ClientError, Completion, CompletionClient, CompletionRequest, ProviderClient};
pub use config::{PageSelection, TimelineConfig, TimelineConfigBuilder, TimelineRequest};
pub use error::{ErrorKind, TimelineError};
pub use output::{
    DocumentMetadata, Event, EventDate, EventSet, ExtractionStats, PageText, TimelineDocument,
    TimelineOutput,
};
pub use pipeline::events::PromptContext;
pub use progress::{NoopProgressCallback, ProgressCallback, TimelineProgressCallback};
pub use timeline::{
    build_timeline, build_timeline_sync, extract_events, inspect, load_event_set, render_events,
    save_event_set,
};

//! Progress-callback trait for per-request extraction events.
//!
//! Inject an [`Arc<dyn TimelineProgressCallback>`] via
//! [`crate::config::TimelineConfigBuilder::progress_callback`] to be told
//! as each batch of pages is sent to the model and parsed. The CLI uses this
//! to drive its progress bar; a server could forward the same events over a
//! channel instead.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2timeline::{TimelineConfig, TimelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct EventCounter {
//!     events: AtomicUsize,
//! }
//!
//! impl TimelineProgressCallback for EventCounter {
//!     fn on_batch_complete(&self, _batch: usize, _total: usize, event_count: usize) {
//!         self.events.fetch_add(event_count, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(EventCounter { events: AtomicUsize::new(0) });
//!
//! let config = TimelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn TimelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the event extractor as it works through the document.
///
/// Batches are numbered from 1. All methods default to no-ops so
/// implementations only override what they need.
pub trait TimelineProgressCallback: Send + Sync {
    /// Called once before the first request.
    fn on_extraction_start(&self, total_batches: usize) {
        let _ = total_batches;
    }

    /// Called just before the completion request for a batch is sent.
    ///
    /// `pages` lists the 1-indexed pages carried by the request.
    fn on_batch_start(&self, batch: usize, total_batches: usize, pages: &[usize]) {
        let _ = (batch, total_batches, pages);
    }

    /// Called when a batch reply was parsed.
    fn on_batch_complete(&self, batch: usize, total_batches: usize, event_count: usize) {
        let _ = (batch, total_batches, event_count);
    }

    /// Called when a batch fails. Extraction stops after this call.
    fn on_batch_error(&self, batch: usize, total_batches: usize, error: &str) {
        let _ = (batch, total_batches, error);
    }

    /// Called once after every batch succeeded.
    fn on_extraction_complete(&self, total_batches: usize, event_count: usize) {
        let _ = (total_batches, event_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TimelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TimelineConfig`].
pub type ProgressCallback = Arc<dyn TimelineProgressCallback>;

//! Pipeline stages for document-to-timeline conversion.
//!
//! Each submodule implements one transformation step and is tested on its
//! own; [`crate::timeline`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ events ──▶ parse ──▶ render
//! (URL/path)  (lopdf)    (LLM)     (JSON)    (HTML)
//! ```
//!
//! 1. [`input`]   — canonicalise the user-supplied path or URL to a local file
//! 2. [`extract`] — one `PageText` per PDF page, or overlapping chunks for
//!    plain text; runs in `spawn_blocking`
//! 3. [`events`]  — batch pages into completion requests, one at a time;
//!    the only stage with network I/O
//! 4. [`parse`]   — strict validation of each reply into dated events
//! 5. [`render`]  — filter, sort and emit the `d3-milestones` page

pub mod events;
pub mod extract;
pub mod input;
pub mod parse;
pub mod render;

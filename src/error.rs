//! Error types for the edgequake-pdf2timeline library.
//!
//! Every failure is terminal for the call that produced it: there is no
//! partial timeline and no local recovery. [`TimelineError`] groups its
//! variants by [`ErrorKind`] so callers (and the CLI exit path) can tell a
//! bad input file from an LLM outage from an unwritable output directory
//! without matching on every variant.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`TimelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source document is missing, unreadable, or not a usable PDF.
    Input,
    /// The completion API failed (auth, network, quota) or no client is set.
    ExternalService,
    /// The LLM reply, or a saved events file, does not have the expected shape.
    Parse,
    /// The rendered timeline could not be written.
    Output,
    /// Invalid configuration or request parameters.
    Config,
    /// Bug or runtime failure inside the library.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Input => "input error",
            ErrorKind::ExternalService => "external service error",
            ErrorKind::Parse => "parse error",
            ErrorKind::Output => "output error",
            ErrorKind::Config => "configuration error",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// All errors returned by the edgequake-pdf2timeline library.
#[derive(Debug, Error)]
pub enum TimelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// None of the selected pages carries extractable text.
    #[error("No extractable text in '{path}'\nScanned PDFs need OCR before a timeline can be built.")]
    EmptyDocument { path: PathBuf },

    // ── External service errors ───────────────────────────────────────────
    /// No completion client was injected into the configuration.
    #[error("No completion client configured.\n{hint}")]
    ClientNotConfigured { hint: String },

    /// The completion API call failed.
    #[error("LLM API error from '{provider}' on pages {pages}: {message}")]
    LlmApiError {
        provider: String,
        pages: String,
        message: String,
    },

    // ── Parse errors ──────────────────────────────────────────────────────
    /// The LLM reply does not follow the requested JSON structure.
    #[error("Malformed LLM response for pages {pages}: {detail}")]
    MalformedResponse { pages: String, detail: String },

    /// A saved events file could not be read back.
    #[error("Invalid events file '{path}': {detail}")]
    EventsFileInvalid { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output HTML file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or request validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TimelineError {
    /// Which of the broad failure classes this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TimelineError::FileNotFound { .. }
            | TimelineError::PermissionDenied { .. }
            | TimelineError::InvalidInput { .. }
            | TimelineError::DownloadFailed { .. }
            | TimelineError::DownloadTimeout { .. }
            | TimelineError::NotAPdf { .. }
            | TimelineError::CorruptPdf { .. }
            | TimelineError::PasswordRequired { .. }
            | TimelineError::WrongPassword { .. }
            | TimelineError::PageOutOfRange { .. }
            | TimelineError::EmptyDocument { .. } => ErrorKind::Input,
            TimelineError::ClientNotConfigured { .. } | TimelineError::LlmApiError { .. } => {
                ErrorKind::ExternalService
            }
            TimelineError::MalformedResponse { .. } | TimelineError::EventsFileInvalid { .. } => {
                ErrorKind::Parse
            }
            TimelineError::OutputWriteFailed { .. } => ErrorKind::Output,
            TimelineError::InvalidConfig(_) => ErrorKind::Config,
            TimelineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Render a list of page numbers for error messages: `3` or `3, 4, 5`.
pub(crate) fn format_pages(pages: &[usize]) -> String {
    pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

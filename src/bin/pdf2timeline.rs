//! CLI binary for edgequake-pdf2timeline.
//!
//! Maps flags onto `TimelineRequest` / `TimelineConfig`, builds the
//! completion client from the environment and prints a short summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2timeline::client::DEFAULT_MODEL;
use edgequake_pdf2timeline::pipeline::input::is_url;
use edgequake_pdf2timeline::{
    build_timeline, inspect, load_event_set, render_events, save_event_set, PageSelection,
    ProgressCallback, ProviderClient, TimelineConfig, TimelineProgressCallback, TimelineRequest,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar over completion requests, with one log line per batch.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the request currently in flight.
    batch_started: Mutex<Option<Instant>>,
    events: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_extraction_start` tells us how many requests follow.
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            batch_started: Mutex::new(None),
            events: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.batch_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl TimelineProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_batches: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} requests  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_batches as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Sending {total_batches} requests…"))
        ));
    }

    fn on_batch_start(&self, _batch: usize, _total: usize, pages: &[usize]) {
        if let Ok(mut started) = self.batch_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {}", join_pages(pages)));
    }

    fn on_batch_complete(&self, batch: usize, total: usize, event_count: usize) {
        self.events.fetch_add(event_count, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Request {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            batch,
            total,
            dim(&format!("{event_count:>3} events")),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_batch_error(&self, batch: usize, total: usize, error: &str) {
        let msg = match error.char_indices().nth(80) {
            Some((cut, _)) => format!("{}…", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} Request {:>3}/{:<3}  {}  {}",
            red("✗"),
            batch,
            total,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.finish_and_clear();
    }

    fn on_extraction_complete(&self, total_batches: usize, event_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} events from {} requests",
            green("✔"),
            bold(&event_count.to_string()),
            total_batches
        );
    }
}

fn join_pages(pages: &[usize]) -> String {
    pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Timeline of the 19th century events in a history book
  pdf2timeline history.pdf --title "Europe" --start-year 1800 --end-year 1900

  # Give the model context and write to a specific file
  pdf2timeline bio.pdf -o out/bio.html --title "Darwin" --start-year 1809 --end-year 1882 \
      --useful-info "Biography of Charles Darwin" --suppress-bracketed-dates

  # Only some pages, two pages per request
  pdf2timeline --pages 10-40 --pages-per-request 2 book.pdf --title T --start-year 1 --end-year 2000

  # Extract once, render several ranges without calling the model again
  pdf2timeline book.pdf --title T --start-year 1800 --end-year 1900 --save-events book.events.json
  pdf2timeline --events book.events.json -o 1850s.html --title T --start-year 1850 --end-year 1859

  # Inspect document metadata (no API key needed)
  pdf2timeline --inspect-only book.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Provider used together with EDGEQUAKE_MODEL
  EDGEQUAKE_MODEL         Model ID
  PDF2TIMELINE_*          Fallback for every flag, e.g. PDF2TIMELINE_WIDTH=2400
"#;

/// Build interactive HTML timelines from the dated events in a PDF.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2timeline",
    version,
    about = "Build interactive HTML timelines from the dated events in a PDF",
    long_about = "Extract the text of a PDF (local file or URL) or plain-text file, ask an LLM \
for the dated events on every page, and render the ones inside a year range as a d3-milestones \
timeline whose events link back to their source page.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF / text file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "events")]
    input: Option<String>,

    /// Output HTML file [default: <input stem>.html].
    #[arg(short, long, env = "PDF2TIMELINE_OUTPUT")]
    output: Option<PathBuf>,

    /// Timeline title.
    #[arg(long, env = "PDF2TIMELINE_TITLE", required_unless_present = "inspect_only")]
    title: Option<String>,

    /// First year shown (inclusive).
    #[arg(long, env = "PDF2TIMELINE_START_YEAR", allow_negative_numbers = true,
          required_unless_present = "inspect_only")]
    start_year: Option<i32>,

    /// Last year shown (inclusive).
    #[arg(long, env = "PDF2TIMELINE_END_YEAR", allow_negative_numbers = true,
          required_unless_present = "inspect_only")]
    end_year: Option<i32>,

    /// Free-text context about the document passed to the model.
    #[arg(long, env = "PDF2TIMELINE_USEFUL_INFO")]
    useful_info: Option<String>,

    /// Ask the model to ignore dates in brackets (birth/death years).
    #[arg(long, env = "PDF2TIMELINE_SUPPRESS_BRACKETED_DATES")]
    suppress_bracketed_dates: bool,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2TIMELINE_PAGES", default_value = "all")]
    pages: String,

    /// Pages sent per completion request.
    #[arg(long, env = "PDF2TIMELINE_PAGES_PER_REQUEST", default_value_t = 1)]
    pages_per_request: usize,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2TIMELINE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per request.
    #[arg(long, env = "PDF2TIMELINE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Path to a text file replacing the built-in system prompt.
    #[arg(long, env = "PDF2TIMELINE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2TIMELINE_PASSWORD")]
    password: Option<String>,

    /// Timeline width in pixels.
    #[arg(long, env = "PDF2TIMELINE_WIDTH", default_value_t = 3000)]
    width: u32,

    /// Omit the "Start of timeline" / "End of timeline" markers.
    #[arg(long, env = "PDF2TIMELINE_NO_MARKERS")]
    no_markers: bool,

    /// Print the result (events, rendered document, stats) as JSON on stdout.
    #[arg(long, env = "PDF2TIMELINE_JSON")]
    json: bool,

    /// Also save the extracted events to this JSON file.
    #[arg(long, env = "PDF2TIMELINE_SAVE_EVENTS", conflicts_with = "events")]
    save_events: Option<PathBuf>,

    /// Render a previously saved events file instead of calling the model.
    #[arg(long, env = "PDF2TIMELINE_EVENTS")]
    events: Option<PathBuf>,

    /// Print document metadata only, no timeline.
    #[arg(long)]
    inspect_only: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2TIMELINE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PDF2TIMELINE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2TIMELINE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2TIMELINE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless -v asks for everything.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.events.is_none();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress && !cli.inspect_only {
        Some(CliProgressCallback::new() as Arc<dyn TimelineProgressCallback>)
    } else {
        None
    };
    let mut config = build_config(&cli, progress_cb).await?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let input = cli.input.as_deref().context("An input document is required")?;
        let meta = inspect(input, &config).await.context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            println!("Pages:        {}", meta.page_count);
            if !meta.pdf_version.is_empty() {
                println!("PDF Version:  {}", meta.pdf_version);
            }
            println!("Encrypted:    {}", meta.is_encrypted);
        }
        return Ok(());
    }

    // Enforced by clap unless --inspect-only.
    let title = cli.title.clone().context("--title is required")?;
    let start_year = cli.start_year.context("--start-year is required")?;
    let end_year = cli.end_year.context("--end-year is required")?;

    // ── Render a saved event set ─────────────────────────────────────────
    if let Some(ref events_path) = cli.events {
        let output_path = cli
            .output
            .clone()
            .unwrap_or_else(|| events_path.with_extension("html"));
        let events = load_event_set(events_path)
            .await
            .context("Failed to load events")?;
        let (document, _html) =
            render_events(&events, &title, start_year, end_year, &output_path, &config)
                .await
                .context("Rendering failed")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&document).context("Failed to serialise output")?
            );
        }
        if !cli.quiet {
            eprintln!(
                "{}  {}/{} events in range  →  {}",
                green("✔"),
                document.events.len(),
                events.events.len(),
                bold(&output_path.display().to_string()),
            );
        }
        return Ok(());
    }

    // ── Full pipeline ────────────────────────────────────────────────────
    let input = cli
        .input
        .clone()
        .context("An input document is required")?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input));

    let client = match cli.provider {
        Some(ref provider) => {
            ProviderClient::named(provider, cli.model.as_deref().unwrap_or(DEFAULT_MODEL))
        }
        None => ProviderClient::from_env(cli.model.as_deref()),
    }
    .context("Failed to configure the LLM provider")?;
    config.client = Some(Arc::new(client));

    let mut request = TimelineRequest::new(&input, &output_path, &title, start_year, end_year)
        .suppress_bracketed_dates(cli.suppress_bracketed_dates);
    if let Some(ref info) = cli.useful_info {
        request = request.useful_info(info);
    }

    let output = build_timeline(&request, &config)
        .await
        .context("Timeline generation failed")?;

    if let Some(ref path) = cli.save_events {
        save_event_set(path, &output.events)
            .await
            .context("Failed to save events")?;
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    }

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} events in range  {} pages  {}ms  →  {}",
            green("✔"),
            output.document.events.len(),
            stats.events_extracted,
            stats.processed_pages,
            stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out  /  {} undated skipped",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
            dim(&stats.undated_skipped.to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `TimelineConfig` (without a client).
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TimelineConfig> {
    let mut builder = TimelineConfig::builder()
        .pages(parse_pages(&cli.pages)?)
        .pages_per_request(cli.pages_per_request)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .width(cli.width)
        .boundary_markers(!cli.no_markers)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `<stem>.html` next to a local input, or in the current directory for URLs.
fn default_output_path(input: &str) -> PathBuf {
    if is_url(input) {
        let stem = input
            .rsplit('/')
            .find(|s| !s.is_empty())
            .and_then(|s| Path::new(s).file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or("timeline");
        PathBuf::from(format!("{stem}.html"))
    } else {
        Path::new(input).with_extension("html")
    }
}

/// Parse `--pages` into a `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    let page_number = |p: &str| -> Result<usize> {
        let n: usize = p
            .trim()
            .parse()
            .with_context(|| format!("Invalid page number: '{}'", p.trim()))?;
        if n < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", n);
        }
        Ok(n)
    };

    if let Some((start, end)) = s.split_once('-') {
        let (start, end) = (page_number(start)?, page_number(end)?);
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    if s.contains(',') {
        let pages = s.split(',').map(page_number).collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }

    Ok(PageSelection::Single(page_number(&s)?))
}

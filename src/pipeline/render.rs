//! Timeline rendering: events → `d3-milestones` JSON → standalone HTML.
//!
//! The page loads `d3-milestones` from unpkg and feeds it the JSON built
//! here. Every event carries its source page and, for PDFs, a
//! `<source>#page=N` link that the click handler opens in a new tab.
//!
//! Rendering is a pure function of the [`TimelineDocument`] and
//! [`RenderOptions`]: the same input always yields byte-identical output.

use crate::error::TimelineError;
use crate::output::TimelineDocument;
use crate::pipeline::input::is_url;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Stylesheet and script of the timeline library.
pub const MILESTONES_CSS: &str = "https://unpkg.com/d3-milestones/build/d3-milestones.css";
pub const MILESTONES_JS: &str = "https://unpkg.com/d3-milestones/build/d3-milestones.min.js";

/// Presentation settings for one rendered timeline.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions<'a> {
    /// Path or URL events link back to; `None` renders without links.
    pub link_target: Option<&'a str>,
    /// Width of the timeline element in pixels.
    pub width: u32,
    /// Add "Start of timeline" / "End of timeline" markers.
    pub boundary_markers: bool,
}

/// One entry of the array handed to `milestones(...).render()`.
#[derive(Debug, Serialize)]
struct Milestone<'a> {
    /// `Y/M/D`, parsed by the library with `%Y/%-m/%-d`.
    year: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<String>,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
}

impl<'a> Milestone<'a> {
    fn marker(year: i32, title: &str) -> Self {
        Self {
            year: format!("{year}/1/1"),
            title: title.to_string(),
            page: None,
            link: None,
            description: "",
        }
    }
}

/// Serialise the document into the JSON array the timeline library renders.
pub fn milestones_json(
    doc: &TimelineDocument,
    options: &RenderOptions<'_>,
) -> Result<String, TimelineError> {
    let mut milestones = Vec::with_capacity(doc.events.len() + 2);

    if options.boundary_markers {
        milestones.push(Milestone::marker(doc.start_year, "Start of timeline"));
    }

    for event in &doc.events {
        let title = if event.date.month.is_none() {
            format!("{} (year level)", event.label)
        } else {
            event.label.clone()
        };
        milestones.push(Milestone {
            year: event.date.timestamp(),
            title,
            page: Some(event.source_page),
            link: options
                .link_target
                .map(|target| format!("{target}#page={}", event.source_page)),
            description: &event.description,
        });
    }

    if options.boundary_markers {
        milestones.push(Milestone::marker(doc.end_year, "End of timeline"));
    }

    serde_json::to_string(&milestones)
        .map_err(|e| TimelineError::Internal(format!("Failed to serialise timeline: {e}")))
}

/// Link target for `source` as seen from the page written to `output`.
///
/// URLs are kept as given. Local paths become relative to the output's
/// directory, so `bio.pdf` rendered to `out/bio.html` links to `../bio.pdf`.
pub fn link_target(source: &str, output: &Path) -> String {
    if is_url(source) {
        return source.to_string();
    }
    relative_file_link(Path::new(source), output).unwrap_or_else(|| source.to_string())
}

fn relative_file_link(source: &Path, output: &Path) -> Option<String> {
    let out_dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let base = Url::from_directory_path(absolute(out_dir)?).ok()?;
    let target = Url::from_file_path(absolute(source)?).ok()?;
    base.make_relative(&target)
}

fn absolute(path: &Path) -> Option<PathBuf> {
    std::fs::canonicalize(path)
        .ok()
        .or_else(|| std::env::current_dir().ok().map(|cwd| cwd.join(path)))
}

/// Build the complete HTML page.
pub fn render_html(doc: &TimelineDocument, options: &RenderOptions<'_>) -> Result<String, TimelineError> {
    let data = script_safe(&milestones_json(doc, options)?);
    let title = escape_html(&doc.title);

    debug!(
        "Rendering '{}' with {} events ({}–{})",
        doc.title,
        doc.events.len(),
        doc.start_year,
        doc.end_year
    );

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="stylesheet" href="{css}">
<script src="{js}"></script>
<style>
  body {{ font-family: sans-serif; margin: 20px; }}
  #tooltip {{ position: absolute; opacity: 0; pointer-events: none; padding: 10px; background-color: whitesmoke; border: 1px solid black; border-radius: 5px; width: 300px; font-size: 8pt; }}
</style>
</head>
<body>
<h1>{title}</h1>
<div id="tooltip"></div>
<div id="timeline" style="width:{width}px;"></div>
<script>
const events = {data};
const tooltip = document.getElementById('tooltip');
milestones('#timeline')
  .mapping({{
    'timestamp': 'year',
    'text': 'title'
  }})
  .parseTime('%Y/%-m/%-d')
  .aggregateBy('month')
  .orientation('horizontal')
  .useLabels(true)
  .optimize(true)
  .onEventClick((d) => {{
    const item = d.srcElement.__data__.attributes;
    if (item.link) {{
      window.open(item.link, '_blank');
    }}
  }})
  .onEventMouseOver((d) => {{
    const item = d.srcElement.__data__.attributes;
    if (!item.page) {{
      return;
    }}
    tooltip.textContent = (item.description ? item.description + ' ' : '') + '(page ' + item.page + ')';
    tooltip.style.left = (d.pageX + 10) + 'px';
    tooltip.style.top = (d.pageY + 10) + 'px';
    tooltip.style.opacity = 1;
  }})
  .onEventMouseLeave(() => {{
    tooltip.style.opacity = 0;
  }})
  .render(events);
</script>
</body>
</html>
"#,
        css = MILESTONES_CSS,
        js = MILESTONES_JS,
        width = options.width,
    ))
}

/// Write an output file atomically: temp file next to it, then rename.
/// Missing parent directories are created.
pub async fn write_output(path: &Path, contents: &str) -> Result<(), TimelineError> {
    let write_err = |source| TimelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let written = match tokio::fs::write(&tmp_path, contents).await {
        Ok(()) => tokio::fs::rename(&tmp_path, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

/// Make JSON safe to inline in a `<script>` element. `<` only occurs
/// inside JSON strings, where `\u003c` decodes to the same character.
fn script_safe(json: &str) -> String {
    json.replace('<', "\\u003c")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Event, EventDate};

    fn ev(year: i32, label: &str, page: usize) -> Event {
        Event {
            date: EventDate::year(year),
            label: label.into(),
            description: format!("About {label}"),
            source_page: page,
        }
    }

    fn options(link: Option<&str>) -> RenderOptions<'_> {
        RenderOptions {
            link_target: link,
            width: 3000,
            boundary_markers: true,
        }
    }

    #[test]
    fn only_in_range_events_are_rendered() {
        let events = vec![ev(1795, "early", 1), ev(1850, "middle", 2), ev(1999, "late", 3)];
        let doc = TimelineDocument::new("Test", 1800, 1900, &events);
        let json = milestones_json(&doc, &options(Some("book.pdf"))).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();

        let event_titles: Vec<&str> = parsed
            .iter()
            .filter(|m| m.get("page").is_some())
            .map(|m| m["title"].as_str().unwrap())
            .collect();
        assert_eq!(event_titles, vec!["middle (year level)"]);
        assert_eq!(parsed[1]["link"], "book.pdf#page=2");
        assert_eq!(parsed[1]["year"], "1850/1/1");
    }

    #[test]
    fn boundary_markers_frame_the_events() {
        let doc = TimelineDocument::new("T", 1800, 1900, &[ev(1850, "x", 1)]);
        let json = milestones_json(&doc, &options(None)).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0]["title"], "Start of timeline");
        assert_eq!(parsed[0]["year"], "1800/1/1");
        assert_eq!(parsed[2]["title"], "End of timeline");
        assert!(parsed[1].get("link").is_none());

        let no_markers = RenderOptions {
            boundary_markers: false,
            ..options(None)
        };
        let json = milestones_json(&doc, &no_markers).unwrap();
        assert_eq!(serde_json::from_str::<Vec<serde_json::Value>>(&json).unwrap().len(), 1);
    }

    #[test]
    fn dated_events_keep_plain_title() {
        let mut e = ev(1969, "Moon landing", 4);
        e.date.month = Some(7);
        e.date.day = Some(20);
        let doc = TimelineDocument::new("T", 1900, 2000, &[e]);
        let json = milestones_json(&doc, &options(None)).unwrap();
        assert!(json.contains(r#""year":"1969/7/20","title":"Moon landing""#));
    }

    #[test]
    fn rendering_is_deterministic() {
        let events = vec![ev(1850, "b", 2), ev(1820, "a", 1)];
        let doc = TimelineDocument::new("Same", 1800, 1900, &events);
        let first = render_html(&doc, &options(Some("a.pdf"))).unwrap();
        let second = render_html(&doc, &options(Some("a.pdf"))).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn html_escapes_title_and_script_data() {
        let doc = TimelineDocument::new(
            "<b>War & Peace</b>",
            1800,
            1900,
            &[ev(1812, "</script><script>alert(1)</script>", 1)],
        );
        let html = render_html(&doc, &options(None)).unwrap();
        assert!(html.contains("<title>&lt;b&gt;War &amp; Peace&lt;/b&gt;</title>"));
        assert!(!html.contains("</script><script>alert"));
        assert!(html.contains("\\u003c/script>"));
        assert!(html.contains("style=\"width:3000px;\""));
        assert!(html.contains(MILESTONES_JS));
    }

    #[tokio::test]
    async fn write_output_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/timeline.html");
        write_output(&path, "<html></html>").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<html></html>");
        assert!(!dir.path().join("nested/out/timeline.html.tmp").exists());
    }

    #[test]
    fn local_links_are_relative_to_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("bio.pdf");
        std::fs::write(&pdf, "%PDF-1.5").unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        let src = pdf.to_str().unwrap();

        assert_eq!(link_target(src, &dir.path().join("out/bio.html")), "../bio.pdf");
        assert_eq!(link_target(src, &dir.path().join("bio.html")), "bio.pdf");
        assert_eq!(
            link_target("https://example.org/bio.pdf", &dir.path().join("out/bio.html")),
            "https://example.org/bio.pdf"
        );
    }

    #[tokio::test]
    async fn failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target makes the final rename fail.
        let path = dir.path().join("timeline.html");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let err = write_output(&path, "<html></html>").await.unwrap_err();
        assert!(matches!(err, TimelineError::OutputWriteFailed { .. }));
        assert!(!dir.path().join("timeline.html.tmp").exists());
    }

    #[tokio::test]
    async fn write_output_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let err = write_output(&blocker.join("out.html"), "x").await.unwrap_err();
        assert!(matches!(err, TimelineError::OutputWriteFailed { .. }));
    }
}

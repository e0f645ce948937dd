//! Offline integration tests for the full timeline pipeline.
//!
//! PDFs are generated in-process with lopdf and the model is replaced by a
//! client that answers from the page markers in each prompt, so these run
//! without network access or API keys.

use async_trait::async_trait;
use edgequake_pdf2timeline::pipeline::extract::extract_pages;
use edgequake_pdf2timeline::pipeline::input::DocumentKind;
use edgequake_pdf2timeline::{
    build_timeline, extract_events, load_event_set, render_events, save_event_set, ClientError,
    Completion, CompletionClient, CompletionRequest, ErrorKind, PageSelection, PromptContext,
    TimelineConfig, TimelineError, TimelineRequest,
};
use lopdf::{dictionary, encryption, Document, Object, Stream, StringFormat};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A PDF whose page `i` shows `pages[i]` as a single line of text.
fn build_pdf(pages: &[&str]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

fn save_pdf(mut doc: Document, dir: &Path, name: &str) -> PathBuf {
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, buf).unwrap();
    path
}

fn write_pdf(dir: &Path, name: &str, pages: &[&str]) -> PathBuf {
    save_pdf(build_pdf(pages), dir, name)
}

/// Padding string of the standard security handler.
const PASSWORD_PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut s: [u8; 256] = std::array::from_fn(|i| i as u8);
    let mut j = 0u8;
    for i in 0..256 {
        j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
        s.swap(i, j as usize);
    }
    let (mut i, mut j) = (0u8, 0u8);
    data.iter()
        .map(|b| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(s[i as usize]);
            s.swap(i as usize, j as usize);
            b ^ s[s[i as usize].wrapping_add(s[j as usize]) as usize]
        })
        .collect()
}

/// Write a PDF encrypted with 40-bit RC4 (revision 2) for `user_password`.
/// An empty user password gives an owner-password-only ("restricted") file.
fn write_encrypted_pdf(dir: &Path, name: &str, pages: &[&str], user_password: &str) -> PathBuf {
    let mut doc = build_pdf(pages);
    let file_id = Object::String(b"pdf2timeline-fixture".to_vec(), StringFormat::Literal);
    doc.trailer.set("ID", vec![file_id.clone(), file_id]);

    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "Length" => 40,
        "O" => Object::String(vec![0x4F; 32], StringFormat::Hexadecimal),
        "P" => -4,
    });
    doc.trailer.set("Encrypt", encrypt_id);

    let key = encryption::get_encryption_key(&doc, user_password, false).unwrap();
    let user_entry = rc4(&key, &PASSWORD_PAD);
    doc.get_object_mut(encrypt_id)
        .and_then(Object::as_dict_mut)
        .unwrap()
        .set("U", Object::String(user_entry, StringFormat::Hexadecimal));

    // RC4 is symmetric, so the object decryptor also encrypts.
    for (&id, obj) in doc.objects.iter_mut() {
        if id == encrypt_id {
            continue;
        }
        if let Object::Stream(_) = obj {
            let cipher = encryption::decrypt_object(&key, id, &*obj).unwrap();
            if let Object::Stream(stream) = obj {
                stream.set_content(cipher);
            }
        }
    }

    save_pdf(doc, dir, name)
}

type Handler = dyn Fn(&[usize]) -> Result<String, String> + Send + Sync;

/// Answers each request from the `[Page N]` markers found in its prompt.
struct PageClient {
    handler: Box<Handler>,
    calls: AtomicUsize,
}

impl PageClient {
    fn new(handler: impl Fn(&[usize]) -> Result<String, String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for PageClient {
    fn name(&self) -> &str {
        "page-client"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let marker = Regex::new(r"\[Page (\d+)\]").unwrap();
        let pages: Vec<usize> = marker
            .captures_iter(&request.prompt)
            .map(|c| c[1].parse().unwrap())
            .collect();
        (self.handler)(&pages)
            .map(|content| Completion {
                content,
                input_tokens: 50,
                output_tokens: 5,
            })
            .map_err(ClientError)
    }
}

/// One year-level event per page, using `years[page - 1]`.
fn one_event_per_page(years: &'static [i32]) -> impl Fn(&[usize]) -> Result<String, String> + Send + Sync {
    move |pages| {
        let items: Vec<serde_json::Value> = pages
            .iter()
            .map(|&p| {
                serde_json::json!({
                    "year": years[p - 1],
                    "month": "",
                    "day_of_month": "",
                    "event": format!("Event of {}", years[p - 1]),
                    "description": format!("Mentioned on page {p}"),
                    "page": p,
                })
            })
            .collect();
        Ok(serde_json::Value::Array(items).to_string())
    }
}

fn config_with(client: Arc<PageClient>) -> TimelineConfig {
    TimelineConfig::builder().client(client).build().unwrap()
}

fn three_page_pdf(dir: &Path) -> PathBuf {
    write_pdf(
        dir,
        "history.pdf",
        &[
            "In 1795 the first event happened.",
            "In 1850 the second event happened.",
            "In 1999 the third event happened.",
        ],
    )
}

fn page_links(html: &str) -> Vec<usize> {
    Regex::new(r"#page=(\d+)")
        .unwrap()
        .captures_iter(html)
        .map(|c| c[1].parse().unwrap())
        .collect()
}

// ── Extraction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn n_page_pdf_yields_n_pages_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_pdf(dir.path(), "four.pdf", &["alpha", "bravo", "charlie", "delta"]);

    let pages = extract_pages(&path, DocumentKind::Pdf, &TimelineConfig::default())
        .await
        .unwrap();

    let numbers: Vec<usize> = pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert!(pages[0].text.contains("alpha"));
    assert!(pages[3].text.contains("delta"));
}

#[tokio::test]
async fn restricted_pdf_opens_without_a_password() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_encrypted_pdf(dir.path(), "restricted.pdf", &["alpha", "bravo"], "");

    let pages = extract_pages(&path, DocumentKind::Pdf, &TimelineConfig::default())
        .await
        .unwrap();

    assert_eq!(pages.len(), 2);
    assert!(pages[0].text.contains("alpha"));
    assert!(pages[1].text.contains("bravo"));
}

#[tokio::test]
async fn protected_pdf_needs_the_right_password() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_encrypted_pdf(dir.path(), "locked.pdf", &["alpha"], "secret");

    let err = extract_pages(&path, DocumentKind::Pdf, &TimelineConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TimelineError::PasswordRequired { .. }), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Input);

    let wrong = TimelineConfig::builder().password("nope").build().unwrap();
    let err = extract_pages(&path, DocumentKind::Pdf, &wrong).await.unwrap_err();
    assert!(matches!(err, TimelineError::WrongPassword { .. }), "got {err:?}");

    let right = TimelineConfig::builder().password("secret").build().unwrap();
    let pages = extract_pages(&path, DocumentKind::Pdf, &right).await.unwrap();
    assert!(pages[0].text.contains("alpha"));
}

// ── Full pipeline ────────────────────────────────────────────────────────────

#[tokio::test]
async fn only_events_inside_the_year_range_are_rendered() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(dir.path());
    let out = dir.path().join("timeline.html");
    let client = PageClient::new(one_event_per_page(&[1795, 1850, 1999]));

    let request = TimelineRequest::new(pdf.to_str().unwrap(), &out, "Test", 1800, 1900);
    let output = build_timeline(&request, &config_with(client.clone())).await.unwrap();

    assert_eq!(client.calls(), 3);
    assert_eq!(output.events.events.len(), 3);
    assert_eq!(output.events.page_count, 3);
    assert_eq!(output.document.events.len(), 1);
    assert_eq!(output.document.events[0].date.year, 1850);
    assert_eq!(output.document.events[0].source_page, 2);
    assert_eq!(output.stats.requests, 3);
    assert_eq!(output.stats.total_input_tokens, 150);

    let html = std::fs::read_to_string(&out).unwrap();
    assert_eq!(html, output.html);
    assert!(html.contains("Event of 1850 (year level)"));
    assert!(!html.contains("Event of 1795"));
    assert!(!html.contains("Event of 1999"));
    assert_eq!(page_links(&html), vec![2]);
}

#[tokio::test]
async fn events_are_rendered_in_chronological_order() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_pdf(dir.path(), "mixed.pdf", &["later", "earlier", "middle"]);
    let out = dir.path().join("t.html");
    let client = PageClient::new(one_event_per_page(&[1880, 1810, 1850]));

    let request = TimelineRequest::new(pdf.to_str().unwrap(), &out, "Order", 1800, 1900);
    let output = build_timeline(&request, &config_with(client)).await.unwrap();

    let years: Vec<i32> = output.document.events.iter().map(|e| e.date.year).collect();
    assert_eq!(years, vec![1810, 1850, 1880]);
}

#[tokio::test]
async fn links_point_at_existing_pages() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(dir.path());
    let out = dir.path().join("t.html");
    let client = PageClient::new(one_event_per_page(&[1801, 1802, 1803]));
    let config = TimelineConfig::builder()
        .client(client.clone())
        .pages_per_request(3)
        .build()
        .unwrap();

    let request = TimelineRequest::new(pdf.to_str().unwrap(), &out, "Links", 1800, 1900);
    let output = build_timeline(&request, &config).await.unwrap();

    assert_eq!(client.calls(), 1);
    let links = page_links(&output.html);
    assert_eq!(links.len(), 3);
    assert!(links.iter().all(|p| (1..=3).contains(p)));
    let name = pdf.file_name().unwrap().to_str().unwrap();
    assert!(output.html.contains(&format!("\"{name}#page=3\"")));
}

#[tokio::test]
async fn rendering_the_same_document_twice_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(dir.path());
    let first = dir.path().join("first.html");
    let second = dir.path().join("second.html");

    for out in [&first, &second] {
        let client = PageClient::new(one_event_per_page(&[1810, 1820, 1830]));
        let request = TimelineRequest::new(pdf.to_str().unwrap(), out, "Same", 1800, 1900);
        build_timeline(&request, &config_with(client)).await.unwrap();
    }

    assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
}

#[tokio::test]
async fn page_selection_limits_requests() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(dir.path());
    let out = dir.path().join("t.html");
    let client = PageClient::new(one_event_per_page(&[1810, 1820, 1830]));
    let config = TimelineConfig::builder()
        .client(client.clone())
        .pages(PageSelection::Single(2))
        .build()
        .unwrap();

    let request = TimelineRequest::new(pdf.to_str().unwrap(), &out, "One page", 1800, 1900);
    let output = build_timeline(&request, &config).await.unwrap();

    assert_eq!(client.calls(), 1);
    assert_eq!(output.stats.total_pages, 3);
    assert_eq!(output.stats.processed_pages, 1);
    assert_eq!(output.document.events[0].source_page, 2);
}

#[tokio::test]
async fn selection_outside_the_document_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(dir.path());
    let out = dir.path().join("t.html");
    let client = PageClient::new(one_event_per_page(&[1810, 1820, 1830]));
    let config = TimelineConfig::builder()
        .client(client.clone())
        .pages(PageSelection::Range(7, 9))
        .build()
        .unwrap();

    let request = TimelineRequest::new(pdf.to_str().unwrap(), &out, "T", 1800, 1900);
    let err = build_timeline(&request, &config).await.unwrap_err();

    assert!(matches!(err, TimelineError::PageOutOfRange { page: 7, total: 3 }));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn text_files_are_chunked_and_never_linked() {
    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("notes.txt");
    std::fs::write(&txt, "In 1815 Waterloo was fought.\n\nIn 1848 revolutions spread.").unwrap();
    let out = dir.path().join("notes.html");
    let client = PageClient::new(one_event_per_page(&[1815, 1848]));

    let request = TimelineRequest::new(txt.to_str().unwrap(), &out, "Notes", 1800, 1900);
    let output = build_timeline(&request, &config_with(client.clone())).await.unwrap();

    assert_eq!(client.calls(), 1);
    assert!(!output.events.linkable);
    assert_eq!(output.document.events.len(), 1);
    assert!(page_links(&output.html).is_empty());
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_input_fails_without_creating_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("never.html");
    let client = PageClient::new(one_event_per_page(&[1850]));

    let request = TimelineRequest::new("/no/such/file.pdf", &out, "T", 1800, 1900);
    let err = build_timeline(&request, &config_with(client.clone())).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(matches!(err, TimelineError::FileNotFound { .. }));
    assert!(!out.exists());
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn missing_client_is_an_external_service_error() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(dir.path());
    let out = dir.path().join("t.html");

    let request = TimelineRequest::new(pdf.to_str().unwrap(), &out, "T", 1800, 1900);
    let err = build_timeline(&request, &TimelineConfig::default()).await.unwrap_err();

    assert!(matches!(err, TimelineError::ClientNotConfigured { .. }));
    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert!(!out.exists());
}

#[tokio::test]
async fn client_failure_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(dir.path());
    let out = dir.path().join("t.html");
    let client = PageClient::new(|pages: &[usize]| {
        if pages.contains(&2) {
            Err("503 service unavailable".to_string())
        } else {
            Ok("[]".to_string())
        }
    });

    let request = TimelineRequest::new(pdf.to_str().unwrap(), &out, "T", 1800, 1900);
    let err = build_timeline(&request, &config_with(client.clone())).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert!(err.to_string().contains("503"));
    assert_eq!(client.calls(), 2);
    assert!(!out.exists());
}

#[tokio::test]
async fn malformed_reply_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(dir.path());
    let out = dir.path().join("t.html");
    let client = PageClient::new(|_: &[usize]| Ok(r#"{"events": []}"#.to_string()));

    let request = TimelineRequest::new(pdf.to_str().unwrap(), &out, "T", 1800, 1900);
    let err = build_timeline(&request, &config_with(client)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Parse);
    assert!(!out.exists());
}

#[tokio::test]
async fn inverted_year_range_is_rejected_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(dir.path());
    let out = dir.path().join("t.html");
    let client = PageClient::new(one_event_per_page(&[1810, 1820, 1830]));

    let request = TimelineRequest::new(pdf.to_str().unwrap(), &out, "T", 1900, 1800);
    let err = build_timeline(&request, &config_with(client.clone())).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(client.calls(), 0);
}

// ── Extract once, render many ────────────────────────────────────────────────

#[tokio::test]
async fn saved_events_render_without_a_client() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(dir.path());
    let client = PageClient::new(one_event_per_page(&[1795, 1850, 1999]));
    let context = PromptContext {
        title: "Saved",
        useful_info: None,
        suppress_bracketed_dates: false,
    };

    let (events, stats) = extract_events(pdf.to_str().unwrap(), context, &config_with(client))
        .await
        .unwrap();
    assert_eq!(stats.events_extracted, 3);

    let saved = dir.path().join("events.json");
    save_event_set(&saved, &events).await.unwrap();
    let loaded = load_event_set(&saved).await.unwrap();
    assert_eq!(loaded, events);

    let out = dir.path().join("modern.html");
    let (document, html) =
        render_events(&loaded, "Modern", 1900, 2000, &out, &TimelineConfig::default())
            .await
            .unwrap();
    assert_eq!(document.events.len(), 1);
    assert_eq!(document.events[0].date.year, 1999);
    assert_eq!(page_links(&html), vec![3]);
}

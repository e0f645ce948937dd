//! Prompts for LLM-based event extraction.
//!
//! The system prompt fixes the reply format the parser in
//! [`crate::pipeline::parse`] expects; the user prompt carries the page
//! texts. Callers can replace the system prompt via
//! [`crate::config::TimelineConfig::system_prompt`], but the bracketed-date
//! rule is always appended so `suppress_bracketed_dates` keeps working.

use crate::output::PageText;

/// Default system prompt for extracting dated events.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a careful historian. Your task is to extract a timeline of dated events from document pages.

Follow these rules precisely:

1. WHAT TO EXTRACT
   - Every event the text ties to a date: births, deaths, battles, publications, foundings, elections, discoveries
   - Only events stated in the text; never add events from your own knowledge
   - Give each event the page it was read from

2. OUTPUT FORMAT
   - Reply with a JSON array only, no commentary and no markdown fences
   - Each element is an object with exactly these keys:
     "year"         the year as an integer from 1 to 9999
     "month"        the month name or number, or "" if unknown
     "day_of_month" the day as an integer, or "" if unknown
     "event"        a short headline of at most 15 words
     "description"  one sentence of context from the text
     "page"         the number N of the [Page N] block the event comes from
   - If the month and day of month are unknown, leave them blank
   - If the pages contain no dated events, reply with []"#;

/// Appended by default: life-span brackets produce two events.
pub const BRACKETED_DATES_RULE: &str = r#"

3. LIFE-SPAN DATES
   When a person's name is followed by two dates in brackets, the first date is the
   birth date and the second date is the death date. Include both the birth and the
   death in the timeline. For example, "Albert Einstein (1879-1955)" becomes two
   events, one for the birth and one for the death."#;

/// Appended when `suppress_bracketed_dates` is set.
pub const SUPPRESS_BRACKETED_DATES_RULE: &str = r#"

3. LIFE-SPAN DATES
   Ignore dates that appear in brackets after a person's name, such as
   "Albert Einstein (1879-1955)". Do not create birth or death events from them."#;

/// Assemble the system prompt for one extraction run.
pub fn build_system_prompt(base: Option<&str>, suppress_bracketed_dates: bool) -> String {
    let rule = if suppress_bracketed_dates {
        SUPPRESS_BRACKETED_DATES_RULE
    } else {
        BRACKETED_DATES_RULE
    };
    format!("{}{}", base.unwrap_or(DEFAULT_SYSTEM_PROMPT), rule)
}

/// Build the user message for a batch of pages.
///
/// Each page is wrapped in a `[Page N]` block so the model can attribute
/// events even when several pages share one request.
pub fn build_user_prompt(title: &str, useful_info: Option<&str>, pages: &[PageText]) -> String {
    let mut prompt = String::new();

    if !title.trim().is_empty() {
        prompt.push_str(&format!("The timeline is titled \"{}\".\n", title.trim()));
    }
    if let Some(info) = useful_info {
        prompt.push_str(&format!(
            "Useful information about the document:\n\"\"\"{}\"\"\"\n",
            info.trim()
        ));
    }

    prompt.push_str("\nExtract the timeline from the text below.\n");

    for page in pages {
        prompt.push_str(&format!(
            "\n[Page {}]\n{}\n[End of page {}]\n",
            page.page_number,
            page.text.trim(),
            page.page_number
        ));
    }

    prompt
}

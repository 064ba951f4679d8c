//! Caller-facing output shaping
//!
//! Raw transcripts carry terminal control sequences, carriage-return
//! redraws and REPL noise. These helpers turn them into plain text before
//! they leave the engine.

use once_cell::sync::Lazy;
use regex::Regex;

/// Upper bound on the characters returned for one transcript
pub const MAX_OUTPUT_CHARS: usize = 1_000_000;

/// Characters of a command considered for its log preview
const PREVIEW_SOURCE_CHARS: usize = 200;
/// Maximum length of a command log preview
const PREVIEW_CHARS: usize = 100;

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid ANSI pattern")
});

/// Leading blank continuation lines (`\r\r\n>`)
static LEADING_CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \r]*(?:\r*\n>[ \r]*)*").expect("valid continuation pattern"));

/// Leading `> ` continuation markers
static LEADING_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:>\s*)+").expect("valid marker pattern"));

/// Turn a raw transcript into plain text
///
/// Removes escape sequences and NUL bytes, drops leading REPL continuation
/// noise, collapses carriage-return redraws to their final state and strips
/// every line.
pub fn clean_output(raw: &str) -> String {
    let text = ANSI_ESCAPE.replace_all(raw, "");
    let text = text.replace('\0', "");
    let text = LEADING_CONTINUATION.replace(&text, "");
    let text = LEADING_MARKERS.replace(&text, "");
    let text = text.replace("\r\n", "\n");
    let text = text.trim_start_matches(['\r', ' ']);

    text.lines()
        .map(|line| {
            // A progress bar redraws with \r; keep what is left on screen
            line.split('\r')
                .filter(|part| !part.trim().is_empty())
                .next_back()
                .unwrap_or(line)
                .trim()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep the head and tail of `text` when it exceeds `max_chars`
pub fn truncate(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let head_chars = max_chars / 2;
    let tail_chars = max_chars - head_chars;
    let omitted = total - head_chars - tail_chars;

    let head_end = byte_offset(text, head_chars);
    let tail_start = byte_offset(text, total - tail_chars);
    format!(
        "{}\n\n[... {omitted} characters omitted ...]\n\n{}",
        &text[..head_end],
        &text[tail_start..]
    )
}

/// Clean and bound a transcript for a caller
pub fn render_transcript(raw: &str) -> String {
    truncate(&clean_output(raw), MAX_OUTPUT_CHARS)
}

/// Short single-line preview of a command for logs
pub fn format_command_for_output(command: &str) -> String {
    let head: String = command.chars().take(PREVIEW_SOURCE_CHARS).collect();
    let short = head.split_whitespace().collect::<Vec<_>>().join(" ");

    if short.chars().count() <= PREVIEW_CHARS {
        return short;
    }
    let mut preview: String = short.chars().take(PREVIEW_CHARS - 3).collect();
    preview.push_str("...");
    preview
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(offset, _)| offset)
}

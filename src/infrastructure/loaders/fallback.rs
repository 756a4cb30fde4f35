use super::ExtractError;
use crate::domain::{ports::DocumentLoader, DomainError, TextSegment};

/// Shortest run of printable characters kept from binary content.
const MIN_PRINTABLE_RUN: usize = 4;

const BLOCK_TAGS: [&str; 12] = [
    "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section",
];

/// Best effort for anything without a dedicated loader.
///
/// UTF-8 text is kept as is, with HTML/XML markup stripped. Other bytes are
/// reduced to their printable runs.
pub struct FallbackLoader;

impl FallbackLoader {
    fn extract(source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, ExtractError> {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) if text.contains('\0') => printable_runs(bytes),
            Ok(text) if text.trim_start().starts_with('<') => strip_markup(text),
            Ok(text) => text.to_string(),
            Err(_) => printable_runs(bytes),
        };

        if text.trim().is_empty() {
            return Err(ExtractError::NoText);
        }
        Ok(vec![TextSegment::new(source, text)])
    }
}

impl DocumentLoader for FallbackLoader {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn load(&self, source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, DomainError> {
        Self::extract(source, bytes).map_err(|e| e.into_domain(source))
    }
}

fn strip_markup(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    let mut skip_until: Option<&str> = None;

    while let Some(open) = rest.find('<') {
        if skip_until.is_none() {
            out.push_str(&decode_entities(&rest[..open]));
        }
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = after[..close].trim().to_ascii_lowercase();
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();

        match skip_until {
            Some(end) if tag.starts_with('/') && name == end => skip_until = None,
            Some(_) => {}
            None if !tag.starts_with('/') && (name == "script" || name == "style") => {
                skip_until = Some(if name == "script" { "script" } else { "style" });
            }
            None if BLOCK_TAGS.contains(&name.as_str()) => out.push('\n'),
            None => {}
        }
        rest = &after[close + 1..];
    }
    if skip_until.is_none() {
        out.push_str(&decode_entities(rest));
    }

    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn printable_runs(bytes: &[u8]) -> String {
    byte_runs(bytes).join("\n")
}

/// Text left in a binary file: 8-bit printable runs, then UTF-16LE runs.
///
/// Legacy Office formats keep their text in one of the two encodings.
pub(super) fn binary_text(bytes: &[u8]) -> String {
    let mut runs = byte_runs(bytes);
    runs.extend(utf16_runs(bytes));
    runs.join("\n")
}

fn byte_runs(bytes: &[u8]) -> Vec<String> {
    let lossy = String::from_utf8_lossy(bytes);
    let mut runs = Vec::new();
    let mut current = String::new();

    for c in lossy.chars() {
        if c != char::REPLACEMENT_CHARACTER && (!c.is_control() || c == ' ' || c == '\t') {
            current.push(c);
        } else {
            push_run(&mut current, &mut runs);
        }
    }
    push_run(&mut current, &mut runs);
    runs
}

fn utf16_runs(bytes: &[u8]) -> Vec<String> {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    let mut runs = Vec::new();
    let mut current = String::new();

    for c in char::decode_utf16(units) {
        match c {
            Ok(c) if is_utf16_text(c) => current.push(c),
            _ => push_run(&mut current, &mut runs),
        }
    }
    push_run(&mut current, &mut runs);
    runs
}

// Latin scripts plus typographic quotes, dashes, bullets and ellipses.
fn is_utf16_text(c: char) -> bool {
    const TYPOGRAPHIC: [char; 8] = [
        '\u{2013}', '\u{2014}', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}', '\u{2022}',
        '\u{2026}',
    ];
    (!c.is_control() || c == ' ' || c == '\t') && (c < '\u{0250}' || TYPOGRAPHIC.contains(&c))
}

fn push_run(current: &mut String, runs: &mut Vec<String>) {
    let run = current.trim();
    if run.chars().count() >= MIN_PRINTABLE_RUN {
        runs.push(run.to_string());
    }
    current.clear();
}

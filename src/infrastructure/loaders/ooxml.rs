//! DOCX, XLSX and PPTX extraction straight from the OOXML parts.
//!
//! Pre-2007 binary files are recognised by their OLE header. `.xls` workbooks
//! go through calamine; `.doc` and `.ppt` keep whatever text survives as
//! printable runs.

use calamine::{Reader as _, Xls};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use std::panic::{self, AssertUnwindSafe};

use super::fallback::binary_text;
use super::ExtractError;
use crate::domain::{ports::DocumentLoader, DomainError, TextSegment};

/// Decompressed size cap for a single archive entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn is_ole(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xd0, 0xcf, 0x11, 0xe0])
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    Ok(zip::ZipArchive::new(Cursor::new(bytes))?)
}

/// Best effort for `.doc` and `.ppt`: one segment with the printable text.
fn legacy_text(source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, ExtractError> {
    let text = binary_text(bytes);
    if text.trim().is_empty() {
        return Err(ExtractError::NoText);
    }
    Ok(vec![TextSegment::new(source, text)])
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive.by_name(name)?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::TooLarge {
            name: name.to_string(),
            limit: MAX_XML_ENTRY_BYTES,
        });
    }
    Ok(out)
}

/// Entries `{prefix}{N}.xml`, ordered by N.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<(u32, String)> {
    let mut names: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name.strip_prefix(prefix)?.strip_suffix(".xml")?.parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    names.sort();
    names
}

/// Element names (local, without namespace prefix) that carry text.
struct Markup {
    text: &'static [u8],
    block: &'static [u8],
    tab: Option<&'static [u8]>,
    line_break: &'static [u8],
}

const WORDPROCESSING: Markup = Markup {
    text: b"t",
    block: b"p",
    tab: Some(b"tab"),
    line_break: b"br",
};

const DRAWING: Markup = Markup {
    text: b"t",
    block: b"p",
    tab: None,
    line_break: b"br",
};

fn collect_text(xml: &[u8], markup: &Markup) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == markup.text => in_text = true,
            Event::Text(t) if in_text => out.push_str(&t.unescape()?),
            Event::End(e) => {
                let name = e.local_name();
                if name.as_ref() == markup.text {
                    in_text = false;
                } else if name.as_ref() == markup.block {
                    out.push('\n');
                }
            }
            Event::Empty(e) => {
                let name = e.local_name();
                if name.as_ref() == markup.line_break {
                    out.push('\n');
                } else if Some(name.as_ref()) == markup.tab {
                    out.push('\t');
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}

/// Word documents: the body text of `word/document.xml`, one line per paragraph.
pub struct WordLoader;

impl WordLoader {
    fn extract(source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, ExtractError> {
        if is_ole(bytes) {
            return legacy_text(source, bytes);
        }
        let mut archive = open_archive(bytes)?;
        let xml = read_entry(&mut archive, "word/document.xml")?;
        Ok(vec![TextSegment::new(source, collect_text(&xml, &WORDPROCESSING)?)])
    }
}

impl DocumentLoader for WordLoader {
    fn name(&self) -> &'static str {
        "word"
    }

    fn load(&self, source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, DomainError> {
        Self::extract(source, bytes).map_err(|e| e.into_domain(source))
    }
}

/// PowerPoint decks: one segment per slide.
pub struct PresentationLoader;

impl PresentationLoader {
    fn extract(source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, ExtractError> {
        if is_ole(bytes) {
            return legacy_text(source, bytes);
        }
        let mut archive = open_archive(bytes)?;
        let slides = numbered_entries(&archive, "ppt/slides/slide");

        let mut segments = Vec::with_capacity(slides.len());
        for (number, name) in slides {
            let xml = read_entry(&mut archive, &name)?;
            let text = collect_text(&xml, &DRAWING)?;
            segments.push(TextSegment::new(source, text).with_page(number as usize));
        }
        Ok(segments)
    }
}

impl DocumentLoader for PresentationLoader {
    fn name(&self) -> &'static str {
        "presentation"
    }

    fn load(&self, source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, DomainError> {
        Self::extract(source, bytes).map_err(|e| e.into_domain(source))
    }
}

/// Excel workbooks: one segment per worksheet, a line per row, cells separated by spaces.
pub struct SpreadsheetLoader;

impl SpreadsheetLoader {
    fn extract(source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, ExtractError> {
        if is_ole(bytes) {
            return legacy_workbook(source, bytes);
        }
        let mut archive = open_archive(bytes)?;
        let shared = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
            let xml = read_entry(&mut archive, "xl/sharedStrings.xml")?;
            shared_strings(&xml)?
        } else {
            Vec::new()
        };

        let sheets = numbered_entries(&archive, "xl/worksheets/sheet");
        let mut segments = Vec::new();
        for (number, name) in sheets.into_iter().take(XLSX_MAX_SHEETS) {
            let xml = read_entry(&mut archive, &name)?;
            let text = sheet_text(&xml, &shared)?;
            segments.push(TextSegment::new(source, text).with_section(format!("sheet {number}")));
        }
        Ok(segments)
    }
}

impl DocumentLoader for SpreadsheetLoader {
    fn name(&self) -> &'static str {
        "spreadsheet"
    }

    fn load(&self, source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, DomainError> {
        Self::extract(source, bytes).map_err(|e| e.into_domain(source))
    }
}

/// `.xls` through calamine. A workbook calamine cannot read, or that holds no
/// text, falls back to its printable runs.
fn legacy_workbook(source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, ExtractError> {
    // calamine may panic on corrupt records.
    let parsed = panic::catch_unwind(AssertUnwindSafe(|| xls_sheets(source, bytes)))
        .unwrap_or_else(|_| Err(ExtractError::Xls("parser panicked on malformed input".into())));

    match parsed {
        Ok(segments) if segments.iter().any(|s| !s.text.trim().is_empty()) => Ok(segments),
        parsed => {
            let error = parsed.err().unwrap_or(ExtractError::NoText);
            tracing::debug!(document = source, error = %error, "xls unreadable, keeping printable text");
            legacy_text(source, bytes).map_err(|_| error)
        }
    }
}

fn xls_sheets(source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, ExtractError> {
    let mut workbook = calamine::open_workbook_from_rs::<Xls<_>, _>(Cursor::new(bytes))
        .map_err(|e| ExtractError::Xls(e.to_string()))?;

    let mut segments = Vec::new();
    let names = workbook.sheet_names();
    for (number, name) in names.iter().enumerate().take(XLSX_MAX_SHEETS) {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| ExtractError::Xls(e.to_string()))?;
        let text = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.to_string().trim().to_string())
                    .filter(|cell| !cell.is_empty())
                    .take(XLSX_MAX_CELLS_PER_SHEET)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        segments.push(
            TextSegment::new(source, text).with_section(format!("sheet {}", number + 1)),
        );
    }
    Ok(segments)
}

/// Each `<si>` may hold several rich-text runs; they are concatenated.
fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Text(t) if in_text => current.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn sheet_text(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut value = String::new();
    let mut shared_cell = false;
    let mut in_value = false;
    let mut cells = 0usize;

    loop {
        if cells >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    value.clear();
                    shared_cell = e.attributes().flatten().any(|a| {
                        a.key.local_name().as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Event::Text(t) if in_value => value.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    let cell = if shared_cell {
                        value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i).cloned())
                            .unwrap_or_default()
                    } else {
                        value.trim().to_string()
                    };
                    if !cell.is_empty() {
                        row.push(cell);
                        cells += 1;
                    }
                }
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join(" "));
                        row.clear();
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join(" "));
    }
    Ok(rows.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::loaders::fixtures::zip_archive;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>The capital of France</w:t></w:r><w:r><w:t xml:space="preserve"> is Paris.</w:t></w:r></w:p>
    <w:p><w:r><w:t>Fish &amp; chips</w:t><w:tab/><w:t>are British.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    #[test]
    fn test_docx_paragraphs_become_lines() {
        let bytes = zip_archive(&[("word/document.xml", DOCUMENT_XML)]);
        let segments = WordLoader.load("capital.docx", &bytes).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(
            segments[0].text,
            "The capital of France is Paris.\nFish & chips\tare British."
        );
    }

    #[test]
    fn test_docx_without_body_part_fails() {
        let bytes = zip_archive(&[("word/styles.xml", "<styles/>")]);
        let err = WordLoader.load("odd.docx", &bytes).unwrap_err();
        assert!(matches!(err, DomainError::Extraction { .. }));
    }

    /// An OLE header, padding, then `text` as UTF-16LE.
    fn ole_with_utf16(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
        bytes.extend_from_slice(&[0; 24]);
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(&[0; 16]);
        bytes
    }

    #[test]
    fn test_legacy_doc_keeps_utf16_text() {
        let bytes = ole_with_utf16("The capital of France is Paris.");
        let segments = WordLoader.load("old.doc", &bytes).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "The capital of France is Paris.");
    }

    #[test]
    fn test_legacy_ppt_keeps_utf16_text() {
        let bytes = ole_with_utf16("Quarterly results slide");
        let segments = PresentationLoader.load("old.ppt", &bytes).unwrap();
        assert!(segments[0].text.contains("Quarterly results slide"));
    }

    #[test]
    fn test_legacy_without_text_is_error() {
        let mut bytes = vec![0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
        bytes.extend_from_slice(&[0; 32]);
        let err = WordLoader.load("empty.doc", &bytes).unwrap_err();
        assert!(err.to_string().contains("no extractable text"));
    }

    #[test]
    fn test_unreadable_xls_keeps_printable_text() {
        let mut bytes = vec![0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
        bytes.extend_from_slice(&[0; 32]);
        bytes.extend_from_slice(b"France Paris capital sheet");
        bytes.extend_from_slice(&[0; 16]);

        let segments = SpreadsheetLoader.load("capitals.xls", &bytes).unwrap();
        assert!(segments[0].text.contains("France Paris capital sheet"));
    }

    #[test]
    fn test_unreadable_xls_without_text_fails() {
        let mut bytes = vec![0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
        bytes.extend_from_slice(&[0; 32]);
        let err = SpreadsheetLoader.load("broken.xls", &bytes).unwrap_err();
        match err {
            DomainError::Extraction { document, .. } => assert_eq!(document, "broken.xls"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_pptx_slides_in_numeric_order() {
        let slide = |text: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
            )
        };
        let (s1, s2, s10) = (slide("one"), slide("two"), slide("ten"));
        let bytes = zip_archive(&[
            ("ppt/slides/slide10.xml", s10.as_str()),
            ("ppt/slides/slide2.xml", s2.as_str()),
            ("ppt/slides/slide1.xml", s1.as_str()),
            ("ppt/slides/_rels/slide1.xml.rels", "<Relationships/>"),
        ]);

        let segments = PresentationLoader.load("deck.pptx", &bytes).unwrap();
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "ten"]);
        assert_eq!(segments[2].metadata.page, Some(10));
    }

    #[test]
    fn test_xlsx_rows_and_cell_types() {
        let shared = r#"<sst xmlns="x"><si><t>country</t></si><si><t>capital</t></si><si><r><t>Fr</t></r><r><t>ance</t></r></si></sst>"#;
        let sheet = r#"<worksheet xmlns="x"><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="inlineStr"><is><t>population</t></is></c></row>
            <row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2" t="str"><v>Paris</v></c><c r="C2"><v>68000000</v></c></row>
        </sheetData></worksheet>"#;
        let bytes = zip_archive(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);

        let segments = SpreadsheetLoader.load("capitals.xlsx", &bytes).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(
            segments[0].text,
            "country capital population\nFrance Paris 68000000"
        );
        assert_eq!(segments[0].metadata.section.as_deref(), Some("sheet 1"));
    }

    #[test]
    fn test_xlsx_without_shared_strings() {
        let sheet = r#"<worksheet><sheetData><row><c><v>42</v></c></row></sheetData></worksheet>"#;
        let bytes = zip_archive(&[("xl/worksheets/sheet1.xml", sheet)]);
        let segments = SpreadsheetLoader.load("numbers.xlsx", &bytes).unwrap();
        assert_eq!(segments[0].text, "42");
    }

    #[test]
    fn test_not_a_zip_fails() {
        let err = SpreadsheetLoader.load("fake.xlsx", b"plain text").unwrap_err();
        assert!(matches!(err, DomainError::Extraction { .. }));
    }
}

use super::ExtractError;
use crate::domain::{ports::DocumentLoader, DomainError, TextSegment};

/// Plain text and Markdown. The bytes must be UTF-8.
pub struct TextLoader;

impl TextLoader {
    fn extract(source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, ExtractError> {
        let text = std::str::from_utf8(bytes)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Ok(vec![TextSegment::new(source, text)])
    }
}

impl DocumentLoader for TextLoader {
    fn name(&self) -> &'static str {
        "text"
    }

    fn load(&self, source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, DomainError> {
        Self::extract(source, bytes).map_err(|e| e.into_domain(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_byte_order_mark() {
        let segments = TextLoader.load("notes.md", "\u{feff}# Title".as_bytes()).unwrap();
        assert_eq!(segments[0].text, "# Title");
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let err = TextLoader.load("latin1.txt", &[0x63, 0x61, 0x66, 0xe9]).unwrap_err();
        assert!(matches!(err, DomainError::Extraction { .. }));
        assert!(err.to_string().contains("latin1.txt"));
    }
}

use super::ExtractError;
use crate::domain::{ports::DocumentLoader, DomainError, TextSegment};

/// One segment per record, each field rendered as `header: value` on its own line.
pub struct CsvLoader;

impl CsvLoader {
    fn extract(source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, ExtractError> {
        let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
        let mut reader = ::csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);
        let headers = reader.headers()?.clone();

        let mut segments = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let text = record
                .iter()
                .enumerate()
                .map(|(column, value)| {
                    let header = headers
                        .get(column)
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("column {}", column + 1));
                    format!("{}: {}", header, value.trim())
                })
                .collect::<Vec<_>>()
                .join("\n");
            segments.push(TextSegment::new(source, text).with_section(format!("row {}", row + 1)));
        }
        Ok(segments)
    }
}

impl DocumentLoader for CsvLoader {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn load(&self, source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, DomainError> {
        Self::extract(source, bytes).map_err(|e| e.into_domain(source))
    }
}

//! Overlapping text splitter.
//!
//! Windows are at most `chunk_size` characters long and consecutive windows
//! share exactly `chunk_overlap` characters. Each window ends at the latest
//! boundary of the strongest kind available: paragraph, line, sentence,
//! word. Without any boundary the window is cut at `chunk_size`.
//!
//! Lengths are counted in `char`s, so windows never split a code point.

use crate::domain::{DomainError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
}

impl Boundary {
    const PREFERENCE: [Boundary; 4] = [
        Boundary::Paragraph,
        Boundary::Line,
        Boundary::Sentence,
        Boundary::Word,
    ];

    /// Whether a window ending right before `chars[end]` ends on this boundary.
    fn ends_at(self, chars: &[char], end: usize) -> bool {
        let last = chars[end - 1];
        match self {
            Boundary::Paragraph => end >= 2 && last == '\n' && chars[end - 2] == '\n',
            Boundary::Line => last == '\n',
            Boundary::Sentence => {
                end >= 2 && last.is_whitespace() && matches!(chars[end - 2], '.' | '!' | '?')
            }
            Boundary::Word => last.is_whitespace(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DomainError::validation("chunk_size must be greater than zero"));
        }
        if chunk_overlap >= chunk_size {
            return Err(DomainError::validation(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Lazily splits `text`. Blank text yields no chunks.
    pub fn split<'a>(&self, text: &'a str) -> Chunks<'a> {
        let blank = text.trim().is_empty();
        Chunks {
            text,
            offsets: if blank {
                Vec::new()
            } else {
                text.char_indices().map(|(i, _)| i).collect()
            },
            chars: if blank { Vec::new() } else { text.chars().collect() },
            start: 0,
            done: blank,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Iterator over the windows of one text, see [`TextSplitter::split`].
#[derive(Debug)]
pub struct Chunks<'a> {
    text: &'a str,
    offsets: Vec<usize>,
    chars: Vec<char>,
    start: usize,
    done: bool,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl<'a> Chunks<'a> {
    fn byte_offset(&self, char_index: usize) -> usize {
        self.offsets
            .get(char_index)
            .copied()
            .unwrap_or(self.text.len())
    }

    /// Latest preferred end in `(start + overlap, limit]`, or `limit` for a hard cut.
    fn find_end(&self, limit: usize) -> usize {
        let lowest = self.start + self.chunk_overlap + 1;
        Boundary::PREFERENCE
            .iter()
            .find_map(|boundary| {
                (lowest..=limit)
                    .rev()
                    .find(|&end| boundary.ends_at(&self.chars, end))
            })
            .unwrap_or(limit)
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let total = self.chars.len();
        let limit = self.start + self.chunk_size;
        let end = if limit >= total {
            self.done = true;
            total
        } else {
            self.find_end(limit)
        };

        let text = self.text;
        let piece = &text[self.byte_offset(self.start)..self.byte_offset(end)];
        if !self.done {
            self.start = end - self.chunk_overlap;
        }
        Some(piece)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

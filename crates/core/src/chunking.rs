use crate::extractor::{PageText, Section};
use crate::models::{Chunk, ChunkingOptions};
use sha2::{Digest, Sha256};

/// Lazy sliding-window chunker over per-page text.
///
/// Windows are `chunk_chars` characters wide and advance by
/// `chunk_chars - overlap_chars`; a non-final window whose trimmed length is
/// below `min_trailing_chars` is merged backward by re-windowing from
/// `end - overlap` instead of being emitted. Windows never cross a page
/// boundary, so every chunk carries exactly one source page.
pub struct PageWindows {
    source: String,
    options: ChunkingOptions,
    pages: std::vec::IntoIter<PageText>,
    current: Option<PageCursor>,
    sequence: u64,
}

struct PageCursor {
    number: u32,
    chars: Vec<char>,
    start: usize,
}

impl PageWindows {
    pub fn new(source: impl Into<String>, pages: Vec<PageText>, options: ChunkingOptions) -> Self {
        Self {
            source: source.into(),
            options,
            pages: pages.into_iter(),
            current: None,
            sequence: 0,
        }
    }
}

impl Iterator for PageWindows {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            let mut cursor = match self.current.take() {
                Some(cursor) => cursor,
                None => {
                    let page = self.pages.next()?;
                    let trimmed = page.text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    PageCursor {
                        number: page.number,
                        chars: trimmed.chars().collect(),
                        start: 0,
                    }
                }
            };

            let len = cursor.chars.len();
            let end = (cursor.start + self.options.chunk_chars).min(len);
            let piece: String = cursor.chars[cursor.start..end].iter().collect();
            let number = cursor.number;
            let is_final = end == len;
            // Guarantees forward progress even when overlap >= chunk size.
            let next_start = end
                .saturating_sub(self.options.overlap_chars)
                .max(cursor.start + 1);

            if !is_final {
                cursor.start = next_start;
                self.current = Some(cursor);
                // An undersized non-final window is merged backward instead
                // of being emitted.
                if piece.trim().chars().count() < self.options.min_trailing_chars {
                    continue;
                }
            }

            let sequence = self.sequence;
            self.sequence += 1;

            return Some(Chunk {
                id: make_chunk_id(&self.source, Some(number), sequence, &piece),
                text: piece,
                page: Some(number),
                source: self.source.clone(),
                sequence_index: sequence,
            });
        }
    }
}

/// Coarse fallback used when page windowing yields nothing: one chunk per
/// detected section, with no page provenance.
pub fn section_chunks(sections: &[Section], source: &str) -> Vec<Chunk> {
    sections
        .iter()
        .filter(|section| !section.title.trim().is_empty() || !section.body.trim().is_empty())
        .enumerate()
        .map(|(index, section)| {
            let body = section.body.trim();
            let text = if body.is_empty() {
                section.title.clone()
            } else {
                format!("{}\n{}", section.title, body)
            };
            let sequence = index as u64;

            Chunk {
                id: make_chunk_id(source, None, sequence, &text),
                text,
                page: None,
                source: source.to_string(),
                sequence_index: sequence,
            }
        })
        .collect()
}

pub fn make_chunk_id(source: &str, page: Option<u32>, sequence: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(page.unwrap_or(0).to_le_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

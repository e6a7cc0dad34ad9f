//! Overlapping, boundary-aware text splitting.

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

/// Break candidates, strongest first. A break lands right after the separator.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be greater than 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split every document, preserving document order and metadata lineage.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents.iter().flat_map(|d| self.split_document(d)).collect();
        debug!(documents = documents.len(), chunks = chunks.len(), "split documents");
        chunks
    }

    pub fn split_document(&self, document: &Document) -> Vec<Chunk> {
        let spans = self.spans(&document.text);
        let total = spans.len();
        let chars: Vec<char> = document.text.chars().collect();
        spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".into(), index.to_string());
                metadata.insert("total_chunks".into(), total.to_string());
                metadata.insert("start_index".into(), start.to_string());
                Chunk {
                    id: format!("{}:{}", document.source_path, index),
                    text: chars[start..end].iter().collect(),
                    metadata,
                }
            })
            .collect()
    }

    /// Character ranges `[start, end)` of each chunk of `text`.
    pub fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len <= self.chunk_size {
            return vec![(0, len)];
        }

        let min_advance = (self.chunk_size / 2).max(self.chunk_overlap + 1);
        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            if len - start <= self.chunk_size {
                spans.push((start, len));
                break;
            }
            let limit = start + self.chunk_size;
            let end = find_break(&chars, start + min_advance, limit).unwrap_or(limit);
            spans.push((start, end));
            // end > start + overlap, so start strictly increases
            start = end - self.chunk_overlap;
        }
        spans
    }
}

/// Latest break position in `[lo, hi]` for the strongest separator present.
fn find_break(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    SEPARATORS.iter().find_map(|sep| {
        let sep: Vec<char> = sep.chars().collect();
        (lo..=hi)
            .rev()
            .find(|&end| end >= sep.len() && chars[end - sep.len()..end] == sep[..])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(Chunker::new(0, 0), Err(Error::InvalidConfig(_))));
        assert!(matches!(Chunker::new(100, 100), Err(Error::InvalidConfig(_))));
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn prefers_paragraph_over_word_boundary() {
        let chunker = Chunker::new(20, 4).unwrap();
        // paragraph break ends at 12, spaces continue up to the limit
        let text = "aaaa bbbbb\n\ncc dd ee ff gg hh";
        let spans = chunker.spans(text);
        assert_eq!(spans[0], (0, 12));
        assert_eq!(spans[1].0, 8);
    }

    #[test]
    fn hard_cut_without_boundaries() {
        let chunker = Chunker::new(10, 3).unwrap();
        let spans = chunker.spans(&"x".repeat(25));
        assert_eq!(spans, vec![(0, 10), (7, 17), (14, 24), (21, 25)]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunker = Chunker::new(4, 1).unwrap();
        let spans = chunker.spans("ééééééé");
        assert_eq!(spans, vec![(0, 4), (3, 7)]);
    }
}

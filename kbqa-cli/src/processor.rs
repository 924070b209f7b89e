//! Document loading and recursive character splitting.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use kbqa_retrieval::DocumentChunk;
use tracing::{error, info, warn};

use crate::config::DocumentsConfig;

/// Metadata key holding a chunk's position within its source file.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Split points tried in order, coarsest first. Text that still does not
/// fit after the last one is cut by character count.
const SEPARATORS: [&str; 9] = ["\n\n", "\n", "。", "！", "？", ". ", "! ", "? ", " "];

/// Loads text files and splits them into overlapping chunks.
///
/// Lengths are counted in characters, never bytes, so multi-byte text is
/// always cut on a character boundary.
///
/// # Example
///
/// ```rust,ignore
/// use kbqa_cli::DocumentProcessor;
///
/// let processor = DocumentProcessor::new(800, 150);
/// let chunks = processor.load_and_split(&["documents/handbook.txt".into()]);
/// ```
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl DocumentProcessor {
    /// Create a processor.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: characters shared by consecutive chunks; clamped
    ///   below `chunk_size`
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }

    pub fn from_config(config: &DocumentsConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Read every file and split its content into chunks.
    ///
    /// Each chunk carries the file path under `source` and its position in
    /// the file under `chunk_index`. Missing, unreadable and empty files
    /// are logged and skipped.
    pub fn load_and_split(&self, file_paths: &[PathBuf]) -> Vec<DocumentChunk> {
        info!(files = file_paths.len(), "loading documents");
        let mut all = Vec::new();

        for path in file_paths {
            let Some(content) = read_document(path) else {
                continue;
            };
            let source = path.display().to_string();
            let chunks: Vec<DocumentChunk> = self
                .split_text(&content)
                .into_iter()
                .enumerate()
                .map(|(i, text)| {
                    DocumentChunk::with_source(text, source.as_str())
                        .with_metadata(CHUNK_INDEX_KEY, i.to_string())
                })
                .collect();
            info!(
                path = %source,
                chars = char_len(&content),
                chunk_count = chunks.len(),
                "split document"
            );
            all.extend(chunks);
        }

        info!(chunk_count = all.len(), "document processing finished");
        all
    }

    /// Split `text` into chunks of at most `chunk_size` characters.
    ///
    /// Paragraphs are kept whole when they fit, then lines, sentences and
    /// words. Neighbouring pieces are packed together and consecutive
    /// chunks repeat up to `chunk_overlap` characters. Chunks are trimmed;
    /// blank ones are dropped.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        split_recursive(text, self.chunk_size, self.chunk_overlap, &SEPARATORS)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }
}

fn read_document(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.is_empty() => {
            warn!(path = %path.display(), "file is empty, skipped");
            None
        }
        Ok(content) => Some(content),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            error!(path = %path.display(), "file not found");
            None
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read file");
            None
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn split_recursive(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }
    let Some((separator, rest)) = separators.split_first() else {
        return split_by_size(text, chunk_size, chunk_overlap);
    };
    if !text.contains(*separator) {
        return split_recursive(text, chunk_size, chunk_overlap, rest);
    }

    let mut chunks = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();
    for segment in split_keeping_separator(text, separator) {
        if char_len(segment) <= chunk_size {
            fitting.push(segment);
            continue;
        }
        chunks.extend(merge(&fitting, chunk_size, chunk_overlap));
        fitting.clear();
        chunks.extend(split_recursive(segment, chunk_size, chunk_overlap, rest));
    }
    chunks.extend(merge(&fitting, chunk_size, chunk_overlap));
    chunks
}

/// Pack pieces no longer than `chunk_size` into chunks, carrying a tail of
/// at most `chunk_overlap` characters into the next chunk.
fn merge(pieces: &[&str], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut window_len = 0;

    for &piece in pieces {
        let len = char_len(piece);
        if window_len + len > chunk_size && !window.is_empty() {
            chunks.push(window.iter().map(|(p, _)| *p).collect::<String>());
            while let Some(&(_, front_len)) = window.front() {
                if window_len <= chunk_overlap && window_len + len <= chunk_size {
                    break;
                }
                window_len -= front_len;
                window.pop_front();
            }
        }
        window.push_back((piece, len));
        window_len += len;
    }

    if !window.is_empty() {
        chunks.push(window.iter().map(|(p, _)| *p).collect::<String>());
    }
    chunks
}

/// Split at `separator`, keeping it attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Fixed windows of `chunk_size` characters advancing by
/// `chunk_size - chunk_overlap`.
fn split_by_size(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let processor = DocumentProcessor::new(100, 10);
        assert_eq!(processor.split_text("  hello world \n"), vec!["hello world"]);
        assert!(processor.split_text(" \n\n ").is_empty());
    }

    #[test]
    fn paragraphs_split_before_words() {
        let processor = DocumentProcessor::new(12, 0);
        let chunks = processor.split_text("first para\n\nsecond para\n\nthird");
        assert_eq!(chunks, vec!["first para", "second para", "third"]);
    }

    #[test]
    fn words_are_packed_with_overlap() {
        let processor = DocumentProcessor::new(10, 4);
        let chunks = processor.split_text("one two three four five six");
        assert_eq!(chunks, vec!["one two", "two three", "four five", "six"]);
    }

    #[test]
    fn multibyte_text_without_separators_is_cut_on_char_boundaries() {
        let processor = DocumentProcessor::new(10, 3);
        let text = "知识库问答系统".repeat(5);

        let chunks = processor.split_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 10);
        }
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(pair[0].chars().count() - 3).collect();
            assert!(pair[1].starts_with(&tail));
        }
        let first: String = text.chars().take(10).collect();
        assert_eq!(chunks[0], first);
    }

    #[test]
    fn chinese_sentences_split_at_full_stops() {
        let processor = DocumentProcessor::new(8, 0);
        let chunks = processor.split_text("今天天气很好。我们去公园散步。");
        assert_eq!(chunks, vec!["今天天气很好。", "我们去公园散步。"]);
    }

    #[test]
    fn every_chunk_respects_the_size_limit() {
        let processor = DocumentProcessor::new(50, 10);
        let text = "A fairly long sentence about retrieval. Another one follows here!\n\
                    Then a new line with more words to pack together.\n\n\
                    averyveryverylongwordwithoutanyspacesthatmustbecutbycharactercountalone";
        for chunk in processor.split_text(text) {
            assert!(chunk.chars().count() <= 50, "{chunk:?}");
        }
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let processor = DocumentProcessor::new(5, 9);
        let chunks = processor.split_text("abcdefghij");
        assert_eq!(chunks.first().map(String::as_str), Some("abcde"));
        assert!(chunks.len() <= 6);
    }

    #[test]
    fn load_skips_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        let empty = dir.path().join("empty.txt");
        let missing = dir.path().join("missing.txt");
        std::fs::write(&good, "alpha beta\n\ngamma delta").unwrap();
        std::fs::write(&empty, "").unwrap();

        let processor = DocumentProcessor::new(11, 0);
        let chunks = processor.load_and_split(&[missing, empty, good.clone()]);

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha beta", "gamma delta"]);
        let source = good.display().to_string();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.source(), Some(source.as_str()));
            assert_eq!(chunk.metadata.get(CHUNK_INDEX_KEY), Some(&i.to_string()));
        }
    }

    #[test]
    fn chunk_indexes_restart_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "one\n\ntwo").unwrap();
        std::fs::write(&b, "six").unwrap();

        let chunks = DocumentProcessor::new(4, 0).load_and_split(&[a, b]);

        let indexes: Vec<&str> =
            chunks.iter().map(|c| c.metadata[CHUNK_INDEX_KEY].as_str()).collect();
        assert_eq!(indexes, vec!["0", "1", "0"]);
    }
}

//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and three implementations:
//!
//! - [`TextChunker`] — recursive separator-based splitting with overlap
//! - [`MarkdownChunker`] — keeps headings attached to their content blocks
//! - [`CodeChunker`] — splits on function/class definition boundaries

use std::sync::LazyLock;

use regex::Regex;

use crate::document::{Chunk, Document};

/// A strategy for splitting raw text into chunk strings.
///
/// Calls are stateless: the same input always produces the same output.
/// Implementations return an empty `Vec` for empty or whitespace-only input.
pub trait Chunker: Send + Sync {
    /// Split text into chunk strings suitable for embedding.
    fn split(&self, text: &str) -> Vec<String>;
}

/// Split a document and assign ordinal metadata to each chunk.
pub fn chunk_document(document: &Document, chunker: &dyn Chunker) -> Vec<Chunk> {
    let pieces = chunker.split(&document.text);
    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk { text, index, total_chunks: total })
        .collect()
}

/// Separator priority from coarsest to finest. The empty string means
/// character-level splitting, the last resort.
const DEFAULT_SEPARATORS: &[&str] =
    &["\n\n\n", "\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " ", ""];

/// Punctuation that must not start a chunk after a split.
const ORPHAN_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}'];

/// Splits prose into overlapping chunks along semantic boundaries.
///
/// The input is normalized first (space runs collapsed, 3+ newlines reduced
/// to 2, per-line whitespace stripped, control characters removed). Splitting
/// then tries the coarsest separator that yields pieces within `chunk_size`,
/// falling back progressively finer only where needed. The trailing
/// `chunk_overlap` characters of each chunk are carried into the start of the
/// next one so meaning survives the boundary.
///
/// # Example
///
/// ```rust,ignore
/// use ragpipe::TextChunker;
///
/// let chunker = TextChunker::new(1000, 200);
/// let chunks = chunker.split(&raw_text);
/// ```
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// Create a new `TextChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk
    /// * `chunk_overlap` — number of trailing characters carried into the next chunk
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Chunker for TextChunker {
    fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return Vec::new();
        }

        let raw = if char_len(&cleaned) <= self.chunk_size {
            vec![cleaned]
        } else {
            split_recursive(&cleaned, self.chunk_size, self.chunk_overlap, DEFAULT_SEPARATORS)
        };

        raw.iter().map(|chunk| post_process_chunk(chunk)).filter(|c| !c.is_empty()).collect()
    }
}

/// Normalize text before chunking: strip control characters, trim each line,
/// collapse runs of spaces, and reduce 3+ consecutive newlines to exactly 2.
fn clean_text(text: &str) -> String {
    let printable: String =
        text.chars().filter(|c| !c.is_control() || matches!(c, '\n' | '\t')).collect();

    let mut out = String::with_capacity(printable.len());
    let mut blank_run = 0usize;
    for line in printable.lines() {
        let mut collapsed = String::with_capacity(line.len());
        let mut prev_space = false;
        for ch in line.trim().chars() {
            if ch == ' ' || ch == '\t' {
                if !prev_space {
                    collapsed.push(' ');
                }
                prev_space = true;
            } else {
                collapsed.push(ch);
                prev_space = false;
            }
        }

        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }

        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&collapsed);
    }

    out.trim().to_string()
}

/// Strip leading orphaned punctuation left behind by separator splits.
fn post_process_chunk(chunk: &str) -> String {
    let mut trimmed = chunk.trim();
    while let Some(first) = trimmed.chars().next() {
        if ORPHAN_PUNCTUATION.contains(&first) {
            trimmed = trimmed[first.len_utf8()..].trim_start();
        } else {
            break;
        }
    }
    trimmed.to_string()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Return the last `n` characters of `s` (the whole string if shorter).
fn tail_chars(s: &str, n: usize) -> String {
    let len = char_len(s);
    if len <= n {
        return s.to_string();
    }
    s.chars().skip(len - n).collect()
}

/// Split `text` at `separator`, keeping the separator attached to the
/// preceding piece.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        pieces.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

/// Character-level splitting with overlap, the finest fallback.
fn split_by_chars(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

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

/// Merge small pieces into chunks that respect `chunk_size`, carrying the
/// trailing `chunk_overlap` characters of each finished chunk into the next.
fn merge_with_overlap(pieces: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        let piece_len = char_len(piece);
        if !current.is_empty() && char_len(&current) + piece_len > chunk_size {
            let tail = tail_chars(&current, chunk_overlap);
            chunks.push(std::mem::take(&mut current));
            // Overlap is dropped when it would push the next chunk over budget.
            if char_len(&tail) + piece_len <= chunk_size {
                current = tail;
            }
        }
        current.push_str(piece);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split text with the coarsest separator first, recursing into finer
/// separators only for pieces that still exceed `chunk_size`.
fn split_recursive(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    let Some((separator, finer)) = separators.split_first() else {
        return split_by_chars(text, chunk_size, chunk_overlap);
    };
    if separator.is_empty() {
        return split_by_chars(text, chunk_size, chunk_overlap);
    }

    let pieces = split_keeping_separator(text, separator);

    let mut chunks = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    for piece in pieces {
        if char_len(piece) > chunk_size {
            if !pending.is_empty() {
                chunks.extend(merge_with_overlap(&pending, chunk_size, chunk_overlap));
                pending.clear();
            }
            chunks.extend(split_recursive(piece, chunk_size, chunk_overlap, finer));
        } else {
            pending.push(piece.to_string());
        }
    }
    if !pending.is_empty() {
        chunks.extend(merge_with_overlap(&pending, chunk_size, chunk_overlap));
    }
    chunks
}

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+)$").expect("valid heading pattern"));

/// Splits markdown-style text while keeping headings attached to their content.
///
/// Sections that fit within `chunk_size` are kept as one unit. Oversized
/// sections are split recursively with the heading line prefixed to the first
/// sub-chunk and a `[Continued: <heading>]` label prefixed to continuations,
/// so every chunk still names the section it came from.
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    chunk_size: usize,
    base: TextChunker,
}

impl MarkdownChunker {
    /// Create a new `MarkdownChunker`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, base: TextChunker::new(chunk_size, chunk_overlap) }
    }
}

impl Chunker for MarkdownChunker {
    fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let headings: Vec<_> = HEADING.captures_iter(text).collect();
        if headings.is_empty() {
            return self.base.split(text);
        }

        let mut chunks = Vec::new();
        let mut prev_end = 0;

        for (i, captures) in headings.iter().enumerate() {
            let heading_match = captures.get(0).expect("capture group 0 always present");

            // Content before the first heading is split as plain prose.
            if heading_match.start() > prev_end {
                let pre_content = text[prev_end..heading_match.start()].trim();
                if !pre_content.is_empty() {
                    chunks.extend(self.base.split(pre_content));
                }
            }

            let next_start = headings
                .get(i + 1)
                .and_then(|c| c.get(0))
                .map_or(text.len(), |m| m.start());
            let section = text[heading_match.start()..next_start].trim();

            if char_len(section) <= self.chunk_size {
                if !section.is_empty() {
                    chunks.push(section.to_string());
                }
            } else {
                let heading_line = heading_match.as_str();
                let heading_text = captures.get(2).map_or("", |m| m.as_str());
                let body = text[heading_match.end()..next_start].trim();

                for (j, sub_chunk) in self.base.split(body).into_iter().enumerate() {
                    if j == 0 {
                        chunks.push(format!("{heading_line}\n\n{sub_chunk}"));
                    } else {
                        chunks.push(format!("[Continued: {heading_text}]\n\n{sub_chunk}"));
                    }
                }
            }

            prev_end = next_start;
        }

        chunks
    }
}

static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:pub\s+)?(?:async\s+)?fn\s+\w+|^class\s+\w+|^(?:async\s+)?def\s+\w+|^(?:export\s+)?function\s+\w+",
    )
    .expect("valid definition pattern")
});

/// Splits source code on function/class definition boundaries.
///
/// Each definition becomes one chunk when it fits in `chunk_size`. When no
/// definitions are found, or a single definition exceeds the budget, the
/// chunker falls back to size-bounded line grouping with a small line-count
/// overlap.
#[derive(Debug, Clone)]
pub struct CodeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl CodeChunker {
    /// Create a new `CodeChunker`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }

    /// Group lines into chunks that respect `chunk_size`, keeping a few
    /// trailing lines of overlap between consecutive chunks.
    fn split_by_lines(&self, code: &str) -> Vec<String> {
        let overlap_lines = self.chunk_overlap / 50;
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_size = 0usize;

        for line in code.lines() {
            let line_size = char_len(line) + 1;
            if current_size + line_size > self.chunk_size && !current.is_empty() {
                chunks.push(current.join("\n"));
                let keep = current.len().saturating_sub(overlap_lines);
                current.drain(..keep);
                current_size = current.iter().map(|l| char_len(l) + 1).sum();
            }
            current.push(line);
            current_size += line_size;
        }

        if !current.is_empty() {
            chunks.push(current.join("\n"));
        }
        chunks
    }
}

impl Chunker for CodeChunker {
    fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let matches: Vec<_> = DEFINITION.find_iter(text).collect();
        if matches.is_empty() {
            return self.split_by_lines(text);
        }

        let mut chunks = Vec::new();

        // Module-level code before the first definition.
        let first_start = matches[0].start();
        if first_start > 0 {
            let preamble = text[..first_start].trim();
            if !preamble.is_empty() {
                chunks.push(preamble.to_string());
            }
        }

        for (i, definition) in matches.iter().enumerate() {
            let next_start = matches.get(i + 1).map_or(text.len(), |m| m.start());
            let body = text[definition.start()..next_start].trim();
            if body.is_empty() {
                continue;
            }

            if char_len(body) <= self.chunk_size {
                chunks.push(body.to_string());
            } else {
                chunks.extend(self.split_by_lines(body));
            }
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunker = TextChunker::new(100, 20);
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("   \n\n  ").is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let chunker = TextChunker::new(100, 20);
        let chunks = chunker.split("A short paragraph.");
        assert_eq!(chunks, vec!["A short paragraph.".to_string()]);
    }

    #[test]
    fn cleaning_collapses_spaces_and_newlines() {
        let chunker = TextChunker::new(1000, 0);
        let chunks = chunker.split("first   line\n\n\n\nsecond  line");
        assert_eq!(chunks, vec!["first line\n\nsecond line".to_string()]);
    }

    #[test]
    fn cleaning_strips_control_characters() {
        let chunker = TextChunker::new(1000, 0);
        let chunks = chunker.split("hel\u{0000}lo wor\u{0007}ld");
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn chunks_respect_size_bound() {
        let chunker = TextChunker::new(50, 10);
        let text = "One sentence here. Another sentence follows. And one more for good measure. \
                    The text keeps going with yet another sentence. Still more text to split."
            .to_string();
        let chunks = chunker.split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn paragraph_boundaries_are_preferred() {
        let chunker = TextChunker::new(40, 0);
        let chunks = chunker.split("First paragraph text.\n\nSecond paragraph text.");
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("First paragraph"));
        assert!(chunks[1].starts_with("Second paragraph"));
    }

    #[test]
    fn overlap_carries_trailing_context() {
        let chunker = TextChunker::new(30, 10);
        let chunks = chunker.split("aaaa bbbb cccc dddd eeee ffff gggg hhhh iiii jjjj");
        assert!(chunks.len() > 1);
        // The tail of each chunk reappears at the start of the next one.
        for window in chunks.windows(2) {
            let tail = tail_chars(&window[0], 10);
            assert!(
                window[1].starts_with(tail.trim_start()),
                "no overlap between {:?} and {:?}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn orphan_punctuation_is_stripped() {
        assert_eq!(post_process_chunk(". leading dot"), "leading dot");
        assert_eq!(post_process_chunk(",;: several"), "several");
        assert_eq!(post_process_chunk("clean text"), "clean text");
    }

    #[test]
    fn unsplittable_token_falls_back_to_characters() {
        let chunker = TextChunker::new(10, 2);
        let chunks = chunker.split(&"x".repeat(35));
        assert!(chunks.len() >= 4);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 10);
        }
    }

    #[test]
    fn markdown_heading_stays_with_its_content() {
        let chunker = MarkdownChunker::new(200, 20);
        let text = "# Title\n\nSome intro text.\n\n## Details\n\nDetail text here.";
        let chunks = chunker.split(text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("# Title"));
        assert!(chunks[0].contains("Some intro text."));
        assert!(chunks[1].starts_with("## Details"));
    }

    #[test]
    fn oversized_section_gets_continuation_labels() {
        let chunker = MarkdownChunker::new(60, 0);
        let body = "First block of section text.\n\nSecond block of section text.\n\nThird block here.";
        let text = format!("## Long Section\n\n{body}");
        let chunks = chunker.split(&text);
        assert!(chunks.len() > 1);
        assert!(chunks[0].starts_with("## Long Section"));
        for chunk in &chunks[1..] {
            assert!(chunk.starts_with("[Continued: Long Section]"), "missing label: {chunk:?}");
        }
    }

    #[test]
    fn markdown_without_headings_uses_plain_splitting() {
        let chunker = MarkdownChunker::new(1000, 0);
        let chunks = chunker.split("Just plain text without any headings.");
        assert_eq!(chunks, vec!["Just plain text without any headings.".to_string()]);
    }

    #[test]
    fn code_splits_on_definitions() {
        let chunker = CodeChunker::new(200, 50);
        let code = "use std::fmt;\n\nfn first() {\n    body();\n}\n\nfn second() {\n    body();\n}\n";
        let chunks = chunker.split(code);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].starts_with("use std::fmt;"));
        assert!(chunks[1].starts_with("fn first"));
        assert!(chunks[2].starts_with("fn second"));
    }

    #[test]
    fn code_without_definitions_groups_lines() {
        let chunker = CodeChunker::new(20, 0);
        let code = "let a = 1;\nlet b = 2;\nlet c = 3;\nlet d = 4;";
        let chunks = chunker.split(code);
        assert!(chunks.len() > 1);
        let joined = chunks.join("\n");
        assert!(joined.contains("let a = 1;"));
        assert!(joined.contains("let d = 4;"));
    }

    #[test]
    fn python_definitions_are_recognized() {
        let chunker = CodeChunker::new(200, 0);
        let code = "import os\n\ndef handler(x):\n    return x\n\nclass Worker:\n    pass\n";
        let chunks = chunker.split(code);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].starts_with("def handler"));
        assert!(chunks[2].starts_with("class Worker"));
    }
}

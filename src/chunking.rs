//! Chunking engine
//!
//! Splits page texts into overlapping, page- and chapter-aware chunks.
//! The pipeline is ensure-length (no segment longer than `chunk_size`),
//! group (pack segments up to `chunk_size`, seeding overlap from the tail
//! of the previous chunk), then chapter annotation.

use std::collections::BTreeSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, VellumError};

/// Chapter labels longer than this are truncated
const CHAPTER_LABEL_MAX: usize = 500;
/// Truncation target for oversized chapter labels
const CHAPTER_LABEL_TRUNCATED: usize = 450;

/// A chunk of text with its positional metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text, trimmed, never empty
    pub text: String,
    /// Pages covered by the chunk: sorted, deduplicated, 1-based
    pub pages: Vec<u32>,
    /// Chapter labels active within the chunk's lines
    pub chapters: Vec<String>,
}

/// Pluggable chapter-heading recognition
pub trait ChapterPolicy: Send + Sync {
    /// Whether a trimmed, non-empty line starts a chapter
    fn is_chapter_start(&self, line: &str) -> bool;
}

static ROMAN_NUMERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[IVXLCDM]+\b").expect("roman numeral regex"));

/// Default policy: a line starting with "capítulo" (case-insensitive) or a
/// Roman-numeral token opens a chapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadingPolicy;

impl ChapterPolicy for HeadingPolicy {
    fn is_chapter_start(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }
        if line.to_lowercase().starts_with("capítulo") {
            return true;
        }
        ROMAN_NUMERAL.is_match(line)
    }
}

/// Text chunker with optional overlap and chapter detection
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    detect_chapters: bool,
    policy: Arc<dyn ChapterPolicy>,
}

impl TextChunker {
    /// Default maximum chunk length in characters
    pub const DEFAULT_CHUNK_SIZE: usize = 2000;

    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(VellumError::InvalidInput(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(VellumError::InvalidInput(
                "overlap must be less than chunk_size".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            overlap,
            detect_chapters: true,
            policy: Arc::new(HeadingPolicy),
        })
    }

    pub fn with_chapter_detection(mut self, detect: bool) -> Self {
        self.detect_chapters = detect;
        self
    }

    pub fn with_chapter_policy(mut self, policy: Arc<dyn ChapterPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split page texts into chunks with page and chapter metadata
    pub fn chunk(&self, pages: &[String]) -> Vec<Chunk> {
        if pages.is_empty() {
            return vec![];
        }

        let (segments, segment_pages) = self.ensure_length(pages);
        let grouped = self.group(segments, segment_pages);

        let chapters = if self.detect_chapters {
            self.chapters_of(&grouped)
        } else {
            vec![Vec::new(); grouped.len()]
        };

        let chunks: Vec<Chunk> = grouped
            .into_iter()
            .zip(chapters)
            .map(|((text, pages), chapters)| Chunk {
                text,
                pages,
                chapters,
            })
            .collect();

        tracing::debug!(
            input_pages = pages.len(),
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            overlap = self.overlap,
            "chunking completed"
        );

        chunks
    }

    /// Step 1: split any page longer than `chunk_size`, cutting at the last
    /// space inside the window, or hard at `chunk_size` when the window has
    /// no whitespace. Empty pages produce no segment but keep numbering.
    fn ensure_length(&self, pages: &[String]) -> (Vec<String>, Vec<u32>) {
        let mut segments = Vec::new();
        let mut segment_pages = Vec::new();

        for (idx, raw) in pages.iter().enumerate() {
            let page = idx as u32 + 1;
            let mut text = raw.trim();

            while char_count(text) > self.chunk_size {
                let window_end = byte_offset_at_char(text, self.chunk_size);
                let cut = match text[..window_end].rfind(' ') {
                    Some(pos) if pos > 0 => pos,
                    _ => window_end,
                };
                segments.push(text[..cut].trim_end().to_string());
                segment_pages.push(page);
                text = text[cut..].trim_start();
            }

            if !text.is_empty() {
                segments.push(text.to_string());
                segment_pages.push(page);
            }
        }

        (segments, segment_pages)
    }

    /// Step 2: pack segments into chunks of at most `chunk_size` chars
    /// (counting joining spaces), seeding the next group with overlap text
    /// when configured.
    fn group(&self, segments: Vec<String>, pages: Vec<u32>) -> Vec<(String, Vec<u32>)> {
        let mut grouped = Vec::new();
        let mut parts: Vec<String> = Vec::new();
        let mut part_pages: BTreeSet<u32> = BTreeSet::new();
        let mut length = 0usize;

        for (segment, page) in segments.into_iter().zip(pages) {
            let segment_len = char_count(&segment);
            let joiner = usize::from(!parts.is_empty());

            if length + joiner + segment_len <= self.chunk_size {
                length += joiner + segment_len;
                parts.push(segment);
                part_pages.insert(page);
                continue;
            }

            if !parts.is_empty() {
                grouped.push((parts.join(" "), part_pages.iter().copied().collect()));

                let seed = if self.overlap > 0 {
                    self.overlap_tail(parts.last().expect("non-empty group"))
                } else {
                    String::new()
                };
                parts = if seed.is_empty() {
                    vec![segment]
                } else {
                    vec![seed, segment]
                };
            } else {
                parts = vec![segment];
            }
            part_pages = BTreeSet::from([page]);
            length = parts.iter().map(|p| char_count(p)).sum::<usize>()
                + parts.len().saturating_sub(1);
        }

        if !parts.is_empty() {
            grouped.push((parts.join(" "), part_pages.iter().copied().collect()));
        }

        grouped
    }

    /// Overlap seed: the tail of the last segment, at most `overlap` chars,
    /// cut at the last whitespace inside the window so words stay whole.
    fn overlap_tail(&self, last: &str) -> String {
        if self.overlap == 0 {
            return String::new();
        }
        let total = char_count(last);
        if total <= self.overlap {
            return last.to_string();
        }

        let window_start = byte_offset_at_char(last, total - self.overlap);
        let cut = match last[window_start..].rfind(' ') {
            Some(pos) => window_start + pos,
            None => window_start,
        };
        last[cut..].trim().to_string()
    }

    /// Step 3: annotate chunks with the chapter labels active within their
    /// lines. A heading stays the current chapter until replaced.
    fn chapters_of(&self, grouped: &[(String, Vec<u32>)]) -> Vec<Vec<String>> {
        let mut result = Vec::with_capacity(grouped.len());
        let mut current: Option<String> = None;

        for (text, _) in grouped {
            let mut chunk_chapters: Vec<String> = Vec::new();
            for line in text.split('\n') {
                let line = line.trim();
                if self.policy.is_chapter_start(line) {
                    current = Some(truncate_label(line));
                }
                if let Some(chapter) = &current {
                    if !chunk_chapters.iter().any(|c| c == chapter) {
                        chunk_chapters.push(chapter.clone());
                    }
                }
            }
            result.push(chunk_chapters);
        }

        result
    }
}

fn truncate_label(label: &str) -> String {
    if char_count(label) > CHAPTER_LABEL_MAX {
        label.chars().take(CHAPTER_LABEL_TRUNCATED).collect()
    } else {
        label.to_string()
    }
}

fn char_count(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the n-th character, or the string length when shorter
fn byte_offset_at_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

use crate::error::IngestError;
use crate::models::{Chunk, Document, IngestionOptions};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Cut points, most preferred first. A hard cut is used when none fits.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

/// Collapses runs of inline whitespace and trims every line while keeping
/// blank-line paragraph breaks as a single `\n\n`.
pub fn normalize_page_text(text: &str) -> Result<String, IngestError> {
    let inline_whitespace = Regex::new(r"[^\S\n]+")?;
    let blank_runs = Regex::new(r"\n{3,}")?;

    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let collapsed = inline_whitespace.replace_all(&unified, " ");
    let trimmed_lines = collapsed
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    Ok(blank_runs
        .replace_all(trimmed_lines.trim(), "\n\n")
        .into_owned())
}

/// Splits `text` into pieces of at most `max_chars` characters. Every piece
/// after the first starts with the last `overlap_chars` characters of the
/// previous one. Each piece ends at the latest paragraph, line, sentence or
/// word boundary that keeps it at least half full.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.iter().all(|c| c.is_whitespace()) || config.max_chars == 0 {
        return Vec::new();
    }

    let overlap = config.overlap_chars.min(config.max_chars.saturating_sub(1));
    let min_fill = (overlap + 1).max(config.max_chars / 2);

    let mut pieces = Vec::new();
    let mut start = 0;

    loop {
        if chars.len() - start <= config.max_chars {
            pieces.push(chars[start..].iter().collect());
            break;
        }

        let window_end = start + config.max_chars;
        let end = boundary_before(&chars, start + min_fill, window_end);
        pieces.push(chars[start..end].iter().collect());
        start = end - overlap;
    }

    pieces
}

fn boundary_before(chars: &[char], earliest: usize, latest: usize) -> usize {
    for separator in SEPARATORS {
        let separator: Vec<char> = separator.chars().collect();
        let width = separator.len();

        let mut position = latest;
        while position >= earliest && position >= width {
            if chars[position - width..position] == separator[..] {
                return position;
            }
            position -= 1;
        }
    }

    latest
}

/// Splits one document into chunks, numbering them from `first_index`.
/// Returns the chunks and the next free index.
pub fn split_document(
    document: &Document,
    config: ChunkingConfig,
    first_index: u64,
) -> Result<(Vec<Chunk>, u64), IngestError> {
    let normalized = normalize_page_text(&document.text)?;
    let mut cursor = first_index;
    let mut chunks = Vec::new();

    for piece in split_text(&normalized, config) {
        chunks.push(Chunk {
            chunk_id: make_chunk_id(&document.source_path, document.page, cursor, &piece),
            document_id: document.document_id.clone(),
            source_path: document.source_path.clone(),
            page: document.page,
            chunk_index: cursor,
            text: piece,
        });
        cursor = cursor.saturating_add(1);
    }

    Ok((chunks, cursor))
}

fn make_chunk_id(source_path: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            overlap_chars,
        }
    }

    fn sample_text() -> String {
        let mut text = String::new();
        for paragraph in 0..6 {
            for sentence in 0..5 {
                text.push_str(&format!(
                    "Paragraph {paragraph} sentence {sentence} talks about valves and pumps. "
                ));
            }
            text.push_str("\n\n");
        }
        text
    }

    #[test]
    fn page_text_keeps_paragraph_breaks() -> Result<(), IngestError> {
        let input = "  First   line\r\nstill first\n\n\n\n  Second\u{a0}\u{a0}paragraph  ";
        let normalized = normalize_page_text(input)?;
        assert_eq!(normalized, "First line\nstill first\n\nSecond paragraph");
        Ok(())
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let pieces = split_text("just a little text", config(100, 20));
        assert_eq!(pieces, vec!["just a little text".to_string()]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(split_text("  \n\n ", config(100, 20)).is_empty());
    }

    #[test]
    fn chunks_never_exceed_max_chars() {
        let text = sample_text();
        for (max, overlap) in [(50, 10), (120, 30), (300, 0), (1000, 200)] {
            for piece in split_text(&text, config(max, overlap)) {
                assert!(
                    piece.chars().count() <= max,
                    "piece of {} chars exceeds {max}",
                    piece.chars().count()
                );
            }
        }
    }

    #[test]
    fn consecutive_chunks_overlap_exactly() {
        let text = sample_text();
        let overlap = 25;
        let pieces = split_text(&text, config(140, overlap));
        assert!(pieces.len() > 2);

        for pair in pieces.windows(2) {
            let previous: Vec<char> = pair[0].chars().collect();
            let tail: String = previous[previous.len() - overlap..].iter().collect();
            assert!(
                pair[1].starts_with(&tail),
                "{:?} does not start with {:?}",
                pair[1],
                tail
            );
        }
    }

    #[test]
    fn chunks_cover_the_whole_text_in_order() {
        let text = sample_text();
        let overlap = 15;
        let pieces = split_text(&text, config(90, overlap));

        let mut rebuilt: String = pieces[0].clone();
        for piece in &pieces[1..] {
            rebuilt.extend(piece.chars().skip(overlap));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = sample_text();
        let first = split_text(&text, config(200, 40));
        let second = split_text(&text, config(200, 40));
        assert_eq!(first, second);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let pieces = split_text(&text, config(100, 0));
        assert_eq!(pieces[0], format!("{}\n\n", "a".repeat(60)));
        assert_eq!(pieces[1], "b".repeat(60));
    }

    #[test]
    fn falls_back_to_word_then_hard_cut() {
        let words = "word ".repeat(30);
        let pieces = split_text(&words, config(22, 0));
        assert!(pieces[0].ends_with(' '));

        let solid = "x".repeat(45);
        let pieces = split_text(&solid, config(20, 5));
        assert_eq!(pieces[0].len(), 20);
        assert_eq!(pieces[1].len(), 20);
    }

    #[test]
    fn handles_multibyte_text() {
        let text = "Grüße aus Köln. ".repeat(20);
        let pieces = split_text(&text, config(37, 7));
        assert!(pieces.iter().all(|piece| piece.chars().count() <= 37));
    }

    #[test]
    fn document_chunks_carry_source_and_continue_cursor() -> Result<(), IngestError> {
        let document = Document {
            document_id: "doc-1".to_string(),
            source_path: "/tmp/manual.pdf".to_string(),
            page: 3,
            text: sample_text(),
            loaded_at: Utc::now(),
        };

        let (chunks, next) = split_document(&document, config(200, 40), 7)?;
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].chunk_index, 7);
        assert_eq!(next, 7 + chunks.len() as u64);
        assert!(chunks.iter().all(|chunk| chunk.page == 3));
        assert!(chunks
            .iter()
            .all(|chunk| chunk.source_path == "/tmp/manual.pdf"));
        assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);
        Ok(())
    }
}

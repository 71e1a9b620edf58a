//! Sliding-window chunker with sentence-boundary awareness.
//!
//! Chunks accumulate whole sentences until the token target is reached; the
//! last sentences that fit in the overlap budget seed the next chunk.
//! Sentences larger than the target plus the search radius are hard-split.

#[derive(Clone, Copy, Debug)]
pub struct ChunkerSettings {
    pub chunk_size_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub sentence_search_radius_tokens: usize,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self {
            chunk_size_tokens: 400,
            chunk_overlap_tokens: 50,
            sentence_search_radius_tokens: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub section: String,
    pub page: i64,
    pub chunk_index: i64,
    pub token_count: usize,
}

/// Rough token estimate, about one token per four characters.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut terminator_seen = false;

    for (index, ch) in text.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            terminator_seen = true;
        } else if ch.is_whitespace() && terminator_seen {
            let sentence = text[start..index].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = index + ch.len_utf8();
            terminator_seen = false;
        } else if !ch.is_whitespace() {
            terminator_seen = false;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Split an oversized sentence into pieces no larger than `max_tokens`,
/// respecting char boundaries.
fn hard_split(sentence: &str, max_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens.max(1) * 4;
    let chars: Vec<char> = sentence.chars().collect();
    chars.chunks(max_chars).map(|piece| piece.iter().collect()).collect()
}

pub fn chunk_text(
    text: &str,
    section: &str,
    page: i64,
    settings: &ChunkerSettings,
) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let limit = settings.chunk_size_tokens + settings.sentence_search_radius_tokens;
    let mut sentences: Vec<String> = Vec::new();
    for sentence in split_sentences(text) {
        if estimate_tokens(sentence) > limit {
            sentences.extend(hard_split(sentence, settings.chunk_size_tokens));
        } else {
            sentences.push(sentence.to_string());
        }
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0;
    let mut chunk_index = 0;

    for sentence in sentences {
        let sentence_tokens = estimate_tokens(&sentence);

        if current_tokens + sentence_tokens > settings.chunk_size_tokens && !current.is_empty() {
            chunks.push(Chunk {
                text: current.join(" "),
                section: section.to_string(),
                page,
                chunk_index,
                token_count: current_tokens,
            });
            chunk_index += 1;

            // Seed the next chunk with the trailing sentences that fit the
            // overlap budget.
            let mut overlap: Vec<String> = Vec::new();
            let mut overlap_tokens = 0;
            for kept in current.iter().rev() {
                let kept_tokens = estimate_tokens(kept);
                if overlap_tokens + kept_tokens > settings.chunk_overlap_tokens {
                    break;
                }
                overlap.insert(0, kept.clone());
                overlap_tokens += kept_tokens;
            }
            current = overlap;
            current_tokens = overlap_tokens;
        }

        current_tokens += sentence_tokens;
        current.push(sentence);
    }

    if !current.is_empty() {
        chunks.push(Chunk {
            text: current.join(" "),
            section: section.to_string(),
            page,
            chunk_index,
            token_count: current_tokens,
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::{chunk_text, estimate_tokens, split_sentences, Chunk, ChunkerSettings};

    fn settings(size: usize, overlap: usize) -> ChunkerSettings {
        ChunkerSettings {
            chunk_size_tokens: size,
            chunk_overlap_tokens: overlap,
            sentence_search_radius_tokens: size / 4,
        }
    }

    fn sample_text(sentence_count: usize) -> String {
        (0..sentence_count)
            .map(|n| format!("Sentence number {n} talks about opening hours and pricing."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn empty_input_produces_no_chunks() {
        assert!(chunk_text("", "intro", 1, &ChunkerSettings::default()).is_empty());
        assert!(chunk_text("   \n ", "intro", 1, &ChunkerSettings::default()).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text(
            "We open at nine. We close at six.",
            "hours",
            2,
            &ChunkerSettings::default(),
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section, "hours");
        assert_eq!(chunks[0].page, 2);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn chunks_never_break_inside_a_sentence() {
        let text = sample_text(40);
        let chunks = chunk_text(&text, "faq", 1, &settings(50, 10));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.ends_with('.'), "chunk ends mid-sentence: {}", chunk.text);
        }
    }

    #[test]
    fn every_sentence_appears_in_some_chunk() {
        let text = sample_text(30);
        let chunks = chunk_text(&text, "faq", 1, &settings(50, 10));
        for n in 0..30 {
            let needle = format!("Sentence number {n} ");
            assert!(
                chunks.iter().any(|chunk| chunk.text.contains(&needle)),
                "sentence {n} missing"
            );
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap_sentences() {
        let text = sample_text(40);
        let chunks = chunk_text(&text, "faq", 1, &settings(50, 20));
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let first_tail = pair[0].text.rsplit(". ").next().map(str::to_string);
            if let Some(tail) = first_tail {
                assert!(
                    pair[1].text.contains(tail.trim_end_matches('.')),
                    "no overlap between consecutive chunks"
                );
            }
        }
    }

    #[test]
    fn chunk_indexes_are_sequential() {
        let chunks = chunk_text(&sample_text(40), "faq", 1, &settings(50, 10));
        let indexes: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
        let expected: Vec<i64> = (0..chunks.len() as i64).collect();
        assert_eq!(indexes, expected);
    }

    #[test]
    fn oversized_sentence_is_hard_split() {
        // One 4000-char "sentence" with no terminators: 1000 estimated
        // tokens against a 100-token target.
        let monster = "x".repeat(4000);
        let chunks = chunk_text(&monster, "blob", 1, &settings(100, 10));
        assert!(chunks.len() > 1);
        let total: usize = chunks.iter().map(|c: &Chunk| c.text.len()).sum();
        // Pieces joined with spaces cover the whole input.
        let spaces: usize = chunks.len().saturating_sub(1);
        assert!(total >= 4000 && total <= 4000 + spaces * 500);
    }

    #[test]
    fn sentence_splitting_handles_terminators() {
        let sentences = split_sentences("First one. Second! Third? Trailing tail");
        assert_eq!(sentences, vec!["First one.", "Second!", "Third?", "Trailing tail"]);
    }

    #[test]
    fn token_estimate_is_char_based() {
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        // Multibyte chars count once each
        assert_eq!(estimate_tokens(&"é".repeat(8)), 2);
    }
}

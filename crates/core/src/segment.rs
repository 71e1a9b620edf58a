//! Outbound message segmentation for channels with a per-message size limit.
//!
//! A reply longer than the limit is split at the first available boundary,
//! trying paragraph breaks, then line breaks, then sentence ends, then word
//! breaks. A split never lands inside a word or a multi-byte character; the
//! limit is measured in characters, matching the delivery channel's counting.

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

pub fn segment_message(text: &str, limit: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if char_len(text) <= limit {
        return vec![text.to_string()];
    }

    accumulate(text.split("\n\n"), "\n\n", limit, |paragraph| split_block(paragraph, limit))
}

fn split_block(text: &str, limit: usize) -> Vec<String> {
    if text.contains('\n') {
        accumulate(text.split('\n'), "\n", limit, |line| split_sentences(line, limit))
    } else {
        split_sentences(text, limit)
    }
}

fn split_sentences(text: &str, limit: usize) -> Vec<String> {
    let sentences = sentence_spans(text);
    if sentences.len() <= 1 {
        return split_words(text, limit);
    }
    accumulate(sentences.into_iter(), " ", limit, |sentence| split_words(sentence, limit))
}

fn split_words(text: &str, limit: usize) -> Vec<String> {
    accumulate(text.split(' '), " ", limit, |word| hard_split(word, limit))
}

/// Greedy accumulation of `parts` into segments of at most `limit` chars,
/// re-joined with `joiner`. Parts that alone exceed the limit are handed to
/// `split_long` for a finer-grained split.
fn accumulate<'a, I, F>(parts: I, joiner: &str, limit: usize, split_long: F) -> Vec<String>
where
    I: Iterator<Item = &'a str>,
    F: Fn(&str) -> Vec<String>,
{
    let joiner_len = char_len(joiner);
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for part in parts {
        let part = part.trim_matches(|c: char| c == ' ');
        if part.is_empty() {
            continue;
        }
        let part_len = char_len(part);

        if current_len == 0 {
            if part_len <= limit {
                current.push_str(part);
                current_len = part_len;
            } else {
                segments.extend(split_long(part));
            }
        } else if current_len + joiner_len + part_len <= limit {
            current.push_str(joiner);
            current.push_str(part);
            current_len += joiner_len + part_len;
        } else {
            segments.push(std::mem::take(&mut current));
            current_len = 0;
            if part_len <= limit {
                current.push_str(part);
                current_len = part_len;
            } else {
                segments.extend(split_long(part));
            }
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

/// Split sentences after `.`, `!` or `?` followed by whitespace. The
/// inter-sentence whitespace is consumed by the split.
fn sentence_spans(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let (_, c) = chars[i];
        if SENTENCE_TERMINATORS.contains(&c) {
            if let Some(&(next_index, next_char)) = chars.get(i + 1) {
                if next_char.is_whitespace() {
                    spans.push(&text[start..next_index]);
                    let mut j = i + 1;
                    while j < chars.len() && chars[j].1.is_whitespace() {
                        j += 1;
                    }
                    start = chars.get(j).map_or(text.len(), |&(index, _)| index);
                    i = j;
                    continue;
                }
            }
        }
        i += 1;
    }

    if start < text.len() {
        spans.push(&text[start..]);
    }

    spans
}

/// Last resort for a single run longer than the limit: fixed-size chunks on
/// character boundaries.
fn hard_split(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for c in text.chars() {
        if count == limit {
            segments.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(c);
        count += 1;
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::{char_len, segment_message};

    #[test]
    fn short_text_is_a_single_segment() {
        assert_eq!(segment_message("hello there", 1000), vec!["hello there".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_segments() {
        assert!(segment_message("   ", 1000).is_empty());
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let first = "a".repeat(600);
        let second = "b".repeat(600);
        let text = format!("{first}\n\n{second}");

        let segments = segment_message(&text, 1000);
        assert_eq!(segments, vec![first, second]);
    }

    #[test]
    fn fifteen_hundred_chars_without_punctuation_split_at_a_word_boundary() {
        // 300 five-char units joined by spaces: 1799 chars total
        let words: Vec<String> = (0..300).map(|i| format!("w{:04}", i)).collect();
        let text = words.join(" ");
        let sample = &text[..1500];

        let segments = segment_message(sample, 1000);
        assert_eq!(segments.len(), 2);
        assert!(char_len(&segments[0]) <= 1000);
        assert!(char_len(&segments[1]) <= 1000);
        // Concatenation with the split-point space restores the original
        assert_eq!(format!("{} {}", segments[0], segments[1]), sample.trim());
    }

    #[test]
    fn sentences_are_kept_intact_when_possible() {
        let sentence = format!("{}.", "x".repeat(400));
        let text = format!("{sentence} {sentence} {sentence}");

        let segments = segment_message(&text, 1000);
        assert_eq!(segments.len(), 2);
        assert!(segments[0].ends_with('.'));
        assert_eq!(char_len(&segments[0]), 803);
    }

    #[test]
    fn never_splits_inside_a_multibyte_character() {
        let text = "é".repeat(2500);
        let segments = segment_message(&text, 1000);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments.iter().map(|s| char_len(s)).sum::<usize>(), 2500);
        for segment in &segments {
            assert!(char_len(segment) <= 1000);
        }
    }

    #[test]
    fn single_oversized_word_is_hard_split() {
        let text = "z".repeat(1200);
        let segments = segment_message(&text, 1000);
        assert_eq!(segments.len(), 2);
        assert_eq!(char_len(&segments[0]), 1000);
        assert_eq!(char_len(&segments[1]), 200);
    }

    #[test]
    fn segment_order_reconstructs_the_reply() {
        let paragraphs: Vec<String> =
            (0..8).map(|i| format!("paragraph {i} {}", "body ".repeat(60))).collect();
        let text = paragraphs.join("\n\n");

        let segments = segment_message(&text, 1000);
        assert!(segments.len() > 1);
        let rejoined = segments.join(" ").replace("\n\n", " ");
        let flattened = text.replace("\n\n", " ");
        let squash = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(squash(&rejoined), squash(&flattened));
    }
}

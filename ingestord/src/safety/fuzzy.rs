//! Token-based fuzzy matching between a folder name and an active transfer
//! path, used by the peer transfer probe.
//!
//! Intentionally broad (any shared token is a match): a false positive only
//! delays processing an artist by one pass, while a false negative risks
//! moving a folder a downloader is still writing to.

use std::collections::HashSet;

/// Stop words small enough that short, legitimate artist-name words
/// ("or", "at", "is") are never stripped.
const STOPWORDS: &[&str] = &["a", "an", "the", "and", "with", "from", "this", "that"];

/// Lowercase, replace non-alphanumerics with spaces, split on whitespace,
/// then discard purely-numeric tokens and stopwords.
///
/// Numeric tokens (track numbers, years) caused pathological false
/// positives when left in; discarding them is required, not optional.
pub fn tokenize(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    let normalized: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    normalized
        .split_whitespace()
        .filter(|tok| !tok.chars().all(|c| c.is_ascii_digit()))
        .filter(|tok| !STOPWORDS.contains(tok))
        .map(|tok| tok.to_string())
        .collect()
}

/// True iff the two token sets share at least one token.
pub fn fuzzy_match(a: &HashSet<String>, b: &HashSet<String>) -> bool {
    a.intersection(b).next().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_tokens_never_cause_a_match() {
        let active = tokenize("03 - Track.flac");
        let folder = tokenize("10 Great Songs");
        assert!(!fuzzy_match(&active, &folder));
    }

    #[test]
    fn shared_word_token_matches() {
        let active = tokenize("Oasis/04 Don't Look Back.flac");
        let folder = tokenize("Oasis - Definitely Maybe");
        assert!(fuzzy_match(&active, &folder));
    }

    #[test]
    fn unrelated_artist_does_not_match() {
        let active = tokenize("Oasis/04 Don't Look Back.flac");
        let folder = tokenize("Alabama-40.Hour.Week");
        assert!(!fuzzy_match(&active, &folder));
    }

    #[test]
    fn short_common_words_are_not_stripped() {
        // "Or" and "Is" can legitimately appear in artist/album names and
        // must survive tokenization (only the small stopword set above is
        // stripped, not every short word).
        let tokens = tokenize("Simon or Garfunkel Is Here");
        assert!(tokens.contains("or"));
        assert!(tokens.contains("is"));
    }
}

//! Text processing for full-text queries and summary previews

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
    static ref TERM_REGEX: Regex = Regex::new(r"[\p{L}\p{N}_]+").unwrap();
}

pub struct TextUtils;

impl TextUtils {
    /// Normalize whitespace efficiently
    pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
        if WHITESPACE_REGEX.is_match(text) {
            Cow::Owned(WHITESPACE_REGEX.replace_all(text, " ").trim().to_string())
        } else {
            Cow::Borrowed(text)
        }
    }

    /// Truncate text to at most `max_chars` characters, ending with an ellipsis
    /// when anything was cut.
    pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> Cow<'_, str> {
        if text.chars().count() <= max_chars {
            return Cow::Borrowed(text);
        }
        if max_chars <= 3 {
            return Cow::Borrowed("...");
        }
        let mut result: String = text.chars().take(max_chars - 3).collect();
        result.push_str("...");
        Cow::Owned(result)
    }

    /// Check if word is significant (not stop word, long enough)
    pub fn is_significant_word(word: &str, min_len: usize) -> bool {
        if word.chars().count() < min_len {
            return false;
        }

        !matches!(word.to_lowercase().as_str(), "the" | "a" | "an" | "and" | "or" | "but" | "in" | "on" | "at" | "to" | "for" |
            "of" | "with" | "by" | "is" | "am" | "are" | "was" | "were" | "be" | "been" |
            "being" | "have" | "has" | "had" | "do" | "does" | "did" | "from" | "that" | "this" |
            "what" | "about" | "it")
    }

    /// Lowercased search terms of a free-text query. Stop words are dropped
    /// unless the query consists of nothing else.
    pub fn query_terms(query: &str) -> Vec<String> {
        let all: Vec<String> = TERM_REGEX
            .find_iter(query)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        let significant: Vec<String> = all
            .iter()
            .filter(|t| Self::is_significant_word(t, 2))
            .cloned()
            .collect();
        let mut terms = if significant.is_empty() { all } else { significant };
        let mut seen = std::collections::HashSet::new();
        terms.retain(|t| seen.insert(t.clone()));
        terms
    }

    /// FTS5 MATCH expression for a free-text query: every term quoted and
    /// OR-ed so partial matches still rank. `None` when the query has no terms.
    pub fn fts_match_expression(query: &str) -> Option<String> {
        let terms = Self::query_terms(query);
        if terms.is_empty() {
            return None;
        }
        Some(
            terms
                .iter()
                .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
                .collect::<Vec<_>>()
                .join(" OR "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_terms_drop_stop_words() {
        let terms = TextUtils::query_terms("What is the deployment plan for Kafka?");
        assert_eq!(terms, vec!["deployment", "plan", "kafka"]);
    }

    #[test]
    fn test_query_terms_keep_stop_words_when_nothing_else() {
        assert_eq!(TextUtils::query_terms("the a"), vec!["the", "a"]);
    }

    #[test]
    fn test_fts_expression_quotes_terms() {
        let expr = TextUtils::fts_match_expression("rust: async-traits!").unwrap();
        assert_eq!(expr, "\"rust\" OR \"async\" OR \"traits\"");
    }

    #[test]
    fn test_fts_expression_none_for_punctuation() {
        assert!(TextUtils::fts_match_expression("?!  ...").is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        assert_eq!(TextUtils::truncate_with_ellipsis(text, 8), "héllo...");
        assert_eq!(TextUtils::truncate_with_ellipsis(text, 50), text);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(TextUtils::normalize_whitespace("  a \n\t b "), "a b");
    }
}

//! Turning document bodies into token streams.

use regex::Regex;

/// Splits one document body into a lazy sequence of tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize<'a>(&'a self, text: &'a str) -> Box<dyn Iterator<Item = String> + 'a>;
}

/// Lower-cased alphabetic words of at least `min_len` letters. HTML tags and
/// character entities are skipped rather than split into words.
pub struct RegexTokenizer {
    pattern: Regex,
}

impl RegexTokenizer {
    pub fn new(min_len: usize) -> Self {
        let min_len = min_len.max(1);
        let pattern = Regex::new(&format!(r"<[^>]*>|&#?[a-zA-Z0-9]+;|\b[a-zA-Z]{{{},}}\b", min_len))
            .expect("token pattern is valid");
        RegexTokenizer { pattern }
    }
}

impl Default for RegexTokenizer {
    fn default() -> Self {
        RegexTokenizer::new(3)
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize<'a>(&'a self, text: &'a str) -> Box<dyn Iterator<Item = String> + 'a> {
        Box::new(
            self.pattern
                .find_iter(text)
                .map(|m| m.as_str())
                .filter(|word| !word.starts_with('<') && !word.starts_with('&'))
                .map(|word| word.to_lowercase()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        RegexTokenizer::default().tokenize(text).collect()
    }

    #[test]
    fn test_lowercases_and_drops_short_words() {
        assert_eq!(tokens("The Cat sat on a MAT"), vec!["the", "cat", "sat", "mat"]);
    }

    #[test]
    fn test_skips_markup() {
        assert_eq!(
            tokens("<p class=\"comment\">Great&nbsp;article</p> <br/>indeed"),
            vec!["great", "article", "indeed"]
        );
    }

    #[test]
    fn test_ignores_digits_and_punctuation() {
        assert_eq!(tokens("rust2024 is... fast!! 42"), vec!["fast"]);
    }

    #[test]
    fn test_custom_minimum_length() {
        let tokenizer = RegexTokenizer::new(5);
        let out: Vec<String> = tokenizer.tokenize("short longer lengthy").collect();
        assert_eq!(out, vec!["short", "longer", "lengthy"]);
        let out: Vec<String> = tokenizer.tokenize("tiny word").collect();
        assert!(out.is_empty());
    }
}

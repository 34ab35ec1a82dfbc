use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
}

/// Tokenize text into lowercase terms: NFKC normalization, then every maximal
/// run of letters/digits is one term. Everything else is a separator.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
}

/// Byte spans of the terms in `text`, without normalization. Used where the
/// caller needs to cut the original text on a term boundary.
pub fn token_spans(text: &str) -> Vec<(usize, usize)> {
    RE.find_iter(text).map(|m| (m.start(), m.end())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Contract-Law, basics!");
        assert_eq!(t, vec!["contract", "law", "basics"]);
    }

    #[test]
    fn spans_cover_terms() {
        let text = "  cell  biology-intro";
        let spans = token_spans(text);
        let words: Vec<&str> = spans.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(words, vec!["cell", "biology", "intro"]);
    }
}

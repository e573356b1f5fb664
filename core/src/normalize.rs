use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

use crate::config::DEFAULT_MIN_TERM_LEN;

/// Maps raw tokens to canonical terms.
///
/// A token maps to at most one term, and the mapping must be deterministic.
/// Term-frequency counting relies on `normalize` keeping multiplicity: a token
/// seen k times yields its term k times.
pub trait Normalizer {
    fn normalize_token(&self, token: &str) -> Option<String>;

    fn normalize<I, S>(&self, tokens: I) -> Vec<String>
    where
        Self: Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens.into_iter().filter_map(|t| self.normalize_token(t.as_ref())).collect()
    }
}

impl<F> Normalizer for F
where
    F: Fn(&str) -> Option<String>,
{
    fn normalize_token(&self, token: &str) -> Option<String> {
        self(token)
    }
}

const SYMBOLS: &str = "!@#$%^&*()[]{};':\",.<>/?`~-_=+";

lazy_static! {
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","ain","all","am","an","and","any","are","aren","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","couldn","couldn't",
            "d","did","didn","didn't","do","does","doesn","doesn't","doing","don","don't","down","during",
            "each","few","for","from","further",
            "had","hadn","hadn't","has","hasn","hasn't","have","haven","haven't","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","isn","isn't","it","it's","its","itself",
            "just","ll","m","ma","me","mightn","mightn't","more","most","mustn","mustn't","my","myself",
            "needn","needn't","no","nor","not","now",
            "o","of","off","on","once","only","or","other","our","ours","ourselves","out","over","own",
            "re","s","same","shan","shan't","she","she's","should","should've","shouldn","shouldn't","so","some","such",
            "t","than","that","that'll","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","ve","very",
            "was","wasn","wasn't","we","were","weren","weren't","what","when","where","which","while","who","whom","why","will","with","won","won't","wouldn","wouldn't",
            "y","you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// NFKC + lowercase, strip surrounding punctuation, drop short words and
/// stopwords, then apply the Snowball English stemmer.
#[derive(Debug, Clone)]
pub struct EnglishNormalizer {
    min_len: usize,
}

impl Default for EnglishNormalizer {
    fn default() -> Self {
        Self { min_len: DEFAULT_MIN_TERM_LEN }
    }
}

impl EnglishNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only words of at least `min_len` characters (after stripping).
    pub fn with_min_len(min_len: usize) -> Self {
        Self { min_len }
    }
}

impl Normalizer for EnglishNormalizer {
    fn normalize_token(&self, token: &str) -> Option<String> {
        let lowered = token.nfkc().collect::<String>().to_lowercase();
        let stripped = lowered.trim_matches(|c: char| SYMBOLS.contains(c));
        if stripped.chars().count() < self.min_len || is_stopword(stripped) {
            return None;
        }
        let stem = STEMMER.stem(stripped);
        if stem.is_empty() {
            return None;
        }
        Some(stem.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_and_strips() {
        let n = EnglishNormalizer::new();
        assert_eq!(n.normalize_token("Running,").as_deref(), Some("run"));
        assert_eq!(n.normalize_token("(flows)").as_deref(), Some("flow"));
    }

    #[test]
    fn drops_short_words_and_stopwords() {
        let n = EnglishNormalizer::new();
        assert_eq!(n.normalize_token("the"), None);
        assert_eq!(n.normalize_token("wing"), Some("wing".to_string()));
        assert_eq!(n.normalize_token("jet"), None);
        assert_eq!(n.normalize_token("these"), None);
        assert_eq!(n.normalize_token("...."), None);
    }

    #[test]
    fn keeps_multiplicity() {
        let n = EnglishNormalizer::new();
        let terms = n.normalize(["Boundary", "layer", "boundary", "of", "BOUNDARY."]);
        assert_eq!(terms.iter().filter(|t| t.as_str() == "boundari").count(), 3);
        assert_eq!(terms.len(), 4);
    }

    #[test]
    fn closures_are_normalizers() {
        let lower = |t: &str| Some(t.to_lowercase());
        assert_eq!(lower.normalize(["A", "b"]), vec!["a", "b"]);
    }
}
